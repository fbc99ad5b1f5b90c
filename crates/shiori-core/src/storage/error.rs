//! Storage error handling
//!
//! Every engine operation returns a [`StoreError`]. Callers that only care
//! about the broad category use [`StoreError::kind`], which folds the
//! variants into validation, conflict, not-found and transaction failures.

use rusqlite::{ffi, ErrorCode};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required field was missing or malformed; nothing was written
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A unique constraint rejected the write (duplicate url, username, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Could not acquire a pooled connection
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The schema could not be provisioned
    #[error("Failed to provision schema: {0}")]
    Schema(#[source] rusqlite::Error),

    /// The operation ran past its deadline and was rolled back
    #[error("Operation interrupted after exceeding its deadline")]
    Interrupted,

    /// An operation was started while another one was open on this thread
    #[error("Nested transaction: pass the open transaction through instead of starting another")]
    NestedTransaction,

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Broad error categories callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    TransactionFailure,
}

impl StoreError {
    /// Shorthand for a validation failure on `field`
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Database(_)
            | StoreError::Pool(_)
            | StoreError::Schema(_)
            | StoreError::Interrupted
            | StoreError::NestedTransaction
            | StoreError::PasswordHash(_) => ErrorKind::TransactionFailure,
        }
    }

    /// Check if retrying the same call could succeed
    ///
    /// Only transaction failures qualify: the operation was fully undone.
    /// Retrying a validation error or conflict produces the same outcome.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionFailure
            && !matches!(
                self,
                StoreError::NestedTransaction | StoreError::Schema(_)
            )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(e, msg) if is_unique_violation(e) => {
                StoreError::Conflict(
                    msg.clone()
                        .unwrap_or_else(|| "unique constraint failed".to_string()),
                )
            }
            rusqlite::Error::SqliteFailure(e, msg)
                if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                StoreError::NotFound(
                    msg.clone()
                        .unwrap_or_else(|| "referenced row does not exist".to_string()),
                )
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
                StoreError::Interrupted
            }
            _ => StoreError::Database(error),
        }
    }
}

fn is_unique_violation(error: &ffi::Error) -> bool {
    error.code == ErrorCode::ConstraintViolation
        && matches!(
            error.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
