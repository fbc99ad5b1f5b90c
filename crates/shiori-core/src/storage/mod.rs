//! Storage layer
//!
//! Owns everything that touches SQLite directly: the pooled connection
//! handle and transaction coordinator, the schema, error classification and
//! the membership predicates used by batch statements.
//!
//! ## Tables
//!
//! - `bookmark` - Bookmark records
//! - `bookmark_content` - Archived title, text and HTML (one row per bookmark)
//! - `tag` - Normalized tag names
//! - `bookmark_tag` - Bookmark-to-tag junction
//! - `account` - Login principals with hashed passwords
//! - `bookmark_content_fts` - Full-text index (auto-synced via triggers)

pub mod database;
pub mod error;
pub mod membership;
pub mod schema;

pub use database::Database;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use membership::Membership;
pub use schema::{needs_provision, next_id_hint, provision, Relation, SCHEMA_VERSION};
