//! Account store
//!
//! Login principals. Passwords are hashed before the write begins and only
//! the encoded hash is ever stored or returned.

use rusqlite::{named_params, params, OptionalExtension, Row};
use tracing::debug;

use crate::models::Account;
use crate::password;
use crate::search::escape_like;
use crate::storage::{Database, Membership, StoreError, StoreResult};

/// Account operations over a shared database handle
pub struct Accounts<'a> {
    db: &'a Database,
}

impl<'a> Accounts<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create an account, failing with a conflict if the username is taken
    pub fn create(&self, username: &str, password: &str) -> StoreResult<Account> {
        if username.trim().is_empty() {
            return Err(StoreError::validation("username", "must not be empty"));
        }
        if password.is_empty() {
            return Err(StoreError::validation("password", "must not be empty"));
        }

        let password_hash = password::hash(password, self.db.config().password_iterations)?;

        let id = self.db.run_atomic(|tx| {
            tx.execute(
                "INSERT INTO account (username, password) VALUES (?, ?)",
                params![username, password_hash],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!("Created account {} ({})", id, username);

        Ok(Account {
            id,
            username: username.to_string(),
            password_hash,
        })
    }

    /// Fetch the account registered under `username`
    pub fn get_by_username(&self, username: &str) -> StoreResult<Account> {
        self.db
            .read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, username, password FROM account WHERE username = ?",
                        params![username],
                        account_from_row,
                    )
                    .optional()?)
            })?
            .ok_or_else(|| StoreError::NotFound(format!("account {:?}", username)))
    }

    /// Accounts whose username contains `filter`, ordered by username
    ///
    /// An empty filter lists every account.
    pub fn list(&self, filter: &str) -> StoreResult<Vec<Account>> {
        let pattern = format!("%{}%", escape_like(filter));
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, username, password FROM account
                WHERE username LIKE ? ESCAPE '\'
                ORDER BY username
                "#,
            )?;
            let accounts = stmt
                .query_map(params![pattern], account_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(accounts)
        })
    }

    /// Delete accounts by username, or every account when `usernames` is empty
    ///
    /// Returns how many were removed; unknown usernames are ignored.
    pub fn delete<S: AsRef<str>>(&self, usernames: &[S]) -> StoreResult<usize> {
        let membership = Membership::texts(usernames);
        let (all, members) = (membership.all_flag(), membership.set());
        let removed = self.db.run_atomic(|tx| {
            Ok(tx.execute(
                "DELETE FROM account WHERE (:all OR username IN rarray(:set))",
                named_params! { ":all": all, ":set": members },
            )?)
        })?;
        debug!("Deleted {} accounts", removed);
        Ok(removed)
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::ErrorKind;

    fn db() -> Database {
        Database::open_in_memory_with_config(Config {
            password_iterations: 1_000,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let db = db();
        let accounts = Accounts::new(&db);

        let created = accounts.create("alice", "pw1").unwrap();
        let found = accounts.get_by_username("alice").unwrap();

        assert_eq!(found, created);
        assert_ne!(found.password_hash, "pw1");
        assert!(password::verify("pw1", &found.password_hash));
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let db = db();
        let accounts = Accounts::new(&db);

        accounts.create("alice", "pw1").unwrap();
        let err = accounts.create("alice", "pw2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = accounts.get_by_username("alice").unwrap();
        assert!(password::verify("pw1", &stored.password_hash));
        assert!(!password::verify("pw2", &stored.password_hash));
        assert_eq!(accounts.list("").unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_blank_fields() {
        let db = db();
        let accounts = Accounts::new(&db);

        assert_eq!(
            accounts.create(" ", "pw").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            accounts.create("alice", "").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(accounts.list("").unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = db();
        let err = Accounts::new(&db).get_by_username("nobody").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_filters_by_substring_in_order() {
        let db = db();
        let accounts = Accounts::new(&db);
        for name in ["carol", "alice", "malice", "bob"] {
            accounts.create(name, "pw").unwrap();
        }

        let all: Vec<String> = accounts
            .list("")
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(all, vec!["alice", "bob", "carol", "malice"]);

        let matched: Vec<String> = accounts
            .list("lic")
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(matched, vec!["alice", "malice"]);

        assert!(accounts.list("%").unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let db = db();
        let accounts = Accounts::new(&db);
        for name in ["alice", "bob", "carol"] {
            accounts.create(name, "pw").unwrap();
        }

        assert_eq!(accounts.delete(&["alice", "nobody"]).unwrap(), 1);
        assert_eq!(accounts.delete(&["nobody"]).unwrap(), 0);
        assert_eq!(accounts.list("").unwrap().len(), 2);

        assert_eq!(accounts.delete::<&str>(&[]).unwrap(), 2);
        assert!(accounts.list("").unwrap().is_empty());
    }
}
