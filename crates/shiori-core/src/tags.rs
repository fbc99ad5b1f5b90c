//! Tag registry
//!
//! Tag names are normalized (trimmed, lowercased) before they are stored or
//! looked up, so "Go " and "go" share one row. The write helpers take the
//! caller's open transaction; they never start one of their own.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::models::TagCount;
use crate::storage::{StoreError, StoreResult};

/// Canonical form of a tag name
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalize `name`, rejecting names that are blank
pub fn normalized_or_invalid(name: &str) -> StoreResult<String> {
    let normalized = normalize_tag_name(name);
    if normalized.is_empty() {
        return Err(StoreError::validation("tag", "name must not be empty"));
    }
    Ok(normalized)
}

/// Get or create the tag for `name`, returning its id
///
/// The insert yields to an existing row with the same name, so two
/// resolutions of one name always agree on the id.
pub fn resolve(tx: &Transaction<'_>, name: &str) -> StoreResult<i64> {
    let name = normalized_or_invalid(name)?;

    tx.execute(
        "INSERT INTO tag (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
        params![name],
    )?;
    let id = tx.query_row("SELECT id FROM tag WHERE name = ?", params![name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

/// Ensure `bookmark_id` carries `tag_id`; re-attaching is a no-op
pub fn attach(tx: &Transaction<'_>, bookmark_id: i64, tag_id: i64) -> StoreResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO bookmark_tag (bookmark_id, tag_id) VALUES (?, ?)",
        params![bookmark_id, tag_id],
    )?;
    Ok(())
}

/// Remove the association if present
pub fn detach(tx: &Transaction<'_>, bookmark_id: i64, tag_id: i64) -> StoreResult<()> {
    tx.execute(
        "DELETE FROM bookmark_tag WHERE bookmark_id = ? AND tag_id = ?",
        params![bookmark_id, tag_id],
    )?;
    Ok(())
}

/// Look up a tag id by name without creating it
pub fn find(conn: &Connection, name: &str) -> StoreResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM tag WHERE name = ?",
            params![normalize_tag_name(name)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Stored name of the tag with `id`, if it exists
pub fn name_of(conn: &Connection, id: i64) -> StoreResult<Option<String>> {
    let name = conn
        .query_row("SELECT name FROM tag WHERE id = ?", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(name)
}

/// Every tag with the number of bookmarks carrying it, ordered by name
pub fn list_with_counts(conn: &Connection) -> StoreResult<Vec<TagCount>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT t.id, t.name, COUNT(bt.bookmark_id)
        FROM tag t
        LEFT JOIN bookmark_tag bt ON t.id = bt.tag_id
        GROUP BY t.id
        ORDER BY t.name
        "#,
    )?;

    let tags = stmt
        .query_map([], |row| {
            Ok(TagCount {
                id: row.get(0)?,
                name: row.get(1)?,
                bookmark_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Delete tags no bookmark carries; returns how many were removed
pub fn prune_orphans(tx: &Transaction<'_>) -> StoreResult<usize> {
    let removed = tx.execute(
        "DELETE FROM tag WHERE id NOT IN (SELECT DISTINCT tag_id FROM bookmark_tag)",
        [],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::provision;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        provision(&conn).unwrap();
        conn.execute(
            "INSERT INTO bookmark (id, url, title, modified) VALUES (1, 'https://a.com', 'A', 'x')",
            [],
        )
        .unwrap();
        conn
    }

    fn association_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM bookmark_tag", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_tag_name("  Go "), "go");
        assert_eq!(normalize_tag_name("RUST"), "rust");
        assert!(normalized_or_invalid("   ").is_err());
    }

    #[test]
    fn test_resolve_normalizes_to_one_id() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();

        let first = resolve(&tx, "Go ").unwrap();
        let second = resolve(&tx, "go").unwrap();
        let third = resolve(&tx, "  GO").unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);

        let rows: i64 = tx
            .query_row("SELECT COUNT(*) FROM tag", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_resolve_rejects_blank() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let err = resolve(&tx, "  ").unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "tag", .. }));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let tag = resolve(&tx, "rust").unwrap();

        attach(&tx, 1, tag).unwrap();
        attach(&tx, 1, tag).unwrap();
        tx.commit().unwrap();

        assert_eq!(association_count(&conn), 1);
    }

    #[test]
    fn test_detach_missing_is_noop() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let tag = resolve(&tx, "rust").unwrap();

        detach(&tx, 1, tag).unwrap();
        attach(&tx, 1, tag).unwrap();
        detach(&tx, 1, tag).unwrap();
        detach(&tx, 1, tag).unwrap();
        tx.commit().unwrap();

        assert_eq!(association_count(&conn), 0);
    }

    #[test]
    fn test_attach_unknown_bookmark_fails() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let tag = resolve(&tx, "rust").unwrap();
        let err = attach(&tx, 42, tag).unwrap_err();
        assert_eq!(err.kind(), crate::storage::ErrorKind::NotFound);
    }

    #[test]
    fn test_name_of() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let id = resolve(&tx, " Rust").unwrap();

        assert_eq!(name_of(&tx, id).unwrap().as_deref(), Some("rust"));
        assert_eq!(name_of(&tx, id + 100).unwrap(), None);
    }

    #[test]
    fn test_list_with_counts_includes_orphans() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let rust = resolve(&tx, "rust").unwrap();
        resolve(&tx, "archived").unwrap();
        attach(&tx, 1, rust).unwrap();
        tx.commit().unwrap();

        let tags = list_with_counts(&conn).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "archived");
        assert_eq!(tags[0].bookmark_count, 0);
        assert_eq!(tags[1].name, "rust");
        assert_eq!(tags[1].bookmark_count, 1);
    }

    #[test]
    fn test_prune_orphans() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let rust = resolve(&tx, "rust").unwrap();
        resolve(&tx, "unused").unwrap();
        attach(&tx, 1, rust).unwrap();

        assert_eq!(prune_orphans(&tx).unwrap(), 1);
        tx.commit().unwrap();

        assert_eq!(find(&conn, "rust").unwrap(), Some(rust));
        assert_eq!(find(&conn, "unused").unwrap(), None);
    }
}
