//! SQLite schema for the bookmark store
//!
//! Five relations hold all persistent state: `bookmark`, `bookmark_content`,
//! `tag`, `bookmark_tag` and `account`. Archived content is indexed by an
//! FTS5 table that triggers keep in step with `bookmark_content`.

use rusqlite::{Connection, OptionalExtension, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Create every relation that does not exist yet
///
/// Safe to call on every startup; existing tables and rows are untouched.
pub fn provision(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bookmark (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            image_url TEXT NOT NULL DEFAULT '',
            excerpt TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            min_read_time INTEGER NOT NULL DEFAULT 0 CHECK (min_read_time >= 0),
            max_read_time INTEGER NOT NULL DEFAULT 0 CHECK (max_read_time >= 0),
            modified TEXT NOT NULL
        );

        -- Archived content, one row per bookmark
        CREATE TABLE IF NOT EXISTS bookmark_content (
            docid INTEGER PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            html TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (docid) REFERENCES bookmark(id) ON DELETE CASCADE
        );

        -- Tags table (normalized names)
        CREATE TABLE IF NOT EXISTS tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );

        -- Bookmark-tag junction table (many-to-many)
        CREATE TABLE IF NOT EXISTS bookmark_tag (
            bookmark_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (bookmark_id, tag_id),
            FOREIGN KEY (bookmark_id) REFERENCES bookmark(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tag(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_bookmark_tag_tag_id ON bookmark_tag(tag_id);
        CREATE INDEX IF NOT EXISTS idx_bookmark_modified ON bookmark(modified);

        -- Full-text search over archived title and text
        CREATE VIRTUAL TABLE IF NOT EXISTS bookmark_content_fts USING fts5(
            title,
            content,
            content='bookmark_content',
            content_rowid='docid'
        );

        CREATE TRIGGER IF NOT EXISTS bookmark_content_ai AFTER INSERT ON bookmark_content BEGIN
            INSERT INTO bookmark_content_fts(rowid, title, content)
            VALUES (NEW.docid, NEW.title, NEW.content);
        END;

        CREATE TRIGGER IF NOT EXISTS bookmark_content_ad AFTER DELETE ON bookmark_content BEGIN
            INSERT INTO bookmark_content_fts(bookmark_content_fts, rowid, title, content)
            VALUES ('delete', OLD.docid, OLD.title, OLD.content);
        END;

        CREATE TRIGGER IF NOT EXISTS bookmark_content_au AFTER UPDATE ON bookmark_content BEGIN
            INSERT INTO bookmark_content_fts(bookmark_content_fts, rowid, title, content)
            VALUES ('delete', OLD.docid, OLD.title, OLD.content);
            INSERT INTO bookmark_content_fts(rowid, title, content)
            VALUES (NEW.docid, NEW.title, NEW.content);
        END;
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Relations with an integer id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Bookmark,
    Tag,
    Account,
}

/// The id the next row of `relation` would probably receive
///
/// Advisory only, for display before a save: real ids are assigned by
/// SQLite when the row is inserted, and a concurrent insert can take this
/// one first.
pub fn next_id_hint(conn: &Connection, relation: Relation) -> Result<i64> {
    let sql = match relation {
        Relation::Bookmark => "SELECT COALESCE(MAX(id) + 1, 1) FROM bookmark",
        Relation::Tag => "SELECT COALESCE(MAX(id) + 1, 1) FROM tag",
        Relation::Account => "SELECT COALESCE(MAX(id) + 1, 1) FROM account",
    };
    conn.query_row(sql, [], |row| row.get(0))
}

/// Get the current schema version from the database
pub fn schema_version(conn: &Connection) -> Result<Option<i32>> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.and_then(|v| v.parse().ok()))
}

/// Check if the schema is missing or older than this build
pub fn needs_provision(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
