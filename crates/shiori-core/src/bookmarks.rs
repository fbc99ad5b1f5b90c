//! Bookmark store
//!
//! CRUD for bookmark rows, their archived content and their tag
//! associations. Every write runs as one transaction: a bookmark, its
//! content row, any new tags and its associations are committed together or
//! not at all.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{named_params, params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::models::{Bookmark, Tag};
use crate::storage::{Database, Membership, StoreError, StoreResult};
use crate::tags;

pub(crate) const BOOKMARK_COLUMNS: &str =
    "id, url, title, image_url, excerpt, author, min_read_time, max_read_time, modified";

/// Bookmark operations over a shared database handle
pub struct Bookmarks<'a> {
    db: &'a Database,
}

impl<'a> Bookmarks<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Save a new bookmark with its content and tags, returning the new id
    ///
    /// `bookmark.id` is ignored; the id is assigned by the database. A
    /// missing `modified` timestamp is set to the current time.
    pub fn insert(&self, bookmark: &Bookmark) -> StoreResult<i64> {
        validate(bookmark)?;
        let modified = bookmark.modified.unwrap_or_else(Utc::now);

        let id = self
            .db
            .run_atomic(|tx| insert_bookmark(tx, bookmark, modified))?;
        debug!("Inserted bookmark {}", id);
        Ok(id)
    }

    /// Fetch bookmarks by id, or every bookmark when `ids` is empty
    ///
    /// Ids that do not exist are skipped. Tags are always attached; content
    /// and HTML only when `with_content` is set.
    pub fn get(&self, ids: &[i64], with_content: bool) -> StoreResult<Vec<Bookmark>> {
        let membership = Membership::ids(ids);
        self.db.read(|conn| {
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmark \
                 WHERE (:all OR id IN rarray(:set)) ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bookmarks = stmt
                .query_map(
                    named_params! { ":all": membership.all_flag(), ":set": membership.set() },
                    bookmark_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            for bookmark in &mut bookmarks {
                bookmark.tags = tags_for_bookmark(conn, bookmark.id)?;
                if with_content {
                    load_content(conn, bookmark)?;
                }
            }
            Ok(bookmarks)
        })
    }

    /// Delete bookmarks by id, or every bookmark when `ids` is empty
    ///
    /// Content rows and tag associations go with them. Unknown ids are
    /// ignored. Returns the number of bookmarks removed.
    pub fn delete(&self, ids: &[i64]) -> StoreResult<usize> {
        let membership = Membership::ids(ids);
        let (all, members) = (membership.all_flag(), membership.set());
        let removed = self.db.run_atomic(|tx| {
            tx.execute(
                "DELETE FROM bookmark_tag WHERE (:all OR bookmark_id IN rarray(:set))",
                named_params! { ":all": all, ":set": members },
            )?;
            tx.execute(
                "DELETE FROM bookmark_content WHERE (:all OR docid IN rarray(:set))",
                named_params! { ":all": all, ":set": members },
            )?;
            Ok(tx.execute(
                "DELETE FROM bookmark WHERE (:all OR id IN rarray(:set))",
                named_params! { ":all": all, ":set": members },
            )?)
        })?;
        debug!("Deleted {} bookmarks", removed);
        Ok(removed)
    }

    /// Overwrite stored bookmarks as one batch
    ///
    /// For each bookmark the row and content are replaced, tags marked
    /// `deleted` are detached and tags without an id are resolved and
    /// attached. If any bookmark fails (invalid, unknown id, url taken),
    /// none of the batch is applied.
    pub fn update(&self, bookmarks: &[Bookmark]) -> StoreResult<Vec<Bookmark>> {
        for bookmark in bookmarks {
            validate(bookmark)?;
        }
        let now = Utc::now();

        let applied = self.db.run_atomic(|tx| {
            bookmarks
                .iter()
                .map(|bookmark| update_bookmark(tx, bookmark, now))
                .collect::<StoreResult<Vec<_>>>()
        })?;
        debug!("Updated {} bookmarks", applied.len());
        Ok(applied)
    }

    /// Id of the bookmark saved under `url`, if any
    pub fn id_by_url(&self, url: &str) -> StoreResult<Option<i64>> {
        self.db.read(|conn| {
            Ok(conn
                .query_row("SELECT id FROM bookmark WHERE url = ?", params![url], |row| {
                    row.get(0)
                })
                .optional()?)
        })
    }
}

/// Reject bookmarks that must never reach storage
fn validate(bookmark: &Bookmark) -> StoreResult<()> {
    if bookmark.url.trim().is_empty() {
        return Err(StoreError::validation("url", "must not be empty"));
    }
    if bookmark.title.trim().is_empty() {
        return Err(StoreError::validation("title", "must not be empty"));
    }
    for tag in bookmark.tags.iter().filter(|t| !t.deleted && t.id.is_none()) {
        tags::normalized_or_invalid(&tag.name)?;
    }
    Ok(())
}

fn insert_bookmark(
    tx: &Transaction<'_>,
    bookmark: &Bookmark,
    modified: DateTime<Utc>,
) -> StoreResult<i64> {
    tx.execute(
        r#"
        INSERT INTO bookmark (url, title, image_url, excerpt, author,
                              min_read_time, max_read_time, modified)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            bookmark.url,
            bookmark.title,
            bookmark.image_url,
            bookmark.excerpt,
            bookmark.author,
            bookmark.min_read_time,
            bookmark.max_read_time,
            format_timestamp(&modified),
        ],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO bookmark_content (docid, title, content, html) VALUES (?, ?, ?, ?)",
        params![id, bookmark.title, bookmark.content, bookmark.html],
    )?;

    for tag in bookmark.tags.iter().filter(|t| !t.deleted) {
        let tag_id = tags::resolve(tx, &tag.name)?;
        tags::attach(tx, id, tag_id)?;
    }

    Ok(id)
}

fn update_bookmark(
    tx: &Transaction<'_>,
    bookmark: &Bookmark,
    now: DateTime<Utc>,
) -> StoreResult<Bookmark> {
    let modified = bookmark.modified.unwrap_or(now);

    let changed = tx.execute(
        r#"
        UPDATE bookmark SET
            url = ?, title = ?, image_url = ?, excerpt = ?, author = ?,
            min_read_time = ?, max_read_time = ?, modified = ?
        WHERE id = ?
        "#,
        params![
            bookmark.url,
            bookmark.title,
            bookmark.image_url,
            bookmark.excerpt,
            bookmark.author,
            bookmark.min_read_time,
            bookmark.max_read_time,
            format_timestamp(&modified),
            bookmark.id,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("bookmark {}", bookmark.id)));
    }

    tx.execute(
        r#"
        INSERT INTO bookmark_content (docid, title, content, html) VALUES (?, ?, ?, ?)
        ON CONFLICT(docid) DO UPDATE SET
            title = excluded.title, content = excluded.content, html = excluded.html
        "#,
        params![bookmark.id, bookmark.title, bookmark.content, bookmark.html],
    )?;

    let mut kept = Vec::with_capacity(bookmark.tags.len());
    for tag in &bookmark.tags {
        if tag.deleted {
            let tag_id = match tag.id {
                Some(id) => Some(id),
                None => tags::find(tx, &tag.name)?,
            };
            if let Some(tag_id) = tag_id {
                tags::detach(tx, bookmark.id, tag_id)?;
            }
            continue;
        }

        let (tag_id, name) = match tag.id {
            Some(id) => {
                let name = tags::name_of(tx, id)?
                    .ok_or_else(|| StoreError::NotFound(format!("tag {}", id)))?;
                (id, name)
            }
            None => {
                let name = tags::normalized_or_invalid(&tag.name)?;
                (tags::resolve(tx, &name)?, name)
            }
        };
        tags::attach(tx, bookmark.id, tag_id)?;
        kept.push(Tag::stored(tag_id, name));
    }

    Ok(Bookmark {
        modified: Some(modified),
        tags: kept,
        ..bookmark.clone()
    })
}

// ==================== Row helpers ====================

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a row selected with [`BOOKMARK_COLUMNS`]; tags and content are empty
pub(crate) fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    let modified: String = row.get(8)?;
    Ok(Bookmark {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        image_url: row.get(3)?,
        excerpt: row.get(4)?,
        author: row.get(5)?,
        min_read_time: row.get(6)?,
        max_read_time: row.get(7)?,
        modified: Some(parse_timestamp(8, &modified)?),
        content: String::new(),
        html: String::new(),
        tags: Vec::new(),
    })
}

/// Tags carried by a bookmark, ordered by name
pub(crate) fn tags_for_bookmark(conn: &Connection, bookmark_id: i64) -> StoreResult<Vec<Tag>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT t.id, t.name FROM tag t
        JOIN bookmark_tag bt ON t.id = bt.tag_id
        WHERE bt.bookmark_id = ?
        ORDER BY t.name
        "#,
    )?;

    let tags = stmt
        .query_map(params![bookmark_id], |row| {
            Ok(Tag::stored(row.get(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Fill in archived content; a missing content row leaves the fields empty
fn load_content(conn: &Connection, bookmark: &mut Bookmark) -> StoreResult<()> {
    let mut stmt =
        conn.prepare_cached("SELECT content, html FROM bookmark_content WHERE docid = ?")?;
    let content: Option<(String, String)> = stmt
        .query_row(params![bookmark.id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    if let Some((content, html)) = content {
        bookmark.content = content;
        bookmark.html = html;
    }
    Ok(())
}
