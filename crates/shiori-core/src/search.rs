//! Keyword and tag search
//!
//! A keyword matches when the url contains it or the archived title/text
//! full-text-matches it. Tag filters are an intersection: a bookmark must
//! carry every requested tag. Both filters combine with AND.

use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::ToSql;

use crate::bookmarks::{bookmark_from_row, tags_for_bookmark, BOOKMARK_COLUMNS};
use crate::models::Bookmark;
use crate::storage::{Database, StoreError, StoreResult};
use crate::tags::normalized_or_invalid;

const KEYWORD_FILTER: &str = r#"
    AND (url LIKE :pattern ESCAPE '\'
         OR id IN (SELECT rowid FROM bookmark_content_fts
                   WHERE bookmark_content_fts MATCH :fts))"#;

const TAG_FILTER: &str = r#"
    AND id IN (SELECT bt.bookmark_id FROM bookmark_tag bt
               JOIN tag t ON t.id = bt.tag_id
               WHERE t.name IN rarray(:tags)
               GROUP BY bt.bookmark_id
               HAVING COUNT(DISTINCT bt.tag_id) = :tag_count)"#;

/// What to look for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub tags: Vec<String>,
    /// Newest (highest id) first instead of insertion order
    pub order_latest: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn latest_first(mut self) -> Self {
        self.order_latest = true;
        self
    }

    /// Requested tags, normalized and without duplicates
    ///
    /// A blank name is rejected: no bookmark can carry one, and dropping it
    /// would widen the filter instead of narrowing it.
    fn distinct_tags(&self) -> StoreResult<Vec<String>> {
        let mut tags = self
            .tags
            .iter()
            .map(|t| normalized_or_invalid(t))
            .collect::<StoreResult<Vec<_>>>()?;
        tags.sort();
        tags.dedup();
        Ok(tags)
    }
}

/// Search over a shared database handle
pub struct Search<'a> {
    db: &'a Database,
}

impl<'a> Search<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Run `query`; results carry their tags but not their content
    pub fn run(&self, query: &SearchQuery) -> StoreResult<Vec<Bookmark>> {
        if query.keyword.contains('\0') {
            return Err(StoreError::validation("keyword", "must not contain NUL"));
        }
        let keyword = query.keyword.trim();
        let tags = query.distinct_tags()?;

        let mut sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmark WHERE 1");
        let pattern = format!("%{}%", escape_like(keyword));
        let fts = fts_query(keyword);
        let tag_set: Rc<Vec<Value>> = Rc::new(tags.iter().cloned().map(Value::from).collect());
        let tag_count = tags.len() as i64;

        let mut params: Vec<(&str, &dyn ToSql)> = Vec::new();
        if !keyword.is_empty() {
            sql.push_str(KEYWORD_FILTER);
            params.push((":pattern", &pattern));
            params.push((":fts", &fts));
        }
        if !tags.is_empty() {
            sql.push_str(TAG_FILTER);
            params.push((":tags", &tag_set));
            params.push((":tag_count", &tag_count));
        }
        sql.push_str(if query.order_latest {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id"
        });

        self.db.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut bookmarks = stmt
                .query_map(params.as_slice(), bookmark_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            for bookmark in &mut bookmarks {
                bookmark.tags = tags_for_bookmark(conn, bookmark.id)?;
            }
            Ok(bookmarks)
        })
    }
}

/// Escape LIKE metacharacters so the keyword matches literally
pub(crate) fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Turn free text into an FTS5 query matching any of its words
///
/// Every term is quoted, so operators and punctuation in user input are
/// searched for rather than parsed.
fn fts_query(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::Bookmarks;
    use crate::storage::ErrorKind;

    fn seeded() -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let store = Bookmarks::new(&db);

        let mut ids = Vec::new();
        let mut rust = Bookmark::new("https://rust-lang.org", "Rust");
        rust.add_tag("a");
        rust.add_tag("b");
        rust.set_content("A language empowering everyone to build reliable software", "");
        ids.push(store.insert(&rust).unwrap());

        let mut go = Bookmark::new("https://go.dev", "Go");
        go.add_tag("a");
        go.set_content("Build simple, secure, scalable systems", "");
        ids.push(store.insert(&go).unwrap());

        let mut zig = Bookmark::new("https://ziglang.org", "Zig");
        zig.add_tag("b");
        zig.add_tag("c");
        ids.push(store.insert(&zig).unwrap());

        (db, ids)
    }

    fn ids(results: &[Bookmark]) -> Vec<i64> {
        results.iter().map(|b| b.id).collect()
    }

    #[test]
    fn test_empty_query_returns_everything_in_id_order() {
        let (db, inserted) = seeded();
        let results = Search::new(&db).run(&SearchQuery::new()).unwrap();
        assert_eq!(ids(&results), inserted);
    }

    #[test]
    fn test_order_latest() {
        let (db, mut inserted) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().latest_first())
            .unwrap();
        inserted.reverse();
        assert_eq!(ids(&results), inserted);
    }

    #[test]
    fn test_tags_intersect() {
        let (db, inserted) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().tag("a").tag("b"))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[0]]);
        assert_eq!(results[0].tag_names(), vec!["a", "b"]);
        assert!(results[0].content.is_empty());
    }

    #[test]
    fn test_tags_are_normalized_and_deduplicated() {
        let (db, inserted) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().tag(" B ").tag("b").tag("C"))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[2]]);
    }

    #[test]
    fn test_unknown_tag_matches_nothing() {
        let (db, _) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().tag("a").tag("missing"))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_blank_tag_is_rejected() {
        let (db, _) = seeded();
        let search = Search::new(&db);

        let err = search.run(&SearchQuery::new().tag("  ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "tag", .. }));

        let err = search
            .run(&SearchQuery::new().tag("a").tag(""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_keyword_with_nul_is_rejected() {
        let (db, _) = seeded();
        let search = Search::new(&db);

        for keyword in ["\0", "rust\0lang"] {
            let err = search.run(&SearchQuery::new().keyword(keyword)).unwrap_err();
            assert!(matches!(err, StoreError::Validation { field: "keyword", .. }));
        }
    }

    #[test]
    fn test_keyword_matches_url_substring() {
        let (db, inserted) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().keyword("  ziglang "))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[2]]);
    }

    #[test]
    fn test_keyword_matches_content() {
        let (db, inserted) = seeded();
        let results = Search::new(&db)
            .run(&SearchQuery::new().keyword("scalable"))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[1]]);

        let results = Search::new(&db)
            .run(&SearchQuery::new().keyword("Reliable"))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[0]]);
    }

    #[test]
    fn test_keyword_and_tags_combine() {
        let (db, inserted) = seeded();
        let search = Search::new(&db);

        let results = search
            .run(&SearchQuery::new().keyword("build").tag("a"))
            .unwrap();
        assert_eq!(ids(&results), vec![inserted[0], inserted[1]]);

        let results = search
            .run(&SearchQuery::new().keyword("build").tag("c"))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_keyword_metacharacters_are_literal() {
        let (db, _) = seeded();
        let search = Search::new(&db);

        assert!(search.run(&SearchQuery::new().keyword("%")).unwrap().is_empty());
        assert!(search.run(&SearchQuery::new().keyword("_")).unwrap().is_empty());
        assert!(search
            .run(&SearchQuery::new().keyword("\"AND (* NEAR"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_example_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let store = Bookmarks::new(&db);
        let search = Search::new(&db);

        let id = store
            .insert(&Bookmark::new("https://example.com", "Example"))
            .unwrap();
        assert_eq!(id, 1);

        let results = search.run(&SearchQuery::new().keyword("example")).unwrap();
        assert_eq!(ids(&results), vec![1]);

        store.delete(&[1]).unwrap();
        assert!(search
            .run(&SearchQuery::new().keyword("example"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("rust  lang"), "\"rust\" OR \"lang\"");
        assert_eq!(fts_query("say \"hi\""), "\"say\" OR \"\"\"hi\"\"\"");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
