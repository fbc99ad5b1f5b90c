//! Unified storage interface
//!
//! The `Store` owns the pooled [`Database`] handle and routes each call to
//! the component that implements it:
//! - [`Bookmarks`] for bookmark rows, content and tag associations
//! - [`Search`] for keyword and tag queries
//! - [`tags`] for tag listing and pruning
//! - [`Accounts`] for login principals
//!
//! The schema is provisioned when the store opens.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! let mut bookmark = Bookmark::new("https://example.com", "Example");
//! bookmark.add_tag("web");
//! let id = store.insert_bookmark(&bookmark)?;
//!
//! let found = store.search_bookmarks("example", &["web"], false)?;
//! ```

use anyhow::{Context, Result};

use crate::accounts::Accounts;
use crate::bookmarks::Bookmarks;
use crate::config::Config;
use crate::models::{Account, Bookmark, TagCount};
use crate::search::{Search, SearchQuery};
use crate::storage::{self, Database, Relation, StoreResult};
use crate::tags;

/// Unified storage interface for Shiori
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Open the store described by the user's configuration file
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    ///
    /// Creates the data directory and provisions the schema if needed.
    pub fn open_with_config(config: Config) -> Result<Self> {
        config
            .ensure_data_dir()
            .context("Failed to create data directory")?;
        let db = Database::open(&config).with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database_path().display()
            )
        })?;
        Ok(Self { db })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Open a private in-memory store with specific settings
    pub fn open_in_memory_with_config(config: Config) -> Result<Self> {
        let db = Database::open_in_memory_with_config(config)
            .context("Failed to open in-memory database")?;
        Ok(Self { db })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        self.db.config()
    }

    /// The underlying database handle, for callers composing their own units
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ==================== Bookmark Operations ====================

    /// Save a new bookmark, returning its id
    pub fn insert_bookmark(&self, bookmark: &Bookmark) -> StoreResult<i64> {
        Bookmarks::new(&self.db).insert(bookmark)
    }

    /// Fetch bookmarks by id, or all of them when `ids` is empty
    pub fn get_bookmarks(&self, ids: &[i64], with_content: bool) -> StoreResult<Vec<Bookmark>> {
        Bookmarks::new(&self.db).get(ids, with_content)
    }

    /// Fetch one bookmark with its content
    pub fn get_bookmark(&self, id: i64) -> StoreResult<Option<Bookmark>> {
        Ok(self.get_bookmarks(&[id], true)?.pop())
    }

    /// Delete bookmarks by id, or all of them when `ids` is empty
    pub fn delete_bookmarks(&self, ids: &[i64]) -> StoreResult<usize> {
        Bookmarks::new(&self.db).delete(ids)
    }

    /// Apply a batch of bookmark updates atomically
    pub fn update_bookmarks(&self, bookmarks: &[Bookmark]) -> StoreResult<Vec<Bookmark>> {
        Bookmarks::new(&self.db).update(bookmarks)
    }

    /// Id of the bookmark saved under `url`, if any
    pub fn bookmark_id_by_url(&self, url: &str) -> StoreResult<Option<i64>> {
        Bookmarks::new(&self.db).id_by_url(url)
    }

    /// Search by keyword and tags
    pub fn search_bookmarks<S: AsRef<str>>(
        &self,
        keyword: &str,
        tags: &[S],
        order_latest: bool,
    ) -> StoreResult<Vec<Bookmark>> {
        let query = SearchQuery {
            keyword: keyword.to_string(),
            tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
            order_latest,
        };
        self.search(&query)
    }

    /// Run a prepared search query
    pub fn search(&self, query: &SearchQuery) -> StoreResult<Vec<Bookmark>> {
        Search::new(&self.db).run(query)
    }

    /// The id the next row of `relation` would probably get
    ///
    /// Only a hint; the real id is returned by the insert.
    pub fn next_id_hint(&self, relation: Relation) -> StoreResult<i64> {
        self.db
            .read(|conn| Ok(storage::next_id_hint(conn, relation)?))
    }

    // ==================== Tag Operations ====================

    /// Every tag with the number of bookmarks carrying it, by name
    pub fn tags_with_counts(&self) -> StoreResult<Vec<TagCount>> {
        self.db.read(tags::list_with_counts)
    }

    /// Delete tags no bookmark carries, returning how many were removed
    pub fn prune_orphan_tags(&self) -> StoreResult<usize> {
        self.db.run_atomic(tags::prune_orphans)
    }

    // ==================== Account Operations ====================

    /// Create an account with a hashed password
    pub fn create_account(&self, username: &str, password: &str) -> StoreResult<Account> {
        Accounts::new(&self.db).create(username, password)
    }

    /// Fetch an account by username
    pub fn get_account(&self, username: &str) -> StoreResult<Account> {
        Accounts::new(&self.db).get_by_username(username)
    }

    /// Accounts whose username contains `filter`
    pub fn list_accounts(&self, filter: &str) -> StoreResult<Vec<Account>> {
        Accounts::new(&self.db).list(filter)
    }

    /// Delete accounts by username, or all of them when `usernames` is empty
    pub fn delete_accounts<S: AsRef<str>>(&self, usernames: &[S]) -> StoreResult<usize> {
        Accounts::new(&self.db).delete(usernames)
    }
}
