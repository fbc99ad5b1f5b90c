//! Shiori Core Library
//!
//! The storage engine behind Shiori, a bookmark manager. It owns every piece
//! of persistent state: bookmarks, their archived content, tags, the
//! bookmark/tag association and user accounts, all in one SQLite database.
//!
//! # Architecture
//!
//! - **SQLite** (via a bounded r2d2 pool): single source of truth
//! - **FTS5**: full-text index over archived titles and text, kept in sync
//!   by triggers
//!
//! Every write runs in one immediate transaction that rolls back on any
//! error or panic, so a bookmark is never visible without its content and
//! tags.
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! let mut bookmark = Bookmark::new("https://example.com", "Example");
//! bookmark.add_tag("web");
//! let id = store.insert_bookmark(&bookmark)?;
//!
//! let results = store.search(&SearchQuery::new().keyword("example"))?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `bookmarks`: Bookmark, content and association writes
//! - `search`: Keyword and tag-intersection queries
//! - `tags`: Tag normalization, resolution and counts
//! - `accounts`: Login accounts
//! - `password`: Password hashing
//! - `models`: Data structures for bookmarks, tags and accounts
//! - `storage`: Connection pool, transactions and schema
//! - `config`: Engine configuration

pub mod accounts;
pub mod bookmarks;
pub mod config;
pub mod models;
pub mod password;
pub mod search;
pub mod storage;
pub mod store;
pub mod tags;

pub use accounts::Accounts;
pub use bookmarks::Bookmarks;
pub use config::Config;
pub use models::{Account, Bookmark, Tag, TagCount};
pub use search::{Search, SearchQuery};
pub use storage::{Database, ErrorKind, Membership, Relation, StoreError, StoreResult};
pub use store::Store;
