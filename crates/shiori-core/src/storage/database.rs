//! Pooled SQLite handle and the transaction coordinator
//!
//! [`Database`] is the storage handle every component receives. It owns a
//! bounded `r2d2` pool; connections are checked out for the duration of one
//! operation and returned on every exit path by RAII.
//!
//! All writes go through [`Database::run_atomic`], multi-statement reads
//! through [`Database::read`]. Both open a scope that is tracked per thread
//! and per database, so starting a second operation on a database while one
//! is open on it fails fast instead of waiting on the pool for a connection
//! this thread already holds.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, DropBehavior, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::config::Config;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{needs_provision, provision};

/// VM instructions between deadline checks
const PROGRESS_INTERVAL: i32 = 1_000;

/// Source of [`Database`] identities; clones share their original's
static NEXT_DATABASE_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Databases with an operation open on this thread
    static OPEN_SCOPES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Shared handle to the bookmark database
#[derive(Clone)]
pub struct Database {
    id: usize,
    pool: Pool<SqliteConnectionManager>,
    config: Config,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("state", &self.pool.state())
            .finish()
    }
}

impl Database {
    /// Open or create the database under the configured data directory
    ///
    /// The schema is provisioned before the handle is returned; a failure
    /// there is fatal and surfaces as [`StoreError::Schema`].
    pub fn open(config: &Config) -> StoreResult<Self> {
        let path = config.database_path();
        debug!("Opening bookmark database at {:?}", path);

        let busy_timeout = config.busy_timeout();
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            init_connection(conn)?;
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(0))
            .connection_timeout(config.connection_timeout())
            .build(manager)?;

        Self::provisioned(pool, config.clone())
    }

    /// Open a private in-memory database
    ///
    /// An in-memory database lives inside one connection, so the pool is
    /// capped at a single connection that is never recycled.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Open a private in-memory database with explicit settings
    pub fn open_in_memory_with_config(config: Config) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_timeout(config.connection_timeout())
            .build(manager)?;

        Self::provisioned(pool, config)
    }

    fn provisioned(pool: Pool<SqliteConnectionManager>, config: Config) -> StoreResult<Self> {
        let db = Self {
            id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
            pool,
            config,
        };
        let mut conn = db.pool.get()?;
        if needs_provision(&conn) {
            let tx = conn.transaction().map_err(StoreError::Schema)?;
            provision(&tx).map_err(StoreError::Schema)?;
            tx.commit().map_err(StoreError::Schema)?;
            debug!("Provisioned bookmark schema");
        }
        drop(conn);
        Ok(db)
    }

    /// The configuration this handle was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `work` inside one transaction
    ///
    /// Commits when `work` returns `Ok`. An `Err` rolls back before the error
    /// is returned, and a panic rolls back while the transaction is dropped
    /// during unwinding. Nothing `work` wrote is visible to other connections
    /// until the commit.
    pub fn run_atomic<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let _scope = OperationScope::enter(self.id, self.config.operation_timeout())?;
        let mut conn = self.pool.get()?;

        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.set_drop_behavior(DropBehavior::Rollback);

        match work(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!("Rolling back transaction: {}", err);
                // The rollback itself must not trip an expired deadline
                clear_deadline();
                if let Err(rollback) = tx.rollback() {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(err)
            }
        }
    }

    /// Run read-only `work` against one consistent snapshot
    pub fn read<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let _scope = OperationScope::enter(self.id, self.config.operation_timeout())?;
        let mut conn = self.pool.get()?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Settings applied to every pooled connection
fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    rusqlite::vtab::array::load_module(conn)?;
    conn.progress_handler(PROGRESS_INTERVAL, Some(deadline_exceeded));
    Ok(())
}

/// Progress handler: a `true` return makes SQLite interrupt the statement
fn deadline_exceeded() -> bool {
    DEADLINE.with(|deadline| matches!(deadline.get(), Some(at) if Instant::now() >= at))
}

fn clear_deadline() {
    DEADLINE.with(|deadline| deadline.set(None));
}

/// Marks an operation on one database as open on the current thread
///
/// Operations on different databases may nest; the inner one runs under the
/// earlier of the two deadlines. Dropping the scope unregisters it and puts
/// the outer deadline back, including when the thread is unwinding from a
/// panic.
struct OperationScope {
    database: usize,
    outer_deadline: Option<Instant>,
}

impl OperationScope {
    fn enter(database: usize, timeout: Option<Duration>) -> StoreResult<Self> {
        let outer_open = OPEN_SCOPES.with(|open| {
            let mut open = open.borrow_mut();
            if open.contains(&database) {
                return Err(StoreError::NestedTransaction);
            }
            open.push(database);
            Ok(open.len() > 1)
        })?;

        let outer_deadline = if outer_open {
            DEADLINE.with(Cell::get)
        } else {
            None
        };
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (outer_deadline, own) {
            (Some(outer), Some(own)) => Some(outer.min(own)),
            (outer, own) => outer.or(own),
        };
        DEADLINE.with(|d| d.set(deadline));

        Ok(Self {
            database,
            outer_deadline,
        })
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        OPEN_SCOPES.with(|open| open.borrow_mut().retain(|&id| id != self.database));
        DEADLINE.with(|d| d.set(self.outer_deadline));
    }
}
