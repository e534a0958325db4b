//! Pooled connections to the metadata store.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{MigratorError, Result};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ConnectionFactory {
    pool: DbPool,
}

impl ConnectionFactory {
    pub fn open(db_path: impl AsRef<Path>, pool_size: u32) -> Result<Self> {
        let db_path = db_path.as_ref();
        let manager = SqliteConnectionManager::file(db_path).with_init(configure_pragmas);
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        debug!(path = %db_path.display(), pool_size, "opened connection pool");
        Ok(Self { pool })
    }

    /// Single-connection pool over a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(configure_pragmas);
        let pool = Pool::builder().max_size(1).build(manager)?;
        Ok(Self { pool })
    }

    pub fn acquire(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Checks that `name` can be interpolated into SQL as a table name or prefix.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(MigratorError::Config(format!(
            "{:?} is not a valid SQL identifier",
            name
        )))
    }
}

/// Configure SQLite PRAGMA settings for every pooled connection.
/// - WAL mode: lookups keep running while a migration step writes
/// - NORMAL synchronous: good durability with better performance
/// - busy timeout: wait for the external writer instead of failing fast
fn configure_pragmas(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)
}
