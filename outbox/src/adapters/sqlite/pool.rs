use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::types::error::OutboxError;

// Shorthand so callers don't have to spell out Pool<SqliteConnectionManager>.
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

pub fn create_pool(db_path: &Path) -> Result<DbPool, OutboxError> {
    let manager = SqliteConnectionManager::file(db_path);

    let pool = Pool::builder()
        .max_size(4)
        .build(manager)?;

    let conn = pool.get()?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;"
    )?;

    Ok(pool)
}

/// Single-connection pool over a private in-memory database.
///
/// Each new connection to `:memory:` would see an empty database, so the
/// pool must never grow past one or recycle its connection.
pub fn create_memory_pool() -> Result<DbPool, OutboxError> {
    let manager = SqliteConnectionManager::memory();

    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;

    Ok(pool)
}
