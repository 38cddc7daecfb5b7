use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use super::pool::{create_memory_pool, create_pool, DbConnection, DbPool};
use super::schema::initialize_schema;
use crate::store::StorageBackend;
use crate::types::error::OutboxError;

/// Record store backend keeping each domain as one row in SQLite
pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening record store at {:?}", path);
        let pool = create_pool(path)?;
        let backend = Self { pool };
        let conn = backend.connection()?;
        initialize_schema(&conn)?;
        Ok(backend)
    }

    /// Create an in-memory database (tests, ephemeral hosts)
    pub fn in_memory() -> Result<Self, OutboxError> {
        let pool = create_memory_pool()?;
        let backend = Self { pool };
        let conn = backend.connection()?;
        initialize_schema(&conn)?;
        Ok(backend)
    }

    fn connection(&self) -> Result<DbConnection, OutboxError> {
        self.pool
            .get()
            .map_err(|e| {
                OutboxError::Storage(format!("Failed to get record store connection: {}", e))
            })
    }
}

impl StorageBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<String>, OutboxError> {
        let conn = self.connection()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM domain_records WHERE domain = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(payload)
    }

    fn write(&self, key: &str, payload: &str) -> Result<(), OutboxError> {
        let conn = self.connection()?;
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT OR REPLACE INTO domain_records (domain, payload, updated_at)
             VALUES (?1, ?2, ?3)",
            params![key, payload, now],
        )?;

        debug!("Persisted domain '{}' ({} bytes)", key, payload.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_domain_reads_none() {
        let backend = SqliteBackend::in_memory().expect("Failed to create database");
        assert_eq!(backend.read("followups").expect("Failed to read"), None);
    }

    #[test]
    fn test_write_replaces_previous_payload() {
        let backend = SqliteBackend::in_memory().expect("Failed to create database");

        backend.write("tracking", "[1]").expect("Failed to write");
        backend.write("tracking", "[1,2]").expect("Failed to overwrite");

        assert_eq!(
            backend.read("tracking").expect("Failed to read").as_deref(),
            Some("[1,2]")
        );
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("outbox.db");

        {
            let backend = SqliteBackend::open(&path).expect("Failed to open");
            backend.write("offline_emails", "[]").expect("Failed to write");
        }

        let reopened = SqliteBackend::open(&path).expect("Failed to reopen");
        assert_eq!(
            reopened.read("offline_emails").expect("Failed to read").as_deref(),
            Some("[]")
        );
    }
}
