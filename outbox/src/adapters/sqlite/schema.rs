use rusqlite::Connection;

use crate::types::error::OutboxError;

pub fn initialize_schema(conn: &Connection) -> Result<(), OutboxError> {
    conn.execute_batch("
        -- One serialized JSON array per record domain
        -- (scheduled_emails, offline_emails, followups, tracking).
        CREATE TABLE IF NOT EXISTS domain_records (
            domain          TEXT PRIMARY KEY,
            payload         TEXT NOT NULL,      -- JSON array, instants as ISO-8601 strings
            updated_at      INTEGER NOT NULL    -- unix epoch ms
        );
    ")?;

    Ok(())
}
