//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS call_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            call_id TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            user_id TEXT,
            outcome TEXT NOT NULL,
            exception TEXT,
            stack_trace TEXT,
            started_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_call_log_endpoint ON call_log(endpoint, method);

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}

/// Track call duration
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        ALTER TABLE call_log ADD COLUMN duration_ms INTEGER NOT NULL DEFAULT 0;

        CREATE INDEX IF NOT EXISTS idx_call_log_started ON call_log(started_at);

        PRAGMA user_version = 2;
        ",
    )?;

    Ok(())
}
