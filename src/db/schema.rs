//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::LedgerError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), LedgerError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, LedgerError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), LedgerError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute_batch(LEDGER_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), LedgerError> {
    // Only v1 exists; older versions are recreated table by table.
    info!(from_version, "No migration steps registered, creating missing tables");
    create_tables(conn)?;
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Ledger tables
const LEDGER_SCHEMA: &str = r#"
-- parent_id is the user_id of the authorizing account
-- permissions is the 4-bit capability field (admin, org, provider, receiver)
CREATE TABLE IF NOT EXISTS users (
    parent_id TEXT NOT NULL,
    permissions INTEGER NOT NULL,
    user_id TEXT NOT NULL UNIQUE,
    credential_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS barcodes (
    code TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    unit TEXT NOT NULL
);

-- receiver_id NULL: unclaimed; completed_at NULL: not completed
CREATE TABLE IF NOT EXISTS donations (
    id INTEGER PRIMARY KEY,
    provider_id TEXT NOT NULL,
    receiver_id TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    donation_id INTEGER NOT NULL,
    barcode TEXT,
    title TEXT NOT NULL,
    count INTEGER NOT NULL CHECK (count > 0),
    unit TEXT NOT NULL,

    FOREIGN KEY (donation_id) REFERENCES donations(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_parent_id ON users(parent_id);

CREATE INDEX IF NOT EXISTS idx_donations_provider ON donations(provider_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_donations_receiver ON donations(receiver_id, completed_at);

CREATE INDEX IF NOT EXISTS idx_items_donation_id ON items(donation_id);
CREATE INDEX IF NOT EXISTS idx_items_merge_key ON items(donation_id, title, unit);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'barcodes', 'donations', 'items')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }
}
