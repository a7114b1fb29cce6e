//! SQLite database module for the donation ledger
//!
//! ## Tables
//!
//! - `users` - permissioned user registry (parent, bits, credential hash)
//! - `barcodes` - scan code catalog (code, title, unit)
//! - `donations` - donation containers (provider, receiver, created, completed)
//! - `items` - line items owned by a donation
//!
//! Every mutating operation runs inside one `IMMEDIATE` transaction:
//! read, check, write, then re-read to confirm the write before commit.

pub mod barcodes;
pub mod donations;
pub mod items;
pub mod schema;
pub mod users;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::LedgerError;

/// SQLite database holding users, barcodes, donations and items
pub struct LedgerDb {
    conn: Mutex<Connection>,
}

impl LedgerDb {
    /// Open or create the ledger database described by `config`
    pub fn open(config: &Config) -> Result<Self, LedgerError> {
        Self::open_path(
            &config.database_path,
            Duration::from_millis(config.busy_timeout_ms),
            config.wal,
        )
    }

    /// Open or create a ledger database at `path`
    pub fn open_path(path: &Path, busy_timeout: Duration, wal: bool) -> Result<Self, LedgerError> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        debug!("Opening in-memory SQLite database");

        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read-only operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&Connection) -> Result<T, LedgerError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, LedgerError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Row counts across the ledger
    pub fn stats(&self) -> Result<DbStats, LedgerError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, LedgerError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                users: count("SELECT COUNT(*) FROM users")?,
                barcodes: count("SELECT COUNT(*) FROM barcodes")?,
                donations: count("SELECT COUNT(*) FROM donations")?,
                items: count("SELECT COUNT(*) FROM items")?,
                pending: count("SELECT COUNT(*) FROM donations WHERE completed_at IS NULL")?,
                completed: count(
                    "SELECT COUNT(*) FROM donations WHERE completed_at IS NOT NULL",
                )?,
            })
        })
    }
}

/// Begin a transaction that takes the write lock up front.
///
/// Two writers racing on the same row serialize here, so the loser's
/// state check observes the winner's committed write.
pub(crate) fn begin_write(conn: &mut Connection) -> Result<Transaction<'_>, LedgerError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub users: u64,
    pub barcodes: u64,
    pub donations: u64,
    pub items: u64,
    pub pending: u64,
    pub completed: u64,
}

// Re-exports
pub use barcodes::BarcodeEntry;
pub use donations::{CompletionState, DonationRow, ReceiverState, Role, Status};
pub use items::ItemRow;
pub use users::UserRow;
