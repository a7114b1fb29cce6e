//! Barcode catalog: scan code to canonical title and unit
//!
//! Codes are write-once; there is no update path.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LedgerError;

use super::begin_write;

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeEntry {
    pub code: String,
    pub title: String,
    pub unit: String,
}

impl BarcodeEntry {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            code: row.get("code")?,
            title: row.get("title")?,
            unit: row.get("unit")?,
        })
    }
}

/// Resolve a scan code
pub fn lookup_barcode(conn: &Connection, code: &str) -> Result<Option<BarcodeEntry>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT * FROM barcodes WHERE code = ?",
            params![code],
            BarcodeEntry::from_row,
        )
        .optional()?)
}

pub fn barcode_exists(conn: &Connection, code: &str) -> Result<bool, LedgerError> {
    Ok(lookup_barcode(conn, code)?.is_some())
}

pub fn list_barcodes(conn: &Connection) -> Result<Vec<BarcodeEntry>, LedgerError> {
    let mut stmt = conn.prepare("SELECT * FROM barcodes ORDER BY code")?;
    let entries = stmt
        .query_map([], BarcodeEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Add a new catalog entry; fails if the code is already registered
pub fn register_barcode(
    conn: &mut Connection,
    code: &str,
    title: &str,
    unit: &str,
) -> Result<BarcodeEntry, LedgerError> {
    if code.is_empty() || title.is_empty() || unit.is_empty() {
        return Err(LedgerError::InvalidInput(
            "code, title and unit are required".into(),
        ));
    }

    let tx = begin_write(conn)?;

    if barcode_exists(&tx, code)? {
        return Err(LedgerError::AlreadyExists(format!("barcode {code}")));
    }

    tx.execute(
        "INSERT INTO barcodes (code, title, unit) VALUES (?, ?, ?)",
        params![code, title, unit],
    )?;

    let entry = lookup_barcode(&tx, code)?
        .ok_or_else(|| LedgerError::ConflictOnVerify(format!("barcode {code} missing after insert")))?;

    tx.commit()?;
    info!(code = %code, title = %title, unit = %unit, "Barcode registered");

    Ok(entry)
}
