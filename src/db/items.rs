//! Item ledger operations
//!
//! `(donation_id, title, unit)` is the merge key: adding goods that match an
//! existing line on the same donation increases that line's count instead of
//! inserting a second row.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;

use super::{barcodes, begin_write, donations};

/// Item row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: i64,
    pub donation_id: i64,
    pub barcode: Option<String>,
    pub title: String,
    pub count: u32,
    pub unit: String,
}

impl ItemRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            donation_id: row.get("donation_id")?,
            barcode: row.get("barcode")?,
            title: row.get("title")?,
            count: row.get("count")?,
            unit: row.get("unit")?,
        })
    }
}

/// Get an item that belongs to `donation_id`
pub fn get_item(
    conn: &Connection,
    donation_id: i64,
    item_id: i64,
) -> Result<Option<ItemRow>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT * FROM items WHERE id = ? AND donation_id = ?",
            params![item_id, donation_id],
            ItemRow::from_row,
        )
        .optional()?)
}

pub fn item_exists(conn: &Connection, item_id: i64) -> Result<bool, LedgerError> {
    Ok(conn
        .query_row("SELECT 1 FROM items WHERE id = ?", params![item_id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// All items under a donation, in insertion order
pub fn list_items(conn: &Connection, donation_id: i64) -> Result<Vec<ItemRow>, LedgerError> {
    let mut stmt = conn.prepare("SELECT * FROM items WHERE donation_id = ? ORDER BY id")?;
    let items = stmt
        .query_map(params![donation_id], ItemRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn find_by_merge_key(
    conn: &Connection,
    donation_id: i64,
    title: &str,
    unit: &str,
) -> Result<Option<ItemRow>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT * FROM items WHERE donation_id = ? AND title = ? AND unit = ? ORDER BY id LIMIT 1",
            params![donation_id, title, unit],
            ItemRow::from_row,
        )
        .optional()?)
}

/// Increment the matching line or insert a new one, then confirm the count.
///
/// A scanned `barcode` is recorded on the row in both cases.
fn merge_or_insert(
    conn: &Connection,
    donation_id: i64,
    title: &str,
    unit: &str,
    count: u32,
    barcode: Option<&str>,
) -> Result<ItemRow, LedgerError> {
    let (item_id, expected) = match find_by_merge_key(conn, donation_id, title, unit)? {
        Some(existing) => {
            let total = existing.count.checked_add(count).ok_or_else(|| {
                LedgerError::InvalidInput(format!("count overflow on item {}", existing.id))
            })?;
            match barcode {
                Some(code) => conn.execute(
                    "UPDATE items SET count = ?, barcode = ? WHERE id = ?",
                    params![total, code, existing.id],
                )?,
                None => conn.execute(
                    "UPDATE items SET count = ? WHERE id = ?",
                    params![total, existing.id],
                )?,
            };
            debug!(item_id = existing.id, from = existing.count, to = total, "Merged item");
            (existing.id, total)
        }
        None => {
            conn.execute(
                "INSERT INTO items (donation_id, barcode, title, count, unit) VALUES (?, ?, ?, ?, ?)",
                params![donation_id, barcode, title, count, unit],
            )?;
            (conn.last_insert_rowid(), count)
        }
    };

    let stored = get_item(conn, donation_id, item_id)?
        .ok_or_else(|| LedgerError::ConflictOnVerify(format!("item {item_id} missing after write")))?;
    if stored.count != expected {
        return Err(LedgerError::ConflictOnVerify(format!(
            "item {item_id} has count {} after writing {expected}",
            stored.count
        )));
    }

    Ok(stored)
}

fn require_donation(conn: &Connection, donation_id: i64) -> Result<(), LedgerError> {
    if donations::donation_exists(conn, donation_id)? {
        Ok(())
    } else {
        Err(LedgerError::NotFound(format!("donation {donation_id}")))
    }
}

/// Add goods by hand
pub fn add_item_manual(
    conn: &mut Connection,
    donation_id: i64,
    title: &str,
    count: u32,
    unit: &str,
) -> Result<ItemRow, LedgerError> {
    if title.is_empty() || unit.is_empty() {
        return Err(LedgerError::InvalidInput("title and unit are required".into()));
    }
    if count == 0 {
        return Err(LedgerError::InvalidInput("count must be positive".into()));
    }

    let tx = begin_write(conn)?;
    require_donation(&tx, donation_id)?;

    let item = merge_or_insert(&tx, donation_id, title, unit, count, None)?;

    tx.commit()?;
    info!(donation_id, item_id = item.id, title = %title, count = item.count, "Item added");

    Ok(item)
}

/// Units a scan adds: anything below one is a single scan
pub fn scan_count(count: i64) -> Result<u32, LedgerError> {
    u32::try_from(count.max(1))
        .map_err(|_| LedgerError::InvalidInput(format!("count {count} out of range")))
}

/// Add goods from a scanned code
///
/// A `count` below one means a single scan, counted as one unit.
pub fn add_item_by_scan(
    conn: &mut Connection,
    donation_id: i64,
    code: &str,
    count: i64,
) -> Result<ItemRow, LedgerError> {
    let count = scan_count(count)?;

    let tx = begin_write(conn)?;
    require_donation(&tx, donation_id)?;

    let entry = barcodes::lookup_barcode(&tx, code)?
        .ok_or_else(|| LedgerError::NotFound(format!("barcode {code}")))?;

    let item = merge_or_insert(&tx, donation_id, &entry.title, &entry.unit, count, Some(code))?;

    tx.commit()?;
    info!(donation_id, item_id = item.id, code = %code, count = item.count, "Item scanned");

    Ok(item)
}

/// Set an item's count, deleting the row when `new_count` is zero
///
/// Returns the updated row, or `None` when the item was removed.
pub fn edit_item(
    conn: &mut Connection,
    donation_id: i64,
    item_id: i64,
    new_count: u32,
) -> Result<Option<ItemRow>, LedgerError> {
    let tx = begin_write(conn)?;

    if get_item(&tx, donation_id, item_id)?.is_none() {
        return Err(LedgerError::NotFound(format!(
            "item {item_id} in donation {donation_id}"
        )));
    }

    let result = if new_count == 0 {
        tx.execute(
            "DELETE FROM items WHERE id = ? AND donation_id = ?",
            params![item_id, donation_id],
        )?;
        if get_item(&tx, donation_id, item_id)?.is_some() {
            return Err(LedgerError::ConflictOnVerify(format!(
                "item {item_id} still present after delete"
            )));
        }
        None
    } else {
        tx.execute(
            "UPDATE items SET count = ? WHERE id = ? AND donation_id = ?",
            params![new_count, item_id, donation_id],
        )?;
        let stored = get_item(&tx, donation_id, item_id)?.ok_or_else(|| {
            LedgerError::ConflictOnVerify(format!("item {item_id} missing after update"))
        })?;
        if stored.count != new_count {
            return Err(LedgerError::ConflictOnVerify(format!(
                "item {item_id} has count {} after writing {new_count}",
                stored.count
            )));
        }
        Some(stored)
    };

    tx.commit()?;
    info!(donation_id, item_id, new_count, "Item edited");

    Ok(result)
}
