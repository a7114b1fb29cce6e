//! Donation lifecycle operations
//!
//! ```text
//! Open ──claim──▶ Claimed ──complete──▶ Completed (terminal)
//!  ▲                │
//!  └────unclaim─────┘
//! Open ──complete──▶ Completed
//! ```
//!
//! An unclaimed receiver and an unset completion time are stored as `NULL`,
//! never as in-band marker values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;

use super::begin_write;

/// Donation row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRow {
    pub id: i64,
    pub provider_id: String,
    pub receiver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DonationRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            provider_id: row.get("provider_id")?,
            receiver_id: row.get("receiver_id")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn receiver_state(&self) -> ReceiverState {
        match &self.receiver_id {
            Some(receiver) => ReceiverState::ClaimedBy(receiver.clone()),
            None => ReceiverState::Unclaimed,
        }
    }

    pub fn completion_state(&self) -> CompletionState {
        match self.completed_at {
            Some(at) => CompletionState::CompletedAt(at),
            None => CompletionState::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Who, if anyone, has claimed a donation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverState {
    Unclaimed,
    ClaimedBy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    CompletedAt(DateTime<Utc>),
}

/// Which participant column a query matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Receiver,
}

impl Role {
    fn column(self) -> &'static str {
        match self {
            Role::Provider => "provider_id",
            Role::Receiver => "receiver_id",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(Role::Provider),
            "receiver" => Ok(Role::Receiver),
            other => Err(format!("unknown role '{other}' (expected provider or receiver)")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => write!(f, "provider"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Completion filter for donation queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Completed,
}

impl Status {
    fn predicate(self) -> &'static str {
        match self {
            Status::Pending => "completed_at IS NULL",
            Status::Completed => "completed_at IS NOT NULL",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            other => Err(format!("unknown status '{other}' (expected pending or completed)")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Completed => write!(f, "completed"),
        }
    }
}

/// Current time at the precision stored and compared on read-back
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Get donation by ID
pub fn get_donation(conn: &Connection, id: i64) -> Result<Option<DonationRow>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT * FROM donations WHERE id = ?",
            params![id],
            DonationRow::from_row,
        )
        .optional()?)
}

pub fn donation_exists(conn: &Connection, id: i64) -> Result<bool, LedgerError> {
    Ok(get_donation(conn, id)?.is_some())
}

fn require_donation(conn: &Connection, id: i64) -> Result<DonationRow, LedgerError> {
    get_donation(conn, id)?.ok_or_else(|| LedgerError::NotFound(format!("donation {id}")))
}

/// Create a donation, optionally pre-assigned to a receiver
pub fn create_donation(
    conn: &mut Connection,
    provider_id: &str,
    receiver_id: Option<&str>,
) -> Result<DonationRow, LedgerError> {
    if provider_id.is_empty() {
        return Err(LedgerError::InvalidInput("provider_id is required".into()));
    }
    if receiver_id == Some("") {
        return Err(LedgerError::InvalidInput("receiver_id must not be empty".into()));
    }

    let tx = begin_write(conn)?;
    let created_at = now();

    tx.execute(
        "INSERT INTO donations (provider_id, receiver_id, created_at) VALUES (?, ?, ?)",
        params![provider_id, receiver_id, created_at],
    )?;
    let id = tx.last_insert_rowid();

    let donation = get_donation(&tx, id)?
        .ok_or_else(|| LedgerError::ConflictOnVerify(format!("donation {id} missing after insert")))?;

    tx.commit()?;
    info!(donation_id = id, provider = %provider_id, receiver = ?receiver_id, "Donation created");

    Ok(donation)
}

/// Assign `receiver_id` to an open donation
pub fn claim_donation(
    conn: &mut Connection,
    id: i64,
    receiver_id: &str,
) -> Result<DonationRow, LedgerError> {
    if receiver_id.is_empty() {
        return Err(LedgerError::InvalidInput("receiver_id is required".into()));
    }

    let tx = begin_write(conn)?;
    let current = require_donation(&tx, id)?;

    if current.is_completed() {
        return Err(LedgerError::InvalidState(format!("donation {id} is completed")));
    }
    if let Some(holder) = &current.receiver_id {
        return Err(LedgerError::InvalidState(format!(
            "donation {id} already claimed by {holder}"
        )));
    }

    tx.execute(
        "UPDATE donations SET receiver_id = ?
         WHERE id = ? AND receiver_id IS NULL AND completed_at IS NULL",
        params![receiver_id, id],
    )?;

    let updated = require_donation(&tx, id)?;
    if updated.receiver_id.as_deref() != Some(receiver_id) {
        return Err(LedgerError::ConflictOnVerify(format!(
            "donation {id} receiver is {:?} after claim by {receiver_id}",
            updated.receiver_id
        )));
    }

    tx.commit()?;
    info!(donation_id = id, receiver = %receiver_id, "Donation claimed");

    Ok(updated)
}

/// Release a claim; only the current claimant may do so
pub fn unclaim_donation(
    conn: &mut Connection,
    id: i64,
    receiver_id: &str,
) -> Result<DonationRow, LedgerError> {
    let tx = begin_write(conn)?;
    let current = require_donation(&tx, id)?;

    if current.is_completed() {
        return Err(LedgerError::InvalidState(format!("donation {id} is completed")));
    }
    if current.receiver_id.as_deref() != Some(receiver_id) {
        return Err(LedgerError::InvalidState(format!(
            "donation {id} is not claimed by {receiver_id}"
        )));
    }

    tx.execute(
        "UPDATE donations SET receiver_id = NULL
         WHERE id = ? AND receiver_id = ? AND completed_at IS NULL",
        params![id, receiver_id],
    )?;

    let updated = require_donation(&tx, id)?;
    if updated.receiver_id.is_some() {
        return Err(LedgerError::ConflictOnVerify(format!(
            "donation {id} still claimed after unclaim"
        )));
    }

    tx.commit()?;
    info!(donation_id = id, receiver = %receiver_id, "Donation unclaimed");

    Ok(updated)
}

/// Stamp the completion time; a completed donation never changes again
pub fn complete_donation(conn: &mut Connection, id: i64) -> Result<DonationRow, LedgerError> {
    let tx = begin_write(conn)?;
    let current = require_donation(&tx, id)?;

    if let Some(at) = current.completed_at {
        return Err(LedgerError::InvalidState(format!(
            "donation {id} already completed at {at}"
        )));
    }

    let completed_at = now();
    tx.execute(
        "UPDATE donations SET completed_at = ? WHERE id = ? AND completed_at IS NULL",
        params![completed_at, id],
    )?;

    let updated = require_donation(&tx, id)?;
    if updated.completed_at != Some(completed_at) {
        return Err(LedgerError::ConflictOnVerify(format!(
            "donation {id} completed_at is {:?}, wrote {completed_at}",
            updated.completed_at
        )));
    }

    tx.commit()?;
    info!(donation_id = id, completed_at = %completed_at, "Donation completed");

    Ok(updated)
}

/// Delete a donation and every item it owns in one transaction
///
/// Returns the number of items removed.
pub fn delete_donation(conn: &mut Connection, id: i64) -> Result<u64, LedgerError> {
    let tx = begin_write(conn)?;
    require_donation(&tx, id)?;

    let items_removed = tx.execute("DELETE FROM items WHERE donation_id = ?", params![id])?;
    tx.execute("DELETE FROM donations WHERE id = ?", params![id])?;

    let donations_left: i64 =
        tx.query_row("SELECT COUNT(*) FROM donations WHERE id = ?", params![id], |row| row.get(0))?;
    let items_left: i64 = tx.query_row(
        "SELECT COUNT(*) FROM items WHERE donation_id = ?",
        params![id],
        |row| row.get(0),
    )?;
    if donations_left != 0 || items_left != 0 {
        return Err(LedgerError::ConflictOnVerify(format!(
            "donation {id} delete left {donations_left} donation rows and {items_left} items"
        )));
    }

    tx.commit()?;
    info!(donation_id = id, items_removed, "Donation deleted");

    Ok(items_removed as u64)
}

/// Donations where `user_id` fills `role`, filtered by completion status
pub fn list_donations(
    conn: &Connection,
    user_id: &str,
    role: Role,
    status: Status,
) -> Result<Vec<DonationRow>, LedgerError> {
    let sql = format!(
        "SELECT * FROM donations WHERE {} = ? AND {} ORDER BY id",
        role.column(),
        status.predicate()
    );
    debug!("Executing query: {}", sql);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id], DonationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Open donations any receiver may claim
pub fn list_unclaimed(conn: &Connection) -> Result<Vec<DonationRow>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM donations WHERE receiver_id IS NULL AND completed_at IS NULL ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], DonationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn provider_pending(conn: &Connection, user_id: &str) -> Result<Vec<DonationRow>, LedgerError> {
    list_donations(conn, user_id, Role::Provider, Status::Pending)
}

pub fn provider_completed(conn: &Connection, user_id: &str) -> Result<Vec<DonationRow>, LedgerError> {
    list_donations(conn, user_id, Role::Provider, Status::Completed)
}

pub fn receiver_pending(conn: &Connection, user_id: &str) -> Result<Vec<DonationRow>, LedgerError> {
    list_donations(conn, user_id, Role::Receiver, Status::Pending)
}

pub fn receiver_completed(conn: &Connection, user_id: &str) -> Result<Vec<DonationRow>, LedgerError> {
    list_donations(conn, user_id, Role::Receiver, Status::Completed)
}
