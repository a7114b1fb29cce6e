//! Error types for donation-ledger

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Verification conflict: {0}")]
    ConflictOnVerify(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure category callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    AuthorizationDenied,
    ConflictOnVerify,
    Rejected,
    Store,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidState(_) => ErrorKind::InvalidState,
            LedgerError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            LedgerError::ConflictOnVerify(_) => ErrorKind::ConflictOnVerify,
            LedgerError::AlreadyExists(_)
            | LedgerError::InvalidInput(_)
            | LedgerError::Credential(_) => ErrorKind::Rejected,
            LedgerError::Database(_)
            | LedgerError::Io(_)
            | LedgerError::Config(_)
            | LedgerError::Internal(_) => ErrorKind::Store,
        }
    }
}
