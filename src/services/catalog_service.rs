//! Catalog service - barcode registration and lookup

use std::sync::Arc;

use crate::auth::Capability;
use crate::db::barcodes::{self, BarcodeEntry};
use crate::db::LedgerDb;
use crate::error::LedgerError;

use super::events::{EventBus, LedgerEvent};
use super::session::Session;

pub struct CatalogService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
}

impl CatalogService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn lookup(&self, code: &str) -> Result<Option<BarcodeEntry>, LedgerError> {
        self.db.with_conn(|conn| barcodes::lookup_barcode(conn, code))
    }

    pub fn list(&self) -> Result<Vec<BarcodeEntry>, LedgerError> {
        self.db.with_conn(barcodes::list_barcodes)
    }

    /// Add a catalog entry; admins and organizations only
    pub fn register(
        &self,
        session: &Session,
        code: &str,
        title: &str,
        unit: &str,
    ) -> Result<BarcodeEntry, LedgerError> {
        session.require_any(&[Capability::Admin, Capability::Organization])?;

        let entry = self
            .db
            .with_conn_mut(|conn| barcodes::register_barcode(conn, code, title, unit))?;

        self.events.emit(LedgerEvent::BarcodeRegistered {
            code: entry.code.clone(),
        });

        Ok(entry)
    }
}
