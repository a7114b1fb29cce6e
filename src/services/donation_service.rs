//! Donation service - authorized lifecycle and item operations
//!
//! | Operation | Allowed for |
//! |-----------|-------------|
//! | create | Provider (becomes the provider) |
//! | add/scan/edit items, delete | the donation's provider, or Admin |
//! | claim, unclaim | Receiver (acts as the claimant) |
//! | complete | the provider, the current receiver, or Admin |
//! | unclaimed | Receiver or Admin |

use std::sync::Arc;

use tracing::warn;

use crate::auth::Capability;
use crate::db::donations::{self, DonationRow, Role, Status};
use crate::db::items::{self, ItemRow};
use crate::db::LedgerDb;
use crate::error::LedgerError;

use super::events::{EventBus, LedgerEvent};
use super::session::Session;

pub struct DonationService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
}

impl DonationService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: i64) -> Result<Option<DonationRow>, LedgerError> {
        self.db.with_conn(|conn| donations::get_donation(conn, id))
    }

    fn require(&self, id: i64) -> Result<DonationRow, LedgerError> {
        self.get(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("donation {id}")))
    }

    /// The session user's donations in `role`, filtered by `status`
    pub fn list(
        &self,
        session: &Session,
        role: Role,
        status: Status,
    ) -> Result<Vec<DonationRow>, LedgerError> {
        self.db
            .with_conn(|conn| donations::list_donations(conn, &session.user_id, role, status))
    }

    pub fn unclaimed(&self, session: &Session) -> Result<Vec<DonationRow>, LedgerError> {
        session.require_any(&[Capability::Receiver, Capability::Admin])?;
        self.db.with_conn(donations::list_unclaimed)
    }

    pub fn items(&self, donation_id: i64) -> Result<Vec<ItemRow>, LedgerError> {
        self.db.with_conn(|conn| items::list_items(conn, donation_id))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn create(
        &self,
        session: &Session,
        receiver_id: Option<&str>,
    ) -> Result<DonationRow, LedgerError> {
        session.require(Capability::Provider)?;

        let donation = self.db.with_conn_mut(|conn| {
            donations::create_donation(conn, &session.user_id, receiver_id)
        })?;

        self.events.emit(LedgerEvent::DonationCreated {
            id: donation.id,
            provider_id: donation.provider_id.clone(),
        });

        Ok(donation)
    }

    pub fn claim(&self, session: &Session, id: i64) -> Result<DonationRow, LedgerError> {
        session.require(Capability::Receiver)?;

        let donation = self
            .db
            .with_conn_mut(|conn| donations::claim_donation(conn, id, &session.user_id))?;

        self.events.emit(LedgerEvent::DonationClaimed {
            id,
            receiver_id: session.user_id.clone(),
        });

        Ok(donation)
    }

    pub fn unclaim(&self, session: &Session, id: i64) -> Result<DonationRow, LedgerError> {
        session.require(Capability::Receiver)?;

        let donation = self
            .db
            .with_conn_mut(|conn| donations::unclaim_donation(conn, id, &session.user_id))?;

        self.events.emit(LedgerEvent::DonationUnclaimed {
            id,
            receiver_id: session.user_id.clone(),
        });

        Ok(donation)
    }

    pub fn complete(&self, session: &Session, id: i64) -> Result<DonationRow, LedgerError> {
        let current = self.require(id)?;
        let participant = current.provider_id == session.user_id
            || current.receiver_id.as_deref() == Some(session.user_id.as_str());
        if !participant && !session.is_admin() {
            warn!(donation_id = id, user = %session.user_id, "Completion denied");
            return Err(LedgerError::AuthorizationDenied(format!(
                "{} is not a participant in donation {id}",
                session.user_id
            )));
        }

        let donation = self
            .db
            .with_conn_mut(|conn| donations::complete_donation(conn, id))?;

        self.events.emit(LedgerEvent::DonationCompleted { id });

        Ok(donation)
    }

    /// Delete a donation with all of its items
    pub fn delete(&self, session: &Session, id: i64) -> Result<u64, LedgerError> {
        self.authorize_owner(session, id)?;

        let items_removed = self
            .db
            .with_conn_mut(|conn| donations::delete_donation(conn, id))?;

        self.events.emit(LedgerEvent::DonationDeleted { id, items_removed });

        Ok(items_removed)
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub fn add_item(
        &self,
        session: &Session,
        donation_id: i64,
        title: &str,
        count: u32,
        unit: &str,
    ) -> Result<ItemRow, LedgerError> {
        self.authorize_owner(session, donation_id)?;

        let item = self.db.with_conn_mut(|conn| {
            items::add_item_manual(conn, donation_id, title, count, unit)
        })?;
        self.emit_item_added(&item, count);

        Ok(item)
    }

    pub fn scan_item(
        &self,
        session: &Session,
        donation_id: i64,
        code: &str,
        count: i64,
    ) -> Result<ItemRow, LedgerError> {
        self.authorize_owner(session, donation_id)?;
        let added = items::scan_count(count)?;

        let item = self
            .db
            .with_conn_mut(|conn| items::add_item_by_scan(conn, donation_id, code, count))?;
        self.emit_item_added(&item, added);

        Ok(item)
    }

    pub fn edit_item(
        &self,
        session: &Session,
        donation_id: i64,
        item_id: i64,
        new_count: u32,
    ) -> Result<Option<ItemRow>, LedgerError> {
        self.authorize_owner(session, donation_id)?;

        let item = self
            .db
            .with_conn_mut(|conn| items::edit_item(conn, donation_id, item_id, new_count))?;

        self.events.emit(LedgerEvent::ItemEdited {
            donation_id,
            item_id,
            count: item.as_ref().map(|i| i.count),
        });

        Ok(item)
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// The donation's provider or an admin
    fn authorize_owner(&self, session: &Session, id: i64) -> Result<DonationRow, LedgerError> {
        let donation = self.require(id)?;

        if donation.provider_id == session.user_id || session.is_admin() {
            Ok(donation)
        } else {
            warn!(donation_id = id, user = %session.user_id, "Owner check failed");
            Err(LedgerError::AuthorizationDenied(format!(
                "{} does not own donation {id}",
                session.user_id
            )))
        }
    }

    fn emit_item_added(&self, item: &ItemRow, added: u32) {
        self.events.emit(LedgerEvent::ItemAdded {
            donation_id: item.donation_id,
            item_id: item.id,
            count: added,
        });
    }
}
