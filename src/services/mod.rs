//! Service layer for donation-ledger
//!
//! Services sit between callers and the repository functions and add:
//! - Authentication (sessions)
//! - Authorization against the caller's permission bits
//! - Event emission for audit/notifications
//!
//! ## Architecture
//!
//! ```text
//! CLI / callers
//!     ↓
//! Service Layer (authorization)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod catalog_service;
pub mod donation_service;
pub mod events;
pub mod session;
pub mod user_service;

pub use catalog_service::CatalogService;
pub use donation_service::DonationService;
pub use events::{EventBus, LedgerEvent};
pub use session::Session;
pub use user_service::UserService;

use crate::db::LedgerDb;
use std::sync::Arc;

/// Service container sharing one database and event bus
pub struct Services {
    pub users: Arc<UserService>,
    pub donations: Arc<DonationService>,
    pub catalog: Arc<CatalogService>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            users: Arc::new(UserService::new(db.clone(), events.clone())),
            donations: Arc::new(DonationService::new(db.clone(), events.clone())),
            catalog: Arc::new(CatalogService::new(db, events.clone())),
            events,
        }
    }
}
