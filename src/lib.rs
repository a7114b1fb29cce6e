//! Donation Ledger - tracks donated goods from providers to receivers
//!
//! Donations are containers of line items. A permissioned user registry
//! gates who may create, claim, edit or complete a donation.
//!
//! ## Lifecycle
//!
//! ```text
//! create ─▶ Open ─claim─▶ Claimed ─complete─▶ Completed
//!            ▲              │
//!            └───unclaim────┘
//! ```
//!
//! ## Permission bits
//!
//! | Bit | Capability |
//! |-----|------------|
//! | `1000` | Admin |
//! | `0100` | Organization |
//! | `0010` | Provider |
//! | `0001` | Receiver |
//!
//! The first registered user is granted `1111`. Children are registered by a
//! parent, which may only delegate what the rules in [`auth::permissions`]
//! allow.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/donation-ledger/
//! ├── ledger.db              # SQLite database (users, barcodes, donations, items)
//! └── config.toml            # Configuration
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports
pub use auth::{Capability, Permissions};
pub use config::Config;
pub use db::{DbStats, LedgerDb};
pub use error::{ErrorKind, LedgerError};
pub use services::{CatalogService, DonationService, LedgerEvent, Services, Session, UserService};
