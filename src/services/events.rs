//! Event system for ledger operations
//!
//! Services emit a [`LedgerEvent`] after each committed mutation. Emission
//! never blocks and never fails the operation; with no subscribers the event
//! is dropped.

use tokio::sync::broadcast;
use tracing::trace;

use crate::auth::Permissions;
use crate::db::users::RegisterOutcome;

/// Ledger events emitted by services
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A user was created, or an existing child's bits were rewritten
    UserRegistered {
        user_id: String,
        parent_id: String,
        permissions: Permissions,
        outcome: RegisterOutcome,
    },
    CredentialChanged {
        user_id: String,
    },
    BarcodeRegistered {
        code: String,
    },
    DonationCreated {
        id: i64,
        provider_id: String,
    },
    DonationClaimed {
        id: i64,
        receiver_id: String,
    },
    DonationUnclaimed {
        id: i64,
        receiver_id: String,
    },
    DonationCompleted {
        id: i64,
    },
    DonationDeleted {
        id: i64,
        items_removed: u64,
    },
    ItemAdded {
        donation_id: i64,
        item_id: i64,
        count: u32,
    },
    ItemEdited {
        donation_id: i64,
        item_id: i64,
        /// `None` when the item was removed
        count: Option<u32>,
    },
}

/// Event bus for broadcasting ledger events
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: LedgerEvent) {
        trace!(event = ?event, "Emitting ledger event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
