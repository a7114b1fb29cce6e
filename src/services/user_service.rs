//! User service - registration, authentication and role queries

use std::sync::Arc;

use tracing::warn;

use crate::auth::{Capability, Permissions};
use crate::db::users::{self, RegisterOutcome, UserRow};
use crate::db::LedgerDb;
use crate::error::LedgerError;

use super::events::{EventBus, LedgerEvent};
use super::session::Session;

pub struct UserService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
}

impl UserService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Register the first user of an empty registry with full bits
    pub fn bootstrap(&self, user_id: &str, credential: &str) -> Result<UserRow, LedgerError> {
        if self.db.with_conn(users::count_users)? > 0 {
            return Err(LedgerError::InvalidState("registry already bootstrapped".into()));
        }

        let outcome = self.db.with_conn_mut(|conn| {
            users::register_user(conn, user_id, user_id, Permissions::FULL, credential)
        })?;
        if outcome != RegisterOutcome::Bootstrapped {
            return Err(LedgerError::InvalidState("registry already bootstrapped".into()));
        }

        self.events.emit(LedgerEvent::UserRegistered {
            user_id: user_id.to_string(),
            parent_id: user_id.to_string(),
            permissions: Permissions::FULL,
            outcome: RegisterOutcome::Bootstrapped,
        });

        self.require_user(user_id)
    }

    /// Verify credentials and open a session
    pub fn authenticate(&self, user_id: &str, credential: &str) -> Result<Session, LedgerError> {
        let user = self.db.with_conn(|conn| {
            if users::verify_credential(conn, user_id, credential)? {
                users::get_user(conn, user_id)
            } else {
                Ok(None)
            }
        })?;

        match user {
            Some(user) => Ok(Session::new(user.user_id, user.permissions)),
            None => {
                warn!(user = %user_id, "Authentication failed");
                Err(LedgerError::AuthorizationDenied(format!(
                    "invalid credentials for {user_id}"
                )))
            }
        }
    }

    /// Plain credential check; unknown users fail
    pub fn verify_credential(&self, user_id: &str, credential: &str) -> Result<bool, LedgerError> {
        self.db
            .with_conn(|conn| users::verify_credential(conn, user_id, credential))
    }

    pub fn change_credential(
        &self,
        user_id: &str,
        old_credential: &str,
        new_credential: &str,
    ) -> Result<(), LedgerError> {
        self.db.with_conn_mut(|conn| {
            users::change_credential(conn, user_id, old_credential, new_credential)
        })?;

        self.events.emit(LedgerEvent::CredentialChanged {
            user_id: user_id.to_string(),
        });

        Ok(())
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Create or update a child of the session user
    pub fn register(
        &self,
        session: &Session,
        user_id: &str,
        permissions: Permissions,
        credential: &str,
    ) -> Result<RegisterOutcome, LedgerError> {
        let outcome = self.db.with_conn_mut(|conn| {
            users::register_user(conn, &session.user_id, user_id, permissions, credential)
        })?;

        self.events.emit(LedgerEvent::UserRegistered {
            user_id: user_id.to_string(),
            parent_id: session.user_id.clone(),
            permissions,
            outcome,
        });

        Ok(outcome)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserRow>, LedgerError> {
        self.db.with_conn(|conn| users::get_user(conn, user_id))
    }

    pub fn exists(&self, user_id: &str) -> Result<bool, LedgerError> {
        self.db.with_conn(|conn| users::user_exists(conn, user_id))
    }

    /// Users registered under the session user
    pub fn children(&self, session: &Session) -> Result<Vec<UserRow>, LedgerError> {
        self.db
            .with_conn(|conn| users::list_children(conn, &session.user_id))
    }

    // =========================================================================
    // Role queries
    // =========================================================================

    pub fn has_role(&self, user_id: &str, capability: Capability) -> Result<bool, LedgerError> {
        self.db
            .with_conn(|conn| users::has_role(conn, user_id, capability))
    }

    pub fn is_admin(&self, user_id: &str) -> Result<bool, LedgerError> {
        self.db.with_conn(|conn| users::is_admin(conn, user_id))
    }

    pub fn is_org(&self, user_id: &str) -> Result<bool, LedgerError> {
        self.db.with_conn(|conn| users::is_org(conn, user_id))
    }

    pub fn is_provider(&self, user_id: &str) -> Result<bool, LedgerError> {
        self.db.with_conn(|conn| users::is_provider(conn, user_id))
    }

    pub fn is_receiver(&self, user_id: &str) -> Result<bool, LedgerError> {
        self.db.with_conn(|conn| users::is_receiver(conn, user_id))
    }

    fn require_user(&self, user_id: &str) -> Result<UserRow, LedgerError> {
        self.get(user_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("user {user_id}")))
    }
}
