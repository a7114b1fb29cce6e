//! Authenticated caller identity

use serde::Serialize;

use crate::auth::{self, Capability, Permissions};
use crate::error::LedgerError;

/// A user who has passed credential verification
///
/// Permissions are captured at authentication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub permissions: Permissions,
}

impl Session {
    pub(crate) fn new(user_id: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            user_id: user_id.into(),
            permissions,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        auth::has_capability(self.permissions, capability)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Capability::Admin)
    }

    /// Fail unless the session holds `capability`
    pub fn require(&self, capability: Capability) -> Result<(), LedgerError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(LedgerError::AuthorizationDenied(format!(
                "{} lacks {capability}",
                self.user_id
            )))
        }
    }

    /// Fail unless the session holds at least one of `capabilities`
    pub fn require_any(&self, capabilities: &[Capability]) -> Result<(), LedgerError> {
        if capabilities.iter().any(|c| self.has(*c)) {
            Ok(())
        } else {
            let names: Vec<String> = capabilities.iter().map(ToString::to_string).collect();
            Err(LedgerError::AuthorizationDenied(format!(
                "{} lacks any of {}",
                self.user_id,
                names.join(", ")
            )))
        }
    }
}
