//! Permission bits and delegation rules
//!
//! Every user carries a 4-bit capability set, high to low:
//!
//! | Bit | Capability | Grants |
//! |-----|------------|--------|
//! | `0b1000` | Admin | full access |
//! | `0b0100` | Organization | create/manage child accounts |
//! | `0b0010` | Provider | create and manage donations |
//! | `0b0001` | Receiver | claim and receive donations |
//!
//! A parent may only delegate Admin or Organization when it is itself an
//! Admin, and may only delegate a role (Provider/Receiver) it already holds.
//! Every delegated set must carry at least one role.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Capability set stored with each user.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permissions: u8 {
        const ADMIN        = 0b1000;
        const ORGANIZATION = 0b0100;
        const PROVIDER     = 0b0010;
        const RECEIVER     = 0b0001;
    }
}

impl Permissions {
    /// Role bits that can be delegated to a child.
    pub const ROLES: Self = Self::PROVIDER.union(Self::RECEIVER);

    /// Bits granted to the first registered user.
    pub const FULL: Self = Self::all();

    /// Decode a stored integer, ignoring bits outside the 4-bit field.
    pub fn from_stored(bits: i64) -> Self {
        Self::from_bits_truncate((bits & 0b1111) as u8)
    }

    /// Integer form written to the store.
    pub fn to_stored(self) -> i64 {
        i64::from(self.bits())
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04b}", self.bits())
    }
}

/// A single capability a user may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Admin,
    Organization,
    Provider,
    Receiver,
}

impl Capability {
    pub fn flag(self) -> Permissions {
        match self {
            Capability::Admin => Permissions::ADMIN,
            Capability::Organization => Permissions::ORGANIZATION,
            Capability::Provider => Permissions::PROVIDER,
            Capability::Receiver => Permissions::RECEIVER,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Admin => write!(f, "ADMIN"),
            Capability::Organization => write!(f, "ORGANIZATION"),
            Capability::Provider => write!(f, "PROVIDER"),
            Capability::Receiver => write!(f, "RECEIVER"),
        }
    }
}

/// Why a delegation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationDenied {
    /// The requested capability needs `required` on the parent.
    MissingParentCapability {
        requested: Capability,
        required: Capability,
    },
    /// The requested set holds neither Provider nor Receiver.
    NoRole,
}

impl fmt::Display for DelegationDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationDenied::MissingParentCapability {
                requested,
                required,
            } => write!(f, "granting {requested} requires parent to hold {required}"),
            DelegationDenied::NoRole => {
                write!(f, "at least one of PROVIDER or RECEIVER must be granted")
            }
        }
    }
}

/// Capability the parent must hold before it may grant each requested capability.
const DELEGATION_RULES: [(Capability, Capability); 4] = [
    (Capability::Admin, Capability::Admin),
    (Capability::Organization, Capability::Admin),
    (Capability::Provider, Capability::Provider),
    (Capability::Receiver, Capability::Receiver),
];

/// Test a single capability bit
pub fn has_capability(bits: Permissions, capability: Capability) -> bool {
    bits.contains(capability.flag())
}

/// Check whether `parent` may grant `requested`, naming the first rule broken.
pub fn check_delegation(
    parent: Permissions,
    requested: Permissions,
) -> Result<(), DelegationDenied> {
    for (wanted, required) in DELEGATION_RULES {
        if has_capability(requested, wanted) && !has_capability(parent, required) {
            return Err(DelegationDenied::MissingParentCapability {
                requested: wanted,
                required,
            });
        }
    }

    if !requested.intersects(Permissions::ROLES) {
        return Err(DelegationDenied::NoRole);
    }

    Ok(())
}

/// Whether `parent` may grant or change a child's bits to `requested`
pub fn can_assign(parent: Permissions, requested: Permissions) -> bool {
    check_delegation(parent, requested).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(raw: u8) -> Permissions {
        Permissions::from_bits_truncate(raw)
    }

    #[test]
    fn test_has_capability() {
        let org_provider = bits(0b0110);
        assert!(has_capability(org_provider, Capability::Organization));
        assert!(has_capability(org_provider, Capability::Provider));
        assert!(!has_capability(org_provider, Capability::Admin));
        assert!(!has_capability(org_provider, Capability::Receiver));
    }

    #[test]
    fn test_admin_can_create_org() {
        assert!(can_assign(Permissions::FULL, bits(0b0110)));
        assert!(can_assign(Permissions::FULL, Permissions::FULL));
    }

    #[test]
    fn test_non_admin_cannot_grant_admin_or_org() {
        for parent in 0..=0b0111u8 {
            let parent = bits(parent);
            for requested in [0b1000u8, 0b0100, 0b1111, 0b0111, 0b1011, 0b0101] {
                assert!(
                    !can_assign(parent, bits(requested)),
                    "{parent} granted {requested:04b}"
                );
            }
        }
    }

    #[test]
    fn test_roles_must_be_held_by_parent() {
        let org_provider = bits(0b0110);
        assert!(can_assign(org_provider, bits(0b0010)));
        assert_eq!(
            check_delegation(org_provider, bits(0b0001)),
            Err(DelegationDenied::MissingParentCapability {
                requested: Capability::Receiver,
                required: Capability::Receiver,
            })
        );
        assert!(!can_assign(org_provider, bits(0b0011)));

        let org_only = bits(0b0100);
        assert!(!can_assign(org_only, bits(0b0010)));
    }

    #[test]
    fn test_some_role_required() {
        assert_eq!(
            check_delegation(Permissions::FULL, Permissions::empty()),
            Err(DelegationDenied::NoRole)
        );
        assert_eq!(
            check_delegation(Permissions::FULL, bits(0b1100)),
            Err(DelegationDenied::NoRole)
        );
    }

    #[test]
    fn test_stored_round_trip_truncates() {
        assert_eq!(Permissions::from_stored(0b1_0110), bits(0b0110));
        assert_eq!(Permissions::FULL.to_stored(), 0b1111);
        assert_eq!(Permissions::FULL.to_string(), "1111");
    }
}
