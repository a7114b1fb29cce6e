//! Authentication and authorization
//!
//! Provides:
//! - Permission bits and the delegation rule table
//! - Credential hashing with Argon2

pub mod password;
pub mod permissions;

pub use password::{hash_credential, verify_credential_hash};
pub use permissions::{
    can_assign, check_delegation, has_capability, Capability, DelegationDenied, Permissions,
};
