//! Credential hashing and verification using Argon2
//!
//! Uses the argon2id variant with a per-credential random salt.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::LedgerError;

/// Hash a raw credential using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_credential(credential: &str) -> Result<String, LedgerError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::Credential(format!("Failed to hash credential: {e}")))
}

/// Verify a raw credential against a stored hash
pub fn verify_credential_hash(credential: &str, hash: &str) -> Result<bool, LedgerError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| LedgerError::Credential(format!("Invalid credential hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(credential.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_credential("kale-and-carrots").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_credential_hash("kale-and-carrots", &hash).unwrap());
        assert!(!verify_credential_hash("kale-and-turnips", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        let first = hash_credential("same").unwrap();
        let second = hash_credential("same").unwrap();

        assert_ne!(first, second);
        assert!(verify_credential_hash("same", &first).unwrap());
        assert!(verify_credential_hash("same", &second).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        assert!(verify_credential_hash("pw", "5e884898da2804715").is_err());
    }
}
