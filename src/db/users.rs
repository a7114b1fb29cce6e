//! User registry operations
//!
//! The first user ever registered bootstraps the system with full bits.
//! Every later registration is authorized by the parent's stored bits;
//! registering an existing `user_id` updates its bits when the caller is
//! the recorded parent. Credential hashes are only written on insert and
//! by [`change_credential`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{self, Capability, Permissions};
use crate::error::LedgerError;

use super::begin_write;

/// User row from database
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub parent_id: String,
    pub user_id: String,
    pub permissions: Permissions,
    #[serde(skip_serializing)]
    pub credential_hash: String,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            parent_id: row.get("parent_id")?,
            user_id: row.get("user_id")?,
            permissions: Permissions::from_stored(row.get("permissions")?),
            credential_hash: row.get("credential_hash")?,
        })
    }

    pub fn has(&self, capability: Capability) -> bool {
        auth::has_capability(self.permissions, capability)
    }
}

/// What a successful [`register_user`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// First user in the registry, granted full bits
    Bootstrapped,
    Created,
    /// Existing child's bits overwritten by its parent
    Updated,
}

/// Get user by ID
pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<UserRow>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT * FROM users WHERE user_id = ?",
            params![user_id],
            UserRow::from_row,
        )
        .optional()?)
}

pub fn user_exists(conn: &Connection, user_id: &str) -> Result<bool, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM users WHERE user_id = ?",
            params![user_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn count_users(conn: &Connection) -> Result<u64, LedgerError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// List the users registered under `parent_id`
pub fn list_children(conn: &Connection, parent_id: &str) -> Result<Vec<UserRow>, LedgerError> {
    let mut stmt =
        conn.prepare("SELECT * FROM users WHERE parent_id = ? AND user_id != ? ORDER BY rowid")?;

    let rows = stmt
        .query_map(params![parent_id, parent_id], UserRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Create or update a user under `parent_id`
///
/// Fails with `NotFound` when the parent is missing, `AuthorizationDenied`
/// when the delegation rules or the ownership check refuse the request, and
/// `ConflictOnVerify` when the stored bits differ from the intended bits
/// after the write. Nothing is written on failure.
pub fn register_user(
    conn: &mut Connection,
    parent_id: &str,
    user_id: &str,
    requested: Permissions,
    credential: &str,
) -> Result<RegisterOutcome, LedgerError> {
    if user_id.is_empty() {
        return Err(LedgerError::InvalidInput("user_id is required".into()));
    }

    let hash = auth::hash_credential(credential)?;
    let tx = begin_write(conn)?;

    let (outcome, expected) = if count_users(&tx)? == 0 {
        tx.execute(
            "INSERT INTO users (parent_id, permissions, user_id, credential_hash) VALUES (?, ?, ?, ?)",
            params![parent_id, Permissions::FULL.to_stored(), user_id, hash],
        )?;
        (RegisterOutcome::Bootstrapped, Permissions::FULL)
    } else {
        let parent = get_user(&tx, parent_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("parent user {parent_id}")))?;

        if user_id == parent_id {
            warn!(user = %user_id, "Refused self-registration");
            return Err(LedgerError::AuthorizationDenied(format!(
                "{user_id} cannot change its own bits"
            )));
        }

        if let Err(denied) = auth::check_delegation(parent.permissions, requested) {
            warn!(parent = %parent_id, user = %user_id, requested = %requested, "Delegation denied: {}", denied);
            return Err(LedgerError::AuthorizationDenied(denied.to_string()));
        }

        match get_user(&tx, user_id)? {
            None => {
                tx.execute(
                    "INSERT INTO users (parent_id, permissions, user_id, credential_hash) VALUES (?, ?, ?, ?)",
                    params![parent_id, requested.to_stored(), user_id, hash],
                )?;
                (RegisterOutcome::Created, requested)
            }
            Some(existing) if existing.parent_id == parent_id => {
                tx.execute(
                    "UPDATE users SET permissions = ? WHERE user_id = ?",
                    params![requested.to_stored(), user_id],
                )?;
                (RegisterOutcome::Updated, requested)
            }
            Some(existing) => {
                warn!(user = %user_id, owner = %existing.parent_id, caller = %parent_id, "Ownership check failed");
                return Err(LedgerError::AuthorizationDenied(format!(
                    "user {user_id} is not owned by {parent_id}"
                )));
            }
        }
    };

    let stored = get_user(&tx, user_id)?
        .ok_or_else(|| LedgerError::ConflictOnVerify(format!("user {user_id} missing after write")))?;
    if stored.permissions != expected {
        return Err(LedgerError::ConflictOnVerify(format!(
            "user {user_id} has bits {} after writing {}",
            stored.permissions, expected
        )));
    }

    tx.commit()?;
    info!(user = %user_id, parent = %parent_id, bits = %expected, ?outcome, "User registered");

    Ok(outcome)
}

/// Check a raw credential against the stored hash; unknown users fail
pub fn verify_credential(
    conn: &Connection,
    user_id: &str,
    credential: &str,
) -> Result<bool, LedgerError> {
    match get_user(conn, user_id)? {
        Some(user) => auth::verify_credential_hash(credential, &user.credential_hash),
        None => {
            debug!(user = %user_id, "Credential check for unknown user");
            Ok(false)
        }
    }
}

/// Replace a user's credential after verifying the old one
pub fn change_credential(
    conn: &mut Connection,
    user_id: &str,
    old_credential: &str,
    new_credential: &str,
) -> Result<(), LedgerError> {
    let hash = auth::hash_credential(new_credential)?;
    let tx = begin_write(conn)?;

    if !verify_credential(&tx, user_id, old_credential)? {
        return Err(LedgerError::AuthorizationDenied(format!(
            "invalid credential for {user_id}"
        )));
    }

    tx.execute(
        "UPDATE users SET credential_hash = ? WHERE user_id = ?",
        params![hash, user_id],
    )?;

    if !verify_credential(&tx, user_id, new_credential)? {
        return Err(LedgerError::ConflictOnVerify(format!(
            "new credential for {user_id} did not verify"
        )));
    }

    tx.commit()?;
    info!(user = %user_id, "Credential changed");

    Ok(())
}

/// Test one capability bit; unknown users hold nothing
pub fn has_role(conn: &Connection, user_id: &str, capability: Capability) -> Result<bool, LedgerError> {
    Ok(get_user(conn, user_id)?
        .map(|user| user.has(capability))
        .unwrap_or(false))
}

pub fn is_admin(conn: &Connection, user_id: &str) -> Result<bool, LedgerError> {
    has_role(conn, user_id, Capability::Admin)
}

pub fn is_org(conn: &Connection, user_id: &str) -> Result<bool, LedgerError> {
    has_role(conn, user_id, Capability::Organization)
}

pub fn is_provider(conn: &Connection, user_id: &str) -> Result<bool, LedgerError> {
    has_role(conn, user_id, Capability::Provider)
}

pub fn is_receiver(conn: &Connection, user_id: &str) -> Result<bool, LedgerError> {
    has_role(conn, user_id, Capability::Receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LedgerDb;

    fn bits(raw: u8) -> Permissions {
        Permissions::from_bits_truncate(raw)
    }

    fn register(
        db: &LedgerDb,
        parent: &str,
        user: &str,
        raw: u8,
    ) -> Result<RegisterOutcome, LedgerError> {
        db.with_conn_mut(|conn| register_user(conn, parent, user, bits(raw), "pw"))
    }

    fn stored_bits(db: &LedgerDb, user: &str) -> Option<Permissions> {
        db.with_conn(|conn| get_user(conn, user))
            .unwrap()
            .map(|u| u.permissions)
    }

    #[test]
    fn test_first_user_gets_full_bits() {
        let db = LedgerDb::open_in_memory().unwrap();

        assert_eq!(
            register(&db, "root", "admin", 0b0001).unwrap(),
            RegisterOutcome::Bootstrapped
        );
        assert_eq!(stored_bits(&db, "admin"), Some(Permissions::FULL));
        assert!(db.with_conn(|c| is_admin(c, "admin")).unwrap());
    }

    #[test]
    fn test_hierarchy_scenario() {
        let db = LedgerDb::open_in_memory().unwrap();
        register(&db, "admin", "admin", 0b1111).unwrap();

        assert_eq!(
            register(&db, "admin", "org", 0b0110).unwrap(),
            RegisterOutcome::Created
        );
        assert_eq!(
            register(&db, "org", "pantry", 0b0010).unwrap(),
            RegisterOutcome::Created
        );

        // org holds no receiver bit to delegate
        let err = register(&db, "org", "shelter", 0b0001).unwrap_err();
        assert!(matches!(err, LedgerError::AuthorizationDenied(_)));
        assert!(!db.with_conn(|c| user_exists(c, "shelter")).unwrap());

        // non-admin can never grant admin or org
        for raw in [0b1010, 0b0110, 0b1111] {
            let err = register(&db, "org", "rogue", raw).unwrap_err();
            assert!(matches!(err, LedgerError::AuthorizationDenied(_)));
        }
        assert!(!db.with_conn(|c| user_exists(c, "rogue")).unwrap());
    }

    #[test]
    fn test_root_cannot_rewrite_itself() {
        let db = LedgerDb::open_in_memory().unwrap();
        register(&db, "admin", "admin", 0b1111).unwrap();

        let err = register(&db, "admin", "admin", 0b0001).unwrap_err();
        assert!(matches!(err, LedgerError::AuthorizationDenied(_)));
        assert_eq!(stored_bits(&db, "admin"), Some(Permissions::FULL));
        assert!(db.with_conn(|c| is_admin(c, "admin")).unwrap());
    }

    #[test]
    fn test_missing_parent() {
        let db = LedgerDb::open_in_memory().unwrap();
        register(&db, "admin", "admin", 0b1111).unwrap();

        let err = register(&db, "ghost", "child", 0b0010).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_update_requires_ownership_and_keeps_hash() {
        let db = LedgerDb::open_in_memory().unwrap();
        register(&db, "admin", "admin", 0b1111).unwrap();
        register(&db, "admin", "org", 0b0111).unwrap();
        db.with_conn_mut(|c| register_user(c, "org", "pantry", bits(0b0010), "first-pass"))
            .unwrap();

        let outcome = db
            .with_conn_mut(|c| register_user(c, "org", "pantry", bits(0b0011), "ignored"))
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Updated);
        assert_eq!(stored_bits(&db, "pantry"), Some(bits(0b0011)));
        assert!(db.with_conn(|c| verify_credential(c, "pantry", "first-pass")).unwrap());
        assert!(!db.with_conn(|c| verify_credential(c, "pantry", "ignored")).unwrap());

        // admin is not pantry's parent
        let err = register(&db, "admin", "pantry", 0b0001).unwrap_err();
        assert!(matches!(err, LedgerError::AuthorizationDenied(_)));
        assert_eq!(stored_bits(&db, "pantry"), Some(bits(0b0011)));
    }

    #[test]
    fn test_change_credential() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn_mut(|c| register_user(c, "admin", "admin", Permissions::FULL, "old"))
            .unwrap();

        let err = db
            .with_conn_mut(|c| change_credential(c, "admin", "wrong", "new"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AuthorizationDenied(_)));

        db.with_conn_mut(|c| change_credential(c, "admin", "old", "new"))
            .unwrap();
        assert!(db.with_conn(|c| verify_credential(c, "admin", "new")).unwrap());
        assert!(!db.with_conn(|c| verify_credential(c, "admin", "old")).unwrap());
    }

    #[test]
    fn test_role_queries_for_unknown_user() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|c| {
            assert!(!is_admin(c, "nobody")?);
            assert!(!is_org(c, "nobody")?);
            assert!(!is_provider(c, "nobody")?);
            assert!(!is_receiver(c, "nobody")?);
            assert!(!verify_credential(c, "nobody", "pw")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_children() {
        let db = LedgerDb::open_in_memory().unwrap();
        register(&db, "admin", "admin", 0b1111).unwrap();
        register(&db, "admin", "org", 0b0110).unwrap();
        register(&db, "admin", "shelter", 0b0001).unwrap();

        let children = db.with_conn(|c| list_children(c, "admin")).unwrap();
        let ids: Vec<_> = children.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["org", "shelter"]);
    }
}
