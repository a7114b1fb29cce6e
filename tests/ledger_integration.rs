//! Integration tests for the donation lifecycle
//!
//! These run against a file-backed database in a temporary directory, so
//! they exercise WAL mode, reopening and cross-connection locking.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use donation_ledger::db::donations::{Role, Status};
use donation_ledger::services::LedgerEvent;
use donation_ledger::{ErrorKind, LedgerDb, LedgerError, Permissions, Services};
use tempfile::TempDir;

/// Helper to open a ledger database inside a temporary directory
fn open_db(dir: &TempDir) -> Arc<LedgerDb> {
    Arc::new(
        LedgerDb::open_path(&dir.path().join("ledger.db"), Duration::from_secs(5), true).unwrap(),
    )
}

/// Admin, an org that provides, a pantry provider and a shelter receiver
fn seed_hierarchy(services: &Services) {
    services.users.bootstrap("admin", "admin-pass").unwrap();
    let admin = services.users.authenticate("admin", "admin-pass").unwrap();

    services
        .users
        .register(
            &admin,
            "org",
            Permissions::ORGANIZATION | Permissions::PROVIDER | Permissions::RECEIVER,
            "org-pass",
        )
        .unwrap();

    let org = services.users.authenticate("org", "org-pass").unwrap();
    services
        .users
        .register(&org, "pantry", Permissions::PROVIDER, "pantry-pass")
        .unwrap();
    services
        .users
        .register(&org, "shelter", Permissions::RECEIVER, "shelter-pass")
        .unwrap();
}

/// Walk one donation from creation to deletion
#[test]
fn test_full_donation_lifecycle() {
    let temp = TempDir::new().unwrap();
    let services = Services::new(open_db(&temp));
    let mut events = services.events.subscribe();
    seed_hierarchy(&services);

    let pantry = services.users.authenticate("pantry", "pantry-pass").unwrap();
    let shelter = services.users.authenticate("shelter", "shelter-pass").unwrap();
    let admin = services.users.authenticate("admin", "admin-pass").unwrap();

    // Catalog entry for scanning
    services
        .catalog
        .register(&admin, "0123456789", "Rice", "lb")
        .unwrap();

    // Provider creates and fills a donation
    let donation = services.donations.create(&pantry, None).unwrap();
    assert!(donation.receiver_id.is_none());
    assert!(!donation.is_completed());

    services
        .donations
        .add_item(&pantry, donation.id, "Kale", 5, "lb")
        .unwrap();
    let kale = services
        .donations
        .add_item(&pantry, donation.id, "Kale", 3, "lb")
        .unwrap();
    assert_eq!(kale.count, 8);

    let rice = services
        .donations
        .scan_item(&pantry, donation.id, "0123456789", -4)
        .unwrap();
    assert_eq!(rice.count, 1);
    assert_eq!(rice.barcode.as_deref(), Some("0123456789"));

    let items = services.donations.items(donation.id).unwrap();
    assert_eq!(items.len(), 2);

    // Receiver sees it, claims, releases, claims again
    let open = services.donations.unclaimed(&shelter).unwrap();
    assert_eq!(open.len(), 1);

    services.donations.claim(&shelter, donation.id).unwrap();
    assert!(services.donations.unclaimed(&shelter).unwrap().is_empty());

    services.donations.unclaim(&shelter, donation.id).unwrap();
    assert_eq!(services.donations.unclaimed(&shelter).unwrap().len(), 1);

    services.donations.claim(&shelter, donation.id).unwrap();
    let pending = services
        .donations
        .list(&shelter, Role::Receiver, Status::Pending)
        .unwrap();
    assert_eq!(pending.len(), 1);

    // Completion moves it to the completed lists
    let done = services.donations.complete(&pantry, donation.id).unwrap();
    assert!(done.completed_at.is_some());
    assert!(done.completed_at.unwrap() >= done.created_at);

    assert!(services
        .donations
        .list(&pantry, Role::Provider, Status::Pending)
        .unwrap()
        .is_empty());
    assert_eq!(
        services
            .donations
            .list(&shelter, Role::Receiver, Status::Completed)
            .unwrap()
            .len(),
        1
    );

    // Completed donations cannot be claimed again
    let err = services.donations.claim(&shelter, donation.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // Delete removes the donation and its items
    let removed = services.donations.delete(&pantry, donation.id).unwrap();
    assert_eq!(removed, 2);
    assert!(services.donations.get(donation.id).unwrap().is_none());
    assert!(services.donations.items(donation.id).unwrap().is_empty());

    let err = services.donations.delete(&pantry, donation.id).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    // The bus saw the registrations first and the deletion last
    let mut last = None;
    let mut registered = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, LedgerEvent::UserRegistered { .. }) {
            registered += 1;
        }
        last = Some(event);
    }
    assert_eq!(registered, 4);
    assert!(matches!(
        last,
        Some(LedgerEvent::DonationDeleted { items_removed: 2, .. })
    ));
}

/// Delegation limits are enforced through the service layer
#[test]
fn test_delegation_denied_for_org() {
    let temp = TempDir::new().unwrap();
    let services = Services::new(open_db(&temp));
    seed_hierarchy(&services);

    let org = services.users.authenticate("org", "org-pass").unwrap();

    // Organizations cannot mint other organizations
    let err = services
        .users
        .register(
            &org,
            "org2",
            Permissions::ORGANIZATION | Permissions::PROVIDER,
            "pw",
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
    assert!(!services.users.exists("org2").unwrap());

    // A receiver cannot hand out a role it lacks
    let shelter = services.users.authenticate("shelter", "shelter-pass").unwrap();
    let err = services
        .users
        .register(&shelter, "guest", Permissions::PROVIDER, "pw")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);

    let children: Vec<String> = services
        .users
        .children(&org)
        .unwrap()
        .into_iter()
        .map(|u| u.user_id)
        .collect();
    assert_eq!(children, vec!["pantry".to_string(), "shelter".to_string()]);
}

/// Two connections race to claim the same donation; exactly one wins
#[test]
fn test_concurrent_claim_single_winner() {
    let temp = TempDir::new().unwrap();
    let services = Services::new(open_db(&temp));
    seed_hierarchy(&services);

    let org = services.users.authenticate("org", "org-pass").unwrap();
    services
        .users
        .register(&org, "kitchen", Permissions::RECEIVER, "kitchen-pass")
        .unwrap();

    let pantry = services.users.authenticate("pantry", "pantry-pass").unwrap();
    let donation_id = services.donations.create(&pantry, None).unwrap().id;

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [("shelter", "shelter-pass"), ("kitchen", "kitchen-pass")]
        .into_iter()
        .map(|(user, password)| {
            let barrier = barrier.clone();
            // Each thread opens its own connection to the same file
            let services = Services::new(open_db(&temp));
            thread::spawn(move || {
                let session = services.users.authenticate(user, password).unwrap();
                barrier.wait();
                services.donations.claim(&session, donation_id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::InvalidState);

    let stored = services.donations.get(donation_id).unwrap().unwrap();
    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .unwrap();
    assert_eq!(stored.receiver_id, winner.receiver_id);
}

/// Data and credentials survive closing and reopening the database
#[test]
fn test_persistence_across_reopen() {
    let temp = TempDir::new().unwrap();

    let donation_id = {
        let services = Services::new(open_db(&temp));
        seed_hierarchy(&services);
        services
            .users
            .change_credential("pantry", "pantry-pass", "new-pass")
            .unwrap();

        let pantry = services.users.authenticate("pantry", "new-pass").unwrap();
        let d = services.donations.create(&pantry, Some("shelter")).unwrap();
        services
            .donations
            .add_item(&pantry, d.id, "Beans", 12, "can")
            .unwrap();
        d.id
    };

    let db = open_db(&temp);
    let services = Services::new(db.clone());

    assert!(services.users.authenticate("pantry", "pantry-pass").is_err());
    assert!(services.users.authenticate("pantry", "new-pass").is_ok());
    assert!(services.users.is_provider("pantry").unwrap());
    assert!(!services.users.is_admin("pantry").unwrap());

    // Bootstrap only works on an empty registry
    let err = services.users.bootstrap("intruder", "pw").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let donation = services.donations.get(donation_id).unwrap().unwrap();
    assert_eq!(donation.receiver_id.as_deref(), Some("shelter"));

    let items = services.donations.items(donation_id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].count, 12);

    let stats = db.stats().unwrap();
    assert_eq!(stats.users, 4);
    assert_eq!(stats.donations, 1);
    assert_eq!(stats.items, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 0);
}
