//! End-to-end tests over the public `Store` facade.

use std::collections::BTreeSet;

use attic::AccessLevel::{Read, Write};
use attic::{Access, CredentialScheme, ExpectedVersion, Resource, Store, StoreError};

/// Cheap credential scheme so the suite does not pay for Argon2 on every
/// test; the real scheme is covered in the accounts module.
struct Plain;

impl CredentialScheme for Plain {
    fn derive(&self, password: &str) -> attic::Result<String> {
        Ok(format!("plain:{}", password))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        stored == format!("plain:{}", password)
    }
}

fn store() -> Store {
    Store::with_credentials(Box::new(Plain))
}

#[test]
fn account_lifecycle() {
    let store = store();
    store.create_user("zebcoe", "locog").unwrap();
    store.authenticate("zebcoe", "locog").unwrap();

    let err = store.create_user("z", "locog").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Username must be at least 2 characters long"
    );
    let err = store.create_user("zebcoe", "hi").unwrap_err();
    assert_eq!(err.to_string(), "The username is already taken");
    let err = store.authenticate("zebcoe", "wrong").unwrap_err();
    assert_eq!(err.to_string(), "Incorrect password");
    let err = store.authenticate("nobody", "locog").unwrap_err();
    assert_eq!(err.to_string(), "Username not found");
}

#[test]
fn authorize_returns_the_normalized_scope() {
    let store = store();
    store.create_user("boris", "dangle").unwrap();
    let token = store.authorize(
        "www.example.com",
        "boris",
        &[
            ("documents", vec![Write]),
            ("photos", vec![Read, Write]),
            ("contacts", vec![Read]),
            ("deep/dir", vec![Read, Write]),
        ],
    );

    let scope = store.permissions("boris", &token).unwrap();
    let listed: Vec<(&str, Vec<attic::AccessLevel>)> = scope
        .iter()
        .map(|(prefix, levels)| (prefix, levels.iter().copied().collect()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("/contacts/", vec![Read]),
            ("/deep/dir/", vec![Read, Write]),
            ("/documents/", vec![Write]),
            ("/photos/", vec![Read, Write]),
        ]
    );

    assert!(store.permissions("boris", "bogus").is_none());
    assert!(store.permissions("zebcoe", &token).is_none());
}

#[test]
fn scoped_storage_round_trip() {
    let store = store();
    store.create_user("boris", "dangle").unwrap();
    let token = store.authorize("www.example.com", "boris", &[("photos", vec![Read, Write])]);
    let access = Access::scoped(token.as_str());

    let outcome = store
        .put(
            "boris",
            "/photos/zipwire",
            "image/poster",
            b"vertibo".to_vec(),
            None,
            &access,
        )
        .unwrap();
    assert!(outcome.created);

    match store.get("boris", "/photos/zipwire", &access).unwrap() {
        Some(Resource::Document {
            content_type,
            modified,
            content,
        }) => {
            assert_eq!(content_type, "image/poster");
            assert_eq!(modified, outcome.modified);
            assert_eq!(content, b"vertibo");
        }
        other => panic!("expected a document, got {:?}", other),
    }

    // Out-of-scope paths stay out of reach until the caller is trusted.
    let err = store.get("boris", "/contacts/anna", &access).unwrap_err();
    assert!(matches!(err, StoreError::PermissionDenied { .. }));
    assert!(store
        .get("boris", "/contacts/anna", &Access::Trusted)
        .unwrap()
        .is_none());

    assert!(store.delete("boris", "/photos/zipwire", &access).unwrap());
    assert!(store.get("boris", "/photos/", &access).unwrap().is_none());

    store.revoke("boris", &token);
    let err = store
        .get("boris", "/photos/zipwire", &access)
        .unwrap_err();
    assert!(matches!(err, StoreError::PermissionDenied { .. }));
}

#[test]
fn conditional_puts_guard_overwrites() {
    let store = store();
    store.create_user("boris", "dangle").unwrap();

    let outcome = store
        .put(
            "boris",
            "/documents/plan",
            "text/plain",
            b"v1".to_vec(),
            Some(ExpectedVersion::Absent),
            &Access::Trusted,
        )
        .unwrap();

    let err = store
        .put(
            "boris",
            "/documents/plan",
            "text/plain",
            b"v2".to_vec(),
            Some(ExpectedVersion::Absent),
            &Access::Trusted,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    store
        .put(
            "boris",
            "/documents/plan",
            "text/plain",
            b"v2".to_vec(),
            Some(ExpectedVersion::At(outcome.modified)),
            &Access::Trusted,
        )
        .unwrap();
}

#[test]
fn snapshot_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    // Real credential scheme here: the reloaded store verifies against the
    // persisted hashes.
    let store = Store::new();

    store.create_user("boris", "dangle").unwrap();
    store.create_user("zebcoe", "locog").unwrap();
    let token = store.authorize("www.example.com", "boris", &[("photos", vec![Read, Write])]);

    let binary = vec![0x00u8, 0x01, 0xfe, 0xff, 0x80];
    let outcome = store
        .put(
            "boris",
            "/photos/bar/baz/boo",
            "image/jpeg",
            binary.clone(),
            None,
            &Access::Trusted,
        )
        .unwrap();
    store
        .put(
            "boris",
            "/photos/bla",
            "application/json",
            b"{\"more\": \"content\"}".to_vec(),
            None,
            &Access::Trusted,
        )
        .unwrap();
    store
        .put(
            "zebcoe",
            "/tv/shows",
            "application/json",
            b"{\"The Day\": \"Today\"}".to_vec(),
            None,
            &Access::Trusted,
        )
        .unwrap();

    store.save_to(dir.path()).unwrap();
    let reloaded = Store::load_from(dir.path()).unwrap();

    // Accounts and grants survive.
    reloaded.authenticate("boris", "dangle").unwrap();
    reloaded.authenticate("zebcoe", "locog").unwrap();
    let scope = reloaded.permissions("boris", &token).unwrap();
    assert_eq!(scope.get("/photos/"), Some(&BTreeSet::from([Read, Write])));

    // Documents come back byte-identical with their timestamps.
    match reloaded
        .get("boris", "/photos/bar/baz/boo", &Access::Trusted)
        .unwrap()
    {
        Some(Resource::Document {
            content_type,
            modified,
            content,
        }) => {
            assert_eq!(content_type, "image/jpeg");
            assert_eq!(modified, outcome.modified);
            assert_eq!(content, binary);
        }
        other => panic!("expected a document, got {:?}", other),
    }

    // The directory index is re-derived: listings and bubbled timestamps
    // match, and pruning still works.
    match reloaded.get("boris", "/photos/", &Access::Trusted).unwrap() {
        Some(Resource::Listing(entries)) => {
            let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["bar/", "bla"]);
            assert_eq!(entries[0].modified, outcome.modified);
        }
        other => panic!("expected a listing, got {:?}", other),
    }
    assert!(reloaded
        .delete("boris", "/photos/bar/baz/boo", &Access::Trusted)
        .unwrap());
    assert!(reloaded
        .get("boris", "/photos/bar/", &Access::Trusted)
        .unwrap()
        .is_none());
}

#[test]
fn snapshot_never_stores_plaintext_passwords() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Store::new();
    store.create_user("boris", "zipwire-secret").unwrap();
    store.save_to(dir.path()).unwrap();

    let users = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
    assert!(users.contains("boris"));
    assert!(!users.contains("zipwire-secret"));
}
