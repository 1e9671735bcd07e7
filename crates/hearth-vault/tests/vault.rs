//! On-disk vault behavior: encryption at rest, fail-closed opening, locking.

use std::path::Path;

use hearth_vault::{
    FactFilter, IdentityId, MemoryBacking, NewFact, PiiLevel, Role, Vault, VaultError, VaultKey,
    load_or_create,
};
use tempfile::TempDir;

fn raw_bytes(path: &Path) -> Vec<u8> {
    let mut bytes = std::fs::read(path).unwrap();
    for suffix in ["-wal", "-journal"] {
        let side = path.with_file_name(format!(
            "{}{}",
            path.file_name().unwrap().to_string_lossy(),
            suffix
        ));
        if let Ok(extra) = std::fs::read(side) {
            bytes.extend(extra);
        }
    }
    bytes
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn fact_round_trips_and_never_hits_disk_in_plaintext() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");
    let credentials = load_or_create(&MemoryBacking::new()).unwrap();

    {
        let vault = Vault::open(&path, &credentials.key).unwrap();
        vault
            .create_identity(credentials.identity_id, Some("Alex"))
            .unwrap();
        let session = vault.create_session(None).unwrap();
        vault
            .add_message(session.id, Role::User, "My favourite team is Sacramento")
            .unwrap();
        let id = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia").with_pii_level(PiiLevel::new(1)))
            .unwrap()
            .id();

        let fact = vault.get_fact(id).unwrap().unwrap();
        assert_eq!(fact.object, "Philadelphia");
        assert!(!contains(&raw_bytes(&path), b"Philadelphia"));
    }

    let bytes = raw_bytes(&path);
    assert!(!contains(&bytes, b"Philadelphia"));
    assert!(!contains(&bytes, b"Sacramento"));

    let vault = Vault::open(&path, &credentials.key).unwrap();
    let facts = vault.get_facts(&FactFilter::all()).unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].object, "Philadelphia");
}

#[test]
fn wrong_key_fails_closed_without_touching_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");
    let key = VaultKey::generate();

    {
        let vault = Vault::open(&path, &key).unwrap();
        vault.create_identity(IdentityId::new(), None).unwrap();
        vault.set_fact(NewFact::new("personal", "name", "Alex")).unwrap();
    }
    let before = std::fs::read(&path).unwrap();

    let err = Vault::open(&path, &VaultKey::generate()).unwrap_err();
    assert!(matches!(err, VaultError::KeyMismatch));
    assert_eq!(std::fs::read(&path).unwrap(), before);

    let vault = Vault::open(&path, &key).unwrap();
    assert_eq!(vault.stats().unwrap().fact_count, 1);
}

#[test]
fn garbage_file_is_reported_as_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");
    std::fs::write(&path, b"this is definitely not a sqlite database, just text".repeat(100)).unwrap();

    let err = Vault::open(&path, &VaultKey::generate()).unwrap_err();
    assert!(matches!(err, VaultError::Corrupt(_)), "got {:?}", err);
}

#[test]
fn second_writer_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");
    let key = VaultKey::generate();

    let first = Vault::open(&path, &key).unwrap();
    first.create_identity(IdentityId::new(), None).unwrap();

    let err = Vault::open(&path, &key).unwrap_err();
    assert!(matches!(err, VaultError::Locked), "got {:?}", err);
    assert!(err.is_transient());

    drop(first);
    assert!(Vault::open(&path, &key).is_ok());
}

#[test]
fn open_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("vault.db");

    let vault = Vault::open(&path, &VaultKey::generate()).unwrap();
    assert!(path.exists());
    assert_eq!(vault.path(), Some(path.as_path()));
}
