//! Migration state machine against real files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_migrate::{MigrationDriver, MigrationError, MigrationOutcome, PREFERENCE_CATEGORY};
use hearth_vault::{FactFilter, IdentityId, NewFact, Role, Vault, VaultKey};
use tempfile::TempDir;

struct Layout {
    _root: TempDir,
    legacy: PathBuf,
    backups: PathBuf,
    vault: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let legacy = root.path().join("legacy");
        std::fs::create_dir_all(&legacy).unwrap();
        Self {
            legacy,
            backups: root.path().join("data").join("backups"),
            vault: root.path().join("data").join("vault.db"),
            _root: root,
        }
    }

    fn driver(&self) -> MigrationDriver {
        MigrationDriver::new(&self.vault, &self.legacy, &self.backups)
    }

    fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.legacy.join(name), contents).unwrap();
    }

    fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        std::fs::read_dir(&self.legacy)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (
                    entry.file_name().to_string_lossy().into_owned(),
                    std::fs::read(entry.path()).unwrap(),
                )
            })
            .collect()
    }
}

fn no_vault_files(path: &Path) -> bool {
    ["", "-wal", "-shm", "-journal"].iter().all(|suffix| {
        !path
            .with_file_name(format!(
                "{}{}",
                path.file_name().unwrap().to_string_lossy(),
                suffix
            ))
            .exists()
    })
}

fn write_full_legacy(layout: &Layout) {
    layout.write(
        "profile.json",
        r#"{"name": "Alex", "created_at": "2023-04-01T09:00:00Z"}"#,
    );
    layout.write(
        "sessions.json",
        r#"[
            {
                "title": "Trip planning",
                "created_at": "2024-01-02T10:00:00Z",
                "messages": [
                    {"role": "user", "content": "Find me flights to Lisbon", "timestamp": "2024-01-02T10:00:05Z"},
                    {"role": "assistant", "content": "Here are three options", "timestamp": "2024-01-02T10:00:09Z"}
                ]
            },
            {
                "title": "Recipes",
                "created_at": "2024-02-10T18:00:00Z",
                "ended_at": "2024-02-10T18:30:00Z",
                "messages": [
                    {"role": "user", "content": "Something with chickpeas"}
                ]
            }
        ]"#,
    );
    layout.write(
        "facts.json",
        r#"[
            {"category": "location", "key": "city", "value": "Philadelphia", "pii_level": 1, "consent": "default"},
            {"category": "personal", "key": "name", "value": "Alex", "pii_level": 0, "priority": 0.97, "consent": "default"}
        ]"#,
    );
    layout.write("preferences.json", r#"{"units": "metric"}"#);
}

#[test]
fn fresh_install_gets_empty_vault_with_identity() {
    let layout = Layout::new();
    let id = IdentityId::new();

    let (vault, outcome) = layout.driver().run(&VaultKey::generate(), id).unwrap();
    assert_eq!(outcome, MigrationOutcome::FreshVault);
    assert_eq!(vault.identity().unwrap().unwrap().id, id);
    assert!(!vault.meta().unwrap().migration_complete);
}

#[test]
fn legacy_data_is_imported_and_marked_complete() {
    let layout = Layout::new();
    write_full_legacy(&layout);
    let before = layout.snapshot();
    let key = VaultKey::generate();
    let id = IdentityId::new();

    assert!(layout.driver().needs_migration());
    let (vault, outcome) = layout.driver().run(&key, id).unwrap();

    let report = match outcome {
        MigrationOutcome::Migrated(report) => report,
        other => panic!("expected migration, got {other:?}"),
    };
    assert_eq!(report.sessions, 2);
    assert_eq!(report.messages, 3);
    assert_eq!(report.facts, 2);
    assert_eq!(report.preferences, 1);
    assert!(report.backup_dir.join("facts.json").is_file());

    let identity = vault.identity().unwrap().unwrap();
    assert_eq!(identity.id, id);
    assert_eq!(identity.display_name.as_deref(), Some("Alex"));

    let sessions = vault.list_sessions(10).unwrap();
    assert_eq!(sessions.len(), 2);
    let trip = sessions
        .iter()
        .find(|s| s.goal.as_deref() == Some("Trip planning"))
        .unwrap();
    assert_eq!(trip.message_count, 2);
    let messages = vault.list_messages(trip.id).unwrap();
    assert_eq!(messages[0].content, "Find me flights to Lisbon");
    assert_eq!(messages[1].role, Role::Assistant);

    let prefs = vault
        .get_facts(&FactFilter::all().category(PREFERENCE_CATEGORY))
        .unwrap();
    assert_eq!(prefs.len(), 1);
    assert_eq!(prefs[0].object, "metric");

    let meta = vault.meta().unwrap();
    assert!(meta.migration_complete);
    assert!(meta.migration_completed_at.is_some());

    // Legacy files are left alone on success too.
    assert_eq!(layout.snapshot(), before);

    drop(vault);
    let (_, outcome) = layout.driver().run(&key, id).unwrap();
    assert_eq!(outcome, MigrationOutcome::ExistingVault);
}

#[test]
fn repeated_legacy_keys_import_as_one_fact() {
    let layout = Layout::new();
    write_full_legacy(&layout);
    layout.write(
        "facts.json",
        r#"[
            {"category": "location", "key": "city", "value": "Philadelphia"},
            {"category": "location", "key": "city", "value": "Pittsburgh"},
            {"category": "preference", "key": "units", "value": "imperial"}
        ]"#,
    );
    let key = VaultKey::generate();
    let id = IdentityId::new();

    let (vault, outcome) = layout.driver().run(&key, id).unwrap();
    assert!(matches!(outcome, MigrationOutcome::Migrated(_)), "got {outcome:?}");

    let cities = vault
        .get_facts(&FactFilter::all().category("location"))
        .unwrap();
    assert_eq!(cities.len(), 1);
    assert_eq!(cities[0].object, "Pittsburgh");
    // preferences.json is read after facts.json.
    let prefs = vault
        .get_facts(&FactFilter::all().category(PREFERENCE_CATEGORY))
        .unwrap();
    assert_eq!(prefs.len(), 1);
    assert_eq!(prefs[0].object, "metric");

    drop(vault);
    let (_, outcome) = layout.driver().run(&key, id).unwrap();
    assert_eq!(outcome, MigrationOutcome::ExistingVault);
    assert_eq!(std::fs::read_dir(&layout.backups).unwrap().count(), 1);
}

#[test]
fn interrupted_first_open_is_retried() {
    let layout = Layout::new();
    write_full_legacy(&layout);
    let key = VaultKey::generate();
    let id = IdentityId::new();

    // What a process killed between creating the schema and committing
    // the import leaves on disk.
    std::fs::create_dir_all(layout.vault.parent().unwrap()).unwrap();
    drop(Vault::open(&layout.vault, &key).unwrap());

    let (vault, outcome) = layout.driver().run(&key, id).unwrap();
    assert!(matches!(outcome, MigrationOutcome::Migrated(_)), "got {outcome:?}");
    assert_eq!(vault.identity().unwrap().unwrap().id, id);
    assert_eq!(vault.stats().unwrap().fact_count, 3);
    assert!(vault.meta().unwrap().migration_complete);
    vault
        .set_fact(NewFact::new("pets", "dog", "Biscuit"))
        .unwrap();
}

#[test]
fn interrupted_fresh_install_is_retried() {
    let layout = Layout::new();
    let key = VaultKey::generate();
    let id = IdentityId::new();
    std::fs::create_dir_all(layout.vault.parent().unwrap()).unwrap();
    drop(Vault::open(&layout.vault, &key).unwrap());

    let (vault, outcome) = layout.driver().run(&key, id).unwrap();
    assert_eq!(outcome, MigrationOutcome::FreshVault);
    assert_eq!(vault.identity().unwrap().unwrap().id, id);
}

#[test]
fn deadline_expiry_rolls_back() {
    let layout = Layout::new();
    write_full_legacy(&layout);
    let before = layout.snapshot();

    let err = layout
        .driver()
        .with_timeout(Duration::ZERO)
        .run(&VaultKey::generate(), IdentityId::new())
        .unwrap_err();

    assert!(matches!(err, MigrationError::Timeout { .. }), "got {err:?}");
    assert_eq!(layout.snapshot(), before);
    assert!(no_vault_files(&layout.vault));
    assert!(layout.driver().needs_migration());
}

#[test]
fn malformed_legacy_file_rolls_back() {
    let layout = Layout::new();
    write_full_legacy(&layout);
    layout.write(
        "sessions.json",
        r#"[{"messages": [{"role": "narrator", "content": "Once upon a time"}]}]"#,
    );
    let before = layout.snapshot();

    let err = layout
        .driver()
        .run(&VaultKey::generate(), IdentityId::new())
        .unwrap_err();
    assert!(matches!(err, MigrationError::Legacy { .. }), "got {err:?}");
    assert_eq!(layout.snapshot(), before);
    assert!(no_vault_files(&layout.vault));
}

#[test]
fn existing_vault_is_opened_not_migrated() {
    let layout = Layout::new();
    let key = VaultKey::generate();
    let id = IdentityId::new();
    drop(layout.driver().run(&key, id).unwrap());

    write_full_legacy(&layout);
    let (vault, outcome) = layout.driver().run(&key, id).unwrap();
    assert_eq!(outcome, MigrationOutcome::ExistingVault);
    assert_eq!(vault.stats().unwrap().fact_count, 0);
    assert!(!layout.backups.exists());
}
