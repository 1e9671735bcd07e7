//! CLI integration tests for the Hearth command-line interface.
//!
//! Parsing tests need nothing on disk. Everything else runs against a
//! throwaway config directory, data directory and legacy directory, with
//! vault credentials supplied through the environment.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use base64::Engine as _;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the hearth binary.
fn hearth() -> Command {
    Command::cargo_bin("hearth").unwrap()
}

/// Isolated config, data and legacy directories plus env credentials.
struct Sandbox {
    root: TempDir,
    key: String,
    identity: String,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("config")).unwrap();
        std::fs::create_dir_all(root.path().join("legacy")).unwrap();

        let config = format!(
            "[vault]\ncredentials = \"env\"\n\n[logging]\nfile = false\n\n[migration]\nlegacy_dir = {:?}\n",
            root.path().join("legacy").display().to_string()
        );
        std::fs::write(root.path().join("config").join("config.toml"), config).unwrap();

        Self {
            root,
            key: base64::engine::general_purpose::STANDARD.encode([7u8; 32]),
            identity: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    fn legacy_dir(&self) -> PathBuf {
        self.root.path().join("legacy")
    }

    fn cmd(&self) -> Command {
        self.cmd_with_data(&self.data_dir())
    }

    fn cmd_with_data(&self, data_dir: &Path) -> Command {
        let mut cmd = hearth();
        cmd.current_dir(self.root.path())
            .env("HEARTH_CONFIG_DIR", self.root.path().join("config"))
            .env("HEARTH_DATA_DIR", data_dir)
            .env("HEARTH_VAULT_KEY", &self.key)
            .env("HEARTH_IDENTITY_ID", &self.identity)
            .env_remove("HEARTH_EXPORT_PASSPHRASE")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run with `--json` and parse stdout.
    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "hearth {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// `facts set ... --json`, returning the new fact's id.
    fn set_fact(&self, args: &[&str]) -> String {
        let mut full = vec!["facts", "set"];
        full.extend_from_slice(args);
        self.json(&full)["id"].as_str().unwrap().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    hearth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hearth"))
        .stdout(predicate::str::contains("personal memory"));
}

#[test]
fn test_version_displays() {
    hearth()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hearth"));
}

#[test]
fn test_help_lists_subcommands() {
    hearth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("context"))
        .stdout(predicate::str::contains("reinforce"))
        .stdout(predicate::str::contains("facts"))
        .stdout(predicate::str::contains("notes"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_facts_help_lists_subcommands() {
    hearth()
        .args(["facts", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("delete"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Validation Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_context_requires_goal() {
    hearth()
        .arg("context")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<GOAL>"));
}

#[test]
fn test_max_pii_out_of_range_rejected() {
    hearth()
        .args(["context", "weather", "--max-pii", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--max-pii"));
}

#[test]
fn test_invalid_consent_rejected() {
    hearth()
        .args(["facts", "set", "pets", "dog", "Biscuit", "--consent", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("never_upload"));
}

#[test]
fn test_reinforce_requires_ids() {
    hearth().arg("reinforce").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Vault Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_env_credentials_fail() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .env_remove("HEARTH_VAULT_KEY")
        .args(["facts", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HEARTH_VAULT_KEY"));
    assert!(!sandbox.data_dir().join("vault.db").exists());
}

#[test]
fn test_facts_set_and_list() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["facts", "set", "pets", "dog", "Biscuit", "--pii", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Remembered"));
    sandbox
        .cmd()
        .args(["facts", "set", "location", "city", "Philadelphia", "--pii", "1"])
        .assert()
        .success();

    // Only level-0 facts without --include-pii.
    sandbox
        .cmd()
        .args(["facts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Biscuit"))
        .stdout(predicate::str::contains("Philadelphia").not());

    let facts = sandbox.json(&["facts", "list", "--include-pii"]);
    assert_eq!(facts.as_array().unwrap().len(), 2);
    assert!(sandbox.data_dir().join("vault.db").exists());
}

#[test]
fn test_facts_update_and_delete() {
    let sandbox = Sandbox::new();
    let id = sandbox.set_fact(&["pets", "dog", "Biscuit", "--pii", "0"]);

    let updated = sandbox.json(&["facts", "update", &id, "--object", "Pretzel"]);
    assert_eq!(updated["object"], "Pretzel");

    sandbox
        .cmd()
        .args(["facts", "update", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to update"));

    sandbox
        .cmd()
        .args(["facts", "delete", &id])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["facts", "delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_context_respects_pii_ceiling() {
    let sandbox = Sandbox::new();
    sandbox.set_fact(&[
        "personal", "name", "Alex", "--priority", "1.0", "--pii", "0", "--consent", "default",
    ]);
    sandbox.set_fact(&[
        "location", "city", "Philadelphia", "--pii", "1", "--consent", "default",
    ]);
    sandbox.set_fact(&[
        "location", "address", "12 Elm St", "--pii", "3", "--consent", "default",
    ]);

    let payload = sandbox.json(&["context", "what is the weather like in my city", "--budget", "200"]);
    let text = payload["facts"].to_string();
    assert!(text.contains("Alex"));
    assert!(text.contains("Philadelphia"));
    assert!(!text.contains("12 Elm St"));
    assert_eq!(payload["selector_version"], "hybrid-1");
    assert!(payload["tokens_used"].as_u64().unwrap() > 0);

    // A lower ceiling drops the city too; the forced name stays.
    let payload = sandbox.json(&[
        "context",
        "what is the weather like in my city",
        "--max-pii",
        "0",
    ]);
    let text = payload["facts"].to_string();
    assert!(text.contains("Alex"));
    assert!(!text.contains("Philadelphia"));
}

#[test]
fn test_context_never_uploads_by_default() {
    let sandbox = Sandbox::new();
    // No --consent: restrictive default.
    sandbox.set_fact(&["health", "allergy", "peanuts", "--pii", "0"]);

    sandbox
        .cmd()
        .args(["context", "peanuts allergy", "--prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("peanuts").not());
}

#[test]
fn test_context_prompt_output() {
    let sandbox = Sandbox::new();
    sandbox.set_fact(&["food", "favourite", "ramen", "--pii", "0", "--consent", "default"]);

    sandbox
        .cmd()
        .args(["context", "favourite food", "--prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Known facts"))
        .stdout(predicate::str::contains("food.favourite: ramen"));
}

#[test]
fn test_context_rejects_blank_goal() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["context", "   "])
        .assert()
        .failure();
}

#[test]
fn test_reinforce_increments_count() {
    let sandbox = Sandbox::new();
    let id = sandbox.set_fact(&["food", "favourite", "ramen", "--pii", "0", "--consent", "default"]);

    let reinforced = sandbox.json(&["reinforce", &id]);
    assert_eq!(reinforced[0]["reinforcement_count"], 1);

    let reinforced = sandbox.json(&["reinforce", &id]);
    assert_eq!(reinforced[0]["reinforcement_count"], 2);

    sandbox
        .cmd()
        .args(["reinforce", "not-a-fact-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid fact ID"));
}

#[test]
fn test_notes_add_and_list() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args([
            "notes",
            "add",
            "Paint: sage green, eggshell finish",
            "--title",
            "Kitchen",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Note created"));

    sandbox
        .cmd()
        .args(["notes", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kitchen"));
}

#[test]
fn test_session_messages_feed_context() {
    let sandbox = Sandbox::new();
    let session = sandbox.json(&["session", "start", "--goal", "kitchen"]);
    let session_id = session["id"].as_str().unwrap().to_string();

    sandbox
        .cmd()
        .args([
            "session",
            "add",
            &session_id,
            "I want to repaint the kitchen sage green",
        ])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["session", "show", &session_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("repaint the kitchen"));

    let payload = sandbox.json(&["context", "kitchen paint colour"]);
    assert_eq!(payload["messages"].as_array().unwrap().len(), 1);

    let ended = sandbox.json(&["session", "end", &session_id]);
    assert!(ended["ended_at"].is_string());
}

#[test]
fn test_health_json() {
    let sandbox = Sandbox::new();
    sandbox.set_fact(&["pets", "dog", "Biscuit"]);

    let health = sandbox.json(&["health"]);
    assert_eq!(health["selector_version"], "hybrid-1");
    assert_eq!(health["stats"]["fact_count"], 1);
    assert_eq!(health["stats"]["identity_count"], 1);
    assert_eq!(health["embedder"], "hashing-256");
}

// ─────────────────────────────────────────────────────────────────────────────
// Export and Restore Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_export_and_restore() {
    let sandbox = Sandbox::new();
    sandbox.set_fact(&["pets", "dog", "Biscuit", "--pii", "0"]);
    let export = sandbox.root.path().join("vault.hearth");

    sandbox
        .cmd()
        .args(["export"])
        .arg(&export)
        .args(["--passphrase", "correct horse"])
        .assert()
        .success();
    let blob = std::fs::read_to_string(&export).unwrap();
    assert!(blob.contains("BEGIN AGE ENCRYPTED FILE"));
    assert!(!blob.contains("Biscuit"));

    // Refuses to overwrite without --force.
    sandbox
        .cmd()
        .args(["export"])
        .arg(&export)
        .args(["--passphrase", "correct horse"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    let restored_dir = sandbox.root.path().join("restored");
    sandbox
        .cmd_with_data(&restored_dir)
        .args(["restore"])
        .arg(&export)
        .args(["--passphrase", "wrong"])
        .assert()
        .failure();
    assert!(!restored_dir.join("vault.db").exists());

    sandbox
        .cmd_with_data(&restored_dir)
        .env("HEARTH_EXPORT_PASSPHRASE", "correct horse")
        .args(["restore"])
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 1 facts"));

    sandbox
        .cmd_with_data(&restored_dir)
        .args(["facts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Biscuit"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_migrate_status_and_run() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.legacy_dir().join("profile.json"),
        r#"{"name": "Alex"}"#,
    )
    .unwrap();
    std::fs::write(
        sandbox.legacy_dir().join("facts.json"),
        r#"[{"category": "pets", "key": "dog", "value": "Biscuit", "pii_level": 0, "consent": "default"}]"#,
    )
    .unwrap();

    let status = sandbox.json(&["migrate", "status"]);
    assert_eq!(status["needs_migration"], true);
    assert_eq!(status["legacy_files"].as_array().unwrap().len(), 2);

    sandbox
        .cmd()
        .args(["migrate", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 0 sessions, 0 messages, 1 facts"));

    let backups: Vec<_> = std::fs::read_dir(sandbox.data_dir().join("backups"))
        .unwrap()
        .collect();
    assert_eq!(backups.len(), 1);

    let health = sandbox.json(&["health"]);
    assert_eq!(health["meta"]["migration_complete"], true);

    sandbox
        .cmd()
        .args(["migrate", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_repeated_legacy_keys_migrate_once() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.legacy_dir().join("facts.json"),
        r#"[
            {"category": "location", "key": "city", "value": "Philadelphia"},
            {"category": "location", "key": "city", "value": "Pittsburgh"}
        ]"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["facts", "list", "--include-pii"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pittsburgh"))
        .stdout(predicate::str::contains("Philadelphia").not());
    sandbox.cmd().args(["health"]).assert().success();

    let backups = std::fs::read_dir(sandbox.data_dir().join("backups"))
        .unwrap()
        .count();
    assert_eq!(backups, 1);
}

#[test]
fn test_failed_migration_leaves_no_vault() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.legacy_dir().join("sessions.json"), "{not json").unwrap();

    sandbox
        .cmd()
        .args(["migrate", "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sessions.json"));
    assert!(!sandbox.data_dir().join("vault.db").exists());
    assert_eq!(
        std::fs::read_to_string(sandbox.legacy_dir().join("sessions.json")).unwrap(),
        "{not json"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_and_path() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[selector]"))
        .stdout(predicate::str::contains("credentials = \"env\""));

    let paths = sandbox.json(&["config", "path"]);
    assert_eq!(
        paths["vault"].as_str().unwrap(),
        sandbox.data_dir().join("vault.db").display().to_string()
    );
}

#[test]
fn test_config_which_reports_loaded_file() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains("loaded"));
}
