//! End-to-end tests for the dashsync binary.

use assert_cmd::Command;
use dashsync::storage::SqliteStorage;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One environment: its own database, blob store and status directory.
struct Env {
    _dir: TempDir,
    root: PathBuf,
    blobs: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let blobs = root.join("blobs");
        Self {
            _dir: dir,
            root,
            blobs,
        }
    }

    /// Separate database and status directory, same blob store as `other`.
    fn sharing_blobs(other: &Self) -> Self {
        Self {
            blobs: other.blobs.clone(),
            ..Self::new()
        }
    }

    fn db(&self) -> PathBuf {
        self.root.join("data").join("dashsync.db")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dashsync").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.db())
            .arg("--blob-dir")
            .arg(&self.blobs)
            .arg("--status-dir")
            .arg(self.root.join("status"))
            .arg("--quiet");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn init(&self) {
        self.cmd().arg("init").assert().success();
    }
}

fn seed(db: &Path) {
    let storage = SqliteStorage::open(db).unwrap();
    let conn = storage.conn();
    for i in 0..5 {
        conn.execute(
            "INSERT INTO keywords (id, term, is_active, created_at) VALUES (?1, ?2, 1, 1000)",
            rusqlite::params![format!("k{i}"), format!("term number {i}")],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO authors (id, platform, platform_id, handle, created_at)
             VALUES (?1, 'x', ?2, ?3, 1000)",
            rusqlite::params![format!("a{i}"), format!("pid-{i}"), format!("handle_{i}")],
        )
        .unwrap();
    }
}

fn export_to(env: &Env, version: &str) -> PathBuf {
    let out = env.root.join("snapshot.json");
    env.cmd()
        .args(["export", "--sync-version", version, "--out"])
        .arg(&out)
        .assert()
        .success();
    out
}

fn count(db: &Path, table: &str) -> usize {
    SqliteStorage::open(db).unwrap().count_rows(table).unwrap()
}

#[test]
fn test_version() {
    let output = Command::cargo_bin("dashsync")
        .unwrap()
        .args(["version", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let version: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_completions() {
    let output = Command::cargo_bin("dashsync")
        .unwrap()
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dashsync"));
}

#[test]
fn test_commands_require_init() {
    let env = Env::new();
    env.cmd().args(["export"]).assert().failure().code(2);
    env.cmd().args(["ledger"]).assert().failure().code(2);
}

#[test]
fn test_init_twice_fails_without_force() {
    let env = Env::new();
    env.init();
    env.cmd().arg("init").assert().failure().code(2);
    env.cmd().args(["init", "--force"]).assert().success();
}

#[test]
fn test_export_to_stdout() {
    let env = Env::new();
    env.init();
    seed(&env.db());

    let output = env
        .cmd()
        .args(["export", "--sync-version", "9", "--tables", "keywords"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let payload: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(payload["version"], 9);
    assert_eq!(payload["data"]["keywords"].as_array().unwrap().len(), 5);
    assert!(payload["data"].get("authors").is_none());
}

#[test]
fn test_export_unknown_table() {
    let env = Env::new();
    env.init();
    env.cmd()
        .args(["export", "--tables", "users"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_upload_then_import_between_environments() {
    let source = Env::new();
    source.init();
    seed(&source.db());
    let snapshot = export_to(&source, "42");

    let uploaded = source.json(&["upload", snapshot.to_str().unwrap(), "--chunk-size", "128"]);
    let key = uploaded["syncKey"].as_str().unwrap().to_string();
    assert!(key.starts_with("sync-"));
    assert!(uploaded["parts"].as_u64().unwrap() > 1);

    let target = Env::sharing_blobs(&source);
    target.init();

    let report = target.json(&["import", "--key", &key]);
    assert_eq!(report["success"], true);
    assert_eq!(report["syncVersion"], 42);
    assert_eq!(report["tables"]["keywords"]["inserted"], 5);
    assert_eq!(report["tables"]["authors"]["inserted"], 5);
    assert_eq!(count(&target.db(), "keywords"), 5);
    assert_eq!(count(&target.db(), "authors"), 5);

    let status = target.json(&["status", &key]);
    assert_eq!(status["status"], "completed");

    let ledger = target.json(&["ledger", "--sync-version", "42"]);
    let tables: Vec<&str> = ledger
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["tableName"].as_str().unwrap())
        .collect();
    assert!(tables.contains(&"keywords"));
    assert!(tables.contains(&"authors"));

    // Second run at the same version changes nothing
    let again = target.json(&["import", "--key", &key]);
    assert_eq!(again["success"], true);
    assert_eq!(again["tables"]["keywords"]["skipped"], true);
    assert_eq!(count(&target.db(), "keywords"), 5);
}

#[test]
fn test_import_from_file_reports_conflicts() {
    let source = Env::new();
    source.init();
    seed(&source.db());
    let snapshot = export_to(&source, "1");

    // Same rows already present on the target, different version
    let target = Env::new();
    target.init();
    seed(&target.db());

    let report = target.json(&[
        "import",
        "--file",
        snapshot.to_str().unwrap(),
        "--sync-version",
        "2",
    ]);
    assert_eq!(report["success"], true);
    assert_eq!(report["tables"]["keywords"]["conflicts"], 5);
    assert_eq!(report["tables"]["keywords"]["inserted"], 0);
    assert_eq!(count(&target.db(), "keywords"), 5);
}

#[test]
fn test_stepwise_transport() {
    let env = Env::new();
    env.init();
    seed(&env.db());
    let snapshot = export_to(&env, "7");
    let path = snapshot.to_str().unwrap();
    let size = std::fs::metadata(&snapshot).unwrap().len();

    let started = env.json(&["transport", "start", "--chunk-size", "64"]);
    let key = started["syncKey"].as_str().unwrap().to_string();
    let upload_id = started["uploadId"].as_str().unwrap().to_string();
    let parts = size.div_ceil(64);
    assert!(parts >= 3);

    let mut refs = Vec::new();
    for n in 1..=parts {
        let part = env.json(&[
            "transport",
            "part",
            &key,
            "--upload-id",
            &upload_id,
            "--part-number",
            &n.to_string(),
            path,
            "--slice",
        ]);
        refs.push(format!("{n}:{}", part["etag"].as_str().unwrap()));
    }

    // Part 2 left out
    let gapped = format!("{},{}", refs[0], refs[2]);
    env.cmd()
        .args(["transport", "complete", &key, "--upload-id", &upload_id, "--parts", &gapped])
        .assert()
        .failure()
        .code(5);

    let listed = env.json(&["transport", "list"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let done = env.json(&[
        "transport",
        "complete",
        &key,
        "--upload-id",
        &upload_id,
        "--parts",
        &refs.join(","),
    ]);
    assert_eq!(done["size"].as_u64().unwrap(), size);

    let stored = std::fs::read(env.blobs.join("objects").join(&key)).unwrap();
    assert_eq!(stored, std::fs::read(&snapshot).unwrap());

    let status = env.json(&["status", &key]);
    assert_eq!(status["status"], "pending");
}

#[test]
fn test_transport_abort() {
    let env = Env::new();
    env.init();

    let started = env.json(&["transport", "start"]);
    let key = started["syncKey"].as_str().unwrap();
    let upload_id = started["uploadId"].as_str().unwrap();

    env.json(&["transport", "abort", key, "--upload-id", upload_id]);
    let listed = env.json(&["transport", "list"]);
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn test_status_unknown_key() {
    let env = Env::new();
    env.init();
    env.cmd()
        .args(["status", "sync-1-deadbeef"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_import_missing_blob() {
    let env = Env::new();
    env.init();
    env.cmd()
        .args(["import", "--key", "sync-1-deadbeef"])
        .assert()
        .failure()
        .code(3);
}
