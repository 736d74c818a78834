use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stash"))
}

/// Isolated XDG config/data homes for one test.
struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    fn data_home(&self) -> PathBuf {
        self.dir.path().join("d")
    }

    fn data_file(&self) -> PathBuf {
        self.data_home().join("stash").join("stash.json")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self, password: Option<&str>) -> Command {
        let mut cmd = Command::new(bin());
        cmd.env("XDG_CONFIG_HOME", self.dir.path().join("c"))
            .env("XDG_DATA_HOME", self.data_home())
            .env("STASH_LOG", "error")
            .env_remove("STASH_CONFIG")
            .env_remove("STASH_PASSWORD")
            .stdin(Stdio::null());
        if let Some(password) = password {
            cmd.env("STASH_PASSWORD", password);
        }
        cmd
    }

    fn run_with(&self, password: Option<&str>, args: &[&str]) -> Output {
        self.command(password)
            .args(args)
            .output()
            .expect("run stash")
    }

    fn run(&self, args: &[&str]) -> String {
        let output = self.run_with(None, args);
        assert!(
            output.status.success(),
            "stash {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).expect("utf8 stdout")
    }

    fn run_json(&self, args: &[&str]) -> Value {
        serde_json::from_str(&self.run(args)).expect("json stdout")
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

#[test]
fn test_missing_config_hints_init() {
    let env = TestEnv::new();
    let output = env.run_with(None, &["list", "accounts"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("stash init"));
}

#[test]
fn test_record_lifecycle() {
    let env = TestEnv::new();
    env.run(&["init"]);
    assert!(env.data_file().exists());

    let created = env.run_json(&[
        "add",
        "accounts",
        "--field",
        "name=Checking",
        "--field",
        "balance=120.5",
        "--json",
    ]);
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(created["balance"], 120.5);

    let listed = env.run_json(&["list", "accounts", "--json"]);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["name"], "Checking");

    let updated = env.run_json(&["update", "accounts", &id, "-f", "balance=99", "--json"]);
    assert_eq!(updated["balance"], 99);
    assert_eq!(updated["name"], "Checking");

    env.run(&["delete", "accounts", &id]);
    let listed = env.run_json(&["list", "accounts", "--json"]);
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let output = env.run_with(None, &["delete", "accounts", &id]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_collection_is_rejected() {
    let env = TestEnv::new();
    env.run(&["init"]);

    let output = env.run_with(None, &["add", "widgets", "-f", "a=1"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Available collections"));
}

#[test]
fn test_settings_are_seeded() {
    let env = TestEnv::new();
    env.run(&["init"]);

    let settings = env.run_json(&["list", "settings", "--json"]);
    assert_eq!(settings[0]["currency"], "USD");
}

#[test]
fn test_export_import_plain_and_gzip() {
    let source = TestEnv::new();
    source.run(&["init"]);
    source.run(&["add", "goals", "-f", "title=Trip", "-f", "target=2000"]);

    let plain = source.path("backup.json");
    let gz = source.path("backup.json.gz");
    source.run(&["export", path_arg(&plain)]);
    source.run(&["export", path_arg(&gz), "--gzip"]);

    let plain_text = std::fs::read_to_string(&plain).expect("read backup");
    let plain_json: Value = serde_json::from_str(&plain_text).expect("backup is json");
    assert!(plain_json["backup_timestamp"].is_string());
    assert_eq!(&std::fs::read(&gz).expect("read gz")[..2], &[0x1f, 0x8b]);

    let target = TestEnv::new();
    target.run(&["init"]);
    target.run(&["import", path_arg(&gz)]);
    let goals = target.run_json(&["list", "goals", "--json"]);
    assert_eq!(goals[0]["title"], "Trip");
}

#[test]
fn test_encrypted_export_needs_password() {
    let env = TestEnv::new();
    env.run(&["init"]);
    env.run(&["add", "credentials", "-f", "site=PLAINTEXT_MARKER"]);

    let backup = env.path("backup.enc");
    let output = env.run_with(
        Some("backup-password-1"),
        &["export", path_arg(&backup), "--encrypt"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let contents = std::fs::read_to_string(&backup).expect("read backup");
    assert!(contents.contains("isEncrypted"));
    assert!(!contents.contains("PLAINTEXT_MARKER"));

    let output = env.run_with(None, &["import", path_arg(&backup)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("STASH_PASSWORD"));

    let output = env.run_with(Some("wrong-password"), &["import", path_arg(&backup)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Decryption failed"));
}

#[test]
fn test_encrypted_at_rest() {
    let env = TestEnv::new();
    let password = Some("at-rest-password-1");
    let output = env.run_with(password, &["init", "--encrypt"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = env.run_with(password, &["add", "documents", "-f", "title=SECRET_TITLE"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let on_disk = std::fs::read_to_string(env.data_file()).expect("read data file");
    assert!(on_disk.contains("isEncrypted"));
    assert!(!on_disk.contains("SECRET_TITLE"));
    assert!(!env.data_home().join("stash").join("stash.mirror.json").exists());

    let output = env.run_with(Some("wrong"), &["list", "documents"]);
    assert!(!output.status.success());
}

#[test]
fn test_passgen_and_strength() {
    let env = TestEnv::new();

    let password = env.run(&["passgen", "--length", "32"]);
    assert_eq!(password.trim().chars().count(), 32);

    let alnum = env.run(&["passgen", "-l", "16", "--no-symbols"]);
    assert!(alnum.trim().chars().all(|c| c.is_ascii_alphanumeric()));

    assert_eq!(env.run(&["strength", "abc"]).trim(), "weak");
    assert_eq!(env.run(&["strength", "Abcdefgh1!xyz"]).trim(), "strong");

    let output = env.run_with(None, &["passgen", "--length", "0"]);
    assert!(!output.status.success());
}

#[test]
fn test_folders_items_and_sizes() {
    let env = TestEnv::new();
    env.run(&["init"]);

    let receipts = env.run(&["-q", "folder", "create", "Receipts"]).trim().to_string();
    let item = env
        .run(&["-q", "item", "add", "Laptop", "--folder", &receipts, "--tag", "tech"])
        .trim()
        .to_string();

    let file = env.path("invoice.pdf");
    std::fs::write(&file, vec![0u8; 2048]).expect("write file");
    env.run(&["attach", &item, path_arg(&file)]);

    let sizes = env.run_json(&["sizes", "--json"]);
    assert_eq!(sizes[&receipts], 2048);

    let output = env.run_with(None, &["folder", "delete", &receipts]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--cascade"));

    env.run(&["folder", "delete", &receipts, "--cascade"]);
    let items = env.run_json(&["item", "list", "--all", "--json"]);
    assert_eq!(items.as_array().map(Vec::len), Some(0));
}

#[test]
fn test_external_attachments_are_files() {
    let env = TestEnv::new();
    env.run(&["init", "--external-attachments"]);

    let item = env.run(&["-q", "item", "add", "Camera"]).trim().to_string();
    let photo = env.path("shot.png");
    std::fs::write(&photo, b"png-bytes").expect("write file");
    let file_id = env.run(&["-q", "attach", &item, path_arg(&photo)]).trim().to_string();

    let stored = env
        .data_home()
        .join("stash")
        .join("attachments")
        .join(format!("{}-shot.png", file_id));
    assert_eq!(std::fs::read(stored).expect("read stored file"), b"png-bytes");
}
