use std::fs;
use std::path::{Path, PathBuf};
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn harble_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("harble");
    path
}

/// Config pointing at a port nothing listens on, so every fetch fails fast.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("Hashes.toml"),
        "[incoming]\nHandshake = \"aa\"\n\n[outgoing]\nClientHello = \"bb\"\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[storage]
reference_source = "{root}/Hashes.toml"
reference_working = "{root}/data/Hashes.toml"
cache_dir = "{root}/data/revisions"
state_file = "{root}/data/last.json"

[schedule]
cadence = "6h"

[remote]
revision_url = "http://127.0.0.1:9/external_variables{{domain}}"
build_url = "http://127.0.0.1:9/builds/{{revision}}.json"
timeout_secs = 2
max_retries = 0

[monitor]
environments = ["com", "de"]

[logging]
filter = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("harble.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harble(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harble_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harble binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_status_before_first_check() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_harble(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No environments checked yet."));
    assert!(stdout.contains("Cached revisions: 0"));
}

#[test]
fn test_check_survives_unreachable_remote() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_harble(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("revision updates found: 0"));
    assert!(stdout.contains("failures: 2"));
    assert!(stdout.contains("state saved: yes"));
    assert!(stdout.contains("ok"));

    // Nothing was checked successfully, so the snapshot is empty.
    let state = fs::read_to_string(tmp.path().join("data/last.json")).unwrap();
    assert_eq!(state.trim(), "[]");
    // The working copy and its baseline exist after the first run.
    assert!(tmp.path().join("data/Hashes.toml").exists());
    assert!(tmp.path().join("data/Hashes.toml.sha256").exists());
}

#[test]
fn test_check_aborts_without_reference_data() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("Hashes.toml")).unwrap();

    let (_stdout, stderr, success) = run_harble(&config_path, &["check"]);
    assert!(!success, "check should fail without reference data");
    assert!(stderr.contains("reference data error"));
    assert!(!tmp.path().join("data/last.json").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    let broken = fs::read_to_string(&config_path)
        .unwrap()
        .replace("cadence = \"6h\"", "cadence = \"sometimes\"");
    let broken_path = tmp.path().join("config/broken.toml");
    fs::write(&broken_path, broken).unwrap();

    let (_stdout, stderr, success) = run_harble(&broken_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("schedule.cadence"));
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_stdout, stderr, success) =
        run_harble(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_serve_prints_report_of_console_check() {
    let (tmp, config_path) = setup_test_env();

    let mut child = Command::new(harble_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["serve", "--no-initial-check"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"check\nexit true\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "serve failed: stdout={}, stderr={}",
        stdout,
        stderr
    );
    assert!(stdout.contains("Upcoming Revision Check:"));
    assert!(stdout.contains("revision updates found: 0"));
    assert!(stdout.contains("failures: 2"));
    assert!(stdout.contains("upcoming check:"));
    assert!(stdout.contains("Shutting Down..."));
    assert!(tmp.path().join("data/last.json").exists());
}
