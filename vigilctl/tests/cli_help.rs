use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("vigilctl");
    let output = cmd.arg("--help").assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&output);
    for command in ["health", "info", "scan", "watch", "list", "show", "delete", "config"] {
        assert!(text.contains(command), "help missing '{command}'");
    }
    assert!(text.contains("--server"), "help missing --server");
}

#[test]
fn scan_help_mentions_consent_and_depth() {
    let mut cmd = cargo_bin_cmd!("vigilctl");
    cmd.args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--i-have-permission"))
        .stdout(predicate::str::contains("--depth"));
}

#[test]
fn scan_without_consent_is_refused_locally() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("vigilctl");
    cmd.current_dir(dir.path())
        // Nothing listens here; the request must never be sent.
        .args(["--server", "http://127.0.0.1:9", "scan", "http://localhost:5001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "You must confirm you have permission to test this application",
        ));
}

#[test]
fn scan_rejects_out_of_range_depth() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("vigilctl");
    cmd.current_dir(dir.path())
        .args([
            "scan",
            "http://localhost:5001",
            "--depth",
            "9",
            "--i-have-permission",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 1 and 5"));
}

#[test]
fn scan_rejects_non_http_targets() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("vigilctl");
    cmd.current_dir(dir.path())
        .args(["scan", "ftp://example.com", "--i-have-permission"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only http and https"));
}
