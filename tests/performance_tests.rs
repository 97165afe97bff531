use assert_cmd::cargo_bin;
use std::process::Command;

mod common;

const ROWS: usize = 2_000;

#[test]
fn test_large_replay() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("large_replay.jsonl");
    common::generate_replay(&replay, ROWS).expect("Failed to generate replay");

    let output = Command::new(cargo_bin!("orderflow"))
        .arg("run")
        .arg(&replay)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "Binary failed to replay large file");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), ROWS);
    assert_eq!(
        stdout.lines().filter(|l| l.contains(r#""status":"processed""#)).count(),
        ROWS / 2
    );
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_large_replay_db() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("large_replay.jsonl");
    common::generate_replay(&replay, ROWS).expect("Failed to generate replay");

    let status = Command::new(cargo_bin!("orderflow"))
        .arg("--db-path")
        .arg(dir.path().join("test_db"))
        .arg("run")
        .arg(&replay)
        .status()
        .expect("Failed to execute command");
    assert!(status.success(), "Binary failed to replay large file");
}
