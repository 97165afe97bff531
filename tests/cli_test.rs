use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("run").arg("tests/fixtures/orders.jsonl");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"id":"order-101","items":["a","b"],"status":"processed"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"id":"order-102","items":["c"],"status":"created"}"#,
        ));

    Ok(())
}

#[test]
fn test_cli_prints_orders_sorted_by_id() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::new(cargo_bin!("orderflow"))
        .arg("run")
        .arg("tests/fixtures/orders.jsonl")
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    let ids: Vec<String> = stdout
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["id"].to_string())
        .collect();
    assert_eq!(ids, vec![r#""order-101""#, r#""order-102""#]);

    Ok(())
}

#[test]
fn test_cli_demo() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("demo");

    cmd.assert()
        .success()
        .stdout(predicate::str::is_match(r"event stream=ORDERS_STREAM sequence=[1-9]\d*")?)
        .stdout(predicate::str::contains(
            r#"{"id":"order-101","items":["a","b"],"status":"processed"}"#,
        ));

    Ok(())
}

#[test]
fn test_cli_stream_name_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.env("NATS_STREAM", "SHOP_ORDERS").arg("demo");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("event stream=SHOP_ORDERS"));

    Ok(())
}

#[test]
fn test_cli_rejects_blank_stream_name() {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("--stream-name").arg("  ").arg("demo");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("value must not be blank"));
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("run").arg("tests/fixtures/does_not_exist.jsonl");

    cmd.assert().failure();
}
