//! Integration tests for running and testing jobs through the CLI.

#![cfg(unix)]

mod common;

use common::TestEnv;
use predicates::prelude::*;

// === Run now ===

#[test]
fn test_run_streams_output_and_records_history() {
    let env = TestEnv::with_crontab(&["# vexo: hello", "* * * * * echo hello; echo oops >&2"]);

    env.vexo()
        .args(["-H", "cron", "run", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello\n"))
        .stdout(predicate::str::contains("hello succeeded (exit 0"));

    let history = env.json(&["cron", "history", "hello"]);
    assert_eq!(history["count"], 1);
    let record = &history["records"][0];
    assert_eq!(record["trigger"], "manual");
    assert_eq!(record["status"], "succeeded");
    assert_eq!(record["exit_code"], 0);
    assert!(record["output_snippet"].as_str().unwrap().contains("oops"));
}

#[test]
fn test_run_failure_is_recorded_not_an_error() {
    let env = TestEnv::with_crontab(&["# vexo: broken-job", "* * * * * exit 4"]);

    let result = env.json(&["cron", "run", "broken-job"]);
    assert_eq!(result["record"]["status"], "failed");
    assert_eq!(result["record"]["exit_code"], 4);

    env.vexo()
        .args(["cron", "log", "broken-job"])
        .assert()
        .success()
        .stdout(predicate::str::contains("broken-job failed (exit 4"));
}

#[test]
fn test_run_json_keeps_stdout_parseable() {
    let env = TestEnv::with_crontab(&["# vexo: a", "* * * * * echo streamed"]);

    let output = env.vexo().args(["cron", "run", "a"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["output"], "streamed\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("streamed"));
}

#[test]
fn test_run_unknown_job_spawns_nothing() {
    let env = TestEnv::new();
    env.vexo()
        .args(["cron", "run", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job not found: ghost"));
    assert!(!env.data_path().join("history.jsonl").exists());
}

// === Test ===

#[test]
fn test_static_test_classifies_paths() {
    let env = TestEnv::new();
    let existing = env.cron_dir.path().join("x.sql.gz");
    let command = format!(
        "pg_dump db > {} 2>> /no/such/tree/err.log; cat /no/such/tree/file",
        existing.display()
    );
    env.write_crontab(&["# vexo: db", &format!("0 2 * * * {}", command)]);

    let report = env.json(&["cron", "test", "db", "--no-exec"]);

    let paths = report["paths"].as_array().unwrap();
    let status_of = |suffix: &str| {
        paths
            .iter()
            .find(|p| p["path"].as_str().unwrap().ends_with(suffix))
            .map(|p| p["status"].as_str().unwrap().to_string())
    };
    assert_eq!(status_of("x.sql.gz").as_deref(), Some("missing_parent_exists"));
    assert_eq!(status_of("err.log").as_deref(), Some("created_on_write"));
    assert_eq!(status_of("tree/file").as_deref(), Some("missing"));
    assert!(report.get("execution").is_none());
    assert!(
        report["hints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|h| h["token"] == "pg_dump")
    );
    assert!(!env.data_path().join("history.jsonl").exists());
}

#[test]
fn test_test_execution_uses_test_suffix() {
    let env = TestEnv::with_crontab(&["# vexo: nightly", "0 1 * * * echo ran"]);

    let report = env.json(&["cron", "test", "nightly"]);
    assert_eq!(report["execution"]["record"]["job_name"], "nightly-test");
    assert_eq!(report["execution"]["record"]["trigger"], "test");

    let production = env.json(&["cron", "history", "nightly"]);
    assert_eq!(production["count"], 0);
    let tests = env.json(&["cron", "history", "nightly-test"]);
    assert_eq!(tests["count"], 1);

    env.vexo()
        .args(["cron", "log", "nightly", "--test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ran"));
}

#[test]
fn test_test_timeout_reports_timed_out() {
    let env = TestEnv::with_crontab(&["# vexo: slow", "* * * * * sleep 30"]);

    let start = std::time::Instant::now();
    let report = env.json(&["cron", "test", "slow", "--timeout", "1"]);

    assert_eq!(report["execution"]["record"]["status"], "timed_out");
    assert!(report["execution"]["record"]["exit_code"].is_null());
    assert!(start.elapsed() < std::time::Duration::from_secs(15));
}

#[test]
fn test_test_timeout_from_config() {
    let env = TestEnv::with_crontab(&["# vexo: slow", "* * * * * sleep 30"]);
    env.vexo()
        .args(["config", "set", "test-timeout-secs", "1"])
        .assert()
        .success();

    let report = env.json(&["cron", "test", "slow"]);
    assert_eq!(report["execution"]["record"]["status"], "timed_out");
}

#[test]
fn test_human_test_report() {
    let env = TestEnv::with_crontab(&["# vexo: a", "* * * * * sh -c 'exit 0' > /dev/null"]);
    env.vexo()
        .args(["-H", "cron", "test", "a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test of a:"))
        .stdout(predicate::str::contains("Execution: succeeded"));
}
