//! Integration tests for `vexo doctor`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_doctor_flags_malformed_block() {
    let env = TestEnv::with_crontab(&["# vexo: orphan"]);
    let report = env.json(&["doctor"]);
    let checks = report["checks"].as_array().unwrap();
    assert!(
        checks
            .iter()
            .any(|c| c["name"] == "malformed-block" && c["status"] == "warn")
    );
}

#[test]
fn test_doctor_healthy_on_clean_environment() {
    let env = TestEnv::with_crontab(&["# vexo: a", "* * * * * true"]);
    let report = env.json(&["doctor"]);
    assert_eq!(report["healthy"], true);
    let checks = report["checks"].as_array().unwrap();
    assert!(
        checks
            .iter()
            .any(|c| c["name"] == "crontab-read" && c["status"] == "ok")
    );
    // File-backed store needs no crontab binary.
    assert!(!checks.iter().any(|c| c["name"] == "crontab"));
}

#[test]
fn test_doctor_human_output() {
    let env = TestEnv::new();
    env.vexo()
        .args(["-H", "doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok  ] crontab-read"));
}
