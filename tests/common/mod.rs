//! Common test utilities for vexo integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never touch the
//! real crontab or the user's `~/.local/share/vexo/` directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated data, config and crontab.
///
/// Each `TestEnv` creates three temporary directories:
/// - `data_dir`: history, logs and backups (via `VEXO_DATA_DIR`)
/// - `config_dir`: config.kdl (via `VEXO_CONFIG_DIR`)
/// - `cron_dir`: holds the crontab file (via `VEXO_CRONTAB_FILE`)
///
/// The `vexo()` method sets these per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
    pub cron_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            cron_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a test environment whose crontab holds `lines`.
    pub fn with_crontab(lines: &[&str]) -> Self {
        let env = Self::new();
        env.write_crontab(lines);
        env
    }

    /// Get a Command for the vexo binary with isolated directories.
    pub fn vexo(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_vexo"));
        cmd.current_dir(self.cron_dir.path());
        cmd.env("VEXO_DATA_DIR", self.data_dir.path());
        cmd.env("VEXO_CONFIG_DIR", self.config_dir.path());
        cmd.env("VEXO_CRONTAB_FILE", self.crontab_path());
        cmd.env_remove("VEXO_CRONTAB_USER");
        cmd.env_remove("VEXO_LOG");
        cmd
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn crontab_path(&self) -> PathBuf {
        self.cron_dir.path().join("crontab")
    }

    pub fn write_crontab(&self, lines: &[&str]) {
        let mut text = lines.join("\n");
        if !lines.is_empty() {
            text.push('\n');
        }
        std::fs::write(self.crontab_path(), text).unwrap();
    }

    pub fn read_crontab(&self) -> String {
        std::fs::read_to_string(self.crontab_path()).unwrap_or_default()
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.vexo().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "vexo {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
