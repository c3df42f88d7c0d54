//! Vexo - a server administration console.
//!
//! This library provides the core functionality for the `vexo` CLI tool,
//! centred on the scheduled-job manager: managed blocks inside a user's
//! crontab, the engine that runs and tests them, execution history and
//! crontab snapshots.

pub mod action_log;
pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crontab;
pub mod exec;
pub mod history;
pub mod sys;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    use crate::config::Settings;
    use crate::crontab::store::FileCrontab;

    /// Test environment with an isolated data directory and a file-backed crontab.
    pub struct TestEnv {
        /// Holds history, logs and backups
        pub data_dir: TempDir,
        /// Holds the crontab file
        pub cron_dir: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                data_dir: TempDir::new().unwrap(),
                cron_dir: TempDir::new().unwrap(),
            }
        }

        /// Get the path to the isolated data directory.
        pub fn data_path(&self) -> &Path {
            self.data_dir.path()
        }

        /// Path of the crontab file used by [`TestEnv::store`].
        pub fn crontab_path(&self) -> PathBuf {
            self.cron_dir.path().join("crontab")
        }

        /// Settings rooted in the temp directories, with a short test timeout.
        pub fn settings(&self) -> Settings {
            let mut settings = Settings::with_data_dir(self.data_path());
            settings.crontab_file = Some(self.crontab_path());
            settings.test_timeout_secs = 5;
            settings
        }

        /// Seed the crontab file with the given lines.
        pub fn write_crontab(&self, lines: &[&str]) {
            let mut text = lines.join("\n");
            if !lines.is_empty() {
                text.push('\n');
            }
            std::fs::write(self.crontab_path(), text).unwrap();
        }

        /// Open the file-backed store.
        pub fn store(&self) -> FileCrontab {
            FileCrontab::new(self.crontab_path())
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Library-level error type for Vexo operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A job named '{0}' already exists")]
    DuplicateName(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Malformed block for job '{name}' at line {line}: {reason}")]
    MalformedBlock {
        name: String,
        line: usize,
        reason: String,
    },

    #[error("Crontab unavailable during {operation}: {message}")]
    StoreUnavailable { operation: String, message: String },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Crontab changed since it was read; re-run the command to act on the current table")]
    StaleDocument,

    #[error("Job '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("Failed to start command for job '{job}': {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Vexo operations.
pub type Result<T> = std::result::Result<T, Error>;
