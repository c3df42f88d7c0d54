//! Action logging for vexo commands.
//!
//! Every CLI invocation is appended as one JSON object per line to
//! `<data_dir>/action.log`, unless `action-log #false` is configured.

use crate::config::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Represents a single action log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionLog {
    /// ISO 8601 timestamp when the action occurred
    pub timestamp: DateTime<Utc>,

    /// Crontab the command acted on (file path or `user:<name>`)
    pub crontab: String,

    /// Command name (e.g., "cron add", "cron run", "config set")
    pub command: String,

    /// Command arguments as JSON
    pub args: serde_json::Value,

    /// Whether the command succeeded
    pub success: bool,

    /// Error message if the command failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Command execution duration in milliseconds
    pub duration_ms: u64,

    /// User who executed the command
    pub user: String,
}

/// Log an action to the configured log file.
///
/// This function never fails - problems writing the log are reported on
/// stderr and the command result is unaffected.
pub fn log_action(
    settings: &Settings,
    crontab: &str,
    command: &str,
    args: serde_json::Value,
    success: bool,
    error: Option<String>,
    duration_ms: u64,
) {
    if !settings.action_log {
        return;
    }

    let entry = ActionLog {
        timestamp: Utc::now(),
        crontab: crontab.to_string(),
        command: command.to_string(),
        args: sanitize_args(&args),
        success,
        error,
        duration_ms,
        user: crate::sys::current_user(),
    };

    if let Err(e) = write_log_entry(&settings.action_log_path(), &entry) {
        eprintln!("Warning: Failed to write action log: {}", e);
    }
}

/// Write a log entry to the log file.
fn write_log_entry(path: &Path, entry: &ActionLog) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;

    Ok(())
}

/// Sanitize arguments to remove sensitive data.
///
/// Job commands routinely carry credentials (`mysqldump -pSECRET`,
/// `PGPASSWORD=...`), so the `command` argument is never logged verbatim.
fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, value) in map {
                let key_lower = key.to_lowercase();
                if key_lower.contains("password")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                {
                    sanitized.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else if key_lower == "command" {
                    let summary = match value {
                        serde_json::Value::String(s) => {
                            format!("[command with {} chars]", s.chars().count())
                        }
                        _ => "[command]".to_string(),
                    };
                    sanitized.insert(key.clone(), serde_json::Value::String(summary));
                } else {
                    sanitized.insert(key.clone(), sanitize_args(value));
                }
            }
            serde_json::Value::Object(sanitized)
        }
        serde_json::Value::Array(arr) => {
            if arr.len() > 10 {
                serde_json::Value::String(format!("[Array with {} items]", arr.len()))
            } else {
                serde_json::Value::Array(arr.iter().map(sanitize_args).collect())
            }
        }
        serde_json::Value::String(s) => {
            let count = s.chars().count();
            if count > 100 {
                let head: String = s.chars().take(97).collect();
                serde_json::Value::String(format!("{}... ({} chars)", head, count))
            } else {
                serde_json::Value::String(s.clone())
            }
        }
        _ => args.clone(),
    }
}
