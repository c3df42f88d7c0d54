//! Execution history.
//!
//! Every run and test execution is recorded twice:
//!
//! - one JSON object per line in the shared history file
//!   (`<data_dir>/history.jsonl`), queried by `vexo cron history`;
//! - a verbose plain-text entry in the job's own log
//!   (`<log_dir>/<job_name>.log`), read by `vexo cron log`:
//!
//! ```text
//! 2026-10-17T02:00:00Z [INFO] db-backup started (manual)
//! command: pg_dump db > /backups/db.sql.gz
//! ...output...
//! 2026-10-17T02:00:04Z [INFO] db-backup succeeded (exit 0, 4012ms)
//! ```
//!
//! Both files are append-only.

use crate::Result;
use crate::config::Settings;
use crate::exec::{Execution, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix that keeps test records apart from production history.
pub const TEST_SUFFIX: &str = "-test";

/// Name under which test executions of `name` are recorded.
pub fn test_job_name(name: &str) -> String {
    format!("{}{}", name, TEST_SUFFIX)
}

/// What started an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Test,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Test => write!(f, "test"),
        }
    }
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_name: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// `None` when timed out or killed by a signal
    pub exit_code: Option<i32>,
    pub status: RunStatus,
    /// Tail of the combined output
    pub output_snippet: String,
}

impl ExecutionRecord {
    pub fn from_execution(
        job_name: &str,
        trigger: Trigger,
        execution: &Execution,
        snippet_chars: usize,
    ) -> Self {
        Self {
            job_name: job_name.to_string(),
            trigger,
            started_at: execution.started_at,
            duration_ms: execution.duration.as_millis() as u64,
            exit_code: execution.exit_code,
            status: execution.status,
            output_snippet: output_tail(&execution.output, snippet_chars),
        }
    }
}

/// The last `max_chars` characters of `output`.
pub fn output_tail(output: &str, max_chars: usize) -> String {
    let count = output.chars().count();
    if count <= max_chars {
        return output.to_string();
    }
    output.chars().skip(count - max_chars).collect()
}

/// Reader and writer for the history file and per-job logs.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    history_path: PathBuf,
    log_dir: PathBuf,
}

impl HistoryLog {
    pub fn new(history_path: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_path: history_path.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.history_path(), settings.log_dir.clone())
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn job_log_path(&self, job_name: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", job_name))
    }

    /// Append a record to the shared history file.
    pub fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut file = open_append(&self.history_path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    /// Append a verbose entry to the job's own log file.
    pub fn append_job_log(
        &self,
        record: &ExecutionRecord,
        command: &str,
        output: &str,
    ) -> Result<PathBuf> {
        let path = self.job_log_path(&record.job_name);
        let mut entry = format!(
            "{} [INFO] {} started ({})\ncommand: {}\n",
            timestamp(&record.started_at),
            record.job_name,
            record.trigger,
            command
        );
        entry.push_str(output);
        if !output.is_empty() && !output.ends_with('\n') {
            entry.push('\n');
        }

        let finished = record.started_at
            + chrono::Duration::milliseconds(record.duration_ms.min(i64::MAX as u64) as i64);
        let exit = match record.exit_code {
            Some(code) => format!("exit {}", code),
            None => "no exit code".to_string(),
        };
        entry.push_str(&format!(
            "{} [{}] {} {} ({}, {}ms)\n",
            timestamp(&finished),
            level(record.status),
            record.job_name,
            record.status,
            exit,
            record.duration_ms
        ));

        let mut file = open_append(&path)?;
        file.write_all(entry.as_bytes())?;
        Ok(path)
    }

    /// Most recent records, oldest first, optionally for one exact job name.
    ///
    /// Lines that do not parse are skipped.
    pub fn read(&self, job_name: Option<&str>, limit: usize) -> Result<Vec<ExecutionRecord>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.history_path)?;

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionRecord>(line) {
                Ok(record) => {
                    if job_name.is_none_or(|name| record.job_name == name) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "skipping unreadable history entry at {}:{}: {}",
                        self.history_path.display(),
                        number + 1,
                        e
                    );
                }
            }
        }

        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    /// Last `lines` lines of a job log, or `None` if the job never ran.
    pub fn tail_job_log(&self, job_name: &str, lines: usize) -> Result<Option<Vec<String>>> {
        let path = self.job_log_path(job_name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let all: Vec<&str> = content.lines().collect();
        let skip = all.len().saturating_sub(lines);
        Ok(Some(all[skip..].iter().map(|l| l.to_string()).collect()))
    }
}

fn open_append(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn level(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Succeeded => "INFO",
        RunStatus::Failed => "WARN",
        RunStatus::TimedOut => "ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn execution(status: RunStatus, exit_code: Option<i32>, output: &str) -> Execution {
        Execution {
            status,
            exit_code,
            started_at: Utc::now(),
            duration: Duration::from_millis(42),
            output: output.to_string(),
        }
    }

    fn log(temp: &TempDir) -> HistoryLog {
        HistoryLog::new(temp.path().join("history.jsonl"), temp.path().join("logs"))
    }

    fn record(job: &str, trigger: Trigger) -> ExecutionRecord {
        ExecutionRecord::from_execution(
            job,
            trigger,
            &execution(RunStatus::Succeeded, Some(0), "ok\n"),
            500,
        )
    }

    #[test]
    fn test_output_tail() {
        assert_eq!(output_tail("hello", 10), "hello");
        assert_eq!(output_tail("hello", 3), "llo");
        assert_eq!(output_tail("héllo wörld", 5), "wörld");
        assert_eq!(output_tail("", 5), "");
    }

    #[test]
    fn test_record_snippet_is_bounded() {
        let output = "x".repeat(1000) + "END";
        let record = ExecutionRecord::from_execution(
            "job",
            Trigger::Manual,
            &execution(RunStatus::Failed, Some(1), &output),
            500,
        );
        assert_eq!(record.output_snippet.chars().count(), 500);
        assert!(record.output_snippet.ends_with("END"));
        assert_eq!(record.duration_ms, 42);
    }

    #[test]
    fn test_record_json_shape() {
        let record = ExecutionRecord::from_execution(
            "slow-test",
            Trigger::Test,
            &execution(RunStatus::TimedOut, None, ""),
            500,
        );
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["trigger"], "test");
        assert_eq!(json["status"], "timed_out");
        assert!(json["exit_code"].is_null());
    }

    #[test]
    fn test_append_and_read_filters_exact_name() {
        let temp = TempDir::new().unwrap();
        let log = log(&temp);
        log.append(&record("db-backup", Trigger::Manual)).unwrap();
        log.append(&record("db-backup-test", Trigger::Test)).unwrap();
        log.append(&record("other", Trigger::Manual)).unwrap();

        assert_eq!(log.read(None, 10).unwrap().len(), 3);
        let only = log.read(Some("db-backup"), 10).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].job_name, "db-backup");
    }

    #[test]
    fn test_read_limit_keeps_most_recent() {
        let temp = TempDir::new().unwrap();
        let log = log(&temp);
        for job in ["a", "b", "c", "d"] {
            log.append(&record(job, Trigger::Manual)).unwrap();
        }
        let names: Vec<String> = log
            .read(None, 2)
            .unwrap()
            .into_iter()
            .map(|r| r.job_name)
            .collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(log(&temp).read(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_skips_corrupt_lines() {
        let temp = TempDir::new().unwrap();
        let log = log(&temp);
        log.append(&record("a", Trigger::Manual)).unwrap();
        let mut file = open_append(log.history_path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        log.append(&record("b", Trigger::Manual)).unwrap();

        assert_eq!(log.read(None, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_job_log_entry_and_tail() {
        let temp = TempDir::new().unwrap();
        let log = log(&temp);
        let rec = record("nightly", Trigger::Manual);

        let path = log.append_job_log(&rec, "echo ok", "ok\n").unwrap();
        assert_eq!(path, temp.path().join("logs").join("nightly.log"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[INFO] nightly started (manual)"));
        assert!(content.contains("command: echo ok\nok\n"));
        assert!(content.contains("nightly succeeded (exit 0, 42ms)"));

        let tail = log.tail_job_log("nightly", 1).unwrap().unwrap();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].contains("succeeded"));
    }

    #[test]
    fn test_tail_missing_job_log() {
        let temp = TempDir::new().unwrap();
        assert!(log(&temp).tail_job_log("never-ran", 10).unwrap().is_none());
    }

    #[test]
    fn test_test_job_name() {
        assert_eq!(test_job_name("db-backup"), "db-backup-test");
    }
}
