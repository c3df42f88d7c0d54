//! `vexo cron ...` commands.

use super::{Output, human_duration};
use crate::backup::{self, BackupSnapshot, BackupStore, RestoreResult};
use crate::config::Settings;
use crate::crontab::store::CrontabStore;
use crate::crontab::{CrontabFormat, ManagedBlock, MalformedBlock, reconcile};
use crate::exec::{Engine, RunReport, TestOptions, TestReport};
use crate::history::{ExecutionRecord, HistoryLog, test_job_name};
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn status_label(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

fn exit_label(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit {}", code),
        None => "no exit code".to_string(),
    }
}

/// Read, transform and install if anything changed.
///
/// The install is rejected with `StaleDocument` if the crontab changed after
/// it was read.
fn apply<F>(store: &dyn CrontabStore, format: &CrontabFormat, edit: F) -> Result<(Vec<String>, bool)>
where
    F: FnOnce(&[String], &CrontabFormat) -> Result<Vec<String>>,
{
    let document = store.read_all()?;
    let lines = edit(document.lines(), format)?;
    let changed = lines.as_slice() != document.lines();
    if changed {
        store.install_checked(document.fingerprint(), &lines)?;
    }
    Ok((lines, changed))
}

// === List / Show ===

#[derive(Debug, Serialize)]
pub struct CronList {
    pub crontab: String,
    pub store_type: String,
    pub count: usize,
    pub jobs: Vec<ManagedBlock>,
    pub malformed: Vec<MalformedBlock>,
    pub foreign_lines: usize,
}

impl Output for CronList {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "{} managed job(s) in {} ({}), {} other line(s)",
            self.count, self.crontab, self.store_type, self.foreign_lines
        ));

        if !self.jobs.is_empty() {
            let width = self.jobs.iter().map(|j| j.name.len()).max().unwrap_or(0);
            lines.push(String::new());
            for job in &self.jobs {
                lines.push(format!(
                    "  {:width$}  {:8}  {:15}  {}",
                    job.name,
                    status_label(job.enabled),
                    job.schedule,
                    job.command,
                    width = width
                ));
            }
        }

        if !self.malformed.is_empty() {
            lines.push(String::new());
            lines.push("Malformed:".to_string());
            for m in &self.malformed {
                lines.push(format!("  line {}: {} ({})", m.line + 1, m.name, m.reason));
            }
        }

        lines.join("\n")
    }
}

pub fn cron_list(store: &dyn CrontabStore, settings: &Settings) -> Result<CronList> {
    let document = store.read_all()?;
    let parsed = document.parse(&settings.format());

    Ok(CronList {
        crontab: store.location(),
        store_type: store.store_type().to_string(),
        count: parsed.blocks.len(),
        foreign_lines: parsed.foreign.len(),
        jobs: parsed.blocks,
        malformed: parsed.malformed,
    })
}

#[derive(Debug, Serialize)]
pub struct CronShow {
    pub job: ManagedBlock,
    pub last_run: Option<ExecutionRecord>,
    pub last_test: Option<ExecutionRecord>,
}

impl Output for CronShow {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("{} [{}]", self.job.name, status_label(self.job.enabled)),
            format!("  Schedule: {}", self.job.schedule),
            format!("  Command:  {}", self.job.command),
            format!("  Line:     {}", self.job.line + 1),
        ];
        for (label, record) in [("Last run: ", &self.last_run), ("Last test:", &self.last_test)] {
            if let Some(r) = record {
                lines.push(format!(
                    "  {} {} {} ({}, {})",
                    label,
                    r.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    r.status,
                    exit_label(r.exit_code),
                    human_duration(r.duration_ms)
                ));
            }
        }
        lines.join("\n")
    }
}

pub fn cron_show(store: &dyn CrontabStore, settings: &Settings, name: &str) -> Result<CronShow> {
    let document = store.read_all()?;
    let parsed = document.parse(&settings.format());
    let job = parsed.lookup(name)?.clone();

    let history = HistoryLog::from_settings(settings);
    let last_run = history.read(Some(name), 1)?.pop();
    let last_test = history.read(Some(&test_job_name(name)), 1)?.pop();

    Ok(CronShow {
        job,
        last_run,
        last_test,
    })
}

// === Add / Remove / Enable / Disable ===

#[derive(Debug, Serialize)]
pub struct CronMutation {
    pub action: String,
    pub name: String,
    /// False when the crontab already was in the requested state
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<ManagedBlock>,
    pub crontab: String,
}

impl Output for CronMutation {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        if !self.changed {
            return format!("{} is already {}", self.name, self.action);
        }
        match self.job {
            Some(ref job) => format!(
                "{} {} in {}\n  {} {}",
                self.action, self.name, self.crontab, job.schedule, job.command
            ),
            None => format!("{} {} in {}", self.action, self.name, self.crontab),
        }
    }
}

fn mutation(
    action: &str,
    name: &str,
    changed: bool,
    lines: &[String],
    format: &CrontabFormat,
    store: &dyn CrontabStore,
) -> CronMutation {
    let job = crate::crontab::parse(lines, format).find(name).cloned();
    tracing::info!(job = name, changed, "{}", action);
    CronMutation {
        action: action.to_string(),
        name: name.to_string(),
        changed,
        job,
        crontab: store.location(),
    }
}

pub fn cron_add(
    store: &dyn CrontabStore,
    settings: &Settings,
    name: &str,
    schedule: &str,
    command: &str,
) -> Result<CronMutation> {
    let format = settings.format();
    let (lines, changed) = apply(store, &format, |lines, format| {
        reconcile::add(lines, name, schedule, command, format)
    })?;
    Ok(mutation("added", name, changed, &lines, &format, store))
}

pub fn cron_remove(store: &dyn CrontabStore, settings: &Settings, name: &str) -> Result<CronMutation> {
    let format = settings.format();
    let (lines, changed) = apply(store, &format, |lines, format| {
        reconcile::remove(lines, name, format)
    })?;
    Ok(mutation("removed", name, changed, &lines, &format, store))
}

fn cron_toggle(
    store: &dyn CrontabStore,
    settings: &Settings,
    name: &str,
    enable: bool,
) -> Result<CronMutation> {
    let format = settings.format();
    let (lines, changed) = apply(store, &format, |lines, format| {
        reconcile::toggle(lines, name, enable, format)
    })?;
    let action = if enable { "enabled" } else { "disabled" };
    Ok(mutation(action, name, changed, &lines, &format, store))
}

pub fn cron_enable(store: &dyn CrontabStore, settings: &Settings, name: &str) -> Result<CronMutation> {
    cron_toggle(store, settings, name, true)
}

pub fn cron_disable(
    store: &dyn CrontabStore,
    settings: &Settings,
    name: &str,
) -> Result<CronMutation> {
    cron_toggle(store, settings, name, false)
}

// === Run / Test ===

#[derive(Debug, Serialize)]
pub struct RunResult {
    #[serde(flatten)]
    pub report: RunReport,
}

impl Output for RunResult {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let r = &self.report.record;
        let mut lines = vec![format!(
            "{} {} ({}, {})",
            r.job_name,
            r.status,
            exit_label(r.exit_code),
            human_duration(r.duration_ms)
        )];
        for warning in &self.report.warnings {
            lines.push(format!("Warning: {}", warning));
        }
        lines.join("\n")
    }
}

/// Run a job now. Output lines are handed to `sink` as they arrive.
pub fn cron_run(
    store: &dyn CrontabStore,
    settings: &Settings,
    name: &str,
    sink: &mut dyn FnMut(&str),
) -> Result<RunResult> {
    let document = store.read_all()?;
    let parsed = document.parse(&settings.format());
    let block = parsed.lookup(name)?;
    if !block.enabled {
        tracing::info!(job = name, "running a disabled job");
    }

    let report = Engine::new(settings).run_now(block, sink)?;
    Ok(RunResult { report })
}

impl Output for TestReport {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Test of {}: {}", self.job_name, self.command)];

        if !self.hints.is_empty() {
            lines.push(String::new());
            lines.push("Hints:".to_string());
            for hint in &self.hints {
                lines.push(format!("  - {}", hint.message));
            }
        }

        if !self.paths.is_empty() {
            lines.push(String::new());
            lines.push("Paths:".to_string());
            for check in &self.paths {
                let marker = if check.status.is_flagged() {
                    "!!"
                } else if check.status.is_warning() {
                    "? "
                } else {
                    "ok"
                };
                lines.push(format!("  [{}] {} ({})", marker, check.path, check.status));
            }
        }

        if !self.executables.is_empty() {
            lines.push(String::new());
            lines.push("Executables:".to_string());
            for exe in &self.executables {
                match exe.resolved {
                    Some(ref path) => lines.push(format!("  [ok] {} -> {}", exe.name, path.display())),
                    None => lines.push(format!("  [!!] {} not found on PATH", exe.name)),
                }
            }
        }

        lines.push(String::new());
        match self.execution {
            Some(ref run) => {
                let r = &run.record;
                lines.push(format!(
                    "Execution: {} ({}, {})",
                    r.status,
                    exit_label(r.exit_code),
                    human_duration(r.duration_ms)
                ));
                if !run.output.is_empty() {
                    lines.push(String::new());
                    lines.push(run.output.trim_end().to_string());
                }
                for warning in &run.warnings {
                    lines.push(format!("Warning: {}", warning));
                }
            }
            None => lines.push("Execution: skipped".to_string()),
        }

        lines.join("\n")
    }
}

pub fn cron_test(
    store: &dyn CrontabStore,
    settings: &Settings,
    name: &str,
    execute: bool,
    timeout_secs: Option<u64>,
) -> Result<TestReport> {
    let timeout = match timeout_secs {
        Some(0) => {
            return Err(Error::InvalidInput(
                "Timeout must be at least one second".to_string(),
            ));
        }
        Some(secs) => Duration::from_secs(secs),
        None => settings.test_timeout(),
    };

    let document = store.read_all()?;
    let parsed = document.parse(&settings.format());
    let block = parsed.lookup(name)?;

    Engine::new(settings).test(block, &TestOptions { execute, timeout })
}

// === History / Log ===

#[derive(Debug, Serialize)]
pub struct HistoryResult {
    pub count: usize,
    pub records: Vec<ExecutionRecord>,
}

impl Output for HistoryResult {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return "No executions recorded.".to_string();
        }
        self.records
            .iter()
            .map(|r| {
                format!(
                    "{}  {:20}  {:9}  {:12}  {}",
                    r.started_at.format("%Y-%m-%d %H:%M:%S"),
                    r.job_name,
                    r.status.as_str(),
                    exit_label(r.exit_code),
                    human_duration(r.duration_ms)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn cron_history(settings: &Settings, name: Option<&str>, limit: usize) -> Result<HistoryResult> {
    let records = HistoryLog::from_settings(settings).read(name, limit)?;
    Ok(HistoryResult {
        count: records.len(),
        records,
    })
}

#[derive(Debug, Serialize)]
pub struct JobLog {
    pub job_name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub lines: Vec<String>,
}

impl Output for JobLog {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        if !self.exists {
            return format!("No log for {} yet ({})", self.job_name, self.path.display());
        }
        self.lines.join("\n")
    }
}

pub fn cron_log(settings: &Settings, name: &str, test: bool, lines: usize) -> Result<JobLog> {
    crate::crontab::validate_name(name)?;
    let job_name = if test {
        test_job_name(name)
    } else {
        name.to_string()
    };
    let history = HistoryLog::from_settings(settings);
    let path = history.job_log_path(&job_name);
    let tail = history.tail_job_log(&job_name, lines)?;

    Ok(JobLog {
        job_name,
        path,
        exists: tail.is_some(),
        lines: tail.unwrap_or_default(),
    })
}

// === Backup / Restore ===

#[derive(Debug, Serialize)]
pub struct BackupCreated {
    #[serde(flatten)]
    pub snapshot: BackupSnapshot,
}

impl Output for BackupCreated {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Created backup {} ({} lines)\n  {}",
            self.snapshot.id,
            self.snapshot.lines,
            self.snapshot.path.display()
        )
    }
}

pub fn cron_backup(store: &dyn CrontabStore, settings: &Settings) -> Result<BackupCreated> {
    let snapshot = backup::backup(store, &BackupStore::from_settings(settings))?;
    Ok(BackupCreated { snapshot })
}

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub dir: PathBuf,
    pub count: usize,
    pub backups: Vec<BackupSnapshot>,
}

impl Output for BackupList {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        if self.backups.is_empty() {
            return format!("No backups in {}", self.dir.display());
        }
        let mut lines = vec![format!("{} backup(s) in {}", self.count, self.dir.display())];
        for b in &self.backups {
            lines.push(format!("  {}  {} lines, {} bytes", b.id, b.lines, b.bytes));
        }
        lines.join("\n")
    }
}

pub fn cron_backups(settings: &Settings) -> Result<BackupList> {
    let backups = BackupStore::from_settings(settings);
    let list = backups.list()?;
    Ok(BackupList {
        dir: backups.dir().to_path_buf(),
        count: list.len(),
        backups: list,
    })
}

impl Output for RestoreResult {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let summary = format!(
            "{} line(s) added, {} line(s) removed",
            self.lines_added, self.lines_removed
        );
        if self.applied {
            format!("Restored {}: {}", self.snapshot.id, summary)
        } else {
            format!(
                "Preview of {} ({}):\n\n{}\nRe-run with --yes to install it.",
                self.snapshot.id, summary, self.content
            )
        }
    }
}

pub fn cron_restore(
    store: &dyn CrontabStore,
    settings: &Settings,
    id: Option<&str>,
    confirm: bool,
) -> Result<RestoreResult> {
    backup::restore(store, &BackupStore::from_settings(settings), id, confirm)
}
