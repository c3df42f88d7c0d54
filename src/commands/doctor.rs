//! `vexo doctor`: environment checks.

use super::Output;
use crate::config::Settings;
use crate::crontab::store::CrontabStore;
use crate::history::HistoryLog;
use crate::sys;
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub healthy: bool,
    pub checks: Vec<DoctorCheck>,
}

impl Output for DoctorReport {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .checks
            .iter()
            .map(|c| {
                let tag = match c.status {
                    CheckStatus::Ok => "ok  ",
                    CheckStatus::Warn => "warn",
                    CheckStatus::Fail => "FAIL",
                };
                format!("[{}] {}: {}", tag, c.name, c.message)
            })
            .collect();
        lines.push(String::new());
        lines.push(if self.healthy {
            "No problems found.".to_string()
        } else {
            "Problems found.".to_string()
        });
        lines.join("\n")
    }
}

fn check_shell(settings: &Settings) -> DoctorCheck {
    match which::which(&settings.shell) {
        Ok(path) => DoctorCheck::new("shell", CheckStatus::Ok, path.display().to_string()),
        Err(_) => DoctorCheck::new(
            "shell",
            CheckStatus::Fail,
            format!("{} not found; jobs cannot run", settings.shell),
        ),
    }
}

fn check_crontab_command(settings: &Settings) -> Option<DoctorCheck> {
    if settings.crontab_file.is_some() {
        return None;
    }
    Some(match which::which("crontab") {
        Ok(path) => DoctorCheck::new("crontab", CheckStatus::Ok, path.display().to_string()),
        Err(_) => DoctorCheck::new(
            "crontab",
            CheckStatus::Fail,
            "crontab command not found on PATH",
        ),
    })
}

fn check_store(store: &dyn CrontabStore, settings: &Settings, checks: &mut Vec<DoctorCheck>) {
    let document = match store.read_all() {
        Ok(document) => document,
        Err(e) => {
            checks.push(DoctorCheck::new("crontab-read", CheckStatus::Fail, e.to_string()));
            return;
        }
    };
    let parsed = document.parse(&settings.format());
    checks.push(DoctorCheck::new(
        "crontab-read",
        CheckStatus::Ok,
        format!(
            "{} ({}): {} managed job(s), {} other line(s)",
            store.location(),
            store.store_type(),
            parsed.blocks.len(),
            parsed.foreign.len()
        ),
    ));

    for m in &parsed.malformed {
        checks.push(DoctorCheck::new(
            "malformed-block",
            CheckStatus::Warn,
            format!(
                "line {}: {} ({}); `vexo cron remove {}` drops the marker",
                m.line + 1,
                m.name,
                m.reason,
                m.name
            ),
        ));
    }
}

fn check_writable(name: &str, dir: &Path) -> DoctorCheck {
    let writable = fs::create_dir_all(dir).and_then(|_| tempfile::tempfile_in(dir).map(|_| ()));
    match writable {
        Ok(()) => DoctorCheck::new(name, CheckStatus::Ok, dir.display().to_string()),
        Err(e) => DoctorCheck::new(
            name,
            CheckStatus::Fail,
            format!("{} is not writable: {}", dir.display(), e),
        ),
    }
}

fn check_sudo(settings: &Settings) -> Option<DoctorCheck> {
    let ctx = sys::detect_sudo_context()?;
    if settings.crontab_user.is_some() || settings.crontab_file.is_some() {
        return None;
    }
    Some(DoctorCheck::new(
        "sudo",
        CheckStatus::Warn,
        format!(
            "running under sudo without -u; managing root's crontab, not {}'s (uid {})",
            ctx.user, ctx.uid
        ),
    ))
}

pub fn doctor(store: &dyn CrontabStore, settings: &Settings) -> Result<DoctorReport> {
    let mut checks = vec![check_shell(settings)];
    checks.extend(check_crontab_command(settings));
    checks.extend(check_sudo(settings));
    check_store(store, settings, &mut checks);

    checks.push(check_writable("data-dir", &settings.data_dir));
    checks.push(check_writable("log-dir", &settings.log_dir));
    checks.push(check_writable("backup-dir", &settings.backup_dir));

    let history = HistoryLog::from_settings(settings);
    match history.read(None, usize::MAX) {
        Ok(records) => checks.push(DoctorCheck::new(
            "history",
            CheckStatus::Ok,
            format!("{} record(s) in {}", records.len(), history.history_path().display()),
        )),
        Err(e) => checks.push(DoctorCheck::new("history", CheckStatus::Fail, e.to_string())),
    }

    let healthy = checks.iter().all(|c| c.status != CheckStatus::Fail);
    Ok(DoctorReport { healthy, checks })
}
