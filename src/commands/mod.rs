//! Command implementations for the vexo CLI.
//!
//! This module contains the business logic for each CLI command:
//! - `cron` - Managed job editing, execution, history and backups
//! - `config` - Showing and editing config.kdl
//! - `doctor` - Environment checks
//!
//! Every command returns a result type implementing [`Output`]; `main`
//! decides whether to print it as JSON or as human-readable text.

mod config;
mod cron;
mod doctor;

pub use config::{ConfigEntry, ConfigSet, ConfigShow, config_get, config_set, config_show};
pub use cron::{
    BackupCreated, BackupList, CronList, CronMutation, CronShow, HistoryResult, JobLog, RunResult,
    cron_add, cron_backup, cron_backups, cron_disable, cron_enable, cron_history, cron_list,
    cron_log, cron_remove, cron_restore, cron_run, cron_show, cron_test,
};
pub use doctor::{CheckStatus, DoctorCheck, DoctorReport, doctor};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Format a duration in milliseconds for humans.
fn human_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
