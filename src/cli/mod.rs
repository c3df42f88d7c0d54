//! CLI argument definitions for vexo.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vexo - server administration console.
///
/// Start with `vexo cron list` to see the jobs vexo manages in your crontab.
#[derive(Parser, Debug)]
#[command(name = "vexo")]
#[command(author, version, about = "Manage scheduled jobs in a crontab without touching the rest of it", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Manage a plain crontab file instead of the user's crontab.
    /// Can also be set via VEXO_CRONTAB_FILE.
    #[arg(long = "crontab-file", global = true)]
    pub crontab_file: Option<PathBuf>,

    /// Manage another user's crontab (requires root).
    /// Can also be set via VEXO_CRONTAB_USER.
    #[arg(short = 'u', long = "user", global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scheduled job commands
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Check that the crontab, shell and data directory are usable
    Doctor,
}

/// Scheduled job subcommands
#[derive(Subcommand, Debug)]
pub enum CronCommands {
    /// List managed jobs
    List,

    /// Show one managed job
    Show {
        /// Job name
        name: String,
    },

    /// Add a managed job
    ///
    /// Example: vexo cron add db-backup "0 2 * * *" "pg_dump db > /backups/db.sql.gz"
    Add {
        /// Job name (letters, digits, '.', '_' and '-')
        name: String,
        /// Five-field cron schedule, quoted
        schedule: String,
        /// Shell command, quoted
        command: String,
    },

    /// Remove a managed job
    Remove {
        /// Job name
        name: String,
    },

    /// Enable a disabled job
    Enable {
        /// Job name
        name: String,
    },

    /// Disable a job without removing it
    Disable {
        /// Job name
        name: String,
    },

    /// Run a job now, streaming its output
    Run {
        /// Job name
        name: String,
    },

    /// Check a job's command and run it once under a timeout
    Test {
        /// Job name
        name: String,

        /// Only run the static checks
        #[arg(long)]
        no_exec: bool,

        /// Timeout in seconds (default: test-timeout-secs from config)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show execution history
    History {
        /// Only show this job (exact name; test runs are `<name>-test`)
        name: Option<String>,

        /// Maximum number of records
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show the tail of a job's log
    Log {
        /// Job name
        name: String,

        /// Show the log of test executions
        #[arg(long)]
        test: bool,

        /// Number of lines
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Snapshot the crontab
    Backup,

    /// List crontab snapshots
    Backups,

    /// Restore a snapshot (latest if no id is given)
    ///
    /// Without --yes only a preview is shown.
    Restore {
        /// Snapshot id (see `vexo cron backups`)
        id: Option<String>,

        /// Install the snapshot
        #[arg(long)]
        yes: bool,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration with the source of each value
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a value in config.kdl
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}
