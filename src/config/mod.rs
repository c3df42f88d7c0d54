//! Configuration for Vexo.
//!
//! ## config.kdl - User preferences
//!
//! Located at `$VEXO_CONFIG_DIR/config.kdl`, falling back to
//! `~/.config/vexo/config.kdl`.
//!
//! Contains:
//! - `marker-tag` / `comment-prefix` - Tokens that delimit managed blocks
//! - `crontab-user` / `crontab-file` - Which crontab is managed
//! - `shell` - Shell used to run job commands
//! - `test-timeout-secs` - Hard timeout for test executions
//! - `log-dir` / `backup-dir` - Where job logs and snapshots are written
//! - `output-format` - "json" or "human"
//! - `action-log` - Whether CLI invocations are recorded
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, Settings, ValueSource, read_config,
    resolve_config, write_config,
};
#[cfg(unix)]
pub use schema::CONFIG_FILE_MODE;
pub use schema::{CONFIG_KEYS, OutputFormat, VexoConfig};
