//! Unified precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`VEXO_CRONTAB_FILE`, `VEXO_CRONTAB_USER`)
//! 3. config.kdl (`$VEXO_CONFIG_DIR/config.kdl` or `~/.config/vexo/config.kdl`)
//! 4. Built-in defaults
//!
//! The outcome is a [`Settings`] value that is passed explicitly to the
//! store, the execution engine and the log writers.

use crate::config::{OutputFormat, VexoConfig};
use crate::crontab::CrontabFormat;
use crate::{Error, Result};
use kdl::KdlDocument;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "VEXO_DATA_DIR";
/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "VEXO_CONFIG_DIR";
/// Environment variable selecting a file-backed crontab.
pub const CRONTAB_FILE_ENV: &str = "VEXO_CRONTAB_FILE";
/// Environment variable selecting another user's crontab.
pub const CRONTAB_USER_ENV: &str = "VEXO_CRONTAB_USER";

/// Default hard timeout for test executions.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 60;
/// Default length of the output tail stored in history records.
pub const DEFAULT_OUTPUT_SNIPPET_CHARS: usize = 500;
/// Default shell for job commands.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Explicit runtime configuration handed to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub marker_tag: String,
    pub comment_prefix: String,
    pub crontab_user: Option<String>,
    pub crontab_file: Option<PathBuf>,
    pub shell: String,
    pub test_timeout_secs: u64,
    pub output_snippet_chars: usize,
    pub log_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub output_format: OutputFormat,
    pub action_log: bool,
}

impl Settings {
    /// Built-in defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        let format = CrontabFormat::default();
        Self {
            data_dir: data_dir.to_path_buf(),
            marker_tag: format.tag,
            comment_prefix: format.comment_prefix,
            crontab_user: None,
            crontab_file: None,
            shell: DEFAULT_SHELL.to_string(),
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            output_snippet_chars: DEFAULT_OUTPUT_SNIPPET_CHARS,
            log_dir: data_dir.join("logs"),
            backup_dir: data_dir.join("backups"),
            output_format: OutputFormat::Json,
            action_log: true,
        }
    }

    /// Marker and comment tokens for the document model.
    pub fn format(&self) -> CrontabFormat {
        CrontabFormat::new(&self.marker_tag, &self.comment_prefix)
    }

    /// Hard timeout for test executions.
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Shared execution history file.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }

    /// Action log file.
    pub fn action_log_path(&self) -> PathBuf {
        self.data_dir.join("action.log")
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Resolved<PathBuf>,
    pub marker_tag: Resolved<String>,
    pub comment_prefix: Resolved<String>,
    pub crontab_user: Option<Resolved<String>>,
    pub crontab_file: Option<Resolved<PathBuf>>,
    pub shell: Resolved<String>,
    pub test_timeout_secs: Resolved<u64>,
    pub output_snippet_chars: Resolved<usize>,
    pub log_dir: Resolved<PathBuf>,
    pub backup_dir: Resolved<PathBuf>,
    pub output_format: Resolved<OutputFormat>,
    pub action_log: Resolved<bool>,
}

impl ResolvedConfig {
    /// Flatten into the plain settings struct.
    pub fn settings(&self) -> Settings {
        Settings {
            data_dir: self.data_dir.value.clone(),
            marker_tag: self.marker_tag.value.clone(),
            comment_prefix: self.comment_prefix.value.clone(),
            crontab_user: self.crontab_user.as_ref().map(|r| r.value.clone()),
            crontab_file: self.crontab_file.as_ref().map(|r| r.value.clone()),
            shell: self.shell.value.clone(),
            test_timeout_secs: self.test_timeout_secs.value,
            output_snippet_chars: self.output_snippet_chars.value,
            log_dir: self.log_dir.value.clone(),
            backup_dir: self.backup_dir.value.clone(),
            output_format: self.output_format.value.clone(),
            action_log: self.action_log.value,
        }
    }

    /// `(key, value, source)` triples for display.
    pub fn entries(&self) -> Vec<(String, String, String)> {
        fn entry<T: std::fmt::Display>(key: &str, r: &Resolved<T>) -> (String, String, String) {
            (key.to_string(), r.value.to_string(), r.source.to_string())
        }
        fn path_entry(key: &str, r: &Resolved<PathBuf>) -> (String, String, String) {
            (
                key.to_string(),
                r.value.display().to_string(),
                r.source.to_string(),
            )
        }

        let mut entries = vec![
            path_entry("data-dir", &self.data_dir),
            entry("marker-tag", &self.marker_tag),
            entry("comment-prefix", &self.comment_prefix),
        ];
        match self.crontab_user {
            Some(ref r) => entries.push(entry("crontab-user", r)),
            None => entries.push(unset("crontab-user")),
        }
        match self.crontab_file {
            Some(ref r) => entries.push(path_entry("crontab-file", r)),
            None => entries.push(unset("crontab-file")),
        }
        entries.push(entry("shell", &self.shell));
        entries.push(entry("test-timeout-secs", &self.test_timeout_secs));
        entries.push(entry("output-snippet-chars", &self.output_snippet_chars));
        entries.push(path_entry("log-dir", &self.log_dir));
        entries.push(path_entry("backup-dir", &self.backup_dir));
        entries.push(entry("output-format", &self.output_format));
        entries.push(entry("action-log", &self.action_log));
        entries
    }
}

fn unset(key: &str) -> (String, String, String) {
    (key.to_string(), String::new(), ValueSource::Default.to_string())
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub crontab_file: Option<PathBuf>,
    pub crontab_user: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crontab_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.crontab_file = Some(path.into());
        self
    }

    pub fn with_crontab_user(mut self, user: impl Into<String>) -> Self {
        self.crontab_user = Some(user.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Directory holding config.kdl.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::config_dir().map(|d| d.join("vexo"))
}

/// Path of config.kdl.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.kdl"))
}

/// Directory holding history, logs and backups.
pub fn data_dir() -> Result<Resolved<PathBuf>> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(Resolved::new(
                PathBuf::from(dir),
                ValueSource::EnvVar(DATA_DIR_ENV.to_string()),
            ));
        }
    }
    let base = dirs::data_dir()
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    Ok(Resolved::new(base.join("vexo"), ValueSource::Default))
}

/// Read config.kdl, returning an empty config if it does not exist.
pub fn read_config() -> Result<VexoConfig> {
    match config_path() {
        Some(path) => read_config_from(&path),
        None => Ok(VexoConfig::default()),
    }
}

/// Read a config file at an explicit path.
pub fn read_config_from(path: &Path) -> Result<VexoConfig> {
    if !path.exists() {
        return Ok(VexoConfig::default());
    }
    let text = fs::read_to_string(path)?;
    let doc: KdlDocument = text
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    let config = VexoConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Write config.kdl, creating its directory if needed.
pub fn write_config(config: &VexoConfig) -> Result<PathBuf> {
    let path = config_path()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    write_config_to(&path, config)?;
    Ok(path)
}

/// Write a config file at an explicit path.
pub fn write_config_to(path: &Path, config: &VexoConfig) -> Result<()> {
    config.validate().map_err(Error::Config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_kdl().to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(
            path,
            fs::Permissions::from_mode(crate::config::CONFIG_FILE_MODE),
        )?;
    }
    Ok(())
}

/// Resolve configuration with the full precedence chain.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let file_config = read_config()?;
    let data_dir = data_dir()?;
    Ok(resolve_with(&file_config, data_dir, overrides))
}

/// Resolution over an already-loaded config file (no filesystem access).
pub fn resolve_with(
    file: &VexoConfig,
    data_dir: Resolved<PathBuf>,
    overrides: &ConfigOverrides,
) -> ResolvedConfig {
    let defaults = Settings::with_data_dir(&data_dir.value);

    let crontab_file = if let Some(ref path) = overrides.crontab_file {
        Some(Resolved::new(path.clone(), ValueSource::CliFlag))
    } else if let Some(path) = env_value(CRONTAB_FILE_ENV) {
        Some(Resolved::new(
            PathBuf::from(path),
            ValueSource::EnvVar(CRONTAB_FILE_ENV.to_string()),
        ))
    } else {
        file.crontab_file
            .as_ref()
            .map(|p| Resolved::new(p.clone(), ValueSource::ConfigFile))
    };

    let crontab_user = if let Some(ref user) = overrides.crontab_user {
        Some(Resolved::new(user.clone(), ValueSource::CliFlag))
    } else if let Some(user) = env_value(CRONTAB_USER_ENV) {
        Some(Resolved::new(
            user,
            ValueSource::EnvVar(CRONTAB_USER_ENV.to_string()),
        ))
    } else {
        file.crontab_user
            .as_ref()
            .map(|u| Resolved::new(u.clone(), ValueSource::ConfigFile))
    };

    let output_format = if let Some(ref format) = overrides.output_format {
        Resolved::new(format.clone(), ValueSource::CliFlag)
    } else {
        from_file(file.output_format.clone(), defaults.output_format)
    };

    ResolvedConfig {
        marker_tag: from_file(file.marker_tag.clone(), defaults.marker_tag),
        comment_prefix: from_file(file.comment_prefix.clone(), defaults.comment_prefix),
        crontab_user,
        crontab_file,
        shell: from_file(file.shell.clone(), defaults.shell),
        test_timeout_secs: from_file(file.test_timeout_secs, defaults.test_timeout_secs),
        output_snippet_chars: from_file(
            file.output_snippet_chars,
            defaults.output_snippet_chars,
        ),
        log_dir: from_file(file.log_dir.clone(), defaults.log_dir),
        backup_dir: from_file(file.backup_dir.clone(), defaults.backup_dir),
        output_format,
        action_log: from_file(file.action_log, defaults.action_log),
        data_dir,
    }
}

fn from_file<T>(value: Option<T>, default: T) -> Resolved<T> {
    match value {
        Some(v) => Resolved::new(v, ValueSource::ConfigFile),
        None => Resolved::new(default, ValueSource::Default),
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
