//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The Rust struct representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys accepted by `vexo config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "marker-tag",
    "comment-prefix",
    "crontab-user",
    "crontab-file",
    "shell",
    "test-timeout-secs",
    "output-snippet-chars",
    "log-dir",
    "backup-dir",
    "output-format",
    "action-log",
];

/// User preferences stored in config.kdl.
///
/// Every field is optional; unset fields fall through to environment
/// variables or built-in defaults during resolution.
///
/// # KDL Schema
///
/// ```kdl
/// marker-tag "vexo"
/// comment-prefix "# "
/// crontab-user "deploy"
/// shell "/bin/bash"
/// test-timeout-secs 60
/// log-dir "/var/log/vexo/cron"
/// output-format "human"
/// action-log #true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexoConfig {
    /// Literal tag written into marker lines (`# <tag>: <name>`)
    pub marker_tag: Option<String>,

    /// Line-comment prefix used for markers and disabled directives
    pub comment_prefix: Option<String>,

    /// Manage another user's crontab (`crontab -u`)
    pub crontab_user: Option<String>,

    /// Manage a plain crontab file instead of the `crontab` command
    pub crontab_file: Option<PathBuf>,

    /// Shell used to execute job commands
    pub shell: Option<String>,

    /// Hard timeout for test executions
    pub test_timeout_secs: Option<u64>,

    /// Length of the output tail kept in history records
    pub output_snippet_chars: Option<usize>,

    /// Directory for per-job log files
    pub log_dir: Option<PathBuf>,

    /// Directory for crontab snapshots
    pub backup_dir: Option<PathBuf>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Whether CLI invocations are appended to action.log
    pub action_log: Option<bool>,
}

impl VexoConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref tag) = self.marker_tag {
            if tag.is_empty() || tag.contains(char::is_whitespace) || tag.contains(':') {
                return Err(format!(
                    "marker-tag must be a single word without ':', got '{}'",
                    tag
                ));
            }
        }
        if let Some(ref prefix) = self.comment_prefix {
            if !prefix.starts_with('#') {
                return Err(format!(
                    "comment-prefix must start with '#', got '{}'",
                    prefix
                ));
            }
        }
        if let Some(timeout) = self.test_timeout_secs {
            if timeout == 0 || timeout > 3600 {
                return Err(format!(
                    "test-timeout-secs must be 1-3600, got {}",
                    timeout
                ));
            }
        }
        if let Some(chars) = self.output_snippet_chars {
            if chars == 0 {
                return Err("output-snippet-chars must be greater than 0".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.marker_tag = string_value(doc, "marker-tag");
        config.comment_prefix = string_value(doc, "comment-prefix");
        config.crontab_user = string_value(doc, "crontab-user");
        config.crontab_file = string_value(doc, "crontab-file").map(PathBuf::from);
        config.shell = string_value(doc, "shell");
        config.log_dir = string_value(doc, "log-dir").map(PathBuf::from);
        config.backup_dir = string_value(doc, "backup-dir").map(PathBuf::from);
        config.output_format =
            string_value(doc, "output-format").and_then(|s| OutputFormat::parse(&s));

        if let Some(i) = integer_value(doc, "test-timeout-secs") {
            if i > 0 {
                config.test_timeout_secs = Some(i as u64);
            }
        }
        if let Some(i) = integer_value(doc, "output-snippet-chars") {
            if i > 0 {
                config.output_snippet_chars = Some(i as usize);
            }
        }

        if let Some(node) = doc.get("action-log") {
            if let Some(entry) = node.entries().first() {
                config.action_log = entry.value().as_bool();
            }
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        push_string(&mut doc, "marker-tag", self.marker_tag.as_deref());
        push_string(&mut doc, "comment-prefix", self.comment_prefix.as_deref());
        push_string(&mut doc, "crontab-user", self.crontab_user.as_deref());
        let crontab_file = self.crontab_file.as_ref().map(|p| p.display().to_string());
        push_string(&mut doc, "crontab-file", crontab_file.as_deref());
        push_string(&mut doc, "shell", self.shell.as_deref());

        if let Some(timeout) = self.test_timeout_secs {
            let mut node = KdlNode::new("test-timeout-secs");
            node.push(KdlEntry::new(KdlValue::Integer(timeout as i128)));
            doc.nodes_mut().push(node);
        }
        if let Some(chars) = self.output_snippet_chars {
            let mut node = KdlNode::new("output-snippet-chars");
            node.push(KdlEntry::new(KdlValue::Integer(chars as i128)));
            doc.nodes_mut().push(node);
        }

        let log_dir = self.log_dir.as_ref().map(|p| p.display().to_string());
        push_string(&mut doc, "log-dir", log_dir.as_deref());
        let backup_dir = self.backup_dir.as_ref().map(|p| p.display().to_string());
        push_string(&mut doc, "backup-dir", backup_dir.as_deref());
        push_string(
            &mut doc,
            "output-format",
            self.output_format.as_ref().map(|f| f.as_str()),
        );

        if let Some(enabled) = self.action_log {
            let mut node = KdlNode::new("action-log");
            node.push(KdlEntry::new(KdlValue::Bool(enabled)));
            doc.nodes_mut().push(node);
        }

        doc
    }

    /// Set a single key from its string form, as given to `vexo config set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "marker-tag" => self.marker_tag = Some(value.to_string()),
            "comment-prefix" => self.comment_prefix = Some(value.to_string()),
            "crontab-user" => self.crontab_user = Some(value.to_string()),
            "crontab-file" => self.crontab_file = Some(PathBuf::from(value)),
            "shell" => self.shell = Some(value.to_string()),
            "test-timeout-secs" => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("test-timeout-secs must be a number, got '{}'", value))?;
                self.test_timeout_secs = Some(secs);
            }
            "output-snippet-chars" => {
                let chars = value.parse::<usize>().map_err(|_| {
                    format!("output-snippet-chars must be a number, got '{}'", value)
                })?;
                self.output_snippet_chars = Some(chars);
            }
            "log-dir" => self.log_dir = Some(PathBuf::from(value)),
            "backup-dir" => self.backup_dir = Some(PathBuf::from(value)),
            "output-format" => {
                let format = OutputFormat::parse(value).ok_or_else(|| {
                    format!("output-format must be 'json' or 'human', got '{}'", value)
                })?;
                self.output_format = Some(format);
            }
            "action-log" => {
                let enabled = match value.to_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => true,
                    "false" | "0" | "no" | "off" => false,
                    _ => return Err(format!("action-log must be true or false, got '{}'", value)),
                };
                self.action_log = Some(enabled);
            }
            _ => {
                return Err(format!(
                    "Unknown config key '{}'. Valid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                ));
            }
        }
        self.validate()
    }
}

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

fn string_value(doc: &KdlDocument, key: &str) -> Option<String> {
    let node = doc.get(key)?;
    let entry = node.entries().first()?;
    entry.value().as_string().map(|s| s.to_string())
}

fn integer_value(doc: &KdlDocument, key: &str) -> Option<i128> {
    let node = doc.get(key)?;
    let entry = node.entries().first()?;
    entry.value().as_integer()
}

fn push_string(doc: &mut KdlDocument, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        let mut node = KdlNode::new(key);
        node.push(KdlEntry::new(KdlValue::String(value.to_string())));
        doc.nodes_mut().push(node);
    }
}
