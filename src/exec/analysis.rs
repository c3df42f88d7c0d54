//! Static checks run by `vexo cron test` before (or instead of) executing a job.
//!
//! Nothing here spawns a process. Hints are informational, path checks only
//! look at the filesystem, and executable checks search `PATH`.

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Interpreters worth pointing out in a command.
pub const INTERPRETERS: &[&str] = &["python", "php", "node", "perl", "ruby", "bash"];

/// Backup tools worth pointing out in a command.
pub const BACKUP_TOOLS: &[&str] = &[
    "pg_dump",
    "mysqldump",
    "mongodump",
    "rsync",
    "tar",
    "borg",
    "restic",
    "redis-cli",
];

/// Binaries resolved on `PATH` when they appear as a word in a command.
pub const KNOWN_EXECUTABLES: &[&str] = &[
    "python",
    "python3",
    "php",
    "node",
    "perl",
    "ruby",
    "bash",
    "pg_dump",
    "mysqldump",
    "mongodump",
    "rsync",
    "tar",
    "borg",
    "restic",
    "redis-cli",
    "gzip",
    "curl",
    "wget",
];

/// System log directory.
const SYSTEM_LOG_DIR: &str = "/var/log";

static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s=:'"(<>])(/[^\s'";|&<>()`]+)"#).expect("path token regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Interpreter,
    BackupTool,
    Redirection,
    LogDirectory,
}

/// An informational observation about a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub kind: HintKind,
    pub token: String,
    pub message: String,
}

impl Hint {
    fn new(kind: HintKind, token: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.to_string(),
            message: message.into(),
        }
    }
}

/// Substring scan for interpreters, backup tools, redirection and log usage.
pub fn hints(command: &str, log_dir: &Path) -> Vec<Hint> {
    let mut hints = Vec::new();

    for name in INTERPRETERS {
        if command.contains(name) {
            hints.push(Hint::new(
                HintKind::Interpreter,
                name,
                format!("Runs under {}; cron uses a minimal PATH and environment", name),
            ));
        }
    }

    for name in BACKUP_TOOLS {
        if command.contains(name) {
            hints.push(Hint::new(
                HintKind::BackupTool,
                name,
                format!("Uses {}; check that the destination has enough space", name),
            ));
        }
    }

    hints.extend(redirection_hints(command));

    if command.contains(SYSTEM_LOG_DIR) {
        hints.push(Hint::new(
            HintKind::LogDirectory,
            SYSTEM_LOG_DIR,
            "Writes under /var/log; the crontab owner needs write access",
        ));
    }
    let log_dir = log_dir.display().to_string();
    if !log_dir.is_empty() && command.contains(&log_dir) {
        hints.push(Hint::new(
            HintKind::LogDirectory,
            &log_dir,
            "Writes into the vexo job log directory",
        ));
    }

    hints
}

fn redirection_hints(command: &str) -> Vec<Hint> {
    let mut hints = Vec::new();

    if command.contains("2>&1") {
        hints.push(Hint::new(
            HintKind::Redirection,
            "2>&1",
            "Standard error is merged into standard output",
        ));
    }
    if command.contains(">>") {
        hints.push(Hint::new(
            HintKind::Redirection,
            ">>",
            "Output is appended to a file",
        ));
    }
    let remainder = command.replace("2>&1", "").replace(">>", "");
    if remainder.contains('>') {
        hints.push(Hint::new(
            HintKind::Redirection,
            ">",
            "Output overwrites a file on every run",
        ));
    }
    if command.replace("||", "").contains('|') {
        hints.push(Hint::new(
            HintKind::Redirection,
            "|",
            "Output is piped to another command; only the last exit code counts",
        ));
    }

    if hints.is_empty() {
        hints.push(Hint::new(
            HintKind::Redirection,
            "",
            "Output is not redirected; cron mails it to the crontab owner",
        ));
    }
    hints
}

/// Classification of a path found in a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Directory,
    File,
    /// Absent but its directory exists (warning)
    MissingParentExists,
    /// Absent along with its directory (flagged)
    Missing,
    /// Log file expected to be created by the job
    CreatedOnWrite,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Directory => "directory",
            PathStatus::File => "file",
            PathStatus::MissingParentExists => "missing_parent_exists",
            PathStatus::Missing => "missing",
            PathStatus::CreatedOnWrite => "created_on_write",
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, PathStatus::Missing)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, PathStatus::MissingParentExists)
    }
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCheck {
    pub path: String,
    pub status: PathStatus,
}

/// `/`-prefixed tokens in order of first appearance.
pub fn extract_paths(command: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for cap in PATH_TOKEN.captures_iter(command) {
        let token = cap[1].trim_end_matches([',', '.']);
        // URLs and bare "/" are not filesystem references
        if token.len() < 2 || token.starts_with("//") {
            continue;
        }
        if !paths.iter().any(|p| p == token) {
            paths.push(token.to_string());
        }
    }
    paths
}

fn is_log_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "log")
}

pub fn classify_path(path: &Path) -> PathStatus {
    if is_log_file(path) {
        return PathStatus::CreatedOnWrite;
    }
    if path.is_dir() {
        return PathStatus::Directory;
    }
    if path.exists() {
        return PathStatus::File;
    }
    match path.parent() {
        Some(parent) if parent.is_dir() => PathStatus::MissingParentExists,
        _ => PathStatus::Missing,
    }
}

/// Extract and classify every path in a command.
pub fn check_paths(command: &str) -> Vec<PathCheck> {
    extract_paths(command)
        .into_iter()
        .map(|path| {
            let status = classify_path(Path::new(&path));
            PathCheck { path, status }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableCheck {
    pub name: String,
    pub resolved: Option<PathBuf>,
}

impl ExecutableCheck {
    pub fn found(&self) -> bool {
        self.resolved.is_some()
    }
}

fn command_words(command: &str) -> impl Iterator<Item = &str> {
    command
        .split(|c: char| c.is_whitespace() || ";|&()<>`$\"'".contains(c))
        .filter(|w| !w.is_empty())
        .map(|w| w.rsplit('/').next().unwrap_or(w))
}

/// Resolve each known executable named in the command against `PATH`.
pub fn check_executables(command: &str) -> Vec<ExecutableCheck> {
    let mut checks: Vec<ExecutableCheck> = Vec::new();
    for word in command_words(command) {
        if !KNOWN_EXECUTABLES.contains(&word) || checks.iter().any(|c| c.name == word) {
            continue;
        }
        let resolved = which::which(word).ok();
        if resolved.is_none() {
            tracing::debug!("{} not found on PATH", word);
        }
        checks.push(ExecutableCheck {
            name: word.to_string(),
            resolved,
        });
    }
    checks
}
