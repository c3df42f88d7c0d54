//! Crontab store backends.
//!
//! A store reads the whole crontab and installs a whole new one in a single
//! step; there is no line-level editing of the live table.
//!
//! - `SystemCrontab` - the per-user table behind the `crontab` command
//! - `FileCrontab` - a plain file (e.g. an `/etc/cron.d` fragment), replaced
//!   by writing a temp file next to it and renaming it into place. The file
//!   keeps the line ending it already had.

use super::{Document, render, render_with};
use crate::config::Settings;
use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

/// Trait for crontab backends.
pub trait CrontabStore {
    /// Read the entire crontab. A missing crontab is an empty document.
    fn read_all(&self) -> Result<Document>;

    /// Replace the entire crontab with `lines`.
    ///
    /// Either the whole new document is in place afterwards or the previous
    /// one is untouched.
    fn install_all(&self, lines: &[String]) -> Result<()>;

    /// Get the store location description (for display purposes).
    fn location(&self) -> String;

    /// Get the store type name.
    fn store_type(&self) -> &'static str;

    /// Install only if the crontab still has the fingerprint it had when the
    /// caller read it.
    fn install_checked(&self, expected_fingerprint: &str, lines: &[String]) -> Result<()> {
        let current = self.read_all()?;
        if current.fingerprint() != expected_fingerprint {
            tracing::warn!(
                location = %self.location(),
                "crontab changed between read and install"
            );
            return Err(Error::StaleDocument);
        }
        self.install_all(lines)
    }
}

/// Open the store selected by the settings.
pub fn open_store(settings: &Settings) -> Box<dyn CrontabStore> {
    match settings.crontab_file {
        Some(ref path) => Box::new(FileCrontab::new(path.clone())),
        None => Box::new(SystemCrontab::new(settings.crontab_user.clone())),
    }
}

fn unavailable(operation: &str, message: impl Into<String>) -> Error {
    Error::StoreUnavailable {
        operation: operation.to_string(),
        message: message.into(),
    }
}

/// The `crontab` command's per-user table.
pub struct SystemCrontab {
    /// Target user (`crontab -u`); `None` for the invoking user.
    user: Option<String>,
    /// Program to invoke.
    program: PathBuf,
}

impl SystemCrontab {
    pub fn new(user: Option<String>) -> Self {
        Self {
            user,
            program: PathBuf::from("crontab"),
        }
    }

    /// Use a different `crontab` executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(ref user) = self.user {
            cmd.args(["-u", user]);
        }
        cmd
    }
}

impl CrontabStore for SystemCrontab {
    fn read_all(&self) -> Result<Document> {
        let output = self
            .command()
            .arg("-l")
            .output()
            .map_err(|e| unavailable("read", format!("Failed to run crontab: {}", e)))?;

        if output.status.success() {
            return Ok(Document::from_text(&String::from_utf8_lossy(&output.stdout)));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab for") {
            tracing::debug!("no crontab installed yet, starting from an empty table");
            return Ok(Document::empty());
        }
        Err(unavailable("read", stderr.trim()))
    }

    fn install_all(&self, lines: &[String]) -> Result<()> {
        let mut child = self
            .command()
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable("install", format!("Failed to run crontab: {}", e)))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| unavailable("install", "crontab stdin was not captured"))?;
            stdin
                .write_all(render(lines).as_bytes())
                .map_err(|e| unavailable("install", format!("Failed to write crontab: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| unavailable("install", format!("Failed to wait for crontab: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable("install", stderr.trim()));
        }

        tracing::debug!(lines = lines.len(), "installed crontab");
        Ok(())
    }

    fn location(&self) -> String {
        match self.user {
            Some(ref user) => format!("crontab -u {}", user),
            None => "crontab".to_string(),
        }
    }

    fn store_type(&self) -> &'static str {
        "system"
    }
}

/// A crontab kept in a plain file.
pub struct FileCrontab {
    path: PathBuf,
}

impl FileCrontab {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CrontabStore for FileCrontab {
    fn read_all(&self) -> Result<Document> {
        if !self.path.exists() {
            return Ok(Document::empty());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| unavailable("read", format!("{}: {}", self.path.display(), e)))?;
        Ok(Document::from_text(&text))
    }

    fn install_all(&self, lines: &[String]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let fail = |e: std::io::Error| unavailable("install", format!("{}: {}", self.path.display(), e));

        let ending = self
            .read_all()
            .map(|current| current.line_ending())
            .unwrap_or_default();

        let mut temp = NamedTempFile::new_in(&dir).map_err(fail)?;
        temp.write_all(render_with(lines, ending).as_bytes()).map_err(fail)?;
        temp.as_file().sync_all().map_err(fail)?;

        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(temp.path(), metadata.permissions()).map_err(fail)?;
        }

        temp.persist(&self.path).map_err(|e| fail(e.error))?;
        tracing::debug!(path = %self.path.display(), lines = lines.len(), "installed crontab file");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn store_type(&self) -> &'static str {
        "file"
    }
}
