//! Crontab snapshots.
//!
//! A backup is the raw crontab text written verbatim to
//! `<backup_dir>/crontab-YYYYMMDDTHHMMSS.fffZ.bak`. Files are created with
//! `create_new` and never overwritten; a name collision gets a `-N` suffix.
//! Restoring installs a snapshot's lines as a single replace-all.

use crate::config::Settings;
use crate::crontab::Document;
use crate::crontab::store::CrontabStore;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const PREFIX: &str = "crontab-";
const EXTENSION: &str = "bak";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Give up after this many suffixed names collide.
const MAX_SUFFIX: u32 = 1000;

/// Metadata of one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSnapshot {
    /// File stem, e.g. `crontab-20261017T020000.123Z`
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub lines: usize,
    pub bytes: u64,
}

/// Parse `crontab-<timestamp>Z[-N]` into its timestamp and suffix.
fn parse_id(id: &str) -> Option<(DateTime<Utc>, u32)> {
    let rest = id.strip_prefix(PREFIX)?;
    let (stamp, tail) = rest.split_once('Z')?;
    let suffix = match tail {
        "" => 0,
        _ => tail.strip_prefix('-')?.parse().ok()?,
    };
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), suffix))
}

fn snapshot_id(at: &DateTime<Utc>, suffix: u32) -> String {
    let stamp = at.format(TIMESTAMP_FORMAT);
    if suffix == 0 {
        format!("{}{}Z", PREFIX, stamp)
    } else {
        format!("{}{}Z-{}", PREFIX, stamp, suffix)
    }
}

/// Directory of snapshot files.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.backup_dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }

    /// Write the document's raw text into a new snapshot file.
    pub fn create(&self, document: &Document) -> Result<BackupSnapshot> {
        fs::create_dir_all(&self.dir)?;
        let timestamp = Utc::now();

        for suffix in 0..MAX_SUFFIX {
            let id = snapshot_id(&timestamp, suffix);
            let path = self.path_for(&id);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(document.raw().as_bytes())?;
            file.sync_all()?;

            tracing::info!(path = %path.display(), "crontab backup created");
            return Ok(BackupSnapshot {
                id,
                timestamp,
                path,
                lines: document.lines().len(),
                bytes: document.raw().len() as u64,
            });
        }

        Err(Error::Other(format!(
            "Could not find a free backup name in {}",
            self.dir.display()
        )))
    }

    /// All snapshots, oldest first. Files not named like snapshots are ignored.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((timestamp, suffix)) = parse_id(id) else {
                continue;
            };
            let content = fs::read_to_string(&path)?;
            found.push((
                suffix,
                BackupSnapshot {
                    id: id.to_string(),
                    timestamp,
                    lines: content.lines().count(),
                    bytes: content.len() as u64,
                    path,
                },
            ));
        }

        found.sort_by(|a, b| (a.1.timestamp, a.0).cmp(&(b.1.timestamp, b.0)));
        Ok(found.into_iter().map(|(_, snapshot)| snapshot).collect())
    }

    pub fn latest(&self) -> Result<Option<BackupSnapshot>> {
        Ok(self.list()?.pop())
    }

    /// Snapshot metadata and its full text.
    pub fn load(&self, id: &str) -> Result<(BackupSnapshot, String)> {
        let Some((timestamp, _)) = parse_id(id) else {
            return Err(Error::BackupNotFound(id.to_string()));
        };
        let path = self.path_for(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::BackupNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot = BackupSnapshot {
            id: id.to_string(),
            timestamp,
            path,
            lines: content.lines().count(),
            bytes: content.len() as u64,
        };
        Ok((snapshot, content))
    }
}

/// Snapshot the current crontab.
pub fn backup(store: &dyn CrontabStore, backups: &BackupStore) -> Result<BackupSnapshot> {
    let document = store.read_all()?;
    backups.create(&document)
}

/// Outcome of a restore request.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub snapshot: BackupSnapshot,
    /// Whether the snapshot was installed
    pub applied: bool,
    /// Lines in the snapshot that the current crontab lacks
    pub lines_added: usize,
    /// Lines in the current crontab that the snapshot lacks
    pub lines_removed: usize,
    pub content: String,
}

/// Lines of `new` missing from `old`, counting duplicates.
fn count_missing(old: &[String], new: &[String]) -> usize {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for line in old {
        *available.entry(line.as_str()).or_default() += 1;
    }
    let mut missing = 0;
    for line in new {
        match available.get_mut(line.as_str()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => missing += 1,
        }
    }
    missing
}

/// Preview or apply a snapshot (`id`, or the latest when `None`).
///
/// Without `confirm` nothing is installed.
pub fn restore(
    store: &dyn CrontabStore,
    backups: &BackupStore,
    id: Option<&str>,
    confirm: bool,
) -> Result<RestoreResult> {
    let id = match id {
        Some(id) => id.to_string(),
        None => backups
            .latest()?
            .map(|s| s.id)
            .ok_or_else(|| Error::BackupNotFound("no backups exist".to_string()))?,
    };
    let (snapshot, content) = backups.load(&id)?;
    let target = Document::from_text(&content);
    let current = store.read_all()?;

    let lines_added = count_missing(current.lines(), target.lines());
    let lines_removed = count_missing(target.lines(), current.lines());

    if confirm {
        store.install_all(target.lines())?;
        tracing::info!(id = %snapshot.id, "crontab restored from backup");
    }

    Ok(RestoreResult {
        snapshot,
        applied: confirm,
        lines_added,
        lines_removed,
        content,
    })
}
