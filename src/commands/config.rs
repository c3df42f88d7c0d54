//! `vexo config ...` commands.

use super::Output;
use crate::config::resolver::config_path;
use crate::config::{CONFIG_KEYS, ResolvedConfig, read_config, write_config};
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

impl Output for ConfigEntry {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        format!("{} = {} ({})", self.key, self.value, self.source)
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub config_path: Option<PathBuf>,
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match self.config_path {
            Some(ref path) => lines.push(format!("Config file: {}", path.display())),
            None => lines.push("Config file: (none)".to_string()),
        }
        lines.push(String::new());

        let width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
        for e in &self.entries {
            let value = if e.value.is_empty() { "-" } else { &e.value };
            lines.push(format!(
                "  {:width$}  {}  [{}]",
                e.key,
                value,
                e.source,
                width = width
            ));
        }
        lines.join("\n")
    }
}

fn entries(resolved: &ResolvedConfig) -> Vec<ConfigEntry> {
    resolved
        .entries()
        .into_iter()
        .map(|(key, value, source)| ConfigEntry { key, value, source })
        .collect()
}

pub fn config_show(resolved: &ResolvedConfig) -> Result<ConfigShow> {
    Ok(ConfigShow {
        config_path: config_path(),
        entries: entries(resolved),
    })
}

pub fn config_get(resolved: &ResolvedConfig, key: &str) -> Result<ConfigEntry> {
    entries(resolved)
        .into_iter()
        .find(|e| e.key == key)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Unknown config key '{}'. Valid keys: data-dir, {}",
                key,
                CONFIG_KEYS.join(", ")
            ))
        })
}

#[derive(Debug, Serialize)]
pub struct ConfigSet {
    pub key: String,
    pub value: String,
    pub path: PathBuf,
}

impl Output for ConfigSet {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path.display())
    }
}

pub fn config_set(key: &str, value: &str) -> Result<ConfigSet> {
    let mut config = read_config()?;
    config.set(key, value).map_err(Error::Config)?;
    let path = write_config(&config)?;

    Ok(ConfigSet {
        key: key.to_string(),
        value: value.to_string(),
        path,
    })
}
