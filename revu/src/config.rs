//! User configuration for the revu server.
//!
//! Read from `$XDG_CONFIG_HOME/revu/config.toml` (or `~/.config/revu/config.toml`).
//! Every key is optional; a missing or broken file falls back to defaults with
//! a warning, never an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Listen port; 0 picks a free one.
    pub port: u16,
    pub bind: String,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub mailbox_capacity: usize,
    pub base_ref: String,
    /// Review file name, relative to the repository root.
    pub review_file: String,
    /// Directory for the session database, relative to the repository root.
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 0,
            bind: "127.0.0.1".to_owned(),
            poll_interval_ms: 1000,
            debounce_ms: 500,
            mailbox_capacity: 64,
            base_ref: "HEAD".to_owned(),
            review_file: ".revu.json".to_owned(),
            data_dir: ".revu".to_owned(),
        }
    }
}

/// Returns the path to the revu config file.
///
/// Prefers `$XDG_CONFIG_HOME/revu/config.toml`; falls back to
/// `~/.config/revu/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("revu").join("config.toml")
}

/// Loads the config at `path`, or the defaults when it is absent or invalid.
pub fn load(path: &Path) -> Config {
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };
    parse(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "config parse error, using defaults");
        Config::default()
    })
}

pub fn parse(raw: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw)
}
