//! Configuration loading.
//!
//! Reads `~/.pouch/config.toml` (or `$POUCH_CONFIG`). Every key is optional;
//! a missing file yields defaults.
//!
//! ```toml
//! owner = "alice"
//! default_target_minutes = 30
//! database_path = "/home/alice/.pouch/pouch.db"
//!
//! [sweep]
//! interval_secs = 60
//!
//! [notification]
//! title = "Pouch Timer Complete"
//! body = "Your pouch timer has finished!"
//! command = ["notify-send", "--app-name=pouch"]
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PouchError, Result};
use crate::notify::{CommandNotifier, LogNotifier, Notifier, DEFAULT_BODY, DEFAULT_TITLE};

pub const CONFIG_ENV_VAR: &str = "POUCH_CONFIG";
/// Hosts are not asked to sweep more often than this.
pub const MIN_SWEEP_INTERVAL_SECS: u64 = 60;

const DEFAULT_TARGET_MINUTES: u32 = 30;
const FALLBACK_OWNER: &str = "local";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PouchConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_target_minutes")]
    pub default_target_minutes: u32,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Default for PouchConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            default_target_minutes: default_target_minutes(),
            database_path: None,
            sweep: SweepConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SweepConfig {
    /// Configured interval, never shorter than one minute.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_SWEEP_INTERVAL_SECS))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            command: Vec::new(),
        }
    }
}

impl NotificationConfig {
    /// Command notifier when one is configured, log-only otherwise.
    pub fn notifier(&self) -> Box<dyn Notifier + Send + Sync> {
        match CommandNotifier::from_argv(&self.command) {
            Some(notifier) => Box::new(notifier),
            None => Box::new(LogNotifier),
        }
    }
}

impl PouchConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(pouch_dir()?.join("pouch.db")),
        }
    }
}

/// Returns `~/.pouch`.
pub fn pouch_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".pouch"))
        .ok_or(PouchError::HomeDirNotFound)
}

pub fn default_config_path() -> Result<PathBuf> {
    match env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(pouch_dir()?.join("config.toml")),
    }
}

pub fn load_config(path: Option<PathBuf>) -> Result<PouchConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(PouchConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| PouchError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    let config: PouchConfig =
        toml::from_str(&content).map_err(|err| PouchError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;

    if config.owner.trim().is_empty() {
        return Err(PouchError::ConfigMalformed {
            path: config_path,
            details: "owner must not be empty".to_string(),
        });
    }
    Ok(config)
}

fn default_owner() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_OWNER.to_string())
}

fn default_target_minutes() -> u32 {
    DEFAULT_TARGET_MINUTES
}

fn default_sweep_interval_secs() -> u64 {
    MIN_SWEEP_INTERVAL_SECS
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}
