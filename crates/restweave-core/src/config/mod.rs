//! Settings for the hot-reload subsystem.
//!
//! Settings are plain serde structs so embedding hosts can deserialize them
//! from their own configuration files, with [`HotReloadSettings::from_env`]
//! as the environment-driven constructor used by the shipped binary.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while reading settings from the environment.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Settings validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Bound on retained snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Maximum number of snapshots retained; oldest evicted first.
    pub max_history: usize,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self { max_history: 10 }
    }
}

/// Knobs governing the whole hot-reload subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadSettings {
    /// Gate for the whole subsystem; when false, `initialize` is a no-op.
    pub enabled: bool,
    /// Whether to start the file watcher at all.
    pub watch_directories: bool,
    /// Directories scanned for declarative files and watched for changes.
    pub config_dirs: Vec<PathBuf>,
    /// Glob patterns (single `*` wildcard) selecting watched files.
    pub patterns: Vec<String>,
    /// Per-path debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Consecutive reload failures before the orchestrator disables itself.
    pub max_attempts: u32,
    /// Restore the pre-reload snapshot when an apply fails.
    pub rollback_on_failure: bool,
    /// Run the validation pipeline before applying a delta.
    pub validate_before_apply: bool,
    /// Aggregate deadline for parallel connectivity probes, in seconds.
    pub connectivity_timeout_secs: u64,
    pub snapshot: SnapshotSettings,
}

impl Default for HotReloadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_directories: true,
            config_dirs: vec![PathBuf::from("config")],
            patterns: vec![
                "*-databases.yml".to_string(),
                "*-queries.yml".to_string(),
                "*-endpoints.yml".to_string(),
            ],
            debounce_ms: 300,
            max_attempts: 5,
            rollback_on_failure: true,
            validate_before_apply: true,
            connectivity_timeout_secs: 30,
            snapshot: SnapshotSettings::default(),
        }
    }
}

impl HotReloadSettings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let settings = Self {
            enabled: parse_env("HOT_RELOAD_ENABLED", defaults.enabled)?,
            watch_directories: parse_env(
                "HOT_RELOAD_WATCH_DIRECTORIES",
                defaults.watch_directories,
            )?,
            config_dirs: parse_path_list("HOT_RELOAD_CONFIG_DIRS", defaults.config_dirs),
            patterns: parse_list("HOT_RELOAD_PATTERNS", defaults.patterns),
            debounce_ms: parse_env("HOT_RELOAD_DEBOUNCE_MS", defaults.debounce_ms)?,
            max_attempts: parse_env("HOT_RELOAD_MAX_ATTEMPTS", defaults.max_attempts)?,
            rollback_on_failure: parse_env(
                "HOT_RELOAD_ROLLBACK_ON_FAILURE",
                defaults.rollback_on_failure,
            )?,
            validate_before_apply: parse_env(
                "HOT_RELOAD_VALIDATE_BEFORE_APPLY",
                defaults.validate_before_apply,
            )?,
            connectivity_timeout_secs: parse_env(
                "CONNECTIVITY_TIMEOUT_SECS",
                defaults.connectivity_timeout_secs,
            )?,
            snapshot: SnapshotSettings {
                max_history: parse_env("SNAPSHOT_MAX_HISTORY", defaults.snapshot.max_history)?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.enabled && self.watch_directories && self.config_dirs.is_empty() {
            return Err(SettingsError::ValidationFailed {
                message: "watch_directories is enabled but no config_dirs are set".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(SettingsError::ValidationFailed {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.snapshot.max_history == 0 {
            return Err(SettingsError::ValidationFailed {
                message: "snapshot.max_history must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }
}

fn parse_env<T: FromStr>(var: &str, default: T) -> Result<T, SettingsError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| SettingsError::InvalidValue {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_list(var: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(var) {
        Ok(value) => value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => default,
    }
}

fn parse_path_list(var: &str, default: Vec<PathBuf>) -> Vec<PathBuf> {
    match std::env::var(var) {
        Ok(value) => value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => default,
    }
}
