//! TOML-based application configuration.
//!
//! Stores the engine-wide snooze economy (cost tiers, ceiling, snooze
//! duration) and sync preferences. Configuration is stored at
//! `~/.config/wakefund/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;

/// Snooze economy configuration.
///
/// Tiers and ceiling are engine-wide, not per-alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomySection {
    /// Ordered charge per successive snooze, in cents. Clamped at the
    /// last tier for any snooze count at or beyond the list's length.
    #[serde(default = "default_tiers_cents")]
    pub tiers_cents: Vec<i64>,
    /// Maximum snoozes per alarm per calendar day.
    #[serde(default = "default_max_snoozes")]
    pub max_snoozes: u32,
    /// Countdown before a snoozed alarm re-alerts.
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Background pull interval.
    #[serde(default = "default_sync_interval")]
    pub interval_minutes: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/wakefund/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub economy: EconomySection,
    #[serde(default)]
    pub sync: SyncSection,
}

fn default_tiers_cents() -> Vec<i64> {
    vec![99, 199, 299, 499, 999]
}
fn default_max_snoozes() -> u32 {
    5
}
fn default_snooze_minutes() -> u32 {
    9
}
fn default_true() -> bool {
    true
}
fn default_sync_interval() -> u32 {
    15
}

impl Default for EconomySection {
    fn default() -> Self {
        Self {
            tiers_cents: default_tiers_cents(),
            max_snoozes: default_max_snoozes(),
            snooze_minutes: default_snooze_minutes(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_minutes: default_sync_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            economy: EconomySection::default(),
            sync: SyncSection::default(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/wakefund"),
                message: e.to_string(),
            })?
            .join("config.toml"))
    }

    /// Load the config file, falling back to defaults when it does not
    /// exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.economy.tiers_cents.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "economy.tiers_cents".into(),
                message: "at least one cost tier is required".into(),
            });
        }
        if self.economy.tiers_cents.iter().any(|&c| c < 0) {
            return Err(ConfigError::InvalidValue {
                key: "economy.tiers_cents".into(),
                message: "tiers must be non-negative".into(),
            });
        }
        if self.economy.snooze_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "economy.snooze_minutes".into(),
                message: "snooze duration must be at least one minute".into(),
            });
        }
        Ok(())
    }
}
