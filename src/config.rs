use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

pub const APP_DIR_NAME: &str = "pulsar-battery";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const UNLOCKED_THRESHOLD_ENV: &str = "BATTERY_LEVEL_ALERT_THRESHOLD";
pub const LOCKED_THRESHOLD_ENV: &str = "BATTERY_LEVEL_ALERT_THRESHOLD_LOCKED";

pub const MIN_POLL_INTERVAL_MINUTES: f64 = 0.1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub poll_interval_minutes: f64,            // live read cadence while unlocked
    pub log_interval_minutes: f64,             // history logging cadence
    pub alert_threshold_unlocked_percent: u8,  // alert below this while in use
    pub alert_threshold_locked_percent: u8,    // alert below this when walking away
    pub enable_beeps: bool,
    pub alert_cooldown_minutes: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 1.0,
            log_interval_minutes: 5.0,
            alert_threshold_unlocked_percent: 5,
            alert_threshold_locked_percent: 30,
            enable_beeps: true,
            alert_cooldown_minutes: 20.0,
        }
    }
}

impl AppSettings {
    /// Defaults, with alert thresholds taken from the environment when set.
    pub fn from_environment() -> Self {
        let defaults = Self::default();
        Self {
            alert_threshold_unlocked_percent: env_percent(
                UNLOCKED_THRESHOLD_ENV,
                defaults.alert_threshold_unlocked_percent,
            ),
            alert_threshold_locked_percent: env_percent(
                LOCKED_THRESHOLD_ENV,
                defaults.alert_threshold_locked_percent,
            ),
            ..defaults
        }
    }

    /// Clamps every field into its valid range. Out-of-range stored values are
    /// corrected, never reported.
    pub fn sanitize(self) -> Self {
        Self {
            poll_interval_minutes: clamp_minutes(
                self.poll_interval_minutes,
                MIN_POLL_INTERVAL_MINUTES,
                120.0,
            ),
            log_interval_minutes: clamp_minutes(self.log_interval_minutes, 0.1, 240.0),
            alert_threshold_unlocked_percent: self.alert_threshold_unlocked_percent.clamp(1, 100),
            alert_threshold_locked_percent: self.alert_threshold_locked_percent.clamp(1, 100),
            enable_beeps: self.enable_beeps,
            alert_cooldown_minutes: clamp_minutes(self.alert_cooldown_minutes, 0.0, 24.0 * 60.0),
        }
    }

    /// Immutable policy snapshot for the monitor.
    pub fn policy(&self) -> AlertPolicy {
        let s = self.clone().sanitize();
        AlertPolicy {
            poll_interval: minutes(s.poll_interval_minutes),
            log_interval: minutes(s.log_interval_minutes),
            unlocked_threshold: s.alert_threshold_unlocked_percent,
            locked_threshold: s.alert_threshold_locked_percent,
            alert_cooldown: minutes(s.alert_cooldown_minutes),
            beeps_enabled: s.enable_beeps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub poll_interval: Duration,
    pub log_interval: Duration,
    pub unlocked_threshold: u8,
    pub locked_threshold: u8,
    pub alert_cooldown: Duration,
    pub beeps_enabled: bool,
}

/// Source of settings snapshots. The monitor reads one on every evaluation and
/// never writes back.
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> AppSettings;
}

impl SettingsProvider for AppSettings {
    fn snapshot(&self) -> AppSettings {
        self.clone()
    }
}

/// Settings shared with an editor (UI, file watcher). Updates replace the whole
/// snapshot.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<AppSettings>>,
}

impl SharedSettings {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn replace(&self, settings: AppSettings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings.sanitize();
    }
}

impl SettingsProvider for SharedSettings {
    fn snapshot(&self) -> AppSettings {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

pub fn load_config() -> Result<AppSettings, ConfigError> {
    load_config_from(&get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Reads settings from `path`, writing environment-aware defaults there first
/// if the file doesn't exist yet.
pub fn load_config_from(path: &Path) -> Result<AppSettings, ConfigError> {
    if !path.exists() {
        let defaults = AppSettings::from_environment().sanitize();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string(&defaults)?)?;
        info!("Created default config file at: {:?}", path);
        return Ok(defaults);
    }

    let raw = fs::read_to_string(path)?;
    let settings: AppSettings = toml::from_str(&raw)?;
    Ok(settings.sanitize())
}

fn env_percent(name: &str, fallback: u8) -> u8 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn clamp_minutes(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

fn minutes(value: f64) -> Duration {
    Duration::from_secs_f64(value * 60.0)
}
