// LINGR Engine: Configuration
// `PresenceConfig` is the host-side TOML config (where the database lives,
// RNG seed, timezone, starting personality). `ControlSettings` are the
// user-facing toggles, persisted under `control-settings`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Frequency, Personality, QuietHours};
use crate::engine::store::default_db_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub db_path: PathBuf,
    /// Fixed seed for reproducible runs. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// IANA timezone used for calendar-day keys and quiet hours.
    pub timezone: String,
    pub personality: Personality,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            seed: None,
            timezone: "UTC".into(),
            personality: Personality::default(),
        }
    }
}

impl PresenceConfig {
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: PresenceConfig = toml::from_str(s)?;
        config.tz()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            info!("[config] No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn tz(&self) -> EngineResult<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|e| EngineError::Config(format!("unknown timezone '{}': {}", self.timezone, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Master switch. When off, every timer-driven engine is paused.
    pub presence_active: bool,
    pub ambient_notifications_enabled: bool,
    pub frequency: Frequency,
    pub quiet_hours: QuietHours,
    pub haptics_enabled: bool,
    pub location_awareness_enabled: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            presence_active: true,
            ambient_notifications_enabled: false,
            frequency: Frequency::Normal,
            quiet_hours: QuietHours::default(),
            haptics_enabled: true,
            location_awareness_enabled: false,
        }
    }
}

impl ControlSettings {
    /// Ambient notifications run only while presence itself is active.
    pub fn ambient_effective(&self) -> bool {
        self.ambient_notifications_enabled && self.presence_active
    }
}
