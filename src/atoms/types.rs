// ── LINGR Atoms: Pure Data Types ───────────────────────────────────────────
// Plain struct/enum definitions shared by every engine.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    MOOD_THRESHOLD_ACTIVE, MOOD_THRESHOLD_DORMANT, MOOD_THRESHOLD_RESTLESS,
};
use crate::atoms::error::{EngineError, EngineResult};

// ═══════════════════════════════════════════════════════════════════════════
// Entity
// ═══════════════════════════════════════════════════════════════════════════

/// Discrete entity mood. Always derived from intensity, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Dormant,
    Restless,
    Active,
    Agitated,
}

impl Mood {
    pub const ALL: [Mood; 4] = [Mood::Dormant, Mood::Restless, Mood::Active, Mood::Agitated];

    /// The fixed threshold function: <0.3 dormant, <0.5 restless, <0.7 active.
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < MOOD_THRESHOLD_DORMANT {
            Mood::Dormant
        } else if intensity < MOOD_THRESHOLD_RESTLESS {
            Mood::Restless
        } else if intensity < MOOD_THRESHOLD_ACTIVE {
            Mood::Active
        } else {
            Mood::Agitated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Dormant => "dormant",
            Mood::Restless => "restless",
            Mood::Active => "active",
            Mood::Agitated => "agitated",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static multipliers on the entity's random deltas. Each trait is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub volatility: f64,
    pub aggression: f64,
    pub patience: f64,
    pub curiosity: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            volatility: 0.6,
            aggression: 0.5,
            patience: 0.4,
            curiosity: 0.7,
        }
    }
}

/// Partial personality update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityUpdate {
    pub volatility: Option<f64>,
    pub aggression: Option<f64>,
    pub patience: Option<f64>,
    pub curiosity: Option<f64>,
}

impl Personality {
    /// Merge a partial update, clamping every trait into [0, 1].
    pub fn merged(&self, update: &PersonalityUpdate) -> Self {
        let pick = |new: Option<f64>, old: f64| new.unwrap_or(old).clamp(0.0, 1.0);
        Self {
            volatility: pick(update.volatility, self.volatility),
            aggression: pick(update.aggression, self.aggression),
            patience: pick(update.patience, self.patience),
            curiosity: pick(update.curiosity, self.curiosity),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Environment
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvironmentMode {
    #[default]
    Unknown,
    Home,
    Away,
}

impl EnvironmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentMode::Unknown => "UNKNOWN",
            EnvironmentMode::Home => "HOME",
            EnvironmentMode::Away => "AWAY",
        }
    }
}

impl fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Platform permission state, surfaced as a value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
    Restricted,
}

// ═══════════════════════════════════════════════════════════════════════════
// Evidence
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Capture,
    Message,
    Anomaly,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Capture => "capture",
            EvidenceKind::Message => "message",
            EvidenceKind::Anomaly => "anomaly",
        }
    }
}

impl FromStr for EvidenceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "capture" => Ok(EvidenceKind::Capture),
            "message" => Ok(EvidenceKind::Message),
            "anomaly" => Ok(EvidenceKind::Anomaly),
            other => Err(EngineError::Config(format!("unknown evidence type '{other}'"))),
        }
    }
}

/// Free-form evidence metadata. Known fields are typed; anything else lands
/// in `extra` and round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EvidenceMetadata>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Summon
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummonIntent {
    PresenceQuery,
    MoodQuery,
    ActivityQuery,
    Boundary,
    Generic,
}

impl SummonIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummonIntent::PresenceQuery => "PRESENCE_QUERY",
            SummonIntent::MoodQuery => "MOOD_QUERY",
            SummonIntent::ActivityQuery => "ACTIVITY_QUERY",
            SummonIntent::Boundary => "BOUNDARY",
            SummonIntent::Generic => "GENERIC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummonExchange {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub response: String,
    pub intent: SummonIntent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummonResponse {
    pub intent: SummonIntent,
    pub response_text: String,
    /// The caller decides whether to materialize the exchange as evidence.
    pub should_create_evidence: bool,
    /// Answered with the fixed reply because the previous one was too recent.
    #[serde(default)]
    pub rate_limited: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Low,
    #[default]
    Normal,
    High,
}

impl Frequency {
    /// Maximum ambient notifications per calendar day.
    pub fn daily_cap(&self) -> u32 {
        match self {
            Frequency::Low => 2,
            Frequency::Normal => 5,
            Frequency::High => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Low => "low",
            Frequency::Normal => "normal",
            Frequency::High => "high",
        }
    }
}

impl FromStr for Frequency {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Frequency::Low),
            "normal" => Ok(Frequency::Normal),
            "high" => Ok(Frequency::High),
            other => Err(EngineError::Config(format!("unknown frequency '{other}'"))),
        }
    }
}

/// Time-of-day window in which ambient notifications are suppressed.
/// `start > end` wraps past midnight (23:00–07:00). `start == end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
        }
    }
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(s: &str) -> EngineResult<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| EngineError::Config(format!("quiet hours '{s}' must be HH:MM-HH:MM")))?;
        let parse = |part: &str| {
            NaiveTime::parse_from_str(part.trim(), "%H:%M")
                .map_err(|e| EngineError::Config(format!("bad quiet-hours time '{part}': {e}")))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }

    /// Minute-granular membership test.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = (time.hour(), time.minute());
        let start = (self.start.hour(), self.start.minute());
        let end = (self.end.hour(), self.end.minute());
        if start < end {
            t >= start && t < end
        } else if start > end {
            t >= start || t < end
        } else {
            false
        }
    }
}

impl fmt::Display for QuietHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Episodes
// ═══════════════════════════════════════════════════════════════════════════

/// Named external events that can advance episode steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeTrigger {
    OpenApp,
    Scan,
    EvidenceAdded,
    SummonMessage,
    Timer,
    NotificationSent,
}

impl EpisodeTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeTrigger::OpenApp => "open_app",
            EpisodeTrigger::Scan => "scan",
            EpisodeTrigger::EvidenceAdded => "evidence_added",
            EpisodeTrigger::SummonMessage => "summon_message",
            EpisodeTrigger::Timer => "timer",
            EpisodeTrigger::NotificationSent => "notification_sent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeAction {
    ShowMessage,
    Toast,
    Notification,
    AutoAddEvidence,
    IntensitySpike,
    SpawnApparition,
}

impl EpisodeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeAction::ShowMessage => "show_message",
            EpisodeAction::Toast => "toast",
            EpisodeAction::Notification => "notification",
            EpisodeAction::AutoAddEvidence => "auto_add_evidence",
            EpisodeAction::IntensitySpike => "intensity_spike",
            EpisodeAction::SpawnApparition => "spawn_apparition",
        }
    }
}

/// Opaque `{action, data}` pair handed to the UI-side action executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: EpisodeAction,
    pub data: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════════════════════
// Persistence keys
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    EntityState,
    Evidence,
    Episodes,
    ControlSettings,
    AppMetadata,
    SummonExchanges,
    EnvironmentData,
    DailyNotification,
}

impl StoreKey {
    pub const ALL: [StoreKey; 8] = [
        StoreKey::EntityState,
        StoreKey::Evidence,
        StoreKey::Episodes,
        StoreKey::ControlSettings,
        StoreKey::AppMetadata,
        StoreKey::SummonExchanges,
        StoreKey::EnvironmentData,
        StoreKey::DailyNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::EntityState => "entity-state",
            StoreKey::Evidence => "evidence",
            StoreKey::Episodes => "episodes",
            StoreKey::ControlSettings => "control-settings",
            StoreKey::AppMetadata => "app-metadata",
            StoreKey::SummonExchanges => "summon-exchanges",
            StoreKey::EnvironmentData => "environment-data",
            StoreKey::DailyNotification => "daily-notification-state",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
