// ── LINGR Atoms: Constants ─────────────────────────────────────────────────
// All named constants for the crate live here.

// ── Persistence ───────────────────────────────────────────────────────────
// Envelope version written with every persisted value. A stored value whose
// version differs is treated as absent.
pub const STATE_VERSION: &str = "1.0.0";
// High-frequency state (entity) is coalesced into one write per window.
pub const SAVE_DEBOUNCE_MS: i64 = 1_000;

// ── Entity: intensity bounds and mood thresholds ──────────────────────────
pub const INTENSITY_MIN: f64 = 0.1;
pub const INTENSITY_MAX: f64 = 0.95;
pub const DEFAULT_INTENSITY: f64 = 0.3;
pub const MOOD_THRESHOLD_DORMANT: f64 = 0.3;
pub const MOOD_THRESHOLD_RESTLESS: f64 = 0.5;
pub const MOOD_THRESHOLD_ACTIVE: f64 = 0.7;

// ── Entity: timers ────────────────────────────────────────────────────────
pub const MOOD_PROGRESSION_MIN_MS: i64 = 45_000;
pub const MOOD_PROGRESSION_MAX_MS: i64 = 180_000;
pub const INTENSITY_FLUCTUATION_MIN_MS: i64 = 5_000;
pub const INTENSITY_FLUCTUATION_MAX_MS: i64 = 15_000;
pub const COOLDOWN_MIN_MS: i64 = 120_000;
pub const COOLDOWN_MAX_MS: i64 = 300_000;

// ── Entity: mood progression ──────────────────────────────────────────────
// delta = (rand - BIAS) × volatility × SCALE, biased toward growth.
pub const MOOD_DELTA_BIAS: f64 = 0.3;
pub const MOOD_DELTA_SCALE: f64 = 0.15;
pub const AGGRESSION_SPIKE_CHANCE_SCALE: f64 = 0.1;
pub const AGGRESSION_SPIKE: f64 = 0.1;
pub const COOLDOWN_TRIGGER_INTENSITY: f64 = 0.85;
pub const COOLDOWN_TRIGGER_CHANCE: f64 = 0.2;
pub const COOLDOWN_INTENSITY_FACTOR: f64 = 0.6;
pub const COOLDOWN_INTENSITY_FLOOR: f64 = 0.2;
pub const MOOD_COOLDOWN_DECAY: f64 = 0.95;

// ── Entity: intensity fluctuation ─────────────────────────────────────────
pub const FLUCTUATION_DELTA_SCALE: f64 = 0.08;
pub const CURIOSITY_BUMP_CHANCE_SCALE: f64 = 0.05;
pub const CURIOSITY_BUMP: f64 = 0.05;
pub const CURIOSITY_BUMP_CEILING: f64 = 0.7;
pub const FLUCTUATION_COOLDOWN_DECAY: f64 = 0.98;

// ── Entity: staleness decay on hydration ──────────────────────────────────
// Past STALE_AFTER_HOURS of inactivity the saved intensity is scaled down by
// min(1, hours / STALE_FULL_DECAY_HOURS), never below the floor.
pub const STALE_AFTER_HOURS: i64 = 48;
pub const STALE_FULL_DECAY_HOURS: f64 = 168.0;
pub const STALE_INTENSITY_FLOOR: f64 = 0.15;

// ── Messages ──────────────────────────────────────────────────────────────
pub const MESSAGE_GLOBAL_COOLDOWN_MS: i64 = 15_000;
/// Returned when no catalog line qualifies. A valid display value.
pub const SILENT_MESSAGE: &str = "...";

// ── Environment ───────────────────────────────────────────────────────────
pub const HOME_RADIUS_METERS: f64 = 100.0;
pub const ENVIRONMENT_POLL_INTERVAL_SECS: i64 = 45;
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// ── Evidence ──────────────────────────────────────────────────────────────
pub const EVIDENCE_CAPACITY: usize = 100;

// ── Events scheduler ──────────────────────────────────────────────────────
pub const EVENTS_INTERVAL_MIN_MS: i64 = 20_000;
pub const EVENTS_INTERVAL_MAX_MS: i64 = 60_000;
pub const EVENT_HISTORY_CAPACITY: usize = 50;
// Evidence generation is skipped when rand > intensity × GATE.
pub const EVIDENCE_GATE_SCALE: f64 = 0.8;
pub const INTENSITY_EVENT_DELTA_SCALE: f64 = 0.15;
pub const MOOD_SHIFT_DELTA_SCALE: f64 = 0.1;

// ── Apparitions ───────────────────────────────────────────────────────────
pub const APPARITION_CHECK_INTERVAL_MS: i64 = 3_000;
pub const APPARITION_MIN_SPACING_MS: i64 = 8_000;
pub const APPARITION_DURATION_MIN_MS: i64 = 100;
pub const APPARITION_DURATION_MAX_MS: i64 = 400;
pub const APPARITION_HISTORY_CAPACITY: usize = 50;

// ── Ambient notifications ─────────────────────────────────────────────────
pub const AMBIENT_LEAD_MINUTES: i64 = 30;
pub const AMBIENT_MIN_GAP_MINUTES: i64 = 30;
pub const AMBIENT_MAX_ATTEMPTS: usize = 20;
pub const AMBIENT_DUPLICATE_GUARD_MINUTES: i64 = 5;
pub const AMBIENT_DORMANT_INTENSITY: f64 = 0.2;
pub const AMBIENT_DORMANT_FACTOR: f64 = 0.3;
pub const AMBIENT_TITLE: &str = "LINGR";
pub const AMBIENT_TEST_TITLE: &str = "LINGR [TEST]";
pub const AMBIENT_TEST_DELAY_SECS: i64 = 2;

// ── Summon ────────────────────────────────────────────────────────────────
pub const SUMMON_RATE_LIMIT_MS: i64 = 1_000;
pub const SUMMON_MAX_EXCHANGES: usize = 50;
pub const SUMMON_RATE_LIMIT_RESPONSE: &str = "It grows quiet.";
pub const SUMMON_RARE_CHANCE: f64 = 0.05;
pub const SUMMON_EVIDENCE_CHANCE: f64 = 0.02;
pub const SUMMON_BOUNDARY_STIMULUS: f64 = -0.05;
pub const SUMMON_PRESENCE_STIMULUS: f64 = 0.03;
pub const SUMMON_DEFAULT_STIMULUS: f64 = 0.01;

// ── Episodes ──────────────────────────────────────────────────────────────
pub const EPISODE_NOTIFICATION_DELAY_SECS: i64 = 1;
// Upper bound on synthetic triggers chained from a single external trigger.
pub const EPISODE_TRIGGER_CHAIN_LIMIT: usize = 16;
