// LINGR Engine: Entity State
// Owns the entity's mood and intensity. Two independent timers perturb the
// state (mood progression, intensity fluctuation); everything else reaches
// it through `stimulate`. Mood is never stored independently of intensity:
// every write goes through `set_intensity`, which clamps and re-derives it.
//
// Hydration applies a staleness decay so an entity left alone for days
// comes back calmer than it was saved.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::*;
use crate::atoms::types::{Mood, Personality, PersonalityUpdate, StoreKey};
use crate::engine::clock::Clock;
use crate::engine::random::{self, BoxRng};
use crate::engine::store::DebouncedWriter;
use crate::engine::timers::{TimerKey, Timers};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub mood: Mood,
    pub intensity: f64,
    pub last_mood_change: DateTime<Utc>,
    pub last_intensity_change: DateTime<Utc>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub personality: Personality,
    pub scan_count: u64,
    pub detection_count: u64,
    pub interaction_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

impl EntityState {
    fn fresh(now: DateTime<Utc>, personality: Personality) -> Self {
        Self {
            mood: Mood::from_intensity(DEFAULT_INTENSITY),
            intensity: DEFAULT_INTENSITY,
            last_mood_change: now,
            last_intensity_change: now,
            cooldown_until: None,
            personality,
            scan_count: 0,
            detection_count: 0,
            interaction_count: 0,
            last_activity_at: now,
        }
    }
}

/// The subset of entity state that survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntity {
    pub mood: Mood,
    pub intensity: f64,
    pub last_activity_at: DateTime<Utc>,
    pub personality: Personality,
    #[serde(default)]
    pub scan_count: u64,
    #[serde(default)]
    pub detection_count: u64,
    #[serde(default)]
    pub interaction_count: u64,
}

/// Intensity after `hours_idle` hours without activity. No decay up to
/// 48h; past that the decay factor grows linearly to 1 at one week, with a
/// floor of 0.15.
pub fn decay_for_staleness(intensity: f64, hours_idle: f64) -> f64 {
    if hours_idle <= STALE_AFTER_HOURS as f64 {
        return intensity;
    }
    let factor = (hours_idle / STALE_FULL_DECAY_HOURS).min(1.0);
    (intensity * (1.0 - factor)).max(STALE_INTENSITY_FLOOR)
}

fn clamp_intensity(value: f64) -> f64 {
    value.clamp(INTENSITY_MIN, INTENSITY_MAX)
}

pub struct EntityEngine {
    state: EntityState,
    rng: BoxRng,
    clock: Clock,
    timers: Timers,
    writer: Arc<DebouncedWriter>,
    initialized: bool,
    running: bool,
}

impl EntityEngine {
    pub fn new(
        clock: Clock,
        timers: Timers,
        writer: Arc<DebouncedWriter>,
        rng: BoxRng,
        personality: Personality,
    ) -> Self {
        let now = clock.now();
        Self {
            state: EntityState::fresh(now, personality),
            rng,
            clock,
            timers,
            writer,
            initialized: false,
            running: false,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Hydrate from storage once. Later calls are no-ops.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let Some(saved) = self
            .writer
            .store()
            .load::<PersistedEntity>(StoreKey::EntityState)
        else {
            info!("[entity] No saved state, starting fresh at {:.2}", self.state.intensity);
            return;
        };

        let now = self.clock.now();
        let hours_idle = (now - saved.last_activity_at).num_seconds().max(0) as f64 / 3600.0;
        let intensity = clamp_intensity(decay_for_staleness(saved.intensity, hours_idle));
        if intensity != saved.intensity {
            info!(
                "[entity] Idle for {:.1}h, intensity decayed {:.2} -> {:.2}",
                hours_idle, saved.intensity, intensity
            );
        }

        self.state.intensity = intensity;
        self.state.mood = Mood::from_intensity(intensity);
        self.state.personality = saved.personality;
        self.state.scan_count = saved.scan_count;
        self.state.detection_count = saved.detection_count;
        self.state.interaction_count = saved.interaction_count;
        self.state.last_activity_at = saved.last_activity_at;
        self.state.last_mood_change = now;
        self.state.last_intensity_change = now;
        self.state.cooldown_until = None;

        info!(
            "[entity] Restored: {} at {:.2} ({} interactions)",
            self.state.mood, self.state.intensity, self.state.interaction_count
        );
    }

    /// Arm both perturbation timers.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.arm_mood_timer();
        self.arm_fluctuation_timer();
        debug!("[entity] Timers started");
    }

    /// Cancel both perturbation timers.
    pub fn stop(&mut self) {
        self.running = false;
        self.timers.cancel(TimerKey::MoodProgression);
        self.timers.cancel(TimerKey::IntensityFluctuation);
        debug!("[entity] Timers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn arm_mood_timer(&mut self) {
        let delay = random::delay_ms(
            self.rng.as_mut(),
            MOOD_PROGRESSION_MIN_MS,
            MOOD_PROGRESSION_MAX_MS,
        );
        self.timers
            .schedule(TimerKey::MoodProgression, self.clock.now() + delay);
    }

    fn arm_fluctuation_timer(&mut self) {
        let delay = random::delay_ms(
            self.rng.as_mut(),
            INTENSITY_FLUCTUATION_MIN_MS,
            INTENSITY_FLUCTUATION_MAX_MS,
        );
        self.timers
            .schedule(TimerKey::IntensityFluctuation, self.clock.now() + delay);
    }

    pub fn on_mood_timer(&mut self) {
        if !self.running {
            return;
        }
        self.progress_mood();
        self.arm_mood_timer();
    }

    pub fn on_fluctuation_timer(&mut self) {
        if !self.running {
            return;
        }
        self.fluctuate();
        self.arm_fluctuation_timer();
    }

    // ── Perturbation ────────────────────────────────────────────────────

    fn set_intensity(&mut self, value: f64) {
        let now = self.clock.now();
        let previous = self.state.mood;
        self.state.intensity = clamp_intensity(value);
        self.state.mood = Mood::from_intensity(self.state.intensity);
        self.state.last_intensity_change = now;
        if self.state.mood != previous {
            self.state.last_mood_change = now;
            info!("[entity] Mood shift: {} -> {}", previous, self.state.mood);
        }
    }

    /// One mood-progression tick: growth-biased drift, an occasional
    /// aggression spike, and a chance of cooldown near the ceiling.
    pub fn progress_mood(&mut self) {
        if self.is_in_cooldown() {
            self.set_intensity(self.state.intensity * MOOD_COOLDOWN_DECAY);
            self.persist();
            return;
        }

        let Personality {
            volatility,
            aggression,
            ..
        } = self.state.personality;

        let delta = (random::roll(self.rng.as_mut()) - MOOD_DELTA_BIAS) * volatility * MOOD_DELTA_SCALE;
        let mut next = clamp_intensity(self.state.intensity + delta);
        if random::roll(self.rng.as_mut()) < aggression * AGGRESSION_SPIKE_CHANCE_SCALE {
            next += AGGRESSION_SPIKE;
            debug!("[entity] Aggression spike");
        }
        self.set_intensity(next);

        if self.state.intensity > COOLDOWN_TRIGGER_INTENSITY
            && random::roll(self.rng.as_mut()) < COOLDOWN_TRIGGER_CHANCE
        {
            self.enter_cooldown();
        }
        self.persist();
    }

    /// One intensity-fluctuation tick: symmetric jitter plus an occasional
    /// curiosity bump that never pushes past 0.7.
    pub fn fluctuate(&mut self) {
        if self.is_in_cooldown() {
            self.set_intensity(self.state.intensity * FLUCTUATION_COOLDOWN_DECAY);
            self.persist();
            return;
        }

        let Personality {
            volatility,
            curiosity,
            ..
        } = self.state.personality;

        let delta = (random::roll(self.rng.as_mut()) - 0.5) * volatility * FLUCTUATION_DELTA_SCALE;
        let mut next = clamp_intensity(self.state.intensity + delta);
        if random::roll(self.rng.as_mut()) < curiosity * CURIOSITY_BUMP_CHANCE_SCALE
            && next < CURIOSITY_BUMP_CEILING
        {
            next = (next + CURIOSITY_BUMP).min(CURIOSITY_BUMP_CEILING);
        }
        self.set_intensity(next);
        self.persist();
    }

    fn enter_cooldown(&mut self) {
        let duration = random::delay_ms(self.rng.as_mut(), COOLDOWN_MIN_MS, COOLDOWN_MAX_MS);
        let until = self.clock.now() + duration;
        self.state.cooldown_until = Some(until);
        self.set_intensity(
            (self.state.intensity * COOLDOWN_INTENSITY_FACTOR).max(COOLDOWN_INTENSITY_FLOOR),
        );
        info!(
            "[entity] Cooldown for {}s, intensity now {:.2}",
            duration.num_seconds(),
            self.state.intensity
        );
    }

    // ── External mutation ───────────────────────────────────────────────

    /// Nudge intensity by `amount`. Ignored entirely while in cooldown.
    /// Returns whether the stimulus was applied.
    pub fn stimulate(&mut self, amount: f64) -> bool {
        if self.is_in_cooldown() {
            debug!("[entity] Stimulus {:+.3} ignored during cooldown", amount);
            return false;
        }
        self.set_intensity(self.state.intensity + amount);
        self.state.interaction_count += 1;
        self.persist();
        true
    }

    pub fn record_scan(&mut self) {
        self.state.scan_count += 1;
        self.persist();
    }

    pub fn record_detection(&mut self) {
        self.state.detection_count += 1;
        self.persist();
    }

    pub fn set_personality(&mut self, update: &PersonalityUpdate) {
        self.state.personality = self.state.personality.merged(update);
        info!("[entity] Personality updated: {:?}", self.state.personality);
        self.persist();
    }

    /// Back to a freshly constructed entity; persisted state is dropped.
    pub fn reset(&mut self, personality: Personality) {
        self.writer.cancel(StoreKey::EntityState);
        self.writer.store().remove(StoreKey::EntityState);
        self.state = EntityState::fresh(self.clock.now(), personality);
        info!("[entity] Reset");
    }

    fn persist(&mut self) {
        self.state.last_activity_at = self.clock.now();
        self.writer.queue(StoreKey::EntityState, &self.persisted());
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn mood(&self) -> Mood {
        self.state.mood
    }

    pub fn intensity(&self) -> f64 {
        self.state.intensity
    }

    pub fn is_in_cooldown(&self) -> bool {
        matches!(self.state.cooldown_until, Some(until) if self.clock.now() < until)
    }

    pub fn personality(&self) -> Personality {
        self.state.personality
    }

    pub fn state(&self) -> EntityState {
        self.state.clone()
    }

    pub fn persisted(&self) -> PersistedEntity {
        PersistedEntity {
            mood: self.state.mood,
            intensity: self.state.intensity,
            last_activity_at: self.state.last_activity_at,
            personality: self.state.personality,
            scan_count: self.state.scan_count,
            detection_count: self.state.detection_count,
            interaction_count: self.state.interaction_count,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_rng(&mut self, rng: BoxRng) {
        self.rng = rng;
    }

    #[cfg(test)]
    pub(crate) fn force_intensity(&mut self, value: f64) {
        self.set_intensity(value);
    }

    pub(crate) fn cooldown_remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.state
            .cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }
}
