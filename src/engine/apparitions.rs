// LINGR Engine: Apparitions
// Short transient visual events. A 3s check timer rolls against a
// per-mood probability scaled by environment, with a minimum spacing
// between apparitions. The UI renders them via the `spawn_apparition`
// action.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    APPARITION_CHECK_INTERVAL_MS, APPARITION_DURATION_MAX_MS, APPARITION_DURATION_MIN_MS,
    APPARITION_HISTORY_CAPACITY, APPARITION_MIN_SPACING_MS,
};
use crate::atoms::types::{EnvironmentMode, Mood};
use crate::engine::clock::Clock;
use crate::engine::random::{self, BoxRng};
use crate::engine::timers::{TimerKey, Timers};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApparitionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub intensity: f64,
    pub duration_ms: f64,
}

pub fn base_probability(mood: Mood) -> f64 {
    match mood {
        Mood::Dormant => 0.02,
        Mood::Restless => 0.08,
        Mood::Active => 0.15,
        Mood::Agitated => 0.25,
    }
}

/// Apparitions are rarer away from home.
pub fn environment_multiplier(environment: EnvironmentMode) -> f64 {
    match environment {
        EnvironmentMode::Home => 1.0,
        EnvironmentMode::Away => 0.4,
        EnvironmentMode::Unknown => 0.7,
    }
}

pub struct ApparitionSystem {
    rng: BoxRng,
    clock: Clock,
    timers: Timers,
    history: VecDeque<ApparitionEvent>,
    last_at: Option<DateTime<Utc>>,
    force_next: bool,
    running: bool,
}

impl ApparitionSystem {
    pub fn new(clock: Clock, timers: Timers, rng: BoxRng) -> Self {
        Self {
            rng,
            clock,
            timers,
            history: VecDeque::with_capacity(APPARITION_HISTORY_CAPACITY),
            last_at: None,
            force_next: false,
            running: false,
        }
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.arm();
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.timers.cancel(TimerKey::ApparitionCheck);
    }

    pub fn cleanup(&mut self) {
        self.stop();
        self.history.clear();
        self.last_at = None;
        self.force_next = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn arm(&self) {
        self.timers.schedule(
            TimerKey::ApparitionCheck,
            self.clock.now() + Duration::milliseconds(APPARITION_CHECK_INTERVAL_MS),
        );
    }

    pub fn on_timer(
        &mut self,
        mood: Mood,
        intensity: f64,
        environment: EnvironmentMode,
    ) -> Option<ApparitionEvent> {
        if !self.running {
            return None;
        }
        let spawned = self.check(mood, intensity, environment);
        self.arm();
        spawned
    }

    /// One probability check. A pending force bypasses both spacing and
    /// the roll.
    pub fn check(
        &mut self,
        mood: Mood,
        intensity: f64,
        environment: EnvironmentMode,
    ) -> Option<ApparitionEvent> {
        let now = self.clock.now();
        let too_soon = self
            .last_at
            .is_some_and(|last| now - last < Duration::milliseconds(APPARITION_MIN_SPACING_MS));
        if too_soon && !self.force_next {
            return None;
        }

        let probability = base_probability(mood) * environment_multiplier(environment);
        if !self.force_next && random::roll(self.rng.as_mut()) >= probability {
            return None;
        }
        self.force_next = false;
        Some(self.spawn(intensity))
    }

    /// Guarantee an apparition on the next check, and check now.
    pub fn force(
        &mut self,
        mood: Mood,
        intensity: f64,
        environment: EnvironmentMode,
    ) -> Option<ApparitionEvent> {
        self.force_next = true;
        self.check(mood, intensity, environment)
    }

    fn spawn(&mut self, intensity: f64) -> ApparitionEvent {
        let now = self.clock.now();
        let duration_ms = random::uniform(
            self.rng.as_mut(),
            APPARITION_DURATION_MIN_MS as f64,
            APPARITION_DURATION_MAX_MS as f64,
        );
        let event = ApparitionEvent {
            id: format!("apparition_{}", now.timestamp_millis()),
            timestamp: now,
            intensity,
            duration_ms,
        };

        if self.history.len() == APPARITION_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        self.last_at = Some(now);
        debug!("[apparitions] Spawned {} ({:.0}ms)", event.id, duration_ms);
        event
    }

    /// The last `limit` apparitions, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ApparitionEvent> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::testing::fixed;
    use chrono::TimeZone;

    fn system(roll: f64) -> (ApparitionSystem, Clock, Timers) {
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let timers = Timers::new();
        (
            ApparitionSystem::new(clock.clone(), timers.clone(), fixed(roll)),
            clock,
            timers,
        )
    }

    #[test]
    fn test_probability_table() {
        assert_eq!(base_probability(Mood::Agitated) * environment_multiplier(EnvironmentMode::Home), 0.25);
        assert!((base_probability(Mood::Active) * environment_multiplier(EnvironmentMode::Away) - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_roll_against_probability() {
        // 0.2 < 0.25 at home, but 0.2 >= 0.175 with unknown environment.
        let (mut system, _, _) = system(0.2);
        assert!(system.check(Mood::Agitated, 0.8, EnvironmentMode::Unknown).is_none());
        let event = system.check(Mood::Agitated, 0.8, EnvironmentMode::Home).unwrap();
        assert_eq!(event.intensity, 0.8);
        assert!((100.0..400.0).contains(&event.duration_ms));
    }

    #[test]
    fn test_min_spacing_and_force() {
        let (mut system, clock, _) = system(0.0);
        assert!(system.check(Mood::Dormant, 0.2, EnvironmentMode::Home).is_some());
        clock.advance(Duration::seconds(3));
        assert!(system.check(Mood::Dormant, 0.2, EnvironmentMode::Home).is_none());
        assert!(system.force(Mood::Dormant, 0.2, EnvironmentMode::Home).is_some());
        clock.advance(Duration::seconds(8));
        assert!(system.check(Mood::Dormant, 0.2, EnvironmentMode::Home).is_some());
    }

    #[test]
    fn test_history_capped() {
        let (mut system, clock, _) = system(0.0);
        for _ in 0..60 {
            system.force(Mood::Active, 0.6, EnvironmentMode::Home);
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(system.recent(100).len(), 50);
        let last_two = system.recent(2);
        assert!(last_two[0].timestamp < last_two[1].timestamp);
    }

    #[test]
    fn test_timer_rearms_until_stopped() {
        let (mut system, clock, timers) = system(0.99);
        system.start();
        let due = timers.due_at(TimerKey::ApparitionCheck).unwrap();
        assert_eq!(due, clock.now() + Duration::seconds(3));
        clock.set(due);
        assert!(system.on_timer(Mood::Dormant, 0.2, EnvironmentMode::Home).is_none());
        assert!(timers.is_scheduled(TimerKey::ApparitionCheck));
        system.cleanup();
        assert!(!timers.is_scheduled(TimerKey::ApparitionCheck));
    }
}
