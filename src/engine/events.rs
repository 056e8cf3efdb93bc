// LINGR Engine: Events Scheduler
// Randomized-interval driver that perturbs the entity and produces evidence
// and messages. Each tick rolls one of four event kinds, weighted by the
// current intensity band, then runs its handler against the borrowed
// engines in `EventWorld`.
//
// Subscribers are notified by `Presence` after engine locks are released.
// A failing or panicking subscriber is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    EVENTS_INTERVAL_MAX_MS, EVENTS_INTERVAL_MIN_MS, EVENT_HISTORY_CAPACITY, EVIDENCE_GATE_SCALE,
    INTENSITY_EVENT_DELTA_SCALE, MOOD_SHIFT_DELTA_SCALE,
};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{EnvironmentMode, EvidenceKind, EvidenceMetadata, Mood};
use crate::engine::clock::Clock;
use crate::engine::entity::EntityEngine;
use crate::engine::evidence::{generate_description, EvidenceStore};
use crate::engine::messages::MessageSystem;
use crate::engine::random::{self, BoxRng};
use crate::engine::timers::{TimerKey, Timers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IntensityChange,
    MoodShift,
    EvidenceGeneration,
    MessageRefresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventData {
    IntensityChange {
        previous_intensity: f64,
        new_intensity: f64,
        delta: f64,
    },
    MoodShift {
        previous_mood: Mood,
        new_mood: Mood,
        stimulation: f64,
    },
    EvidenceGeneration {
        evidence_id: String,
        evidence_type: EvidenceKind,
        description: String,
    },
    MessageRefresh {
        mood: Mood,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// `None` when the handler decided to do nothing (e.g. the evidence
    /// gate rolled against it).
    pub data: Option<EventData>,
}

impl PresenceEvent {
    /// Id of the evidence entry this event produced, if any.
    pub fn evidence_id(&self) -> Option<&str> {
        match &self.data {
            Some(EventData::EvidenceGeneration { evidence_id, .. }) => Some(evidence_id.as_str()),
            _ => None,
        }
    }
}

pub type Subscriber = Arc<dyn Fn(&PresenceEvent) -> EngineResult<()> + Send + Sync>;

/// Mutable view of the engines an event tick touches.
pub struct EventWorld<'a> {
    pub entity: &'a mut EntityEngine,
    pub evidence: &'a mut EvidenceStore,
    pub messages: &'a mut MessageSystem,
    pub environment: EnvironmentMode,
}

/// Three intensity bands, each with its own roll thresholds. High intensity
/// favors evidence and intensity events; low intensity favors messages.
pub fn select_event_kind(intensity: f64, roll: f64) -> EventKind {
    use EventKind::*;
    if intensity > 0.7 {
        match roll {
            r if r < 0.4 => EvidenceGeneration,
            r if r < 0.6 => IntensityChange,
            r if r < 0.8 => MoodShift,
            _ => MessageRefresh,
        }
    } else if intensity > 0.4 {
        match roll {
            r if r < 0.3 => EvidenceGeneration,
            r if r < 0.5 => IntensityChange,
            r if r < 0.7 => MessageRefresh,
            _ => MoodShift,
        }
    } else {
        match roll {
            r if r < 0.15 => EvidenceGeneration,
            r if r < 0.45 => IntensityChange,
            r if r < 0.75 => MessageRefresh,
            _ => MoodShift,
        }
    }
}

pub fn select_evidence_kind(intensity: f64, roll: f64) -> EvidenceKind {
    use EvidenceKind::*;
    if intensity > 0.7 {
        match roll {
            r if r < 0.4 => Capture,
            r if r < 0.7 => Anomaly,
            _ => Message,
        }
    } else if intensity > 0.4 {
        match roll {
            r if r < 0.3 => Capture,
            r if r < 0.6 => Message,
            _ => Anomaly,
        }
    } else {
        match roll {
            r if r < 0.2 => Capture,
            r if r < 0.5 => Anomaly,
            _ => Message,
        }
    }
}

/// Call every subscriber with `event`, containing failures.
pub fn notify_subscribers(subscribers: &[(String, Subscriber)], event: &PresenceEvent) {
    for (name, callback) in subscribers {
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[events] Subscriber '{}' failed: {}", name, e),
            Err(_) => error!("[events] Subscriber '{}' panicked", name),
        }
    }
}

pub struct EventsScheduler {
    rng: BoxRng,
    clock: Clock,
    timers: Timers,
    running: bool,
    history: Vec<PresenceEvent>,
    subscribers: Vec<(String, Subscriber)>,
}

impl EventsScheduler {
    pub fn new(clock: Clock, timers: Timers, rng: BoxRng) -> Self {
        Self {
            rng,
            clock,
            timers,
            running: false,
            history: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.arm();
        debug!("[events] Started");
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.timers.cancel(TimerKey::EventsTick);
        debug!("[events] Stopped");
    }

    /// Stop, drop every subscriber and forget history.
    pub fn cleanup(&mut self) {
        self.stop();
        self.subscribers.clear();
        self.history.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn arm(&mut self) {
        let delay = random::delay_ms(
            self.rng.as_mut(),
            EVENTS_INTERVAL_MIN_MS,
            EVENTS_INTERVAL_MAX_MS,
        );
        self.timers.schedule(TimerKey::EventsTick, self.clock.now() + delay);
    }

    /// Timer fired: generate one event and re-arm.
    pub fn on_timer(&mut self, world: EventWorld<'_>) -> Option<PresenceEvent> {
        if !self.running {
            return None;
        }
        let event = self.tick(world);
        self.arm();
        Some(event)
    }

    // ── Generation ──────────────────────────────────────────────────────

    /// Generate and record one event.
    pub fn tick(&mut self, world: EventWorld<'_>) -> PresenceEvent {
        let roll = random::roll(self.rng.as_mut());
        let kind = select_event_kind(world.entity.intensity(), roll);
        let data = match kind {
            EventKind::IntensityChange => Some(self.intensity_change(world.entity)),
            EventKind::MoodShift => Some(self.mood_shift(world.entity)),
            EventKind::EvidenceGeneration => self.evidence_generation(world),
            EventKind::MessageRefresh => Some(Self::message_refresh(world)),
        };

        let event = PresenceEvent {
            kind,
            timestamp: self.clock.now(),
            data,
        };
        debug!("[events] {:?}", event.kind);

        self.history.insert(0, event.clone());
        self.history.truncate(EVENT_HISTORY_CAPACITY);
        event
    }

    fn intensity_change(&mut self, entity: &mut EntityEngine) -> EventData {
        let previous_intensity = entity.intensity();
        let delta = (random::roll(self.rng.as_mut()) - 0.5) * INTENSITY_EVENT_DELTA_SCALE;
        entity.stimulate(delta);
        EventData::IntensityChange {
            previous_intensity,
            new_intensity: entity.intensity(),
            delta,
        }
    }

    fn mood_shift(&mut self, entity: &mut EntityEngine) -> EventData {
        let previous_mood = entity.mood();
        let stimulation = random::roll(self.rng.as_mut()) * MOOD_SHIFT_DELTA_SCALE
            - MOOD_SHIFT_DELTA_SCALE / 2.0;
        entity.stimulate(stimulation);
        EventData::MoodShift {
            previous_mood,
            new_mood: entity.mood(),
            stimulation,
        }
    }

    fn evidence_generation(&mut self, world: EventWorld<'_>) -> Option<EventData> {
        let intensity = world.entity.intensity();
        let mood = world.entity.mood();
        if random::roll(self.rng.as_mut()) > intensity * EVIDENCE_GATE_SCALE {
            return None;
        }

        let kind = select_evidence_kind(intensity, random::roll(self.rng.as_mut()));
        let description = generate_description(kind, self.rng.as_mut());
        let entry = world.evidence.add(
            kind,
            description,
            Some(EvidenceMetadata {
                intensity: Some(intensity),
                mood: Some(mood),
                environment: Some(world.environment),
                ..Default::default()
            }),
        );
        Some(EventData::EvidenceGeneration {
            evidence_id: entry.id,
            evidence_type: kind,
            description: description.to_string(),
        })
    }

    fn message_refresh(world: EventWorld<'_>) -> EventData {
        let mood = world.entity.mood();
        let message = world.messages.get_message(mood, Some(world.environment));
        EventData::MessageRefresh {
            mood,
            message: message.to_string(),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Register `callback` under `name`, replacing any previous one.
    pub fn on(&mut self, name: impl Into<String>, callback: Subscriber) {
        let name = name.into();
        match self.subscribers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = callback,
            None => self.subscribers.push((name, callback)),
        }
    }

    pub fn off(&mut self, name: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(n, _)| n != name);
        self.subscribers.len() != before
    }

    /// Snapshot of the registry, for notifying outside any lock.
    pub fn subscribers(&self) -> Vec<(String, Subscriber)> {
        self.subscribers.clone()
    }

    // ── History ─────────────────────────────────────────────────────────

    /// Newest first.
    pub fn history(&self) -> Vec<PresenceEvent> {
        self.history.clone()
    }

    pub fn recent(&self, limit: usize) -> Vec<PresenceEvent> {
        self.history.iter().take(limit).cloned().collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::constants::SAVE_DEBOUNCE_MS;
    use crate::atoms::error::EngineError;
    use crate::atoms::types::Personality;
    use crate::engine::random::testing::fixed;
    use crate::engine::store::{DebouncedWriter, StateStore};
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;

    struct Rig {
        events: EventsScheduler,
        entity: EntityEngine,
        evidence: EvidenceStore,
        messages: MessageSystem,
        timers: Timers,
    }

    impl Rig {
        fn world(&mut self) -> (&mut EventsScheduler, EventWorld<'_>) {
            (
                &mut self.events,
                EventWorld {
                    entity: &mut self.entity,
                    evidence: &mut self.evidence,
                    messages: &mut self.messages,
                    environment: EnvironmentMode::Home,
                },
            )
        }
    }

    fn rig(roll: f64) -> Rig {
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let timers = Timers::new();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let writer = Arc::new(DebouncedWriter::new(
            store.clone(),
            timers.clone(),
            clock.clone(),
            Duration::milliseconds(SAVE_DEBOUNCE_MS),
        ));
        Rig {
            events: EventsScheduler::new(clock.clone(), timers.clone(), fixed(roll)),
            entity: EntityEngine::new(
                clock.clone(),
                timers.clone(),
                writer,
                fixed(0.5),
                Personality::default(),
            ),
            evidence: EvidenceStore::new(store, clock.clone()),
            messages: MessageSystem::new(clock, fixed(0.0)),
            timers,
        }
    }

    #[test]
    fn test_event_kind_bands() {
        assert_eq!(select_event_kind(0.8, 0.1), EventKind::EvidenceGeneration);
        assert_eq!(select_event_kind(0.8, 0.5), EventKind::IntensityChange);
        assert_eq!(select_event_kind(0.8, 0.7), EventKind::MoodShift);
        assert_eq!(select_event_kind(0.8, 0.9), EventKind::MessageRefresh);
        assert_eq!(select_event_kind(0.5, 0.6), EventKind::MessageRefresh);
        assert_eq!(select_event_kind(0.5, 0.8), EventKind::MoodShift);
        assert_eq!(select_event_kind(0.2, 0.1), EventKind::EvidenceGeneration);
        assert_eq!(select_event_kind(0.2, 0.2), EventKind::IntensityChange);
        assert_eq!(select_event_kind(0.2, 0.9), EventKind::MoodShift);
    }

    #[test]
    fn test_evidence_kind_bands() {
        assert_eq!(select_evidence_kind(0.9, 0.5), EvidenceKind::Anomaly);
        assert_eq!(select_evidence_kind(0.9, 0.8), EvidenceKind::Message);
        assert_eq!(select_evidence_kind(0.5, 0.5), EvidenceKind::Message);
        assert_eq!(select_evidence_kind(0.5, 0.7), EvidenceKind::Anomaly);
        assert_eq!(select_evidence_kind(0.2, 0.3), EvidenceKind::Anomaly);
        assert_eq!(select_evidence_kind(0.2, 0.1), EvidenceKind::Capture);
    }

    #[test]
    fn test_evidence_generation_records_metadata() {
        // Roll 0.1 at 0.8 intensity: evidence event, gate 0.1 <= 0.64 passes,
        // capture kind.
        let mut rig = rig(0.1);
        rig.entity.force_intensity(0.8);
        let (events, world) = rig.world();
        let event = events.tick(world);
        assert_eq!(event.kind, EventKind::EvidenceGeneration);
        let id = event.evidence_id().unwrap().to_string();

        let entry = rig.evidence.by_id(&id).unwrap();
        assert_eq!(entry.kind, EvidenceKind::Capture);
        let meta = entry.metadata.unwrap();
        assert_eq!(meta.mood, Some(Mood::Agitated));
        assert_eq!(meta.environment, Some(EnvironmentMode::Home));
        assert_eq!(meta.intensity, Some(0.8));
    }

    #[test]
    fn test_evidence_gate_can_skip() {
        // Roll 0.1 at 0.1 intensity: evidence event, but 0.1 > 0.08 skips.
        let mut rig = rig(0.1);
        rig.entity.force_intensity(0.1);
        let (events, world) = rig.world();
        let event = events.tick(world);
        assert_eq!(event.kind, EventKind::EvidenceGeneration);
        assert!(event.data.is_none());
        assert_eq!(rig.evidence.count(), 0);
    }

    #[test]
    fn test_intensity_change_applies_bounded_delta() {
        let mut rig = rig(0.2);
        let (events, world) = rig.world();
        let event = events.tick(world);
        assert_eq!(event.kind, EventKind::IntensityChange);
        match event.data.unwrap() {
            EventData::IntensityChange {
                previous_intensity,
                new_intensity,
                delta,
            } => {
                assert!((delta - (0.2 - 0.5) * 0.15).abs() < 1e-9);
                assert!((new_intensity - (previous_intensity + delta)).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_history_capped_newest_first() {
        let mut rig = rig(0.9);
        for _ in 0..60 {
            let (events, world) = rig.world();
            events.tick(world);
        }
        assert_eq!(rig.events.history().len(), 50);
        assert_eq!(rig.events.recent(5).len(), 5);
        assert!(rig.events.history()[0].timestamp >= rig.events.history()[49].timestamp);
    }

    #[test]
    fn test_timer_lifecycle() {
        let mut rig = rig(0.9);
        rig.events.start();
        assert!(rig.timers.is_scheduled(TimerKey::EventsTick));
        rig.events.stop();
        assert!(!rig.timers.is_scheduled(TimerKey::EventsTick));
        let (events, world) = rig.world();
        assert!(events.on_timer(world).is_none());
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let mut rig = rig(0.9);
        let seen = Arc::new(Mutex::new(Vec::new()));

        rig.events.on(
            "broken",
            Arc::new(|_: &PresenceEvent| -> EngineResult<()> { Err(EngineError::Other("boom".into())) }),
        );
        rig.events.on(
            "panics",
            Arc::new(|_: &PresenceEvent| -> EngineResult<()> { panic!("subscriber bug") }),
        );
        let sink = seen.clone();
        rig.events.on(
            "recorder",
            Arc::new(move |e: &PresenceEvent| -> EngineResult<()> {
                sink.lock().push(e.kind);
                Ok(())
            }),
        );

        let (events, world) = rig.world();
        let event = events.tick(world);
        notify_subscribers(&rig.events.subscribers(), &event);
        assert_eq!(seen.lock().as_slice(), &[event.kind]);

        assert!(rig.events.off("broken"));
        assert!(!rig.events.off("broken"));
        rig.events.cleanup();
        assert!(rig.events.subscribers().is_empty());
        assert!(rig.events.history().is_empty());
    }
}
