// LINGR Engine: Episodes
// Scripted narrative runner. At most one episode is active; its current
// step waits for a matching trigger and a passing condition. The engine
// decides which step runs; `Presence` performs the step's action and then
// calls `finish_step`, which either advances now or arms the step-delay
// timer. The delay deadline is saved with the active episode and re-armed
// on restart. Running off the end of the step list completes the episode.
//
// Module layout:
//   catalog  episode templates, unlock conditions, scripted steps
//   mod      EpisodeEngine (active pointer, completed/unlocked sets, runner)

pub mod catalog;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::atoms::types::{EnvironmentMode, EpisodeTrigger, Mood, StoreKey};
use crate::engine::clock::Clock;
use crate::engine::store::StateStore;
use crate::engine::timers::{TimerKey, Timers};

pub use catalog::{
    default_catalog, Episode, EpisodeRarity, EpisodeStatus, EpisodeStep, StepCondition,
    UnlockConditions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEpisode {
    pub episode_id: String,
    pub current_step_index: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub step_completed_at: Option<DateTime<Utc>>,
    /// Set while the executed current step waits out its delay.
    #[serde(default)]
    pub step_delay_until: Option<DateTime<Utc>>,
}

/// Persisted under `episodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeProgress {
    pub active_episode: Option<ActiveEpisode>,
    pub completed_episode_ids: Vec<String>,
    #[serde(default)]
    pub unlocked_episode_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeProgressState {
    NotStarted,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEpisode {
    pub episode_id: String,
    pub unlock_next: bool,
}

/// Live values a step condition is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub mood: Mood,
    pub intensity: f64,
    pub environment: EnvironmentMode,
}

/// What a trigger did to the active episode.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerMatch {
    /// No active episode, a step delay is pending, or the trigger is for
    /// another step.
    Ignored,
    /// Right trigger, condition failed. The step stays pending.
    Blocked,
    /// Run this step's action, then call `finish_step`.
    Run(EpisodeStep),
    /// The active episode had no step left and is now complete.
    Completed(CompletedEpisode),
}

pub fn condition_passes(condition: Option<&StepCondition>, context: &StepContext) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    if let Some(moods) = &condition.mood {
        if !moods.contains(&context.mood) {
            return false;
        }
    }
    if let Some(floor) = condition.intensity_above {
        if context.intensity <= floor {
            return false;
        }
    }
    if let Some(environments) = &condition.environment {
        if !environments.contains(&context.environment) {
            return false;
        }
    }
    true
}

pub struct EpisodeEngine {
    catalog: Vec<Episode>,
    active: Option<ActiveEpisode>,
    completed: BTreeSet<String>,
    unlocked: BTreeSet<String>,
    store: Arc<StateStore>,
    clock: Clock,
    timers: Timers,
    initialized: bool,
}

impl EpisodeEngine {
    pub fn new(store: Arc<StateStore>, clock: Clock, timers: Timers) -> Self {
        Self::with_catalog(default_catalog(), store, clock, timers)
    }

    pub fn with_catalog(
        catalog: Vec<Episode>,
        store: Arc<StateStore>,
        clock: Clock,
        timers: Timers,
    ) -> Self {
        Self {
            catalog,
            active: None,
            completed: BTreeSet::new(),
            unlocked: BTreeSet::new(),
            store,
            clock,
            timers,
            initialized: false,
        }
    }

    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        if let Some(saved) = self.store.load::<EpisodeProgress>(StoreKey::Episodes) {
            self.active = saved.active_episode;
            self.completed = saved.completed_episode_ids.into_iter().collect();
            self.unlocked = saved.unlocked_episode_ids.into_iter().collect();
            info!(
                "[episodes] Restored progress: active {}, {} completed",
                self.active.as_ref().map_or("none", |a| a.episode_id.as_str()),
                self.completed.len()
            );
        }
        if let Some(due) = self.active.as_ref().and_then(|a| a.step_delay_until) {
            debug!("[episodes] Re-arming step delay for {}", due);
            self.timers.schedule(TimerKey::EpisodeStepDelay, due);
        }
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Start `episode_id` at step 0. Refused while another episode is
    /// active or when the id is not in the catalog.
    pub fn start_episode(&mut self, episode_id: &str) -> bool {
        if let Some(active) = &self.active {
            warn!(
                "[episodes] Cannot start {}: {} is already active",
                episode_id, active.episode_id
            );
            return false;
        }
        if self.template(episode_id).is_none() {
            warn!("[episodes] Unknown episode {}", episode_id);
            return false;
        }

        self.active = Some(ActiveEpisode {
            episode_id: episode_id.to_string(),
            current_step_index: 0,
            started_at: self.clock.now(),
            completed_at: None,
            step_completed_at: None,
            step_delay_until: None,
        });
        self.save();
        info!("[episodes] Started {}", episode_id);
        true
    }

    /// Move the active episode to its next step, completing it when that
    /// runs past the last one.
    pub fn advance_step(&mut self) -> Option<CompletedEpisode> {
        let now = self.clock.now();
        let active = self.active.as_mut()?;
        active.current_step_index += 1;
        active.step_completed_at = Some(now);
        active.step_delay_until = None;
        debug!(
            "[episodes] {} advanced to step {}",
            active.episode_id, active.current_step_index
        );

        if self.current_step().is_none() {
            return self.complete_episode();
        }
        self.save();
        None
    }

    pub fn complete_episode(&mut self) -> Option<CompletedEpisode> {
        let mut active = self.active.take()?;
        active.completed_at = Some(self.clock.now());
        self.timers.cancel(TimerKey::EpisodeStepDelay);
        self.completed.insert(active.episode_id.clone());
        self.save();
        info!("[episodes] Completed {}", active.episode_id);
        Some(CompletedEpisode {
            episode_id: active.episode_id,
            unlock_next: true,
        })
    }

    // ── Runner ──────────────────────────────────────────────────────────

    /// Match `trigger` against the active episode's current step.
    pub fn evaluate_trigger(&mut self, trigger: EpisodeTrigger, context: &StepContext) -> TriggerMatch {
        if self.active.is_none() || self.is_waiting() {
            return TriggerMatch::Ignored;
        }
        let Some(step) = self.current_step() else {
            return self
                .complete_episode()
                .map_or(TriggerMatch::Ignored, TriggerMatch::Completed);
        };
        if step.trigger != trigger {
            return TriggerMatch::Ignored;
        }
        if !condition_passes(step.condition.as_ref(), context) {
            debug!("[episodes] Condition not met for {}", step.id);
            return TriggerMatch::Blocked;
        }
        debug!("[episodes] Running {} ({})", step.id, step.action.as_str());
        TriggerMatch::Run(step.clone())
    }

    /// The step's action has been performed: advance now, or arm the delay.
    pub fn finish_step(&mut self, step: &EpisodeStep) -> Option<CompletedEpisode> {
        match step.wait_seconds.filter(|s| *s > 0) {
            Some(seconds) => {
                let due = self.clock.now() + Duration::seconds(seconds as i64);
                let active = self.active.as_mut()?;
                active.step_delay_until = Some(due);
                self.save();
                self.timers.schedule(TimerKey::EpisodeStepDelay, due);
                debug!("[episodes] Waiting {}s after {}", seconds, step.id);
                None
            }
            None => self.advance_step(),
        }
    }

    /// Step delay elapsed. The caller fires a `timer` trigger afterwards.
    pub fn on_step_timer(&mut self) -> Option<CompletedEpisode> {
        if !self.is_waiting() {
            return None;
        }
        if let Some(step) = self.current_step() {
            debug!("[episodes] Delay after {} elapsed", step.id);
        }
        self.advance_step()
    }

    /// Disarm the step-delay timer. A pending delay stays saved and is
    /// re-armed by the next `initialize`.
    pub fn stop(&mut self) {
        self.timers.cancel(TimerKey::EpisodeStepDelay);
    }

    // ── Catalog status and unlocking ────────────────────────────────────

    fn template(&self, episode_id: &str) -> Option<&Episode> {
        self.catalog.iter().find(|e| e.id == episode_id)
    }

    pub fn status(&self, episode_id: &str) -> Option<EpisodeStatus> {
        let template = self.template(episode_id)?;
        Some(if self.completed.contains(episode_id) {
            EpisodeStatus::Completed
        } else if template.status == EpisodeStatus::Available || self.unlocked.contains(episode_id) {
            EpisodeStatus::Available
        } else {
            EpisodeStatus::Locked
        })
    }

    /// The catalog with live statuses.
    pub fn episodes(&self) -> Vec<Episode> {
        self.catalog
            .iter()
            .map(|e| {
                let mut e = e.clone();
                e.status = self.status(&e.id).unwrap_or(e.status);
                e
            })
            .collect()
    }

    pub fn episode(&self, episode_id: &str) -> Option<Episode> {
        self.episodes().into_iter().find(|e| e.id == episode_id)
    }

    /// A locked episode whose unlock conditions all hold.
    pub fn can_unlock_episode(
        &self,
        episode_id: &str,
        intensity: f64,
        evidence_count: usize,
        completed: &[String],
    ) -> bool {
        let Some(template) = self.template(episode_id) else {
            return false;
        };
        if self.status(episode_id) != Some(EpisodeStatus::Locked) {
            return false;
        }
        template
            .unlock_conditions
            .as_ref()
            .map_or(true, |c| c.met(intensity, evidence_count, completed))
    }

    pub fn unlock_episode(&mut self, episode_id: &str) -> bool {
        if self.status(episode_id) != Some(EpisodeStatus::Locked) {
            return false;
        }
        self.unlocked.insert(episode_id.to_string());
        self.save();
        info!("[episodes] Unlocked {}", episode_id);
        true
    }

    /// Unlock every locked episode whose conditions now hold. Returns the
    /// ids unlocked.
    pub fn unlock_eligible(&mut self, intensity: f64, evidence_count: usize) -> Vec<String> {
        let completed = self.completed_episodes();
        let eligible: Vec<String> = self
            .catalog
            .iter()
            .filter(|e| self.can_unlock_episode(&e.id, intensity, evidence_count, &completed))
            .map(|e| e.id.clone())
            .collect();
        for id in &eligible {
            self.unlock_episode(id);
        }
        eligible
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn active_episode(&self) -> Option<ActiveEpisode> {
        self.active.clone()
    }

    pub fn current_step(&self) -> Option<&EpisodeStep> {
        let active = self.active.as_ref()?;
        self.template(&active.episode_id)?
            .steps
            .get(active.current_step_index)
    }

    pub fn current_step_index(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.current_step_index)
    }

    pub fn episode_state(&self, episode_id: &str) -> EpisodeProgressState {
        if self.completed.contains(episode_id) {
            EpisodeProgressState::Completed
        } else if self.active.as_ref().is_some_and(|a| a.episode_id == episode_id) {
            EpisodeProgressState::Active
        } else {
            EpisodeProgressState::NotStarted
        }
    }

    pub fn is_episode_completed(&self, episode_id: &str) -> bool {
        self.completed.contains(episode_id)
    }

    pub fn completed_episodes(&self) -> Vec<String> {
        self.completed.iter().cloned().collect()
    }

    pub fn is_waiting(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.step_delay_until.is_some())
    }

    // ── Persistence ─────────────────────────────────────────────────────

    fn save(&self) {
        self.store.save(
            StoreKey::Episodes,
            &EpisodeProgress {
                active_episode: self.active.clone(),
                completed_episode_ids: self.completed_episodes(),
                unlocked_episode_ids: self.unlocked.iter().cloned().collect(),
            },
        );
    }

    pub fn reset(&mut self) {
        self.timers.cancel(TimerKey::EpisodeStepDelay);
        self.active = None;
        self.completed.clear();
        self.unlocked.clear();
        self.store.remove(StoreKey::Episodes);
        info!("[episodes] Reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::EpisodeAction;
    use chrono::TimeZone;

    struct Rig {
        engine: EpisodeEngine,
        store: Arc<StateStore>,
        clock: Clock,
        timers: Timers,
    }

    fn rig() -> Rig {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let timers = Timers::new();
        Rig {
            engine: EpisodeEngine::new(store.clone(), clock.clone(), timers.clone()),
            store,
            clock,
            timers,
        }
    }

    fn context(mood: Mood, intensity: f64) -> StepContext {
        StepContext {
            mood,
            intensity,
            environment: EnvironmentMode::Unknown,
        }
    }

    #[test]
    fn test_single_active_episode() {
        let mut rig = rig();
        assert!(rig.engine.start_episode("ep_001"));
        assert!(!rig.engine.start_episode("ep_002"));
        assert_eq!(rig.engine.active_episode().unwrap().episode_id, "ep_001");
        assert_eq!(rig.engine.episode_state("ep_001"), EpisodeProgressState::Active);
        assert_eq!(rig.engine.episode_state("ep_002"), EpisodeProgressState::NotStarted);
        assert!(!rig.engine.start_episode("ep_999"));
    }

    #[test]
    fn test_can_unlock_episode() {
        let rig = rig();
        let completed = vec!["ep_001".to_string()];
        assert!(!rig.engine.can_unlock_episode("ep_002", 0.5, 2, &completed));
        assert!(rig.engine.can_unlock_episode("ep_002", 0.5, 3, &completed));
        // Already available, nothing to unlock.
        assert!(!rig.engine.can_unlock_episode("ep_001", 0.5, 3, &completed));
        assert!(!rig.engine.can_unlock_episode("ep_404", 0.9, 99, &completed));
    }

    #[test]
    fn test_condition_checks() {
        let condition = StepCondition {
            mood: Some(vec![Mood::Active]),
            intensity_above: Some(0.5),
            environment: Some(vec![EnvironmentMode::Home]),
        };
        let home_active = StepContext {
            mood: Mood::Active,
            intensity: 0.6,
            environment: EnvironmentMode::Home,
        };
        assert!(condition_passes(Some(&condition), &home_active));
        assert!(condition_passes(None, &home_active));
        assert!(!condition_passes(Some(&condition), &StepContext { intensity: 0.5, ..home_active }));
        assert!(!condition_passes(Some(&condition), &StepContext { mood: Mood::Agitated, ..home_active }));
        assert!(!condition_passes(
            Some(&condition),
            &StepContext { environment: EnvironmentMode::Away, ..home_active }
        ));
    }

    #[test]
    fn test_first_contact_runs_through() {
        let mut rig = rig();
        let ctx = context(Mood::Restless, 0.35);
        rig.engine.start_episode("ep_001");

        assert_eq!(rig.engine.evaluate_trigger(EpisodeTrigger::Scan, &ctx), TriggerMatch::Ignored);

        let TriggerMatch::Run(step) = rig.engine.evaluate_trigger(EpisodeTrigger::OpenApp, &ctx) else {
            panic!("expected the arrival step");
        };
        assert_eq!(step.action, EpisodeAction::ShowMessage);
        assert!(rig.engine.finish_step(&step).is_none());
        assert!(rig.engine.is_waiting());
        assert_eq!(
            rig.timers.due_at(TimerKey::EpisodeStepDelay),
            Some(rig.clock.now() + Duration::seconds(5))
        );
        // Triggers are ignored while the delay runs.
        assert_eq!(rig.engine.evaluate_trigger(EpisodeTrigger::OpenApp, &ctx), TriggerMatch::Ignored);

        assert!(rig.engine.on_step_timer().is_none());
        assert_eq!(rig.engine.current_step_index(), 1);

        for trigger in [
            EpisodeTrigger::Timer,
            EpisodeTrigger::NotificationSent,
            EpisodeTrigger::EvidenceAdded,
        ] {
            let TriggerMatch::Run(step) = rig.engine.evaluate_trigger(trigger, &ctx) else {
                panic!("expected a step for {}", trigger.as_str());
            };
            let done = rig.engine.finish_step(&step);
            if trigger == EpisodeTrigger::EvidenceAdded {
                assert_eq!(
                    done,
                    Some(CompletedEpisode {
                        episode_id: "ep_001".into(),
                        unlock_next: true
                    })
                );
            } else {
                assert!(done.is_none());
            }
        }

        assert!(rig.engine.active_episode().is_none());
        assert!(rig.engine.is_episode_completed("ep_001"));
        assert_eq!(rig.engine.status("ep_001"), Some(EpisodeStatus::Completed));
    }

    #[test]
    fn test_blocked_step_stays_pending() {
        let mut rig = rig();
        rig.engine.start_episode("ep_002");
        assert_eq!(
            rig.engine.evaluate_trigger(EpisodeTrigger::Scan, &context(Mood::Dormant, 0.25)),
            TriggerMatch::Blocked
        );
        assert_eq!(rig.engine.current_step_index(), 0);
        assert!(matches!(
            rig.engine.evaluate_trigger(EpisodeTrigger::Scan, &context(Mood::Restless, 0.4)),
            TriggerMatch::Run(_)
        ));
    }

    #[test]
    fn test_episode_without_steps_completes_on_next_trigger() {
        let mut rig = rig();
        rig.engine.start_episode("ep_003");
        let outcome = rig.engine.evaluate_trigger(EpisodeTrigger::OpenApp, &context(Mood::Active, 0.6));
        assert!(matches!(outcome, TriggerMatch::Completed(c) if c.episode_id == "ep_003"));
        assert!(rig.engine.active_episode().is_none());
    }

    #[test]
    fn test_unlock_eligible_after_completion() {
        let mut rig = rig();
        rig.engine.start_episode("ep_001");
        rig.engine.complete_episode();
        assert!(rig.engine.unlock_eligible(0.4, 2).is_empty());
        assert_eq!(rig.engine.unlock_eligible(0.4, 3), vec!["ep_002".to_string()]);
        assert_eq!(rig.engine.status("ep_002"), Some(EpisodeStatus::Available));
        assert_eq!(rig.engine.status("ep_003"), Some(EpisodeStatus::Locked));
        assert!(!rig.engine.unlock_episode("ep_002"));
    }

    #[test]
    fn test_progress_round_trips() {
        let mut rig = rig();
        rig.engine.start_episode("ep_001");
        rig.engine.complete_episode();
        rig.engine.unlock_eligible(0.4, 5);
        rig.engine.start_episode("ep_002");
        rig.engine.advance_step();

        let saved: EpisodeProgress = rig.store.load(StoreKey::Episodes).unwrap();
        assert_eq!(saved.completed_episode_ids, vec!["ep_001".to_string()]);
        assert_eq!(saved.unlocked_episode_ids, vec!["ep_002".to_string()]);
        assert_eq!(saved.active_episode.as_ref().unwrap().current_step_index, 1);

        let mut restored = EpisodeEngine::new(rig.store.clone(), rig.clock.clone(), rig.timers.clone());
        restored.initialize();
        assert_eq!(restored.active_episode(), rig.engine.active_episode());
        assert_eq!(restored.status("ep_002"), Some(EpisodeStatus::Available));

        restored.reset();
        assert!(rig.store.load::<EpisodeProgress>(StoreKey::Episodes).is_none());
        assert_eq!(restored.episode_state("ep_001"), EpisodeProgressState::NotStarted);
    }

    #[test]
    fn test_pending_delay_survives_restart() {
        let mut rig = rig();
        let ctx = context(Mood::Restless, 0.35);
        rig.engine.start_episode("ep_001");
        let TriggerMatch::Run(step) = rig.engine.evaluate_trigger(EpisodeTrigger::OpenApp, &ctx) else {
            panic!("expected the arrival step");
        };
        rig.engine.finish_step(&step);
        let due = rig.clock.now() + Duration::seconds(5);
        rig.engine.stop();
        assert_eq!(rig.timers.due_at(TimerKey::EpisodeStepDelay), None);

        let mut restored = EpisodeEngine::new(rig.store.clone(), rig.clock.clone(), rig.timers.clone());
        restored.initialize();
        assert!(restored.is_waiting());
        assert_eq!(restored.active_episode().unwrap().step_delay_until, Some(due));
        assert_eq!(rig.timers.due_at(TimerKey::EpisodeStepDelay), Some(due));
        // The arrival step already ran; it must not run again.
        assert_eq!(restored.evaluate_trigger(EpisodeTrigger::OpenApp, &ctx), TriggerMatch::Ignored);

        assert!(restored.on_step_timer().is_none());
        assert!(!restored.is_waiting());
        assert_eq!(restored.current_step_index(), 1);
        let saved: EpisodeProgress = rig.store.load(StoreKey::Episodes).unwrap();
        assert_eq!(saved.active_episode.unwrap().step_delay_until, None);
    }
}
