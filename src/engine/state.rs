// LINGR Engine: Presence
// The application context. Constructed once by the host, it owns every
// engine, the timer queue, the state store and the platform collaborators,
// and is the only thing that dispatches timers.
//
// Locking: engines sit behind parking_lot mutexes. An event tick takes
// entity -> evidence -> messages -> events in that order; every other path
// holds at most one engine lock, or summon -> entity. No guard is ever held
// across an await.
//
// Episode triggers are processed from a queue. A step's action can produce
// follow-up triggers (`notification_sent`, `evidence_added`) which are
// queued behind it, up to a fixed chain length per external trigger.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::atoms::constants::{
    EPISODE_NOTIFICATION_DELAY_SECS, EPISODE_TRIGGER_CHAIN_LIMIT, SAVE_DEBOUNCE_MS,
};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{ActionExecutor, LocationProvider, NotificationTransport};
use crate::atoms::types::{
    ActionRequest, Coordinates, EnvironmentMode, EpisodeAction, EpisodeTrigger, EvidenceEntry,
    EvidenceKind, EvidenceMetadata, Mood, NotificationPayload, PermissionStatus, Personality,
    PersonalityUpdate, StoreKey, SummonExchange, SummonResponse,
};
use crate::engine::ambient::{AmbientPhase, AmbientScheduler, AmbientSettings};
use crate::engine::apparitions::{ApparitionEvent, ApparitionSystem};
use crate::engine::clock::Clock;
use crate::engine::config::{ControlSettings, PresenceConfig};
use crate::engine::entity::{EntityEngine, EntityState};
use crate::engine::environment::{EnvironmentEngine, EnvironmentState};
use crate::engine::episodes::{
    ActiveEpisode, CompletedEpisode, Episode, EpisodeEngine, EpisodeProgressState, EpisodeStep,
    StepContext, TriggerMatch,
};
use crate::engine::events::{notify_subscribers, EventWorld, EventsScheduler, PresenceEvent, Subscriber};
use crate::engine::evidence::EvidenceStore;
use crate::engine::messages::MessageSystem;
use crate::engine::random::{rng_for, stream};
use crate::engine::store::{DebouncedWriter, StateStore};
use crate::engine::summon::SummonEngine;
use crate::engine::timers::{TimerKey, Timers};

/// Platform implementations handed in by the host.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn NotificationTransport>,
    pub location: Arc<dyn LocationProvider>,
    pub executor: Arc<dyn ActionExecutor>,
}

/// Persisted under `app-metadata` every time the app comes to the front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub last_opened_at: DateTime<Utc>,
    pub last_evidence_count: usize,
    pub last_mood: Mood,
}

/// Point-in-time snapshot for the host UI.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceStatus {
    pub now: DateTime<Utc>,
    pub mood: Mood,
    pub intensity: f64,
    pub in_cooldown: bool,
    pub personality: Personality,
    pub environment: EnvironmentMode,
    pub evidence_count: usize,
    pub active_episode: Option<ActiveEpisode>,
    pub completed_episodes: Vec<String>,
    pub daily_notifications: u32,
    pub daily_cap: u32,
    pub ambient_phase: AmbientPhase,
    pub settings: ControlSettings,
    pub next_timer: Option<DateTime<Utc>>,
}

fn ambient_settings(settings: &ControlSettings) -> AmbientSettings {
    AmbientSettings {
        enabled: settings.ambient_effective(),
        frequency: settings.frequency,
        quiet_hours: settings.quiet_hours,
    }
}

fn data_str<'a>(data: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(serde_json::Value::as_str)
}

pub struct Presence {
    config: PresenceConfig,
    clock: Clock,
    timers: Timers,
    store: Arc<StateStore>,
    writer: Arc<DebouncedWriter>,

    entity: Arc<Mutex<EntityEngine>>,
    messages: Arc<Mutex<MessageSystem>>,
    environment: Arc<Mutex<EnvironmentEngine>>,
    evidence: Mutex<EvidenceStore>,
    events: Mutex<EventsScheduler>,
    apparitions: Mutex<ApparitionSystem>,
    episodes: Mutex<EpisodeEngine>,
    summon: Mutex<SummonEngine>,
    ambient: AmbientScheduler,

    settings: Mutex<ControlSettings>,
    collaborators: Collaborators,
    initialized: Mutex<bool>,
}

impl Presence {
    /// Build every engine. Nothing is loaded or started until `initialize`.
    pub fn new(
        config: PresenceConfig,
        clock: Clock,
        store: Arc<StateStore>,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        let tz: Tz = config.tz()?;
        let seed = config.seed;
        let timers = Timers::new();
        let writer = Arc::new(DebouncedWriter::new(
            store.clone(),
            timers.clone(),
            clock.clone(),
            Duration::milliseconds(SAVE_DEBOUNCE_MS),
        ));

        let entity = Arc::new(Mutex::new(EntityEngine::new(
            clock.clone(),
            timers.clone(),
            writer.clone(),
            rng_for(seed, stream::ENTITY),
            config.personality,
        )));
        let messages = Arc::new(Mutex::new(MessageSystem::new(
            clock.clone(),
            rng_for(seed, stream::MESSAGES),
        )));
        let environment = Arc::new(Mutex::new(EnvironmentEngine::new(
            store.clone(),
            clock.clone(),
            timers.clone(),
        )));
        let ambient = AmbientScheduler::new(
            collaborators.transport.clone(),
            store.clone(),
            entity.clone(),
            messages.clone(),
            environment.clone(),
            clock.clone(),
            tz,
            rng_for(seed, stream::AMBIENT),
        );

        Ok(Self {
            evidence: Mutex::new(EvidenceStore::new(store.clone(), clock.clone())),
            events: Mutex::new(EventsScheduler::new(
                clock.clone(),
                timers.clone(),
                rng_for(seed, stream::EVENTS),
            )),
            apparitions: Mutex::new(ApparitionSystem::new(
                clock.clone(),
                timers.clone(),
                rng_for(seed, stream::APPARITIONS),
            )),
            episodes: Mutex::new(EpisodeEngine::new(store.clone(), clock.clone(), timers.clone())),
            summon: Mutex::new(SummonEngine::new(
                store.clone(),
                clock.clone(),
                rng_for(seed, stream::SUMMON),
            )),
            entity,
            messages,
            environment,
            ambient,
            settings: Mutex::new(ControlSettings::default()),
            config,
            clock,
            timers,
            store,
            writer,
            collaborators,
            initialized: Mutex::new(false),
        })
    }

    /// Open the database named in `config` and build on top of it.
    pub fn open(config: PresenceConfig, clock: Clock, collaborators: Collaborators) -> EngineResult<Self> {
        let store = Arc::new(StateStore::open(&config.db_path)?);
        Self::new(config, clock, store, collaborators)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Hydrate every engine, start timers per the saved settings and bring
    /// today's notification budget up to date. Later calls are no-ops.
    pub async fn initialize(&self) {
        {
            let mut initialized = self.initialized.lock();
            if *initialized {
                return;
            }
            *initialized = true;
        }

        let settings = self
            .store
            .load::<ControlSettings>(StoreKey::ControlSettings)
            .unwrap_or_default();
        *self.settings.lock() = settings.clone();

        self.entity.lock().initialize();
        self.evidence.lock().initialize();
        self.episodes.lock().initialize();
        self.summon.lock().initialize();

        let wants_location = {
            let mut environment = self.environment.lock();
            environment.initialize();
            if environment.is_location_awareness_on() != settings.location_awareness_enabled {
                environment.set_location_awareness_enabled(settings.location_awareness_enabled);
            }
            if !settings.presence_active {
                environment.stop_tracking();
            }
            settings.presence_active && environment.wants_location()
        };

        if settings.presence_active {
            self.start_timers();
        }
        if wants_location {
            self.poll_location().await;
        }

        self.ambient.initialize(ambient_settings(&settings)).await;
        info!(
            "[presence] Initialized ({}, {:.2}, {} evidence)",
            self.mood(),
            self.intensity(),
            self.evidence_count()
        );
    }

    fn start_timers(&self) {
        self.entity.lock().start();
        self.events.lock().start();
        self.apparitions.lock().start();
        self.environment.lock().resume_tracking();
    }

    fn pause_timers(&self) {
        self.entity.lock().stop();
        self.events.lock().stop();
        self.apparitions.lock().stop();
        self.environment.lock().stop_tracking();
    }

    /// App came to the front.
    pub async fn on_foreground(&self) {
        let metadata = AppMetadata {
            last_opened_at: self.clock.now(),
            last_evidence_count: self.evidence_count(),
            last_mood: self.mood(),
        };
        self.store.save(StoreKey::AppMetadata, &metadata);

        self.ambient.check_and_reschedule_if_new_day().await;
        self.fire_trigger(EpisodeTrigger::OpenApp).await;
    }

    /// Stop every timer and write anything still debounced. Scheduled
    /// ambient notifications stay with the transport.
    pub fn shutdown(&self) {
        self.pause_timers();
        self.episodes.lock().stop();
        self.writer.flush_all();
        self.timers.cancel_all();
        info!("[presence] Shut down");
    }

    /// Wipe all persisted state and return every engine to its defaults.
    pub async fn reset_all(&self) {
        self.pause_timers();
        self.ambient.reset().await;

        self.entity.lock().reset(self.config.personality);
        self.evidence.lock().clear();
        self.episodes.lock().reset();
        self.summon.lock().clear_exchanges();
        self.messages.lock().reset();
        self.environment.lock().reset();
        self.events.lock().clear_history();
        self.timers.cancel_all();
        self.store.clear_all();

        let settings = ControlSettings::default();
        *self.settings.lock() = settings.clone();
        if settings.presence_active {
            self.start_timers();
        }
        self.ambient.update_settings(ambient_settings(&settings)).await;
        info!("[presence] Reset all state");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Time
    // ═══════════════════════════════════════════════════════════════════

    /// Step a manual clock forward by `by`, firing each timer at its due
    /// time along the way. Returns how many timers fired.
    pub async fn advance(&self, by: Duration) -> usize {
        if !self.clock.is_manual() {
            warn!("[presence] advance() needs a manual clock");
            return 0;
        }
        let target = self.clock.now() + by;
        let mut fired = 0;
        while let Some((due, key)) = self.timers.pop_due(target) {
            self.clock.set(due);
            self.dispatch(key).await;
            fired += 1;
        }
        self.clock.set(target);
        fired
    }

    /// Fire every timer due at the clock's current time.
    pub async fn run_due(&self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some((_, key)) = self.timers.pop_due(now) {
            self.dispatch(key).await;
            fired += 1;
        }
        fired
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    async fn dispatch(&self, key: TimerKey) {
        match key {
            TimerKey::MoodProgression => {
                self.entity.lock().on_mood_timer();
            }
            TimerKey::IntensityFluctuation => {
                self.entity.lock().on_fluctuation_timer();
            }
            TimerKey::EventsTick => self.on_events_tick().await,
            TimerKey::ApparitionCheck => {
                let context = self.step_context();
                let spawned = self.apparitions.lock().on_timer(
                    context.mood,
                    context.intensity,
                    context.environment,
                );
                if let Some(apparition) = spawned {
                    self.forward_apparition(&apparition);
                }
            }
            TimerKey::EnvironmentPoll => {
                let fetch = self.environment.lock().on_poll_timer();
                if fetch {
                    self.poll_location().await;
                }
            }
            TimerKey::EpisodeStepDelay => {
                let completed = self.episodes.lock().on_step_timer();
                if let Some(done) = completed {
                    self.on_episode_completed(&done);
                }
                self.fire_trigger(EpisodeTrigger::Timer).await;
            }
            TimerKey::Flush(store_key) => {
                self.writer.flush(store_key);
            }
        }
    }

    async fn on_events_tick(&self) {
        let environment = self.environment_mode();
        let (event, subscribers) = {
            let mut entity = self.entity.lock();
            let mut evidence = self.evidence.lock();
            let mut messages = self.messages.lock();
            let mut events = self.events.lock();
            let event = events.on_timer(EventWorld {
                entity: &mut *entity,
                evidence: &mut *evidence,
                messages: &mut *messages,
                environment,
            });
            (event, events.subscribers())
        };

        let Some(event) = event else {
            return;
        };
        notify_subscribers(&subscribers, &event);
        if event.evidence_id().is_some() {
            self.fire_trigger(EpisodeTrigger::EvidenceAdded).await;
        }
    }

    async fn poll_location(&self) {
        match self.collaborators.location.current_coordinates().await {
            Ok(Some(coordinates)) => {
                self.environment.lock().apply_location(coordinates);
            }
            Ok(None) => debug!("[presence] No location fix available"),
            Err(e) => warn!("[presence] Location fetch failed: {}", e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Episodes
    // ═══════════════════════════════════════════════════════════════════

    fn step_context(&self) -> StepContext {
        let (mood, intensity) = {
            let entity = self.entity.lock();
            (entity.mood(), entity.intensity())
        };
        StepContext {
            mood,
            intensity,
            environment: self.environment_mode(),
        }
    }

    /// Feed a named trigger to the episode runner, along with any
    /// follow-up triggers the executed steps produce.
    pub async fn fire_trigger(&self, trigger: EpisodeTrigger) {
        let mut queue = VecDeque::from([trigger]);
        let mut processed = 0;
        while let Some(trigger) = queue.pop_front() {
            if processed == EPISODE_TRIGGER_CHAIN_LIMIT {
                warn!(
                    "[episodes] Trigger chain limit reached, dropping {} queued trigger(s)",
                    queue.len() + 1
                );
                break;
            }
            processed += 1;

            let context = self.step_context();
            let outcome = self.episodes.lock().evaluate_trigger(trigger, &context);
            match outcome {
                TriggerMatch::Run(step) => {
                    let follow_ups = self.run_step_action(&step, &context).await;
                    let completed = self.episodes.lock().finish_step(&step);
                    if let Some(done) = completed {
                        self.on_episode_completed(&done);
                    }
                    queue.extend(follow_ups);
                }
                TriggerMatch::Completed(done) => self.on_episode_completed(&done),
                TriggerMatch::Ignored | TriggerMatch::Blocked => {}
            }
        }
    }

    /// Perform a step's action and forward it to the executor. Returns the
    /// triggers the action produced.
    async fn run_step_action(&self, step: &EpisodeStep, context: &StepContext) -> Vec<EpisodeTrigger> {
        let mut follow_ups = Vec::new();
        let mut forwarded = step.data.clone();

        match step.action {
            EpisodeAction::ShowMessage | EpisodeAction::Toast => {}
            EpisodeAction::Notification => {
                match (data_str(&step.data, "title"), data_str(&step.data, "body")) {
                    (Some(title), Some(body)) => {
                        let payload = NotificationPayload {
                            title: title.to_string(),
                            body: body.to_string(),
                            tag: Some("episode".into()),
                        };
                        let at = self.clock.now() + Duration::seconds(EPISODE_NOTIFICATION_DELAY_SECS);
                        // `notification_sent` fires once the transport accepts
                        // the notification; delivery is never reported back.
                        match self.collaborators.transport.schedule_at(at, &payload).await {
                            Ok(id) => {
                                debug!("[episodes] Notification {} scheduled for {}", id, step.id);
                                follow_ups.push(EpisodeTrigger::NotificationSent);
                            }
                            Err(e) => warn!("[episodes] Notification for {} failed: {}", step.id, e),
                        }
                    }
                    _ => warn!("[episodes] Step {} has no notification title/body", step.id),
                }
            }
            EpisodeAction::AutoAddEvidence => {
                let kind = data_str(&step.data, "type").and_then(|t| t.parse::<EvidenceKind>().ok());
                match (kind, data_str(&step.data, "description")) {
                    (Some(kind), Some(description)) => {
                        let metadata = EvidenceMetadata {
                            intensity: Some(context.intensity),
                            mood: Some(context.mood),
                            environment: Some(context.environment),
                            source: Some("episode".into()),
                            ..Default::default()
                        };
                        self.evidence.lock().add(kind, description, Some(metadata));
                        follow_ups.push(EpisodeTrigger::EvidenceAdded);
                    }
                    _ => warn!("[episodes] Step {} has no evidence type/description", step.id),
                }
            }
            EpisodeAction::IntensitySpike => {
                match step.data.get("amount").and_then(serde_json::Value::as_f64) {
                    Some(amount) => {
                        self.entity.lock().stimulate(amount);
                    }
                    None => warn!("[episodes] Step {} has no spike amount", step.id),
                }
            }
            EpisodeAction::SpawnApparition => {
                let spawned = self.apparitions.lock().force(
                    context.mood,
                    context.intensity,
                    context.environment,
                );
                if let Some(apparition) = spawned {
                    forwarded = serde_json::to_value(&apparition).unwrap_or(forwarded);
                }
            }
        }

        self.collaborators.executor.execute(&ActionRequest {
            action: step.action,
            data: forwarded,
        });
        follow_ups
    }

    fn on_episode_completed(&self, done: &CompletedEpisode) {
        if !done.unlock_next {
            return;
        }
        let intensity = self.intensity();
        let evidence_count = self.evidence_count();
        let unlocked = self.episodes.lock().unlock_eligible(intensity, evidence_count);
        info!(
            "[presence] {} complete, unlocked: {}",
            done.episode_id,
            if unlocked.is_empty() { "none".to_string() } else { unlocked.join(", ") }
        );
    }

    pub fn start_episode(&self, episode_id: &str) -> bool {
        self.episodes.lock().start_episode(episode_id)
    }

    pub fn active_episode(&self) -> Option<ActiveEpisode> {
        self.episodes.lock().active_episode()
    }

    pub fn episodes(&self) -> Vec<Episode> {
        self.episodes.lock().episodes()
    }

    pub fn episode_state(&self, episode_id: &str) -> EpisodeProgressState {
        self.episodes.lock().episode_state(episode_id)
    }

    /// Whether `episode_id` could be unlocked right now.
    pub fn can_unlock_episode(&self, episode_id: &str) -> bool {
        let intensity = self.intensity();
        let evidence_count = self.evidence_count();
        let episodes = self.episodes.lock();
        let completed = episodes.completed_episodes();
        episodes.can_unlock_episode(episode_id, intensity, evidence_count, &completed)
    }

    pub fn unlock_eligible(&self) -> Vec<String> {
        let intensity = self.intensity();
        let evidence_count = self.evidence_count();
        self.episodes.lock().unlock_eligible(intensity, evidence_count)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Entity, evidence, summon
    // ═══════════════════════════════════════════════════════════════════

    pub fn stimulate(&self, amount: f64) -> bool {
        self.entity.lock().stimulate(amount)
    }

    pub fn set_personality(&self, update: &PersonalityUpdate) {
        self.entity.lock().set_personality(update);
    }

    /// A camera scan happened.
    pub async fn record_scan(&self) {
        self.entity.lock().record_scan();
        self.fire_trigger(EpisodeTrigger::Scan).await;
    }

    pub fn record_detection(&self) {
        self.entity.lock().record_detection();
    }

    pub async fn add_evidence(
        &self,
        kind: EvidenceKind,
        description: impl Into<String>,
        metadata: Option<EvidenceMetadata>,
    ) -> EvidenceEntry {
        let entry = self.evidence.lock().add(kind, description, metadata);
        self.fire_trigger(EpisodeTrigger::EvidenceAdded).await;
        entry
    }

    pub fn remove_evidence(&self, id: &str) -> bool {
        self.evidence.lock().remove(id)
    }

    pub fn clear_evidence(&self) {
        self.evidence.lock().clear();
    }

    /// Newest first.
    pub fn evidence(&self) -> Vec<EvidenceEntry> {
        self.evidence.lock().all()
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence.lock().count()
    }

    /// Reply to the user. An evidence-worthy exchange is recorded as
    /// `message` evidence. Rate-limited replies never reach the episodes.
    pub async fn process_message(&self, message: &str) -> SummonResponse {
        let response = {
            let mut summon = self.summon.lock();
            let mut entity = self.entity.lock();
            summon.process_message(message, &mut entity)
        };

        if response.should_create_evidence {
            let mut extra = serde_json::Map::new();
            extra.insert("intent".into(), json!(response.intent.as_str()));
            self.evidence.lock().add(
                EvidenceKind::Message,
                response.response_text.clone(),
                Some(EvidenceMetadata {
                    source: Some("summoning".into()),
                    extra,
                    ..Default::default()
                }),
            );
            self.fire_trigger(EpisodeTrigger::EvidenceAdded).await;
        }
        if !response.rate_limited {
            self.fire_trigger(EpisodeTrigger::SummonMessage).await;
        }
        response
    }

    /// Oldest first.
    pub fn exchanges(&self) -> Vec<SummonExchange> {
        self.summon.lock().exchanges()
    }

    pub fn clear_exchanges(&self) {
        self.summon.lock().clear_exchanges();
    }

    /// A line for the current mood and environment.
    pub fn message(&self) -> String {
        let mood = self.mood();
        let environment = self.environment_mode();
        self.messages.lock().get_message(mood, Some(environment)).to_string()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Events and apparitions
    // ═══════════════════════════════════════════════════════════════════

    pub fn subscribe(&self, name: impl Into<String>, callback: Subscriber) {
        self.events.lock().on(name, callback);
    }

    pub fn unsubscribe(&self, name: &str) -> bool {
        self.events.lock().off(name)
    }

    /// Newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<PresenceEvent> {
        self.events.lock().recent(limit)
    }

    pub fn recent_apparitions(&self, limit: usize) -> Vec<ApparitionEvent> {
        self.apparitions.lock().recent(limit)
    }

    pub fn force_apparition(&self) -> Option<ApparitionEvent> {
        let context = self.step_context();
        let spawned = self
            .apparitions
            .lock()
            .force(context.mood, context.intensity, context.environment);
        if let Some(apparition) = &spawned {
            self.forward_apparition(apparition);
        }
        spawned
    }

    fn forward_apparition(&self, apparition: &ApparitionEvent) {
        self.collaborators.executor.execute(&ActionRequest {
            action: EpisodeAction::SpawnApparition,
            data: serde_json::to_value(apparition).unwrap_or_default(),
        });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Settings, environment, notifications
    // ═══════════════════════════════════════════════════════════════════

    pub fn settings(&self) -> ControlSettings {
        self.settings.lock().clone()
    }

    /// Persist `settings` and propagate the changes to the engines.
    pub async fn update_settings(&self, settings: ControlSettings) {
        let previous = std::mem::replace(&mut *self.settings.lock(), settings.clone());
        self.store.save(StoreKey::ControlSettings, &settings);

        if previous.presence_active != settings.presence_active {
            if settings.presence_active {
                info!("[presence] Resumed");
                self.start_timers();
            } else {
                info!("[presence] Paused");
                self.pause_timers();
            }
        }

        if previous.location_awareness_enabled != settings.location_awareness_enabled {
            let poll = {
                let mut environment = self.environment.lock();
                let poll = environment.set_location_awareness_enabled(settings.location_awareness_enabled);
                if !settings.presence_active {
                    environment.stop_tracking();
                }
                poll
            };
            if poll && settings.presence_active {
                self.poll_location().await;
            }
        }

        self.ambient.update_settings(ambient_settings(&settings)).await;
    }

    pub async fn set_home_base(&self, coordinates: Coordinates) {
        let poll = self.environment.lock().set_home_base(coordinates);
        let active = self.settings.lock().presence_active;
        if poll && active {
            self.poll_location().await;
        }
    }

    pub fn environment_mode(&self) -> EnvironmentMode {
        self.environment.lock().mode()
    }

    pub fn environment_state(&self) -> EnvironmentState {
        self.environment.lock().state()
    }

    pub async fn request_location_permission(&self) -> PermissionStatus {
        self.collaborators.location.request_permission().await
    }

    pub async fn request_notification_permission(&self) -> bool {
        self.collaborators.transport.request_permission().await
    }

    pub async fn send_test_notification(&self) -> bool {
        self.ambient.send_test_notification().await
    }

    pub fn daily_notification_count(&self) -> u32 {
        self.ambient.daily_count()
    }

    pub fn daily_notification_cap(&self) -> u32 {
        self.ambient.daily_cap()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════

    pub fn mood(&self) -> Mood {
        self.entity.lock().mood()
    }

    pub fn intensity(&self) -> f64 {
        self.entity.lock().intensity()
    }

    pub fn entity_state(&self) -> EntityState {
        self.entity.lock().state()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn status(&self) -> PresenceStatus {
        let entity = self.entity_state();
        let in_cooldown = self.entity.lock().is_in_cooldown();
        let (active_episode, completed_episodes) = {
            let episodes = self.episodes.lock();
            (episodes.active_episode(), episodes.completed_episodes())
        };
        PresenceStatus {
            now: self.clock.now(),
            mood: entity.mood,
            intensity: entity.intensity,
            in_cooldown,
            personality: entity.personality,
            environment: self.environment_mode(),
            evidence_count: self.evidence_count(),
            active_episode,
            completed_episodes,
            daily_notifications: self.ambient.daily_count(),
            daily_cap: self.ambient.daily_cap(),
            ambient_phase: self.ambient.phase(),
            settings: self.settings(),
            next_timer: self.next_due(),
        }
    }
}
