// LINGR Engine: Ambient Notification Scheduler
// Plans a day's worth of ambient notifications under a frequency cap,
// quiet-hours exclusion and a minimum gap, then hands them to the
// notification transport.
//
// States: disabled -> scheduling -> scheduled -> (day rollover) -> scheduling.
//
// Runs are serialized by an `is_scheduling` guard. A request arriving while
// a run is in flight sets `pending_reschedule` and returns; the in-flight
// run replays exactly one full reschedule when it finishes, however many
// requests were coalesced. Internal state sits behind a parking_lot mutex
// that is never held across an await.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    AMBIENT_DORMANT_FACTOR, AMBIENT_DORMANT_INTENSITY, AMBIENT_DUPLICATE_GUARD_MINUTES,
    AMBIENT_LEAD_MINUTES, AMBIENT_MAX_ATTEMPTS, AMBIENT_MIN_GAP_MINUTES, AMBIENT_TEST_DELAY_SECS,
    AMBIENT_TEST_TITLE, AMBIENT_TITLE,
};
use crate::atoms::traits::NotificationTransport;
use crate::atoms::types::{Frequency, Mood, NotificationPayload, QuietHours, StoreKey};
use crate::engine::clock::Clock;
use crate::engine::entity::EntityEngine;
use crate::engine::environment::EnvironmentEngine;
use crate::engine::messages::MessageSystem;
use crate::engine::random::{self, BoxRng};
use crate::engine::store::StateStore;

/// Persisted under `daily-notification-state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyNotificationState {
    /// Calendar day key, `YYYY-MM-DD` in the configured timezone.
    pub date: String,
    pub count: u32,
    pub scheduled_ids: Vec<String>,
    #[serde(default)]
    pub last_scheduled_at: Option<DateTime<Utc>>,
}

impl DailyNotificationState {
    fn fresh(date: String, last_scheduled_at: Option<DateTime<Utc>>) -> Self {
        Self {
            date,
            count: 0,
            scheduled_ids: Vec::new(),
            last_scheduled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientSettings {
    pub enabled: bool,
    pub frequency: Frequency,
    pub quiet_hours: QuietHours,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: Frequency::Normal,
            quiet_hours: QuietHours::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientPhase {
    Disabled,
    Scheduling,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Schedule,
    Reschedule,
}

// ═══════════════════════════════════════════════════════════════════════════
// Planning (pure)
// ═══════════════════════════════════════════════════════════════════════════

pub fn day_key(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Last instant of `now`'s local day, in UTC.
pub fn end_of_local_day(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let date = now.with_timezone(&tz).date_naive();
    let last = date.and_time(
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    );
    tz.from_local_datetime(&last)
        .latest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}

/// How many notifications to plan out of `remaining`. A quiescent entity
/// (dormant and below 0.2) makes less ambient contact.
pub fn planned_count(remaining: u32, mood: Mood, intensity: f64) -> u32 {
    if remaining > 0 && mood == Mood::Dormant && intensity < AMBIENT_DORMANT_INTENSITY {
        ((remaining as f64 * AMBIENT_DORMANT_FACTOR).floor() as u32).max(1)
    } else {
        remaining
    }
}

/// Draw up to `count` times uniformly from [now + 30min, end of local day].
/// Candidates inside quiet hours or within 30 minutes of an accepted time
/// are redrawn, up to 20 attempts per slot; a slot that never finds a
/// valid time is dropped. Result is sorted ascending.
pub fn plan_times(
    count: u32,
    now: DateTime<Utc>,
    tz: Tz,
    quiet_hours: &QuietHours,
    rng: &mut dyn RngCore,
) -> Vec<DateTime<Utc>> {
    let start = now + Duration::minutes(AMBIENT_LEAD_MINUTES);
    let end = end_of_local_day(now, tz);
    if start >= end {
        return Vec::new();
    }
    let span_ms = (end - start).num_milliseconds() as f64;
    let min_gap = Duration::minutes(AMBIENT_MIN_GAP_MINUTES);

    let mut times: Vec<DateTime<Utc>> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        for _ in 0..AMBIENT_MAX_ATTEMPTS {
            let candidate =
                start + Duration::milliseconds((random::roll(rng) * span_ms) as i64);
            let local = candidate.with_timezone(&tz).time();
            if quiet_hours.contains(local) {
                continue;
            }
            if times
                .iter()
                .any(|t| (candidate - *t).abs() < min_gap)
            {
                continue;
            }
            times.push(candidate);
            break;
        }
    }
    times.sort();
    times
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

struct AmbientInner {
    settings: AmbientSettings,
    daily: Option<DailyNotificationState>,
    is_scheduling: bool,
    pending_reschedule: bool,
    runs: u32,
    rng: BoxRng,
}

pub struct AmbientScheduler {
    transport: Arc<dyn NotificationTransport>,
    store: Arc<StateStore>,
    entity: Arc<Mutex<EntityEngine>>,
    messages: Arc<Mutex<MessageSystem>>,
    environment: Arc<Mutex<EnvironmentEngine>>,
    clock: Clock,
    tz: Tz,
    inner: Mutex<AmbientInner>,
}

impl AmbientScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        store: Arc<StateStore>,
        entity: Arc<Mutex<EntityEngine>>,
        messages: Arc<Mutex<MessageSystem>>,
        environment: Arc<Mutex<EnvironmentEngine>>,
        clock: Clock,
        tz: Tz,
        rng: BoxRng,
    ) -> Self {
        Self {
            transport,
            store,
            entity,
            messages,
            environment,
            clock,
            tz,
            inner: Mutex::new(AmbientInner {
                settings: AmbientSettings::default(),
                daily: None,
                is_scheduling: false,
                pending_reschedule: false,
                runs: 0,
                rng,
            }),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Load today's budget and either schedule what's left of it or make
    /// sure nothing is outstanding.
    pub async fn initialize(&self, settings: AmbientSettings) {
        let enabled = settings.enabled;
        {
            let mut inner = self.inner.lock();
            inner.settings = settings;
            self.refresh_daily(&mut inner);
        }
        info!(
            "[ambient] Initialized ({}, {} today)",
            if enabled { "enabled" } else { "disabled" },
            self.daily_count()
        );
        if enabled {
            self.schedule_notifications().await;
        } else {
            self.cancel_all().await;
        }
    }

    /// Apply new settings. Enabling schedules, disabling cancels, and a
    /// frequency or quiet-hours change while enabled reschedules.
    pub async fn update_settings(&self, settings: AmbientSettings) {
        let (was_enabled, changed) = {
            let mut inner = self.inner.lock();
            let was_enabled = inner.settings.enabled;
            let changed = inner.settings != settings;
            inner.settings = settings.clone();
            (was_enabled, changed)
        };

        match (was_enabled, settings.enabled) {
            (false, true) => self.schedule_notifications().await,
            (true, false) => self.cancel_all().await,
            (true, true) if changed => self.reschedule().await,
            _ => debug!("[ambient] Settings unchanged"),
        }
    }

    /// Foreground hook. On a new calendar day the budget resets and, if
    /// enabled, the day is scheduled, unless a run happened within the last
    /// five minutes. Returns whether a rollover happened.
    pub async fn check_and_reschedule_if_new_day(&self) -> bool {
        let (rolled, enabled, recently) = {
            let mut inner = self.inner.lock();
            let rolled = self.refresh_daily(&mut inner);
            let now = self.clock.now();
            let recently = inner
                .daily
                .as_ref()
                .and_then(|d| d.last_scheduled_at)
                .is_some_and(|at| now - at < Duration::minutes(AMBIENT_DUPLICATE_GUARD_MINUTES));
            (rolled, inner.settings.enabled, recently)
        };

        if !rolled {
            return false;
        }
        info!("[ambient] New day, budget reset");
        if enabled && !recently {
            self.schedule_notifications().await;
        } else if recently {
            debug!("[ambient] Scheduled within the last {} minutes, skipping", AMBIENT_DUPLICATE_GUARD_MINUTES);
        }
        true
    }

    pub async fn schedule_notifications(&self) {
        self.run_guarded(RunKind::Schedule).await;
    }

    /// Cancel everything outstanding and plan the rest of the day afresh.
    pub async fn reschedule(&self) {
        self.run_guarded(RunKind::Reschedule).await;
    }

    async fn run_guarded(&self, kind: RunKind) {
        {
            let mut inner = self.inner.lock();
            if inner.is_scheduling {
                inner.pending_reschedule = true;
                debug!("[ambient] Run in flight, reschedule deferred");
                return;
            }
            inner.is_scheduling = true;
        }

        let mut kind = kind;
        loop {
            if kind == RunKind::Reschedule {
                self.cancel_all().await;
            }
            self.schedule_batch().await;

            let replay = {
                let mut inner = self.inner.lock();
                inner.runs += 1;
                if inner.pending_reschedule {
                    inner.pending_reschedule = false;
                    true
                } else {
                    inner.is_scheduling = false;
                    false
                }
            };
            if !replay {
                break;
            }
            debug!("[ambient] Replaying deferred reschedule");
            kind = RunKind::Reschedule;
        }
    }

    async fn schedule_batch(&self) {
        let now = self.clock.now();
        let remaining = {
            let mut inner = self.inner.lock();
            if !inner.settings.enabled {
                return;
            }
            self.refresh_daily(&mut inner);
            let cap = inner.settings.frequency.daily_cap();
            let count = inner.daily.as_ref().map_or(0, |d| d.count);
            cap.saturating_sub(count)
        };
        if remaining == 0 {
            debug!("[ambient] Daily cap reached, nothing to schedule");
            return;
        }

        if !self.transport.has_permission().await {
            warn!("[ambient] Notification permission not granted, skipping");
            return;
        }

        let (mood, intensity) = {
            let entity = self.entity.lock();
            (entity.mood(), entity.intensity())
        };
        let environment = self.environment.lock().mode();

        let times = {
            let mut inner = self.inner.lock();
            let count = planned_count(remaining, mood, intensity);
            let quiet_hours = inner.settings.quiet_hours;
            plan_times(count, now, self.tz, &quiet_hours, inner.rng.as_mut())
        };

        let mut created = Vec::with_capacity(times.len());
        for at in times {
            if !self.is_enabled() {
                break;
            }
            let body = self.messages.lock().get_message(mood, Some(environment));
            let payload = NotificationPayload {
                title: AMBIENT_TITLE.to_string(),
                body: body.to_string(),
                tag: Some(mood.as_str().to_string()),
            };
            match self.transport.schedule_at(at, &payload).await {
                Ok(id) => {
                    if !self.is_enabled() {
                        if let Err(e) = self.transport.cancel(&id).await {
                            warn!("[ambient] Failed to cancel aborted notification {}: {}", id, e);
                        }
                        break;
                    }
                    debug!("[ambient] Scheduled {} at {}", id, at);
                    created.push(id);
                }
                Err(e) => warn!("[ambient] Failed to schedule notification at {}: {}", at, e),
            }
        }

        let mut inner = self.inner.lock();
        if !inner.settings.enabled {
            return;
        }
        let inner = &mut *inner;
        if let Some(daily) = inner.daily.as_mut() {
            daily.count += created.len() as u32;
            daily.scheduled_ids.extend(created);
            daily.last_scheduled_at = Some(now);
            info!(
                "[ambient] {} of {} scheduled for {}",
                daily.count,
                inner.settings.frequency.daily_cap(),
                daily.date
            );
        }
        self.save_daily(inner);
    }

    /// Cancel every outstanding notification and zero today's counters.
    pub async fn cancel_all(&self) {
        if let Err(e) = self.transport.cancel_all().await {
            error!("[ambient] Failed to cancel notifications: {}", e);
        }
        let mut inner = self.inner.lock();
        if let Some(daily) = inner.daily.as_mut() {
            daily.count = 0;
            daily.scheduled_ids.clear();
        }
        self.save_daily(&inner);
    }

    /// One-off notification two seconds out, outside the daily budget.
    pub async fn send_test_notification(&self) -> bool {
        if !self.transport.has_permission().await {
            warn!("[ambient] Cannot send test notification, permission not granted");
            return false;
        }
        let mood = self.entity.lock().mood();
        let environment = self.environment.lock().mode();
        let body = self.messages.lock().get_message(mood, Some(environment));
        let payload = NotificationPayload {
            title: AMBIENT_TEST_TITLE.to_string(),
            body: body.to_string(),
            tag: Some(format!("test_{}", mood)),
        };
        let at = self.clock.now() + Duration::seconds(AMBIENT_TEST_DELAY_SECS);
        match self.transport.schedule_at(at, &payload).await {
            Ok(id) => {
                info!("[ambient] Test notification {} scheduled", id);
                true
            }
            Err(e) => {
                error!("[ambient] Failed to send test notification: {}", e);
                false
            }
        }
    }

    /// Cancel everything and forget the persisted budget.
    pub async fn reset(&self) {
        if let Err(e) = self.transport.cancel_all().await {
            error!("[ambient] Failed to cancel notifications: {}", e);
        }
        let mut inner = self.inner.lock();
        inner.daily = None;
        inner.pending_reschedule = false;
        self.store.remove(StoreKey::DailyNotification);
    }

    // ── Daily state ─────────────────────────────────────────────────────

    /// Make sure `inner.daily` is today's. Returns true when a previous
    /// day's state was replaced.
    fn refresh_daily(&self, inner: &mut AmbientInner) -> bool {
        let today = day_key(self.clock.now(), self.tz);
        if inner.daily.as_ref().is_some_and(|d| d.date == today) {
            return false;
        }

        let stored = self
            .store
            .load::<DailyNotificationState>(StoreKey::DailyNotification);
        let previous = inner.daily.take().or(stored);
        match previous {
            Some(state) if state.date == today => {
                inner.daily = Some(state);
                false
            }
            previous => {
                let rolled = previous.is_some();
                let last = previous.and_then(|p| p.last_scheduled_at);
                inner.daily = Some(DailyNotificationState::fresh(today, last));
                self.save_daily(inner);
                rolled
            }
        }
    }

    fn save_daily(&self, inner: &AmbientInner) {
        if let Some(daily) = &inner.daily {
            self.store.save(StoreKey::DailyNotification, daily);
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    fn is_enabled(&self) -> bool {
        self.inner.lock().settings.enabled
    }

    pub fn settings(&self) -> AmbientSettings {
        self.inner.lock().settings.clone()
    }

    pub fn daily_count(&self) -> u32 {
        self.inner.lock().daily.as_ref().map_or(0, |d| d.count)
    }

    pub fn daily_cap(&self) -> u32 {
        self.inner.lock().settings.frequency.daily_cap()
    }

    pub fn daily_state(&self) -> Option<DailyNotificationState> {
        self.inner.lock().daily.clone()
    }

    pub fn is_scheduling(&self) -> bool {
        self.inner.lock().is_scheduling
    }

    /// Completed scheduling runs since construction, replays included.
    pub fn schedule_runs(&self) -> u32 {
        self.inner.lock().runs
    }

    pub fn phase(&self) -> AmbientPhase {
        let inner = self.inner.lock();
        if inner.is_scheduling {
            AmbientPhase::Scheduling
        } else if inner.settings.enabled {
            AmbientPhase::Scheduled
        } else {
            AmbientPhase::Disabled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::constants::SAVE_DEBOUNCE_MS;
    use crate::atoms::error::{EngineError, EngineResult};
    use crate::atoms::types::Personality;
    use crate::engine::random::{rng_for, stream};
    use crate::engine::store::DebouncedWriter;
    use crate::engine::timers::Timers;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct MockTransport {
        live: Mutex<Vec<(String, DateTime<Utc>, NotificationPayload)>>,
        cancelled: Mutex<Vec<String>>,
        next_id: AtomicUsize,
        deny: AtomicBool,
        fail_every_other: AtomicBool,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl NotificationTransport for MockTransport {
        async fn schedule_at(&self, at: DateTime<Utc>, payload: &NotificationPayload) -> EngineResult<String> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.map_err(|e| EngineError::transport(e.to_string()))?.forget();
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other.load(Ordering::SeqCst) && n % 2 == 1 {
                return Err(EngineError::transport("simulated failure"));
            }
            let id = format!("n-{n}");
            self.live.lock().push((id.clone(), at, payload.clone()));
            Ok(id)
        }

        async fn cancel(&self, id: &str) -> EngineResult<()> {
            self.live.lock().retain(|(i, _, _)| i != id);
            self.cancelled.lock().push(id.to_string());
            Ok(())
        }

        async fn cancel_all(&self) -> EngineResult<()> {
            self.live.lock().clear();
            Ok(())
        }

        async fn has_permission(&self) -> bool {
            !self.deny.load(Ordering::SeqCst)
        }

        async fn request_permission(&self) -> bool {
            self.deny.store(false, Ordering::SeqCst);
            true
        }
    }

    struct Rig {
        scheduler: Arc<AmbientScheduler>,
        transport: Arc<MockTransport>,
        entity: Arc<Mutex<EntityEngine>>,
        store: Arc<StateStore>,
        clock: Clock,
    }

    fn rig_with(transport: MockTransport, start: DateTime<Utc>) -> Rig {
        let clock = Clock::manual(start);
        let timers = Timers::new();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let writer = Arc::new(DebouncedWriter::new(
            store.clone(),
            timers.clone(),
            clock.clone(),
            Duration::milliseconds(SAVE_DEBOUNCE_MS),
        ));
        let entity = Arc::new(Mutex::new(EntityEngine::new(
            clock.clone(),
            timers.clone(),
            writer,
            rng_for(Some(1), stream::ENTITY),
            Personality::default(),
        )));
        let messages = Arc::new(Mutex::new(MessageSystem::new(
            clock.clone(),
            rng_for(Some(1), stream::MESSAGES),
        )));
        let environment = Arc::new(Mutex::new(EnvironmentEngine::new(
            store.clone(),
            clock.clone(),
            timers,
        )));
        let transport = Arc::new(transport);
        let scheduler = Arc::new(AmbientScheduler::new(
            transport.clone(),
            store.clone(),
            entity.clone(),
            messages,
            environment,
            clock.clone(),
            chrono_tz::UTC,
            rng_for(Some(1), stream::AMBIENT),
        ));
        Rig {
            scheduler,
            transport,
            entity,
            store,
            clock,
        }
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn rig() -> Rig {
        rig_with(MockTransport::default(), morning())
    }

    fn enabled(frequency: Frequency) -> AmbientSettings {
        AmbientSettings {
            enabled: true,
            frequency,
            quiet_hours: QuietHours::default(),
        }
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_plan_respects_quiet_hours_and_gap() {
        let quiet = QuietHours::new(hm(23, 0), hm(7, 0));
        for seed in 0..200 {
            let mut rng = rng_for(Some(seed), stream::AMBIENT);
            let now = morning() + Duration::minutes((seed as i64 * 37) % 600);
            let times = plan_times(10, now, chrono_tz::UTC, &quiet, rng.as_mut());
            assert!(times.len() <= 10);
            for (i, t) in times.iter().enumerate() {
                assert!(*t >= now + Duration::minutes(30));
                assert!(*t <= end_of_local_day(now, chrono_tz::UTC));
                assert!(!quiet.contains(t.time()), "{t} is in quiet hours");
                if i > 0 {
                    assert!(*t - times[i - 1] >= Duration::minutes(30));
                }
            }
        }
    }

    #[test]
    fn test_plan_empty_when_day_is_over() {
        let mut rng = rng_for(Some(1), stream::AMBIENT);
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 45, 0).unwrap();
        assert!(plan_times(5, late, chrono_tz::UTC, &QuietHours::default(), rng.as_mut()).is_empty());
    }

    #[test]
    fn test_plan_uses_local_calendar_day() {
        // 20:00 UTC is 05:00 next day in Tokyo; the window runs to Tokyo midnight.
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        let tz = chrono_tz::Asia::Tokyo;
        assert_eq!(day_key(now, tz), "2025-03-02");
        let eod = end_of_local_day(now, tz);
        assert_eq!(eod.with_timezone(&tz).format("%H:%M").to_string(), "23:59");
        let mut rng = rng_for(Some(4), stream::AMBIENT);
        let quiet = QuietHours::new(hm(23, 0), hm(7, 0));
        for t in plan_times(10, now, tz, &quiet, rng.as_mut()) {
            assert!(!quiet.contains(t.with_timezone(&tz).time()));
        }
    }

    #[test]
    fn test_dormant_reduction() {
        assert_eq!(planned_count(5, Mood::Dormant, 0.15), 1);
        assert_eq!(planned_count(10, Mood::Dormant, 0.15), 3);
        assert_eq!(planned_count(2, Mood::Dormant, 0.15), 1);
        assert_eq!(planned_count(5, Mood::Dormant, 0.25), 5);
        assert_eq!(planned_count(5, Mood::Active, 0.6), 5);
        assert_eq!(planned_count(0, Mood::Dormant, 0.1), 0);
    }

    #[tokio::test]
    async fn test_cap_holds_across_repeated_runs() {
        let rig = rig();
        rig.scheduler.initialize(enabled(Frequency::Normal)).await;
        for _ in 0..4 {
            rig.scheduler.schedule_notifications().await;
        }
        assert_eq!(rig.scheduler.daily_count(), 5);
        assert_eq!(rig.transport.live.lock().len(), 5);

        let stored: DailyNotificationState = rig.store.load(StoreKey::DailyNotification).unwrap();
        assert_eq!(stored.count, 5);
        assert_eq!(stored.scheduled_ids.len(), 5);
        assert_eq!(stored.date, "2025-03-01");
    }

    #[tokio::test]
    async fn test_payload_shape() {
        let rig = rig();
        rig.scheduler.initialize(enabled(Frequency::Low)).await;
        let live = rig.transport.live.lock().clone();
        assert_eq!(live.len(), 2);
        for (_, _, payload) in live {
            assert_eq!(payload.title, "LINGR");
            assert_eq!(payload.tag.as_deref(), Some("restless"));
            assert!(!payload.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_dormant_entity_schedules_fewer() {
        let rig = rig();
        rig.entity.lock().force_intensity(0.15);
        rig.scheduler.initialize(enabled(Frequency::High)).await;
        assert_eq!(rig.scheduler.daily_count(), 3);
    }

    #[tokio::test]
    async fn test_individual_failures_are_skipped() {
        let transport = MockTransport::default();
        transport.fail_every_other.store(true, Ordering::SeqCst);
        let rig = rig_with(transport, morning());
        rig.scheduler.initialize(enabled(Frequency::High)).await;
        let count = rig.scheduler.daily_count();
        assert!(count > 0 && count < 10, "count {count}");
        assert_eq!(rig.transport.live.lock().len() as u32, count);
    }

    #[tokio::test]
    async fn test_no_permission_schedules_nothing() {
        let transport = MockTransport::default();
        transport.deny.store(true, Ordering::SeqCst);
        let rig = rig_with(transport, morning());
        rig.scheduler.initialize(enabled(Frequency::Normal)).await;
        assert_eq!(rig.scheduler.daily_count(), 0);
        assert!(!rig.scheduler.send_test_notification().await);
    }

    #[tokio::test]
    async fn test_settings_transitions() {
        let rig = rig();
        rig.scheduler.initialize(AmbientSettings::default()).await;
        assert_eq!(rig.scheduler.phase(), AmbientPhase::Disabled);
        assert_eq!(rig.scheduler.daily_count(), 0);

        rig.scheduler.update_settings(enabled(Frequency::Low)).await;
        assert_eq!(rig.scheduler.phase(), AmbientPhase::Scheduled);
        assert_eq!(rig.scheduler.daily_count(), 2);

        rig.scheduler.update_settings(enabled(Frequency::High)).await;
        assert_eq!(rig.scheduler.daily_count(), 10);
        assert_eq!(rig.transport.live.lock().len(), 10);
        assert_eq!(rig.scheduler.daily_cap(), 10);

        rig.scheduler.update_settings(AmbientSettings::default()).await;
        assert_eq!(rig.scheduler.phase(), AmbientPhase::Disabled);
        assert_eq!(rig.scheduler.daily_count(), 0);
        assert!(rig.transport.live.lock().is_empty());
    }

    #[tokio::test]
    async fn test_new_day_rollover() {
        let rig = rig();
        rig.scheduler.initialize(enabled(Frequency::Low)).await;
        assert!(!rig.scheduler.check_and_reschedule_if_new_day().await);

        rig.clock.advance(Duration::days(1));
        assert!(rig.scheduler.check_and_reschedule_if_new_day().await);
        let daily = rig.scheduler.daily_state().unwrap();
        assert_eq!(daily.date, "2025-03-02");
        assert_eq!(daily.count, 2);
        assert!(!rig.scheduler.check_and_reschedule_if_new_day().await);
    }

    #[tokio::test]
    async fn test_rollover_guard_skips_recent_run() {
        let rig = rig_with(
            MockTransport::default(),
            Utc.with_ymd_and_hms(2025, 3, 1, 23, 58, 0).unwrap(),
        );
        rig.scheduler.initialize(enabled(Frequency::Low)).await;
        rig.clock.advance(Duration::minutes(3));
        assert!(rig.scheduler.check_and_reschedule_if_new_day().await);
        let daily = rig.scheduler.daily_state().unwrap();
        assert_eq!(daily.date, "2025-03-02");
        assert_eq!(daily.count, 0);
    }

    #[tokio::test]
    async fn test_budget_survives_restart() {
        let rig = rig();
        rig.scheduler.initialize(enabled(Frequency::Normal)).await;

        let again = rig_with(MockTransport::default(), morning() + Duration::hours(1));
        again.store.save(
            StoreKey::DailyNotification,
            &rig.scheduler.daily_state().unwrap(),
        );
        again.scheduler.initialize(enabled(Frequency::Normal)).await;
        assert_eq!(again.scheduler.daily_count(), 5);
        assert!(again.transport.live.lock().is_empty());
    }

    #[tokio::test]
    async fn test_deferred_reschedule_runs_exactly_once() {
        let gate = Arc::new(Semaphore::new(0));
        let transport = MockTransport {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let rig = rig_with(transport, morning());
        {
            let mut inner = rig.scheduler.inner.lock();
            inner.settings = enabled(Frequency::Normal);
        }

        let scheduler = rig.scheduler.clone();
        let in_flight = tokio::spawn(async move { scheduler.schedule_notifications().await });
        while !rig.scheduler.is_scheduling() {
            tokio::task::yield_now().await;
        }

        rig.scheduler.reschedule().await;
        rig.scheduler.reschedule().await;
        rig.scheduler.schedule_notifications().await;
        assert_eq!(rig.scheduler.schedule_runs(), 0);

        gate.add_permits(1_000);
        in_flight.await.unwrap();

        assert_eq!(rig.scheduler.schedule_runs(), 2);
        assert!(!rig.scheduler.is_scheduling());
        assert_eq!(rig.scheduler.daily_count(), 5);
        assert_eq!(rig.transport.live.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_disable_mid_batch_cancels_aborted_notification() {
        let gate = Arc::new(Semaphore::new(0));
        let transport = MockTransport {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let rig = rig_with(transport, morning());
        {
            let mut inner = rig.scheduler.inner.lock();
            inner.settings = enabled(Frequency::Normal);
        }

        let scheduler = rig.scheduler.clone();
        let in_flight = tokio::spawn(async move { scheduler.schedule_notifications().await });
        while !rig.scheduler.is_scheduling() {
            tokio::task::yield_now().await;
        }

        rig.scheduler.update_settings(AmbientSettings::default()).await;
        gate.add_permits(1_000);
        in_flight.await.unwrap();

        assert_eq!(rig.scheduler.daily_count(), 0);
        assert!(rig.transport.live.lock().is_empty());
        assert_eq!(rig.transport.cancelled.lock().len(), 1);
        assert_eq!(rig.scheduler.phase(), AmbientPhase::Disabled);
    }

    #[tokio::test]
    async fn test_test_notification() {
        let rig = rig();
        assert!(rig.scheduler.send_test_notification().await);
        let live = rig.transport.live.lock().clone();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].1, morning() + Duration::seconds(2));
        assert_eq!(live[0].2.title, "LINGR [TEST]");
        assert_eq!(live[0].2.tag.as_deref(), Some("test_restless"));
        assert_eq!(rig.scheduler.daily_count(), 0);
    }
}
