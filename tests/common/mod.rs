#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use lingr::atoms::error::{EngineError, EngineResult};
use lingr::atoms::traits::{ActionExecutor, LocationProvider, NotificationTransport};
use lingr::atoms::types::{
    ActionRequest, Coordinates, EpisodeAction, NotificationPayload, PermissionStatus,
};
use lingr::engine::clock::Clock;
use lingr::engine::config::PresenceConfig;
use lingr::engine::state::{Collaborators, Presence};
use lingr::engine::store::StateStore;

#[derive(Debug, Clone)]
pub struct Scheduled {
    pub id: String,
    pub at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

#[derive(Default)]
pub struct MockTransport {
    pub live: Mutex<Vec<Scheduled>>,
    pub cancelled: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    pub deny: AtomicBool,
}

impl MockTransport {
    pub fn live(&self) -> Vec<Scheduled> {
        self.live.lock().clone()
    }

    pub fn tagged(&self, tag: &str) -> Vec<Scheduled> {
        self.live
            .lock()
            .iter()
            .filter(|s| s.payload.tag.as_deref() == Some(tag))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for MockTransport {
    async fn schedule_at(&self, at: DateTime<Utc>, payload: &NotificationPayload) -> EngineResult<String> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(EngineError::transport("permission denied"));
        }
        let id = format!("n-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().push(Scheduled {
            id: id.clone(),
            at,
            payload: payload.clone(),
        });
        Ok(id)
    }

    async fn cancel(&self, id: &str) -> EngineResult<()> {
        self.live.lock().retain(|s| s.id != id);
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
        !self.deny.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockLocation {
    pub fix: Mutex<Option<Coordinates>>,
    pub fetches: AtomicUsize,
}

impl MockLocation {
    pub fn set(&self, coordinates: Coordinates) {
        *self.fix.lock() = Some(coordinates);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for MockLocation {
    async fn current_coordinates(&self) -> EngineResult<Option<Coordinates>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(*self.fix.lock())
    }

    async fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

#[derive(Default)]
pub struct RecordingExecutor {
    pub requests: Mutex<Vec<ActionRequest>>,
}

impl RecordingExecutor {
    pub fn actions(&self) -> Vec<EpisodeAction> {
        self.requests.lock().iter().map(|r| r.action).collect()
    }

    pub fn count(&self, action: EpisodeAction) -> usize {
        self.requests.lock().iter().filter(|r| r.action == action).count()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn execute(&self, request: &ActionRequest) {
        self.requests.lock().push(request.clone());
    }
}

pub struct Harness {
    pub presence: Presence,
    pub transport: Arc<MockTransport>,
    pub location: Arc<MockLocation>,
    pub executor: Arc<RecordingExecutor>,
    pub store: Arc<StateStore>,
    pub clock: Clock,
}

/// Monday 08:00 UTC.
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn config() -> PresenceConfig {
    PresenceConfig {
        seed: Some(7),
        ..Default::default()
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    harness_on(store, Clock::manual(morning()))
}

/// A fresh `Presence` over an existing store, as after an app restart.
pub fn harness_on(store: Arc<StateStore>, clock: Clock) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let location = Arc::new(MockLocation::default());
    let executor = Arc::new(RecordingExecutor::default());
    let presence = Presence::new(
        config(),
        clock.clone(),
        store.clone(),
        Collaborators {
            transport: transport.clone(),
            location: location.clone(),
            executor: executor.clone(),
        },
    )
    .unwrap();
    Harness {
        presence,
        transport,
        location,
        executor,
        store,
        clock,
    }
}

pub async fn started() -> Harness {
    let h = harness();
    h.presence.initialize().await;
    h
}
