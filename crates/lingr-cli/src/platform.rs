// Terminal stand-ins for the platform collaborators. Notifications are
// held in memory and printed when they come due; the location is whatever
// `--location` said; UI actions are printed as they happen.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;

use lingr::atoms::error::{EngineError, EngineResult};
use lingr::atoms::types::{ActionRequest, Coordinates, NotificationPayload, PermissionStatus};
use lingr::{ActionExecutor, LocationProvider, NotificationTransport};

pub struct Pending {
    pub id: String,
    pub at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

pub struct TerminalTransport {
    pending: Mutex<Vec<Pending>>,
    muted: AtomicBool,
}

impl TerminalTransport {
    pub fn new(muted: bool) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            muted: AtomicBool::new(muted),
        }
    }

    /// Remove and return everything due at or before `now`, oldest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Pending> {
        let mut pending = self.pending.lock();
        let (mut due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.at <= now);
        *pending = rest;
        due.sort_by_key(|p| p.at);
        due
    }

    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl NotificationTransport for TerminalTransport {
    async fn schedule_at(&self, at: DateTime<Utc>, payload: &NotificationPayload) -> EngineResult<String> {
        if self.muted.load(Ordering::Relaxed) {
            return Err(EngineError::transport("notifications are muted"));
        }
        let id = uuid::Uuid::new_v4().to_string();
        debug!("[cli] Notification {} queued for {}", id, at);
        self.pending.lock().push(Pending {
            id: id.clone(),
            at,
            payload: payload.clone(),
        });
        Ok(id)
    }

    async fn cancel(&self, id: &str) -> EngineResult<()> {
        self.pending.lock().retain(|p| p.id != id);
        Ok(())
    }

    async fn cancel_all(&self) -> EngineResult<()> {
        self.pending.lock().clear();
        Ok(())
    }

    async fn has_permission(&self) -> bool {
        !self.muted.load(Ordering::Relaxed)
    }

    async fn request_permission(&self) -> bool {
        self.muted.store(false, Ordering::Relaxed);
        true
    }
}

pub struct FixedLocation {
    fix: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(fix: Option<Coordinates>) -> Self {
        Self { fix }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_coordinates(&self) -> EngineResult<Option<Coordinates>> {
        Ok(self.fix)
    }

    async fn permission_status(&self) -> PermissionStatus {
        if self.fix.is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Undetermined
        }
    }

    async fn request_permission(&self) -> PermissionStatus {
        self.permission_status().await
    }
}

pub struct PrintExecutor {
    quiet: bool,
}

impl PrintExecutor {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ActionExecutor for PrintExecutor {
    fn execute(&self, request: &ActionRequest) {
        if self.quiet {
            debug!("[cli] {} {}", request.action.as_str(), request.data);
            return;
        }
        info!("[cli] {} {}", request.action.as_str(), request.data);
        println!("  ~ {} {}", request.action.as_str(), request.data);
    }
}

/// Parse `"lat,lon"`.
pub fn parse_coordinates(s: &str) -> Result<Coordinates, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{s}'"))?;
    let latitude: f64 = lat.trim().parse().map_err(|e| format!("bad latitude '{lat}': {e}"))?;
    let longitude: f64 = lon.trim().parse().map_err(|e| format!("bad longitude '{lon}': {e}"))?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("coordinates out of range: {latitude},{longitude}"));
    }
    Ok(Coordinates { latitude, longitude })
}
