// LINGR Engine: Environment
// Classifies the device as HOME or AWAY by great-circle distance to a
// stored home base. The engine itself is synchronous: `Presence` fetches
// coordinates from the location provider when the poll timer fires and
// hands them to `apply_location`.
//
// State changes are low-frequency, so they are written through immediately
// rather than debounced.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    EARTH_RADIUS_METERS, ENVIRONMENT_POLL_INTERVAL_SECS, HOME_RADIUS_METERS,
};
use crate::atoms::types::{Coordinates, EnvironmentMode, StoreKey};
use crate::engine::clock::Clock;
use crate::engine::store::StateStore;
use crate::engine::timers::{TimerKey, Timers};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub mode: EnvironmentMode,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_home: Option<f64>,
}

/// Persisted under `environment-data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentData {
    pub home_base: Option<Coordinates>,
    pub location_awareness_enabled: bool,
    pub last_environment_mode: EnvironmentMode,
    pub last_environment_update: Option<DateTime<Utc>>,
}

/// Haversine distance in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

pub fn classify(distance_meters: f64) -> EnvironmentMode {
    if distance_meters <= HOME_RADIUS_METERS {
        EnvironmentMode::Home
    } else {
        EnvironmentMode::Away
    }
}

pub struct EnvironmentEngine {
    state: EnvironmentState,
    home_base: Option<Coordinates>,
    awareness_enabled: bool,
    tracking: bool,
    initialized: bool,
    store: Arc<StateStore>,
    clock: Clock,
    timers: Timers,
}

impl EnvironmentEngine {
    pub fn new(store: Arc<StateStore>, clock: Clock, timers: Timers) -> Self {
        let now = clock.now();
        Self {
            state: EnvironmentState {
                mode: EnvironmentMode::Unknown,
                last_updated: now,
                distance_from_home: None,
            },
            home_base: None,
            awareness_enabled: false,
            tracking: false,
            initialized: false,
            store,
            clock,
            timers,
        }
    }

    /// Restore the home base and awareness flag. Starts tracking if both
    /// are present.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        if let Some(data) = self.store.load::<EnvironmentData>(StoreKey::EnvironmentData) {
            self.home_base = data.home_base;
            self.awareness_enabled = data.location_awareness_enabled;
            self.state = EnvironmentState {
                mode: data.last_environment_mode,
                last_updated: data.last_environment_update.unwrap_or_else(|| self.clock.now()),
                distance_from_home: None,
            };
            info!(
                "[environment] Restored: home base {}, awareness {}, mode {}",
                if self.home_base.is_some() { "set" } else { "unset" },
                self.awareness_enabled,
                self.state.mode
            );
        }

        if self.can_track() {
            self.start_tracking();
        }
    }

    fn can_track(&self) -> bool {
        self.awareness_enabled && self.home_base.is_some()
    }

    /// Whether a location fix is wanted right now.
    pub fn wants_location(&self) -> bool {
        self.can_track()
    }

    /// Returns whether the caller should poll the location immediately.
    pub fn set_location_awareness_enabled(&mut self, enabled: bool) -> bool {
        self.awareness_enabled = enabled;
        self.persist();

        if self.can_track() {
            self.start_tracking();
            true
        } else {
            self.stop_tracking();
            self.set_mode(EnvironmentMode::Unknown, None);
            false
        }
    }

    /// Returns whether the caller should poll the location immediately.
    pub fn set_home_base(&mut self, coordinates: Coordinates) -> bool {
        self.home_base = Some(coordinates);
        self.persist();
        info!(
            "[environment] Home base set to ({:.5}, {:.5})",
            coordinates.latitude, coordinates.longitude
        );

        if self.awareness_enabled {
            self.start_tracking();
            true
        } else {
            false
        }
    }

    /// Classify a fresh location fix. Ignored unless tracking is possible.
    pub fn apply_location(&mut self, current: Coordinates) -> Option<EnvironmentMode> {
        let home = self.home_base.filter(|_| self.awareness_enabled)?;
        let distance = haversine_distance(home, current);
        let mode = classify(distance);
        if mode != self.state.mode {
            info!(
                "[environment] {} -> {} ({:.0}m)",
                self.state.mode, mode, distance
            );
        }
        self.set_mode(mode, Some(distance));
        Some(mode)
    }

    fn set_mode(&mut self, mode: EnvironmentMode, distance: Option<f64>) {
        self.state = EnvironmentState {
            mode,
            last_updated: self.clock.now(),
            distance_from_home: distance,
        };
        self.persist();
    }

    fn persist(&self) {
        self.store.save(
            StoreKey::EnvironmentData,
            &EnvironmentData {
                home_base: self.home_base,
                location_awareness_enabled: self.awareness_enabled,
                last_environment_mode: self.state.mode,
                last_environment_update: Some(self.state.last_updated),
            },
        );
    }

    // ── Polling ─────────────────────────────────────────────────────────

    fn arm_poll(&self) {
        self.timers.schedule(
            TimerKey::EnvironmentPoll,
            self.clock.now() + Duration::seconds(ENVIRONMENT_POLL_INTERVAL_SECS),
        );
    }

    fn start_tracking(&mut self) {
        if self.tracking {
            return;
        }
        self.tracking = true;
        self.arm_poll();
        debug!("[environment] Tracking started");
    }

    pub fn stop_tracking(&mut self) {
        if !self.tracking {
            return;
        }
        self.tracking = false;
        self.timers.cancel(TimerKey::EnvironmentPoll);
        debug!("[environment] Tracking stopped");
    }

    /// Restart polling after a pause. Returns whether tracking is on.
    pub fn resume_tracking(&mut self) -> bool {
        if self.can_track() {
            self.start_tracking();
        }
        self.tracking
    }

    /// Poll timer fired. Re-arms and reports whether to fetch a fix.
    pub fn on_poll_timer(&mut self) -> bool {
        if !self.tracking {
            return false;
        }
        self.arm_poll();
        self.can_track()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn reset(&mut self) {
        self.stop_tracking();
        self.home_base = None;
        self.awareness_enabled = false;
        self.state = EnvironmentState {
            mode: EnvironmentMode::Unknown,
            last_updated: self.clock.now(),
            distance_from_home: None,
        };
        self.store.remove(StoreKey::EnvironmentData);
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn mode(&self) -> EnvironmentMode {
        self.state.mode
    }

    pub fn state(&self) -> EnvironmentState {
        self.state.clone()
    }

    pub fn home_base(&self) -> Option<Coordinates> {
        self.home_base
    }

    pub fn is_location_awareness_on(&self) -> bool {
        self.awareness_enabled
    }
}
