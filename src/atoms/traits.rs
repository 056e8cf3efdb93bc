// ── LINGR Atoms: Collaborator Traits ───────────────────────────────────────
// Seams to the platform layer. The core never talks to a notification
// service, GPS or UI directly; the host hands in implementations of these.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::atoms::error::EngineResult;
use crate::atoms::types::{ActionRequest, Coordinates, NotificationPayload, PermissionStatus};

/// Local notification delivery.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Schedule a notification for `at`. Returns the transport's id for it.
    async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> EngineResult<String>;

    async fn cancel(&self, id: &str) -> EngineResult<()>;

    async fn cancel_all(&self) -> EngineResult<()>;

    async fn has_permission(&self) -> bool;

    async fn request_permission(&self) -> bool;
}

/// Device geolocation.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// `Ok(None)` means no fix is available right now.
    async fn current_coordinates(&self) -> EngineResult<Option<Coordinates>>;

    async fn permission_status(&self) -> PermissionStatus;

    async fn request_permission(&self) -> PermissionStatus;
}

/// UI-side effects (toast, modal message, haptics, apparition overlay).
/// Called synchronously after engine locks are released.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, request: &ActionRequest);
}

/// Executor that drops every request. Used when the host has no UI.
pub struct NoopExecutor;

impl ActionExecutor for NoopExecutor {
    fn execute(&self, _request: &ActionRequest) {}
}
