// LINGR: ambient presence simulation core.
//
// atoms/   pure types, constants, errors and collaborator traits
// engine/  the engines, timer queue, persistence gateway and `Presence`

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{ActionExecutor, LocationProvider, NoopExecutor, NotificationTransport};
pub use engine::clock::Clock;
pub use engine::config::{ControlSettings, PresenceConfig};
pub use engine::state::{Collaborators, Presence, PresenceStatus};
