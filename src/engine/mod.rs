// LINGR Engine: behavioral simulation core
// Entity state machine, ambient notification planning, episode runner and
// the timer queue. `state::Presence` owns every engine and
// is the only entry point a host needs.

pub mod ambient;
pub mod apparitions;
pub mod clock;
pub mod config;
pub mod entity;
pub mod environment;
pub mod episodes;
pub mod events;
pub mod evidence;
pub mod messages;
pub mod random;
pub mod state;
pub mod store;
pub mod summon;
pub mod timers;
