// LINGR Engine: Clock
// Every engine reads "now" through a shared Clock so tests and the
// `simulate` CLI command can drive virtual time instead of the wall clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::warn;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub enum Clock {
    /// Wall-clock time.
    System,
    /// Virtual time, shared by every clone of the handle.
    Manual(Arc<Mutex<DateTime<Utc>>>),
}

impl Default for Clock {
    fn default() -> Self {
        Clock::System
    }
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    pub fn manual(start: DateTime<Utc>) -> Self {
        Clock::Manual(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(t) => *t.lock(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Clock::Manual(_))
    }

    /// Move a manual clock to `to`. Virtual time never runs backwards.
    pub fn set(&self, to: DateTime<Utc>) {
        match self {
            Clock::System => warn!("[clock] set() ignored on the system clock"),
            Clock::Manual(t) => {
                let mut now = t.lock();
                if to > *now {
                    *now = to;
                }
            }
        }
    }

    pub fn advance(&self, by: Duration) {
        match self {
            Clock::System => warn!("[clock] advance() ignored on the system clock"),
            Clock::Manual(t) => {
                let mut now = t.lock();
                *now += by;
            }
        }
    }
}
