// Debounced writer: coalesces bursts of saves for one key into a single
// write. Each queue() replaces the pending snapshot and re-arms the key's
// flush timer, so only the latest snapshot inside the window is written.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;

use super::StateStore;
use crate::atoms::types::StoreKey;
use crate::engine::clock::Clock;
use crate::engine::timers::{TimerKey, Timers};

pub struct DebouncedWriter {
    store: Arc<StateStore>,
    timers: Timers,
    clock: Clock,
    window: Duration,
    pending: Mutex<HashMap<StoreKey, serde_json::Value>>,
}

impl DebouncedWriter {
    pub fn new(store: Arc<StateStore>, timers: Timers, clock: Clock, window: Duration) -> Self {
        Self {
            store,
            timers,
            clock,
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Take an owned snapshot of `value` and schedule it for writing.
    pub fn queue<T: Serialize>(&self, key: StoreKey, value: &T) {
        let snapshot = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                log::error!("[store] Failed to snapshot {}: {}", key, e);
                return;
            }
        };
        self.pending.lock().insert(key, snapshot);
        self.timers
            .schedule(TimerKey::Flush(key), self.clock.now() + self.window);
    }

    pub fn is_pending(&self, key: StoreKey) -> bool {
        self.pending.lock().contains_key(&key)
    }

    /// Write the pending snapshot for `key`, if any. Called when the
    /// key's flush timer fires.
    pub fn flush(&self, key: StoreKey) -> bool {
        self.timers.cancel(TimerKey::Flush(key));
        let snapshot = self.pending.lock().remove(&key);
        match snapshot {
            Some(value) => {
                debug!("[store] Debounced flush of {}", key);
                self.store.save(key, &value)
            }
            None => false,
        }
    }

    /// Write every pending snapshot now. Used at shutdown.
    pub fn flush_all(&self) {
        let drained: Vec<(StoreKey, serde_json::Value)> = self.pending.lock().drain().collect();
        for (key, value) in drained {
            self.timers.cancel(TimerKey::Flush(key));
            self.store.save(key, &value);
        }
    }

    /// Drop the pending snapshot for `key` without writing it.
    pub fn cancel(&self, key: StoreKey) {
        self.timers.cancel(TimerKey::Flush(key));
        self.pending.lock().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn writer() -> (DebouncedWriter, Timers, Clock) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let timers = Timers::new();
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let writer = DebouncedWriter::new(store, timers.clone(), clock.clone(), Duration::seconds(1));
        (writer, timers, clock)
    }

    #[test]
    fn test_burst_coalesces_to_latest_snapshot() {
        let (writer, timers, clock) = writer();
        writer.queue(StoreKey::EntityState, &1u32);
        clock.advance(Duration::milliseconds(600));
        writer.queue(StoreKey::EntityState, &2u32);
        clock.advance(Duration::milliseconds(600));

        // First deadline passed, but it was superseded by the re-arm.
        assert!(timers.pop_due(clock.now()).is_none());
        assert!(writer.store().load::<u32>(StoreKey::EntityState).is_none());

        clock.advance(Duration::milliseconds(400));
        let (_, key) = timers.pop_due(clock.now()).unwrap();
        assert_eq!(key, TimerKey::Flush(StoreKey::EntityState));
        assert!(writer.flush(StoreKey::EntityState));
        assert_eq!(writer.store().load::<u32>(StoreKey::EntityState), Some(2));
        assert!(!writer.is_pending(StoreKey::EntityState));
    }

    #[test]
    fn test_flush_all_writes_everything_and_disarms() {
        let (writer, timers, _clock) = writer();
        writer.queue(StoreKey::EntityState, &7u32);
        writer.queue(StoreKey::Evidence, &vec![1u8, 2]);
        writer.flush_all();
        assert!(timers.is_empty());
        assert_eq!(writer.store().load::<u32>(StoreKey::EntityState), Some(7));
        assert_eq!(writer.store().load::<Vec<u8>>(StoreKey::Evidence), Some(vec![1, 2]));
    }

    #[test]
    fn test_cancel_drops_snapshot() {
        let (writer, timers, _clock) = writer();
        writer.queue(StoreKey::EntityState, &7u32);
        writer.cancel(StoreKey::EntityState);
        assert!(timers.is_empty());
        assert!(!writer.flush(StoreKey::EntityState));
    }
}
