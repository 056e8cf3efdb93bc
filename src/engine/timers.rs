// LINGR Engine: Timer Queue
// Discrete-event queue of named timers. Engines arm and cancel their own
// timers; `Presence` pops due entries and dispatches them by key.
//
// At most one live timer exists per key. Re-arming a key supersedes the
// previous entry, which stays in the heap and is skipped when popped
// (lazy cancellation).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::atoms::types::StoreKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    MoodProgression,
    IntensityFluctuation,
    EventsTick,
    ApparitionCheck,
    EnvironmentPoll,
    EpisodeStepDelay,
    Flush(StoreKey),
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, TimerKey)>>,
    live: HashMap<TimerKey, (u64, DateTime<Utc>)>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `key` to fire at `due`, replacing any pending timer for it.
    pub fn schedule(&mut self, key: TimerKey, due: DateTime<Utc>) {
        self.seq += 1;
        self.live.insert(key, (self.seq, due));
        self.heap.push(Reverse((due, self.seq, key)));
    }

    /// Returns whether a live timer was cancelled.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.live.remove(&key).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.live.clear();
        self.heap.clear();
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.live.contains_key(&key)
    }

    pub fn due_at(&self, key: TimerKey) -> Option<DateTime<Utc>> {
        self.live.get(&key).map(|(_, due)| *due)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn is_live(&self, seq: u64, key: TimerKey) -> bool {
        matches!(self.live.get(&key), Some((s, _)) if *s == seq)
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse((_, seq, key))) = self.heap.peek().copied() {
            if self.is_live(seq, key) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Earliest live due time, if any.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((due, _, _))| *due)
    }

    /// Pop the earliest live timer due at or before `until`.
    /// Ties fire in the order they were armed.
    pub fn pop_due(&mut self, until: DateTime<Utc>) -> Option<(DateTime<Utc>, TimerKey)> {
        self.discard_stale();
        let Reverse((due, _, key)) = self.heap.peek().copied()?;
        if due > until {
            return None;
        }
        self.heap.pop();
        self.live.remove(&key);
        Some((due, key))
    }
}

/// Cloneable handle to the shared queue.
#[derive(Debug, Clone, Default)]
pub struct Timers(Arc<Mutex<TimerQueue>>);

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, key: TimerKey, due: DateTime<Utc>) {
        self.0.lock().schedule(key, due);
    }

    pub fn cancel(&self, key: TimerKey) -> bool {
        self.0.lock().cancel(key)
    }

    pub fn cancel_all(&self) {
        self.0.lock().cancel_all();
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.0.lock().is_scheduled(key)
    }

    pub fn due_at(&self, key: TimerKey) -> Option<DateTime<Utc>> {
        self.0.lock().due_at(key)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.0.lock().next_due()
    }

    pub fn pop_due(&self, until: DateTime<Utc>) -> Option<(DateTime<Utc>, TimerKey)> {
        self.0.lock().pop_due(until)
    }
}
