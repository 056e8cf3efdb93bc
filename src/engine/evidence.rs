// LINGR Engine: Evidence Store
// Append-only log of in-fiction "proof" of the entity's activity. Newest
// entry first, capped at 100 (the oldest falls off). Every change is
// written through to the state store.

use std::sync::Arc;

use log::{debug, info};
use rand::RngCore;

use crate::atoms::constants::EVIDENCE_CAPACITY;
use crate::atoms::types::{EvidenceEntry, EvidenceKind, EvidenceMetadata, StoreKey};
use crate::engine::clock::Clock;
use crate::engine::random;
use crate::engine::store::StateStore;

const CAPTURE_DESCRIPTIONS: &[&str] = &[
    "Distortion detected in visual field",
    "Anomalous presence captured on camera",
    "Reality fracture documented",
    "Spectral manifestation recorded",
    "Unidentified entity signature",
    "Spatial anomaly visualized",
];

const MESSAGE_DESCRIPTIONS: &[&str] = &[
    "Cryptic transmission received",
    "Unsolicited communication logged",
    "Message from unknown source",
    "Corrupted text fragment decoded",
    "Unexplained notification archived",
    "Entity broadcast intercepted",
];

const ANOMALY_DESCRIPTIONS: &[&str] = &[
    "Unexplained system behavior detected",
    "Temporal displacement recorded",
    "Environmental interference logged",
    "Electromagnetic anomaly measured",
    "Reality coherence failure noted",
    "Quantum uncertainty spike observed",
];

pub fn descriptions(kind: EvidenceKind) -> &'static [&'static str] {
    match kind {
        EvidenceKind::Capture => CAPTURE_DESCRIPTIONS,
        EvidenceKind::Message => MESSAGE_DESCRIPTIONS,
        EvidenceKind::Anomaly => ANOMALY_DESCRIPTIONS,
    }
}

/// Random description from the pool for `kind`.
pub fn generate_description(kind: EvidenceKind, rng: &mut dyn RngCore) -> &'static str {
    let pool = descriptions(kind);
    pool[random::index(rng, pool.len())]
}

/// Trailing counter of an `evidence_{ms}_{n}` id.
fn id_counter(id: &str) -> Option<u64> {
    id.rsplit('_').next()?.parse().ok()
}

pub struct EvidenceStore {
    entries: Vec<EvidenceEntry>,
    next_id: u64,
    store: Arc<StateStore>,
    clock: Clock,
    initialized: bool,
}

impl EvidenceStore {
    pub fn new(store: Arc<StateStore>, clock: Clock) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            store,
            clock,
            initialized: false,
        }
    }

    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        if let Some(mut saved) = self.store.load::<Vec<EvidenceEntry>>(StoreKey::Evidence) {
            saved.truncate(EVIDENCE_CAPACITY);
            self.next_id = saved
                .iter()
                .filter_map(|e| id_counter(&e.id))
                .max()
                .map_or(1, |n| n + 1);
            self.entries = saved;
            info!("[evidence] Restored {} entries", self.entries.len());
        }
    }

    /// Record a new entry and return a copy of it.
    pub fn add(
        &mut self,
        kind: EvidenceKind,
        description: impl Into<String>,
        metadata: Option<EvidenceMetadata>,
    ) -> EvidenceEntry {
        let now = self.clock.now();
        let entry = EvidenceEntry {
            id: format!("evidence_{}_{}", now.timestamp_millis(), self.next_id),
            kind,
            timestamp: now,
            description: description.into(),
            thumbnail: None,
            metadata,
        };
        self.next_id += 1;

        self.entries.insert(0, entry.clone());
        self.entries.truncate(EVIDENCE_CAPACITY);
        self.persist();
        debug!("[evidence] Added {} ({})", entry.id, kind.as_str());
        entry
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        self.entries.remove(index);
        self.persist();
        true
    }

    /// Empty the log and restart id numbering.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 1;
        self.store.remove(StoreKey::Evidence);
        info!("[evidence] Cleared");
    }

    fn persist(&self) {
        self.store.save(StoreKey::Evidence, &self.entries);
    }

    // ── Reads (always copies) ───────────────────────────────────────────

    pub fn all(&self) -> Vec<EvidenceEntry> {
        self.entries.clone()
    }

    pub fn by_kind(&self, kind: EvidenceKind) -> Vec<EvidenceEntry> {
        self.entries.iter().filter(|e| e.kind == kind).cloned().collect()
    }

    pub fn by_id(&self, id: &str) -> Option<EvidenceEntry> {
        self.entries.iter().find(|e| e.id == id).cloned()
    }

    pub fn recent(&self, limit: usize) -> Vec<EvidenceEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::testing::fixed;
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> (EvidenceStore, Arc<StateStore>, Clock) {
        let db = Arc::new(StateStore::open_in_memory().unwrap());
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        (EvidenceStore::new(db.clone(), clock.clone()), db, clock)
    }

    #[test]
    fn test_newest_first_with_unique_ids() {
        let (mut evidence, _, _) = store();
        let a = evidence.add(EvidenceKind::Capture, "first", None);
        let b = evidence.add(EvidenceKind::Anomaly, "second", None);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("evidence_"));
        assert!(a.id.ends_with("_1"));
        let all = evidence.all();
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (mut evidence, _, clock) = store();
        let first = evidence.add(EvidenceKind::Message, "entry 0", None);
        for i in 1..=100 {
            clock.advance(Duration::seconds(1));
            evidence.add(EvidenceKind::Message, format!("entry {i}"), None);
        }
        assert_eq!(evidence.count(), 100);
        assert!(evidence.by_id(&first.id).is_none());
        assert_eq!(evidence.recent(1)[0].description, "entry 100");
        assert_eq!(evidence.all().last().unwrap().description, "entry 1");
    }

    #[test]
    fn test_queries() {
        let (mut evidence, _, _) = store();
        evidence.add(EvidenceKind::Capture, "a", None);
        let m = evidence.add(EvidenceKind::Message, "b", None);
        evidence.add(EvidenceKind::Capture, "c", None);
        assert_eq!(evidence.by_kind(EvidenceKind::Capture).len(), 2);
        assert_eq!(evidence.by_id(&m.id).unwrap().description, "b");
        assert_eq!(evidence.recent(2).len(), 2);
        assert!(evidence.remove(&m.id));
        assert!(!evidence.remove(&m.id));
        assert_eq!(evidence.count(), 2);
    }

    #[test]
    fn test_clear_resets_counter_and_storage() {
        let (mut evidence, db, _) = store();
        evidence.add(EvidenceKind::Capture, "a", None);
        evidence.add(EvidenceKind::Capture, "b", None);
        evidence.clear();
        assert_eq!(evidence.count(), 0);
        assert!(db.load::<Vec<EvidenceEntry>>(StoreKey::Evidence).is_none());
        assert!(evidence.add(EvidenceKind::Capture, "c", None).id.ends_with("_1"));
    }

    #[test]
    fn test_hydration_resumes_counter() {
        let (mut evidence, db, clock) = store();
        evidence.add(EvidenceKind::Capture, "a", None);
        evidence.add(EvidenceKind::Anomaly, "b", None);

        let mut restored = EvidenceStore::new(db, clock);
        restored.initialize();
        assert_eq!(restored.all(), evidence.all());
        assert!(restored.add(EvidenceKind::Message, "c", None).id.ends_with("_3"));
    }

    #[test]
    fn test_generated_descriptions_come_from_pool() {
        let mut rng = fixed(0.5);
        for kind in [EvidenceKind::Capture, EvidenceKind::Message, EvidenceKind::Anomaly] {
            let text = generate_description(kind, rng.as_mut());
            assert!(descriptions(kind).contains(&text));
        }
    }
}
