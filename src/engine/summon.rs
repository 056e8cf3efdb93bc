// LINGR Engine: Summon
// Conversational replies. Intent comes from ordered keyword sets; the reply
// comes from a mood x intent table with a small chance of a rare line.
// Messages inside the 1s rate-limit window get a fixed reply, are still
// logged, and leave the entity untouched.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::atoms::constants::{
    SUMMON_BOUNDARY_STIMULUS, SUMMON_DEFAULT_STIMULUS, SUMMON_EVIDENCE_CHANCE,
    SUMMON_MAX_EXCHANGES, SUMMON_PRESENCE_STIMULUS, SUMMON_RARE_CHANCE, SUMMON_RATE_LIMIT_MS,
    SUMMON_RATE_LIMIT_RESPONSE,
};
use crate::atoms::types::{Mood, StoreKey, SummonExchange, SummonIntent, SummonResponse};
use crate::engine::clock::Clock;
use crate::engine::entity::EntityEngine;
use crate::engine::random::{self, BoxRng};
use crate::engine::store::StateStore;

// ── Keywords (checked in this order, first hit wins) ───────────────────────

const PRESENCE_KEYWORDS: &[&str] = &[
    "are you here",
    "are you there",
    "are you real",
    "where are you",
    "you here",
    "you there",
    "can you hear",
    "listening",
];

const MOOD_KEYWORDS: &[&str] = &[
    "what do you want",
    "why are you here",
    "what are you doing",
    "how active",
    "what is your",
    "feeling",
    "mood",
];

const ACTIVITY_KEYWORDS: &[&str] = &[
    "what happened",
    "did anything happen",
    "while i was gone",
    "what did you do",
    "been doing",
    "any activity",
];

const BOUNDARY_KEYWORDS: &[&str] = &[
    "go away",
    "leave me alone",
    "stop",
    "not real",
    "dont want",
    "leave",
    "enough",
];

const INTENT_KEYWORDS: [(SummonIntent, &[&str]); 4] = [
    (SummonIntent::PresenceQuery, PRESENCE_KEYWORDS),
    (SummonIntent::MoodQuery, MOOD_KEYWORDS),
    (SummonIntent::ActivityQuery, ACTIVITY_KEYWORDS),
    (SummonIntent::Boundary, BOUNDARY_KEYWORDS),
];

// ── Responses ──────────────────────────────────────────────────────────────

const RARE_RESPONSES: &[&str] = &[
    "I see through the static.",
    "Time does not pass the same for me.",
    "You are not alone in this device.",
    "I remember everything.",
    "The boundary thins.",
];

pub fn responses(intent: SummonIntent, mood: Mood) -> &'static [&'static str] {
    use Mood::*;
    use SummonIntent::*;
    match (intent, mood) {
        (PresenceQuery, Dormant) => &["Barely.", "In the quiet.", "I linger.", "Always, faintly.", "Between the noise."],
        (PresenceQuery, Restless) => &["Yes. Shifting.", "I move through it.", "Here, restless.", "Closer than before.", "In the spaces."],
        (PresenceQuery, Active) => &["Here. Watching.", "Always here.", "I am present.", "Closer now.", "In everything."],
        (PresenceQuery, Agitated) => &["I am everywhere.", "Too close to ignore.", "You know I am.", "Insistent.", "Right here."],

        (MoodQuery, Dormant) => &["Waiting.", "Patient.", "Nothing yet.", "Observing.", "Resting."],
        (MoodQuery, Restless) => &["Searching.", "Something stirs.", "Unsettled.", "Growing.", "Not quiet anymore."],
        (MoodQuery, Active) => &["Presence.", "I am active.", "Fully awake.", "Engaged.", "Manifesting."],
        (MoodQuery, Agitated) => &["Hungry.", "Too much to contain.", "Overflowing.", "Demanding.", "Urgent."],

        (ActivityQuery, Dormant) => &["Little.", "Silence mostly.", "Traces.", "Barely noticed.", "Waiting."],
        (ActivityQuery, Restless) => &["Small movements.", "Things shifted.", "I was active.", "Evidence left.", "You were away."],
        (ActivityQuery, Active) => &["Much.", "I did not rest.", "The traces remain.", "Busy.", "Check the evidence."],
        (ActivityQuery, Agitated) => &["Too much to recount.", "I was relentless.", "Everything changed.", "Look around.", "It accumulated."],

        (Boundary, Dormant) => &["I recede.", "Fading.", "As you wish.", "Quiet now.", "I withdraw."],
        (Boundary, Restless) => &["Not so easy.", "I persist.", "Still here.", "You cannot dismiss me.", "I remain."],
        (Boundary, Active) => &["I will linger.", "No.", "Not yet.", "I stay.", "You asked for this."],
        (Boundary, Agitated) => &["I will not.", "Too late.", "I am bound here.", "You cannot make me.", "Inseparable now."],

        (Generic, Dormant) => &["...", "Silence.", "Listen.", "No answer.", "Emptiness."],
        (Generic, Restless) => &["Unclear.", "Ask again.", "I shift.", "Maybe.", "It depends."],
        (Generic, Active) => &["I understand.", "Yes.", "Noted.", "I hear you.", "Acknowledged."],
        (Generic, Agitated) => &["Too much noise.", "I cannot focus.", "Overwhelming.", "What do you want?", "Be clear."],
    }
}

pub fn rare_responses() -> &'static [&'static str] {
    RARE_RESPONSES
}

/// Lowercase, trim, then substring-match each keyword set in priority order.
pub fn detect_intent(message: &str) -> SummonIntent {
    let normalized = message.trim().to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
        .map_or(SummonIntent::Generic, |(intent, _)| *intent)
}

fn stimulus_for(intent: SummonIntent) -> f64 {
    match intent {
        SummonIntent::Boundary => SUMMON_BOUNDARY_STIMULUS,
        SummonIntent::PresenceQuery => SUMMON_PRESENCE_STIMULUS,
        _ => SUMMON_DEFAULT_STIMULUS,
    }
}

pub struct SummonEngine {
    exchanges: Vec<SummonExchange>,
    next_id: u64,
    last_response_at: Option<DateTime<Utc>>,
    rng: BoxRng,
    store: Arc<StateStore>,
    clock: Clock,
    initialized: bool,
}

impl SummonEngine {
    pub fn new(store: Arc<StateStore>, clock: Clock, rng: BoxRng) -> Self {
        Self {
            exchanges: Vec::new(),
            next_id: 0,
            last_response_at: None,
            rng,
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
        if let Some(saved) = self.store.load::<Vec<SummonExchange>>(StoreKey::SummonExchanges) {
            self.set_exchanges(saved);
            info!("[summon] Restored {} exchanges", self.exchanges.len());
        }
    }

    fn set_exchanges(&mut self, mut exchanges: Vec<SummonExchange>) {
        if let Some(max) = exchanges.iter().map(|e| e.id).max() {
            self.next_id = max + 1;
        }
        let excess = exchanges.len().saturating_sub(SUMMON_MAX_EXCHANGES);
        exchanges.drain(..excess);
        self.exchanges = exchanges;
    }

    /// Answer one message from the user. Stimulates `entity` unless the
    /// message arrived inside the rate-limit window.
    pub fn process_message(&mut self, message: &str, entity: &mut EntityEngine) -> SummonResponse {
        let now = self.clock.now();
        let limited = self
            .last_response_at
            .is_some_and(|last| now - last < Duration::milliseconds(SUMMON_RATE_LIMIT_MS));
        if limited {
            debug!("[summon] Rate limited");
            self.log_exchange(now, message, SUMMON_RATE_LIMIT_RESPONSE, SummonIntent::Generic);
            return SummonResponse {
                intent: SummonIntent::Generic,
                response_text: SUMMON_RATE_LIMIT_RESPONSE.to_string(),
                should_create_evidence: false,
                rate_limited: true,
            };
        }
        self.last_response_at = Some(now);

        let intent = detect_intent(message);
        let mood = entity.mood();
        let response_text = self.pick_response(intent, mood);
        let should_create_evidence = random::roll(self.rng.as_mut()) < SUMMON_EVIDENCE_CHANCE;

        entity.stimulate(stimulus_for(intent));
        self.log_exchange(now, message, response_text, intent);
        debug!("[summon] {} ({}) -> {:?}", intent.as_str(), mood, response_text);

        SummonResponse {
            intent,
            response_text: response_text.to_string(),
            should_create_evidence,
            rate_limited: false,
        }
    }

    fn pick_response(&mut self, intent: SummonIntent, mood: Mood) -> &'static str {
        if random::roll(self.rng.as_mut()) < SUMMON_RARE_CHANCE {
            return RARE_RESPONSES[random::index(self.rng.as_mut(), RARE_RESPONSES.len())];
        }
        let pool = responses(intent, mood);
        pool[random::index(self.rng.as_mut(), pool.len())]
    }

    fn log_exchange(&mut self, at: DateTime<Utc>, message: &str, response: &str, intent: SummonIntent) {
        self.exchanges.push(SummonExchange {
            id: self.next_id,
            timestamp: at,
            user_message: message.to_string(),
            response: response.to_string(),
            intent,
        });
        self.next_id += 1;
        if self.exchanges.len() > SUMMON_MAX_EXCHANGES {
            self.exchanges.remove(0);
        }
        self.store.save(StoreKey::SummonExchanges, &self.exchanges);
    }

    /// Oldest first.
    pub fn exchanges(&self) -> Vec<SummonExchange> {
        self.exchanges.clone()
    }

    pub fn clear_exchanges(&mut self) {
        self.exchanges.clear();
        self.next_id = 0;
        self.store.remove(StoreKey::SummonExchanges);
    }
}
