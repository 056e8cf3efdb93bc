// LINGR Engine: Message Selection
// Weighted random pick over a static catalog of cryptic lines, filtered by
// mood, environment and a per-message cooldown. The last-shown map is
// in-memory only, so cooldowns reset on restart.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::atoms::constants::{MESSAGE_GLOBAL_COOLDOWN_MS, SILENT_MESSAGE};
use crate::atoms::types::{EnvironmentMode, Mood};
use crate::engine::clock::Clock;
use crate::engine::random::{self, BoxRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
}

#[derive(Debug, Clone, Copy)]
pub struct CrypticMessage {
    pub id: &'static str,
    pub text: &'static str,
    pub weight: f64,
    pub rarity: Rarity,
    /// Overrides the 15s global cooldown.
    pub min_cooldown_ms: Option<i64>,
    /// `None` matches every environment.
    pub environment: Option<EnvironmentMode>,
}

const fn msg(id: &'static str, text: &'static str, weight: f64, rarity: Rarity) -> CrypticMessage {
    CrypticMessage {
        id,
        text,
        weight,
        rarity,
        min_cooldown_ms: None,
        environment: None,
    }
}

const fn rare(id: &'static str, text: &'static str, weight: f64, cooldown_ms: i64) -> CrypticMessage {
    CrypticMessage {
        id,
        text,
        weight,
        rarity: Rarity::Rare,
        min_cooldown_ms: Some(cooldown_ms),
        environment: None,
    }
}

const fn local(
    id: &'static str,
    text: &'static str,
    weight: f64,
    rarity: Rarity,
    environment: EnvironmentMode,
) -> CrypticMessage {
    CrypticMessage {
        id,
        text,
        weight,
        rarity,
        min_cooldown_ms: None,
        environment: Some(environment),
    }
}

use EnvironmentMode::{Away, Home};
use Rarity::{Common, Uncommon};

// ═══════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════

const DORMANT: &[CrypticMessage] = &[
    msg("dormant_1", "It watches... waiting in the spaces between moments.", 1.0, Common),
    msg("dormant_2", "Silence carries more weight than you remember.", 1.0, Common),
    msg("dormant_3", "The boundary grows thin when you're not looking.", 0.8, Uncommon),
    rare("dormant_rare", "Something ancient stirs in the depths of your device.", 0.05, 3_600_000),
    local("home_dormant", "It has nested deeper into this place.", 0.7, Uncommon, Home),
    local("away_dormant", "It follows, patient and unseen.", 0.7, Uncommon, Away),
];

const RESTLESS: &[CrypticMessage] = &[
    msg("restless_1", "Have you checked the shadows lately?", 1.0, Common),
    msg("restless_2", "Time moves differently here now.", 1.0, Common),
    msg("restless_3", "Your device remembers things you've forgotten.", 0.9, Common),
    msg("restless_4", "Something shifted while you were away.", 0.8, Uncommon),
    rare("restless_rare", "It knows your name, though you never told it.", 0.04, 7_200_000),
    local("home_restless", "These walls remember what happened here.", 0.8, Common, Home),
    local("away_restless", "Distance means nothing to what clings to you.", 0.8, Common, Away),
];

const ACTIVE: &[CrypticMessage] = &[
    msg("active_1", "The static hides more than silence.", 1.0, Common),
    msg("active_2", "It knows your patterns now.", 1.0, Common),
    msg("active_3", "Every screen is a window. Something looks back.", 0.9, Common),
    msg("active_4", "The presence grows stronger in darkness.", 0.8, Uncommon),
    msg("active_5", "You've been chosen as a vessel.", 0.7, Uncommon),
    rare("active_rare", "It whispers coordinates to places that don't exist.", 0.03, 7_200_000),
    local("home_active", "It knows every corner of this sanctuary.", 0.9, Common, Home),
    local("away_active", "It observes unfamiliar territory through your eyes.", 0.9, Common, Away),
];

const AGITATED: &[CrypticMessage] = &[
    msg("agitated_1", "The veil tears. Something seeps through.", 1.0, Common),
    msg("agitated_2", "You feel it closer now. Much closer.", 1.0, Common),
    msg("agitated_3", "Reality fractures at the edges of your vision.", 0.9, Common),
    msg("agitated_4", "It demands acknowledgment. Soon.", 0.8, Uncommon),
    rare("agitated_rare", "The presence floods every circuit. There is no escape.", 0.02, 3_600_000),
    local("home_agitated", "Your home is its domain now.", 0.8, Uncommon, Home),
    local("away_agitated", "New places stir its curiosity and hunger.", 0.8, Uncommon, Away),
];

/// Lines eligible in every mood.
const UNIVERSAL: &[CrypticMessage] = &[
    msg("universal_1", "You are being observed.", 0.6, Uncommon),
    msg("universal_2", "This device is no longer fully yours.", 0.5, Uncommon),
];

pub fn mood_pool(mood: Mood) -> &'static [CrypticMessage] {
    match mood {
        Mood::Dormant => DORMANT,
        Mood::Restless => RESTLESS,
        Mood::Active => ACTIVE,
        Mood::Agitated => AGITATED,
    }
}

/// Walk `weights` subtracting each from `target`; the first item that takes
/// it to zero or below wins. Falls back to the last item.
pub(crate) fn pick_weighted<T>(items: &[T], weight: impl Fn(&T) -> f64, roll: f64) -> Option<&T> {
    let total: f64 = items.iter().map(&weight).sum();
    let mut remaining = roll * total;
    for item in items {
        remaining -= weight(item);
        if remaining <= 0.0 {
            return Some(item);
        }
    }
    items.last()
}

pub struct MessageSystem {
    rng: BoxRng,
    clock: Clock,
    last_shown: HashMap<&'static str, DateTime<Utc>>,
}

impl MessageSystem {
    pub fn new(clock: Clock, rng: BoxRng) -> Self {
        Self {
            rng,
            clock,
            last_shown: HashMap::new(),
        }
    }

    /// Messages currently eligible for `mood` in `environment`. Passing no
    /// environment skips environment filtering entirely.
    pub fn candidates(
        &self,
        mood: Mood,
        environment: Option<EnvironmentMode>,
    ) -> Vec<&'static CrypticMessage> {
        let now = self.clock.now();
        mood_pool(mood)
            .iter()
            .chain(UNIVERSAL.iter())
            .filter(|m| match (environment, m.environment) {
                (Some(current), Some(wanted)) => current == wanted,
                _ => true,
            })
            .filter(|m| match self.last_shown.get(m.id) {
                Some(shown) => {
                    let cooldown = m.min_cooldown_ms.unwrap_or(MESSAGE_GLOBAL_COOLDOWN_MS);
                    now - *shown >= Duration::milliseconds(cooldown)
                }
                None => true,
            })
            .collect()
    }

    /// Pick a line for `mood`. Returns `"..."` when nothing is eligible;
    /// that sentinel is a valid display value.
    pub fn get_message(&mut self, mood: Mood, environment: Option<EnvironmentMode>) -> &'static str {
        let candidates = self.candidates(mood, environment);
        let roll = random::roll(self.rng.as_mut());
        let Some(selected) = pick_weighted(&candidates, |m| m.weight, roll) else {
            debug!("[messages] Nothing eligible for {}", mood);
            return SILENT_MESSAGE;
        };
        self.last_shown.insert(selected.id, self.clock.now());
        selected.text
    }

    /// Forget every cooldown.
    pub fn reset(&mut self) {
        self.last_shown.clear();
    }
}
