// LINGR Engine: Episode Catalog
// Immutable episode templates. Template status only says where an episode
// starts; live status is derived by the engine from the persisted
// unlocked and completed sets.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::atoms::types::{EnvironmentMode, EpisodeAction, EpisodeTrigger, Mood};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Locked,
    Available,
    Completed,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Locked => "locked",
            EpisodeStatus::Available => "available",
            EpisodeStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeRarity {
    Common,
    Rare,
    Legendary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub min_intensity: Option<f64>,
    pub min_evidence: Option<usize>,
    pub previous_episode: Option<String>,
}

impl UnlockConditions {
    pub fn met(&self, intensity: f64, evidence_count: usize, completed: &[String]) -> bool {
        if self.min_intensity.is_some_and(|min| intensity < min) {
            return false;
        }
        if self.min_evidence.is_some_and(|min| evidence_count < min) {
            return false;
        }
        match &self.previous_episode {
            Some(previous) => completed.iter().any(|c| c == previous),
            None => true,
        }
    }
}

/// Every present field must hold. An absent field always passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepCondition {
    pub mood: Option<Vec<Mood>>,
    /// Strict: intensity must be greater than this.
    pub intensity_above: Option<f64>,
    pub environment: Option<Vec<EnvironmentMode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStep {
    pub id: String,
    pub trigger: EpisodeTrigger,
    #[serde(default)]
    pub condition: Option<StepCondition>,
    pub action: EpisodeAction,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub description: String,
    pub teaser: Option<String>,
    pub status: EpisodeStatus,
    pub rarity: EpisodeRarity,
    pub unlock_conditions: Option<UnlockConditions>,
    #[serde(default)]
    pub steps: Vec<EpisodeStep>,
}

// ── Builders ───────────────────────────────────────────────────────────────

fn episode(
    number: u32,
    title: &str,
    description: &str,
    teaser: Option<&str>,
    rarity: EpisodeRarity,
    unlock: Option<UnlockConditions>,
) -> Episode {
    Episode {
        id: format!("ep_{number:03}"),
        number,
        title: title.to_string(),
        description: description.to_string(),
        teaser: teaser.map(str::to_string),
        status: if unlock.is_some() {
            EpisodeStatus::Locked
        } else {
            EpisodeStatus::Available
        },
        rarity,
        unlock_conditions: unlock,
        steps: Vec::new(),
    }
}

fn unlock(min_intensity: Option<f64>, min_evidence: usize, previous: u32) -> Option<UnlockConditions> {
    Some(UnlockConditions {
        min_intensity,
        min_evidence: Some(min_evidence),
        previous_episode: Some(format!("ep_{previous:03}")),
    })
}

fn step(
    id: &str,
    trigger: EpisodeTrigger,
    action: EpisodeAction,
    data: serde_json::Value,
) -> EpisodeStep {
    EpisodeStep {
        id: id.to_string(),
        trigger,
        condition: None,
        action,
        data,
        wait_seconds: None,
    }
}

impl EpisodeStep {
    fn when(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    fn wait(mut self, seconds: u64) -> Self {
        self.wait_seconds = Some(seconds);
        self
    }
}

fn first_contact_steps() -> Vec<EpisodeStep> {
    use EpisodeAction::*;
    use EpisodeTrigger::*;
    vec![
        step("ep1_arrival", OpenApp, ShowMessage, json!({ "message": "Something is here." })).wait(5),
        step(
            "ep1_reach_out",
            Timer,
            Notification,
            json!({ "title": "LINGR", "body": "Did you feel that?" }),
        ),
        step(
            "ep1_first_trace",
            NotificationSent,
            AutoAddEvidence,
            json!({ "type": "anomaly", "description": "First contact signature recorded" }),
        ),
        step("ep1_acknowledge", EvidenceAdded, Toast, json!({ "message": "It left something behind." })),
    ]
}

fn watcher_steps() -> Vec<EpisodeStep> {
    use EpisodeAction::*;
    use EpisodeTrigger::*;
    vec![
        step("ep2_noticed", Scan, IntensitySpike, json!({ "amount": 0.1 })).when(StepCondition {
            intensity_above: Some(0.3),
            ..Default::default()
        }),
        step("ep2_it_answers", SummonMessage, ShowMessage, json!({ "message": "I know you are looking." }))
            .wait(10),
        step("ep2_glimpse", Timer, SpawnApparition, json!({})),
        step(
            "ep2_watching_back",
            OpenApp,
            AutoAddEvidence,
            json!({ "type": "capture", "description": "The watcher, watching back" }),
        )
        .when(StepCondition {
            mood: Some(vec![Mood::Restless, Mood::Active, Mood::Agitated]),
            ..Default::default()
        }),
    ]
}

/// The shipped catalog, `ep_001` through `ep_008`.
pub fn default_catalog() -> Vec<Episode> {
    use EpisodeRarity::*;

    let mut first_contact = episode(
        1,
        "First Contact",
        "Something has attached itself to your device...",
        Some("The presence makes itself known for the first time."),
        Common,
        None,
    );
    first_contact.steps = first_contact_steps();

    let mut watcher = episode(
        2,
        "The Watcher",
        "It knows when you're watching back.",
        Some("Evidence suggests the entity is not merely passive. It observes. It learns."),
        Common,
        unlock(None, 3, 1),
    );
    watcher.steps = watcher_steps();

    vec![
        first_contact,
        watcher,
        episode(
            3,
            "Echoes",
            "Fragments of something that was never alive.",
            Some("Audio anomalies reveal a pattern. A message? A warning?"),
            Common,
            unlock(None, 7, 2),
        ),
        episode(
            4,
            "Threshold",
            "The boundary between device and reality dissolves.",
            Some("AR captures show distortions that shouldn't be possible."),
            Rare,
            unlock(Some(0.6), 12, 3),
        ),
        episode(
            5,
            "Recognition",
            "It calls you by name. You never told it.",
            Some("Personal data corruption. Messages referencing your location, habits, fears."),
            Rare,
            unlock(Some(0.75), 18, 4),
        ),
        episode(
            6,
            "Possession",
            "Your device acts without input. Keys press themselves.",
            Some("Total loss of control. The presence no longer asks permission."),
            Legendary,
            unlock(Some(0.85), 25, 5),
        ),
        episode(
            7,
            "Emergence",
            "It wants to leave the screen.",
            Some("Environmental manifestations. Objects move. Lights flicker. Reality bends."),
            Legendary,
            unlock(Some(0.9), 35, 6),
        ),
        episode(8, "???", "...", None, Legendary, unlock(Some(0.95), 50, 7)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog[0].id, "ep_001");
        assert_eq!(catalog[0].status, EpisodeStatus::Available);
        assert!(catalog[1..].iter().all(|e| e.status == EpisodeStatus::Locked));
        assert_eq!(catalog[7].id, "ep_008");
        assert_eq!(catalog[7].teaser, None);

        let threshold = catalog[3].unlock_conditions.as_ref().unwrap();
        assert_eq!(threshold.min_intensity, Some(0.6));
        assert_eq!(threshold.min_evidence, Some(12));
        assert_eq!(threshold.previous_episode.as_deref(), Some("ep_003"));
    }

    #[test]
    fn test_unlock_conditions() {
        let watcher = default_catalog()[1].unlock_conditions.clone().unwrap();
        let completed = vec!["ep_001".to_string()];
        assert!(!watcher.met(0.5, 2, &completed));
        assert!(watcher.met(0.5, 3, &completed));
        assert!(!watcher.met(0.5, 3, &[]));

        let threshold = default_catalog()[3].unlock_conditions.clone().unwrap();
        let completed = vec!["ep_003".to_string()];
        assert!(!threshold.met(0.59, 12, &completed));
        assert!(threshold.met(0.6, 12, &completed));
    }

    #[test]
    fn test_scripted_episodes_have_steps() {
        let catalog = default_catalog();
        assert_eq!(catalog[0].steps.len(), 4);
        assert_eq!(catalog[1].steps.len(), 4);
        assert!(catalog[2..].iter().all(|e| e.steps.is_empty()));
        assert_eq!(catalog[0].steps[0].wait_seconds, Some(5));
    }
}
