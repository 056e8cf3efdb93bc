use chrono::Duration;

use lingr::atoms::types::{EpisodeAction, EvidenceKind};
use lingr::engine::episodes::{EpisodeProgressState, EpisodeStatus};

use crate::common::*;

fn status_of(h: &Harness, id: &str) -> EpisodeStatus {
    h.presence
        .episodes()
        .into_iter()
        .find(|e| e.id == id)
        .map(|e| e.status)
        .unwrap()
}

#[tokio::test]
async fn test_first_contact_runs_to_completion() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_001"));
    assert_eq!(h.presence.episode_state("ep_001"), EpisodeProgressState::Active);

    h.presence.on_foreground().await;
    assert_eq!(h.executor.count(EpisodeAction::ShowMessage), 1);
    // The opening line holds the episode for five seconds.
    assert_eq!(h.presence.active_episode().unwrap().current_step_index, 0);
    assert!(h.transport.tagged("episode").is_empty());

    h.presence.advance(Duration::seconds(6)).await;

    let sent = h.transport.tagged("episode");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.title, "LINGR");
    assert_eq!(sent[0].payload.body, "Did you feel that?");
    assert_eq!(sent[0].at, morning() + Duration::seconds(5) + Duration::seconds(1));

    let trace = h
        .presence
        .evidence()
        .into_iter()
        .find(|e| e.description == "First contact signature recorded")
        .expect("episode evidence");
    assert_eq!(trace.kind, EvidenceKind::Anomaly);
    // The trace follows acceptance by the transport, ahead of delivery.
    assert_eq!(trace.timestamp, morning() + Duration::seconds(5));
    assert!(trace.timestamp < sent[0].at);
    assert_eq!(trace.metadata.unwrap().source.as_deref(), Some("episode"));

    assert_eq!(h.executor.count(EpisodeAction::Notification), 1);
    assert_eq!(h.executor.count(EpisodeAction::AutoAddEvidence), 1);
    assert_eq!(h.executor.count(EpisodeAction::Toast), 1);
    assert!(h.presence.active_episode().is_none());
    assert_eq!(h.presence.episode_state("ep_001"), EpisodeProgressState::Completed);
    assert_eq!(status_of(&h, "ep_001"), EpisodeStatus::Completed);
}

#[tokio::test]
async fn test_completion_unlocks_next_when_evidence_allows() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_001"));
    h.presence.on_foreground().await;
    h.presence.advance(Duration::seconds(6)).await;
    assert_eq!(h.presence.episode_state("ep_001"), EpisodeProgressState::Completed);

    // ep_002 wants three pieces of evidence.
    while h.presence.evidence_count() < 3 {
        h.presence.add_evidence(EvidenceKind::Capture, "blur", None).await;
    }
    assert!(h.presence.can_unlock_episode("ep_002"));
    assert!(!h.presence.can_unlock_episode("ep_003"));
    assert_eq!(h.presence.unlock_eligible(), vec!["ep_002".to_string()]);
    assert_eq!(status_of(&h, "ep_002"), EpisodeStatus::Available);
    assert!(!h.presence.can_unlock_episode("ep_002"));
}

#[tokio::test]
async fn test_watcher_steps_follow_conditions() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_002"));

    // Intensity sits at exactly 0.3; the scan step wants more.
    h.presence.record_scan().await;
    assert_eq!(h.executor.count(EpisodeAction::IntensitySpike), 0);
    assert_eq!(h.presence.active_episode().unwrap().current_step_index, 0);

    assert!(h.presence.stimulate(0.2));
    let before = h.presence.intensity();
    h.presence.record_scan().await;
    assert_eq!(h.executor.count(EpisodeAction::IntensitySpike), 1);
    assert!((h.presence.intensity() - (before + 0.1)).abs() < 1e-9);
    assert_eq!(h.presence.active_episode().unwrap().current_step_index, 1);

    h.clock.advance(Duration::seconds(2));
    h.presence.process_message("are you watching me").await;
    assert_eq!(h.executor.count(EpisodeAction::ShowMessage), 1);

    let apparitions_before = h.executor.count(EpisodeAction::SpawnApparition);
    h.presence.advance(Duration::seconds(11)).await;
    assert!(h.executor.count(EpisodeAction::SpawnApparition) > apparitions_before);
    assert_eq!(h.presence.active_episode().unwrap().current_step_index, 3);

    h.presence.on_foreground().await;
    let capture = h
        .presence
        .evidence()
        .into_iter()
        .find(|e| e.description == "The watcher, watching back")
        .expect("watcher evidence");
    assert_eq!(capture.kind, EvidenceKind::Capture);
    assert_eq!(h.presence.episode_state("ep_002"), EpisodeProgressState::Completed);
}

#[tokio::test]
async fn test_only_one_episode_at_a_time() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_001"));
    assert!(!h.presence.start_episode("ep_002"));
    assert!(!h.presence.start_episode("ep_404"));
    assert_eq!(h.presence.active_episode().unwrap().episode_id, "ep_001");
}

#[tokio::test]
async fn test_unscripted_episode_completes_on_next_trigger() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_003"));
    h.presence.on_foreground().await;
    assert_eq!(h.presence.episode_state("ep_003"), EpisodeProgressState::Completed);
}

#[tokio::test]
async fn test_failed_notification_stalls_nothing_else() {
    let h = started().await;
    assert!(h.presence.start_episode("ep_001"));
    h.transport.deny.store(true, std::sync::atomic::Ordering::SeqCst);
    h.presence.on_foreground().await;
    h.presence.advance(Duration::seconds(6)).await;

    // The notification step ran and advanced, but `notification_sent`
    // never arrived, so the evidence step is still pending.
    assert_eq!(h.executor.count(EpisodeAction::Notification), 1);
    assert_eq!(h.presence.active_episode().unwrap().current_step_index, 2);
    assert_eq!(h.executor.count(EpisodeAction::AutoAddEvidence), 0);
}
