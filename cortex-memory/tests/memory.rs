//! Memory plane integration tests: replay determinism, the bistable gate,
//! and overlay idempotency.

use chrono::{DateTime, TimeZone, Utc};
use cortex_ledger::LedgerStream;
use cortex_memory::{
    ArtifactType, Labels, MemoryError, MemoryPlane, OverlayDraft, OverlayScope,
};
use cortex_types::{MemoryConfig, SessionId};
use serde_json::json;
use std::sync::Arc;

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

async fn plane(config: MemoryConfig) -> (MemoryPlane, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let signals = Arc::new(
        LedgerStream::open(dir.path().join("memory/signals.jsonl"))
            .await
            .unwrap(),
    );
    let overlays = Arc::new(
        LedgerStream::open(dir.path().join("memory/overlays.jsonl"))
            .await
            .unwrap(),
    );
    (MemoryPlane::new(signals, overlays, config), dir)
}

fn gate_config() -> MemoryConfig {
    MemoryConfig {
        enabled: true,
        gate_count_threshold: 5,
        gate_session_threshold: 3,
        gate_window_hours: 72.0,
        decay_half_life_hours: 4.0,
        bias_salience_floor: 0.05,
    }
}

fn draft(signal_id: &str, at: DateTime<Utc>) -> OverlayDraft {
    OverlayDraft {
        signal_id: signal_id.into(),
        artifact_type: ArtifactType::TaskPattern,
        labels: Labels {
            domain: vec!["tooling".into()],
            task: vec!["query".into()],
        },
        weight: 0.8,
        scope: OverlayScope::Agent,
        context_line: "The user keeps asking about installed tooling.".into(),
        expires_at_event_ts: None,
        source_event_ids: vec!["EVT-1".into(), "EVT-2".into()],
        source_signal_ids: vec![],
        salience_weight: 1.0,
        decay_modifier: 1.0,
        window_start: at - chrono::Duration::hours(2),
        window_end: at,
        gate_window_key: format!("72h@{}", at.to_rfc3339()),
        model: "model-small".into(),
        prompt_pack_version: "1.0.0".into(),
        at: Some(at),
    }
}

#[tokio::test]
async fn accumulator_matches_replay_scenario() {
    // Signals at t=0h, 1h, 2h with half-life 4h, read at t=3h.
    let (plane, _dir) = plane(gate_config()).await;
    let session = SessionId::new("SES-A");
    for hour in 0..3 {
        plane
            .log_signal("A", &session, json!({}), Some(ts(1, hour)))
            .await
            .unwrap();
    }

    let accs = plane
        .read_signals(Some("A"), 0, Some(ts(1, 3)))
        .await
        .unwrap();
    assert_eq!(accs.len(), 1);
    let acc = &accs[0];
    assert_eq!(acc.count, 3);
    assert_eq!(acc.last_seen, ts(1, 2));
    assert_eq!(acc.event_ids.len(), 3);
    // exp(−ln2/4 × 1) ≈ 0.841
    assert!((acc.decay - 0.840896415).abs() < 1e-6, "decay {}", acc.decay);

    // Replay: the same computation twice is identical.
    let again = plane
        .read_signals(Some("A"), 0, Some(ts(1, 3)))
        .await
        .unwrap();
    assert_eq!(again, accs);
}

#[tokio::test]
async fn read_signals_is_replay_bounded() {
    let (plane, _dir) = plane(gate_config()).await;
    let session = SessionId::new("SES-A");
    plane
        .log_signal("A", &session, json!({}), Some(ts(1, 0)))
        .await
        .unwrap();
    plane
        .log_signal("A", &session, json!({}), Some(ts(2, 0)))
        .await
        .unwrap();

    // As of day 1, the day-2 event does not exist.
    let accs = plane
        .read_signals(Some("A"), 0, Some(ts(1, 12)))
        .await
        .unwrap();
    assert_eq!(accs[0].count, 1);
}

#[tokio::test]
async fn gate_stays_closed_below_thresholds() {
    let (plane, _dir) = plane(gate_config()).await;
    // 4 events from 3 sessions: count threshold (5) not met.
    for (i, session) in ["S1", "S2", "S3", "S1"].iter().enumerate() {
        plane
            .log_signal(
                "intent:tool_query",
                &SessionId::new(*session),
                json!({}),
                Some(ts(1, i as u32)),
            )
            .await
            .unwrap();
    }
    let gate = plane
        .check_gate("intent:tool_query", Some(ts(1, 6)))
        .await
        .unwrap();
    assert!(!gate.crossed);
    assert!(gate.reason.contains("count"));

    // 5 events but only 2 distinct sessions: session threshold not met.
    let (plane2, _dir2) = self::plane(gate_config()).await;
    for (i, session) in ["S1", "S2", "S1", "S2", "S1"].iter().enumerate() {
        plane2
            .log_signal(
                "intent:tool_query",
                &SessionId::new(*session),
                json!({}),
                Some(ts(1, i as u32)),
            )
            .await
            .unwrap();
    }
    let gate = plane2
        .check_gate("intent:tool_query", Some(ts(1, 6)))
        .await
        .unwrap();
    assert!(!gate.crossed);
    assert!(gate.reason.contains("sessions"));
}

#[tokio::test]
async fn gate_crosses_then_closes_after_consolidation() {
    let (plane, _dir) = plane(gate_config()).await;
    for (i, session) in ["S1", "S2", "S3", "S1", "S2"].iter().enumerate() {
        plane
            .log_signal(
                "intent:tool_query",
                &SessionId::new(*session),
                json!({}),
                Some(ts(1, i as u32)),
            )
            .await
            .unwrap();
    }

    let gate = plane
        .check_gate("intent:tool_query", Some(ts(1, 6)))
        .await
        .unwrap();
    assert!(gate.crossed, "gate should fire: {}", gate.reason);
    assert!(!gate.already_consolidated);

    // Consolidate, then the gate is closed inside the window.
    plane
        .log_overlay(draft("intent:tool_query", ts(1, 7)))
        .await
        .unwrap();
    let gate = plane
        .check_gate("intent:tool_query", Some(ts(1, 8)))
        .await
        .unwrap();
    assert!(!gate.crossed);
    assert!(gate.already_consolidated);

    // Far past the 72h window the gate can fire again.
    let gate = plane
        .check_gate("intent:tool_query", Some(ts(10, 0)))
        .await
        .unwrap();
    assert!(!gate.already_consolidated);
}

#[tokio::test]
async fn overlay_write_is_idempotent() {
    let (plane, _dir) = plane(gate_config()).await;
    let first = plane
        .log_overlay(draft("intent:tool_query", ts(1, 0)))
        .await
        .unwrap();
    assert!(first.created);

    // Same identity inputs, later write time: still the same artifact.
    let mut repeat = draft("intent:tool_query", ts(1, 0));
    repeat.at = Some(ts(1, 1));
    let second = plane.log_overlay(repeat).await.unwrap();
    assert!(!second.created);
    assert!(!second.reactivated);
    assert_eq!(second.overlay_id, first.overlay_id);
    assert_eq!(second.artifact_id, first.artifact_id);

    let biases = plane.read_active_biases(Some(ts(1, 2))).await.unwrap();
    assert_eq!(biases.len(), 1);
}

#[tokio::test]
async fn empty_source_ids_is_refused() {
    let (plane, _dir) = plane(gate_config()).await;
    let mut bad = draft("intent:tool_query", ts(1, 0));
    bad.source_event_ids = vec![];
    let err = plane.log_overlay(bad).await.unwrap_err();
    assert!(matches!(err, MemoryError::EmptySourceIds));
}

#[tokio::test]
async fn deactivate_then_reconsolidate_reactivates() {
    let (plane, _dir) = plane(gate_config()).await;
    let write = plane
        .log_overlay(draft("intent:tool_query", ts(1, 0)))
        .await
        .unwrap();

    plane
        .deactivate_overlay(&write.artifact_id, "operator request", ts(1, 1))
        .await
        .unwrap();
    assert!(plane.read_active_biases(Some(ts(1, 2))).await.unwrap().is_empty());

    // Same artifact inputs: the write re-activates instead of duplicating.
    let mut again_draft = draft("intent:tool_query", ts(1, 0));
    again_draft.at = Some(ts(1, 3));
    let again = plane.log_overlay(again_draft).await.unwrap();
    assert!(again.reactivated);
    assert!(!again.created);
    let biases = plane.read_active_biases(Some(ts(1, 4))).await.unwrap();
    assert_eq!(biases.len(), 1);
}

#[tokio::test]
async fn weight_update_applies_on_read() {
    let (plane, _dir) = plane(gate_config()).await;
    let write = plane
        .log_overlay(draft("intent:tool_query", ts(1, 0)))
        .await
        .unwrap();
    plane
        .update_overlay_weight(&write.artifact_id, 0.3, "demoted", ts(1, 1))
        .await
        .unwrap();

    let biases = plane.read_active_biases(Some(ts(1, 2))).await.unwrap();
    assert_eq!(biases[0].weight, 0.3);

    // Replay before the update sees the original weight.
    let before = plane.read_active_biases(Some(ts(1, 0))).await.unwrap();
    assert_eq!(before[0].weight, 0.8);
}

#[tokio::test]
async fn expiry_and_salience_retire_biases() {
    let mut config = gate_config();
    config.decay_half_life_hours = 4.0;
    let (plane, _dir) = plane(config).await;

    let mut expiring = draft("sig:expiring", ts(1, 0));
    expiring.expires_at_event_ts = Some(ts(1, 5));
    plane.log_overlay(expiring).await.unwrap();

    assert_eq!(plane.read_active_biases(Some(ts(1, 4))).await.unwrap().len(), 1);
    // Past the expiry it is gone.
    assert!(plane.read_active_biases(Some(ts(1, 6))).await.unwrap().is_empty());

    // Far-future as_of: decay drives salience under the floor for
    // everything, expiry or not.
    let (plane2, _dir2) = self::plane(gate_config()).await;
    plane2.log_overlay(draft("sig:decaying", ts(1, 0))).await.unwrap();
    assert!(plane2
        .read_active_biases(Some(ts(28, 0)))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn active_biases_are_deterministically_ordered() {
    let (plane, _dir) = plane(gate_config()).await;
    for signal in ["sig:b", "sig:a", "sig:c"] {
        plane.log_overlay(draft(signal, ts(1, 0))).await.unwrap();
    }
    let first = plane.read_active_biases(Some(ts(1, 1))).await.unwrap();
    let second = plane.read_active_biases(Some(ts(1, 1))).await.unwrap();
    let ids: Vec<&str> = first.iter().map(|o| o.signal_id.as_str()).collect();
    assert_eq!(ids, vec!["sig:a", "sig:b", "sig:c"]);
    assert_eq!(
        first.iter().map(|o| &o.overlay_id).collect::<Vec<_>>(),
        second.iter().map(|o| &o.overlay_id).collect::<Vec<_>>()
    );
}
