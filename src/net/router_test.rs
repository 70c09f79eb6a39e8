use super::*;
use crate::net::types::{StageStatus, TranscriptTimestamp};

fn admin_router() -> EventRouter {
    EventRouter::new(ChannelKind::Admin, RetryPolicy::default())
}

// =============================================================
// decode_event
// =============================================================

#[test]
fn decodes_session_transitions() {
    for (event_type, transition) in [
        ("SESSION_LIVE_LISTENING", SessionTransition::Live),
        ("SESSION_LIVE_LISTENING_PAUSED", SessionTransition::Paused),
        ("SESSION_END", SessionTransition::Ended),
    ] {
        let text = format!(
            r#"{{"actionType":"x","eventType":"{event_type}","eventName":"ev","stage":"A","sessionId":"s1"}}"#
        );
        let event = decode_event(&text).unwrap();
        assert_eq!(
            event,
            Some(StageEvent::Update(StageUpdate::Session {
                stage: "A".to_owned(),
                session_id: "s1".to_owned(),
                transition,
            }))
        );
    }
}

#[test]
fn decodes_status_and_auto_av() {
    let status = decode_event(r#"{"eventType":"STAGE_STATUS_UPDATED","stage":"A","status":"OFFLINE"}"#).unwrap();
    assert_eq!(
        status,
        Some(StageEvent::Update(StageUpdate::Status { stage: "A".to_owned(), status: StageStatus::Offline }))
    );

    let auto = decode_event(r#"{"eventType":"SET_AUTOAV_SETUP","stage":"A","autoAv":true}"#).unwrap();
    assert_eq!(auto, Some(StageEvent::Update(StageUpdate::AutoAv { stage: "A".to_owned(), enabled: true })));
}

#[test]
fn decodes_transcript_lines() {
    let text = r#"{"eventType":"SESSION_LIVE_TRANSCRIPT","stage":"A","sessionId":"s1",
        "payload":{"transcript":"hello","timestamp":1700000000000,"eventName":"ev","stage":"A"}}"#;
    let Some(StageEvent::Transcript { stage, line }) = decode_event(text).unwrap() else {
        panic!("expected transcript event");
    };
    assert_eq!(stage, "A");
    assert_eq!(line.text, "hello");
    assert_eq!(line.timestamp, TranscriptTimestamp::Millis(1_700_000_000_000));
}

#[test]
fn unknown_event_types_are_dropped() {
    assert_eq!(decode_event(r#"{"eventType":"SOMETHING_NEW","stage":"A"}"#).unwrap(), None);
}

#[test]
fn control_echoes_and_empty_replay_are_ignored() {
    assert_eq!(decode_event(r#"{"event":"ping","client":false}"#).unwrap(), None);
    assert_eq!(decode_event("null").unwrap(), None);
}

#[test]
fn malformed_frames_are_protocol_errors() {
    for text in [
        "not json",
        r#"{"stage":"A"}"#,
        r#"{"eventType":"SESSION_END","stage":"A"}"#,
        r#"{"eventType":"STAGE_STATUS_UPDATED","stage":"A"}"#,
        r#"{"eventType":"STAGE_STATUS_UPDATED","stage":"A","status":"SIDEWAYS"}"#,
        r#"{"eventType":"SET_AUTOAV_SETUP","stage":"A"}"#,
        r#"{"eventType":"SESSION_LIVE_TRANSCRIPT","stage":"A","sessionId":"s1"}"#,
    ] {
        let err = decode_event(text).unwrap_err();
        assert!(matches!(err, ConsoleError::Protocol(_)), "{text} -> {err:?}");
    }
}

// =============================================================
// Subscription
// =============================================================

#[test]
fn same_target_while_connecting_or_connected_is_a_no_op() {
    let mut router = admin_router();
    assert!(router.begin_connect(&ChannelTarget::Admin));
    assert!(!router.begin_connect(&ChannelTarget::Admin));
    router.on_open();
    assert!(!router.begin_connect(&ChannelTarget::Admin));
    assert_eq!(router.status(), ConnectionStatus::Connected);
}

#[test]
fn new_target_resets_retry_budget() {
    let mut router = EventRouter::new(ChannelKind::Transcript, RetryPolicy::default());
    let a = ChannelTarget::Transcript { stage: "A".to_owned() };
    let b = ChannelTarget::Transcript { stage: "B".to_owned() };
    router.begin_connect(&a);
    router.on_connection_lost(Some("reset"));
    assert_eq!(router.attempts(), 1);

    assert!(router.begin_connect(&b));
    assert_eq!(router.attempts(), 0);
    assert_eq!(router.last_error(), None);
    assert_eq!(router.target(), Some(&b));
}

// =============================================================
// Retry
// =============================================================

#[test]
fn retry_delays_double_then_exhaust() {
    let mut router = admin_router();
    router.begin_connect(&ChannelTarget::Admin);

    let mut delays = Vec::new();
    for _ in 0..5 {
        match router.on_connection_lost(None) {
            RetryDecision::Retry { delay, .. } => delays.push(delay.as_millis()),
            RetryDecision::Exhausted(e) => panic!("exhausted early: {e}"),
        }
        assert!(router.begin_connect(&ChannelTarget::Admin));
    }
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);

    let RetryDecision::Exhausted(err) = router.on_connection_lost(Some("boom")) else {
        panic!("a sixth attempt must not be scheduled");
    };
    assert!(matches!(err, ConsoleError::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(router.status(), ConnectionStatus::Error);
    assert!(router.last_error().is_some_and(|e| e.contains("after 5 attempts")));
}

#[test]
fn successful_frame_clears_error_and_attempts() {
    let mut router = admin_router();
    router.begin_connect(&ChannelTarget::Admin);
    router.on_connection_lost(Some("reset"));
    router.begin_connect(&ChannelTarget::Admin);
    router.on_open();
    assert!(router.last_error().is_some());

    router
        .on_frame(r#"{"eventType":"STAGE_STATUS_UPDATED","stage":"A","status":"ONLINE"}"#)
        .unwrap();
    assert_eq!(router.last_error(), None);
    assert_eq!(router.attempts(), 0);
}

#[test]
fn protocol_error_keeps_retry_state() {
    let mut router = admin_router();
    router.begin_connect(&ChannelTarget::Admin);
    router.on_connection_lost(None);
    assert!(router.on_frame("{").is_err());
    assert_eq!(router.attempts(), 1);
}

#[test]
fn rearm_after_exhaustion_returns_target() {
    let mut router = EventRouter::new(
        ChannelKind::Admin,
        RetryPolicy { max_attempts: 1, ..RetryPolicy::default() },
    );
    router.begin_connect(&ChannelTarget::Admin);
    router.on_connection_lost(None);
    assert!(matches!(router.on_connection_lost(None), RetryDecision::Exhausted(_)));

    assert_eq!(router.rearm(), Some(ChannelTarget::Admin));
    assert_eq!(router.status(), ConnectionStatus::Disconnected);
    assert!(router.begin_connect(&ChannelTarget::Admin));
}

#[test]
fn fail_and_reset() {
    let mut router = admin_router();
    router.fail(&ConsoleError::MissingEventContext);
    assert_eq!(router.status(), ConnectionStatus::Error);
    assert_eq!(router.last_error(), Some("no event context available"));

    router.reset();
    assert_eq!(router.status(), ConnectionStatus::Disconnected);
    assert_eq!(router.target(), None);
    assert_eq!(router.last_error(), None);
}
