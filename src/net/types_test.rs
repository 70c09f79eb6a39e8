use super::*;
use serde_json::json;

#[test]
fn stage_deserializes_from_camel_case_payload() {
    let stage: Stage = serde_json::from_value(json!({
        "id": "hall-a",
        "name": "Hall A",
        "isOnline": true,
        "status": "ONLINE_AND_PROJECTING",
        "autoAv": false,
        "currentSessionId": "s1",
        "currentAction": "SESSION_LIVE_LISTENING_PAUSED",
        "location": "North Wing",
        "sessions": [
            { "id": "s1", "title": "Keynote", "status": "IN_PROGRESS", "speakers": ["Ada"] }
        ]
    }))
    .unwrap();

    assert_eq!(stage.id, "hall-a");
    assert!(stage.is_online);
    assert_eq!(stage.status, StageStatus::OnlineAndProjecting);
    assert_eq!(stage.current_action, Some(CurrentAction::SessionLiveListeningPaused));
    assert_eq!(stage.sessions[0].status, SessionStatus::InProgress);
    assert_eq!(stage.sessions[0].speakers, vec!["Ada".to_owned()]);
    assert_eq!(stage.location.as_deref(), Some("North Wing"));
}

#[test]
fn stage_tolerates_minimal_payload() {
    let stage: Stage = serde_json::from_value(json!({ "id": "B", "isOnline": false })).unwrap();
    assert_eq!(stage.status, StageStatus::Offline);
    assert!(stage.current_session_id.is_none());
    assert!(stage.current_action.is_none());
    assert!(stage.sessions.is_empty());
}

#[test]
fn only_offline_status_is_offline() {
    assert!(!StageStatus::Offline.is_online());
    assert!(StageStatus::AudioNotReceiving.is_online());
    assert!(StageStatus::TranscriptNotReceiving.is_online());
    assert!(StageStatus::Online.is_online());
    assert!(StageStatus::OnlineAndProjecting.is_online());
    assert!(!StageStatus::Unknown.is_online());
}

#[test]
fn unknown_status_and_nulls_do_not_fail_the_stage_list() {
    let stages: Vec<Stage> = serde_json::from_value(json!([
        { "id": "A", "name": "Hall A", "isOnline": true, "status": "MAINTENANCE" },
        { "id": "B", "name": null, "isOnline": null, "status": null, "sessions": null,
          "autoAv": null, "currentAction": "SESSION_ARCHIVED" },
        { "id": "C", "status": "ONLINE", "currentAction": "SESSION_LIVE_LISTENING_PAUSED",
          "sessions": [{ "id": "s1", "title": null, "status": "ARCHIVED", "speakers": null }] },
    ]))
    .unwrap();

    assert_eq!(stages.len(), 3);
    assert_eq!(stages[0].status, StageStatus::Unknown);
    assert!(!stages[0].status.is_online());
    assert_eq!(stages[1].name, "");
    assert_eq!(stages[1].status, StageStatus::Offline);
    assert!(stages[1].sessions.is_empty());
    assert_eq!(stages[1].current_action, None);
    assert_eq!(stages[2].current_action, Some(CurrentAction::SessionLiveListeningPaused));
    assert_eq!(stages[2].sessions[0].title, "");
    assert_eq!(stages[2].sessions[0].status, SessionStatus::Unknown);
    assert!(stages[2].sessions[0].speakers.is_empty());
}

#[test]
fn admin_control_frame_carries_cms_flag() {
    let admin = serde_json::to_value(ControlFrame::new("summit", ControlEvent::GetLastEvent, true)).unwrap();
    assert_eq!(admin, json!({ "eventName": "summit", "client": true, "event": "getLastEvent", "cms": true }));

    let transcript = serde_json::to_value(ControlFrame::new("summit", ControlEvent::Ping, false)).unwrap();
    assert_eq!(transcript, json!({ "eventName": "summit", "client": true, "event": "ping" }));
}

#[test]
fn stage_request_omits_unset_fields() {
    let body = serde_json::to_value(StageRequest::new(StageAction::GetStageListWithSessions, "summit")).unwrap();
    assert_eq!(body, json!({ "action": "getStageListWithSessions", "eventName": "summit" }));

    let body = serde_json::to_value(
        StageRequest::new(StageAction::AdminSetAutoAv, "summit")
            .with_stage("A")
            .with_auto_av(true),
    )
    .unwrap();
    assert_eq!(body, json!({ "action": "adminSetAutoAv", "eventName": "summit", "stage": "A", "autoAv": true }));
}

#[test]
fn stage_action_names_match_serde_tags() {
    for action in [
        StageAction::GetStageListWithSessions,
        StageAction::GetSessionListForStage,
        StageAction::AdminStartListening,
        StageAction::AdminEndListening,
        StageAction::AdminPauseListening,
        StageAction::AdminSetAutoAv,
    ] {
        assert_eq!(serde_json::to_value(action).unwrap(), json!(action.as_str()));
    }
}

#[test]
fn transcript_timestamp_accepts_numbers_and_strings() {
    let millis: TranscriptTimestamp = serde_json::from_value(json!(1_700_000_000_000_i64)).unwrap();
    assert_eq!(millis, TranscriptTimestamp::Millis(1_700_000_000_000));
    let text: TranscriptTimestamp = serde_json::from_value(json!("2026-10-19T10:00:00Z")).unwrap();
    assert_eq!(text, TranscriptTimestamp::Text("2026-10-19T10:00:00Z".to_owned()));
}

#[test]
fn envelope_defaults_missing_data_to_null() {
    let env: ApiEnvelope = serde_json::from_value(json!({ "success": false, "message": "nope" })).unwrap();
    assert!(!env.success);
    assert!(env.data.is_null());
    assert_eq!(env.message.as_deref(), Some("nope"));
}
