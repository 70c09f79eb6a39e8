//! Wire schema shared by the REST collaborator and the push channels.
//!
//! Field names follow the server's camelCase JSON; enums use the server's
//! SCREAMING_SNAKE_CASE tags.

use serde::{Deserialize, Deserializer, Serialize};

/// Stable stage identifier. Never regenerated across fetches.
pub type StageId = String;

// =============================================================================
// STAGE
// =============================================================================

/// Health/status of a stage as reported by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    Offline,
    AudioNotReceiving,
    TranscriptNotReceiving,
    Online,
    OnlineAndProjecting,
    /// A status this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl StageStatus {
    /// Every known status except `OFFLINE` means the stage device is reachable.
    #[must_use]
    pub fn is_online(self) -> bool {
        !matches!(self, Self::Offline | Self::Unknown)
    }
}

/// Listening action currently driving a stage's controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentAction {
    SessionLiveListening,
    SessionLiveListeningPaused,
    SessionEnd,
}

impl CurrentAction {
    /// Parse a wire tag; unknown tags yield `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SESSION_LIVE_LISTENING" => Some(Self::SessionLiveListening),
            "SESSION_LIVE_LISTENING_PAUSED" => Some(Self::SessionLiveListeningPaused),
            "SESSION_END" => Some(Self::SessionEnd),
            _ => None,
        }
    }
}

/// One physical or virtual venue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: StageId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_online: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: StageStatus,
    /// Session summaries embedded in the stage list response, if any.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sessions: Vec<SessionSummary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_av: bool,
    #[serde(default)]
    pub current_session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_action")]
    pub current_action: Option<CurrentAction>,
    /// Milliseconds since the Unix epoch. Display only.
    #[serde(default)]
    pub last_updated_at: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    InProgress,
    UnderReview,
    Completed,
    ProcessingInsights,
    #[serde(other)]
    Unknown,
}

/// A recordable unit of content bound to one stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: SessionStatus,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub speakers: Vec<String>,
}

/// An explicit `null` reads the same as a missing field, so one sparse row
/// never fails the whole list.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_action<'de, D>(deserializer: D) -> Result<Option<CurrentAction>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(|tag| CurrentAction::from_tag(&tag)))
}

// =============================================================================
// INBOUND PUSH MESSAGES
// =============================================================================

/// Admin-channel push message.
///
/// Only `eventType` and `stage` are always present; the rest depend on the
/// event type and are validated by the router.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessage {
    #[serde(default)]
    pub action_type: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub event_name: Option<String>,
    pub stage: StageId,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub auto_av: Option<bool>,
    #[serde(default)]
    pub status: Option<StageStatus>,
}

/// Transcript timestamps arrive either as epoch millis or as ISO strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptTimestamp {
    Millis(i64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    pub transcript: String,
    pub timestamp: TranscriptTimestamp,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub stage: Option<StageId>,
}

/// Transcript-channel push message (`SESSION_LIVE_TRANSCRIPT`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub event_type: String,
    pub stage: StageId,
    pub session_id: String,
    pub payload: TranscriptPayload,
}

// =============================================================================
// OUTBOUND CONTROL FRAMES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlEvent {
    GetLastEvent,
    Ping,
}

/// Client-originated control frame: `{eventName, client: true, event}`.
/// The admin channel additionally marks itself with `cms: true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFrame {
    pub event_name: String,
    pub client: bool,
    pub event: ControlEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cms: Option<bool>,
}

impl ControlFrame {
    #[must_use]
    pub fn new(event_name: &str, event: ControlEvent, admin: bool) -> Self {
        Self { event_name: event_name.to_owned(), client: true, event, cms: admin.then_some(true) }
    }
}

// =============================================================================
// REST ENVELOPE
// =============================================================================

/// `POST /stage` actions understood by the REST collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StageAction {
    GetStageListWithSessions,
    GetSessionListForStage,
    AdminStartListening,
    AdminEndListening,
    AdminPauseListening,
    AdminSetAutoAv,
}

impl StageAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetStageListWithSessions => "getStageListWithSessions",
            Self::GetSessionListForStage => "getSessionListForStage",
            Self::AdminStartListening => "adminStartListening",
            Self::AdminEndListening => "adminEndListening",
            Self::AdminPauseListening => "adminPauseListening",
            Self::AdminSetAutoAv => "adminSetAutoAv",
        }
    }
}

/// Request body for `POST /stage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    pub action: StageAction,
    pub event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_av: Option<bool>,
}

impl StageRequest {
    #[must_use]
    pub fn new(action: StageAction, event_name: &str) -> Self {
        Self { action, event_name: event_name.to_owned(), stage: None, session_id: None, auto_av: None }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_owned());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_owned());
        self
    }

    #[must_use]
    pub fn with_auto_av(mut self, enabled: bool) -> Self {
        self.auto_av = Some(enabled);
        self
    }
}

/// Response envelope for `POST /stage`: `{success, data}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
