//! REST collaborator client for `POST {api}/stage`.
//!
//! Every action goes to the same endpoint with `{action, eventName, ...}` and
//! answers `{success, data}`. Envelope handling lives in the pure
//! [`parse_envelope`] so it can be tested without a server.

use serde::de::DeserializeOwned;

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::net::types::{ApiEnvelope, SessionSummary, Stage, StageAction, StageRequest};
use crate::util::bulk_actions::{BulkAction, BulkTarget};

const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// STAGE API TRAIT
// =============================================================================

/// Stage/session REST operations. Enables mocking in tests.
#[async_trait::async_trait]
pub trait StageApi: Send + Sync {
    /// Full stage list for an event, sessions embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers
    /// `success: false`.
    async fn fetch_stages(&self, event_name: &str) -> Result<Vec<Stage>, ConsoleError>;

    /// Session summaries for one stage.
    ///
    /// # Errors
    ///
    /// See [`StageApi::fetch_stages`].
    async fn fetch_sessions(&self, event_name: &str, stage: &str) -> Result<Vec<SessionSummary>, ConsoleError>;

    /// Begin live listening on `session_id`.
    ///
    /// # Errors
    ///
    /// See [`StageApi::fetch_stages`]. The same applies to the other
    /// listening actions and [`StageApi::set_auto_av`].
    async fn start_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError>;

    async fn pause_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError>;

    async fn end_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError>;

    async fn set_auto_av(&self, event_name: &str, stage: &str, enabled: bool) -> Result<(), ConsoleError>;
}

/// Send `action` for one resolved bulk target.
///
/// # Errors
///
/// Propagates the collaborator's error for this target only.
pub async fn run_bulk_action(
    api: &dyn StageApi,
    event_name: &str,
    action: BulkAction,
    target: &BulkTarget,
) -> Result<(), ConsoleError> {
    match action {
        BulkAction::Start => api.start_listening(event_name, &target.stage, &target.session_id).await,
        BulkAction::Pause => api.pause_listening(event_name, &target.stage, &target.session_id).await,
        BulkAction::End => api.end_listening(event_name, &target.stage, &target.session_id).await,
    }
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpStageApi {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpStageApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, endpoint: format!("{}/stage", config.api_url), token: config.token.clone() })
    }

    async fn post<T: DeserializeOwned>(&self, request: &StageRequest) -> Result<T, ConsoleError> {
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        parse_envelope(request.action, status, &text)
    }
}

#[async_trait::async_trait]
impl StageApi for HttpStageApi {
    async fn fetch_stages(&self, event_name: &str) -> Result<Vec<Stage>, ConsoleError> {
        self.post(&StageRequest::new(StageAction::GetStageListWithSessions, event_name))
            .await
    }

    async fn fetch_sessions(&self, event_name: &str, stage: &str) -> Result<Vec<SessionSummary>, ConsoleError> {
        self.post(&StageRequest::new(StageAction::GetSessionListForStage, event_name).with_stage(stage))
            .await
    }

    async fn start_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError> {
        let request = StageRequest::new(StageAction::AdminStartListening, event_name)
            .with_stage(stage)
            .with_session(session_id);
        self.post::<serde_json::Value>(&request).await.map(drop)
    }

    async fn pause_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError> {
        let request = StageRequest::new(StageAction::AdminPauseListening, event_name)
            .with_stage(stage)
            .with_session(session_id);
        self.post::<serde_json::Value>(&request).await.map(drop)
    }

    async fn end_listening(&self, event_name: &str, stage: &str, session_id: &str) -> Result<(), ConsoleError> {
        let request = StageRequest::new(StageAction::AdminEndListening, event_name)
            .with_stage(stage)
            .with_session(session_id);
        self.post::<serde_json::Value>(&request).await.map(drop)
    }

    async fn set_auto_av(&self, event_name: &str, stage: &str, enabled: bool) -> Result<(), ConsoleError> {
        let request = StageRequest::new(StageAction::AdminSetAutoAv, event_name)
            .with_stage(stage)
            .with_auto_av(enabled);
        self.post::<serde_json::Value>(&request).await.map(drop)
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Unwrap a `{success, data}` envelope into `T`.
///
/// # Errors
///
/// Non-2xx status, `success: false`, or a body that does not match `T` all
/// map to [`ConsoleError::Application`] tagged with the action name.
pub fn parse_envelope<T: DeserializeOwned>(action: StageAction, status: u16, body: &str) -> Result<T, ConsoleError> {
    let failure = |message: String| ConsoleError::Application { action: action.as_str().to_owned(), message };

    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<ApiEnvelope>(body)
            .ok()
            .and_then(|env| env.message)
            .unwrap_or_else(|| body.trim().to_owned());
        return Err(failure(format!("HTTP {status}: {detail}")));
    }

    let envelope: ApiEnvelope = serde_json::from_str(body).map_err(|e| failure(format!("invalid response: {e}")))?;
    if !envelope.success {
        return Err(failure(envelope.message.unwrap_or_else(|| "request rejected".to_owned())));
    }
    serde_json::from_value(envelope.data).map_err(|e| failure(format!("unexpected data: {e}")))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
