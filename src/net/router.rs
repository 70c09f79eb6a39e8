//! Event router: frame decoding and reconnect decisions for one channel.
//!
//! DESIGN
//! ======
//! Each wire `eventType` maps to exactly one [`StageEvent`] variant, and each
//! variant has exactly one handler in the console. Unknown event types are
//! dropped so newer servers can add events without breaking older consoles.
//!
//! ERROR HANDLING
//! ==============
//! - Undecodable frames return [`ConsoleError::Protocol`]; the channel keeps
//!   running and the caller records the error.
//! - Socket loss consumes one retry attempt from the [`RetryPolicy`]. Once the
//!   budget is spent the router parks in `Error` until `rearm` is called.
//! - The first successfully decoded frame clears the error and the attempt
//!   counter.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::ConsoleError;
use crate::net::backoff::RetryPolicy;
use crate::net::connection::{ChannelKind, ChannelTarget};
use crate::net::types::{AdminMessage, StageId, StageStatus, TranscriptMessage};
use crate::state::stages::{SessionTransition, StageUpdate};
use crate::state::transcript::TranscriptLine;

pub const SESSION_LIVE_LISTENING: &str = "SESSION_LIVE_LISTENING";
pub const SESSION_LIVE_LISTENING_PAUSED: &str = "SESSION_LIVE_LISTENING_PAUSED";
pub const SESSION_END: &str = "SESSION_END";
pub const SET_AUTOAV_SETUP: &str = "SET_AUTOAV_SETUP";
pub const STAGE_STATUS_UPDATED: &str = "STAGE_STATUS_UPDATED";
pub const SESSION_LIVE_TRANSCRIPT: &str = "SESSION_LIVE_TRANSCRIPT";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A decoded push event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageEvent {
    Update(StageUpdate),
    Transcript { stage: StageId, line: TranscriptLine },
}

// =============================================================================
// DECODING
// =============================================================================

/// Decode one inbound text frame.
///
/// Returns `Ok(None)` for frames that carry no stage event: unknown event
/// types, control-frame echoes (objects with `event` but no `eventType`) and
/// an empty `getLastEvent` reply (`null`).
///
/// # Errors
///
/// Returns [`ConsoleError::Protocol`] for invalid JSON or a known event type
/// that lacks one of its required fields.
pub fn decode_event(text: &str) -> Result<Option<StageEvent>, ConsoleError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ConsoleError::Protocol(e.to_string()))?;
    if value.is_null() {
        return Ok(None);
    }
    let Some(event_type) = value.get("eventType").and_then(Value::as_str).map(str::to_owned) else {
        if value.get("event").is_some() {
            return Ok(None);
        }
        return Err(ConsoleError::Protocol("missing eventType".to_owned()));
    };

    let event = match event_type.as_str() {
        SESSION_LIVE_LISTENING => session_update(value, SessionTransition::Live)?,
        SESSION_LIVE_LISTENING_PAUSED => session_update(value, SessionTransition::Paused)?,
        SESSION_END => session_update(value, SessionTransition::Ended)?,
        SET_AUTOAV_SETUP => {
            let msg: AdminMessage = parse(value, &event_type)?;
            let enabled = msg.auto_av.ok_or_else(|| missing(&event_type, "autoAv"))?;
            StageEvent::Update(StageUpdate::AutoAv { stage: msg.stage, enabled })
        }
        STAGE_STATUS_UPDATED => {
            let msg: AdminMessage = parse(value, &event_type)?;
            let status = msg.status.ok_or_else(|| missing(&event_type, "status"))?;
            if status == StageStatus::Unknown {
                return Err(ConsoleError::Protocol(format!("{event_type}: unknown status for stage {}", msg.stage)));
            }
            StageEvent::Update(StageUpdate::Status { stage: msg.stage, status })
        }
        SESSION_LIVE_TRANSCRIPT => {
            let msg: TranscriptMessage = parse(value, &event_type)?;
            StageEvent::Transcript {
                stage: msg.stage,
                line: TranscriptLine {
                    session_id: msg.session_id,
                    text: msg.payload.transcript,
                    timestamp: msg.payload.timestamp,
                },
            }
        }
        other => {
            debug!(event_type = %other, "router: dropping unknown event type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

fn session_update(value: Value, transition: SessionTransition) -> Result<StageEvent, ConsoleError> {
    let msg: AdminMessage = parse(value, "session event")?;
    let session_id = msg.session_id.ok_or_else(|| missing(&msg.event_type, "sessionId"))?;
    Ok(StageEvent::Update(StageUpdate::Session { stage: msg.stage, session_id, transition }))
}

fn parse<T: DeserializeOwned>(value: Value, event_type: &str) -> Result<T, ConsoleError> {
    serde_json::from_value(value).map_err(|e| ConsoleError::Protocol(format!("{event_type}: {e}")))
}

fn missing(event_type: &str, field: &str) -> ConsoleError {
    ConsoleError::Protocol(format!("{event_type}: missing {field}"))
}

// =============================================================================
// ROUTER
// =============================================================================

/// Outcome of a socket loss.
#[derive(Debug)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    Exhausted(ConsoleError),
}

/// Connection status and retry bookkeeping for one channel.
#[derive(Clone, Debug)]
pub struct EventRouter {
    kind: ChannelKind,
    policy: RetryPolicy,
    status: ConnectionStatus,
    target: Option<ChannelTarget>,
    attempts: u32,
    last_error: Option<String>,
    rev: u64,
}

impl EventRouter {
    #[must_use]
    pub fn new(kind: ChannelKind, policy: RetryPolicy) -> Self {
        Self {
            kind,
            policy,
            status: ConnectionStatus::Disconnected,
            target: None,
            attempts: 0,
            last_error: None,
            rev: 0,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn target(&self) -> Option<&ChannelTarget> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn rev(&self) -> u64 {
        self.rev
    }

    /// Claim a connect to `target`.
    ///
    /// Returns `false` when already connecting or connected to the same
    /// target; the caller must not open another socket. A different target
    /// starts with a fresh retry budget.
    pub fn begin_connect(&mut self, target: &ChannelTarget) -> bool {
        let same = self.target.as_ref() == Some(target);
        if same && matches!(self.status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            debug!(channel = %self.kind, ?target, "router: already subscribed");
            return false;
        }
        if !same {
            self.attempts = 0;
            self.last_error = None;
            self.target = Some(target.clone());
        }
        self.status = ConnectionStatus::Connecting;
        self.rev += 1;
        true
    }

    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.rev += 1;
        info!(channel = %self.kind, "router: channel open");
    }

    /// Decode a frame. A successful decode clears any error and resets the
    /// retry budget.
    ///
    /// # Errors
    ///
    /// Propagates [`decode_event`] protocol errors.
    pub fn on_frame(&mut self, text: &str) -> Result<Option<StageEvent>, ConsoleError> {
        let event = decode_event(text)?;
        if self.attempts > 0 || self.last_error.is_some() {
            self.attempts = 0;
            self.last_error = None;
            self.rev += 1;
        }
        Ok(event)
    }

    /// Record a socket loss and decide whether to retry.
    pub fn on_connection_lost(&mut self, reason: Option<&str>) -> RetryDecision {
        self.attempts += 1;
        let cause = ConsoleError::Transport(reason.unwrap_or("socket closed").to_owned());
        self.rev += 1;

        if let Some(delay) = self.policy.delay_for(self.attempts) {
            warn!(
                channel = %self.kind,
                attempt = self.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %cause,
                "router: scheduling reconnect"
            );
            self.status = ConnectionStatus::Disconnected;
            self.last_error = Some(cause.to_string());
            return RetryDecision::Retry { attempt: self.attempts, delay };
        }

        let exhausted = ConsoleError::RetriesExhausted { channel: self.kind.to_string(), attempts: self.policy.max_attempts };
        error!(channel = %self.kind, error = %exhausted, "router: giving up");
        self.status = ConnectionStatus::Error;
        self.last_error = Some(exhausted.to_string());
        RetryDecision::Exhausted(exhausted)
    }

    /// Park in `Error` with a terminal message (missing event context,
    /// unusable token or URL). No retry follows.
    pub fn fail(&mut self, err: &ConsoleError) {
        self.status = ConnectionStatus::Error;
        self.last_error = Some(err.to_string());
        self.rev += 1;
    }

    /// Explicit unsubscribe.
    pub fn reset(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.target = None;
        self.attempts = 0;
        self.last_error = None;
        self.rev += 1;
    }

    /// Manual retry after a terminal error. Returns the target to reconnect.
    pub fn rearm(&mut self) -> Option<ChannelTarget> {
        self.status = ConnectionStatus::Disconnected;
        self.attempts = 0;
        self.last_error = None;
        self.rev += 1;
        self.target.clone()
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;
