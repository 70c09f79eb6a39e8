//! Error taxonomy for the sync core.
//!
//! ERROR HANDLING
//! ==============
//! Four classes flow through the console:
//! - transport (socket error/close): retryable, owned by the reconnect policy
//! - protocol (malformed frame): recorded on the store, channel keeps running
//! - application (REST `success:false` or failed call): scoped to one stage
//! - exhausted retries: terminal until the operator retries manually

/// Errors surfaced by the sync core.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// No event identifier was configured, so nothing can be fetched or joined.
    #[error("no event context available")]
    MissingEventContext,

    /// No auth token was configured for the socket handshake.
    #[error("missing auth token; pass --token or set STAGESYNC_TOKEN")]
    MissingToken,

    /// The auth token cannot be carried as a WebSocket sub-protocol.
    #[error("invalid auth token: {0}")]
    InvalidToken(String),

    /// A channel URL could not be built from the configured base URL.
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),

    /// Socket failed to open, errored, or closed unexpectedly.
    #[error("connection lost: {0}")]
    Transport(String),

    /// Inbound frame was not valid JSON or lacked a required field.
    #[error("malformed message: {0}")]
    Protocol(String),

    /// REST collaborator answered `success:false` or a non-2xx status.
    #[error("{action} failed: {message}")]
    Application { action: String, message: String },

    /// Reconnect attempts exhausted; requires a manual retry.
    #[error("connection lost on {channel} channel after {attempts} attempts")]
    RetriesExhausted { channel: String, attempts: u32 },

    /// HTTP transport failure talking to the REST collaborator.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConsoleError {
    /// Whether the reconnect policy should retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
