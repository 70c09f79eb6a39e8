//! Console configuration parsed from environment variables.
//!
//! The session/config collaborator owns the values; this module types them
//! and applies defaults.

use std::time::Duration;

use crate::error::ConsoleError;

pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const ENV_WS_URL: &str = "STAGESYNC_WS_URL";
pub const ENV_API_URL: &str = "STAGESYNC_API_URL";
pub const ENV_EVENT_NAME: &str = "STAGESYNC_EVENT_NAME";
pub const ENV_TOKEN: &str = "STAGESYNC_TOKEN";
pub const ENV_KEEPALIVE_SECS: &str = "STAGESYNC_KEEPALIVE_SECS";
pub const ENV_SEARCH_DEBOUNCE_MS: &str = "STAGESYNC_SEARCH_DEBOUNCE_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "STAGESYNC_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required env var {0}")]
    Missing(&'static str),

    /// A URL variable does not use one of the accepted schemes.
    #[error("invalid {var}: {value} (expected {expected})")]
    InvalidUrl { var: &'static str, value: String, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// WebSocket base URL, e.g. `wss://push.example.com/ws`.
    pub ws_url: String,
    /// REST base URL; stage actions are posted to `{api_url}/stage`.
    pub api_url: String,
    /// Current event identifier. Absent until the operator picks an event.
    pub event_name: Option<String>,
    /// Auth token carried as the WebSocket sub-protocol and REST bearer.
    pub token: Option<String>,
    pub keepalive: Duration,
    pub search_debounce: Duration,
    pub request_timeout: Duration,
}

impl ConsoleConfig {
    /// Build typed console config from environment variables.
    ///
    /// Required:
    /// - `STAGESYNC_WS_URL`
    /// - `STAGESYNC_API_URL`
    ///
    /// Optional:
    /// - `STAGESYNC_EVENT_NAME`
    /// - `STAGESYNC_TOKEN`
    /// - `STAGESYNC_KEEPALIVE_SECS`: default 30
    /// - `STAGESYNC_SEARCH_DEBOUNCE_MS`: default 100
    /// - `STAGESYNC_REQUEST_TIMEOUT_SECS`: default 15
    ///
    /// A value in `overrides` (command-line flags) wins over the variable
    /// of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a URL has the
    /// wrong scheme.
    pub fn from_env(overrides: &[(&str, Option<String>)]) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            overrides
                .iter()
                .find(|(name, _)| *name == key)
                .and_then(|(_, value)| value.clone())
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Same as [`ConsoleConfig::from_env`] but reads through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ConsoleConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ws_url = lookup(ENV_WS_URL).ok_or(ConfigError::Missing(ENV_WS_URL))?;
        let api_url = lookup(ENV_API_URL).ok_or(ConfigError::Missing(ENV_API_URL))?;
        let mut config = Self::new(&ws_url, &api_url)?;

        config.event_name = non_empty(lookup(ENV_EVENT_NAME));
        config.token = non_empty(lookup(ENV_TOKEN));
        config.keepalive = Duration::from_secs(parse_or(lookup(ENV_KEEPALIVE_SECS), DEFAULT_KEEPALIVE_SECS).max(1));
        config.search_debounce =
            Duration::from_millis(parse_or(lookup(ENV_SEARCH_DEBOUNCE_MS), DEFAULT_SEARCH_DEBOUNCE_MS));
        config.request_timeout =
            Duration::from_secs(parse_or(lookup(ENV_REQUEST_TIMEOUT_SECS), DEFAULT_REQUEST_TIMEOUT_SECS).max(1));
        Ok(config)
    }

    /// Config with the given endpoints and default timings.
    ///
    /// # Errors
    ///
    /// Returns an error if `ws_url` is not `ws://`/`wss://` or `api_url` is
    /// not `http://`/`https://`.
    pub fn new(ws_url: &str, api_url: &str) -> Result<Self, ConfigError> {
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl {
                var: ENV_WS_URL,
                value: ws_url.to_owned(),
                expected: "ws:// or wss://",
            });
        }
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                var: ENV_API_URL,
                value: api_url.to_owned(),
                expected: "http:// or https://",
            });
        }
        Ok(Self {
            ws_url: ws_url.trim_end_matches('/').to_owned(),
            api_url: api_url.trim_end_matches('/').to_owned(),
            event_name: None,
            token: None,
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// The current event identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::MissingEventContext`] when no event is set.
    /// Callers fail fast on this; it is never retried.
    pub fn event_name(&self) -> Result<&str, ConsoleError> {
        self.event_name.as_deref().ok_or(ConsoleError::MissingEventContext)
    }

    /// The auth token used for the socket handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::MissingToken`] when no token is set.
    pub fn token(&self) -> Result<&str, ConsoleError> {
        self.token.as_deref().ok_or(ConsoleError::MissingToken)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr,
{
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
