//! WebSocket connection manager: one socket per logical channel.
//!
//! DESIGN
//! ======
//! Each open socket lives in its own spawned task that only forwards
//! [`ChannelEvent`]s into the runtime's event queue. The task never touches
//! store state. Every connect bumps a per-channel *generation*; events
//! carrying an older generation are stale and dropped by the owner, which is
//! how a detached close handler or a cancelled reconnect is expressed.
//!
//! LIFECYCLE
//! =========
//! 1. `connect` → previous socket closed and awaited → task spawned
//! 2. Handshake carries the auth token as the `Sec-WebSocket-Protocol`;
//!    a handshake that outlives `handshake_timeout` ends as `Closed`
//! 3. Open → `Opened` event → `getLastEvent` control frame → keepalive pings
//! 4. Text frames → `Frame` events, in arrival order
//! 5. Error/close → socket dropped → `Closed` event (retry decided upstream)
//! 6. `disconnect` → generation bumped → close handshake → task awaited

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header::SEC_WEBSOCKET_PROTOCOL};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConsoleError;
use crate::net::types::{ControlEvent, ControlFrame, StageId};

/// How long `disconnect` waits for the close handshake before aborting.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

const HANDSHAKE_TIMED_OUT: &str = "handshake timed out";

// =============================================================================
// CHANNEL IDENTITY
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Admin,
    Transcript,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Transcript => f.write_str("transcript"),
        }
    }
}

/// What a channel is connected to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    Admin,
    Transcript { stage: StageId },
}

impl ChannelTarget {
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Admin => ChannelKind::Admin,
            Self::Transcript { .. } => ChannelKind::Transcript,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Admin => None,
            Self::Transcript { stage } => Some(stage),
        }
    }
}

/// Parameters for one `connect` call.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    pub target: ChannelTarget,
    pub ws_url: String,
    pub event_name: String,
    pub token: String,
    pub keepalive: Duration,
    /// Upper bound on TCP connect plus the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

/// Build the channel URL: `{base}?eventName=..` plus `cms=true` for the admin
/// channel or `stage=..` for a transcript channel.
///
/// # Errors
///
/// Returns [`ConsoleError::InvalidUrl`] if `base` is not a valid URL.
pub fn channel_url(base: &str, target: &ChannelTarget, event_name: &str) -> Result<String, ConsoleError> {
    let mut url = reqwest::Url::parse(base).map_err(|e| ConsoleError::InvalidUrl(format!("{base}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("eventName", event_name);
        match target {
            ChannelTarget::Admin => {
                query.append_pair("cms", "true");
            }
            ChannelTarget::Transcript { stage } => {
                query.append_pair("stage", stage);
            }
        }
    }
    Ok(url.into())
}

/// Build the handshake request with the token carried as sub-protocol.
///
/// Browsers cannot set arbitrary handshake headers, so the server reads the
/// token from `Sec-WebSocket-Protocol`; native clients do the same.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the token is not a legal header value.
pub fn handshake_request(params: &ConnectParams) -> Result<Request<()>, ConsoleError> {
    let url = channel_url(&params.ws_url, &params.target, &params.event_name)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ConsoleError::InvalidUrl(e.to_string()))?;
    let protocol = HeaderValue::from_str(&params.token).map_err(|e| ConsoleError::InvalidToken(e.to_string()))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    Ok(request)
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelPayload {
    /// Handshake completed.
    Opened,
    /// One inbound text frame, unparsed.
    Frame(String),
    /// Socket is gone. `None` means a clean remote close.
    Closed(Option<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub kind: ChannelKind,
    pub generation: u64,
    pub payload: ChannelPayload,
}

/// Per-channel connection flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    /// Stage the transcript channel is bound to; always `None` for admin.
    pub connected_stage: Option<StageId>,
    pub last_error: Option<String>,
}

// =============================================================================
// CONNECTION
// =============================================================================

struct SocketTask {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Owns at most one socket task for one channel.
pub struct ChannelConnection {
    kind: ChannelKind,
    events: mpsc::UnboundedSender<ChannelEvent>,
    generation: u64,
    state: ConnectionState,
    socket: Option<SocketTask>,
}

impl ChannelConnection {
    #[must_use]
    pub fn new(kind: ChannelKind, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self { kind, events, generation: 0, state: ConnectionState::default(), socket: None }
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether `generation` belongs to the live socket (not a detached one).
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.socket.is_some() && generation == self.generation
    }

    /// Open a socket for `params.target`, closing any previous one first.
    ///
    /// The previous socket task is awaited before the new one is spawned, so
    /// two sockets for this channel never coexist.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake request cannot be built. The state
    /// is left disconnected with `last_error` set.
    pub async fn connect(&mut self, params: ConnectParams) -> Result<u64, ConsoleError> {
        self.disconnect().await;

        let request = match handshake_request(&params) {
            Ok(request) => request,
            Err(e) => {
                self.state.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let admin = params.target.kind() == ChannelKind::Admin;
        let frames = SocketFrames {
            get_last_event: encode_control(&params.event_name, ControlEvent::GetLastEvent, admin)?,
            ping: encode_control(&params.event_name, ControlEvent::Ping, admin)?,
        };

        self.generation += 1;
        self.state = ConnectionState {
            is_connected: false,
            is_connecting: true,
            connected_stage: params.target.stage().map(str::to_owned),
            last_error: None,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let socket_id = Uuid::new_v4();
        info!(channel = %self.kind, generation = self.generation, %socket_id, target = ?params.target, "ws: connecting");

        let handle = tokio::spawn(run_socket(
            request,
            frames,
            Timings { keepalive: params.keepalive, handshake: params.handshake_timeout },
            EventSink { kind: self.kind, generation: self.generation, events: self.events.clone() },
            shutdown_rx,
        ));
        self.socket = Some(SocketTask { handle, shutdown: Some(shutdown_tx) });
        Ok(self.generation)
    }

    /// Close the socket (if any) and reset connection flags.
    ///
    /// Idempotent and safe at any time, including mid-handshake or while a
    /// reconnect is pending: the generation bump makes any in-flight events
    /// and scheduled retries for the old socket stale.
    pub async fn disconnect(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::default();

        let Some(mut socket) = self.socket.take() else {
            return;
        };
        if let Some(shutdown) = socket.shutdown.take() {
            // Receiver is gone when the task already finished on its own.
            if shutdown.send(()).is_err() {
                debug!(channel = %self.kind, "ws: socket task already finished");
            }
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut socket.handle).await.is_err() {
            warn!(channel = %self.kind, "ws: close handshake timed out; aborting socket task");
            socket.handle.abort();
            if let Err(e) = socket.handle.await {
                debug!(channel = %self.kind, error = %e, "ws: aborted socket task");
            }
        }
        info!(channel = %self.kind, "ws: disconnected");
    }

    /// Record a handshake success. Returns `false` for stale events.
    pub fn on_opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state.is_connecting = false;
        self.state.is_connected = true;
        self.state.last_error = None;
        true
    }

    /// Record a socket loss. Returns `false` for stale events.
    ///
    /// The socket task has already dropped its stream when this event is
    /// emitted, so the socket counts as confirmed closed.
    pub fn on_closed(&mut self, generation: u64, reason: Option<&str>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state.is_connecting = false;
        self.state.is_connected = false;
        self.state.last_error = reason.map(str::to_owned);
        true
    }
}

fn encode_control(event_name: &str, event: ControlEvent, admin: bool) -> Result<String, ConsoleError> {
    Ok(serde_json::to_string(&ControlFrame::new(event_name, event, admin))?)
}

// =============================================================================
// SOCKET TASK
// =============================================================================

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct SocketFrames {
    get_last_event: String,
    ping: String,
}

#[derive(Clone, Copy)]
struct Timings {
    keepalive: Duration,
    handshake: Duration,
}

struct EventSink {
    kind: ChannelKind,
    generation: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl EventSink {
    /// Returns `false` once the runtime has gone away.
    fn emit(&self, payload: ChannelPayload) -> bool {
        self.events
            .send(ChannelEvent { kind: self.kind, generation: self.generation, payload })
            .is_ok()
    }
}

async fn run_socket(
    request: Request<()>,
    frames: SocketFrames,
    timings: Timings,
    sink: EventSink,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        result = tokio::time::timeout(timings.handshake, connect_async(request)) => result,
        _ = &mut shutdown => return,
    };
    let mut stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            sink.emit(ChannelPayload::Closed(Some(e.to_string())));
            return;
        }
        Err(_elapsed) => {
            warn!(channel = %sink.kind, timeout = ?timings.handshake, "ws: handshake timed out");
            sink.emit(ChannelPayload::Closed(Some(HANDSHAKE_TIMED_OUT.to_owned())));
            return;
        }
    };

    if !sink.emit(ChannelPayload::Opened) {
        return;
    }

    let mut reason = None;
    if let Err(e) = stream.send(Message::text(frames.get_last_event)).await {
        reason = Some(e.to_string());
    }

    let keepalive = timings.keepalive;
    let mut ping = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while reason.is_none() {
        tokio::select! {
            _ = &mut shutdown => {
                close_gracefully(&mut stream, sink.kind).await;
                return;
            }
            _ = ping.tick() => {
                if let Err(e) = stream.send(Message::text(frames.ping.clone())).await {
                    reason = Some(e.to_string());
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(ChannelPayload::Frame(text.as_str().to_owned())) {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => reason = Some(e.to_string()),
            }
        }
    }

    drop(stream);
    sink.emit(ChannelPayload::Closed(reason));
}

/// Send a close frame and drain until the peer acknowledges it.
async fn close_gracefully(stream: &mut WsStream, kind: ChannelKind) {
    if let Err(e) = stream.close(None).await {
        debug!(channel = %kind, error = %e, "ws: close frame not sent");
        return;
    }
    let drain = async { while stream.next().await.is_some() {} };
    if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
        debug!(channel = %kind, "ws: peer did not acknowledge close");
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
