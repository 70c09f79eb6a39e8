//! Single-owner event loop driving the console.
//!
//! DESIGN
//! ======
//! One task owns the [`Console`] and both [`ChannelConnection`]s by value and
//! `select!`s over four sources: operator commands, socket events, results
//! of spawned REST calls and retry timers, and the search debounce deadline.
//! Every source is handled to completion before the next is polled, so store
//! mutation is strictly sequential. After each step the view is republished
//! on a `watch` channel if its revision key moved.
//!
//! LIFECYCLE
//! =========
//! 1. `spawn` → initial stage fetch + admin channel subscribe
//! 2. Commands mutate selection/filters or spawn REST calls
//! 3. Socket loss → router decides → sleep task posts `RetryDue`
//! 4. `RetryDue` for a stale generation is ignored (explicit disconnect or a
//!    newer connect happened in between)
//! 5. `Command::Shutdown` or dropping the handle → both sockets closed

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::console::{Console, ConsoleView};
use crate::error::ConsoleError;
use crate::net::api::{StageApi, run_bulk_action};
use crate::net::connection::{ChannelConnection, ChannelEvent, ChannelKind, ChannelPayload, ChannelTarget, ConnectParams};
use crate::net::router::{ConnectionStatus, RetryDecision};
use crate::net::types::{SessionSummary, Stage, StageId};
use crate::util::bulk_actions::{BulkAction, BulkTarget};
use crate::util::debounce::Debouncer;

// =============================================================================
// COMMANDS
// =============================================================================

/// Operator intent. Parsed from one line of text by the CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Toggle(StageId),
    ToggleAll,
    ClearSelection,
    Search(String),
    Locations(Vec<String>),
    Bulk(BulkAction),
    SetAutoAv { stage: StageId, enabled: bool },
    ExpandSessions(StageId),
    ClearSessions(StageId),
    WatchTranscript(Option<StageId>),
    /// Manual retry after a terminal connection or fetch error.
    Retry,
    Shutdown,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let arg = |name: &str| {
            if rest.is_empty() {
                Err(ParseCommandError(format!("{verb}: missing {name}")))
            } else {
                Ok(rest.to_owned())
            }
        };

        match verb.to_ascii_lowercase().as_str() {
            "refresh" => Ok(Self::Refresh),
            "toggle" | "select" => arg("stage").map(Self::Toggle),
            "all" => Ok(Self::ToggleAll),
            "clear" => Ok(Self::ClearSelection),
            "search" => Ok(Self::Search(rest.to_owned())),
            "locations" => Ok(Self::Locations(
                rest.split(',').map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect(),
            )),
            "start" | "resume" | "pause" | "end" | "stop" => verb.parse().map(Self::Bulk).map_err(ParseCommandError),
            "autoav" => {
                let (stage, flag) = rest
                    .rsplit_once(char::is_whitespace)
                    .ok_or_else(|| ParseCommandError("autoav: expected <stage> <on|off>".to_owned()))?;
                let enabled = match flag {
                    "on" | "true" => true,
                    "off" | "false" => false,
                    other => return Err(ParseCommandError(format!("autoav: expected on|off, got {other}"))),
                };
                Ok(Self::SetAutoAv { stage: stage.trim().to_owned(), enabled })
            }
            "sessions" => arg("stage").map(Self::ExpandSessions),
            "forget" => arg("stage").map(Self::ClearSessions),
            "transcript" => Ok(Self::WatchTranscript((!rest.is_empty()).then(|| rest.to_owned()))),
            "retry" => Ok(Self::Retry),
            "quit" | "exit" => Ok(Self::Shutdown),
            "" => Err(ParseCommandError("empty command".to_owned())),
            other => Err(ParseCommandError(format!("unknown command: {other}"))),
        }
    }
}

/// Results posted back into the loop by spawned tasks.
#[derive(Debug)]
enum ConsoleEvent {
    StagesFetched(Result<Vec<Stage>, ConsoleError>),
    SessionsFetched { stage: StageId, result: Result<Vec<SessionSummary>, ConsoleError> },
    BulkDone { action: BulkAction, target: BulkTarget, result: Result<(), ConsoleError> },
    AutoAvDone { stage: StageId, enabled: bool, result: Result<(), ConsoleError> },
    RetryDue { kind: ChannelKind, generation: u64 },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Client side of a running console.
#[derive(Clone)]
pub struct ConsoleHandle {
    commands: mpsc::UnboundedSender<Command>,
    views: watch::Receiver<ConsoleView>,
}

impl ConsoleHandle {
    /// Queue a command. Returns `false` once the console has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// A receiver that observes every republished view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConsoleView> {
        self.views.clone()
    }

    /// The most recently published view.
    #[must_use]
    pub fn current(&self) -> ConsoleView {
        self.views.borrow().clone()
    }
}

/// Start the console loop on the current tokio runtime.
///
/// The loop stops on [`Command::Shutdown`] or when every handle is dropped.
#[must_use]
pub fn spawn(config: ConsoleConfig, api: Arc<dyn StageApi>) -> (ConsoleHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (channel_tx, channel_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let console = Console::default();
    let (view_tx, view_rx) = watch::channel(console.view());

    let runtime = Runtime {
        search: Debouncer::new(config.search_debounce),
        admin: ChannelConnection::new(ChannelKind::Admin, channel_tx.clone()),
        transcript: ChannelConnection::new(ChannelKind::Transcript, channel_tx),
        config,
        api,
        console,
        internal_tx,
        views: view_tx,
    };
    let handle = tokio::spawn(runtime.run(command_rx, channel_rx, internal_rx));
    (ConsoleHandle { commands: command_tx, views: view_rx }, handle)
}

// =============================================================================
// LOOP
// =============================================================================

struct Runtime {
    config: ConsoleConfig,
    api: Arc<dyn StageApi>,
    console: Console,
    admin: ChannelConnection,
    transcript: ChannelConnection,
    internal_tx: mpsc::UnboundedSender<ConsoleEvent>,
    views: watch::Sender<ConsoleView>,
    search: Debouncer<String>,
}

impl Runtime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
        mut internal_events: mpsc::UnboundedReceiver<ConsoleEvent>,
    ) {
        info!(ws = %self.config.ws_url, api = %self.config.api_url, "console: starting");
        self.refresh();
        self.connect(ChannelTarget::Admin).await;
        self.publish();

        loop {
            let debounce_at = self.search.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = channel_events.recv() => self.handle_channel_event(event),
                Some(event) = internal_events.recv() => self.handle_internal(event).await,
                () = wait_until(debounce_at) => {
                    if let Some(search) = self.search.take_due(Instant::now()) {
                        self.console.set_search(&search);
                    }
                }
            }
            self.publish();
        }

        self.admin.disconnect().await;
        self.transcript.disconnect().await;
        info!("console: stopped");
    }

    fn publish(&mut self) {
        if let Some(view) = self.console.view_if_changed() {
            self.views.send_replace(view);
        }
    }

    fn connection(&self, kind: ChannelKind) -> &ChannelConnection {
        match kind {
            ChannelKind::Admin => &self.admin,
            ChannelKind::Transcript => &self.transcript,
        }
    }

    fn connection_mut(&mut self, kind: ChannelKind) -> &mut ChannelConnection {
        match kind {
            ChannelKind::Admin => &mut self.admin,
            ChannelKind::Transcript => &mut self.transcript,
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, "console: command");
        match command {
            Command::Refresh => self.refresh(),
            Command::Toggle(stage) => {
                if !self.console.toggle(&stage) {
                    info!(%stage, "console: stage is not selectable");
                }
            }
            Command::ToggleAll => {
                self.console.toggle_all();
            }
            Command::ClearSelection => {
                self.console.clear_selection();
            }
            Command::Search(text) => self.search.schedule(text, Instant::now()),
            Command::Locations(locations) => {
                self.console.set_locations(locations);
            }
            Command::Bulk(action) => self.bulk(action),
            Command::SetAutoAv { stage, enabled } => self.set_auto_av(stage, enabled),
            Command::ExpandSessions(stage) => self.fetch_sessions(stage),
            Command::ClearSessions(stage) => {
                self.console.clear_sessions(&stage);
            }
            Command::WatchTranscript(stage) => self.watch_transcript(stage).await,
            Command::Retry => self.retry().await,
            Command::Shutdown => {}
        }
    }

    fn refresh(&mut self) {
        let event_name = match self.config.event_name() {
            Ok(name) => name.to_owned(),
            Err(e) => {
                self.console.fail_refresh(&e);
                return;
            }
        };
        if !self.console.begin_refresh() {
            debug!("console: stage fetch already in flight");
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_stages(&event_name).await;
            post(&tx, ConsoleEvent::StagesFetched(result));
        });
    }

    fn bulk(&mut self, action: BulkAction) {
        let targets = self.console.bulk_targets(action);
        if targets.is_empty() {
            info!(%action, "console: no eligible stages in selection");
            return;
        }
        let event_name = match self.config.event_name() {
            Ok(name) => name.to_owned(),
            Err(e) => {
                warn!(%action, error = %e, "console: bulk action needs an event");
                for target in &targets {
                    self.console.apply_bulk_result(action, target, Err(ConsoleError::MissingEventContext));
                }
                return;
            }
        };
        info!(%action, targets = targets.len(), "console: running bulk action");
        for target in targets {
            let api = Arc::clone(&self.api);
            let tx = self.internal_tx.clone();
            let event_name = event_name.clone();
            tokio::spawn(async move {
                let result = run_bulk_action(api.as_ref(), &event_name, action, &target).await;
                post(&tx, ConsoleEvent::BulkDone { action, target, result });
            });
        }
    }

    fn set_auto_av(&mut self, stage: StageId, enabled: bool) {
        let event_name = match self.config.event_name() {
            Ok(name) => name.to_owned(),
            Err(e) => {
                self.console.apply_auto_av_result(&stage, enabled, Err(e));
                return;
            }
        };
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.set_auto_av(&event_name, &stage, enabled).await;
            post(&tx, ConsoleEvent::AutoAvDone { stage, enabled, result });
        });
    }

    fn fetch_sessions(&mut self, stage: StageId) {
        if !self.console.begin_session_fetch(&stage) {
            debug!(%stage, "console: sessions cached or already loading");
            return;
        }
        let event_name = match self.config.event_name() {
            Ok(name) => name.to_owned(),
            Err(e) => {
                self.console.complete_session_fetch(&stage, Err(e));
                return;
            }
        };
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_sessions(&event_name, &stage).await;
            post(&tx, ConsoleEvent::SessionsFetched { stage, result });
        });
    }

    /// Point the transcript channel at `stage`. The previous socket is fully
    /// closed before the new one is opened.
    async fn watch_transcript(&mut self, stage: Option<StageId>) {
        self.console.set_transcript_stage(stage.clone());
        match stage {
            Some(stage) => self.connect(ChannelTarget::Transcript { stage }).await,
            None => {
                self.transcript.disconnect().await;
                self.console.router_mut(ChannelKind::Transcript).reset();
            }
        }
    }

    async fn retry(&mut self) {
        if self.console.stages().error().is_some() {
            self.refresh();
        }
        for kind in [ChannelKind::Admin, ChannelKind::Transcript] {
            if self.console.router(kind).status() != ConnectionStatus::Error {
                continue;
            }
            let router = self.console.router_mut(kind);
            let target = router.rearm().or_else(|| (kind == ChannelKind::Admin).then_some(ChannelTarget::Admin));
            if let Some(target) = target {
                info!(channel = %kind, "console: manual retry");
                self.connect(target).await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Subscribe to `target` unless already connecting/connected to it.
    async fn connect(&mut self, target: ChannelTarget) {
        if self.console.router_mut(target.kind()).begin_connect(&target) {
            self.open_socket(target).await;
        }
    }

    async fn open_socket(&mut self, target: ChannelTarget) {
        let kind = target.kind();
        let params = match self.connect_params(target) {
            Ok(params) => params,
            Err(e) => {
                warn!(channel = %kind, error = %e, "console: cannot connect");
                self.connection_mut(kind).disconnect().await;
                self.console.router_mut(kind).fail(&e);
                return;
            }
        };
        let result = self.connection_mut(kind).connect(params).await;
        if let Err(e) = result {
            self.console.router_mut(kind).fail(&e);
        }
    }

    fn connect_params(&self, target: ChannelTarget) -> Result<ConnectParams, ConsoleError> {
        Ok(ConnectParams {
            target,
            ws_url: self.config.ws_url.clone(),
            event_name: self.config.event_name()?.to_owned(),
            token: self.config.token()?.to_owned(),
            keepalive: self.config.keepalive,
            handshake_timeout: self.config.request_timeout,
        })
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        let ChannelEvent { kind, generation, payload } = event;
        match payload {
            ChannelPayload::Opened => {
                if self.connection_mut(kind).on_opened(generation) {
                    self.console.router_mut(kind).on_open();
                }
            }
            ChannelPayload::Frame(text) => {
                if self.connection(kind).is_current(generation) {
                    self.console.on_frame(kind, &text);
                } else {
                    debug!(channel = %kind, generation, "console: dropping frame from stale socket");
                }
            }
            ChannelPayload::Closed(reason) => {
                if !self.connection_mut(kind).on_closed(generation, reason.as_deref()) {
                    debug!(channel = %kind, generation, "console: stale close ignored");
                    return;
                }
                if let RetryDecision::Retry { delay, .. } =
                    self.console.router_mut(kind).on_connection_lost(reason.as_deref())
                {
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        post(&tx, ConsoleEvent::RetryDue { kind, generation });
                    });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Task results
    // -------------------------------------------------------------------------

    async fn handle_internal(&mut self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::StagesFetched(Ok(stages)) => {
                self.console.replace_stages(stages);
            }
            ConsoleEvent::StagesFetched(Err(e)) => self.console.fail_refresh(&e),
            ConsoleEvent::SessionsFetched { stage, result } => self.console.complete_session_fetch(&stage, result),
            ConsoleEvent::BulkDone { action, target, result } => self.console.apply_bulk_result(action, &target, result),
            ConsoleEvent::AutoAvDone { stage, enabled, result } => {
                self.console.apply_auto_av_result(&stage, enabled, result);
            }
            ConsoleEvent::RetryDue { kind, generation } => {
                if self.connection(kind).generation() != generation {
                    debug!(channel = %kind, generation, "console: retry cancelled");
                    return;
                }
                let Some(target) = self.console.router(kind).target().cloned() else {
                    return;
                };
                self.connect(target).await;
            }
        }
    }
}

fn post(tx: &mpsc::UnboundedSender<ConsoleEvent>, event: ConsoleEvent) {
    if tx.send(event).is_err() {
        debug!("console: loop stopped; dropping task result");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "runtime_test.rs"]
mod runtime_test;
