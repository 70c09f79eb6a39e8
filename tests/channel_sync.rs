//! End-to-end channel behavior against a local WebSocket server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

use stagesync::config::ConsoleConfig;
use stagesync::console::ConsoleView;
use stagesync::error::ConsoleError;
use stagesync::net::api::StageApi;
use stagesync::net::router::ConnectionStatus;
use stagesync::net::types::{SessionSummary, Stage, StageStatus};
use stagesync::runtime::{self, Command, ConsoleHandle};

const TOKEN: &str = "secret-token";
const KICK: &str = "__close__";

// =============================================================================
// FAKE PUSH SERVER
// =============================================================================

#[derive(Default)]
struct Recorded {
    uris: Vec<String>,
    protocols: Vec<String>,
    frames: Vec<String>,
}

struct Shared {
    recorded: Mutex<Recorded>,
    live_transcript: AtomicUsize,
    max_transcript: AtomicUsize,
    push: broadcast::Sender<(String, String)>,
}

struct FakeServer {
    url: String,
    shared: Arc<Shared>,
}

impl FakeServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (push, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            recorded: Mutex::new(Recorded::default()),
            live_transcript: AtomicUsize::new(0),
            max_transcript: AtomicUsize::new(0),
            push,
        });
        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_socket(stream, Arc::clone(&accept_shared)));
            }
        });
        Self { url, shared }
    }

    /// Send `text` to every socket whose URI contains `filter`.
    fn push(&self, filter: &str, text: &str) {
        self.shared.push.send((filter.to_owned(), text.to_owned())).unwrap();
    }

    fn uris_containing(&self, needle: &str) -> usize {
        self.shared.recorded.lock().unwrap().uris.iter().filter(|u| u.contains(needle)).count()
    }

    fn frames(&self) -> Vec<String> {
        self.shared.recorded.lock().unwrap().frames.clone()
    }
}

async fn serve_socket(stream: TcpStream, shared: Arc<Shared>) {
    let mut pushes = shared.push.subscribe();
    let mut uri = String::new();
    let callback = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        uri = req.uri().to_string();
        if let Some(protocol) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            let value = protocol.to_str().unwrap_or_default().to_owned();
            shared.recorded.lock().unwrap().protocols.push(value);
            resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let transcript = uri.contains("stage=");
    if transcript {
        let now = shared.live_transcript.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_transcript.fetch_max(now, Ordering::SeqCst);
    }
    shared.recorded.lock().unwrap().uris.push(uri.clone());

    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    shared.recorded.lock().unwrap().frames.push(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            pushed = pushes.recv() => {
                let Ok((filter, text)) = pushed else { continue };
                if !uri.contains(&filter) {
                    continue;
                }
                if text == KICK {
                    let _ = ws.close(None).await;
                    break;
                }
                if ws.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    if transcript {
        shared.live_transcript.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// HARNESS
// =============================================================================

struct FixedStages(Vec<Stage>);

#[async_trait::async_trait]
impl StageApi for FixedStages {
    async fn fetch_stages(&self, _event_name: &str) -> Result<Vec<Stage>, ConsoleError> {
        Ok(self.0.clone())
    }

    async fn fetch_sessions(&self, _event_name: &str, _stage: &str) -> Result<Vec<SessionSummary>, ConsoleError> {
        Ok(Vec::new())
    }

    async fn start_listening(&self, _: &str, _: &str, _: &str) -> Result<(), ConsoleError> {
        Ok(())
    }

    async fn pause_listening(&self, _: &str, _: &str, _: &str) -> Result<(), ConsoleError> {
        Ok(())
    }

    async fn end_listening(&self, _: &str, _: &str, _: &str) -> Result<(), ConsoleError> {
        Ok(())
    }

    async fn set_auto_av(&self, _: &str, _: &str, _: bool) -> Result<(), ConsoleError> {
        Ok(())
    }
}

fn online(id: &str) -> Stage {
    Stage {
        id: id.to_owned(),
        name: format!("Stage {id}"),
        is_online: true,
        status: StageStatus::Online,
        current_session_id: Some(format!("session-{id}")),
        ..Stage::default()
    }
}

fn start_console(server: &FakeServer) -> (ConsoleHandle, tokio::task::JoinHandle<()>) {
    let mut config = ConsoleConfig::new(&server.url, "http://127.0.0.1:1/api").unwrap();
    config.event_name = Some("summit".to_owned());
    config.token = Some(TOKEN.to_owned());
    let api = Arc::new(FixedStages(vec![online("A"), online("B"), online("C")]));
    runtime::spawn(config, api)
}

async fn wait_for_view(handle: &ConsoleHandle, pred: impl FnMut(&ConsoleView) -> bool) -> ConsoleView {
    let mut views = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(10), async { views.wait_for(pred).await.map(|v| v.clone()) })
        .await
        .expect("timed out waiting for view")
        .expect("console stopped")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met in time");
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn admin_channel_handshake_replay_and_push() {
    let server = FakeServer::start().await;
    let (handle, task) = start_console(&server);

    wait_for_view(&handle, |v| v.admin.status == ConnectionStatus::Connected && v.total_stages == 3).await;
    eventually(|| !server.frames().is_empty()).await;

    {
        let recorded = server.shared.recorded.lock().unwrap();
        assert_eq!(recorded.protocols, vec![TOKEN.to_owned()]);
        assert!(recorded.uris[0].contains("eventName=summit"));
        assert!(recorded.uris[0].contains("cms=true"));
    }
    let first: serde_json::Value = serde_json::from_str(&server.frames()[0]).unwrap();
    assert_eq!(first["event"], "getLastEvent");
    assert_eq!(first["client"], true);
    assert_eq!(first["cms"], true);
    assert_eq!(first["eventName"], "summit");

    handle.send(Command::Toggle("A".to_owned()));
    wait_for_view(&handle, |v| v.selected == vec!["A".to_owned()]).await;

    server.push("cms=true", r#"{"eventType":"STAGE_STATUS_UPDATED","stage":"A","status":"OFFLINE"}"#);
    let view = wait_for_view(&handle, |v| v.row("A").is_some_and(|row| !row.is_online)).await;
    assert!(view.selected.is_empty());
    assert!(view.row("B").unwrap().is_online);

    server.push("cms=true", "{broken");
    wait_for_view(&handle, |v| v.protocol_error.is_some()).await;
    server.push("cms=true", r#"{"eventType":"SET_AUTOAV_SETUP","stage":"B","autoAv":true}"#);
    let view = wait_for_view(&handle, |v| v.row("B").is_some_and(|row| row.auto_av)).await;
    assert_eq!(view.protocol_error, None);
    assert_eq!(view.admin.status, ConnectionStatus::Connected);

    handle.send(Command::Shutdown);
    task.await.unwrap();
}

#[tokio::test]
async fn switching_transcript_stage_keeps_one_socket() {
    let server = FakeServer::start().await;
    let (handle, task) = start_console(&server);
    wait_for_view(&handle, |v| v.total_stages == 3).await;

    for stage in ["A", "B", "C"] {
        handle.send(Command::WatchTranscript(Some(stage.to_owned())));
        wait_for_view(&handle, |v| {
            v.transcript.stage.as_deref() == Some(stage) && v.transcript.channel.status == ConnectionStatus::Connected
        })
        .await;
    }
    eventually(|| server.uris_containing("stage=C") == 1).await;
    assert_eq!(server.shared.max_transcript.load(Ordering::SeqCst), 1);

    let line = r#"{"eventType":"SESSION_LIVE_TRANSCRIPT","stage":"C","sessionId":"session-C",
        "payload":{"transcript":"welcome","timestamp":1700000000000,"eventName":"summit","stage":"C"}}"#;
    server.push("stage=C", line);
    server.push("stage=C", line);
    let view = wait_for_view(&handle, |v| v.transcript.lines >= 1).await;
    assert_eq!(view.transcript.text, "welcome");

    handle.send(Command::WatchTranscript(None));
    eventually(|| server.shared.live_transcript.load(Ordering::SeqCst) == 0).await;
    let view = wait_for_view(&handle, |v| v.transcript.stage.is_none()).await;
    assert_eq!(view.transcript.lines, 0);
    assert_eq!(view.transcript.channel.status, ConnectionStatus::Disconnected);

    handle.send(Command::Shutdown);
    task.await.unwrap();
}

#[tokio::test]
async fn dropped_admin_socket_reconnects_after_backoff() {
    let server = FakeServer::start().await;
    let (handle, task) = start_console(&server);
    wait_for_view(&handle, |v| v.admin.status == ConnectionStatus::Connected).await;

    server.push("cms=true", KICK);
    eventually(|| server.uris_containing("cms=true") == 2).await;
    wait_for_view(&handle, |v| v.admin.status == ConnectionStatus::Connected).await;

    server.push("cms=true", r#"{"eventType":"SESSION_LIVE_LISTENING","stage":"C","sessionId":"session-C"}"#);
    let view = wait_for_view(&handle, |v| v.row("C").is_some_and(|row| row.controls.stop_enabled)).await;
    assert_eq!(view.admin.error, None);

    handle.send(Command::Shutdown);
    task.await.unwrap();
}
