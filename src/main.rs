use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};

use stagesync::config::{
    ConfigError, ConsoleConfig, ENV_API_URL, ENV_EVENT_NAME, ENV_KEEPALIVE_SECS, ENV_REQUEST_TIMEOUT_SECS,
    ENV_SEARCH_DEBOUNCE_MS, ENV_TOKEN, ENV_WS_URL,
};
use stagesync::console::{ConsoleView, StageRow};
use stagesync::error::ConsoleError;
use stagesync::net::api::{HttpStageApi, StageApi, run_bulk_action};
use stagesync::runtime::{self, Command as ConsoleCommand};
use stagesync::state::stages::StageSnapshot;
use stagesync::util::bulk_actions::{BulkAction, compute_targets};
use stagesync::util::stage_controls::{ControlIcon, StageControls};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Console(#[from] ConsoleError),
    #[error("stdio failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("none of the given stages accept {0} right now")]
    NoTargets(BulkAction),
    #[error("{failed} of {total} stages rejected the action")]
    ActionFailed { failed: usize, total: usize },
    #[error("console task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Flags override the matching `STAGESYNC_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "stagesync", about = "Stage/session sync console")]
struct Cli {
    /// Push channel base URL (`STAGESYNC_WS_URL`).
    #[arg(long)]
    ws_url: Option<String>,

    /// REST base URL (`STAGESYNC_API_URL`).
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    event_name: Option<String>,

    #[arg(long)]
    token: Option<String>,

    #[arg(long)]
    keepalive_secs: Option<u64>,

    #[arg(long)]
    search_debounce_ms: Option<u64>,

    #[arg(long)]
    request_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the stage list once and print it.
    Stages,
    /// Run the live console; reads commands from stdin, one per line.
    Watch {
        /// Stage whose live transcript to follow from the start.
        #[arg(long)]
        transcript: Option<String>,
    },
    /// Send start/pause/end to the given stages.
    Act {
        action: BulkAction,
        #[arg(required = true)]
        stages: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> Result<ConsoleConfig, ConfigError> {
        ConsoleConfig::from_env(&[
            (ENV_WS_URL, self.ws_url.clone()),
            (ENV_API_URL, self.api_url.clone()),
            (ENV_EVENT_NAME, self.event_name.clone()),
            (ENV_TOKEN, self.token.clone()),
            (ENV_KEEPALIVE_SECS, self.keepalive_secs.map(|v| v.to_string())),
            (ENV_SEARCH_DEBOUNCE_MS, self.search_debounce_ms.map(|v| v.to_string())),
            (ENV_REQUEST_TIMEOUT_SECS, self.request_timeout_secs.map(|v| v.to_string())),
        ])
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let api = HttpStageApi::new(&config)?;

    match cli.command {
        Command::Stages => run_stages(&config, &api).await,
        Command::Watch { transcript } => run_watch(config, Arc::new(api), transcript).await,
        Command::Act { action, stages } => run_act(&config, &api, action, &stages).await,
    }
}

async fn run_stages(config: &ConsoleConfig, api: &HttpStageApi) -> Result<(), CliError> {
    let stages = api.fetch_stages(config.event_name()?).await?;
    let snapshot = StageSnapshot::from_stages(stages);
    let mut out = std::io::stdout().lock();
    for stage in snapshot.iter() {
        let status = format!("{:?}", stage.status);
        let action = stage.current_action.map_or_else(|| "-".to_owned(), |a| format!("{a:?}"));
        writeln!(
            out,
            "{:<12} {:<28} {:<26} {:<10} {:<30} {}{}",
            stage.id,
            stage.name,
            status,
            stage.current_session_id.as_deref().unwrap_or("-"),
            action,
            controls_label(StageControls::for_stage(stage)),
            if stage.auto_av { " autoAV" } else { "" },
        )?;
    }
    Ok(())
}

async fn run_act(
    config: &ConsoleConfig,
    api: &HttpStageApi,
    action: BulkAction,
    stage_ids: &[String],
) -> Result<(), CliError> {
    let event_name = config.event_name()?;
    let snapshot = StageSnapshot::from_stages(api.fetch_stages(event_name).await?);
    let targets = compute_targets(stage_ids.iter().map(String::as_str), action, &snapshot);
    if targets.is_empty() {
        return Err(CliError::NoTargets(action));
    }

    let results = join_all(targets.iter().map(|target| run_bulk_action(api, event_name, action, target))).await;
    let mut failed = 0;
    for (target, result) in targets.iter().zip(&results) {
        match result {
            Ok(()) => println!("{action} {}: ok", target.stage),
            Err(e) => {
                failed += 1;
                eprintln!("{action} {}: {e}", target.stage);
            }
        }
    }
    if failed > 0 {
        return Err(CliError::ActionFailed { failed, total: targets.len() });
    }
    Ok(())
}

async fn run_watch(config: ConsoleConfig, api: Arc<dyn StageApi>, transcript: Option<String>) -> Result<(), CliError> {
    let (handle, task) = runtime::spawn(config, api);
    if transcript.is_some() {
        handle.send(ConsoleCommand::WatchTranscript(transcript));
    }

    let input = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                    Ok(command) => {
                        // Stop reading after quit so runtime shutdown never waits on stdin.
                        let quit = command == ConsoleCommand::Shutdown;
                        if !input.send(command) || quit {
                            return;
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    eprintln!("stdin: {e}");
                    break;
                }
            }
        }
        input.send(ConsoleCommand::Shutdown);
    });

    let mut views = handle.subscribe();
    drop(handle);
    print_view(&views.borrow_and_update().clone())?;
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        print_view(&view)?;
    }
    task.await?;
    Ok(())
}

fn print_view(view: &ConsoleView) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "-- admin: {:?}{} | stages {}/{} | selected {}{}{}",
        view.admin.status,
        view.admin.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default(),
        view.rows.len(),
        view.total_stages,
        view.selected.len(),
        if view.select_all.all_selected { " [all]" } else { "" },
        if view.select_all.indeterminate { " [partial]" } else { "" },
    )?;
    if view.loading {
        writeln!(out, "   loading stages...")?;
    }
    for message in [&view.error, &view.protocol_error].into_iter().flatten() {
        writeln!(out, "   error: {message}")?;
    }
    for row in &view.rows {
        print_row(&mut out, row, view.show_location_column)?;
    }
    if let Some(stage) = &view.transcript.stage {
        writeln!(
            out,
            "   transcript {stage}: {:?}, {} lines{}",
            view.transcript.channel.status,
            view.transcript.lines,
            view.transcript.channel.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default(),
        )?;
        if let Some(last) = view.transcript.text.lines().last() {
            writeln!(out, "   > {last}")?;
        }
    }
    Ok(())
}

fn print_row(out: &mut impl Write, row: &StageRow, show_location: bool) -> std::io::Result<()> {
    let mark = match (row.selected, row.selectable) {
        (true, _) => "[x]",
        (false, true) => "[ ]",
        (false, false) => " - ",
    };
    let location = if show_location { row.location.as_deref().unwrap_or("-") } else { "" };
    let status = format!("{:?}", row.status);
    write!(
        out,
        "   {mark} {:<12} {:<24} {:<12} {:<26} {}",
        row.id,
        row.name,
        location,
        status,
        controls_label(row.controls),
    )?;
    if row.auto_av {
        write!(out, " autoAV")?;
    }
    if row.sessions_loading {
        write!(out, " (loading sessions)")?;
    } else if !row.sessions.is_empty() {
        write!(out, " ({} sessions)", row.sessions.len())?;
    }
    for error in [&row.session_error, &row.action_error].into_iter().flatten() {
        write!(out, " !{error}")?;
    }
    writeln!(out)
}

fn controls_label(controls: StageControls) -> String {
    let primary = match controls.primary_icon {
        ControlIcon::Start => "start",
        ControlIcon::Pause => "pause",
        ControlIcon::Resume => "resume",
    };
    format!(
        "{}{} {}",
        primary,
        if controls.primary_enabled { "" } else { "(off)" },
        if controls.stop_enabled { "stop" } else { "stop(off)" },
    )
}
