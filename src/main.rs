// tabchat - Tab-scoped AI chat client with streaming response orchestration
// Copyright (C) 2025  Simon Peter Rothgang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use futures::FutureExt as _;
use std::fs::OpenOptions;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tabchat::Cli;
use tabchat::agent::bridge::{ProducerLauncher, resolve_producer_launcher};
use tabchat::agent::client::{BridgeConnection, connect};
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::{ChatHub, Collaborators, FrameClock, Handled};
use tabchat::config::ChatConfig;
use tabchat::error::{AppError, ChatError};
use tabchat::history::FileHistoryStore;
use tabchat::tokenizer::HeuristicTokenizer;
use tabchat::ui::TranscriptView;
use tokio::io::{AsyncBufReadExt as _, BufReader};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const HELP: &str = "commands: /cancel, /rerun <n>, /edit <n> <text>, /page <file>, /usage, \
/clear, /quit. Ctrl+C cancels a streaming reply.";

#[allow(clippy::exit)]
fn main() {
    if let Err(err) = run() {
        if let Some(app_error) = extract_app_error(&err) {
            eprintln!("{}", app_error.user_message());
            eprintln!("{err:#}");
            std::process::exit(app_error.exit_code());
        }
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = ChatConfig::load(&cli)?;
    let resolve_started = Instant::now();
    let launcher = resolve_producer_launcher(config.producer.as_deref(), &config.producer_args)?;
    tracing::info!(
        "Resolved producer launcher in {:?}: {}",
        resolve_started.elapsed(),
        launcher.describe()
    );
    let history = FileHistoryStore::open(&config.history_dir).map_err(|e| {
        tracing::error!("{e}");
        anyhow::Error::new(AppError::HistoryUnavailable)
    })?;

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local_set = tokio::task::LocalSet::new();
    rt.block_on(local_set.run_until(run_chat(cli.tab, config, launcher, history)))
}

async fn run_chat(
    tab: String,
    config: ChatConfig,
    launcher: ProducerLauncher,
    history: FileHistoryStore,
) -> anyhow::Result<()> {
    let BridgeConnection { transport, mut events, mut task } = connect(&launcher)
        .map_err(|e| {
            tracing::error!("{e:#}");
            anyhow::Error::new(AppError::ProducerCrashed)
        })?;
    let transport = Rc::new(transport);
    let collaborators = Collaborators {
        transport: Rc::clone(&transport) as Rc<dyn tabchat::agent::transport::Transport>,
        history: Rc::new(history),
        tokenizer: Rc::new(HeuristicTokenizer),
    };
    let mut hub = ChatHub::new(collaborators, config.model.clone());
    let mut view = TranscriptView::stdout();
    hub.tab(&tab).await;
    view.notice(&format!("tab `{tab}` on model `{}`. {HELP}", config.model.model))?;
    render(&hub, &tab, &mut view)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut clock = FrameClock::new(config.frame_interval);
    let mut stdin_open = true;
    let mut producer_alive = true;
    let mut should_quit = false;

    loop {
        // Phase 1: wait for at least one event or the next frame tick
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => should_quit = handle_line(&mut hub, &tab, &mut view, &line).await?,
                None => stdin_open = false,
            },
            Some(event) = events.recv() => dispatch(&mut hub, event).await,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if hub.is_processing() {
                    let cancelled = hub.cancel_all().await;
                    tracing::info!("Ctrl+C cancelled {} stream(s)", cancelled.len());
                } else {
                    should_quit = true;
                }
            }
            status = &mut task, if producer_alive => {
                producer_alive = false;
                match status {
                    Ok(Ok(status)) => view.notice(&format!("producer exited ({status})"))?,
                    Ok(Err(e)) => view.notice(&format!("producer failed: {e:#}"))?,
                    Err(e) => view.notice(&format!("producer task failed: {e}"))?,
                }
            }
            () = clock.tick() => {}
        }

        // Phase 2: drain all remaining queued events (non-blocking)
        loop {
            if stdin_open && !should_quit {
                match lines.next_line().now_or_never() {
                    Some(Ok(Some(line))) => {
                        should_quit = handle_line(&mut hub, &tab, &mut view, &line).await?;
                        continue;
                    }
                    Some(Ok(None)) => stdin_open = false,
                    Some(Err(e)) => return Err(e.into()),
                    None => {}
                }
            }
            match events.try_recv() {
                Ok(event) => dispatch(&mut hub, event).await,
                Err(_) => break,
            }
        }

        // Phase 3: commit and render once
        hub.on_frame();
        render(&hub, &tab, &mut view)?;

        if should_quit || (!stdin_open && !hub.is_processing()) {
            break;
        }
    }

    // --- Graceful shutdown ---
    hub.cancel_all().await;
    render(&hub, &tab, &mut view)?;
    if producer_alive {
        if let Err(e) = transport.shutdown() {
            tracing::debug!("producer already gone: {e}");
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(Ok(status))) => tracing::info!("producer exited with {status}"),
            Ok(Ok(Err(e))) => tracing::warn!("producer shutdown failed: {e:#}"),
            Ok(Err(e)) => tracing::warn!("producer task failed: {e}"),
            Err(_) => tracing::warn!("producer did not exit within {SHUTDOWN_GRACE:?}"),
        }
    }
    Ok(())
}

async fn dispatch(hub: &mut ChatHub, event: ChunkEvent) {
    match hub.dispatch(event).await {
        Ok(Some((tab_id, Handled::Finalized(outcome)))) => {
            tracing::debug!("Tab {tab_id} finalized: {outcome:?}");
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Failed to handle producer event: {e}"),
    }
}

type View = TranscriptView<std::io::Stdout>;

fn render(hub: &ChatHub, tab: &str, view: &mut View) -> anyhow::Result<()> {
    if let Some(controller) = hub.get(tab) {
        view.render(controller.visible_turns())?;
    }
    Ok(())
}

/// Run one line of user input. Returns whether the user asked to quit.
async fn handle_line(
    hub: &mut ChatHub,
    tab: &str,
    view: &mut View,
    line: &str,
) -> anyhow::Result<bool> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }
    let Some(command) = line.strip_prefix('/') else {
        report(view, hub.send(tab, line).await.map(drop))?;
        return Ok(false);
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "quit" | "exit" => return Ok(true),
        "help" => view.notice(HELP)?,
        "cancel" => {
            let outcome = hub.cancel(tab).await.map(drop);
            report(view, outcome)?;
        }
        "rerun" => match resolve_turn(view, rest) {
            Ok(turn_id) => report(view, hub.rerun(tab, &turn_id).await.map(drop))?,
            Err(msg) => view.notice(&msg)?,
        },
        "edit" => {
            let (number, text) = rest.split_once(' ').unwrap_or((rest, ""));
            match resolve_turn(view, number) {
                Ok(turn_id) => {
                    let result = hub.edit_and_rerun(tab, &turn_id, text).await.map(drop);
                    report(view, result)?;
                }
                Err(msg) => view.notice(&msg)?,
            }
        }
        "page" => match tokio::fs::read_to_string(rest).await {
            Ok(content) => {
                hub.tab(tab).await.queue_extracted_content(content);
                view.notice(&format!("page content from {rest} queued for the next message"))?;
            }
            Err(e) => view.notice(&format!("cannot read {rest}: {e}"))?,
        },
        "usage" => {
            let controller = hub.tab(tab).await;
            let (usage, context) = (controller.usage(), controller.context_status());
            view.usage(usage, context)?;
        }
        "clear" => {
            let result = hub.clear_tab(tab).await;
            view.reset();
            report(view, result)?;
            view.notice("conversation cleared")?;
        }
        other => view.notice(&format!("unknown command /{other}. {HELP}"))?,
    }
    Ok(false)
}

/// Map a turn number as printed on screen to a turn id.
fn resolve_turn(view: &View, number: &str) -> Result<String, String> {
    let n: usize = number.parse().map_err(|_| format!("expected a turn number, got `{number}`"))?;
    view.turn_at(n).map(str::to_owned).ok_or_else(|| format!("no turn #{n}"))
}

fn report(view: &mut View, result: Result<(), ChatError>) -> anyhow::Result<()> {
    if let Err(e) = result {
        view.notice(&e.to_string())?;
    }
    Ok(())
}

fn extract_app_error(err: &anyhow::Error) -> Option<AppError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AppError>().cloned())
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let Some(path) = cli.log_file.as_ref() else {
        if std::env::var_os("RUST_LOG").is_some() {
            eprintln!(
                "RUST_LOG is set, but tracing is disabled without --log-file <PATH>. \
Use --log-file to enable diagnostics."
            );
        }
        return Ok(());
    };

    let directives = cli
        .log_filter
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_owned());
    let filter = tracing_subscriber::EnvFilter::try_new(directives.as_str())
        .map_err(|e| anyhow::anyhow!("invalid tracing filter `{directives}`: {e}"))?;

    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if cli.log_append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    let file = options
        .open(path)
        .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))?;

    tracing::info!(
        target: "diagnostics",
        version = env!("CARGO_PKG_VERSION"),
        log_file = %path.display(),
        log_filter = %directives,
        log_append = cli.log_append,
        "tracing enabled"
    );

    Ok(())
}
