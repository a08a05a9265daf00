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

use crate::agent::bridge::ProducerLauncher;
use crate::agent::error_handling::truncate_for_log;
use crate::agent::transport::Transport;
use crate::agent::wire::{
    BridgeCommand, BridgeEvent, ChunkEvent, CommandEnvelope, EventEnvelope, StartStreamRequest,
    StartStreamResponse,
};
use crate::error::TransportError;
use anyhow::Context as _;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Line-oriented JSON connection to the producer process.
pub struct BridgeClient {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: tokio::io::Lines<BufReader<ChildStdout>>,
}

impl BridgeClient {
    pub fn spawn(launcher: &ProducerLauncher) -> anyhow::Result<Self> {
        let mut child = launcher
            .command()
            .spawn()
            .with_context(|| format!("failed to spawn producer process: {}", launcher.describe()))?;

        let stdin = child.stdin.take().context("producer stdin not available")?;
        let stdout = child.stdout.take().context("producer stdout not available")?;
        let stderr = child.stderr.take().context("producer stderr not available")?;
        Self::spawn_stderr_logger(stderr);

        Ok(Self { child, stdin: BufWriter::new(stdin), stdout: BufReader::new(stdout).lines() })
    }

    fn spawn_stderr_logger(stderr: ChildStderr) {
        tokio::task::spawn_local(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => log_producer_stderr_line(&line),
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!("failed to read producer stderr: {err}");
                        break;
                    }
                }
            }
        });
    }

    pub async fn send(&mut self, envelope: &CommandEnvelope) -> anyhow::Result<()> {
        let line =
            serde_json::to_string(envelope).context("failed to serialize producer command")?;
        self.stdin.write_all(line.as_bytes()).await.context("failed to write producer command")?;
        self.stdin.write_all(b"\n").await.context("failed to write producer newline")?;
        self.stdin.flush().await.context("failed to flush producer stdin")?;
        Ok(())
    }

    /// Next decodable event. Lines that are not valid event JSON are logged
    /// and skipped. `None` once the producer closes stdout.
    pub async fn recv(&mut self) -> anyhow::Result<Option<EventEnvelope>> {
        loop {
            let Some(line) =
                self.stdout.next_line().await.context("failed to read producer stdout")?
            else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => {
                    tracing::warn!(
                        "failed to decode producer event ({err}): {}",
                        truncate_for_log(&line)
                    );
                }
            }
        }
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.send(&CommandEnvelope { request_id: None, command: BridgeCommand::Shutdown }).await
    }

    pub async fn wait(mut self) -> anyhow::Result<std::process::ExitStatus> {
        self.child.wait().await.context("failed to wait for producer process")
    }
}

fn log_producer_stderr_line(line: &str) {
    let lower = line.to_ascii_lowercase();
    if lower.starts_with("error") || lower.contains("[error]") || lower.contains("panic") {
        tracing::error!("producer stderr: {line}");
    } else if lower.starts_with("warn") || lower.contains("[warn]") {
        tracing::warn!("producer stderr: {line}");
    } else {
        tracing::debug!("producer stderr: {line}");
    }
}

type PendingStarts = Rc<RefCell<HashMap<String, oneshot::Sender<StartStreamResponse>>>>;

/// [`Transport`] backed by the producer process.
///
/// Commands are queued onto the pump task, so `cancel_stream` never waits on
/// process I/O. Stream-start responses are matched to their request by
/// `requestId`.
#[derive(Clone)]
pub struct BridgeTransport {
    command_tx: mpsc::UnboundedSender<CommandEnvelope>,
    pending: PendingStarts,
}

impl BridgeTransport {
    /// Ask the producer to exit. The pump task finishes once it does.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.enqueue(CommandEnvelope { request_id: None, command: BridgeCommand::Shutdown })
    }

    fn enqueue(&self, envelope: CommandEnvelope) -> Result<(), TransportError> {
        self.command_tx.send(envelope).map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait(?Send)]
impl Transport for BridgeTransport {
    async fn start_stream(
        &self,
        request: StartStreamRequest,
    ) -> Result<StartStreamResponse, TransportError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(request_id.clone(), tx);
        let envelope = CommandEnvelope {
            request_id: Some(request_id.clone()),
            command: BridgeCommand::StartStream(request),
        };
        if let Err(e) = self.enqueue(envelope) {
            self.pending.borrow_mut().remove(&request_id);
            return Err(e);
        }
        rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    fn cancel_stream(&self, stream_id: &str) -> Result<(), TransportError> {
        self.enqueue(CommandEnvelope {
            request_id: None,
            command: BridgeCommand::CancelStream { stream_id: stream_id.to_owned() },
        })
    }
}

/// A running producer: the transport for outbound calls, the channel of
/// inbound chunk events, and the pump task that owns the process.
pub struct BridgeConnection {
    pub transport: BridgeTransport,
    pub events: mpsc::UnboundedReceiver<ChunkEvent>,
    pub task: JoinHandle<anyhow::Result<std::process::ExitStatus>>,
}

/// Spawn the producer and its pump task. Must be called inside a `LocalSet`.
pub fn connect(launcher: &ProducerLauncher) -> anyhow::Result<BridgeConnection> {
    let client = BridgeClient::spawn(launcher)?;
    tracing::info!("Spawned producer: {}", launcher.describe());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (chunk_tx, events) = mpsc::unbounded_channel();
    let pending: PendingStarts = Rc::default();
    let task = tokio::task::spawn_local(pump(client, command_rx, chunk_tx, Rc::clone(&pending)));
    Ok(BridgeConnection { transport: BridgeTransport { command_tx, pending }, events, task })
}

async fn pump(
    mut client: BridgeClient,
    mut command_rx: mpsc::UnboundedReceiver<CommandEnvelope>,
    chunk_tx: mpsc::UnboundedSender<ChunkEvent>,
    pending: PendingStarts,
) -> anyhow::Result<std::process::ExitStatus> {
    let mut router = EventRouter { pending, chunk_tx, open_streams: HashSet::new() };
    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    if let Err(e) = client.shutdown().await {
                        tracing::warn!("failed to send shutdown to producer: {e:#}");
                    }
                    break;
                };
                let is_shutdown = matches!(command.command, BridgeCommand::Shutdown);
                if let Err(e) = client.send(&command).await {
                    tracing::error!("producer command failed: {e:#}");
                    break;
                }
                if is_shutdown {
                    break;
                }
            }
            event = client.recv() => match event {
                Ok(Some(event)) => router.route(event),
                Ok(None) => {
                    tracing::warn!("producer closed stdout");
                    break;
                }
                Err(e) => {
                    tracing::error!("producer read failed: {e:#}");
                    break;
                }
            },
        }
    }
    router.fail_open_streams("producer disconnected");
    client.wait().await
}

/// Delivers decoded producer events to whoever is waiting for them.
struct EventRouter {
    pending: PendingStarts,
    chunk_tx: mpsc::UnboundedSender<ChunkEvent>,
    open_streams: HashSet<String>,
}

impl EventRouter {
    fn route(&mut self, envelope: EventEnvelope) {
        match envelope.event {
            BridgeEvent::StreamStarted(response) => {
                let Some(request_id) = envelope.request_id else {
                    tracing::warn!("stream_started without requestId; dropping");
                    return;
                };
                let Some(tx) = self.pending.borrow_mut().remove(&request_id) else {
                    tracing::warn!("stream_started for unknown request {request_id}");
                    return;
                };
                let stream_id = response.stream_id.clone().filter(|_| response.success);
                if tx.send(response).is_ok() {
                    if let Some(stream_id) = stream_id {
                        self.open_streams.insert(stream_id);
                    }
                } else {
                    tracing::debug!("start request {request_id} was abandoned");
                }
            }
            BridgeEvent::StreamChunk(chunk) => {
                if chunk.is_terminal() {
                    self.open_streams.remove(&chunk.stream_id);
                }
                if self.chunk_tx.send(chunk).is_err() {
                    tracing::debug!("chunk receiver dropped");
                }
            }
        }
    }

    /// Give every stream the producer never finished an error terminal, so
    /// no tab waits forever on a dead process.
    fn fail_open_streams(&mut self, reason: &str) {
        for stream_id in self.open_streams.drain() {
            tracing::warn!("stream {stream_id} lost: {reason}");
            if self.chunk_tx.send(ChunkEvent::error(stream_id.clone(), reason)).is_err() {
                tracing::debug!("chunk receiver dropped before error terminal for {stream_id}");
            }
        }
        self.pending.borrow_mut().clear();
    }
}
