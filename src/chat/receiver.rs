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

use super::session::StreamSession;
use super::turn::StreamId;
use crate::agent::wire::ChunkEvent;
use crate::error::ChatError;

/// Appended to the content of every cancelled response before token estimation.
pub const CANCEL_SUFFIX: &str = "\n\n_Stream cancelled by user._";

/// How a stream ended, with its final content already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed { content: String, model: Option<String> },
    Errored { message: String },
    Cancelled { content: String, model: Option<String> },
}

impl TerminalOutcome {
    /// Cancelled outcome built from `content` plus [`CANCEL_SUFFIX`].
    #[must_use]
    pub fn cancelled(mut content: String, model: Option<String>) -> Self {
        content.push_str(CANCEL_SUFFIX);
        Self::Cancelled { content, model }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Errored { .. } => "errored",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Not for the subscribed stream (stale, duplicate terminal, or no subscription).
    Ignored,
    Malformed(&'static str),
    /// Delta appended to the session buffer.
    Appended,
    Terminal(TerminalOutcome),
}

/// Accepts events for exactly one stream id at a time.
#[derive(Debug, Default)]
pub struct StreamReceiver {
    subscribed: Option<StreamId>,
}

impl StreamReceiver {
    pub fn subscribe(&mut self, stream_id: StreamId) {
        if let Some(previous) = self.subscribed.replace(stream_id) {
            tracing::warn!("Receiver resubscribed while still attached to stream {previous}");
        }
    }

    pub fn unsubscribe(&mut self) {
        self.subscribed = None;
    }

    #[must_use]
    pub fn subscribed(&self) -> Option<&str> {
        self.subscribed.as_deref()
    }

    /// Route one inbound event into `session`.
    pub fn route(&mut self, session: &mut StreamSession, mut event: ChunkEvent) -> Routed {
        let terminal = event.is_terminal();
        if self.subscribed.as_deref() != Some(event.stream_id.as_str())
            || session.stream_id() != event.stream_id
        {
            tracing::debug!(
                "Dropping event for unsubscribed stream {} (terminal={terminal})",
                event.stream_id
            );
            return Routed::Ignored;
        }

        let chunk = event.chunk.take().filter(|c| !c.is_empty());
        if chunk.is_none() && !terminal {
            let reason = "no content and no terminal marker";
            tracing::warn!("{}", ChatError::MalformedChunk { stream_id: event.stream_id, reason });
            return Routed::Malformed(reason);
        }

        if let Some(model) = event.model.take() {
            session.set_model(model);
        }

        if let Some(chunk) = chunk {
            if !session.append(&chunk) {
                tracing::debug!("Stream {} no longer accepts deltas", event.stream_id);
                return Routed::Ignored;
            }
            if !terminal {
                return Routed::Appended;
            }
        }

        self.unsubscribe();
        let model = session.model().map(str::to_owned);
        let outcome = if let Some(message) = event.error {
            TerminalOutcome::Errored { message }
        } else if event.cancelled {
            let content = event.full_content.unwrap_or_else(|| session.buffer().to_owned());
            TerminalOutcome::cancelled(content, model)
        } else {
            let content = event.full_content.unwrap_or_else(|| session.buffer().to_owned());
            TerminalOutcome::Completed { content, model }
        };
        tracing::debug!("Stream {} reached terminal state: {}", event.stream_id, outcome.label());
        Routed::Terminal(outcome)
    }
}
