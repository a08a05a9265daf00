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

use super::finalizer::FinalizeOutcome;
use super::receiver::{Routed, StreamReceiver};
use super::scheduler::BatchScheduler;
use super::session::StreamSession;
use super::store;
use super::turn::{ConversationTurn, FinalFields, Role, StreamId, TabId};
use crate::agent::transport::Transport;
use crate::agent::wire::{ChunkEvent, StartStreamRequest, WireMessage};
use crate::config::ModelConfig;
use crate::error::{ChatError, TransportError};
use crate::history::{AccountingBaseline, HistoryStore, TabUsage, compute_usage};
use crate::tokenizer::{ContextStatus, TokenStats, Tokenizer};
use std::rc::Rc;

/// External collaborators shared by every tab.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Rc<dyn Transport>,
    pub history: Rc<dyn HistoryStore>,
    pub tokenizer: Rc<dyn Tokenizer>,
}

/// Result of feeding one inbound event to a tab.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Ignored,
    Malformed(&'static str),
    Appended,
    Finalized(FinalizeOutcome),
}

/// Page content waiting to be folded into the conversation.
#[derive(Debug, Default)]
pub(super) struct ExtractionQueue {
    queued: Option<String>,
    /// Sent with the active request; spliced only when that request ends.
    in_flight: Option<String>,
    inserted: bool,
}

impl ExtractionQueue {
    /// Move queued content onto the request being started.
    pub(super) fn attach(&mut self) -> Option<String> {
        if self.inserted {
            return None;
        }
        self.in_flight = self.queued.take();
        self.in_flight.clone()
    }

    /// The request never started: its content waits for the next one.
    pub(super) fn detach(&mut self) {
        if let Some(content) = self.in_flight.take()
            && self.queued.is_none()
        {
            self.queued = Some(content);
        }
    }

    /// The producer declined the content. Returns whether any was attached.
    pub(super) fn discard_in_flight(&mut self) -> bool {
        self.in_flight.take().is_some()
    }

    /// One-shot: yields the content sent with the ending request, then
    /// nothing until the tab is cleared.
    pub(super) fn take_for_splice(&mut self) -> Option<String> {
        let content = self.in_flight.take()?;
        self.inserted = true;
        self.queued = None;
        Some(content)
    }
}

/// One tab's conversation and the single stream that may be feeding it.
pub struct ConversationController {
    pub(super) tab_id: TabId,
    pub(super) turns: Vec<ConversationTurn>,
    pub(super) session: Option<StreamSession>,
    pub(super) receiver: StreamReceiver,
    pub(super) scheduler: BatchScheduler,
    pub(super) extraction: ExtractionQueue,
    /// Consumed by the next finalization.
    pub(super) baseline: Option<AccountingBaseline>,
    pub(super) usage: TabUsage,
    pub(super) model: ModelConfig,
    pub(super) canceling: bool,
    pub(super) collaborators: Collaborators,
}

impl ConversationController {
    #[must_use]
    pub fn new(tab_id: impl Into<TabId>, model: ModelConfig, collaborators: Collaborators) -> Self {
        Self {
            tab_id: tab_id.into(),
            turns: Vec::new(),
            session: None,
            receiver: StreamReceiver::default(),
            scheduler: BatchScheduler::default(),
            extraction: ExtractionQueue::default(),
            baseline: None,
            usage: TabUsage::default(),
            model,
            canceling: false,
            collaborators,
        }
    }

    /// Load the persisted conversation for this tab, if any.
    pub async fn restore(&mut self) -> Result<(), ChatError> {
        let Some(saved) = self.collaborators.history.get_history(&self.tab_id).await? else {
            return Ok(());
        };
        let mut turns = saved.turns;
        for turn in turns.iter_mut().filter(|t| t.is_streaming) {
            tracing::warn!("Restored turn {} was still streaming; freezing it", turn.id);
            turn.is_streaming = false;
        }
        self.extraction.inserted = turns.iter().any(|t| t.is_extracted_content);
        tracing::info!(
            "Restored {} turns for tab {} (cost={:.6})",
            turns.len(),
            self.tab_id,
            saved.usage.accumulated_cost
        );
        self.turns = turns;
        self.usage = saved.usage;
        Ok(())
    }

    #[must_use]
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Turns the UI should draw. The empty placeholder is left out; the UI
    /// shows a thinking indicator until the first commit.
    pub fn visible_turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().filter(|t| !(t.is_streaming && t.content.is_empty()))
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.session.is_some() || self.turns.last().is_some_and(|t| t.is_streaming)
    }

    #[must_use]
    pub fn is_canceling(&self) -> bool {
        self.canceling
    }

    #[must_use]
    pub fn active_stream_id(&self) -> Option<&str> {
        self.session.as_ref().map(StreamSession::stream_id)
    }

    #[must_use]
    pub fn usage(&self) -> TabUsage {
        self.usage
    }

    #[must_use]
    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    #[must_use]
    pub fn context_status(&self) -> ContextStatus {
        let tokenizer = &self.collaborators.tokenizer;
        let stats = self.turns.iter().fold(TokenStats::default(), |mut acc, t| {
            let n = tokenizer.estimate_tokens(&t.content);
            if t.role == Role::Assistant {
                acc.output_tokens += n;
            } else {
                acc.input_tokens += n;
            }
            acc
        });
        tokenizer.calculate_context_status(stats, &self.model)
    }

    /// Queue page content to be sent with the next request and spliced into
    /// the conversation when that response finishes. Ignored once content
    /// has already been spliced for this tab.
    pub fn queue_extracted_content(&mut self, content: impl Into<String>) {
        if self.extraction.inserted {
            tracing::debug!("Tab {} already carries page content; ignoring", self.tab_id);
            return;
        }
        let content = content.into();
        if content.trim().is_empty() {
            return;
        }
        tracing::info!("Queued {} bytes of page content for tab {}", content.len(), self.tab_id);
        self.extraction.queued = Some(content);
    }

    pub async fn send(&mut self, text: &str) -> Result<StreamId, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.ensure_idle()?;
        let baseline = (!self.usage.is_empty()).then(|| AccountingBaseline::from(self.usage));
        self.start_exchange(text.to_owned(), baseline).await
    }

    pub(super) fn ensure_idle(&self) -> Result<(), ChatError> {
        if self.canceling || self.is_processing() { Err(ChatError::Busy) } else { Ok(()) }
    }

    /// Append the user turn and placeholder, then open a stream for them.
    pub(super) async fn start_exchange(
        &mut self,
        content: String,
        baseline: Option<AccountingBaseline>,
    ) -> Result<StreamId, ChatError> {
        let mut messages: Vec<WireMessage> = self
            .turns
            .iter()
            .map(|t| WireMessage { role: t.role.as_str().to_owned(), content: t.content.clone() })
            .collect();
        messages
            .push(WireMessage { role: Role::User.as_str().to_owned(), content: content.clone() });

        let page_content = self.extraction.attach();
        let user = ConversationTurn::user(content);
        let placeholder = ConversationTurn::placeholder(Some(self.model.model.clone()));
        let placeholder_id = placeholder.id.clone();
        self.turns =
            store::append_pending_exchange(std::mem::take(&mut self.turns), user, placeholder);
        self.baseline = baseline;

        let request = StartStreamRequest {
            tab_id: self.tab_id.clone(),
            model: self.model.model.clone(),
            messages,
            page_content,
        };
        let transport = Rc::clone(&self.collaborators.transport);
        let response = match transport.start_stream(request).await {
            Ok(resp) if resp.success => resp,
            Ok(resp) => {
                let msg = resp.error.unwrap_or_else(|| "stream start rejected".to_owned());
                let err = TransportError::Rejected(msg);
                return Err(self.abort_exchange(&placeholder_id, err).await);
            }
            Err(e) => return Err(self.abort_exchange(&placeholder_id, e).await),
        };
        let Some(stream_id) = response.stream_id else {
            let err = TransportError::Other("producer returned no stream id".to_owned());
            return Err(self.abort_exchange(&placeholder_id, err).await);
        };

        if response.skipped_context && self.extraction.discard_in_flight() {
            tracing::warn!(
                "Producer skipped page content for tab {}: {}",
                self.tab_id,
                response.reason.as_deref().unwrap_or("no reason given")
            );
        }

        tracing::info!("Stream {stream_id} opened for tab {} (turn {placeholder_id})", self.tab_id);
        self.receiver.subscribe(stream_id.clone());
        self.session = Some(StreamSession::new(stream_id.clone(), placeholder_id));
        Ok(stream_id)
    }

    /// Replace the placeholder with a system error turn and persist.
    async fn abort_exchange(&mut self, placeholder_id: &str, error: TransportError) -> ChatError {
        tracing::error!("Failed to start stream for tab {}: {error}", self.tab_id);
        self.extraction.detach();
        self.turns = store::freeze_turn(
            std::mem::take(&mut self.turns),
            placeholder_id,
            FinalFields {
                role: Role::System,
                content: format!("Error: {error}"),
                input_tokens: 0,
                output_tokens: 0,
                cost: 0.0,
                model: None,
            },
        );
        let baseline = self.baseline.take();
        if let Err(e) = self.persist(baseline).await {
            tracing::error!("Failed to persist aborted turn for tab {}: {e}", self.tab_id);
        }
        ChatError::Transport(error)
    }

    /// Save the turn list and adopt the returned totals. On failure the totals
    /// are still computed locally so the next baseline stays correct.
    pub(super) async fn persist(
        &mut self,
        baseline: Option<AccountingBaseline>,
    ) -> Result<(), ChatError> {
        let history = Rc::clone(&self.collaborators.history);
        match history.save_history(&self.tab_id, &self.turns, &self.model, baseline).await {
            Ok(usage) => {
                self.usage = usage;
                Ok(())
            }
            Err(e) => {
                self.usage = compute_usage(&self.turns, baseline);
                Err(e)
            }
        }
    }

    /// Feed one inbound event. Deltas arm the batch scheduler; terminal events
    /// go straight to the finalizer.
    pub async fn handle_event(&mut self, event: ChunkEvent) -> Result<Handled, ChatError> {
        let Some(session) = self.session.as_mut() else {
            if event.is_terminal() {
                tracing::debug!("{}", ChatError::DuplicateTerminal(event.stream_id));
            }
            return Ok(Handled::Ignored);
        };
        match self.receiver.route(session, event) {
            Routed::Ignored => Ok(Handled::Ignored),
            Routed::Malformed(reason) => Ok(Handled::Malformed(reason)),
            Routed::Appended => {
                self.scheduler.request();
                Ok(Handled::Appended)
            }
            Routed::Terminal(outcome) => {
                if self.scheduler.cancel() {
                    tracing::debug!("Dropped pending commit for terminal stream");
                }
                self.finalize(outcome).await.map(Handled::Finalized)
            }
        }
    }

    /// Per-frame commit: copy the whole buffer into the streaming turn.
    /// Returns whether the turn list changed.
    pub fn on_frame(&mut self) -> bool {
        if !self.scheduler.take_due() {
            return false;
        }
        let Some(session) = &self.session else {
            return false;
        };
        if session.status().is_terminal() || self.receiver.subscribed().is_none() {
            return false;
        }
        self.turns = store::update_turn_content(
            std::mem::take(&mut self.turns),
            session.owner_turn_id(),
            session.buffer(),
        );
        true
    }

    /// Cancel any active stream and forget everything recorded for this tab.
    pub async fn clear(&mut self) -> Result<(), ChatError> {
        if self.session.is_some()
            && let Err(e) = self.cancel().await
        {
            tracing::warn!("Cancel during clear of tab {} failed: {e}", self.tab_id);
        }
        self.collaborators.history.clear_history(&self.tab_id).await?;
        self.turns.clear();
        self.usage = TabUsage::default();
        self.baseline = None;
        self.extraction = ExtractionQueue::default();
        self.scheduler = BatchScheduler::default();
        tracing::info!("Cleared tab {}", self.tab_id);
        Ok(())
    }
}
