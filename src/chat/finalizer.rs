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

//! The single path that ends a stream.
//!
//! Natural completion, producer errors, producer-side cancellation and local
//! cancellation all arrive here. Taking the session out of the controller is
//! the test-and-set: whichever path gets here first finalizes, every later
//! attempt finds no session and returns [`FinalizeOutcome::Skipped`].

use super::controller::ConversationController;
use super::receiver::TerminalOutcome;
use super::session::SessionStatus;
use super::store;
use super::turn::{ConversationTurn, FinalFields, Role, TurnId};
use crate::agent::error_handling::format_producer_error;
use crate::error::ChatError;
use crate::tokenizer::WarningLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// No active session; another path already finalized it.
    Skipped,
    Finalized { turn_id: TurnId, status: SessionStatus },
}

impl ConversationController {
    pub(super) async fn finalize(
        &mut self,
        outcome: TerminalOutcome,
    ) -> Result<FinalizeOutcome, ChatError> {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("Finalize skipped for tab {}: no active session", self.tab_id);
            return Ok(FinalizeOutcome::Skipped);
        };
        let status = match &outcome {
            TerminalOutcome::Completed { .. } => SessionStatus::Completed,
            TerminalOutcome::Errored { .. } => SessionStatus::Errored,
            TerminalOutcome::Cancelled { .. } => SessionStatus::Cancelled,
        };
        session.terminate(status);
        self.receiver.unsubscribe();
        self.scheduler.cancel();
        self.scheduler.finish_stream(session.stream_id());

        let turn_id = session.owner_turn_id().to_owned();
        let page_content = self.extraction.take_for_splice();
        let fields = self.final_fields(&turn_id, page_content.as_deref(), outcome);
        tracing::info!(
            "Finalizing stream {} for tab {} as {status:?}: out={} cost={:.6}",
            session.stream_id(),
            self.tab_id,
            fields.output_tokens,
            fields.cost
        );

        self.turns = store::freeze_turn(std::mem::take(&mut self.turns), &turn_id, fields);
        if let Some(content) = page_content {
            self.turns = store::splice_before(
                std::mem::take(&mut self.turns),
                &turn_id,
                ConversationTurn::extracted_content(content),
            );
        }

        let baseline = self.baseline.take();
        let persisted = self.persist(baseline).await;

        let context = self.context_status();
        if context.warning_level != WarningLevel::None {
            tracing::warn!(
                "Tab {} context at {:.1}% ({} tokens remaining, exceeds={})",
                self.tab_id,
                context.percentage,
                context.tokens_remaining,
                context.exceeds
            );
        }

        if let Err(e) = persisted {
            tracing::error!("Failed to persist tab {} after finalize: {e}", self.tab_id);
            return Err(e);
        }
        Ok(FinalizeOutcome::Finalized { turn_id, status })
    }

    fn final_fields(
        &self,
        turn_id: &str,
        page_content: Option<&str>,
        outcome: TerminalOutcome,
    ) -> FinalFields {
        let (content, model) = match outcome {
            TerminalOutcome::Errored { message } => {
                tracing::warn!("Tab {}: {}", self.tab_id, ChatError::Producer(message.clone()));
                return FinalFields {
                    role: Role::System,
                    content: format_producer_error(&message),
                    input_tokens: 0,
                    output_tokens: 0,
                    cost: 0.0,
                    model: None,
                };
            }
            TerminalOutcome::Completed { content, model }
            | TerminalOutcome::Cancelled { content, model } => (content, model),
        };
        let tokenizer = &self.collaborators.tokenizer;
        let context_tokens: u64 = self
            .turns
            .iter()
            .take_while(|t| t.id != turn_id)
            .map(|t| tokenizer.estimate_tokens(&t.content))
            .sum();
        let input_tokens =
            context_tokens + page_content.map_or(0, |p| tokenizer.estimate_tokens(p));
        let output_tokens = tokenizer.estimate_tokens(&content);
        FinalFields {
            role: Role::Assistant,
            content,
            input_tokens,
            output_tokens,
            cost: self.model.turn_cost(input_tokens, output_tokens),
            model,
        }
    }
}
