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

//! Rerun and edit-and-rerun.
//!
//! A replay truncates the conversation at the replayed user turn and sends
//! it again. The tab's cumulative usage is captured first, so turns removed
//! by the truncation keep the cost they already accrued and the new response
//! is added on top exactly once.

use super::controller::ConversationController;
use super::store;
use super::turn::{Role, StreamId};
use crate::error::ChatError;
use crate::history::AccountingBaseline;

impl ConversationController {
    /// Resend the user turn `turn_id` belongs to.
    pub async fn rerun(&mut self, turn_id: &str) -> Result<StreamId, ChatError> {
        self.ensure_idle()?;
        let idx = self.replay_target(turn_id)?;
        let content = self.turns[idx].content.clone();
        self.replay(idx, content).await
    }

    /// Overwrite the user turn `turn_id` belongs to, then resend it.
    pub async fn edit_and_rerun(
        &mut self,
        turn_id: &str,
        content: &str,
    ) -> Result<StreamId, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.ensure_idle()?;
        let idx = self.replay_target(turn_id)?;
        let target_id = self.turns[idx].id.clone();
        self.turns = store::replace_content(
            std::mem::take(&mut self.turns),
            &target_id,
            content.to_owned(),
        );
        self.replay(idx, content.to_owned()).await
    }

    async fn replay(&mut self, idx: usize, content: String) -> Result<StreamId, ChatError> {
        let target_id = self.turns[idx].id.clone();
        let removed = self.turns.len() - idx;
        self.turns = store::truncate_at(std::mem::take(&mut self.turns), &target_id);
        let baseline = AccountingBaseline::from(self.usage);
        tracing::info!(
            "Replaying turn {target_id} in tab {}: removed {removed} turns, baseline cost={:.6}",
            self.tab_id,
            baseline.cost_before_turn
        );
        self.start_exchange(content, Some(baseline)).await
    }

    /// Index of the user turn to replay. Assistant and system turns resolve to
    /// the nearest preceding user turn that is not extracted page content.
    fn replay_target(&self, turn_id: &str) -> Result<usize, ChatError> {
        let idx = self
            .turns
            .iter()
            .position(|t| t.id == turn_id)
            .ok_or_else(|| ChatError::TurnNotFound(turn_id.to_owned()))?;
        if self.turns[idx].is_extracted_content {
            return Err(ChatError::NotReplayable(turn_id.to_owned()));
        }
        self.turns[..=idx]
            .iter()
            .rposition(|t| t.role == Role::User && !t.is_extracted_content)
            .ok_or_else(|| ChatError::NotReplayable(turn_id.to_owned()))
    }
}
