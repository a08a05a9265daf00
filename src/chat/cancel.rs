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

use super::controller::ConversationController;
use super::finalizer::FinalizeOutcome;
use super::receiver::TerminalOutcome;
use crate::error::ChatError;

impl ConversationController {
    /// Stop the active stream.
    ///
    /// The stop request to the producer is fire-and-forget. Local state is
    /// finalized immediately from the buffer received so far, so the turn
    /// never stays streaming even if the producer ignores the request. A
    /// producer `done` that was already queued behind this call finds no
    /// session and is dropped.
    pub async fn cancel(&mut self) -> Result<FinalizeOutcome, ChatError> {
        if self.canceling {
            tracing::debug!("Cancel already in progress for tab {}", self.tab_id);
            return Ok(FinalizeOutcome::Skipped);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(FinalizeOutcome::Skipped);
        };
        if !session.begin_cancel() {
            return Ok(FinalizeOutcome::Skipped);
        }
        self.canceling = true;

        let stream_id = session.stream_id().to_owned();
        let content = session.buffer().to_owned();
        let model = session.model().map(str::to_owned);
        self.receiver.unsubscribe();
        if self.scheduler.cancel() {
            tracing::debug!("Dropped pending commit for cancelled stream {stream_id}");
        }

        tracing::info!("Cancelling stream {stream_id} for tab {}", self.tab_id);
        if let Err(e) = self.collaborators.transport.cancel_stream(&stream_id) {
            tracing::error!("Failed to send cancel for stream {stream_id}: {e}");
        }

        let result = self.finalize(TerminalOutcome::cancelled(content, model)).await;
        self.canceling = false;
        result
    }
}
