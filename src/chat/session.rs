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

use super::turn::{StreamId, TurnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Stream opened, no content yet.
    Created,
    Active,
    CancelPending,
    Completed,
    Errored,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

/// Live channel delivering one assistant turn.
#[derive(Debug)]
pub struct StreamSession {
    stream_id: StreamId,
    owner_turn_id: TurnId,
    status: SessionStatus,
    buffer: String,
    model: Option<String>,
}

impl StreamSession {
    #[must_use]
    pub fn new(stream_id: StreamId, owner_turn_id: TurnId) -> Self {
        Self {
            stream_id,
            owner_turn_id,
            status: SessionStatus::Created,
            buffer: String::new(),
            model: None,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn owner_turn_id(&self) -> &str {
        &self.owner_turn_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: String) {
        self.model = Some(model);
    }

    /// Append a delta. Returns `false` once the session is terminal or cancelling.
    pub fn append(&mut self, delta: &str) -> bool {
        match self.status {
            SessionStatus::Created | SessionStatus::Active => {
                self.buffer.push_str(delta);
                self.status = SessionStatus::Active;
                true
            }
            _ => false,
        }
    }

    /// Mark the session as being cancelled. Returns `false` if it was already
    /// cancelling or terminal.
    pub fn begin_cancel(&mut self) -> bool {
        if matches!(self.status, SessionStatus::Created | SessionStatus::Active) {
            self.status = SessionStatus::CancelPending;
            true
        } else {
            false
        }
    }

    /// Move to a terminal status. Terminal statuses are absorbing: a second call
    /// returns `false` and leaves the first status in place.
    pub fn terminate(&mut self, status: SessionStatus) -> bool {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
