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

//! Per-frame coalescing of streamed deltas.
//!
//! Deltas land in the session buffer as they arrive. The scheduler only
//! decides *when* the buffer is copied into the turn list: at most once per
//! frame, and never after the stream has reached a terminal state.

use std::time::Duration;

/// Single commit-pending token plus counters for diagnostics.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    pending: bool,
    requested: u64,
    coalesced: u64,
    commits: u64,
}

impl BatchScheduler {
    /// Request a commit. Returns `true` if this armed the token, `false` if the
    /// request rides along with one already pending.
    pub fn request(&mut self) -> bool {
        self.requested += 1;
        if self.pending {
            self.coalesced += 1;
            return false;
        }
        self.pending = true;
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Called once per frame. Returns `true` when a commit is due and disarms
    /// the token.
    pub fn take_due(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.commits += 1;
        true
    }

    /// Drop a pending commit without performing it. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Log and reset the counters for the stream that just ended.
    pub fn finish_stream(&mut self, stream_id: &str) {
        tracing::debug!(
            "Stream {stream_id} batching: requested={} coalesced={} commits={}",
            self.requested,
            self.coalesced,
            self.commits
        );
        *self = Self::default();
    }
}

/// Tick source that drives [`BatchScheduler::take_due`] in the run loop.
pub struct FrameClock {
    interval: tokio::time::Interval,
}

impl FrameClock {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A stalled loop should not replay a burst of missed frames.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
