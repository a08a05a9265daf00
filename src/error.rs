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

/// Startup failures surfaced by the binary with a dedicated exit code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("Producer program not found")]
    ProducerNotFound,
    #[error("Producer process failed")]
    ProducerCrashed,
    #[error("Invalid configuration")]
    InvalidConfig,
    #[error("History storage unavailable")]
    HistoryUnavailable,
}

impl AppError {
    pub const PRODUCER_NOT_FOUND_EXIT_CODE: i32 = 20;
    pub const PRODUCER_CRASHED_EXIT_CODE: i32 = 21;
    pub const INVALID_CONFIG_EXIT_CODE: i32 = 22;
    pub const HISTORY_UNAVAILABLE_EXIT_CODE: i32 = 23;

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProducerNotFound => Self::PRODUCER_NOT_FOUND_EXIT_CODE,
            Self::ProducerCrashed => Self::PRODUCER_CRASHED_EXIT_CODE,
            Self::InvalidConfig => Self::INVALID_CONFIG_EXIT_CODE,
            Self::HistoryUnavailable => Self::HISTORY_UNAVAILABLE_EXIT_CODE,
        }
    }

    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ProducerNotFound => {
                "Producer program not found. Pass --producer <PROGRAM> or set TABCHAT_PRODUCER."
            }
            Self::ProducerCrashed => "Producer process crashed or failed to start.",
            Self::InvalidConfig => "The configuration file could not be read or parsed.",
            Self::HistoryUnavailable => "The history directory could not be created or read.",
        }
    }
}

/// Failure of a call into the transport that talks to the producer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("producer channel closed")]
    ChannelClosed,
    #[error("producer rejected stream: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Errors produced by the conversation pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("producer error: {0}")]
    Producer(String),
    #[error("malformed chunk for stream {stream_id}: {reason}")]
    MalformedChunk { stream_id: String, reason: &'static str },
    #[error("terminal event for stream {0} has no active session")]
    DuplicateTerminal(String),
    #[error("history store failure: {0}")]
    History(String),
    #[error("a response is still streaming")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
    #[error("turn {0} not found")]
    TurnNotFound(String),
    #[error("turn {0} cannot be replayed")]
    NotReplayable(String),
}
