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

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub type TurnId = String;
pub type TabId = String;
pub type StreamId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message in a tab's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// USD charged for this turn. Only assistant turns carry a cost.
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Free-form metadata reported by the producer (platform name, finish reason, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<serde_json::Value>,
    /// Synthetic user turn carrying extracted page content.
    #[serde(default)]
    pub is_extracted_content: bool,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl ConversationTurn {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            is_streaming: false,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            model: None,
            platform: None,
            is_extracted_content: false,
            timestamp: unix_ms(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Empty assistant turn that receives streamed content.
    #[must_use]
    pub fn placeholder(model: Option<String>) -> Self {
        let mut turn = Self::new(Role::Assistant, String::new());
        turn.is_streaming = true;
        turn.model = model;
        turn
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into())
    }

    #[must_use]
    pub fn extracted_content(content: impl Into<String>) -> Self {
        let mut turn = Self::new(Role::User, content.into());
        turn.is_extracted_content = true;
        turn
    }
}

/// Fields written once when a streaming turn is frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalFields {
    pub role: Role,
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub model: Option<String>,
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
