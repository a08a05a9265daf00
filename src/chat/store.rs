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

//! Pure operations over a tab's turn list.
//!
//! Every function takes the last authoritative list by value and returns the
//! replacement. Nothing here performs I/O; callers persist snapshots through
//! the history store.

use super::turn::{ConversationTurn, FinalFields};

fn position(turns: &[ConversationTurn], turn_id: &str) -> Option<usize> {
    turns.iter().position(|t| t.id == turn_id)
}

/// Append a user turn followed by its streaming placeholder.
#[must_use]
pub fn append_pending_exchange(
    mut turns: Vec<ConversationTurn>,
    user: ConversationTurn,
    placeholder: ConversationTurn,
) -> Vec<ConversationTurn> {
    turns.push(user);
    turns.push(placeholder);
    turns
}

/// Replace the content of a streaming turn with the full accumulated buffer.
/// Frozen turns are left untouched.
#[must_use]
pub fn update_turn_content(
    mut turns: Vec<ConversationTurn>,
    turn_id: &str,
    content: &str,
) -> Vec<ConversationTurn> {
    match turns.iter_mut().find(|t| t.id == turn_id) {
        Some(turn) if turn.is_streaming => content.clone_into(&mut turn.content),
        Some(_) => tracing::debug!("update_turn_content: turn {turn_id} already frozen"),
        None => tracing::debug!("update_turn_content: turn {turn_id} not found"),
    }
    turns
}

/// Overwrite the content of any turn (used by edit-and-rerun).
#[must_use]
pub fn replace_content(
    mut turns: Vec<ConversationTurn>,
    turn_id: &str,
    content: String,
) -> Vec<ConversationTurn> {
    if let Some(turn) = turns.iter_mut().find(|t| t.id == turn_id) {
        turn.content = content;
    } else {
        tracing::debug!("replace_content: turn {turn_id} not found");
    }
    turns
}

#[must_use]
pub fn freeze_turn(
    mut turns: Vec<ConversationTurn>,
    turn_id: &str,
    fields: FinalFields,
) -> Vec<ConversationTurn> {
    let Some(turn) = turns.iter_mut().find(|t| t.id == turn_id) else {
        tracing::debug!("freeze_turn: turn {turn_id} not found");
        return turns;
    };
    turn.is_streaming = false;
    turn.role = fields.role;
    turn.content = fields.content;
    turn.input_tokens = fields.input_tokens;
    turn.output_tokens = fields.output_tokens;
    turn.cost = fields.cost;
    if fields.model.is_some() {
        turn.model = fields.model;
    }
    turns
}

/// Insert `synthetic` immediately before `turn_id`.
#[must_use]
pub fn splice_before(
    mut turns: Vec<ConversationTurn>,
    turn_id: &str,
    synthetic: ConversationTurn,
) -> Vec<ConversationTurn> {
    match position(&turns, turn_id) {
        Some(idx) => turns.insert(idx, synthetic),
        None => tracing::debug!("splice_before: turn {turn_id} not found"),
    }
    turns
}

/// Drop `turn_id` and every turn after it.
#[must_use]
pub fn truncate_at(mut turns: Vec<ConversationTurn>, turn_id: &str) -> Vec<ConversationTurn> {
    match position(&turns, turn_id) {
        Some(idx) => turns.truncate(idx),
        None => tracing::debug!("truncate_at: turn {turn_id} not found"),
    }
    turns
}
