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

//! Per-tab conversation state and the streaming pipeline that feeds it.

mod cancel;
mod controller;
mod finalizer;
mod hub;
mod receiver;
mod replay;
mod scheduler;
mod session;
pub mod store;
mod turn;

pub use controller::{Collaborators, ConversationController, Handled};
pub use finalizer::FinalizeOutcome;
pub use hub::ChatHub;
pub use receiver::{CANCEL_SUFFIX, Routed, StreamReceiver, TerminalOutcome};
pub use scheduler::{BatchScheduler, FrameClock};
pub use session::{SessionStatus, StreamSession};
pub use turn::{ConversationTurn, FinalFields, Role, StreamId, TabId, TurnId};
