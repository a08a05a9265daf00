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

use crate::agent::wire::{StartStreamRequest, StartStreamResponse};
use crate::error::TransportError;
use async_trait::async_trait;

/// Outbound half of the producer connection.
///
/// Inbound chunk events do not flow through this trait: they are pushed onto
/// the event channel the run loop drains, so opening or stopping a stream
/// never blocks chunk ingestion.
#[async_trait(?Send)]
pub trait Transport {
    /// Ask the producer to open a stream. Resolves once the producer has
    /// accepted or rejected the request.
    async fn start_stream(
        &self,
        request: StartStreamRequest,
    ) -> Result<StartStreamResponse, TransportError>;

    /// Enqueue a stop request. Fire-and-forget: the producer may ignore it.
    fn cancel_stream(&self, stream_id: &str) -> Result<(), TransportError>;
}
