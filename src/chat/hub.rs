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

use super::controller::{Collaborators, ConversationController, Handled};
use super::finalizer::FinalizeOutcome;
use super::turn::{StreamId, TabId};
use crate::agent::wire::ChunkEvent;
use crate::config::ModelConfig;
use crate::error::ChatError;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Every open tab plus the index that routes producer events to them.
///
/// All tabs share one producer connection, so inbound events arrive on a
/// single channel and are dispatched here by stream id.
pub struct ChatHub {
    collaborators: Collaborators,
    model: ModelConfig,
    tabs: HashMap<TabId, ConversationController>,
    streams: HashMap<StreamId, TabId>,
}

impl ChatHub {
    #[must_use]
    pub fn new(collaborators: Collaborators, model: ModelConfig) -> Self {
        Self { collaborators, model, tabs: HashMap::new(), streams: HashMap::new() }
    }

    /// Get the controller for `tab_id`, creating it from persisted history on
    /// first use. A history that cannot be read starts the tab empty.
    pub async fn tab(&mut self, tab_id: &str) -> &mut ConversationController {
        match self.tabs.entry(tab_id.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut controller = ConversationController::new(
                    tab_id,
                    self.model.clone(),
                    self.collaborators.clone(),
                );
                if let Err(e) = controller.restore().await {
                    tracing::warn!("Could not restore tab {tab_id}, starting empty: {e}");
                }
                entry.insert(controller)
            }
        }
    }

    #[must_use]
    pub fn get(&self, tab_id: &str) -> Option<&ConversationController> {
        self.tabs.get(tab_id)
    }

    pub fn get_mut(&mut self, tab_id: &str) -> Option<&mut ConversationController> {
        self.tabs.get_mut(tab_id)
    }

    pub fn tab_ids(&self) -> impl Iterator<Item = &str> {
        self.tabs.keys().map(String::as_str)
    }

    pub async fn send(&mut self, tab_id: &str, text: &str) -> Result<StreamId, ChatError> {
        let result = self.tab(tab_id).await.send(text).await;
        self.track(tab_id);
        result
    }

    pub async fn rerun(&mut self, tab_id: &str, turn_id: &str) -> Result<StreamId, ChatError> {
        let result = self.tab(tab_id).await.rerun(turn_id).await;
        self.track(tab_id);
        result
    }

    pub async fn edit_and_rerun(
        &mut self,
        tab_id: &str,
        turn_id: &str,
        text: &str,
    ) -> Result<StreamId, ChatError> {
        let result = self.tab(tab_id).await.edit_and_rerun(turn_id, text).await;
        self.track(tab_id);
        result
    }

    /// Route one producer event to the tab that owns its stream. Returns the
    /// tab id and what the tab did with it, or `None` for unknown streams.
    pub async fn dispatch(
        &mut self,
        event: ChunkEvent,
    ) -> Result<Option<(TabId, Handled)>, ChatError> {
        let Some(tab_id) = self.streams.get(&event.stream_id).cloned() else {
            tracing::debug!("No tab owns stream {}; dropping event", event.stream_id);
            return Ok(None);
        };
        let Some(controller) = self.tabs.get_mut(&tab_id) else {
            self.streams.remove(&event.stream_id);
            return Ok(None);
        };
        let result = controller.handle_event(event).await;
        self.track(&tab_id);
        result.map(|handled| Some((tab_id, handled)))
    }

    pub async fn cancel(&mut self, tab_id: &str) -> Result<FinalizeOutcome, ChatError> {
        let Some(controller) = self.tabs.get_mut(tab_id) else {
            return Ok(FinalizeOutcome::Skipped);
        };
        let result = controller.cancel().await;
        self.track(tab_id);
        result
    }

    /// Cancel every active stream. Returns the tabs that were cancelled.
    pub async fn cancel_all(&mut self) -> Vec<TabId> {
        let active: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|(_, c)| c.active_stream_id().is_some())
            .map(|(id, _)| id.clone())
            .collect();
        let mut cancelled = Vec::with_capacity(active.len());
        for tab_id in active {
            match self.cancel(&tab_id).await {
                Ok(FinalizeOutcome::Finalized { .. }) => cancelled.push(tab_id),
                Ok(FinalizeOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!("Cancel of tab {tab_id} failed: {e}");
                    cancelled.push(tab_id);
                }
            }
        }
        cancelled
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.tabs.values().any(ConversationController::is_processing)
    }

    /// Per-frame commit for every tab. Returns the tabs whose turns changed.
    pub fn on_frame(&mut self) -> Vec<TabId> {
        self.tabs
            .iter_mut()
            .filter_map(|(id, c)| c.on_frame().then(|| id.clone()))
            .collect()
    }

    pub async fn clear_tab(&mut self, tab_id: &str) -> Result<(), ChatError> {
        let result = self.tab(tab_id).await.clear().await;
        self.track(tab_id);
        result
    }

    /// Cancel, forget persisted history, and drop the tab.
    pub async fn close_tab(&mut self, tab_id: &str) -> Result<(), ChatError> {
        let Some(mut controller) = self.tabs.remove(tab_id) else {
            return Ok(());
        };
        self.streams.retain(|_, owner| owner != tab_id);
        controller.clear().await?;
        tracing::info!("Closed tab {tab_id}");
        Ok(())
    }

    /// Bring the stream index in line with the tab's current session.
    fn track(&mut self, tab_id: &str) {
        let active = self.tabs.get(tab_id).and_then(ConversationController::active_stream_id);
        self.streams.retain(|stream, owner| owner != tab_id || Some(stream.as_str()) == active);
        if let Some(stream_id) = active {
            self.streams.insert(stream_id.to_owned(), tab_id.to_owned());
        }
    }

    #[must_use]
    pub fn owner_of(&self, stream_id: &str) -> Option<&str> {
        self.streams.get(stream_id).map(String::as_str)
    }
}
