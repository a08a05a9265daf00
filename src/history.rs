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

//! Per-tab persistence of the turn list and cumulative usage.

use crate::chat::{ConversationTurn, Role};
use crate::config::ModelConfig;
use crate::error::ChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Cumulative totals captured before a send or replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingBaseline {
    pub cost_before_turn: f64,
    pub input_tokens_before_turn: u64,
    pub output_tokens_before_turn: u64,
}

impl From<TabUsage> for AccountingBaseline {
    fn from(usage: TabUsage) -> Self {
        Self {
            cost_before_turn: usage.accumulated_cost,
            input_tokens_before_turn: usage.input_tokens,
            output_tokens_before_turn: usage.output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TabUsage {
    pub accumulated_cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TabUsage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.accumulated_cost == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabConversation {
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub usage: TabUsage,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Totals for a freshly saved list.
///
/// With a baseline, only the last turn (the one just frozen) is added on top
/// of it, so turns removed by a replay keep the cost they already accrued.
/// Without one, totals are summed over the whole list.
#[must_use]
pub fn compute_usage(turns: &[ConversationTurn], baseline: Option<AccountingBaseline>) -> TabUsage {
    let charged = |t: &&ConversationTurn| t.role == Role::Assistant && !t.is_streaming;
    match baseline {
        Some(base) => {
            let (cost, input, output) = turns
                .last()
                .filter(charged)
                .map_or((0.0, 0, 0), |t| (t.cost, t.input_tokens, t.output_tokens));
            TabUsage {
                accumulated_cost: base.cost_before_turn + cost,
                input_tokens: base.input_tokens_before_turn.saturating_add(input),
                output_tokens: base.output_tokens_before_turn.saturating_add(output),
            }
        }
        None => turns.iter().filter(charged).fold(TabUsage::default(), |acc, t| TabUsage {
            accumulated_cost: acc.accumulated_cost + t.cost,
            input_tokens: acc.input_tokens.saturating_add(t.input_tokens),
            output_tokens: acc.output_tokens.saturating_add(t.output_tokens),
        }),
    }
}

#[async_trait(?Send)]
pub trait HistoryStore {
    /// Persist `turns` and return the cumulative usage recorded for the tab.
    async fn save_history(
        &self,
        tab_id: &str,
        turns: &[ConversationTurn],
        model: &ModelConfig,
        baseline: Option<AccountingBaseline>,
    ) -> Result<TabUsage, ChatError>;

    async fn get_history(&self, tab_id: &str) -> Result<Option<TabConversation>, ChatError>;

    async fn clear_history(&self, tab_id: &str) -> Result<(), ChatError>;
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    tabs: RefCell<HashMap<String, TabConversation>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self, tab_id: &str) -> Option<TabConversation> {
        self.tabs.borrow().get(tab_id).cloned()
    }
}

#[async_trait(?Send)]
impl HistoryStore for MemoryHistoryStore {
    async fn save_history(
        &self,
        tab_id: &str,
        turns: &[ConversationTurn],
        model: &ModelConfig,
        baseline: Option<AccountingBaseline>,
    ) -> Result<TabUsage, ChatError> {
        let usage = compute_usage(turns, baseline);
        self.tabs.borrow_mut().insert(
            tab_id.to_owned(),
            TabConversation { turns: turns.to_vec(), usage, model: model.clone() },
        );
        Ok(usage)
    }

    async fn get_history(&self, tab_id: &str) -> Result<Option<TabConversation>, ChatError> {
        Ok(self.snapshot(tab_id))
    }

    async fn clear_history(&self, tab_id: &str) -> Result<(), ChatError> {
        self.tabs.borrow_mut().remove(tab_id);
        Ok(())
    }
}

/// One JSON document per tab under `root`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ChatError::History(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, tab_id: &str) -> PathBuf {
        // Tab ids come from the host; keep them from escaping the directory.
        let safe: String = tab_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait(?Send)]
impl HistoryStore for FileHistoryStore {
    async fn save_history(
        &self,
        tab_id: &str,
        turns: &[ConversationTurn],
        model: &ModelConfig,
        baseline: Option<AccountingBaseline>,
    ) -> Result<TabUsage, ChatError> {
        let usage = compute_usage(turns, baseline);
        let doc = TabConversation { turns: turns.to_vec(), usage, model: model.clone() };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| ChatError::History(format!("failed to encode history: {e}")))?;
        let path = self.path_for(tab_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ChatError::History(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            ChatError::History(format!("failed to replace {}: {e}", path.display()))
        })?;
        tracing::debug!(
            "Saved {} turns for tab {tab_id}: cost={:.6} out={}",
            turns.len(),
            usage.accumulated_cost,
            usage.output_tokens
        );
        Ok(usage)
    }

    async fn get_history(&self, tab_id: &str) -> Result<Option<TabConversation>, ChatError> {
        let path = self.path_for(tab_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ChatError::History(format!("failed to read {}: {e}", path.display())));
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ChatError::History(format!("failed to decode {}: {e}", path.display())))
    }

    async fn clear_history(&self, tab_id: &str) -> Result<(), ChatError> {
        let path = self.path_for(tab_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatError::History(format!("failed to remove {}: {e}", path.display()))),
        }
    }
}
