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

use crate::config::ModelConfig;

pub const WARNING_THRESHOLD_PERCENT: f64 = 75.0;
pub const CRITICAL_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenStats {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    None,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextStatus {
    pub warning_level: WarningLevel,
    pub percentage: f64,
    pub tokens_remaining: u64,
    pub exceeds: bool,
}

pub trait Tokenizer {
    fn estimate_tokens(&self, text: &str) -> u64;

    fn calculate_context_status(&self, stats: TokenStats, model: &ModelConfig) -> ContextStatus {
        let used = stats.total();
        let window = model.context_window;
        #[allow(clippy::cast_precision_loss)]
        let percentage = if window == 0 { 100.0 } else { used as f64 / window as f64 * 100.0 };
        let warning_level = if percentage >= CRITICAL_THRESHOLD_PERCENT {
            WarningLevel::Critical
        } else if percentage >= WARNING_THRESHOLD_PERCENT {
            WarningLevel::Warning
        } else {
            WarningLevel::None
        };
        ContextStatus {
            warning_level,
            percentage,
            tokens_remaining: window.saturating_sub(used),
            exceeds: used > window,
        }
    }
}

/// Character-count estimate: roughly four characters per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl HeuristicTokenizer {
    const CHARS_PER_TOKEN: u64 = 4;
}

impl Tokenizer for HeuristicTokenizer {
    fn estimate_tokens(&self, text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        chars.div_ceil(Self::CHARS_PER_TOKEN)
    }
}
