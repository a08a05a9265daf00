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

//! Plain terminal rendering of a tab's transcript.
//!
//! Output is append-only: streaming content is written as it grows, and a
//! turn is labelled once, when it is first seen. Turns are numbered in the
//! order they were printed; [`TranscriptView::turn_at`] maps a number back.

use crate::chat::{ConversationTurn, Role, TurnId};
use crate::history::TabUsage;
use crate::tokenizer::{ContextStatus, WarningLevel};
use std::collections::HashSet;
use std::io::{self, Write};

/// Size of page content shown before it is elided.
const PAGE_PREVIEW_CHARS: usize = 80;

pub struct TranscriptView<W: Write> {
    out: W,
    /// Turn currently being streamed and the text of it already on screen.
    live: Option<(TurnId, String)>,
    finished: HashSet<TurnId>,
    /// Turn ids in print order; `#n` on screen is `printed[n - 1]`.
    printed: Vec<TurnId>,
}

impl TranscriptView<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TranscriptView<W> {
    pub fn new(out: W) -> Self {
        Self { out, live: None, finished: HashSet::new(), printed: Vec::new() }
    }

    /// Forget what has been printed, e.g. after the tab was cleared.
    pub fn reset(&mut self) {
        self.live = None;
        self.finished.clear();
        self.printed.clear();
    }

    /// Id of the turn shown as `#number`.
    #[must_use]
    pub fn turn_at(&self, number: usize) -> Option<&str> {
        self.printed.get(number.checked_sub(1)?).map(String::as_str)
    }

    /// Write whatever part of `turns` is not on screen yet.
    ///
    /// The live turn is finished first, so turns spliced in ahead of it
    /// never interrupt its line.
    pub fn render<'a>(
        &mut self,
        turns: impl IntoIterator<Item = &'a ConversationTurn>,
    ) -> io::Result<()> {
        let turns: Vec<&ConversationTurn> = turns.into_iter().collect();
        if let Some((live_id, _)) = &self.live {
            match turns.iter().find(|t| &t.id == live_id) {
                Some(turn) => self.render_turn(turn)?,
                None => {
                    self.live = None;
                    writeln!(self.out)?;
                }
            }
        }
        for turn in turns {
            self.render_turn(turn)?;
        }
        self.out.flush()
    }

    fn render_turn(&mut self, turn: &ConversationTurn) -> io::Result<()> {
        if self.finished.contains(&turn.id) {
            return Ok(());
        }
        if turn.is_streaming {
            self.render_live(turn)
        } else {
            self.render_frozen(turn)?;
            self.finished.insert(turn.id.clone());
            Ok(())
        }
    }

    fn header(&mut self, turn: &ConversationTurn) -> io::Result<()> {
        self.printed.push(turn.id.clone());
        writeln!(self.out, "#{} {}:", self.printed.len(), label(turn))
    }

    fn render_live(&mut self, turn: &ConversationTurn) -> io::Result<()> {
        let shown = match self.live.take() {
            Some((id, shown)) if id == turn.id => shown,
            other => {
                if other.is_some() {
                    writeln!(self.out)?;
                }
                self.header(turn)?;
                String::new()
            }
        };
        match turn.content.strip_prefix(shown.as_str()) {
            Some(delta) => write!(self.out, "{delta}")?,
            None => write!(self.out, "\n{}", turn.content)?,
        }
        self.live = Some((turn.id.clone(), turn.content.clone()));
        Ok(())
    }

    fn render_frozen(&mut self, turn: &ConversationTurn) -> io::Result<()> {
        match self.live.take() {
            Some((id, shown)) if id == turn.id => {
                // Final content that does not extend the streamed text
                // replaced it and is printed again in full.
                match turn.content.strip_prefix(shown.as_str()) {
                    Some(rest) => write!(self.out, "{rest}")?,
                    None => write!(self.out, "\n{}", turn.content)?,
                }
                writeln!(self.out)?;
            }
            other => {
                if other.is_some() {
                    writeln!(self.out)?;
                }
                self.header(turn)?;
                if turn.is_extracted_content {
                    writeln!(self.out, "{}", page_preview(&turn.content))?;
                } else {
                    writeln!(self.out, "{}", turn.content)?;
                }
            }
        }
        if turn.role == Role::Assistant && (turn.input_tokens > 0 || turn.output_tokens > 0) {
            writeln!(
                self.out,
                "  [{} in / {} out, ${:.6}{}]",
                turn.input_tokens,
                turn.output_tokens,
                turn.cost,
                turn.model.as_deref().map(|m| format!(", {m}")).unwrap_or_default()
            )?;
        }
        Ok(())
    }

    pub fn usage(&mut self, usage: TabUsage, context: ContextStatus) -> io::Result<()> {
        writeln!(
            self.out,
            "usage: {} in / {} out, ${:.6} total; context {:.1}% ({} tokens left)",
            usage.input_tokens,
            usage.output_tokens,
            usage.accumulated_cost,
            context.percentage,
            context.tokens_remaining
        )?;
        match context.warning_level {
            WarningLevel::None => {}
            WarningLevel::Warning => writeln!(self.out, "warning: context window filling up")?,
            WarningLevel::Critical => writeln!(self.out, "warning: context window nearly full")?,
        }
        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "* {text}")?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn label(turn: &ConversationTurn) -> &'static str {
    if turn.is_extracted_content {
        return "page";
    }
    match turn.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn page_preview(content: &str) -> String {
    let total = content.chars().count();
    if total <= PAGE_PREVIEW_CHARS {
        return content.replace('\n', " ");
    }
    let head: String = content.chars().take(PAGE_PREVIEW_CHARS).collect();
    format!("{}... ({total} chars)", head.replace('\n', " "))
}
