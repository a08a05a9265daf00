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

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod tokenizer;
pub mod ui;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tabchat", about = "Tab-scoped AI chat with a streaming producer")]
pub struct Cli {
    /// Producer program that streams responses over JSON lines (or set TABCHAT_PRODUCER)
    #[arg(long)]
    pub producer: Option<String>,

    /// Extra argument passed to the producer (repeatable)
    #[arg(long = "producer-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub producer_args: Vec<String>,

    /// Conversation tab to open
    #[arg(long, default_value = "default")]
    pub tab: String,

    /// Override the model
    #[arg(long, short)]
    pub model: Option<String>,

    /// JSON config file (defaults to the per-user config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding per-tab conversation history
    #[arg(long, value_name = "PATH")]
    pub history_dir: Option<PathBuf>,

    /// Frame interval for streaming updates, in milliseconds
    #[arg(long, value_name = "MS")]
    pub frame_ms: Option<u64>,

    /// Write tracing diagnostics to a file (disabled unless explicitly set)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Tracing filter directives (example: `info,tabchat=debug`)
    /// Falls back to `RUST_LOG` when omitted.
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Append to --log-file instead of truncating on startup
    #[arg(long)]
    pub log_append: bool,
}
