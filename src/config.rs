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

use crate::Cli;
use crate::agent::bridge::PRODUCER_ENV;
use crate::error::AppError;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "default";
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;
pub const DEFAULT_FRAME_MS: u64 = 16;
const APP_DIR: &str = "tabchat";

/// Model identity plus the numbers needed for cost and context accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub context_window: u64,
    /// USD per million input tokens.
    pub input_cost_per_million: f64,
    /// USD per million output tokens.
    pub output_cost_per_million: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
        }
    }
}

impl ModelConfig {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn turn_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_cost_per_million
            + output_tokens as f64 * self.output_cost_per_million)
            / 1_000_000.0
    }
}

/// On-disk configuration file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    model: Option<ModelConfig>,
    history_dir: Option<PathBuf>,
    frame_ms: Option<u64>,
    producer: Option<String>,
    producer_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub model: ModelConfig,
    pub history_dir: PathBuf,
    pub frame_interval: Duration,
    pub producer: Option<String>,
    pub producer_args: Vec<String>,
}

impl ChatConfig {
    /// Defaults, then the config file (explicit path or the per-user default
    /// if it exists), then CLI flags.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match cli.config.as_deref() {
            Some(path) => read_config_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => read_config_file(&path)?,
                _ => ConfigFile::default(),
            },
        };
        Ok(Self::merge(file, cli))
    }

    fn merge(file: ConfigFile, cli: &Cli) -> Self {
        let mut model = file.model.unwrap_or_default();
        if let Some(name) = &cli.model {
            model.model.clone_from(name);
        }
        let history_dir = cli
            .history_dir
            .clone()
            .or(file.history_dir)
            .unwrap_or_else(default_history_dir);
        let frame_ms = cli.frame_ms.or(file.frame_ms).unwrap_or(DEFAULT_FRAME_MS).max(1);
        let producer = cli
            .producer
            .clone()
            .or_else(|| std::env::var(PRODUCER_ENV).ok())
            .or(file.producer);
        let producer_args = if cli.producer_args.is_empty() {
            file.producer_args
        } else {
            cli.producer_args.clone()
        };
        Self {
            model,
            history_dir,
            frame_interval: Duration::from_millis(frame_ms),
            producer,
            producer_args,
        }
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|_| anyhow::Error::new(AppError::InvalidConfig))
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|_| anyhow::Error::new(AppError::InvalidConfig))
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}

fn default_history_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("history")
}
