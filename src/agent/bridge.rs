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

use crate::error::AppError;
use anyhow::Context as _;
use std::path::PathBuf;
use tokio::process::Command;

pub const PRODUCER_ENV: &str = "TABCHAT_PRODUCER";

/// Resolved producer executable plus the arguments it is started with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerLauncher {
    pub program_path: PathBuf,
    pub args: Vec<String>,
}

impl ProducerLauncher {
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = self.program_path.to_string_lossy().into_owned();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program_path);
        cmd.args(&self.args);
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Resolve the producer from the explicit program, else [`PRODUCER_ENV`].
/// Bare names are looked up on `PATH`.
pub fn resolve_producer_launcher(
    program: Option<&str>,
    args: &[String],
) -> anyhow::Result<ProducerLauncher> {
    let program = match program {
        Some(p) => p.to_owned(),
        None => std::env::var(PRODUCER_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow::Error::new(AppError::ProducerNotFound))
            .with_context(|| format!("no producer given and {PRODUCER_ENV} is not set"))?,
    };
    let program_path = which::which(&program)
        .map_err(|_| anyhow::Error::new(AppError::ProducerNotFound))
        .with_context(|| format!("failed to resolve producer `{program}`"))?;
    Ok(ProducerLauncher { program_path, args: args.to_vec() })
}
