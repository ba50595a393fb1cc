//! tmux-backed console

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ConsoleTransport, Key};
use crate::error::ConsoleError;

/// Drives a named tmux session through the `tmux` binary
#[derive(Debug, Clone)]
pub struct TmuxConsole {
    session: String,
    process_pattern: String,
    timeout: Duration,
}

impl TmuxConsole {
    pub fn new(
        session: impl Into<String>,
        process_pattern: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            session: session.into(),
            process_pattern: process_pattern.into(),
            timeout,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    async fn run(&self, program: &'static str, args: &[&str]) -> Result<Output, ConsoleError> {
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await;

        match result {
            Ok(output) => Ok(output?),
            Err(_) => Err(ConsoleError::Timeout {
                command: program,
                timeout: self.timeout,
            }),
        }
    }

    /// Run tmux and return stdout, failing on a non-zero exit
    async fn tmux(&self, args: &[&str]) -> Result<String, ConsoleError> {
        let output = self.run("tmux", args).await?;
        if !output.status.success() {
            return Err(ConsoleError::Failed {
                command: "tmux",
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn display(&self, format: &str) -> Result<String, ConsoleError> {
        let out = self
            .tmux(&["display-message", "-t", &self.session, "-p", format])
            .await?;
        Ok(out.trim().to_string())
    }
}

#[async_trait]
impl ConsoleTransport for TmuxConsole {
    async fn session_exists(&self) -> bool {
        match self.run("tmux", &["has-session", "-t", &self.session]).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!(session = %self.session, error = %e, "tmux has-session failed");
                false
            }
        }
    }

    async fn agent_running(&self) -> bool {
        let pane_pid = match self.display("#{pane_pid}").await {
            Ok(pid) if !pid.is_empty() => pid,
            _ => return false,
        };
        match self
            .run("pgrep", &["-P", &pane_pid, "-f", &self.process_pattern])
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!(error = %e, "pgrep failed");
                false
            }
        }
    }

    async fn capture(&self) -> Result<String, ConsoleError> {
        let out = self.tmux(&["capture-pane", "-t", &self.session, "-p"]).await?;
        Ok(out.trim_end().to_string())
    }

    async fn capture_scrollback(&self, lines: u32) -> Result<String, ConsoleError> {
        let start = format!("-{}", lines);
        self.tmux(&["capture-pane", "-t", &self.session, "-p", "-S", &start])
            .await
    }

    async fn current_path(&self) -> Result<PathBuf, ConsoleError> {
        let path = self.display("#{pane_current_path}").await?;
        if path.is_empty() {
            return Ok(dirs::home_dir().unwrap_or_default());
        }
        Ok(PathBuf::from(path))
    }

    async fn send_literal(&self, text: &str) -> Result<(), ConsoleError> {
        self.tmux(&literal_args(&self.session, text))
            .await
            .map(|_| ())
    }

    async fn send_key(&self, key: Key) -> Result<(), ConsoleError> {
        self.tmux(&["send-keys", "-t", &self.session, key.tmux_name()])
            .await
            .map(|_| ())
    }
}

/// `send-keys` arguments typing `text` verbatim; `--` keeps a leading `-`
/// from being read as a flag
fn literal_args<'a>(session: &'a str, text: &'a str) -> [&'a str; 6] {
    ["send-keys", "-t", session, "-l", "--", text]
}
