//! Console transport
//!
//! # Components
//! - `ConsoleTransport`: what the bridge needs from the terminal hosting the agent
//! - `tmux`: implementation shelling out to the `tmux` CLI

mod tmux;

pub use tmux::TmuxConsole;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ConsoleError;

/// Named keys the bridge injects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Up,
    Down,
}

impl Key {
    /// tmux `send-keys` key name
    pub fn tmux_name(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Up => "Up",
            Key::Down => "Down",
        }
    }
}

/// Operations against the console session.
///
/// Liveness checks never fail: an unreachable session is simply absent.
/// Concurrent keystroke injection from several tasks is not serialized here.
#[async_trait]
pub trait ConsoleTransport: Send + Sync {
    async fn session_exists(&self) -> bool;

    /// Whether the agent process is running inside the session
    async fn agent_running(&self) -> bool;

    /// Visible screen text
    async fn capture(&self) -> Result<String, ConsoleError>;

    /// Screen text including `lines` lines of scrollback
    async fn capture_scrollback(&self, lines: u32) -> Result<String, ConsoleError>;

    /// Working directory of the session's foreground pane
    async fn current_path(&self) -> Result<PathBuf, ConsoleError>;

    async fn send_literal(&self, text: &str) -> Result<(), ConsoleError>;

    async fn send_key(&self, key: Key) -> Result<(), ConsoleError>;
}
