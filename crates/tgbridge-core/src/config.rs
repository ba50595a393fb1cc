//! Bridge configuration
//!
//! Loaded once at startup from an optional YAML file, then overridden by the
//! environment variables the bridge has always honoured (`TMUX_SESSION`,
//! `TELEGRAM_BOT_TOKEN`, `PORT`, `TELEGRAM_PROXY`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Watcher timings and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WatcherConfig {
    /// Delay before the first tick, default 10000
    pub startup_delay_ms: u64,
    /// Interval between ticks, default 2000
    pub poll_interval_ms: u64,
    /// Minimum interval between live message updates, default 3000
    pub live_interval_ms: u64,
    /// Screen stability required before prompt detection, default 4000
    pub idle_threshold_ms: u64,
    /// Minimum interval between prompt forwards, default 15000
    pub forward_cooldown_ms: u64,
    /// Pending marker age after which an orphaned marker is removed, default 10000
    pub pending_stale_ms: u64,
    /// How long a resolved transcript location is trusted, default 10000
    pub location_ttl_ms: u64,
    /// Max characters per outbound message, default 4000
    pub max_message_chars: usize,
    /// Lines kept when forwarding raw screen text, default 25
    pub fallback_tail_lines: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 10_000,
            poll_interval_ms: 2_000,
            live_interval_ms: 3_000,
            idle_threshold_ms: 4_000,
            forward_cooldown_ms: 15_000,
            pending_stale_ms: 10_000,
            location_ttl_ms: 10_000,
            max_message_chars: 4_000,
            fallback_tail_lines: 25,
        }
    }
}

impl WatcherConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn live_interval(&self) -> Duration {
        Duration::from_millis(self.live_interval_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn forward_cooldown(&self) -> Duration {
        Duration::from_millis(self.forward_cooldown_ms)
    }

    pub fn pending_stale(&self) -> Duration {
        Duration::from_millis(self.pending_stale_ms)
    }

    pub fn location_ttl(&self) -> Duration {
        Duration::from_millis(self.location_ttl_ms)
    }
}

/// Locations of the marker files shared with the Claude Code hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SignalPaths {
    pub chat_id: PathBuf,
    pub pending: PathBuf,
    pub final_answer: PathBuf,
    pub transcript_hint: PathBuf,
    pub history: PathBuf,
    pub projects_dir: PathBuf,
}

impl SignalPaths {
    /// Standard layout under a Claude home directory
    pub fn under(claude_home: &Path) -> Self {
        Self {
            chat_id: claude_home.join("telegram_chat_id"),
            pending: claude_home.join("telegram_pending"),
            final_answer: claude_home.join("telegram_hook_response"),
            transcript_hint: claude_home.join("telegram_transcript_path"),
            history: claude_home.join("history.jsonl"),
            projects_dir: claude_home.join("projects"),
        }
    }
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    pub tmux_session: String,
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub port: u16,
    pub proxy: Option<String>,
    /// Claude home directory, defaults to ~/.claude
    pub claude_home: PathBuf,
    /// Overrides the standard marker layout under `claude_home`
    pub paths: Option<SignalPaths>,
    /// Command line used to (re)launch the agent inside tmux
    pub agent_command: String,
    /// `pgrep -f` pattern identifying the agent process in the pane
    pub agent_process_pattern: String,
    /// Timeout for HTTP and tmux calls, default 10000
    pub io_timeout_ms: u64,
    pub watcher: WatcherConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tmux_session: "claude".to_string(),
            bot_token: String::new(),
            port: 8080,
            proxy: None,
            claude_home: default_claude_home(),
            paths: None,
            agent_command: "claude --dangerously-skip-permissions".to_string(),
            agent_process_pattern: "claude".to_string(),
            io_timeout_ms: 10_000,
            watcher: WatcherConfig::default(),
        }
    }
}

fn default_claude_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".claude"))
        .unwrap_or_else(|| PathBuf::from(".claude"))
}

impl BridgeConfig {
    /// Load from the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), reading `path` instead of the default file
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(config_path_from_env);
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`, so tests need not touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(session) = lookup("TMUX_SESSION").filter(|s| !s.is_empty()) {
            self.tmux_session = session;
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.bot_token = token;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(proxy) = lookup("TELEGRAM_PROXY") {
            self.proxy = if proxy.is_empty() { None } else { Some(proxy) };
        }
        Ok(())
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        if self.bot_token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(&self.bot_token)
    }

    pub fn signal_paths(&self) -> SignalPaths {
        self.paths
            .clone()
            .unwrap_or_else(|| SignalPaths::under(&self.claude_home))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.claude_home.join("logs")
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TGBRIDGE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = default_claude_home().join("telegram_bridge.yaml");
    default.exists().then_some(default)
}
