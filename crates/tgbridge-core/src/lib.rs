//! tgbridge-core
//!
//! Relays a Claude Code agent running in tmux to a Telegram chat.
//!
//! # Components
//! - `watcher`: the reconciliation loop turning transcript, final answer and
//!   screen captures into chat messages
//! - `transcript`, `render`, `screen`, `lifecycle`: the pieces it sequences
//! - `signals`: marker files shared with the Claude Code hooks
//! - `router`: inbound messages and button presses
//! - `chat`, `console`: Telegram and tmux transports
//! - `sessions`: recent-session lookup for `/resume`
//! - `config`, `error`

pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod lifecycle;
pub mod render;
pub mod router;
pub mod screen;
pub mod sessions;
pub mod signals;
pub mod transcript;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatId, ChatTransport, MessageId, TelegramClient};
pub use config::{BridgeConfig, SignalPaths, WatcherConfig};
pub use console::{ConsoleTransport, TmuxConsole};
pub use error::{ConfigError, ConsoleError, TransportError};
pub use router::{CommandRouter, InboundEvent, RouterOptions};
pub use signals::{FileSignalStore, FinalAnswer, SignalStore};
pub use watcher::{PaneWatcher, TickOutcome};
