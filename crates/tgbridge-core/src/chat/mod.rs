//! Chat transport
//!
//! # Components
//! - `ChatTransport`: the operations the bridge needs from a chat service
//! - `keyboard`: inline controls and the callback data codec
//! - `telegram`: Bot API implementation over HTTP

mod keyboard;
mod telegram;

pub use keyboard::{CallbackAction, Control, Keyboard, PaneKey};
pub use telegram::{BotCommand, TelegramClient, Update, BOT_COMMANDS};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Conversation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChatId)
    }
}

/// Message identifier within a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Markup {
    #[default]
    Plain,
    Html,
}

/// Outbound message body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outgoing {
    pub text: String,
    pub markup: Markup,
    pub keyboard: Option<Keyboard>,
}

impl Outgoing {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Plain,
            keyboard: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Html,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Operations the bridge performs against the chat service.
///
/// Only message creation has a result the caller depends on (the new id);
/// everything else is advisory.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat: ChatId, message: Outgoing)
        -> Result<MessageId, TransportError>;

    async fn edit_message_text(
        &self,
        chat: ChatId,
        message_id: MessageId,
        message: Outgoing,
    ) -> Result<(), TransportError>;

    async fn edit_message_controls(
        &self,
        chat: ChatId,
        message_id: MessageId,
        keyboard: Keyboard,
    ) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;

    async fn send_typing(&self, chat: ChatId) -> Result<(), TransportError>;

    async fn set_reaction(
        &self,
        chat: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), TransportError>;
}
