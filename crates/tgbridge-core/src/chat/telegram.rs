//! Telegram Bot API client
//!
//! Every call is a JSON POST to `https://api.telegram.org/bot<token>/<method>`.
//! Telegram reports failures as `{"ok": false, "description": ...}` (usually
//! with a 4xx status), so the body is inspected instead of the status code.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatId, ChatTransport, Keyboard, Markup, MessageId, Outgoing};
use crate::error::TransportError;
use crate::router::InboundEvent;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Entry of the bot command menu
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

/// Commands registered with `setMyCommands` at startup
pub const BOT_COMMANDS: &[BotCommand] = &[
    BotCommand {
        command: "clear",
        description: "Clear conversation",
    },
    BotCommand {
        command: "resume",
        description: "Resume session (shows picker)",
    },
    BotCommand {
        command: "continue_",
        description: "Continue most recent session",
    },
    BotCommand {
        command: "loop",
        description: "Ralph Loop: /loop <prompt>",
    },
    BotCommand {
        command: "stop",
        description: "Interrupt Claude (Escape)",
    },
    BotCommand {
        command: "status",
        description: "Check tmux status",
    },
];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(
        token: impl Into<String>,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|source| TransportError::Http {
                method: "proxy",
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        let http = builder.build().map_err(|source| TransportError::Http {
            method: "client",
            source,
        })?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        })
    }

    /// Point the client at another Bot API server (local bot API, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &'static str, body: Value) -> Result<Value, TransportError> {
        if self.token.is_empty() {
            return Err(TransportError::Disabled);
        }
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| TransportError::Http { method, source })?;
        let response: ApiResponse = response
            .json()
            .await
            .map_err(|source| TransportError::Http { method, source })?;

        if !response.ok {
            return Err(TransportError::Rejected {
                method,
                description: response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        debug!(method, "Telegram call ok");
        Ok(response.result)
    }

    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TransportError> {
        self.call("setMyCommands", json!({ "commands": commands }))
            .await
            .map(|_| ())
    }
}

fn message_payload(chat: ChatId, message: &Outgoing) -> Value {
    let mut body = json!({
        "chat_id": chat,
        "text": message.text,
    });
    if message.markup == Markup::Html {
        body["parse_mode"] = json!("HTML");
    }
    if let Some(keyboard) = &message.keyboard {
        body["reply_markup"] = json!(keyboard);
    }
    body
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        message: Outgoing,
    ) -> Result<MessageId, TransportError> {
        let result = self
            .call("sendMessage", message_payload(chat, &message))
            .await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .map(MessageId)
            .ok_or(TransportError::Malformed {
                method: "sendMessage",
                reason: "missing message_id".to_string(),
            })
    }

    async fn edit_message_text(
        &self,
        chat: ChatId,
        message_id: MessageId,
        message: Outgoing,
    ) -> Result<(), TransportError> {
        let mut body = message_payload(chat, &message);
        body["message_id"] = json!(message_id);
        self.call("editMessageText", body).await.map(|_| ())
    }

    async fn edit_message_controls(
        &self,
        chat: ChatId,
        message_id: MessageId,
        keyboard: Keyboard,
    ) -> Result<(), TransportError> {
        self.call(
            "editMessageReplyMarkup",
            json!({
                "chat_id": chat,
                "message_id": message_id,
                "reply_markup": keyboard,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await
        .map(|_| ())
    }

    async fn send_typing(&self, chat: ChatId) -> Result<(), TransportError> {
        self.call(
            "sendChatAction",
            json!({ "chat_id": chat, "action": "typing" }),
        )
        .await
        .map(|_| ())
    }

    async fn set_reaction(
        &self,
        chat: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        self.call(
            "setMessageReaction",
            json!({
                "chat_id": chat,
                "message_id": message_id,
                "reaction": [{ "type": "emoji", "emoji": emoji }],
            }),
        )
        .await
        .map(|_| ())
    }
}

// ============ Webhook payloads ============

/// Incoming webhook update (only the fields the bridge reads)
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

impl Update {
    /// Button presses take precedence; text-less messages are ignored
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(cb) = self.callback_query {
            return Some(InboundEvent::Button {
                callback_id: cb.id,
                chat: cb.message.map(|m| ChatId(m.chat.id)),
                data: cb.data.unwrap_or_default(),
            });
        }
        let message = self.message?;
        let text = message.text.filter(|t| !t.is_empty())?;
        Some(InboundEvent::Message {
            chat: ChatId(message.chat.id),
            message_id: MessageId(message.message_id),
            text,
        })
    }
}
