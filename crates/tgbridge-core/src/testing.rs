//! In-memory transports for unit tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::chat::{ChatId, ChatTransport, Keyboard, Markup, MessageId, Outgoing};
use crate::console::{ConsoleTransport, Key};
use crate::error::{ConsoleError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Send {
        chat: ChatId,
        message: Outgoing,
    },
    EditText {
        chat: ChatId,
        message_id: MessageId,
        message: Outgoing,
    },
    EditControls {
        chat: ChatId,
        message_id: MessageId,
        keyboard: Keyboard,
    },
    Answer(String),
    Typing(ChatId),
    Reaction {
        chat: ChatId,
        message_id: MessageId,
        emoji: String,
    },
}

/// Records every call; message ids count up from 100
pub struct RecordingChat {
    calls: Mutex<Vec<ChatCall>>,
    next_id: AtomicI64,
    reject_html: AtomicBool,
    failing_sends: AtomicUsize,
}

impl Default for RecordingChat {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            reject_html: AtomicBool::new(false),
            failing_sends: AtomicUsize::new(0),
        }
    }
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every HTML-markup send/edit, like Telegram does on bad entities
    pub fn reject_html(&self) {
        self.reject_html.store(true, Ordering::SeqCst);
    }

    /// Fail the next `count` sendMessage calls
    pub fn fail_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Texts of all sent messages, in order
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Send { message, .. } => Some(message.text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChatCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_markup(&self, message: &Outgoing) -> Result<(), TransportError> {
        if message.markup == Markup::Html && self.reject_html.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                method: "test",
                description: "can't parse entities".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_message(
        &self,
        chat: ChatId,
        message: Outgoing,
    ) -> Result<MessageId, TransportError> {
        let rejected = self.check_markup(&message);
        self.record(ChatCall::Send { chat, message });
        rejected?;
        let failing = self.failing_sends.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_sends.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Rejected {
                method: "sendMessage",
                description: "Too Many Requests".to_string(),
            });
        }
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit_message_text(
        &self,
        chat: ChatId,
        message_id: MessageId,
        message: Outgoing,
    ) -> Result<(), TransportError> {
        let rejected = self.check_markup(&message);
        self.record(ChatCall::EditText {
            chat,
            message_id,
            message,
        });
        rejected
    }

    async fn edit_message_controls(
        &self,
        chat: ChatId,
        message_id: MessageId,
        keyboard: Keyboard,
    ) -> Result<(), TransportError> {
        self.record(ChatCall::EditControls {
            chat,
            message_id,
            keyboard,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.record(ChatCall::Answer(callback_id.to_string()));
        Ok(())
    }

    async fn send_typing(&self, chat: ChatId) -> Result<(), TransportError> {
        self.record(ChatCall::Typing(chat));
        Ok(())
    }

    async fn set_reaction(
        &self,
        chat: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        self.record(ChatCall::Reaction {
            chat,
            message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Literal(String),
    Key(Key),
}

/// Scripted console: flags and screen contents are set by the test
pub struct FakeConsole {
    session: AtomicBool,
    agent: AtomicBool,
    screen: Mutex<String>,
    scrollback: Mutex<String>,
    inputs: Mutex<Vec<ConsoleInput>>,
    input_delay: Mutex<Duration>,
}

impl Default for FakeConsole {
    fn default() -> Self {
        Self {
            session: AtomicBool::new(true),
            agent: AtomicBool::new(true),
            screen: Mutex::new(String::new()),
            scrollback: Mutex::new(String::new()),
            inputs: Mutex::new(Vec::new()),
            input_delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl FakeConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_screen(&self, content: &str) {
        *self.screen.lock().unwrap() = content.to_string();
    }

    pub fn set_scrollback(&self, content: &str) {
        *self.scrollback.lock().unwrap() = content.to_string();
    }

    pub fn set_session(&self, exists: bool) {
        self.session.store(exists, Ordering::SeqCst);
    }

    pub fn set_agent(&self, running: bool) {
        self.agent.store(running, Ordering::SeqCst);
    }

    /// Latency of every literal send, like a tmux subprocess
    pub fn set_input_delay(&self, delay: Duration) {
        *self.input_delay.lock().unwrap() = delay;
    }

    pub fn inputs(&self) -> Vec<ConsoleInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsoleTransport for FakeConsole {
    async fn session_exists(&self) -> bool {
        self.session.load(Ordering::SeqCst)
    }

    async fn agent_running(&self) -> bool {
        self.agent.load(Ordering::SeqCst)
    }

    async fn capture(&self) -> Result<String, ConsoleError> {
        Ok(self.screen.lock().unwrap().clone())
    }

    async fn capture_scrollback(&self, _lines: u32) -> Result<String, ConsoleError> {
        Ok(self.scrollback.lock().unwrap().clone())
    }

    async fn current_path(&self) -> Result<PathBuf, ConsoleError> {
        Ok(PathBuf::from("/tmp"))
    }

    async fn send_literal(&self, text: &str) -> Result<(), ConsoleError> {
        let delay = *self.input_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inputs
            .lock()
            .unwrap()
            .push(ConsoleInput::Literal(text.to_string()));
        Ok(())
    }

    async fn send_key(&self, key: Key) -> Result<(), ConsoleError> {
        self.inputs.lock().unwrap().push(ConsoleInput::Key(key));
        Ok(())
    }
}
