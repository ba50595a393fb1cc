//! Inbound routing
//!
//! Turns webhook events into console keystrokes and short replies. Slow
//! actions (typing pulse, slash-command and shell passthrough) run as spawned
//! helper tasks that only touch the pending marker and the console; the pane
//! watcher owns everything else.
//!
//! Events are handled one at a time: `handle` holds the input lock for the
//! whole event, and helpers take it only around their own keystrokes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{
    CallbackAction, ChatId, ChatTransport, Control, Keyboard, MessageId, Outgoing, PaneKey,
};
use crate::config::{BridgeConfig, SignalPaths};
use crate::console::{ConsoleTransport, Key};
use crate::render::tail_chars;
use crate::screen::PromptClassifier;
use crate::sessions::{latest_session_id, recent_sessions, session_label};
use crate::signals::SignalStore;

const REACTION_ACCEPTED: &str = "\u{2705}";
const SCROLLBACK_LINES: u32 = 100;
const RECENT_SESSIONS: usize = 5;
const LOOP_MAX_ITERATIONS: u32 = 5;

/// The two kinds of inbound chat events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message {
        chat: ChatId,
        message_id: MessageId,
        text: String,
    },
    Button {
        callback_id: String,
        chat: Option<ChatId>,
        data: String,
    },
}

/// Router settings and keystroke pacing
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub tmux_session: String,
    pub agent_command: String,
    pub max_message_chars: usize,
    pub paths: SignalPaths,
    /// Pause after Escape before typing, default 200
    pub escape_settle_ms: u64,
    /// Pause after `/exit` before relaunching the agent, default 500
    pub exit_settle_ms: u64,
    /// Pause between typing the loop command and Enter, default 300
    pub loop_settle_ms: u64,
    /// Wait before capturing slash-command output, default 2500
    pub command_settle_ms: u64,
    /// Wait before capturing shell output, default 1500
    pub shell_settle_ms: u64,
    /// Pause between arrow keys, default 50
    pub arrow_step_ms: u64,
    /// Pause between the last arrow key and Enter, default 150
    pub select_settle_ms: u64,
    /// Typing indicator period, default 4000
    pub typing_interval_ms: u64,
}

impl RouterOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            tmux_session: config.tmux_session.clone(),
            agent_command: config.agent_command.clone(),
            max_message_chars: config.watcher.max_message_chars,
            paths: config.signal_paths(),
            escape_settle_ms: 200,
            exit_settle_ms: 500,
            loop_settle_ms: 300,
            command_settle_ms: 2_500,
            shell_settle_ms: 1_500,
            arrow_step_ms: 50,
            select_settle_ms: 150,
            typing_interval_ms: 4_000,
        }
    }
}

/// Handles inbound events. Cheap to clone; clones share the typing pulse.
#[derive(Clone)]
pub struct CommandRouter {
    options: Arc<RouterOptions>,
    store: Arc<dyn SignalStore>,
    chat: Arc<dyn ChatTransport>,
    console: Arc<dyn ConsoleTransport>,
    classifier: PromptClassifier,
    shutdown: CancellationToken,
    typing: Arc<Mutex<Option<CancellationToken>>>,
    input: Arc<Mutex<()>>,
}

impl CommandRouter {
    pub fn new(
        options: RouterOptions,
        store: Arc<dyn SignalStore>,
        chat: Arc<dyn ChatTransport>,
        console: Arc<dyn ConsoleTransport>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            store,
            chat,
            console,
            classifier: PromptClassifier::default(),
            shutdown: CancellationToken::new(),
            typing: Arc::new(Mutex::new(None)),
            input: Arc::new(Mutex::new(())),
        }
    }

    /// Cancel every running helper task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Handle one event. Concurrent calls queue behind each other so their
    /// keystrokes never interleave.
    pub async fn handle(&self, event: InboundEvent) -> anyhow::Result<()> {
        let _input = self.input.lock().await;
        match event {
            InboundEvent::Message {
                chat,
                message_id,
                text,
            } => self.handle_message(chat, message_id, &text).await,
            InboundEvent::Button {
                callback_id,
                chat,
                data,
            } => self.handle_button(&callback_id, chat, &data).await,
        }
    }

    // ============ Messages ============

    async fn handle_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> anyhow::Result<()> {
        if let Err(e) = self.store.save_chat_id(chat).await {
            warn!(error = %e, "Failed to save chat id");
        }

        if text.starts_with('/') && self.handle_command(chat, text).await? {
            return Ok(());
        }

        let preview: String = text.chars().take(50).collect();
        info!(chat = %chat, text = %preview, "Message");

        if !self.console.session_exists().await {
            self.reply(chat, "tmux not found").await;
            return Ok(());
        }

        if let Err(e) = self
            .chat
            .set_reaction(chat, message_id, REACTION_ACCEPTED)
            .await
        {
            debug!(error = %e, "Reaction failed");
        }

        if !self.console.agent_running().await {
            self.spawn_shell_passthrough(chat, text.to_string());
            return Ok(());
        }

        self.store.write_pending_marker().await?;
        self.start_typing(chat).await;
        self.console.send_literal(text).await?;
        self.console.send_key(Key::Enter).await?;
        Ok(())
    }

    /// Returns false when the command should be treated as a plain message
    async fn handle_command(&self, chat: ChatId, text: &str) -> anyhow::Result<bool> {
        let cmd = command_name(text);
        match cmd.as_str() {
            "/status" => {
                let status = if self.console.session_exists().await {
                    "running"
                } else {
                    "not found"
                };
                self.reply(
                    chat,
                    &format!("tmux '{}': {}", self.options.tmux_session, status),
                )
                .await;
            }
            "/stop" => {
                if self.console.session_exists().await {
                    self.console.send_key(Key::Escape).await?;
                }
                self.store.clear_pending_marker().await;
                self.cancel_typing().await;
                self.reply(chat, "Interrupted").await;
            }
            "/clear" => {
                if !self.require_session(chat).await {
                    return Ok(true);
                }
                self.console.send_key(Key::Escape).await?;
                self.pause(self.options.escape_settle_ms).await;
                self.console.send_literal("/clear").await?;
                self.console.send_key(Key::Enter).await?;
                self.reply(chat, "Cleared").await;
            }
            "/continue_" => {
                if !self.require_session(chat).await {
                    return Ok(true);
                }
                self.relaunch_agent(&["--continue"]).await?;
                self.reply(chat, "Continuing...").await;
            }
            "/loop" => {
                if !self.require_session(chat).await {
                    return Ok(true);
                }
                let prompt = text
                    .split_once(char::is_whitespace)
                    .map(|(_, rest)| rest.trim())
                    .unwrap_or("");
                if prompt.is_empty() {
                    self.reply(chat, "Usage: /loop <prompt>").await;
                    return Ok(true);
                }
                self.store.write_pending_marker().await?;
                self.start_typing(chat).await;
                self.console.send_literal(&loop_command(prompt)).await?;
                self.pause(self.options.loop_settle_ms).await;
                self.console.send_key(Key::Enter).await?;
                self.reply(
                    chat,
                    &format!("Ralph Loop started (max {} iterations)", LOOP_MAX_ITERATIONS),
                )
                .await;
            }
            "/resume" => self.send_session_picker(chat).await,
            _ => {
                if !self.console.agent_running().await {
                    return Ok(false);
                }
                self.spawn_command_passthrough(chat, text.to_string());
            }
        }
        Ok(true)
    }

    async fn send_session_picker(&self, chat: ChatId) {
        let sessions = recent_sessions(&self.options.paths.history, RECENT_SESSIONS).await;
        if sessions.is_empty() {
            self.reply(chat, "No sessions").await;
            return;
        }

        let mut keyboard = Keyboard::new().row(vec![Control::new(
            "Continue most recent",
            &CallbackAction::ContinueRecent,
        )]);
        for entry in &sessions {
            if let Some(id) = latest_session_id(&self.options.paths.projects_dir, &entry.project).await
            {
                keyboard.push_row(vec![Control::new(
                    session_label(entry),
                    &CallbackAction::Resume(id),
                )]);
            }
        }

        let message = Outgoing::plain("Select session:").with_keyboard(keyboard);
        if let Err(e) = self.chat.send_message(chat, message).await {
            warn!(error = %e, "Failed to send session picker");
        }
    }

    // ============ Buttons ============

    async fn handle_button(
        &self,
        callback_id: &str,
        chat: Option<ChatId>,
        data: &str,
    ) -> anyhow::Result<()> {
        if let Err(e) = self.chat.answer_callback(callback_id).await {
            debug!(error = %e, "answerCallbackQuery failed");
        }

        if !self.console.session_exists().await {
            if let Some(chat) = chat {
                self.reply(chat, "tmux session not found").await;
            }
            return Ok(());
        }

        let Some(action) = CallbackAction::parse(data) else {
            debug!(data, "Unknown callback data");
            return Ok(());
        };

        match action {
            CallbackAction::Pane(PaneKey::Yes) => {
                self.console.send_literal("y").await?;
                self.console.send_key(Key::Enter).await?;
            }
            CallbackAction::Pane(PaneKey::No) => {
                self.console.send_literal("n").await?;
                self.console.send_key(Key::Enter).await?;
            }
            CallbackAction::Pane(PaneKey::Enter) => self.console.send_key(Key::Enter).await?,
            CallbackAction::Pane(PaneKey::Esc) => self.console.send_key(Key::Escape).await?,
            CallbackAction::Select { ordinal, .. } => self.select_option(ordinal).await?,
            CallbackAction::Resume(session_id) => {
                self.relaunch_agent(&["--resume", &session_id]).await?;
                if let Some(chat) = chat {
                    let short: String = session_id.chars().take(8).collect();
                    self.reply(chat, &format!("Resuming: {}...", short)).await;
                }
            }
            CallbackAction::ContinueRecent => {
                self.relaunch_agent(&["--continue"]).await?;
                if let Some(chat) = chat {
                    self.reply(chat, "Continuing most recent...").await;
                }
            }
        }
        Ok(())
    }

    /// Move the selection cursor to `target` and confirm. The current position
    /// is read from a fresh capture since the list may have been redrawn.
    async fn select_option(&self, target: u32) -> anyhow::Result<()> {
        let current = match self.console.capture().await {
            Ok(screen) => self.classifier.current_cursor_ordinal(&screen).unwrap_or(1),
            Err(e) => {
                debug!(error = %e, "Capture before selection failed");
                1
            }
        };

        let key = if target > current { Key::Down } else { Key::Up };
        for _ in 0..target.abs_diff(current) {
            self.console.send_key(key).await?;
            self.pause(self.options.arrow_step_ms).await;
        }
        self.pause(self.options.select_settle_ms).await;
        self.console.send_key(Key::Enter).await?;
        info!(ordinal = target, from = current, "Option selected");
        Ok(())
    }

    // ============ Helpers ============

    async fn relaunch_agent(&self, args: &[&str]) -> anyhow::Result<()> {
        self.console.send_key(Key::Escape).await?;
        self.pause(self.options.escape_settle_ms).await;
        self.console.send_literal("/exit").await?;
        self.console.send_key(Key::Enter).await?;
        self.pause(self.options.exit_settle_ms).await;
        self.console
            .send_literal(&launch_command(&self.options.agent_command, args))
            .await?;
        self.console.send_key(Key::Enter).await?;
        Ok(())
    }

    async fn require_session(&self, chat: ChatId) -> bool {
        if self.console.session_exists().await {
            return true;
        }
        self.reply(chat, "tmux not found").await;
        false
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.chat.send_message(chat, Outgoing::plain(text)).await {
            warn!(chat = %chat, error = %e, "Reply failed");
        }
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Send the typing indicator while the pending marker exists. Replaces
    /// any pulse already running.
    async fn start_typing(&self, chat: ChatId) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.typing.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let store = self.store.clone();
        let transport = self.chat.clone();
        let interval = Duration::from_millis(self.options.typing_interval_ms);
        tokio::spawn(async move {
            while !token.is_cancelled() && store.pending_marker().await.is_some() {
                if let Err(e) = transport.send_typing(chat).await {
                    debug!(error = %e, "Typing indicator failed");
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(chat = %chat, "Typing pulse ended");
        });
    }

    async fn cancel_typing(&self) {
        if let Some(token) = self.typing.lock().await.take() {
            token.cancel();
        }
    }

    /// Type `text` and Enter from a helper task, queued behind inbound events
    async fn type_line(&self, text: &str) -> anyhow::Result<()> {
        let _input = self.input.lock().await;
        self.console.send_literal(text).await?;
        self.console.send_key(Key::Enter).await?;
        Ok(())
    }

    /// Run an agent slash command and relay what it printed
    fn spawn_command_passthrough(&self, chat: ChatId, command: String) {
        let router = self.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = router.command_passthrough(chat, &command) => {
                    if let Err(e) = result {
                        router.reply(chat, &format!("Error: {}", e)).await;
                    }
                }
            }
        });
    }

    async fn command_passthrough(&self, chat: ChatId, command: &str) -> anyhow::Result<()> {
        self.type_line(command).await?;
        self.pause(self.options.command_settle_ms).await;

        let raw = self.console.capture().await?;
        let patterns = self.classifier.patterns();
        let out = raw
            .split('\n')
            .filter(|line| {
                let stripped = line.trim();
                !stripped.is_empty() && !patterns.is_command_noise(stripped)
            })
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        let out = out.trim();
        if !out.is_empty() {
            self.reply(chat, tail_chars(out, self.options.max_message_chars))
                .await;
        }
        Ok(())
    }

    /// Run a shell command in the pane (agent not running) and relay its output
    fn spawn_shell_passthrough(&self, chat: ChatId, command: String) {
        let router = self.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = router.shell_passthrough(chat, &command) => {
                    if let Err(e) = result {
                        router.reply(chat, &format!("Error: {}", e)).await;
                    }
                }
            }
        });
    }

    async fn shell_passthrough(&self, chat: ChatId, command: &str) -> anyhow::Result<()> {
        let cwd = self.console.current_path().await?;
        debug!(cwd = %cwd.display(), command, "Shell passthrough");

        self.type_line(command).await?;
        self.pause(self.options.shell_settle_ms).await;

        let raw = self.console.capture_scrollback(SCROLLBACK_LINES).await?;
        let output = extract_shell_output(&raw, command);
        let output = if output.is_empty() {
            "(no output)"
        } else {
            output.as_str()
        };
        self.reply(chat, tail_chars(output, self.options.max_message_chars))
            .await;
        Ok(())
    }
}

/// `/cmd@bot args` → `/cmd`, lowercased
fn command_name(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or("");
    let name = first.split('@').next().unwrap_or(first);
    name.to_lowercase()
}

/// Ralph loop invocation for `prompt`
fn loop_command(prompt: &str) -> String {
    let full = format!(
        "{} Output <promise>DONE</promise> when complete.",
        prompt.replace('"', "\\\"")
    );
    format!(
        "/ralph-loop:ralph-loop \"{}\" --max-iterations {} --completion-promise \"DONE\"",
        full, LOOP_MAX_ITERATIONS
    )
}

/// Insert `args` right after the program name of `base`
fn launch_command(base: &str, args: &[&str]) -> String {
    let base = base.trim();
    let (program, rest) = base.split_once(char::is_whitespace).unwrap_or((base, ""));
    let mut parts = vec![program];
    parts.extend_from_slice(args);
    if !rest.trim().is_empty() {
        parts.push(rest.trim());
    }
    parts.join(" ")
}

/// Output of the last shell command in a scrollback capture: the lines
/// between the echoed command and the trailing prompt
pub fn extract_shell_output(raw: &str, command: &str) -> String {
    let command = command.trim();
    let mut output: Vec<&str> = Vec::new();
    let mut past_prompt = false;

    for line in raw.trim_end().split('\n').rev() {
        if !past_prompt {
            let stripped = line.trim();
            if stripped.ends_with('$') || stripped.ends_with('#') || stripped.ends_with('%') {
                continue;
            }
            past_prompt = true;
        }
        if line.contains(command) {
            break;
        }
        output.push(line);
    }

    output.reverse();
    output.join("\n").trim().to_string()
}
