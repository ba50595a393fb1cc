//! Pane watcher
//!
//! Fixed-interval reconciliation loop. Each tick reads the three signal
//! sources (transcript, final-answer artifact, screen capture) and turns them
//! into at most a few chat calls:
//!
//! 1. no tmux session: skip
//! 2. pending marker changed: a new Telegram turn, drop cycle state
//! 3. pending marker stale and agent gone: remove it, skip
//! 4. poll the transcript
//! 5. final answer present: finalize, end tick
//! 6. live update of the rendered transcript (rate limited)
//! 7. capture the screen; nothing captured ends the tick
//! 8. track stability; a change invalidates the finalized message as a target
//! 9. stable interactive prompt not yet forwarded: forward it with controls
//!
//! The watcher is the only mutator of its state, so nothing here is locked.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::Context;
use futures_util::FutureExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatTransport, Outgoing};
use crate::config::WatcherConfig;
use crate::console::ConsoleTransport;
use crate::lifecycle::MessageLifecycle;
use crate::render::{render, tail_chars};
use crate::screen::{clean_tail, option_lines, PromptClassifier, SnapshotDiffer};
use crate::signals::{SignalStore, TranscriptLocator};
use crate::transcript::{ResponseCycle, TranscriptEvent, TranscriptReader};

/// What a tick ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Console session absent
    NoSession,
    /// Orphaned pending marker removed
    StalePending,
    /// Final answer consumed
    Finalized,
    /// Screen capture failed or was empty
    NoSnapshot,
    /// Screen observed, nothing forwarded
    Observed,
    /// Interactive prompt forwarded
    Forwarded,
}

/// Last forwarded prompt, for dedup
#[derive(Debug, Clone)]
struct ForwardRecord {
    content: String,
    at: Instant,
}

pub struct PaneWatcher {
    config: WatcherConfig,
    store: Arc<dyn SignalStore>,
    chat: Arc<dyn ChatTransport>,
    console: Arc<dyn ConsoleTransport>,
    classifier: PromptClassifier,
    locator: TranscriptLocator,
    reader: TranscriptReader,
    cycle: ResponseCycle,
    lifecycle: MessageLifecycle,
    differ: SnapshotDiffer,
    last_forward: Option<ForwardRecord>,
    pending_seen: Option<SystemTime>,
}

impl PaneWatcher {
    pub fn new(
        config: WatcherConfig,
        store: Arc<dyn SignalStore>,
        chat: Arc<dyn ChatTransport>,
        console: Arc<dyn ConsoleTransport>,
    ) -> Self {
        Self {
            locator: TranscriptLocator::new(config.location_ttl()),
            config,
            store,
            chat,
            console,
            classifier: PromptClassifier::default(),
            reader: TranscriptReader::new(),
            cycle: ResponseCycle::new(),
            lifecycle: MessageLifecycle::new(),
            differ: SnapshotDiffer::new(),
            last_forward: None,
            pending_seen: None,
        }
    }

    pub fn with_classifier(mut self, classifier: PromptClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn cycle(&self) -> &ResponseCycle {
        &self.cycle
    }

    pub fn reader(&self) -> &TranscriptReader {
        &self.reader
    }

    pub fn lifecycle(&self) -> &MessageLifecycle {
        &self.lifecycle
    }

    /// Run for the life of the process
    pub async fn run(mut self) {
        tokio::time::sleep(self.config.startup_delay()).await;
        self.prime(Instant::now()).await;
        info!(
            poll_ms = self.config.poll_interval_ms,
            "Pane watcher started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = Instant::now();
            match AssertUnwindSafe(self.tick(now)).catch_unwind().await {
                Ok(Ok(outcome)) => debug!(?outcome, "Tick"),
                Ok(Err(e)) => warn!(error = %e, "Tick failed"),
                Err(panic) => error!(panic = %panic_message(&panic), "Tick panicked"),
            }
        }
    }

    /// Position the reader at the end of the current transcript, so history
    /// written before startup is never relayed
    pub async fn prime(&mut self, now: Instant) {
        if let Some(path) = self.locator.resolve(self.store.as_ref(), now).await {
            self.reader.prime(&path).await;
            info!(path = %path.display(), cursor = self.reader.cursor(), "Transcript primed");
        }
    }

    pub async fn tick(&mut self, now: Instant) -> anyhow::Result<TickOutcome> {
        if !self.console.session_exists().await {
            return Ok(TickOutcome::NoSession);
        }

        if let Some(mtime) = self.store.pending_marker().await {
            if self.pending_seen != Some(mtime) {
                self.pending_seen = Some(mtime);
                self.clear_cycle();
                self.locator.invalidate();
                debug!("New pending turn, cycle state cleared");
            }

            let age = SystemTime::now()
                .duration_since(mtime)
                .unwrap_or_default();
            if age > self.config.pending_stale() && !self.console.agent_running().await {
                self.store.clear_pending_marker().await;
                info!(age_ms = age.as_millis() as u64, "Removed stale pending marker");
                return Ok(TickOutcome::StalePending);
            }
        }

        self.poll_transcript(now).await;

        if let Some(answer) = self.store.take_final_answer().await {
            match self.store.chat_id().await {
                Some(chat) => {
                    self.lifecycle
                        .finalize(self.chat.as_ref(), chat, &answer, now)
                        .await;
                    self.cycle.clear();
                    self.reader.advance_to_end().await;
                }
                None => warn!("Final answer arrived before any chat id was known"),
            }
            return Ok(TickOutcome::Finalized);
        }

        if !self.cycle.is_empty() && self.lifecycle.live_due(now, self.config.live_interval()) {
            let text = render(self.cycle.fragments(), self.config.max_message_chars);
            if !text.is_empty() && text != self.lifecycle.last_live_text() {
                if let Some(chat) = self.store.chat_id().await {
                    self.lifecycle
                        .update_live(self.chat.as_ref(), chat, &text, now)
                        .await;
                }
            }
        }

        let content = match self.console.capture().await {
            Ok(content) if !content.is_empty() => content,
            Ok(_) => return Ok(TickOutcome::NoSnapshot),
            Err(e) => {
                debug!(error = %e, "Screen capture failed");
                return Ok(TickOutcome::NoSnapshot);
            }
        };

        let observation = self.differ.observe(&content, now);
        if observation.changed {
            self.lifecycle.invalidate_finalized();
        }

        let already_forwarded = self
            .last_forward
            .as_ref()
            .map_or(false, |f| f.content == content);
        let cooled_down = self.last_forward.as_ref().map_or(true, |f| {
            now.saturating_duration_since(f.at) >= self.config.forward_cooldown()
        });

        if observation.stable_for >= self.config.idle_threshold()
            && !observation.changed
            && !already_forwarded
            && cooled_down
            && self.classifier.is_interactive(&content)
        {
            self.last_forward = Some(ForwardRecord {
                content: content.clone(),
                at: now,
            });
            if self.forward(&content).await? {
                return Ok(TickOutcome::Forwarded);
            }
        }

        Ok(TickOutcome::Observed)
    }

    async fn poll_transcript(&mut self, now: Instant) {
        let Some(path) = self.locator.resolve(self.store.as_ref(), now).await else {
            return;
        };
        let poll = self.reader.poll(&path).await;
        if poll.adopted {
            self.clear_cycle();
        }
        let boundary = poll
            .events
            .iter()
            .any(|e| matches!(e, TranscriptEvent::CycleBoundary));
        self.cycle.apply(poll.events);
        if boundary {
            self.lifecycle.reset_cycle();
        }
    }

    /// Returns false when there was nothing to send
    async fn forward(&mut self, content: &str) -> anyhow::Result<bool> {
        let Some(chat) = self.store.chat_id().await else {
            debug!("Interactive prompt seen but no chat id known");
            return Ok(false);
        };

        let options = self.classifier.parse_options(content);
        let keyboard = self.classifier.build_controls(&options, content);
        let max_chars = self.config.max_message_chars;

        // Clear live bookkeeping even if the transport call fails
        let target = self.lifecycle.prompt_target();
        self.lifecycle.after_forward();

        if let Some(message_id) = target {
            self.chat
                .edit_message_controls(chat, message_id, keyboard)
                .await
                .with_context(|| format!("attach controls to message {}", message_id))?;
            info!(message_id = %message_id, options = options.len(), "Controls attached");
        } else if !self.cycle.is_empty() {
            let base = render(self.cycle.fragments(), max_chars);
            let text = if options.is_empty() {
                base
            } else if base.is_empty() {
                option_lines(&options)
            } else {
                format!("{}\n\n{}", base, option_lines(&options))
            };
            self.chat
                .send_message(
                    chat,
                    Outgoing::plain(tail_chars(&text, max_chars)).with_keyboard(keyboard),
                )
                .await
                .context("send transcript prompt")?;
            info!(options = options.len(), "Transcript prompt forwarded");
        } else {
            let text = clean_tail(
                content,
                self.config.fallback_tail_lines,
                self.classifier.patterns(),
            );
            if text.is_empty() {
                return Ok(false);
            }
            self.chat
                .send_message(
                    chat,
                    Outgoing::plain(tail_chars(&text, max_chars)).with_keyboard(keyboard),
                )
                .await
                .context("send screen prompt")?;
            info!(options = options.len(), "Screen prompt forwarded");
        }
        Ok(true)
    }

    fn clear_cycle(&mut self) {
        self.cycle.clear();
        self.lifecycle.reset_cycle();
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use crate::chat::{ChatId, MessageId};
    use crate::config::SignalPaths;
    use crate::lifecycle::CycleMessage;
    use crate::signals::FileSignalStore;
    use crate::testing::{ChatCall, FakeConsole, RecordingChat};
    use tempfile::{tempdir, TempDir};

    const PROMPT: &str = "\
Would you like to proceed?

❯ 1. Approve
  2. Deny
  3. Edit plan

Enter to select · ↑/↓ to navigate · Esc to cancel";

    struct Harness {
        _dir: TempDir,
        paths: SignalPaths,
        transcript: std::path::PathBuf,
        chat: Arc<RecordingChat>,
        console: Arc<FakeConsole>,
        watcher: PaneWatcher,
    }

    fn append(path: &Path, line: &str) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        writeln!(file, "{}", line).unwrap();
    }

    async fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let paths = SignalPaths::under(dir.path());
        let transcript = dir.path().join("session.jsonl");
        std::fs::write(&transcript, "").unwrap();
        std::fs::write(&paths.transcript_hint, transcript.to_string_lossy().as_ref()).unwrap();
        std::fs::write(&paths.chat_id, "42").unwrap();

        let chat = Arc::new(RecordingChat::new());
        let console = Arc::new(FakeConsole::new());
        let mut watcher = PaneWatcher::new(
            WatcherConfig::default(),
            Arc::new(FileSignalStore::new(paths.clone())),
            chat.clone(),
            console.clone(),
        );
        watcher.prime(Instant::now()).await;

        Harness {
            _dir: dir,
            paths,
            transcript,
            chat,
            console,
            watcher,
        }
    }

    fn assistant_text(text: &str) -> String {
        format!(
            r#"{{"type":"assistant","message":{{"content":[{{"type":"text","text":"{}"}}]}}}}"#,
            text
        )
    }

    #[tokio::test]
    async fn test_no_session_skips_tick() {
        let mut h = harness().await;
        h.console.set_session(false);
        append(&h.transcript, &assistant_text("hi"));

        let outcome = h.watcher.tick(Instant::now()).await.unwrap();
        assert_eq!(outcome, TickOutcome::NoSession);
        assert!(h.watcher.cycle().is_empty());
        assert!(h.chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_update_and_dedup() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Working"));

        h.watcher.tick(t0).await.unwrap();
        assert_eq!(h.chat.sent_texts(), vec!["Working".to_string()]);

        // New text inside the live interval waits
        append(&h.transcript, &assistant_text("More"));
        h.watcher.tick(t0 + Duration::from_secs(2)).await.unwrap();
        assert_eq!(h.chat.calls().len(), 1);

        h.watcher.tick(t0 + Duration::from_secs(3)).await.unwrap();
        assert_eq!(h.chat.calls().len(), 2);
        match h.chat.calls().last().unwrap() {
            ChatCall::EditText { message, .. } => assert_eq!(message.text, "Working\n\nMore"),
            other => panic!("unexpected call: {:?}", other),
        }

        // Same text, interval elapsed: no further call
        h.watcher.tick(t0 + Duration::from_secs(10)).await.unwrap();
        assert_eq!(h.chat.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_human_turn_clears_cycle() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Old answer"));
        h.watcher.tick(t0).await.unwrap();
        assert!(matches!(h.watcher.lifecycle().state(), CycleMessage::Streaming(_)));

        append(&h.transcript, r#"{"type":"user","message":{"content":"next question"}}"#);
        h.watcher.tick(t0 + Duration::from_secs(1)).await.unwrap();
        assert!(h.watcher.cycle().is_empty());
        assert_eq!(h.watcher.lifecycle().state(), CycleMessage::Empty);
    }

    #[tokio::test]
    async fn test_finalization_precedes_live_update() {
        let mut h = harness().await;
        append(&h.transcript, &assistant_text("Partial"));
        std::fs::write(&h.paths.final_answer, r#"{"text":"Done"}"#).unwrap();

        let outcome = h.watcher.tick(Instant::now()).await.unwrap();
        assert_eq!(outcome, TickOutcome::Finalized);
        assert_eq!(h.chat.sent_texts(), vec!["Done".to_string()]);
        assert!(h.watcher.cycle().is_empty());
        assert_eq!(
            h.watcher.reader().cursor(),
            std::fs::metadata(&h.transcript).unwrap().len()
        );
        assert_eq!(
            h.watcher.lifecycle().state(),
            CycleMessage::Finalized(MessageId(100))
        );
    }

    #[tokio::test]
    async fn test_pending_change_clears_state() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Previous"));
        h.watcher.tick(t0).await.unwrap();
        assert!(!h.watcher.cycle().is_empty());

        std::fs::write(&h.paths.pending, "1").unwrap();
        h.watcher.tick(t0 + Duration::from_secs(1)).await.unwrap();
        assert!(h.watcher.cycle().is_empty());
        assert_eq!(h.watcher.lifecycle().state(), CycleMessage::Empty);
    }

    #[tokio::test]
    async fn test_stale_pending_removed_when_agent_gone() {
        let mut h = harness().await;
        std::fs::write(&h.paths.pending, "1").unwrap();
        let old = SystemTime::now() - Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&h.paths.pending)
            .unwrap()
            .set_modified(old)
            .unwrap();

        // Agent still running: marker kept
        let outcome = h.watcher.tick(Instant::now()).await.unwrap();
        assert_ne!(outcome, TickOutcome::StalePending);
        assert!(h.paths.pending.exists());

        h.console.set_agent(false);
        let outcome = h.watcher.tick(Instant::now()).await.unwrap();
        assert_eq!(outcome, TickOutcome::StalePending);
        assert!(!h.paths.pending.exists());
    }

    #[tokio::test]
    async fn test_prompt_forward_dedup_and_cooldown() {
        let mut h = harness().await;
        let t0 = Instant::now();
        h.console.set_screen(PROMPT);

        assert_eq!(h.watcher.tick(t0).await.unwrap(), TickOutcome::Observed);
        // Not yet stable long enough
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(2)).await.unwrap(),
            TickOutcome::Observed
        );
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(5)).await.unwrap(),
            TickOutcome::Forwarded
        );
        // Identical content never re-forwards, even after the cooldown
        for secs in [7, 20, 60] {
            assert_eq!(
                h.watcher.tick(t0 + Duration::from_secs(secs)).await.unwrap(),
                TickOutcome::Observed
            );
        }
        assert_eq!(h.chat.calls().len(), 1);

        match &h.chat.calls()[0] {
            ChatCall::Send { chat, message } => {
                assert_eq!(*chat, ChatId(42));
                assert!(message.text.contains("❯ 1. Approve"));
                assert!(!message.text.contains("Enter to select"));
                let data: Vec<&str> = message
                    .keyboard
                    .as_ref()
                    .unwrap()
                    .controls()
                    .map(|c| c.callback_data.as_str())
                    .collect();
                assert_eq!(data, vec!["sel:1:3", "sel:2:3", "sel:3:3", "pane:esc"]);
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prompt_cooldown_blocks_new_content() {
        let mut h = harness().await;
        let t0 = Instant::now();
        h.console.set_screen(PROMPT);
        h.watcher.tick(t0).await.unwrap();
        h.watcher.tick(t0 + Duration::from_secs(5)).await.unwrap();
        assert_eq!(h.chat.calls().len(), 1);

        let second = PROMPT.replace("Edit plan", "Keep planning");
        h.console.set_screen(&second);
        h.watcher.tick(t0 + Duration::from_secs(6)).await.unwrap();
        // Stable, but within 15s of the previous forward
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(11)).await.unwrap(),
            TickOutcome::Observed
        );
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(21)).await.unwrap(),
            TickOutcome::Forwarded
        );
        assert_eq!(h.chat.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_attaches_controls_to_live_message() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Here is the plan"));
        h.console.set_screen(PROMPT);

        h.watcher.tick(t0).await.unwrap();
        h.watcher.tick(t0 + Duration::from_secs(5)).await.unwrap();

        let calls = h.chat.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            &calls[1],
            ChatCall::EditControls { message_id: MessageId(100), .. }
        ));
        assert_eq!(h.watcher.lifecycle().state(), CycleMessage::Empty);
    }

    #[tokio::test]
    async fn test_screen_change_invalidates_finalized_target() {
        let mut h = harness().await;
        let t0 = Instant::now();
        h.console.set_screen("idle");
        h.watcher.tick(t0).await.unwrap();

        std::fs::write(&h.paths.final_answer, r#"{"text":"Done"}"#).unwrap();
        h.watcher.tick(t0 + Duration::from_secs(1)).await.unwrap();
        assert!(h.watcher.lifecycle().prompt_target().is_some());

        h.console.set_screen(PROMPT);
        h.watcher.tick(t0 + Duration::from_secs(2)).await.unwrap();
        assert!(h.watcher.lifecycle().prompt_target().is_none());

        // Forward falls back to a new message rather than editing "Done"
        h.watcher.tick(t0 + Duration::from_secs(7)).await.unwrap();
        assert!(matches!(h.chat.calls().last(), Some(ChatCall::Send { .. })));
    }

    #[tokio::test]
    async fn test_prompt_after_failed_live_send_carries_transcript() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Here is the plan"));
        h.console.set_screen(PROMPT);
        h.chat.fail_sends(1);

        h.watcher.tick(t0).await.unwrap();
        assert_eq!(h.watcher.lifecycle().state(), CycleMessage::Empty);

        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(5)).await.unwrap(),
            TickOutcome::Forwarded
        );
        let calls = h.chat.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            ChatCall::Send { message, .. } => {
                assert_eq!(
                    message.text,
                    "Here is the plan\n\n1. Approve\n2. Deny\n3. Edit plan"
                );
                let data: Vec<&str> = message
                    .keyboard
                    .as_ref()
                    .unwrap()
                    .controls()
                    .map(|c| c.callback_data.as_str())
                    .collect();
                assert_eq!(data, vec!["sel:1:3", "sel:2:3", "sel:3:3", "pane:esc"]);
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_transcript_starts_fresh_cycle() {
        let mut h = harness().await;
        let t0 = Instant::now();
        append(&h.transcript, &assistant_text("Old session"));
        h.watcher.tick(t0).await.unwrap();
        assert_eq!(
            h.watcher.lifecycle().state(),
            CycleMessage::Streaming(MessageId(100))
        );

        let next = h.transcript.with_file_name("next.jsonl");
        std::fs::write(&next, format!("{}\n", assistant_text("history"))).unwrap();
        std::fs::write(&h.paths.transcript_hint, next.to_string_lossy().as_ref()).unwrap();

        // Location cache expires, the new file is adopted at its end
        h.watcher.tick(t0 + Duration::from_secs(11)).await.unwrap();
        assert_eq!(h.watcher.reader().path(), Some(next.as_path()));
        assert!(h.watcher.cycle().is_empty());
        assert_eq!(h.watcher.lifecycle().state(), CycleMessage::Empty);

        append(&next, &assistant_text("New session"));
        h.watcher.tick(t0 + Duration::from_secs(15)).await.unwrap();
        assert_eq!(
            h.chat.sent_texts(),
            vec!["Old session".to_string(), "New session".to_string()]
        );
    }

    #[tokio::test]
    async fn test_partial_final_answer_delivered_once_complete() {
        let mut h = harness().await;
        let t0 = Instant::now();
        std::fs::write(&h.paths.final_answer, r#"{"text":"Do"#).unwrap();

        assert_ne!(h.watcher.tick(t0).await.unwrap(), TickOutcome::Finalized);
        assert!(h.paths.final_answer.exists());

        std::fs::write(&h.paths.final_answer, r#"{"text":"Done"}"#).unwrap();
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(2)).await.unwrap(),
            TickOutcome::Finalized
        );
        assert_eq!(h.chat.sent_texts(), vec!["Done".to_string()]);
    }

    #[tokio::test]
    async fn test_prompt_without_chat_id_is_not_forwarded() {
        let mut h = harness().await;
        let t0 = Instant::now();
        std::fs::remove_file(&h.paths.chat_id).unwrap();
        h.console.set_screen(PROMPT);

        h.watcher.tick(t0).await.unwrap();
        assert_eq!(
            h.watcher.tick(t0 + Duration::from_secs(5)).await.unwrap(),
            TickOutcome::Observed
        );
        assert!(h.chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_capture_ends_tick() {
        let mut h = harness().await;
        h.console.set_screen("");
        assert_eq!(
            h.watcher.tick(Instant::now()).await.unwrap(),
            TickOutcome::NoSnapshot
        );
    }
}
