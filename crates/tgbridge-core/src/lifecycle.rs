//! Outbound message lifecycle
//!
//! Each response cycle owns at most one chat message: a live message that is
//! edited as the transcript grows, which becomes the finalized message once
//! the Stop hook's answer arrives. The state is a single enum so the two can
//! never coexist.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chat::{ChatId, ChatTransport, MessageId, Outgoing};
use crate::signals::FinalAnswer;

/// The cycle's outbound message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleMessage {
    #[default]
    Empty,
    /// Live message being edited in place
    Streaming(MessageId),
    /// Message carrying the finalized answer
    Finalized(MessageId),
}

#[derive(Debug, Default)]
pub struct MessageLifecycle {
    state: CycleMessage,
    last_live_text: String,
    last_live_update: Option<Instant>,
}

impl MessageLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CycleMessage {
        self.state
    }

    pub fn last_live_text(&self) -> &str {
        &self.last_live_text
    }

    /// Whether `interval` has passed since the last live update
    pub fn live_due(&self, now: Instant, interval: Duration) -> bool {
        self.last_live_update
            .map_or(true, |at| now.saturating_duration_since(at) >= interval)
    }

    /// Send or edit the live message. Returns true if a transport call was made.
    pub async fn update_live(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        text: &str,
        now: Instant,
    ) -> bool {
        if text.is_empty() || text == self.last_live_text {
            return false;
        }
        self.last_live_text = text.to_string();
        self.last_live_update = Some(now);

        match self.state {
            CycleMessage::Streaming(id) => {
                if let Err(e) = transport
                    .edit_message_text(chat, id, Outgoing::plain(text))
                    .await
                {
                    warn!(message_id = %id, error = %e, "Live edit failed");
                }
            }
            CycleMessage::Empty | CycleMessage::Finalized(_) => {
                match transport.send_message(chat, Outgoing::plain(text)).await {
                    Ok(id) => {
                        info!(message_id = %id, "Live message started");
                        self.state = CycleMessage::Streaming(id);
                    }
                    Err(e) => warn!(error = %e, "Live send failed"),
                }
            }
        }
        true
    }

    /// Deliver the finalized answer, preferring an in-place edit of the live
    /// message and rich markup, falling back to a new message and plain text.
    pub async fn finalize(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        answer: &FinalAnswer,
        now: Instant,
    ) -> Option<MessageId> {
        let mut delivered = None;

        if let CycleMessage::Streaming(id) = self.state {
            if !answer.html.is_empty() {
                match transport
                    .edit_message_text(chat, id, Outgoing::html(&answer.html))
                    .await
                {
                    Ok(()) => delivered = Some(id),
                    Err(e) => warn!(message_id = %id, error = %e, "HTML edit rejected"),
                }
            }
            if delivered.is_none() && !answer.text.is_empty() {
                match transport
                    .edit_message_text(chat, id, Outgoing::plain(&answer.text))
                    .await
                {
                    Ok(()) => delivered = Some(id),
                    Err(e) => warn!(message_id = %id, error = %e, "Plain edit rejected"),
                }
            }
        }

        if delivered.is_none() && !answer.html.is_empty() {
            match transport.send_message(chat, Outgoing::html(&answer.html)).await {
                Ok(id) => delivered = Some(id),
                Err(e) => warn!(error = %e, "HTML send rejected"),
            }
        }
        if delivered.is_none() && !answer.text.is_empty() {
            match transport.send_message(chat, Outgoing::plain(&answer.text)).await {
                Ok(id) => delivered = Some(id),
                Err(e) => warn!(error = %e, "Plain send rejected"),
            }
        }

        self.state = delivered.map_or(CycleMessage::Empty, CycleMessage::Finalized);
        self.last_live_text.clear();
        self.last_live_update = Some(now);
        info!(message_id = ?delivered.map(|id| id.0), "Final answer applied");
        delivered
    }

    /// Message a prompt's controls can be attached to
    pub fn prompt_target(&self) -> Option<MessageId> {
        match self.state {
            CycleMessage::Streaming(id) | CycleMessage::Finalized(id) => Some(id),
            CycleMessage::Empty => None,
        }
    }

    /// Screen activity makes an earlier final answer stale as a prompt target
    pub fn invalidate_finalized(&mut self) {
        if let CycleMessage::Finalized(_) = self.state {
            self.state = CycleMessage::Empty;
        }
    }

    /// After a prompt forward the next output starts a fresh message
    pub fn after_forward(&mut self) {
        self.state = CycleMessage::Empty;
        self.last_live_text.clear();
    }

    /// New response cycle
    pub fn reset_cycle(&mut self) {
        self.state = CycleMessage::Empty;
        self.last_live_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Markup;
    use crate::testing::{ChatCall, RecordingChat};

    const CHAT: ChatId = ChatId(1);

    #[tokio::test]
    async fn test_live_send_then_edit() {
        let chat = RecordingChat::new();
        let mut lifecycle = MessageLifecycle::new();
        let now = Instant::now();

        assert!(lifecycle.update_live(&chat, CHAT, "one", now).await);
        assert_eq!(lifecycle.state(), CycleMessage::Streaming(MessageId(100)));
        assert!(lifecycle.update_live(&chat, CHAT, "two", now).await);

        let calls = chat.calls();
        assert!(matches!(&calls[0], ChatCall::Send { message, .. } if message.text == "one"));
        assert!(matches!(
            &calls[1],
            ChatCall::EditText { message_id: MessageId(100), message, .. } if message.text == "two"
        ));
    }

    #[tokio::test]
    async fn test_identical_live_text_is_one_call() {
        let chat = RecordingChat::new();
        let mut lifecycle = MessageLifecycle::new();
        let now = Instant::now();

        lifecycle.update_live(&chat, CHAT, "same", now).await;
        assert!(!lifecycle.update_live(&chat, CHAT, "same", now).await);
        assert!(!lifecycle.update_live(&chat, CHAT, "", now).await);
        assert_eq!(chat.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_live_due() {
        let chat = RecordingChat::new();
        let mut lifecycle = MessageLifecycle::new();
        let t0 = Instant::now();
        let interval = Duration::from_secs(3);

        assert!(lifecycle.live_due(t0, interval));
        lifecycle.update_live(&chat, CHAT, "x", t0).await;
        assert!(!lifecycle.live_due(t0 + Duration::from_secs(2), interval));
        assert!(lifecycle.live_due(t0 + Duration::from_secs(3), interval));
    }

    #[tokio::test]
    async fn test_finalize_edits_live_message_with_html() {
        let chat = RecordingChat::new();
        let mut lifecycle = MessageLifecycle::new();
        let now = Instant::now();
        lifecycle.update_live(&chat, CHAT, "partial", now).await;

        let answer = FinalAnswer {
            html: "<b>Done</b>".into(),
            text: "Done".into(),
        };
        let id = lifecycle.finalize(&chat, CHAT, &answer, now).await;

        assert_eq!(id, Some(MessageId(100)));
        assert_eq!(lifecycle.state(), CycleMessage::Finalized(MessageId(100)));
        assert_eq!(lifecycle.last_live_text(), "");
        match chat.calls().last().unwrap() {
            ChatCall::EditText { message, .. } => {
                assert_eq!(message.markup, Markup::Html);
                assert_eq!(message.text, "<b>Done</b>");
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finalize_falls_back_to_plain() {
        let chat = RecordingChat::new();
        chat.reject_html();
        let mut lifecycle = MessageLifecycle::new();
        let now = Instant::now();
        lifecycle.update_live(&chat, CHAT, "partial", now).await;
        chat.clear();

        let answer = FinalAnswer {
            html: "<b>bad".into(),
            text: "Done".into(),
        };
        lifecycle.finalize(&chat, CHAT, &answer, now).await;

        let calls = chat.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[1], ChatCall::EditText { message, .. }
            if message.markup == Markup::Plain && message.text == "Done"));
    }

    #[tokio::test]
    async fn test_finalize_without_live_sends() {
        let chat = RecordingChat::new();
        chat.reject_html();
        let mut lifecycle = MessageLifecycle::new();

        let answer = FinalAnswer {
            html: "<b>bad".into(),
            text: "Done".into(),
        };
        let id = lifecycle.finalize(&chat, CHAT, &answer, Instant::now()).await;

        // HTML send rejected (no id consumed), plain send succeeds
        assert_eq!(id, Some(MessageId(100)));
        assert_eq!(chat.sent_texts(), vec!["<b>bad".to_string(), "Done".to_string()]);
        assert_eq!(lifecycle.prompt_target(), Some(MessageId(100)));
    }

    #[tokio::test]
    async fn test_invalidate_and_forward() {
        let chat = RecordingChat::new();
        let mut lifecycle = MessageLifecycle::new();
        let now = Instant::now();
        lifecycle
            .finalize(&chat, CHAT, &FinalAnswer::plain("Done"), now)
            .await;

        lifecycle.invalidate_finalized();
        assert_eq!(lifecycle.prompt_target(), None);

        lifecycle.update_live(&chat, CHAT, "live", now).await;
        lifecycle.invalidate_finalized();
        assert!(lifecycle.prompt_target().is_some());

        lifecycle.after_forward();
        assert_eq!(lifecycle.state(), CycleMessage::Empty);
        assert_eq!(lifecycle.last_live_text(), "");
    }
}
