//! Cross-process signals
//!
//! The Claude Code hooks and this bridge talk through a handful of small files:
//! - transcript hint: path of the JSONL transcript of the tmux session
//! - pending marker: a Telegram turn is outstanding (its mtime is the signal)
//! - final answer: pre-formatted response written by the Stop hook
//! - chat id: the chat the bridge replies to
//!
//! Everything sits behind [`SignalStore`] so a push-based store can replace the
//! file polling without touching the watcher.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::chat::ChatId;
use crate::config::SignalPaths;

/// Finalized answer produced by the Stop hook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Telegram HTML rendering
    #[serde(default, alias = "richMarkup")]
    pub html: String,
    /// Plain text fallback
    #[serde(default, alias = "plainText")]
    pub text: String,
}

impl FinalAnswer {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            html: String::new(),
            text: text.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.text.is_empty()
    }
}

/// Source of the cross-process signals. Absence is a normal state, never an error.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Transcript path announced by the hooks, if any
    async fn transcript_hint(&self) -> Option<PathBuf>;

    /// Last-modified time of the pending marker, if present
    async fn pending_marker(&self) -> Option<SystemTime>;

    async fn write_pending_marker(&self) -> std::io::Result<()>;

    async fn clear_pending_marker(&self);

    /// Destructive read: a returned answer is never returned again
    async fn take_final_answer(&self) -> Option<FinalAnswer>;

    async fn chat_id(&self) -> Option<ChatId>;

    async fn save_chat_id(&self, chat_id: ChatId) -> std::io::Result<()>;
}

/// Identical unparseable reads of the final answer before it is discarded.
/// A hook still writing the file changes its content between reads.
const MALFORMED_READS_BEFORE_DROP: u32 = 3;

/// Content of an unparseable final answer and how many ticks have seen it
#[derive(Debug)]
struct MalformedRead {
    content: String,
    reads: u32,
}

/// File-backed signal store
#[derive(Debug, Clone)]
pub struct FileSignalStore {
    paths: SignalPaths,
    malformed: Arc<Mutex<Option<MalformedRead>>>,
}

impl FileSignalStore {
    pub fn new(paths: SignalPaths) -> Self {
        Self {
            paths,
            malformed: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a failed parse; true once the same content failed often enough
    fn note_malformed(&self, content: String) -> bool {
        let mut guard = match self.malformed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let reads = match guard.as_mut() {
            Some(seen) if seen.content == content => {
                seen.reads += 1;
                seen.reads
            }
            _ => {
                *guard = Some(MalformedRead { content, reads: 1 });
                1
            }
        };
        if reads >= MALFORMED_READS_BEFORE_DROP {
            *guard = None;
            return true;
        }
        false
    }

    fn clear_malformed(&self) {
        match self.malformed.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn paths(&self) -> &SignalPaths {
        &self.paths
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove signal file");
        }
    }
}

#[async_trait]
impl SignalStore for FileSignalStore {
    async fn transcript_hint(&self) -> Option<PathBuf> {
        let content = fs::read_to_string(&self.paths.transcript_hint).await.ok()?;
        let hint = content.trim();
        if hint.is_empty() {
            return None;
        }
        Some(PathBuf::from(hint))
    }

    async fn pending_marker(&self) -> Option<SystemTime> {
        fs::metadata(&self.paths.pending)
            .await
            .ok()?
            .modified()
            .ok()
    }

    async fn write_pending_marker(&self) -> std::io::Result<()> {
        fs::write(
            &self.paths.pending,
            chrono::Utc::now().timestamp().to_string(),
        )
        .await
    }

    async fn clear_pending_marker(&self) {
        remove_quietly(&self.paths.pending).await;
    }

    async fn take_final_answer(&self) -> Option<FinalAnswer> {
        let path = &self.paths.final_answer;
        let content = fs::read_to_string(path).await.ok()?;

        let answer = match serde_json::from_str::<FinalAnswer>(&content) {
            Ok(answer) => answer,
            Err(e) => {
                if self.note_malformed(content) {
                    warn!(error = %e, "Malformed final answer artifact, dropped");
                    remove_quietly(path).await;
                } else {
                    debug!(error = %e, "Final answer not parseable yet, retrying");
                }
                return None;
            }
        };

        self.clear_malformed();
        remove_quietly(path).await;
        if answer.is_empty() {
            debug!("Final answer artifact was empty, dropped");
            return None;
        }
        Some(answer)
    }

    async fn chat_id(&self) -> Option<ChatId> {
        let content = fs::read_to_string(&self.paths.chat_id).await.ok()?;
        content.trim().parse().ok()
    }

    async fn save_chat_id(&self, chat_id: ChatId) -> std::io::Result<()> {
        fs::write(&self.paths.chat_id, chat_id.to_string()).await
    }
}

/// Cached transcript location.
///
/// A resolved path is trusted for `ttl` while it still exists. There is no
/// fallback guess: without a hint naming an existing file the location is absent.
#[derive(Debug)]
pub struct TranscriptLocator {
    ttl: Duration,
    cached: Option<PathBuf>,
    last_scan: Option<Instant>,
}

impl TranscriptLocator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: None,
            last_scan: None,
        }
    }

    /// Force the next [`resolve`](Self::resolve) to consult the store
    pub fn invalidate(&mut self) {
        self.last_scan = None;
    }

    pub async fn resolve(&mut self, store: &dyn SignalStore, now: Instant) -> Option<PathBuf> {
        if let (Some(path), Some(scanned_at)) = (&self.cached, self.last_scan) {
            if now.saturating_duration_since(scanned_at) < self.ttl && path_exists(path).await {
                return Some(path.clone());
            }
        }
        self.last_scan = Some(now);

        let resolved = match store.transcript_hint().await {
            Some(path) if path_exists(&path).await => Some(path),
            Some(path) => {
                debug!(path = %path.display(), "Transcript hint names a missing file");
                None
            }
            None => None,
        };
        self.cached = resolved.clone();
        resolved
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
