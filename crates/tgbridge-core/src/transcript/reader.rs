//! Incremental JSONL tail reader

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, info};

use super::types::{classify_line, TranscriptEvent};

/// Result of one [`TranscriptReader::poll`]
#[derive(Debug, Default)]
pub struct TranscriptPoll {
    /// A different transcript was adopted; cycle state must be dropped
    pub adopted: bool,
    pub events: Vec<TranscriptEvent>,
}

/// Tails a transcript from a byte cursor.
///
/// Only complete lines are consumed: a trailing partial line stays unread until
/// its newline lands. The cursor never moves backward for a given file.
#[derive(Debug, Default)]
pub struct TranscriptReader {
    path: Option<PathBuf>,
    cursor: u64,
}

impl TranscriptReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read everything appended to `path` since the last poll.
    ///
    /// Adopting a new path starts at its current end, so history is never replayed.
    pub async fn poll(&mut self, path: &Path) -> TranscriptPoll {
        let mut poll = TranscriptPoll::default();

        if self.path.as_deref() != Some(path) {
            self.cursor = file_size(path).await.unwrap_or(0);
            self.path = Some(path.to_path_buf());
            poll.adopted = true;
            info!(path = %path.display(), cursor = self.cursor, "Adopted transcript");
        }

        match self.read_new_lines(path).await {
            Ok(events) => poll.events = events,
            Err(e) => debug!(path = %path.display(), error = %e, "Transcript read failed"),
        }
        poll
    }

    async fn read_new_lines(&mut self, path: &Path) -> std::io::Result<Vec<TranscriptEvent>> {
        let size = fs::metadata(path).await?.len();
        if size <= self.cursor {
            return Ok(Vec::new());
        }

        let mut file = fs::File::open(path).await?;
        file.seek(SeekFrom::Start(self.cursor)).await?;
        let mut buffer = vec![0u8; (size - self.cursor) as usize];
        file.read_exact(&mut buffer).await?;

        let Some(last_newline) = buffer.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let consumed = &buffer[..=last_newline];

        let mut events = Vec::new();
        for line in consumed.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            classify_line(line, &mut events);
        }

        self.cursor += consumed.len() as u64;
        Ok(events)
    }

    /// Move the cursor to the current end of the adopted transcript
    pub async fn advance_to_end(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(size) = file_size(path).await {
            self.cursor = self.cursor.max(size);
        }
    }

    /// Adopt `path` at its end without emitting anything
    pub async fn prime(&mut self, path: &Path) {
        self.path = Some(path.to_path_buf());
        self.cursor = file_size(path).await.unwrap_or(0);
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).await.ok().map(|m| m.len())
}
