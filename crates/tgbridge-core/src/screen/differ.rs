//! Screen change and stability tracking

use std::time::{Duration, Instant};

use super::patterns::PatternTable;

/// Result of observing one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Snapshot differs from the previous one
    pub changed: bool,
    /// Time since the screen last changed
    pub stable_for: Duration,
}

/// Tracks the last captured snapshot and when it last changed.
///
/// Comparison is on the raw capture; noise filtering is only applied when a
/// snapshot is rendered for forwarding.
#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    last: Option<String>,
    stable_since: Option<Instant>,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, raw: &str, now: Instant) -> Observation {
        let changed = self.last.as_deref() != Some(raw);
        if changed {
            self.last = Some(raw.to_string());
            self.stable_since = Some(now);
        }
        let stable_for = self
            .stable_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        Observation {
            changed,
            stable_for,
        }
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Last `max_lines` content lines of a snapshot, without blank lines,
/// separators or TUI chrome
pub fn clean_tail(content: &str, max_lines: usize, patterns: &PatternTable) -> String {
    let lines: Vec<&str> = content
        .split('\n')
        .filter(|line| {
            let stripped = line.trim();
            !stripped.is_empty() && !patterns.is_separator(stripped) && !patterns.is_noise(stripped)
        })
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
