//! Session lookup for `/resume`
//!
//! `history.jsonl` holds one entry per prompt typed into Claude Code
//! (`display`, `project`, `timestamp`); the session transcripts live under
//! `projects/<encoded project path>/<session id>.jsonl`.

use std::path::Path;
use std::time::SystemTime;

use serde::Deserialize;
use tokio::fs;

/// One prompt history entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub timestamp: f64,
}

/// Most recent history entries, newest first. Unreadable history is empty.
pub async fn recent_sessions(history: &Path, limit: usize) -> Vec<HistoryEntry> {
    let content = match fs::read_to_string(history).await {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut entries: Vec<HistoryEntry> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l.trim()).ok())
        .collect();
    entries.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
    entries.truncate(limit);
    entries
}

/// Id of the most recently modified session transcript of `project`
pub async fn latest_session_id(projects_dir: &Path, project: &str) -> Option<String> {
    let encoded = project.replace('/', "-");
    let encoded = encoded.trim_start_matches('-');

    for name in [format!("-{}", encoded), encoded.to_string()] {
        let dir = projects_dir.join(&name);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        let mut newest: Option<(SystemTime, String)> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let mtime = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if newest.as_ref().map_or(true, |(t, _)| mtime > *t) {
                newest = Some((mtime, stem.to_string()));
            }
        }
        if let Some((_, id)) = newest {
            return Some(id);
        }
    }
    None
}

/// Button label for a history entry
pub fn session_label(entry: &HistoryEntry) -> String {
    let display = if entry.display.is_empty() { "?" } else { &entry.display };
    let short: String = display.chars().take(40).collect();
    format!("{}...", short)
}
