//! Transcript record shapes and response fragments

use serde::Deserialize;
use serde_json::Value;

/// One renderable piece of an assistant response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFragment {
    Text(String),
    ToolInvocation(String),
}

/// What a transcript line means for the current response cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A human-authored turn started a new cycle
    CycleBoundary,
    Fragment(ResponseFragment),
}

/// A line in the .jsonl conversation file (only the fields the bridge reads)
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    User {
        #[serde(default)]
        message: Option<RecordMessage>,
    },
    Assistant {
        #[serde(default)]
        message: Option<RecordMessage>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    #[serde(default)]
    content: Value,
}

/// Item of an assistant `message.content` list
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default = "default_tool_name")]
        name: String,
    },
    #[serde(other)]
    Other,
}

fn default_tool_name() -> String {
    "tool".to_string()
}

/// Classify one JSONL line, appending its events to `out`.
///
/// Unparseable lines and records of other types contribute nothing.
pub fn classify_line(line: &str, out: &mut Vec<TranscriptEvent>) {
    let record = match serde_json::from_str::<Record>(line) {
        Ok(record) => record,
        Err(_) => return,
    };

    match record {
        Record::User { message } => {
            // String content is a human turn; a list is a tool-result continuation
            if message.map_or(false, |m| m.content.is_string()) {
                out.push(TranscriptEvent::CycleBoundary);
            }
        }
        Record::Assistant { message } => {
            let Some(Value::Array(items)) = message.map(|m| m.content) else {
                return;
            };
            for item in &items {
                match ContentItem::deserialize(item) {
                    Ok(ContentItem::Text { text }) if !text.trim().is_empty() => {
                        out.push(TranscriptEvent::Fragment(ResponseFragment::Text(text)));
                    }
                    Ok(ContentItem::ToolUse { name }) => {
                        out.push(TranscriptEvent::Fragment(ResponseFragment::ToolInvocation(
                            name,
                        )));
                    }
                    _ => {}
                }
            }
        }
        Record::Other => {}
    }
}

/// Fragments accumulated since the last human turn
#[derive(Debug, Clone, Default)]
pub struct ResponseCycle {
    fragments: Vec<ResponseFragment>,
}

impl ResponseCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply reader events in order; returns true if any fragment was appended
    pub fn apply(&mut self, events: Vec<TranscriptEvent>) -> bool {
        let mut grew = false;
        for event in events {
            match event {
                TranscriptEvent::CycleBoundary => self.fragments.clear(),
                TranscriptEvent::Fragment(fragment) => {
                    self.fragments.push(fragment);
                    grew = true;
                }
            }
        }
        grew
    }

    pub fn push(&mut self, fragment: ResponseFragment) {
        self.fragments.push(fragment);
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[ResponseFragment] {
        &self.fragments
    }
}
