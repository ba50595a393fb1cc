//! Inline keyboards and callback data

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key pressed by a generic pane button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKey {
    Yes,
    No,
    Enter,
    Esc,
}

impl PaneKey {
    fn as_str(&self) -> &'static str {
        match self {
            PaneKey::Yes => "y",
            PaneKey::No => "n",
            PaneKey::Enter => "enter",
            PaneKey::Esc => "esc",
        }
    }
}

/// Action encoded in a button's callback data.
///
/// Wire format:
/// - `pane:y` / `pane:n` / `pane:enter` / `pane:esc`
/// - `sel:{ordinal}:{total}`
/// - `resume:{session_id}`
/// - `continue_recent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Pane(PaneKey),
    Select { ordinal: u32, total: u32 },
    Resume(String),
    ContinueRecent,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if data == "continue_recent" {
            return Some(CallbackAction::ContinueRecent);
        }
        if let Some(key) = data.strip_prefix("pane:") {
            let key = match key {
                "y" => PaneKey::Yes,
                "n" => PaneKey::No,
                "enter" => PaneKey::Enter,
                "esc" => PaneKey::Esc,
                _ => return None,
            };
            return Some(CallbackAction::Pane(key));
        }
        if let Some(rest) = data.strip_prefix("sel:") {
            let mut parts = rest.split(':');
            let ordinal = parts.next()?.parse().ok()?;
            let total = parts.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            return Some(CallbackAction::Select { ordinal, total });
        }
        if let Some(session_id) = data.strip_prefix("resume:") {
            if session_id.is_empty() {
                return None;
            }
            return Some(CallbackAction::Resume(session_id.to_string()));
        }
        None
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Pane(key) => write!(f, "pane:{}", key.as_str()),
            CallbackAction::Select { ordinal, total } => write!(f, "sel:{}:{}", ordinal, total),
            CallbackAction::Resume(session_id) => write!(f, "resume:{}", session_id),
            CallbackAction::ContinueRecent => f.write_str("continue_recent"),
        }
    }
}

/// A single inline button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub text: String,
    pub callback_data: String,
}

impl Control {
    pub fn new(text: impl Into<String>, action: &CallbackAction) -> Self {
        Self {
            text: text.into(),
            callback_data: action.to_string(),
        }
    }

    pub fn action(&self) -> Option<CallbackAction> {
        CallbackAction::parse(&self.callback_data)
    }
}

/// Inline keyboard, serialized in Bot API `reply_markup` shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<Control>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, row: Vec<Control>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn push_row(&mut self, row: Vec<Control>) {
        self.rows.push(row);
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.rows.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}
