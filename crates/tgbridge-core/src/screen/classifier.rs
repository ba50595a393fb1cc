//! Interactive prompt detection and option extraction

use crate::chat::{CallbackAction, Control, Keyboard, PaneKey};

use super::patterns::{PatternTable, CURSOR_LINE, OPTION_LINE};

/// Non-blank lines inspected for interactive patterns
const INTERACTIVE_WINDOW: usize = 10;
/// Raw lines inspected for yes/no phrasing
const AFFIRMATIVE_WINDOW: usize = 5;
const MAX_LABEL_CHARS: usize = 40;

/// A numbered choice as rendered on screen.
///
/// The ordinal is a position, not an identity: the list may be redrawn before
/// the user answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveOption {
    pub ordinal: u32,
    pub label: String,
}

/// Classifies stable snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptClassifier {
    patterns: PatternTable,
}

impl PromptClassifier {
    pub fn new(patterns: PatternTable) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    /// True if an interactive pattern appears in the last non-blank lines
    pub fn is_interactive(&self, snapshot: &str) -> bool {
        let lines: Vec<&str> = snapshot.split('\n').filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return false;
        }
        let start = lines.len().saturating_sub(INTERACTIVE_WINDOW);
        let tail = lines[start..].join("\n");
        self.patterns.interactive.iter().any(|p| tail.contains(p))
    }

    /// Numbered options, in document order; empty unless a selection list is shown
    pub fn parse_options(&self, snapshot: &str) -> Vec<InteractiveOption> {
        if !snapshot.contains(self.patterns.selection_hint) {
            return Vec::new();
        }
        snapshot
            .split('\n')
            .filter_map(|line| {
                let caps = OPTION_LINE.captures(line)?;
                Some(InteractiveOption {
                    ordinal: caps[1].parse().ok()?,
                    label: caps[2].trim().to_string(),
                })
            })
            .collect()
    }

    /// One control per option plus Esc, or the generic Yes/No + Enter/Esc set
    pub fn build_controls(&self, options: &[InteractiveOption], snapshot: &str) -> Keyboard {
        if options.is_empty() {
            return self.generic_controls(snapshot);
        }

        let total = options.len() as u32;
        let mut keyboard = Keyboard::new();
        for option in options {
            let label = truncate_label(&format!("{}. {}", option.ordinal, option.label));
            let action = CallbackAction::Select {
                ordinal: option.ordinal,
                total,
            };
            keyboard.push_row(vec![Control::new(label, &action)]);
        }
        keyboard.row(vec![Control::new("Esc", &CallbackAction::Pane(PaneKey::Esc))])
    }

    fn generic_controls(&self, snapshot: &str) -> Keyboard {
        let lines: Vec<&str> = snapshot.split('\n').collect();
        let start = lines.len().saturating_sub(AFFIRMATIVE_WINDOW);
        let tail = lines[start..].join("\n").to_lowercase();

        let mut keyboard = Keyboard::new();
        if self.patterns.affirmative.iter().any(|p| tail.contains(p)) {
            keyboard.push_row(vec![
                Control::new("Yes", &CallbackAction::Pane(PaneKey::Yes)),
                Control::new("No", &CallbackAction::Pane(PaneKey::No)),
            ]);
        }
        keyboard.row(vec![
            Control::new("Enter", &CallbackAction::Pane(PaneKey::Enter)),
            Control::new("Esc", &CallbackAction::Pane(PaneKey::Esc)),
        ])
    }

    /// Ordinal under the `❯` cursor, if a selection list is on screen
    pub fn current_cursor_ordinal(&self, snapshot: &str) -> Option<u32> {
        snapshot
            .split('\n')
            .find_map(|line| CURSOR_LINE.captures(line)?[1].parse().ok())
    }
}

/// `"{n}. {label}"` lines appended under a transcript forward
pub fn option_lines(options: &[InteractiveOption]) -> String {
    options
        .iter()
        .map(|o| format!("{}. {}", o.ordinal, o.label))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        return label.to_string();
    }
    let mut short: String = label.chars().take(MAX_LABEL_CHARS - 2).collect();
    short.push_str("..");
    short
}
