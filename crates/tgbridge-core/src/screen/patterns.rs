//! Screen-scraping pattern table
//!
//! Every string the bridge matches against a captured Claude Code pane lives
//! here, so a TUI change means editing one table.
//!
//! ## Claude Code TUI Layout
//!
//! ```text
//! [Content area - messages, responses, tool output]
//! ──────────────────── (separator)
//! ❯  (prompt / input)
//! ──────────────────── (separator)
//! ⏵⏵ bypass permissions on (shift+tab to cycle) · esc to interrupt
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

/// Spinner glyphs drawn at the start of a status line (`✳ Determining…`)
pub const SPINNER_CHARS: &[char] = &['·', '✻', '✽', '✶', '✳', '✢'];

/// Numbered choice, optionally under the cursor: `❯ 1. Approve`
pub static OPTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:❯\s*)?(\d+)\.\s+(.+)").unwrap());

/// Choice currently under the cursor
pub static CURSOR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*❯\s*(\d+)\.").unwrap());

/// Spinner status line; does not match the `⏵⏵ ... · esc to interrupt` bottom bar
static SPINNER_LINE: Lazy<Regex> = Lazy::new(|| {
    let chars = SPINNER_CHARS
        .iter()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<String>();
    Regex::new(&format!(r"^\s*[{}]\s+\S", chars)).unwrap()
});

/// Declarative set of screen patterns
#[derive(Debug, Clone, Copy)]
pub struct PatternTable {
    /// Any of these in the last lines means the console is waiting on a decision
    pub interactive: &'static [&'static str],
    /// Lines containing any of these are TUI chrome, not content
    pub noise: &'static [&'static str],
    /// Chrome matched case-insensitively when echoing slash-command output
    pub command_noise: &'static [&'static str],
    /// Lines made solely of these are separators
    pub separator_glyphs: &'static [char],
    /// Present only when a numbered selection list is on screen
    pub selection_hint: &'static str,
    /// Lowercase phrasing that earns a Yes/No button pair
    pub affirmative: &'static [&'static str],
}

pub const CLAUDE_CODE: PatternTable = PatternTable {
    interactive: &[
        "(y/n)",
        "(Y/n)",
        "(yes/no)",
        "Do you want",
        "Would you like",
        "approve",
        "proceed?",
        "continue?",
        "Plan mode",
        "Enter to select",
        "Esc to cancel",
        "Tab/Arrow keys",
    ],
    noise: &[
        "bypass permissions",
        "shift+tab to cycle",
        "esc to interrupt",
        "Enter to select",
        "to navigate",
        "Esc to cancel",
        "Press Enter to send",
        "⏵⏵",
    ],
    command_noise: &[
        "bypass permissions",
        "shift+tab",
        "esc to interrupt",
        "press enter to send",
        "to navigate",
    ],
    separator_glyphs: &['─', '━', '═', '┄', '┅', '┈', '┉', '╌', '╍'],
    selection_hint: "Enter to select",
    affirmative: &["(y/n)", "(yes/no)", "yes", " no"],
};

impl Default for PatternTable {
    fn default() -> Self {
        CLAUDE_CODE
    }
}

impl PatternTable {
    /// `line` must already be trimmed and non-empty
    pub fn is_separator(&self, line: &str) -> bool {
        line.chars().all(|c| self.separator_glyphs.contains(&c))
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.noise.iter().any(|p| line.contains(p)) || SPINNER_LINE.is_match(line)
    }

    pub fn is_command_noise(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.command_noise.iter().any(|p| lower.contains(p))
    }
}
