//! Terminal screen analysis
//!
//! # Components
//! - `patterns`: the declarative pattern table for the Claude Code TUI
//! - `differ`: change/stability tracking and noise-free tail rendering
//! - `classifier`: interactive prompt detection, option parsing, controls

mod classifier;
mod differ;
mod patterns;

pub use classifier::{option_lines, InteractiveOption, PromptClassifier};
pub use differ::{clean_tail, Observation, SnapshotDiffer};
pub use patterns::{PatternTable, CLAUDE_CODE, SPINNER_CHARS};
