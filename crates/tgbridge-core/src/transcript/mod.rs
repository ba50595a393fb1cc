//! Claude Code transcript tailing
//!
//! # Components
//! - `types`: record classification, response fragments and the response cycle
//! - `reader`: byte-cursor tail reader over the JSONL transcript

mod reader;
mod types;

pub use reader::{TranscriptPoll, TranscriptReader};
pub use types::{classify_line, ResponseCycle, ResponseFragment, TranscriptEvent};
