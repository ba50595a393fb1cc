//! Response rendering
//!
//! Turns a cycle's fragments into one message body: tool runs collapse to
//! `[a] → [b]`, text fragments are paragraphs, and only the tail that fits in a
//! single message is kept.

use crate::transcript::ResponseFragment;

/// Render fragments into a displayable string of at most `max_chars` characters
pub fn render(fragments: &[ResponseFragment], max_chars: usize) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut tools: Vec<&str> = Vec::new();

    for fragment in fragments {
        match fragment {
            ResponseFragment::Text(text) => {
                if !tools.is_empty() {
                    paragraphs.push(tool_run(&tools));
                    tools.clear();
                }
                paragraphs.push(text.clone());
            }
            ResponseFragment::ToolInvocation(name) => tools.push(name),
        }
    }
    if !tools.is_empty() {
        paragraphs.push(tool_run(&tools));
    }

    tail_chars(&paragraphs.join("\n\n"), max_chars).to_string()
}

fn tool_run(tools: &[&str]) -> String {
    tools
        .iter()
        .map(|t| format!("[{}]", t))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Last `max` characters of `s`
pub fn tail_chars(s: &str, max: usize) -> &str {
    if max == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
