//! Reasoning removal and the visible-content filter.
//!
//! The content filter is a text heuristic, not a parser:
//! - `<think>`, `<thinking>`, `<reasoning>` and `<analysis>` sections are
//!   removed (case-insensitive, shortest span, across newlines). Nested tags
//!   are not supported; an inner close tag ends the section.
//! - Everything up to the last `Final Answer:` / `Answer:` marker is dropped.
//! - The result is trimmed.
//!
//! Absent tags and absent markers are fine; the text is then only trimmed.

use crate::config::RelayConfig;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Provider fields carrying model reasoning, removed from every choice.
pub const REASONING_FIELDS: &[&str] = &["reasoning_content", "reasoning"];

/// Answer markers, longest first.
const ANSWER_MARKERS: &[&str] = &["Final Answer:", "Answer:"];

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "\n</think>\n\n";

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<think>.*?</think>|<thinking>.*?</thinking>|<reasoning>.*?</reasoning>|<analysis>.*?</analysis>",
    )
    .expect("Invalid reasoning block regex")
});

/// Feature toggles consulted when rewriting a choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub strip_content: bool,
    pub show_reasoning: bool,
}

impl From<&RelayConfig> for FilterOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            strip_content: config.strip_content,
            show_reasoning: config.show_reasoning,
        }
    }
}

/// Apply the content filter to visible text. Idempotent.
pub fn filter_content(text: &str) -> String {
    let mut out = text.to_string();
    // Removing one span can join two fragments into a new pair.
    while REASONING_BLOCK.is_match(&out) {
        out = REASONING_BLOCK.replace_all(&out, "").into_owned();
    }

    let answer_start = ANSWER_MARKERS
        .iter()
        .filter_map(|marker| out.rfind(marker).map(|idx| idx + marker.len()))
        .max();

    match answer_start {
        Some(start) => out[start..].trim().to_string(),
        None => out.trim().to_string(),
    }
}

/// Remove every reasoning field from `message`, returning their text joined.
pub fn take_reasoning(message: &mut Map<String, Value>) -> Option<String> {
    let mut text = String::new();
    for field in REASONING_FIELDS {
        if let Some(Value::String(s)) = message.remove(*field) {
            text.push_str(&s);
        }
    }
    (!text.is_empty()).then_some(text)
}

/// Wrap complete reasoning text in a `<think>` block ahead of `content`.
pub fn fold_reasoning(reasoning: &str, content: &str) -> String {
    format!("{THINK_OPEN}{reasoning}{THINK_CLOSE}{content}")
}

/// Rewrite a complete (non-streaming) assistant message in place.
pub fn scrub_message(message: &mut Map<String, Value>, opts: FilterOptions) {
    let reasoning = take_reasoning(message);
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string());

    let visible = match (opts.show_reasoning, reasoning) {
        (true, Some(r)) => Some(fold_reasoning(&r, content.as_deref().unwrap_or(""))),
        _ => content,
    };

    if let Some(text) = visible {
        let text = if opts.strip_content {
            filter_content(&text)
        } else {
            text
        };
        message.insert("content".to_string(), Value::String(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strips_tags_and_keeps_final_answer() {
        assert_eq!(
            filter_content("<thinking>x</thinking>Final Answer: 42"),
            "42"
        );
    }

    #[test]
    fn test_tags_are_case_insensitive_and_multiline() {
        let text = "<THINK>step 1\nstep 2</Think>\n  The sky is blue.  ";
        assert_eq!(filter_content(text), "The sky is blue.");
    }

    #[test]
    fn test_shortest_span_is_removed() {
        let text = "<analysis>a</analysis>keep<analysis>b</analysis> this";
        assert_eq!(filter_content(text), "keep this");
    }

    #[test]
    fn test_answer_marker_without_final() {
        assert_eq!(
            filter_content("Let me work it out. 6 * 7. Answer: 42"),
            "42"
        );
    }

    #[test]
    fn test_no_tags_no_marker_only_trims() {
        assert_eq!(filter_content("  plain text \n"), "plain text");
        assert_eq!(filter_content(""), "");
    }

    #[test]
    fn test_unclosed_tag_is_left_alone() {
        assert_eq!(filter_content("<think>still going"), "<think>still going");
    }

    #[test]
    fn test_nested_tags_are_not_supported() {
        // The inner close tag ends the section.
        assert_eq!(
            filter_content("<think>a<think>b</think>c</think>done"),
            "c</think>done"
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let samples = [
            "<thinking>x</thinking>Final Answer: 42",
            "Answer: first. Final Answer: second",
            "<thi<think>x</think>nk>hidden</think>shown",
            "<reasoning>r</reasoning>\n\nhello  ",
            "no markers at all",
            "<think>a<think>b</think>c</think>done",
        ];
        for sample in samples {
            let once = filter_content(sample);
            assert_eq!(filter_content(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn test_take_reasoning_removes_both_fields() {
        let mut msg = as_map(json!({
            "content": "hi",
            "reasoning_content": "because",
            "reasoning": "!"
        }));
        assert_eq!(take_reasoning(&mut msg).as_deref(), Some("because!"));
        assert!(!msg.contains_key("reasoning_content"));
        assert!(!msg.contains_key("reasoning"));

        let mut null_reasoning = as_map(json!({"content": "hi", "reasoning_content": null}));
        assert_eq!(take_reasoning(&mut null_reasoning), None);
        assert!(!null_reasoning.contains_key("reasoning_content"));
    }

    #[test]
    fn test_scrub_message_drops_reasoning_by_default() {
        let mut msg = as_map(json!({"role": "assistant", "content": " 4 ", "reasoning_content": "2+2"}));
        scrub_message(&mut msg, FilterOptions::default());
        assert_eq!(msg, as_map(json!({"role": "assistant", "content": " 4 "})));
    }

    #[test]
    fn test_scrub_message_folds_reasoning() {
        let mut msg = as_map(json!({"content": "4", "reasoning_content": "2+2"}));
        scrub_message(
            &mut msg,
            FilterOptions {
                show_reasoning: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(msg["content"], "<think>\n2+2\n</think>\n\n4");
    }

    #[test]
    fn test_scrub_message_strip_content_wins_over_fold() {
        let mut msg = as_map(json!({"content": "Final Answer: 4", "reasoning_content": "2+2"}));
        scrub_message(
            &mut msg,
            FilterOptions {
                strip_content: true,
                show_reasoning: true,
            },
        );
        assert_eq!(msg["content"], "4");
    }

    #[test]
    fn test_scrub_message_leaves_null_content() {
        let mut msg = as_map(json!({"content": null, "tool_calls": []}));
        scrub_message(
            &mut msg,
            FilterOptions {
                strip_content: true,
                show_reasoning: false,
            },
        );
        assert_eq!(msg["content"], Value::Null);
    }
}
