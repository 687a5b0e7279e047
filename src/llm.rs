//! LLM provider abstraction. Grounded on the `Arc<dyn LLMProvider>`
//! trait-object idiom used for pluggable model backends in the broader
//! retrieval pack; concrete backends (HTTP clients to a model server) are
//! out of scope for this core, so only the trait and a deterministic mock
//! implementation ship here.

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: impl Into<String>) -> Self {
        LLMMessage { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        LLMMessage { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u64>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, messages: &[LLMMessage]) -> anyhow::Result<LLMResponse>;
    fn model_name(&self) -> &str;
}

pub type SharedLLM = Arc<dyn LLMProvider>;

/// Deterministic mock backend used by tests and the demo binary when no
/// external model server is configured. Never makes network calls.
pub struct MockLLM {
    pub name: String,
    pub canned: String,
}

impl MockLLM {
    pub fn new(name: impl Into<String>, canned: impl Into<String>) -> Self {
        MockLLM { name: name.into(), canned: canned.into() }
    }
}

#[async_trait]
impl LLMProvider for MockLLM {
    async fn complete(&self, _messages: &[LLMMessage]) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse { content: self.canned.clone(), tokens_used: Some(0) })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Extracts the outermost balanced `{...}` JSON object from `text` (LLMs
/// routinely wrap JSON in prose or markdown fences). Returns `None` if no
/// balanced object is found.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Chain-of-thought markers the reasoning model may wrap private reasoning
/// in. Extracted once and stripped from user-visible content.
const THOUGHT_OPEN: &str = "<think>";
const THOUGHT_CLOSE: &str = "</think>";

/// Extracts and strips every `<think>...</think>` block from `text`,
/// returning `(visible_text, concatenated_thoughts)`.
pub fn extract_chain_of_thought(text: &str) -> (String, Option<String>) {
    let mut visible = String::new();
    let mut thoughts = Vec::new();
    let mut rest = text;
    loop {
        match rest.find(THOUGHT_OPEN) {
            Some(open_idx) => {
                visible.push_str(&rest[..open_idx]);
                let after_open = &rest[open_idx + THOUGHT_OPEN.len()..];
                match after_open.find(THOUGHT_CLOSE) {
                    Some(close_idx) => {
                        thoughts.push(after_open[..close_idx].trim().to_string());
                        rest = &after_open[close_idx + THOUGHT_CLOSE.len()..];
                    }
                    None => {
                        // Unterminated marker: treat the rest as visible to
                        // avoid silently dropping content.
                        visible.push_str(THOUGHT_OPEN);
                        visible.push_str(after_open);
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                visible.push_str(rest);
                rest = "";
                break;
            }
        }
    }
    let _ = rest;
    let thought = if thoughts.is_empty() { None } else { Some(thoughts.join("\n")) };
    (visible.trim().to_string(), thought)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\nHope that helps.";
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, "{\"a\": 1, \"b\": {\"c\": 2}}");
    }

    #[test]
    fn no_json_returns_none() {
        assert_eq!(extract_json_object("no braces here"), None);
    }

    #[test]
    fn strips_chain_of_thought() {
        let text = "<think>internal plan</think>Final answer here.";
        let (visible, thought) = extract_chain_of_thought(text);
        assert_eq!(visible, "Final answer here.");
        assert_eq!(thought, Some("internal plan".to_string()));
    }

    #[test]
    fn no_thought_markers_passes_through() {
        let (visible, thought) = extract_chain_of_thought("plain answer");
        assert_eq!(visible, "plain answer");
        assert_eq!(thought, None);
    }
}
