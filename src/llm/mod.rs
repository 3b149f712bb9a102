//! LLM client abstraction and the OpenAI-compatible implementation.
//!
//! Agents depend on the `LlmClient` trait only; tests script it through the
//! mock. One request per call, no retry loop; the writer/evaluator budget
//! bounds LLM traffic per request.

pub mod openai;

#[cfg(test)]
pub mod mock;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Requested output shape of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFormat {
    Text,
    Json,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        format: CompletionFormat,
    ) -> Result<String, BridgeError>;
}

/// Pull the first JSON object out of model output.
///
/// Models wrap JSON in fences or prose often enough that a bare
/// `serde_json::from_str` is not good enough; scan for a balanced
/// top-level object instead.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str::<Value>(candidate)
                        .ok()
                        .filter(Value::is_object);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_object() {
        let value = extract_json_object(r#"{"route": "chat_only"}"#).unwrap();
        assert_eq!(value["route"], json!("chat_only"));
    }

    #[test]
    fn test_extract_fenced_object() {
        let text = "Here you go:\n```json\n{\"pass\": true, \"score\": 91}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], json!(91));
    }

    #[test]
    fn test_extract_handles_nested_braces_and_strings() {
        let text = r#"noise {"a": {"b": "va}lue"}, "c": 1} trailing"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"]["b"], json!("va}lue"));
        assert_eq!(value["c"], json!(1));
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
