//! Scripted LLM client for tests.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CompletionFormat, LlmClient, Message};
use crate::error::BridgeError;

/// Replays a fixed queue of responses and records every request it saw.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<(Vec<Message>, CompletionFormat)>>,
}

impl MockLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        MockLlm {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        messages: &[Message],
        format: CompletionFormat,
    ) -> Result<String, BridgeError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), format));
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            return Err(BridgeError::new("mock LLM queue exhausted"));
        }
        Ok(queue.remove(0))
    }
}
