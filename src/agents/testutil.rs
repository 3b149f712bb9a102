//! Shared test double: a scripted tool host speaking the JSON-RPC wire.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

use crate::error::BridgeError;
use crate::mcp::client::{HttpReply, RpcTransport};

/// Canned `tools/call` replies per tool name (consumed in order), plus a log
/// of every request body the transport saw. Non-call methods get an empty
/// success envelope; unknown tools get `{ok: true}`.
pub struct ScriptedHost {
    replies: Mutex<Vec<(String, Value)>>,
    pub calls: Mutex<Vec<Value>>,
    pub init_status: u16,
    pub tools_payload: Option<Value>,
}

impl ScriptedHost {
    pub fn new(replies: Vec<(&str, Value)>) -> Self {
        ScriptedHost {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|(tool, v)| (tool.to_string(), v))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            init_status: 200,
            tools_payload: None,
        }
    }

    /// Host that 404s `initialize` and answers legacy POSTs with `body`.
    pub fn legacy(answer: &str) -> Self {
        let mut host = ScriptedHost::new(vec![]);
        host.init_status = 404;
        host.tools_payload = Some(json!(answer));
        host
    }

    /// Host whose `tools/list` advertises the given descriptors.
    pub fn with_tools(mut self, tools: Value) -> Self {
        self.tools_payload = Some(tools);
        self
    }

    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|body| body["method"] == "tools/call")
            .map(|body| {
                (
                    body["params"]["name"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    body["params"]["arguments"].clone(),
                )
            })
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RpcTransport for ScriptedHost {
    async fn post_json(&self, _url: &str, body: &Value) -> Result<HttpReply, BridgeError> {
        self.calls.lock().unwrap().push(body.clone());

        match body["method"].as_str() {
            Some("initialize") => {
                return Ok(HttpReply {
                    status: self.init_status,
                    body: if self.init_status == 200 {
                        r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05"}}"#
                            .to_string()
                    } else {
                        String::new()
                    },
                });
            }
            Some("tools/list") => {
                let tools = self.tools_payload.clone().unwrap_or_else(|| json!([]));
                return Ok(HttpReply {
                    status: 200,
                    body: json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": tools}})
                        .to_string(),
                });
            }
            Some("tools/call") => {}
            _ => {
                // Legacy plain POST: no JSON-RPC method field.
                let answer = self
                    .tools_payload
                    .clone()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "legacy answer".to_string());
                return Ok(HttpReply {
                    status: 200,
                    body: json!({"answer": answer}).to_string(),
                });
            }
        }

        let name = body["params"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut replies = self.replies.lock().unwrap();
        let index = replies.iter().position(|(tool, _)| *tool == name);
        let payload = match index {
            Some(i) => replies.remove(i).1,
            None => json!({"structuredContent": {"ok": true}}),
        };
        // A scripted {"error": ...} payload becomes a JSON-RPC error reply.
        if let Some(error) = payload.get("error") {
            return Ok(HttpReply {
                status: 200,
                body: json!({"jsonrpc": "2.0", "id": 1, "error": error}).to_string(),
            });
        }
        Ok(HttpReply {
            status: 200,
            body: json!({"jsonrpc": "2.0", "id": 1, "result": payload}).to_string(),
        })
    }

    async fn get_json(&self, _url: &str) -> Result<HttpReply, BridgeError> {
        Ok(HttpReply {
            status: 404,
            body: String::new(),
        })
    }
}
