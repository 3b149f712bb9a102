//! JSON-RPC client for the local tool host.
//!
//! The client speaks the standard bootstrap (`initialize`, manifest GET,
//! `tools/list`, `tools/call`) and degrades to a legacy plain-POST mode when
//! the host predates JSON-RPC. All HTTP goes through `RpcTransport` so tests
//! script the host without a socket.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::BridgeError;
use crate::mcp::types::{
    merge_tools, CallResult, ManifestContext, RpcRequest, RpcResponse, ToolDescriptor,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// One HTTP exchange as the client sees it.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, BridgeError>;
    async fn get_json(&self, url: &str) -> Result<HttpReply, BridgeError>;
}

/// Transport over the shared reqwest client.
pub struct HttpTransport {
    bearer: Option<String>,
}

impl HttpTransport {
    pub fn new(bearer: Option<String>) -> Self {
        HttpTransport { bearer }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, BridgeError> {
        let response = crate::http::shared_client()
            .post(url)
            .headers(crate::http::json_headers(self.bearer.as_deref()))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }

    async fn get_json(&self, url: &str) -> Result<HttpReply, BridgeError> {
        let response = crate::http::shared_client()
            .get(url)
            .headers(crate::http::json_headers(self.bearer.as_deref()))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

/// Outcome of the `initialize` handshake.
#[derive(Debug, Clone)]
pub enum InitOutcome {
    /// Host speaks JSON-RPC; proceed with tools/list + tools/call.
    Ready,
    /// Host replied 404 to initialize: plain `{prompt, conversation}` POSTs
    /// with the textual reply as the final answer.
    Legacy,
}

pub struct ToolHostClient {
    endpoint: String,
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl ToolHostClient {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn RpcTransport>) -> Self {
        ToolHostClient {
            endpoint: endpoint.into(),
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Raw JSON-RPC call. Used directly by the debug pass-through endpoint.
    pub async fn call(&self, method: &str, params: Value) -> Result<CallResult, BridgeError> {
        let request = RpcRequest::new(self.next_id(), method, params);
        let body = serde_json::to_value(&request)
            .map_err(|e| BridgeError::new(format!("Failed to encode request: {}", e)))?;
        let reply = self.transport.post_json(&self.endpoint, &body).await?;
        Ok(CallResult::from_http(reply.status, reply.body))
    }

    /// Run the `initialize` handshake. 404 switches the client to legacy
    /// mode; any other failure surfaces with the host's message if present.
    pub async fn initialize(&self) -> Result<InitOutcome, BridgeError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
        });
        let request = RpcRequest::new(self.next_id(), "initialize", params);
        let body = serde_json::to_value(&request)
            .map_err(|e| BridgeError::new(format!("Failed to encode request: {}", e)))?;
        let reply = self.transport.post_json(&self.endpoint, &body).await?;

        if reply.status == 404 {
            log::info!("[MCP] initialize returned 404, switching to legacy mode");
            return Ok(InitOutcome::Legacy);
        }
        if reply.status >= 400 {
            let message = host_error_message(&reply.body)
                .unwrap_or_else(|| format!("Tool host rejected initialize ({})", reply.status));
            return Err(BridgeError::with_status(message, reply.status));
        }

        let envelope = serde_json::from_str::<RpcResponse>(&reply.body)
            .map_err(|_| BridgeError::new("Tool host returned a non-JSON initialize response"))?;
        if !envelope.is_valid_envelope() {
            return Err(BridgeError::new(
                "Tool host response is not a JSON-RPC 2.0 envelope",
            ));
        }
        if let Some(err) = envelope.error {
            return Err(BridgeError::with_status(err.message, reply.status));
        }
        Ok(InitOutcome::Ready)
    }

    /// Legacy hosts take the prompt directly and answer in plain text.
    pub async fn legacy_chat(
        &self,
        prompt: &str,
        conversation: Value,
    ) -> Result<String, BridgeError> {
        let body = json!({"prompt": prompt, "conversation": conversation});
        let reply = self.transport.post_json(&self.endpoint, &body).await?;
        if reply.status >= 400 {
            let message = host_error_message(&reply.body)
                .unwrap_or_else(|| format!("Legacy tool host failed ({})", reply.status));
            return Err(BridgeError::with_status(message, reply.status));
        }
        // Some legacy hosts wrap the text; take answer/response/text if so.
        if let Ok(parsed) = serde_json::from_str::<Value>(&reply.body) {
            for key in ["answer", "response", "text", "message"] {
                if let Some(text) = parsed.get(key).and_then(Value::as_str) {
                    return Ok(text.to_string());
                }
            }
        }
        Ok(reply.body)
    }

    /// GET the manifest derived from the endpoint. Never fails the request;
    /// a miss produces a context with `ok == false`.
    pub async fn fetch_manifest(&self) -> ManifestContext {
        let url = manifest_url(&self.endpoint);
        match self.transport.get_json(&url).await {
            Ok(reply) if reply.status < 400 => {
                let tools = serde_json::from_str::<Value>(&reply.body)
                    .ok()
                    .and_then(|v| v.get("tools").cloned())
                    .and_then(|t| serde_json::from_value::<Vec<ToolDescriptor>>(t).ok())
                    .unwrap_or_default();
                let tools: Vec<ToolDescriptor> =
                    tools.into_iter().filter(ToolDescriptor::is_valid).collect();
                ManifestContext {
                    ok: true,
                    status: reply.status,
                    target_url: self.endpoint.clone(),
                    tools,
                    manifest_attempt: url,
                    error: None,
                }
            }
            Ok(reply) => ManifestContext {
                ok: false,
                status: reply.status,
                target_url: self.endpoint.clone(),
                tools: Vec::new(),
                manifest_attempt: url,
                error: Some(format!("manifest fetch returned {}", reply.status)),
            },
            Err(e) => ManifestContext {
                ok: false,
                status: 0,
                target_url: self.endpoint.clone(),
                tools: Vec::new(),
                manifest_attempt: url,
                error: Some(e.to_string()),
            },
        }
    }

    /// `tools/list`, merged over whatever the manifest advertised.
    pub async fn list_tools(
        &self,
        manifest_tools: Vec<ToolDescriptor>,
    ) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let result = self.call("tools/list", json!({})).await?;
        if let Some(err) = &result.error {
            return Err(BridgeError::with_status(err.message.clone(), result.status));
        }
        if result.status >= 400 {
            return Err(BridgeError::with_status(
                format!("tools/list failed ({})", result.status),
                result.status,
            ));
        }
        let listed = result
            .parsed
            .as_ref()
            .and_then(|v| v.get("tools"))
            .cloned()
            .and_then(|t| serde_json::from_value::<Vec<ToolDescriptor>>(t).ok())
            .unwrap_or_default();
        Ok(merge_tools(manifest_tools, listed))
    }

    /// `tools/call` with the sanitised arguments.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallResult, BridgeError> {
        log::debug!("[MCP] tools/call {} {}", name, arguments);
        self.call("tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }
}

/// Best-effort extraction of an error message from a host reply body.
fn host_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(body).ok()?;
    parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// Derive the manifest URL from the endpoint path.
///
/// Trailing slash stripped, then: root or `/api/mcp/chat` map to
/// `/mcp/manifest`; everything else gets `/manifest` appended.
pub fn manifest_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    let (origin, path) = match trimmed.find("://") {
        Some(scheme_end) => {
            let after_scheme = &trimmed[scheme_end + 3..];
            match after_scheme.find('/') {
                Some(slash) => {
                    let split = scheme_end + 3 + slash;
                    (&trimmed[..split], &trimmed[split..])
                }
                None => (trimmed, ""),
            }
        }
        None => (trimmed, ""),
    };

    if path.is_empty() || path == "/api/mcp/chat" {
        format!("{}/mcp/manifest", origin)
    } else {
        format!("{}{}/manifest", origin, path)
    }
}
