//! Chat endpoints: the JSON request/response form and the SSE stream.

use actix_web::{web, HttpResponse, Responder};
use futures_util::stream;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::agents::progress::{ChannelSink, NullSink, ProgressSink};
use crate::agents::types::ConversationTurn;
use crate::agents::Runtime;
use crate::llm::{LlmClient, OpenAiClient};
use crate::mcp::client::{HttpTransport, ToolHostClient};
use crate::sse::encode_frame;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(rename = "localEndpoint", default)]
    pub local_endpoint: Option<String>,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/mcp/chat").route(web::post().to(chat)))
        .service(web::resource("/api/mcp/chat/stream").route(web::post().to(chat_stream)));
}

/// A usable tool-host endpoint: absolute http(s) URL with a host part.
fn valid_endpoint(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(rest) => !rest.is_empty() && !rest.starts_with('/') && !url.contains(char::is_whitespace),
        None => false,
    }
}

/// Shared request validation. Returns the runtime inputs or the error reply.
fn prepare(
    state: &AppState,
    body: &ChatRequest,
) -> Result<(String, Arc<dyn LlmClient>), HttpResponse> {
    if body.prompt.trim().is_empty() {
        return Err(HttpResponse::BadRequest().json(json!({
            "error": "prompt is required"
        })));
    }

    let endpoint = body
        .local_endpoint
        .clone()
        .unwrap_or_else(|| state.config.local_mcp_endpoint.clone());
    if !valid_endpoint(&endpoint) {
        return Err(HttpResponse::BadRequest().json(json!({
            "error": format!("invalid localEndpoint: {}", endpoint)
        })));
    }

    let Some(api_key) = state.config.openai_api_key.as_deref() else {
        return Err(HttpResponse::InternalServerError().json(json!({
            "error": "OPENAI_API_KEY is not configured"
        })));
    };
    let llm: Arc<dyn LlmClient> =
        Arc::new(OpenAiClient::new(api_key, &state.config.openai_model, None));
    Ok((endpoint, llm))
}

fn build_runtime(
    state: &AppState,
    endpoint: String,
    llm: Arc<dyn LlmClient>,
    sink: Arc<dyn ProgressSink>,
) -> Runtime {
    let transport = Arc::new(HttpTransport::new(state.config.local_mcp_token.clone()));
    let host = ToolHostClient::new(endpoint, transport);
    Runtime::new(llm, host, sink, state.config.default_paths.clone())
}

async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    let (endpoint, llm) = match prepare(&state, &body) {
        Ok(inputs) => inputs,
        Err(reply) => return reply,
    };

    let runtime = build_runtime(&state, endpoint, llm, Arc::new(NullSink));
    let response = runtime.run(&body.prompt, &body.conversation).await;
    HttpResponse::Ok().json(response)
}

async fn chat_stream(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    let (endpoint, llm) = match prepare(&state, &body) {
        Ok(inputs) => inputs,
        Err(reply) => return reply,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink::new(tx));
    let runtime = build_runtime(&state, endpoint, llm, sink.clone());

    let prompt = body.prompt.clone();
    let conversation = body.conversation.clone();
    actix_web::rt::spawn(async move {
        let response = runtime.run(&prompt, &conversation).await;
        runtime.stream_answer(&response);
        // done is always the terminal frame, whatever happened above
        sink.emit("done", json!({"ok": true}));
    });

    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| {
            let bytes = web::Bytes::from(encode_frame(&frame.event, &frame.data));
            (Ok::<_, actix_web::Error>(bytes), rx)
        })
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_endpoint() {
        assert!(valid_endpoint("http://localhost:8931/mcp"));
        assert!(valid_endpoint("https://tools.example.com"));
        assert!(!valid_endpoint("localhost:8931"));
        assert!(!valid_endpoint("ftp://example.com"));
        assert!(!valid_endpoint("http://"));
        assert!(!valid_endpoint("http://bad host/mcp"));
    }
}
