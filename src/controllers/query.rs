//! Debug pass-through: one raw JSON-RPC call against the tool host.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::mcp::client::{HttpTransport, ToolHostClient};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "localEndpoint", default)]
    pub local_endpoint: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/mcp/query").route(web::post().to(query)));
}

async fn query(state: web::Data<AppState>, body: web::Json<QueryRequest>) -> impl Responder {
    if body.method.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "method is required"}));
    }

    let endpoint = body
        .local_endpoint
        .clone()
        .unwrap_or_else(|| state.config.local_mcp_endpoint.clone());
    let transport = Arc::new(HttpTransport::new(state.config.local_mcp_token.clone()));
    let host = ToolHostClient::new(endpoint, transport);

    match host.call(&body.method, body.params.clone()).await {
        Ok(result) => HttpResponse::Ok().json(json!({
            "mcpStatus": result.status,
            "result": result.parsed,
            "error": result.error,
            "raw": result.raw,
        })),
        Err(e) => HttpResponse::Ok().json(json!({
            "mcpStatus": e.mcp_status(),
            "error": e.message,
        })),
    }
}
