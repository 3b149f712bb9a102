//! Wire types for the tool host: JSON-RPC envelope, tool descriptors and the
//! normalised call result the agents operate on.
//!
//! Tool results and manifests arrive as untyped JSON. Everything the agents
//! touch goes through the typed views here; raw `serde_json::Value` never
//! leaves the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        RpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params: Some(params),
        }
    }
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// A response is a JSON-RPC envelope only when it carries the version
    /// marker and one of result/error.
    pub fn is_valid_envelope(&self) -> bool {
        self.jsonrpc.as_deref() == Some("2.0")
            && (self.result.is_some() || self.error.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Schema fragment for a single tool property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default)]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

/// Input schema of a tool: property map plus the ordered required list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn requires(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// First key to seed when nothing else matches: first required name,
    /// else the first declared property.
    pub fn first_key(&self) -> Option<&str> {
        self.required
            .first()
            .map(|s| s.as_str())
            .or_else(|| self.properties.keys().next().map(|s| s.as_str()))
    }
}

/// A tool advertised by the host (manifest or `tools/list`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: ToolInputSchema,
}

impl ToolDescriptor {
    /// A descriptor is usable iff it carries a name.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Merge manifest tools with the `tools/list` result.
///
/// Per name, fields from the tools/list entry override scalar fields and its
/// input schema is shallow-merged over the manifest's (property entries
/// replaced wholesale, required replaced when the override provides one).
/// List entries absent from the manifest are appended. Unnamed entries drop.
pub fn merge_tools(manifest: Vec<ToolDescriptor>, listed: Vec<ToolDescriptor>) -> Vec<ToolDescriptor> {
    let mut merged: Vec<ToolDescriptor> = manifest.into_iter().filter(ToolDescriptor::is_valid).collect();

    for tool in listed.into_iter().filter(ToolDescriptor::is_valid) {
        if let Some(existing) = merged.iter_mut().find(|t| t.name == tool.name) {
            if !tool.description.is_empty() {
                existing.description = tool.description;
            }
            for (key, prop) in tool.input_schema.properties {
                existing.input_schema.properties.insert(key, prop);
            }
            if !tool.input_schema.required.is_empty() {
                existing.input_schema.required = tool.input_schema.required;
            }
        } else {
            merged.push(tool);
        }
    }
    merged
}

/// Result of the manifest fetch, produced once per request at planning time.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestContext {
    pub ok: bool,
    pub status: u16,
    #[serde(rename = "targetUrl")]
    pub target_url: String,
    pub tools: Vec<ToolDescriptor>,
    #[serde(rename = "manifestAttempt")]
    pub manifest_attempt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Normalised result of one `tools/call`.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub status: u16,
    /// The parsed JSON-RPC `result` payload, when the body was valid JSON.
    pub parsed: Option<Value>,
    /// JSON-RPC error object, which shortcuts every other payload shape.
    pub error: Option<RpcError>,
    pub raw: String,
}

impl CallResult {
    /// Build from an HTTP reply, splitting the JSON-RPC envelope into its
    /// result/error halves. Exactly one of `structuredContent`, `content[]`
    /// or `error` ends up meaningful; everything else is fallback.
    pub fn from_http(status: u16, body: String) -> Self {
        let envelope = serde_json::from_str::<Value>(&body).ok();
        let error = envelope
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(|e| serde_json::from_value::<RpcError>(e.clone()).ok());
        let parsed = envelope.and_then(|mut v| {
            v.as_object_mut().and_then(|obj| obj.remove("result"))
        });
        CallResult {
            status,
            parsed,
            error,
            raw: body,
        }
    }

    pub fn ok(&self) -> bool {
        self.status < 400 && self.error.is_none()
    }

    /// `result.structuredContent`, the preferred payload shape.
    pub fn structured_content(&self) -> Option<&Value> {
        self.parsed.as_ref().and_then(|v| v.get("structuredContent"))
    }

    /// Text entries of `result.content[]`.
    pub fn content_texts(&self) -> Vec<String> {
        self.parsed
            .as_ref()
            .and_then(|v| v.get("content"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Field lookup inside `structuredContent`.
    pub fn structured_field(&self, field: &str) -> Option<&Value> {
        self.structured_content().and_then(|v| v.get(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, props: &[(&str, &str)], required: &[&str]) -> ToolDescriptor {
        let mut schema = ToolInputSchema::default();
        for (key, ty) in props {
            schema.properties.insert(
                key.to_string(),
                PropertySchema {
                    schema_type: ty.to_string(),
                    items: None,
                },
            );
        }
        schema.required = required.iter().map(|s| s.to_string()).collect();
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} tool", name),
            input_schema: schema,
        }
    }

    #[test]
    fn test_merge_appends_unknown_listed_tools() {
        let merged = merge_tools(
            vec![tool("search", &[("query", "string")], &["query"])],
            vec![tool("list_docs", &[("paths", "array")], &[])],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].name, "list_docs");
    }

    #[test]
    fn test_merge_drops_unnamed_entries() {
        let merged = merge_tools(
            vec![ToolDescriptor::default()],
            vec![tool("search", &[], &[])],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "search");
    }

    #[test]
    fn test_merge_shallow_merges_schema() {
        let manifest = tool("search", &[("query", "string"), ("limit", "number")], &["query"]);
        let listed = tool("search", &[("query", "text")], &[]);
        let merged = merge_tools(vec![manifest], vec![listed]);

        assert_eq!(merged.len(), 1);
        let schema = &merged[0].input_schema;
        // listed property replaces the manifest entry wholesale
        assert_eq!(schema.properties["query"].schema_type, "text");
        // untouched manifest property survives
        assert_eq!(schema.properties["limit"].schema_type, "number");
        // listed had no required list, manifest's stays
        assert_eq!(schema.required, vec!["query".to_string()]);
    }

    #[test]
    fn merge_is_last_wins_per_property() {
        let a = tool("t", &[("x", "string")], &[]);
        let b = tool("t", &[("x", "number")], &[]);
        let c = tool("t", &[("x", "array")], &[]);

        let left = merge_tools(merge_tools(vec![a.clone()], vec![b.clone()]), vec![c.clone()]);
        let right = merge_tools(vec![a], merge_tools(vec![b], vec![c]));
        assert_eq!(
            left[0].input_schema.properties["x"].schema_type,
            right[0].input_schema.properties["x"].schema_type,
            "merge must be associative up to last-wins"
        );
        assert_eq!(left[0].input_schema.properties["x"].schema_type, "array");
    }

    #[test]
    fn test_call_result_accessors() {
        let result = CallResult {
            status: 200,
            parsed: Some(json!({
                "structuredContent": {"hits": []},
                "content": [{"type": "text", "text": "hello"}, {"type": "image"}]
            })),
            error: None,
            raw: String::new(),
        };
        assert!(result.ok());
        assert!(result.structured_field("hits").is_some());
        assert_eq!(result.content_texts(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_rpc_envelope_validity() {
        let valid: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {}})).unwrap();
        assert!(valid.is_valid_envelope());

        let invalid: RpcResponse = serde_json::from_value(json!({"message": "hi"})).unwrap();
        assert!(!invalid.is_valid_envelope());
    }
}
