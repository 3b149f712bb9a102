//! Argument engine: path normalisation, schema-aware argument construction
//! and sanitisation, and discovery-path extraction from tool results.
//!
//! Everything here is pure over the tool schema plus the routed query, so the
//! planner and executor can both call in without sharing state. Sanitisation
//! is idempotent; running it twice over the same schema is a no-op.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::mcp::types::{CallResult, ToolDescriptor};

/// Keys treated as "the query slot" of a tool, in preference order.
pub const QUERY_KEYS: [&str; 7] = ["query", "input", "text", "prompt", "q", "question", "content"];

/// Keys under `structuredContent` whose array items may carry paths.
const PATH_LIST_KEYS: [&str; 6] = ["paths", "files", "results", "hits", "docs", "documents"];

/// Path-shaped substrings: leading `./`/`/` with a dotted extension, two or
/// more `/`-joined segments, a bare `.md` name, or a bare directory name
/// ending in `/`.
static PATH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        (?:\./|/)[^\s,;"']+\.[A-Za-z0-9]+   # ./dir/file.ext or /abs/file.ext
        | [A-Za-z0-9_.\-]+(?:/[A-Za-z0-9_.\-]+)+/?  # seg/seg(/...)
        | [A-Za-z0-9_.\-]+\.md\b            # bare name.md
        | [A-Za-z0-9_.\-]+/                 # bare dir/
        "#,
    )
    .expect("path token regex")
});

static EXTENSION_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]+$").expect("extension regex"));

fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for p in paths {
        if !p.is_empty() && !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen
}

/// Extract path candidates from free text.
///
/// Falls back to separator splitting when no path-shaped token is found; a
/// lone fallback token is rejected unless it actually looks like a path.
pub fn normalize_path_text(raw: &str) -> Vec<String> {
    let matched: Vec<String> = PATH_TOKEN
        .find_iter(raw)
        .map(|m| m.as_str().to_string())
        .collect();
    if !matched.is_empty() {
        return dedup(matched);
    }

    let tokens: Vec<String> = raw
        .split([';', ',', '\n'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if tokens.len() == 1 {
        let only = &tokens[0];
        let has_hint = only.contains('/') || EXTENSION_HINT.is_match(only);
        if only.contains(' ') || !has_hint {
            return Vec::new();
        }
    }
    dedup(tokens)
}

/// Coerce array items to trimmed strings, dropping empties and non-scalars.
pub fn normalize_path_items(values: &[Value]) -> Vec<String> {
    let coerced = values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    dedup(coerced)
}

/// Normalise a path-carrying value of either shape.
pub fn normalize_path_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => normalize_path_text(s),
        Value::Array(items) => normalize_path_items(items),
        _ => Vec::new(),
    }
}

/// Defaults inferred from the schema alone.
pub fn default_arguments(tool: &ToolDescriptor) -> Map<String, Value> {
    let mut args = Map::new();
    if tool.input_schema.has_property("output_path") {
        args.insert("output_path".to_string(), json!("output.md"));
    }
    args
}

/// First query-like property the schema declares, in QUERY_KEYS order.
pub fn query_like_key(tool: &ToolDescriptor) -> Option<&'static str> {
    QUERY_KEYS
        .iter()
        .copied()
        .find(|k| tool.input_schema.has_property(k))
}

/// Build the first-attempt arguments for a tool from a seed string.
pub fn initial_arguments(tool: &ToolDescriptor, seed: &str) -> Map<String, Value> {
    let schema = &tool.input_schema;
    let mut args = Map::new();

    let summary_shaped = tool.name.contains("rebuild_summary")
        || (schema.requires("paths") && schema.requires("output_path"));
    if summary_shaped {
        args.insert("paths".to_string(), json!(normalize_path_text(seed)));
        args.insert("output_path".to_string(), json!("output.md"));
        return args;
    }

    if schema.has_property("paths") {
        args.insert("paths".to_string(), json!(normalize_path_text(seed)));
        if schema.requires("output_path") {
            args.insert("output_path".to_string(), json!("output.md"));
        }
        return args;
    }

    if schema.requires("output_path") && query_like_key(tool).is_none() {
        args.insert("output_path".to_string(), json!("output.md"));
        if let Some(other) = schema.required.iter().find(|k| *k != "output_path") {
            args.insert(other.clone(), json!(seed));
        }
        return args;
    }

    if let Some(key) = query_like_key(tool) {
        args.insert(key.to_string(), json!(seed));
        return args;
    }

    match schema.first_key() {
        Some(key) => {
            args.insert(key.to_string(), json!(seed));
        }
        None => {
            args.insert("query".to_string(), json!(seed));
        }
    }
    args
}

/// Sanitise planned arguments against the tool schema.
///
/// Preference chain for `paths`: provided paths/path/path_list, then the
/// routed query, then the configured default paths. `output_path` is repaired
/// to "output.md" whenever it is missing or not a non-empty string. Declared
/// properties are coerced to their schema type, required keys are filled from
/// the seed, and a query-like slot gets the seed when nothing set one.
pub fn sanitize_arguments(
    tool: &ToolDescriptor,
    planned: &Value,
    seed: &str,
    default_paths: &[String],
) -> Map<String, Value> {
    let schema = &tool.input_schema;
    let mut args = planned.as_object().cloned().unwrap_or_default();

    if schema.has_property("paths") {
        let provided = ["paths", "path", "path_list"]
            .iter()
            .filter_map(|k| args.get(*k))
            .map(normalize_path_value)
            .find(|p| !p.is_empty());
        let paths = provided
            .or_else(|| {
                let parsed = normalize_path_text(seed);
                (!parsed.is_empty()).then_some(parsed)
            })
            .unwrap_or_else(|| dedup(default_paths.iter().map(|p| p.trim().to_string()).collect()));
        args.remove("path");
        args.remove("path_list");
        args.insert("paths".to_string(), json!(paths));
    }

    if schema.has_property("output_path") || schema.requires("output_path") {
        let usable = args
            .get("output_path")
            .and_then(Value::as_str)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !usable {
            args.insert("output_path".to_string(), json!("output.md"));
        }
    }

    for (key, prop) in &schema.properties {
        let Some(value) = args.get(key) else { continue };
        if value.is_array() {
            let items = value.as_array().cloned().unwrap_or_default();
            args.insert(key.clone(), json!(normalize_path_items(&items)));
        } else if prop.schema_type == "string" && !value.is_string() {
            args.insert(key.clone(), json!(value.to_string()));
        }
    }

    for key in &schema.required {
        let missing = !args.contains_key(key) || args[key].is_null();
        if !missing {
            continue;
        }
        let fill = match key.as_str() {
            "paths" => {
                let parsed = normalize_path_text(seed);
                if parsed.is_empty() {
                    json!(default_paths)
                } else {
                    json!(parsed)
                }
            }
            "output_path" => json!("output.md"),
            _ => json!(seed),
        };
        args.insert(key.clone(), fill);
    }

    let query_set = QUERY_KEYS.iter().any(|k| args.contains_key(*k));
    if !query_set {
        if let Some(key) = query_like_key(tool) {
            args.insert(key.to_string(), json!(seed));
        }
    }

    args
}

/// Harvest path-like strings from a tool-call result.
///
/// Walks the well-known list keys of `structuredContent`, every value under a
/// key containing "path" anywhere in the payload, and `content[].text`.
pub fn extract_discovery_paths(result: &CallResult) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(sc) = result.structured_content() {
        for key in PATH_LIST_KEYS {
            let Some(items) = sc.get(key).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                match item {
                    Value::String(s) => candidates.push(s.clone()),
                    Value::Object(_) => harvest_path_keys(item, &mut candidates),
                    _ => {}
                }
            }
        }
        harvest_path_keys(sc, &mut candidates);
    }

    for text in result.content_texts() {
        candidates.extend(normalize_path_text(&text));
    }

    dedup(
        candidates
            .iter()
            .flat_map(|c| normalize_path_text(c))
            .collect(),
    )
}

/// Recursively collect string/array values under any key containing "path".
fn harvest_path_keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if key.to_lowercase().contains("path") {
                    match v {
                        Value::String(s) => out.push(s.clone()),
                        Value::Array(items) => {
                            out.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
                        }
                        _ => {}
                    }
                }
                harvest_path_keys(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                harvest_path_keys(v, out);
            }
        }
        _ => {}
    }
}
