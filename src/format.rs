//! Deterministic structured-payload → Markdown converters.
//!
//! The writer agent rewrites these for the user afterwards, so the goal here
//! is a faithful, stable rendering of what the tool returned, not prose.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::mcp::types::CallResult;

/// Render a normalised tool result to Markdown.
pub fn render_result(tool_name: &str, result: &CallResult) -> String {
    if let Some(sc) = result.structured_content() {
        if let Some(text) = render_structured(sc) {
            return text;
        }
    }

    let texts = result.content_texts();
    if !texts.is_empty() {
        let mut out = String::from("## MCP 응답\n");
        for text in texts {
            out.push_str(&format!("- {}\n", text));
        }
        return out;
    }

    let payload = result
        .parsed
        .as_ref()
        .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
        .unwrap_or_else(|| result.raw.clone());
    format!(
        "## 실행 결과 - 도구: {}\n```json\n{}\n```",
        tool_name, payload
    )
}

fn render_structured(sc: &Value) -> Option<String> {
    if let Some(summary) = sc.get("summary").and_then(Value::as_str) {
        return Some(render_summary(sc, summary));
    }

    if sc.get("ok").and_then(Value::as_bool) == Some(true) {
        let summary = sc
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("작업이 완료되었습니다.");
        return Some(render_summary(sc, summary));
    }

    if let Some(results) = sc.get("results").and_then(Value::as_array) {
        return Some(render_grouped("## 실행 결과", results));
    }
    if let Some(docs) = sc.get("docs").and_then(Value::as_array) {
        return Some(render_grouped("## 문서 목록", docs));
    }
    if let Some(hits) = sc.get("hits").and_then(Value::as_array) {
        return Some(render_grouped("## 검색 결과", hits));
    }
    None
}

fn render_summary(sc: &Value, summary: &str) -> String {
    let mut out = String::from("## 실행 결과\n");
    if let Some(path) = sc.get("output_path").and_then(Value::as_str) {
        out.push_str(&format!("- output_path: {}\n", path));
    }
    out.push_str(summary);
    out.push('\n');
    out
}

/// Group items by their `path` field, one `###` section per path.
fn render_grouped(heading: &str, items: &[Value]) -> String {
    let mut groups: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for item in items {
        let path = item
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("(경로 없음)")
            .to_string();
        groups.entry(path).or_default().push(item);
    }

    let mut out = format!("{}\n", heading);
    if groups.is_empty() {
        out.push_str("결과가 없습니다.\n");
        return out;
    }
    for (path, entries) in groups {
        out.push_str(&format!("### {}\n", path));
        for entry in entries {
            out.push_str(&format!("- {}\n", render_entry_line(entry)));
        }
    }
    out
}

fn render_entry_line(entry: &Value) -> String {
    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| entry.get("text").and_then(Value::as_str))
        .or_else(|| entry.get("path").and_then(Value::as_str))
        .unwrap_or("(항목)");
    let mut line = title.to_string();
    if let Some(n) = entry.get("line").and_then(Value::as_u64) {
        line.push_str(&format!(" (line {})", n));
    }
    if let Some(snippet) = entry.get("snippet").and_then(Value::as_str) {
        line.push_str(&format!(" - {}", snippet));
    }
    line
}
