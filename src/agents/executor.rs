//! MCP agent: one tool invocation with discovery preflight, empty-hit search
//! retry and the summary chain.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::agents::progress::{mcp_progress, ProgressSink};
use crate::agents::types::{AgentResponse, AgentTrace, ExecutionPlan, MissingInput};
use crate::arguments::{extract_discovery_paths, sanitize_arguments};
use crate::format::render_result;
use crate::mcp::client::ToolHostClient;
use crate::mcp::types::{CallResult, ToolDescriptor};

static SEARCH_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"search|query|find|lookup").expect("search hint regex"));
static DISCOVERY_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"search|scan|find|discover|list|index").expect("discovery hint regex"));
static SUMMARY_INTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"요약|정리|summary|summar").expect("summary intent regex"));

/// Everything the execution step borrows from the orchestration context.
pub struct ExecutorContext<'a> {
    pub host: &'a ToolHostClient,
    pub tools: &'a [ToolDescriptor],
    pub sink: &'a dyn ProgressSink,
    pub default_paths: &'a [String],
}

impl ExecutorContext<'_> {
    fn find_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Run one execution plan against the tool host.
pub async fn execute(
    ctx: &ExecutorContext<'_>,
    plan: &ExecutionPlan,
    trace: &mut AgentTrace,
) -> AgentResponse {
    let routed_query = plan.routed_query.as_str();

    let tool = match plan.tool.as_deref().and_then(|name| ctx.find_tool(name)) {
        Some(tool) => tool,
        None => match crate::agents::planner::heuristic_best_tool(ctx.tools, routed_query) {
            Some(tool) => {
                log::info!(
                    "[EXEC] planned tool missing from catalogue, falling back to '{}'",
                    tool.name
                );
                tool
            }
            None => {
                return AgentResponse::needs_input(
                    routed_query,
                    MissingInput::ExecutionPlan,
                    "사용할 수 있는 도구를 찾지 못했습니다. 도구 서버 설정을 확인해주세요."
                        .to_string(),
                );
            }
        },
    };
    trace.selected_tool = Some(tool.name.clone());
    mcp_progress(ctx.sink, "plan", json!({"tool": tool.name}));

    // Defaults are withheld here so the discovery preflight sees genuinely
    // empty paths; they are the last resort below.
    let mut arguments = sanitize_arguments(tool, &plan.tool_arguments, routed_query, &[]);

    if tool.input_schema.requires("paths") {
        let current = paths_of(&Value::Object(arguments.clone()));
        if current.is_empty() || current == ["."] {
            let discovered = discover_paths(ctx, plan, tool, routed_query, trace).await;
            let paths = if discovered.is_empty() {
                ctx.default_paths.to_vec()
            } else {
                discovered
            };
            if paths.is_empty() {
                return AgentResponse::needs_input(
                    routed_query,
                    MissingInput::Paths,
                    "대상 경로를 찾지 못했습니다. 처리할 파일이나 폴더 경로를 알려주세요."
                        .to_string(),
                );
            }
            arguments.insert("paths".to_string(), json!(paths));
        }
    }

    mcp_progress(ctx.sink, "arguments_ready", json!({"tool": tool.name}));
    mcp_progress(ctx.sink, "tool_call", json!({"tool": tool.name}));

    let result = match ctx.host.call_tool(&tool.name, Value::Object(arguments.clone())).await {
        Ok(result) => result,
        Err(e) => {
            log::warn!("[EXEC] tools/call '{}' transport failure: {}", tool.name, e);
            let mut response = AgentResponse::failure(
                routed_query,
                e.mcp_status(),
                format!("도구 호출에 실패했습니다: {}", e.message),
            );
            response.tool = Some(tool.name.clone());
            response.arguments = Some(Value::Object(arguments));
            return response;
        }
    };

    if let Some(err) = &result.error {
        let status = if result.status >= 400 { result.status } else { 400 };
        mcp_progress(
            ctx.sink,
            "tool_call",
            json!({"tool": tool.name, "status": status}),
        );
        let mut response = AgentResponse::failure(routed_query, status, err.message.clone());
        response.tool = Some(tool.name.clone());
        response.arguments = Some(Value::Object(arguments));
        return response;
    }

    let (tool, arguments, result) =
        retry_empty_search(ctx, tool, arguments, result, trace).await;
    let (tool, arguments, result) =
        chain_summary(ctx, tool, arguments, result, routed_query, trace).await;

    let mut response = AgentResponse::execution(routed_query);
    response.answer = render_result(&tool.name, &result);
    response.tool = Some(tool.name.clone());
    response.arguments = Some(Value::Object(arguments));
    response.result = result.parsed.clone();
    response.mcp_status = result.status;
    response.explanation = (!plan.explanation.is_empty()).then(|| plan.explanation.clone());
    response
}

fn paths_of(arguments: &Value) -> Vec<String> {
    arguments
        .get("paths")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Pick the discovery tool: the plan's choice when it names a known tool,
/// otherwise a hint-matched tool that does not itself require paths.
fn fallback_discovery_tool<'a>(
    ctx: &'a ExecutorContext<'_>,
    selected: &ToolDescriptor,
) -> Option<&'a ToolDescriptor> {
    let candidates: Vec<&ToolDescriptor> = ctx
        .tools
        .iter()
        .filter(|t| DISCOVERY_HINT.is_match(&t.name) && !t.input_schema.requires("paths"))
        .collect();
    candidates
        .iter()
        .find(|t| t.name != selected.name)
        .or_else(|| candidates.first())
        .copied()
}

async fn discover_paths(
    ctx: &ExecutorContext<'_>,
    plan: &ExecutionPlan,
    selected: &ToolDescriptor,
    routed_query: &str,
    trace: &mut AgentTrace,
) -> Vec<String> {
    let discovery_tool = plan
        .discovery
        .as_ref()
        .and_then(|d| ctx.find_tool(&d.tool))
        .or_else(|| fallback_discovery_tool(ctx, selected));
    let Some(discovery_tool) = discovery_tool else {
        return Vec::new();
    };

    let planned = plan
        .discovery
        .as_ref()
        .filter(|d| d.tool == discovery_tool.name)
        .map(|d| d.tool_arguments.clone())
        .unwrap_or_else(|| json!({}));
    let arguments = sanitize_arguments(discovery_tool, &planned, routed_query, ctx.default_paths);

    trace.discovery_tool = Some(discovery_tool.name.clone());
    mcp_progress(
        ctx.sink,
        "discovery",
        json!({"tool": discovery_tool.name}),
    );

    match ctx
        .host
        .call_tool(&discovery_tool.name, Value::Object(arguments))
        .await
    {
        Ok(result) if result.ok() => {
            let paths = extract_discovery_paths(&result);
            trace.discovered_paths = paths.clone();
            paths
        }
        Ok(result) => {
            log::warn!(
                "[EXEC] discovery '{}' returned {}",
                discovery_tool.name,
                result.status
            );
            Vec::new()
        }
        Err(e) => {
            log::warn!("[EXEC] discovery '{}' failed: {}", discovery_tool.name, e);
            Vec::new()
        }
    }
}

/// Search tools that report an empty `hits` array get one retry over paths
/// discovered through a listing tool seeded with the configured defaults.
async fn retry_empty_search<'a>(
    ctx: &ExecutorContext<'a>,
    tool: &'a ToolDescriptor,
    arguments: serde_json::Map<String, Value>,
    result: CallResult,
    trace: &mut AgentTrace,
) -> (&'a ToolDescriptor, serde_json::Map<String, Value>, CallResult) {
    let empty_hits = result
        .structured_field("hits")
        .and_then(Value::as_array)
        .map(|hits| hits.is_empty())
        .unwrap_or(false);
    if !SEARCH_LIKE.is_match(&tool.name) || !empty_hits {
        return (tool, arguments, result);
    }

    let lister = ctx
        .tools
        .iter()
        .find(|t| t.name.contains("list_docs"))
        .or_else(|| fallback_discovery_tool(ctx, tool));
    let Some(lister) = lister else {
        return (tool, arguments, result);
    };

    mcp_progress(
        ctx.sink,
        "search_retry",
        json!({"tool": lister.name}),
    );

    let mut list_args = serde_json::Map::new();
    if lister.input_schema.has_property("paths") {
        list_args.insert("paths".to_string(), json!(ctx.default_paths));
    }
    if lister.input_schema.has_property("extensions") {
        list_args.insert("extensions".to_string(), json!([".md", ".txt"]));
    }

    let listed = match ctx
        .host
        .call_tool(&lister.name, Value::Object(list_args))
        .await
    {
        Ok(listed) if listed.ok() => listed,
        _ => return (tool, arguments, result),
    };
    let paths = extract_discovery_paths(&listed);
    if paths.is_empty() {
        return (tool, arguments, result);
    }

    let mut retry_args = arguments.clone();
    if tool.input_schema.has_property("paths") {
        retry_args.insert("paths".to_string(), json!(paths));
    }
    match ctx
        .host
        .call_tool(&tool.name, Value::Object(retry_args.clone()))
        .await
    {
        Ok(retried) if retried.ok() => {
            trace.search_retried = true;
            (tool, retry_args, retried)
        }
        _ => (tool, arguments, result),
    }
}

/// When the query implied summarisation and the catalogue carries a distinct
/// summary tool, feed it the paths harvested from the current result.
async fn chain_summary<'a>(
    ctx: &ExecutorContext<'a>,
    tool: &'a ToolDescriptor,
    arguments: serde_json::Map<String, Value>,
    result: CallResult,
    routed_query: &str,
    trace: &mut AgentTrace,
) -> (&'a ToolDescriptor, serde_json::Map<String, Value>, CallResult) {
    if !SUMMARY_INTENT.is_match(routed_query) {
        return (tool, arguments, result);
    }
    let summary_tool = ctx.tools.iter().find(|t| {
        t.name != tool.name
            && (t.name == "rebuild_summary"
                || t.name == "summary"
                || t.name == "summarize"
                || t.name == "rebuild"
                || t.name.contains("summar")
                || t.name.contains("rebuild"))
    });
    let Some(summary_tool) = summary_tool else {
        return (tool, arguments, result);
    };

    let mut paths = extract_discovery_paths(&result);
    if paths.is_empty() && summary_tool.input_schema.requires("paths") {
        let plan = ExecutionPlan::for_tool(&summary_tool.name, json!({}), routed_query);
        paths = discover_paths(ctx, &plan, summary_tool, routed_query, trace).await;
        if paths.is_empty() {
            paths = ctx.default_paths.to_vec();
        }
    }
    if paths.is_empty() {
        return (tool, arguments, result);
    }

    trace.summary_tool = Some(summary_tool.name.clone());
    mcp_progress(
        ctx.sink,
        "summary_chain",
        json!({"tool": summary_tool.name}),
    );

    let summary_args = json!({"paths": paths, "output_path": "output.md"});
    match ctx
        .host
        .call_tool(&summary_tool.name, summary_args.clone())
        .await
    {
        Ok(summarised) if summarised.ok() => {
            let args = summary_args.as_object().cloned().unwrap_or_default();
            (summary_tool, args, summarised)
        }
        _ => (tool, arguments, result),
    }
}
