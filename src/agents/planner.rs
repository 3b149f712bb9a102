//! Plan agent: route decision and manifest-aware execution planning.
//!
//! At most two LLM calls per request. Parse failures never bubble out of
//! here: the route defaults to tool execution with the original prompt, and
//! the tool selector falls back to the keyword heuristic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::agents::types::{
    DiscoverySpec, ExecutionPlan, RouteKind, WhenClause, WorkflowSpec, WorkflowStep,
    WORKFLOW_SCHEMA,
};
use crate::arguments::{default_arguments, initial_arguments, sanitize_arguments};
use crate::llm::{extract_json_object, CompletionFormat, LlmClient, Message};
use crate::mcp::types::ToolDescriptor;

const ROUTE_SYSTEM_PROMPT: &str = "\
You are the routing stage of a tool bridge. Decide whether the user's request \
needs an external tool (file search, summaries, version control) or can be \
answered directly by a language model. Respond with JSON only: \
{\"route\": \"local_mcp\" | \"chat_only\", \"query\": \"<query for the next stage>\", \
\"explanation\": \"<one sentence>\"}";

const SELECTOR_SYSTEM_PROMPT: &str = "\
You select one tool for the user's request. Respond with JSON only: \
{\"tool\": \"<name>\", \"tool_arguments\": {...}, \"routed_query\": \"<refined query>\", \
\"explanation\": \"<one sentence>\", \
\"discovery\": {\"tool\": \"<name>\", \"tool_arguments\": {...}, \"expected_paths\": []}}. \
Use only tools from the catalogue. Omit discovery when the tool needs no paths.";

static WORKFLOW_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpr\b|pull request|github|\bsync\b|깃허브|commit|push|deploy")
        .expect("workflow intent regex")
});

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub route: RouteKind,
    pub query: String,
    pub explanation: String,
}

/// First planner stage: tool execution vs. direct chat.
pub async fn decide_route(llm: &dyn LlmClient, prompt: &str) -> RouteDecision {
    let messages = vec![Message::system(ROUTE_SYSTEM_PROMPT), Message::user(prompt)];
    let fallback = RouteDecision {
        route: RouteKind::LocalMcp,
        query: prompt.to_string(),
        explanation: String::new(),
    };

    let raw = match llm.complete(&messages, CompletionFormat::Json).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("[PLAN] route decision failed, defaulting to local_mcp: {}", e);
            return fallback;
        }
    };
    let Some(parsed) = extract_json_object(&raw) else {
        log::warn!("[PLAN] unparseable route decision, defaulting to local_mcp");
        return fallback;
    };

    let route = match parsed.get("route").and_then(Value::as_str) {
        Some("chat_only") => RouteKind::ChatOnly,
        _ => RouteKind::LocalMcp,
    };
    let query = parsed
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(prompt)
        .to_string();
    let explanation = parsed
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    RouteDecision {
        route,
        query,
        explanation,
    }
}

/// Second planner stage: pick a tool (and possibly a workflow) from the
/// merged catalogue. `None` means the execution step cannot proceed.
pub async fn plan_from_manifest(
    llm: &dyn LlmClient,
    tools: &[ToolDescriptor],
    routed_query: &str,
) -> Option<ExecutionPlan> {
    if tools.is_empty() {
        return None;
    }

    if let Some(plan) = probe_github_pr_workflow(tools, routed_query) {
        log::info!("[PLAN] github_pr workflow detected for query");
        return Some(plan);
    }

    if let Some(plan) = select_tool_with_llm(llm, tools, routed_query).await {
        return Some(plan);
    }

    let tool = heuristic_best_tool(tools, routed_query)?;
    let mut arguments = default_arguments(tool);
    arguments.extend(initial_arguments(tool, routed_query));
    log::info!("[PLAN] heuristic fallback selected '{}'", tool.name);
    Some(ExecutionPlan {
        tool: Some(tool.name.clone()),
        tool_arguments: Value::Object(arguments),
        routed_query: routed_query.to_string(),
        explanation: "keyword match".to_string(),
        discovery: None,
        workflow: None,
    })
}

/// GitHub-PR intent plus a host that exposes both `sync_status` and
/// `create_pr` yields the fixed three-step workflow. The pull step is only
/// declared when a pull-like tool exists.
fn probe_github_pr_workflow(tools: &[ToolDescriptor], routed_query: &str) -> Option<ExecutionPlan> {
    if !WORKFLOW_INTENT.is_match(routed_query) {
        return None;
    }
    let has = |name: &str| tools.iter().any(|t| t.name == name);
    if !has("sync_status") || !has("create_pr") {
        return None;
    }

    let mut steps = Vec::new();
    if let Some(pull_tool) = tools.iter().find(|t| t.name.contains("pull")) {
        steps.push(WorkflowStep {
            id: "pull_if_needed".to_string(),
            tool: pull_tool.name.clone(),
            tool_arguments: json!({}),
            when: Some(WhenClause::SyncFieldEquals {
                field: "ready_for_pull".to_string(),
                equals: json!(true),
            }),
        });
    }
    steps.push(WorkflowStep {
        id: "sync_refresh_after_pull".to_string(),
        tool: "sync_status".to_string(),
        tool_arguments: json!({}),
        when: Some(WhenClause::StepExecuted {
            step_id: "pull_if_needed".to_string(),
        }),
    });
    steps.push(WorkflowStep {
        id: "create_pr_if_ready".to_string(),
        tool: "create_pr".to_string(),
        tool_arguments: json!({}),
        when: Some(WhenClause::SyncFieldEquals {
            field: "ready_for_pr".to_string(),
            equals: json!(true),
        }),
    });

    Some(ExecutionPlan {
        tool: Some("sync_status".to_string()),
        tool_arguments: json!({}),
        routed_query: routed_query.to_string(),
        explanation: "GitHub PR 워크플로우".to_string(),
        discovery: None,
        workflow: Some(WorkflowSpec {
            schema: WORKFLOW_SCHEMA.to_string(),
            workflow_type: "github_pr".to_string(),
            mode: "sequential".to_string(),
            steps,
        }),
    })
}

async fn select_tool_with_llm(
    llm: &dyn LlmClient,
    tools: &[ToolDescriptor],
    routed_query: &str,
) -> Option<ExecutionPlan> {
    let catalogue: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "required": t.input_schema.required,
                "properties": t.input_schema.properties.keys().collect::<Vec<_>>(),
            })
        })
        .collect();
    let user = format!(
        "Tool catalogue:\n{}\n\nUser request: {}",
        serde_json::to_string_pretty(&catalogue).unwrap_or_default(),
        routed_query
    );
    let messages = vec![Message::system(SELECTOR_SYSTEM_PROMPT), Message::user(user)];

    let raw = match llm.complete(&messages, CompletionFormat::Json).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("[PLAN] tool selector failed: {}", e);
            return None;
        }
    };
    let parsed = extract_json_object(&raw)?;

    let tool_name = parsed.get("tool").and_then(Value::as_str)?;
    let tool = tools.iter().find(|t| t.name == tool_name)?;

    let planned = parsed
        .get("tool_arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let seed = parsed
        .get("routed_query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(routed_query)
        .to_string();
    let arguments = sanitize_arguments(tool, &planned, &seed, &[]);

    let discovery = parsed
        .get("discovery")
        .cloned()
        .and_then(|d| serde_json::from_value::<DiscoverySpec>(d).ok())
        .filter(|d| !d.tool.is_empty());

    Some(ExecutionPlan {
        tool: Some(tool.name.clone()),
        tool_arguments: Value::Object(arguments),
        routed_query: seed,
        explanation: parsed
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        discovery,
        workflow: None,
    })
}

/// Keyword match against tool names, else the first tool in the list.
pub fn heuristic_best_tool<'a>(
    tools: &'a [ToolDescriptor],
    routed_query: &str,
) -> Option<&'a ToolDescriptor> {
    static INTENT_HINTS: Lazy<Vec<(Regex, Vec<&'static str>)>> = Lazy::new(|| {
        vec![
            (
                Regex::new(r"(?i)요약|정리|summary|summar").unwrap(),
                vec!["summar", "rebuild"],
            ),
            (
                Regex::new(r"(?i)검색|찾|search|query|find|lookup").unwrap(),
                vec!["search", "query", "find", "lookup"],
            ),
            (
                Regex::new(r"(?i)목록|문서|list|docs").unwrap(),
                vec!["list", "docs", "index"],
            ),
        ]
    });

    for (intent, hints) in INTENT_HINTS.iter() {
        if !intent.is_match(routed_query) {
            continue;
        }
        if let Some(tool) = tools
            .iter()
            .find(|t| hints.iter().any(|h| t.name.contains(h)))
        {
            return Some(tool);
        }
    }
    tools.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlm;
    use crate::mcp::types::{PropertySchema, ToolInputSchema};

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

    #[tokio::test]
    async fn test_route_decision_parses_chat_only() {
        let llm = MockLlm::new(vec![
            r#"{"route": "chat_only", "query": "1+1은 뭐야?", "explanation": "단순 질문"}"#,
        ]);
        let decision = decide_route(&llm, "1+1은 뭐야?").await;
        assert_eq!(decision.route, RouteKind::ChatOnly);
        assert_eq!(decision.query, "1+1은 뭐야?");
    }

    #[tokio::test]
    async fn test_route_decision_defaults_on_garbage() {
        let llm = MockLlm::new(vec!["definitely not json"]);
        let decision = decide_route(&llm, "오늘 노트 요약해줘").await;
        assert_eq!(decision.route, RouteKind::LocalMcp);
        assert_eq!(decision.query, "오늘 노트 요약해줘");
    }

    #[tokio::test]
    async fn test_route_decision_defaults_on_llm_error() {
        let llm = MockLlm::new(vec![]);
        let decision = decide_route(&llm, "prompt").await;
        assert_eq!(decision.route, RouteKind::LocalMcp);
    }

    #[tokio::test]
    async fn test_plan_empty_catalogue_is_none() {
        let llm = MockLlm::new(vec![]);
        assert!(plan_from_manifest(&llm, &[], "query").await.is_none());
    }

    #[tokio::test]
    async fn test_workflow_probe_builds_three_steps() {
        let llm = MockLlm::new(vec![]);
        let tools = vec![
            tool("sync_status", &[], &[]),
            tool("pull_changes", &[], &[]),
            tool("create_pr", &[], &[]),
        ];
        let plan = plan_from_manifest(&llm, &tools, "PR 생성해줘").await.unwrap();
        assert_eq!(plan.tool.as_deref(), Some("sync_status"));

        let workflow = plan.workflow.expect("github_pr intent must carry a workflow");
        assert_eq!(workflow.workflow_type, "github_pr");
        assert_eq!(workflow.mode, "sequential");
        let ids: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["pull_if_needed", "sync_refresh_after_pull", "create_pr_if_ready"]
        );
        assert_eq!(llm.call_count(), 0, "workflow probe must not consult the LLM");
    }

    #[tokio::test]
    async fn test_workflow_probe_without_pull_tool() {
        let llm = MockLlm::new(vec![]);
        let tools = vec![tool("sync_status", &[], &[]), tool("create_pr", &[], &[])];
        let plan = plan_from_manifest(&llm, &tools, "github pr 만들어줘")
            .await
            .unwrap();
        let workflow = plan.workflow.unwrap();
        assert_eq!(workflow.steps.len(), 2, "pull step needs a pull-like tool");
        assert_eq!(workflow.steps[0].id, "sync_refresh_after_pull");
    }

    #[tokio::test]
    async fn test_workflow_probe_requires_both_tools() {
        let llm = MockLlm::new(vec![r#"{"tool": "sync_status", "tool_arguments": {}}"#]);
        let tools = vec![tool("sync_status", &[], &[])];
        let plan = plan_from_manifest(&llm, &tools, "PR 생성해줘").await.unwrap();
        assert!(plan.workflow.is_none(), "create_pr missing, no workflow");
    }

    #[tokio::test]
    async fn test_selector_plan_sanitises_arguments() {
        let llm = MockLlm::new(vec![
            r#"{"tool": "search", "tool_arguments": {"query": 42}, "routed_query": "React", "explanation": "검색"}"#,
        ]);
        let tools = vec![tool("search", &[("query", "string")], &["query"])];
        let plan = plan_from_manifest(&llm, &tools, "React 관련 내용 찾아줘")
            .await
            .unwrap();
        assert_eq!(plan.tool.as_deref(), Some("search"));
        assert_eq!(plan.tool_arguments["query"], serde_json::json!("42"));
        assert_eq!(plan.routed_query, "React");
    }

    #[tokio::test]
    async fn test_selector_unknown_tool_falls_back_to_heuristic() {
        let llm = MockLlm::new(vec![r#"{"tool": "no_such_tool"}"#]);
        let tools = vec![
            tool("list_docs", &[], &[]),
            tool("rebuild_summary", &[("paths", "array")], &["paths"]),
        ];
        let plan = plan_from_manifest(&llm, &tools, "오늘 노트 요약해줘")
            .await
            .unwrap();
        assert_eq!(plan.tool.as_deref(), Some("rebuild_summary"));
    }

    #[test]
    fn test_heuristic_prefers_intent_match() {
        let tools = vec![
            tool("list_docs", &[], &[]),
            tool("search", &[], &[]),
            tool("rebuild_summary", &[], &[]),
        ];
        assert_eq!(
            heuristic_best_tool(&tools, "React 검색").unwrap().name,
            "search"
        );
        assert_eq!(
            heuristic_best_tool(&tools, "요약 부탁").unwrap().name,
            "rebuild_summary"
        );
        assert_eq!(
            heuristic_best_tool(&tools, "아무 요청").unwrap().name,
            "list_docs"
        );
    }
}
