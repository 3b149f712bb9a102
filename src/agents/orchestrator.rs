//! Request-scoped runtime driving Plan → Execute → Workflow → Retry →
//! Writer/Evaluator, with every step mirrored onto the progress sink.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::executor::{self, ExecutorContext};
use crate::agents::progress::{mcp_progress, ProgressSink};
use crate::agents::types::{
    A2aMessage, AgentResponse, AgentTrace, ConversationTurn, ExecutionPlan, MissingInput,
    RouteKind,
};
use crate::agents::{chat, planner, workflow, writer};
use crate::arguments::extract_discovery_paths;
use crate::llm::LlmClient;
use crate::mcp::client::{InitOutcome, ToolHostClient};
use crate::sse::{chunk_text, ANSWER_CHUNK_CODEPOINTS};

/// Answer texts that mean the tool host could not resolve its input paths.
static PATH_ISSUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(경로|path).*(없|누락|못 찾|does not exist|invalid)|no valid files|invalid paths|use list_docs")
        .expect("path issue regex")
});

pub struct Runtime {
    llm: Arc<dyn LlmClient>,
    host: ToolHostClient,
    sink: Arc<dyn ProgressSink>,
    default_paths: Vec<String>,
    request_id: String,
}

impl Runtime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        host: ToolHostClient,
        sink: Arc<dyn ProgressSink>,
        default_paths: Vec<String>,
    ) -> Self {
        Runtime {
            llm,
            host,
            sink,
            default_paths,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    fn emit_a2a(&self, from: &str, to: &str, message_type: &str, payload: Value) {
        let message = A2aMessage::new(&self.request_id, from, to, message_type, payload);
        self.sink
            .emit("a2a", serde_json::to_value(&message).unwrap_or_else(|_| json!({})));
    }

    /// Drive the full pipeline for one request.
    pub async fn run(&self, prompt: &str, conversation: &[ConversationTurn]) -> AgentResponse {
        let mut trace = AgentTrace::default();

        self.emit_a2a("orchestrator", "planner", "plan_request", json!({"prompt": prompt}));
        let decision = planner::decide_route(self.llm.as_ref(), prompt).await;
        trace.route = Some(decision.route.as_str().to_string());
        self.sink.emit(
            "route",
            json!({
                "route": decision.route.as_str(),
                "query": decision.query.clone(),
                "explanation": decision.explanation.clone(),
            }),
        );

        let mut response = match decision.route {
            RouteKind::ChatOnly => {
                self.emit_a2a(
                    "planner",
                    "chat",
                    "chat_request",
                    json!({"query": decision.query.clone()}),
                );
                chat::run(self.llm.as_ref(), prompt, conversation).await
            }
            RouteKind::LocalMcp => {
                self.run_tool_route(&decision.query, prompt, conversation, &mut trace)
                    .await
            }
        };

        // Client already gone: the result is discarded, skip the polishing
        // calls instead of spending two more LLM round-trips.
        if !self.sink.is_writable() {
            response.agent_trace = Some(trace);
            return response;
        }

        self.emit_a2a(
            "orchestrator",
            "writer",
            "polish_request",
            json!({"mcpStatus": response.mcp_status}),
        );
        writer::polish(self.llm.as_ref(), prompt, &mut response).await;
        response.agent_trace = Some(trace);
        response
    }

    async fn run_tool_route(
        &self,
        routed_query: &str,
        prompt: &str,
        conversation: &[ConversationTurn],
        trace: &mut AgentTrace,
    ) -> AgentResponse {
        mcp_progress(self.sink.as_ref(), "initialize", json!({}));
        match self.host.initialize().await {
            Err(e) => {
                log::warn!("[ORCH] initialize failed: {}", e);
                return AgentResponse::failure(
                    routed_query,
                    e.mcp_status(),
                    format!("도구 서버에 연결하지 못했습니다: {}", e.message),
                );
            }
            Ok(InitOutcome::Legacy) => {
                trace.legacy_mode = true;
                mcp_progress(self.sink.as_ref(), "legacy_chat", json!({}));
                let convo = serde_json::to_value(conversation).unwrap_or_else(|_| json!([]));
                return match self.host.legacy_chat(prompt, convo).await {
                    Ok(answer) => {
                        let mut response = AgentResponse::execution(routed_query);
                        response.action = "legacy-chat".to_string();
                        response.answer = answer;
                        response
                    }
                    Err(e) => AgentResponse::failure(
                        routed_query,
                        e.mcp_status(),
                        format!("레거시 도구 서버 호출에 실패했습니다: {}", e.message),
                    ),
                };
            }
            Ok(InitOutcome::Ready) => {}
        }

        mcp_progress(self.sink.as_ref(), "manifest_fetch", json!({}));
        let manifest = self.host.fetch_manifest().await;
        trace.manifest_ok = Some(manifest.ok);
        trace.manifest_status = Some(manifest.status);

        mcp_progress(self.sink.as_ref(), "tools_list", json!({}));
        let tools = match self.host.list_tools(manifest.tools.clone()).await {
            Ok(tools) => tools,
            Err(e) => {
                return AgentResponse::failure(
                    routed_query,
                    e.mcp_status(),
                    format!("도구 목록을 가져오지 못했습니다: {}", e.message),
                );
            }
        };
        trace.tool_count = Some(tools.len());

        if tools.is_empty() {
            return AgentResponse::needs_input(
                routed_query,
                MissingInput::ExecutionPlan,
                "도구 서버가 사용 가능한 도구를 제공하지 않습니다.".to_string(),
            );
        }

        let Some(plan) = planner::plan_from_manifest(self.llm.as_ref(), &tools, routed_query).await
        else {
            return AgentResponse::needs_input(
                routed_query,
                MissingInput::ExecutionPlan,
                "요청을 처리할 실행 계획을 세우지 못했습니다.".to_string(),
            );
        };
        self.emit_a2a(
            "planner",
            "executor",
            "execution_plan",
            serde_json::to_value(&plan).unwrap_or_else(|_| json!({})),
        );

        let ctx = ExecutorContext {
            host: &self.host,
            tools: &tools,
            sink: self.sink.as_ref(),
            default_paths: &self.default_paths,
        };

        let mut response = executor::execute(&ctx, &plan, trace).await;
        if let Some(spec) = &plan.workflow {
            self.emit_a2a(
                "executor",
                "workflow",
                "workflow_start",
                json!({"type": spec.workflow_type, "steps": spec.steps.len()}),
            );
            response = workflow::run_workflow(&ctx, spec, response, trace).await;
        }

        if is_path_issue(&response) {
            response = self.retry_path_issue(&ctx, &plan, response, trace).await;
        }
        response
    }

    /// One-shot retry when the host could not resolve paths. Replays only the
    /// last executed call, never the whole workflow.
    async fn retry_path_issue(
        &self,
        ctx: &ExecutorContext<'_>,
        plan: &ExecutionPlan,
        response: AgentResponse,
        trace: &mut AgentTrace,
    ) -> AgentResponse {
        trace.retried = true;
        mcp_progress(self.sink.as_ref(), "path_retry", json!({}));

        let tool_name = response
            .tool
            .clone()
            .or_else(|| plan.tool.clone())
            .unwrap_or_default();
        let routed_query = response
            .routed_query
            .clone()
            .unwrap_or_else(|| plan.routed_query.clone());
        if tool_name.is_empty() {
            return no_documents_failure(response);
        }

        let previous_args = response
            .arguments
            .clone()
            .unwrap_or_else(|| json!({}));

        let lister = ctx.tools.iter().find(|t| {
            t.name.contains("list_docs") || (t.name.contains("list") && t.name.contains("doc"))
        });
        if let Some(lister) = lister {
            let mut list_args = serde_json::Map::new();
            if lister.input_schema.has_property("paths") {
                if let Some(paths) = previous_args.get("paths").filter(|p| {
                    p.as_array().map(|a| !a.is_empty()).unwrap_or(false)
                }) {
                    list_args.insert("paths".to_string(), paths.clone());
                }
            }
            if lister.input_schema.has_property("extensions") {
                list_args.insert("extensions".to_string(), json!([".md"]));
            }
            if lister.input_schema.has_property("glob") {
                list_args.insert("glob".to_string(), json!("**/*.md"));
            }

            if let Ok(listed) = ctx
                .host
                .call_tool(&lister.name, Value::Object(list_args))
                .await
            {
                if listed.ok() {
                    let md_paths: Vec<String> = extract_discovery_paths(&listed)
                        .into_iter()
                        .filter(|p| p.ends_with(".md"))
                        .collect();
                    if !md_paths.is_empty() {
                        let mut retry_args =
                            previous_args.as_object().cloned().unwrap_or_default();
                        retry_args.insert("paths".to_string(), json!(md_paths));
                        let retry_plan = ExecutionPlan::for_tool(
                            &tool_name,
                            Value::Object(retry_args),
                            &routed_query,
                        );
                        return executor::execute(ctx, &retry_plan, trace).await;
                    }
                }
            }
        }

        if !self.default_paths.is_empty() {
            let mut retry_args = previous_args.as_object().cloned().unwrap_or_default();
            retry_args.insert("paths".to_string(), json!(self.default_paths));
            let retry_plan =
                ExecutionPlan::for_tool(&tool_name, Value::Object(retry_args), &routed_query);
            return executor::execute(ctx, &retry_plan, trace).await;
        }

        no_documents_failure(response)
    }

    /// Chunk the polished answer onto the stream, then the `final` frame.
    /// `done` stays with the HTTP layer so it is last in every outcome.
    pub fn stream_answer(&self, response: &AgentResponse) {
        for chunk in chunk_text(&response.answer, ANSWER_CHUNK_CODEPOINTS) {
            self.sink.emit("delta", json!({"text": chunk}));
        }
        self.sink.emit(
            "final",
            serde_json::to_value(response).unwrap_or_else(|_| json!({})),
        );
    }
}

fn is_path_issue(response: &AgentResponse) -> bool {
    if response.needs_more_input() && response.missing == Some(MissingInput::Paths) {
        return true;
    }
    PATH_ISSUE.is_match(&response.answer)
}

fn no_documents_failure(mut response: AgentResponse) -> AgentResponse {
    response.answer = "요약할 수 있는 문서를 찾지 못했습니다. 처리할 경로를 지정해 다시 시도해주세요."
        .to_string();
    response.requires_input = Some(true);
    response.missing = Some(MissingInput::Paths);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::progress::{ChannelSink, NullSink};
    use crate::agents::testutil::ScriptedHost;
    use crate::llm::mock::MockLlm;
    use tokio::sync::mpsc;

    fn summary_host_tools() -> Value {
        json!([
            {
                "name": "list_docs",
                "description": "List documents",
                "inputSchema": {"properties": {"extensions": {"type": "array"}}, "required": []}
            },
            {
                "name": "rebuild_summary",
                "description": "Summarise documents",
                "inputSchema": {
                    "properties": {"paths": {"type": "array"}, "output_path": {"type": "string"}},
                    "required": ["paths", "output_path"]
                }
            }
        ])
    }

    fn runtime_with(
        llm_responses: Vec<&str>,
        host: Arc<ScriptedHost>,
        sink: Arc<dyn ProgressSink>,
    ) -> (Runtime, Arc<MockLlm>) {
        let llm = Arc::new(MockLlm::new(llm_responses));
        let runtime = Runtime::new(
            llm.clone(),
            ToolHostClient::new("http://localhost/mcp", host),
            sink,
            vec!["notes/".to_string()],
        );
        (runtime, llm)
    }

    #[tokio::test]
    async fn test_chat_only_scenario() {
        let host = Arc::new(ScriptedHost::new(vec![]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (runtime, llm) = runtime_with(
            vec![
                r#"{"route": "chat_only", "query": "1+1은 뭐야?", "explanation": "산수 질문"}"#,
                "2입니다.",
                "2입니다!",
                r#"{"pass": true, "score": 95, "feedback": ""}"#,
            ],
            host.clone(),
            Arc::new(ChannelSink::new(tx)),
        );

        let response = runtime.run("1+1은 뭐야?", &[]).await;
        runtime.stream_answer(&response);

        assert_eq!(response.action, "chat-only");
        assert_eq!(response.route, RouteKind::ChatOnly);
        assert_eq!(response.mcp_status, 200);
        assert!(response.tool.is_none());
        assert_eq!(host.request_count(), 0, "chat_only must not touch the host");
        assert_eq!(llm.call_count(), 4);

        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push(frame.event);
        }
        assert!(events.contains(&"route".to_string()));
        let final_pos = events.iter().position(|e| e == "final").unwrap();
        assert!(
            events.iter().skip(final_pos + 1).all(|e| e != "delta"),
            "no delta may follow final"
        );
    }

    #[tokio::test]
    async fn test_legacy_host_scenario() {
        let host = Arc::new(ScriptedHost::legacy("레거시 호스트의 답변입니다."));
        let (runtime, _) = runtime_with(
            vec![
                r#"{"route": "local_mcp", "query": "노트 정리해줘"}"#,
                "정리된 답변",
                r#"{"pass": true, "score": 90, "feedback": ""}"#,
            ],
            host.clone(),
            Arc::new(NullSink),
        );

        let response = runtime.run("노트 정리해줘", &[]).await;

        assert_eq!(
            host.request_count(),
            2,
            "legacy mode is exactly two upstream POSTs (initialize + plain chat)"
        );
        assert!(response.tool.is_none());
        assert!(response.arguments.is_none());
        assert!(response.agent_trace.unwrap().legacy_mode);
    }

    #[tokio::test]
    async fn test_no_tools_needs_execution_plan() {
        let host = Arc::new(ScriptedHost::new(vec![]).with_tools(json!([])));
        let (runtime, _) = runtime_with(
            vec![
                r#"{"route": "local_mcp", "query": "검색해줘"}"#,
                "답변",
                r#"{"pass": true, "score": 85, "feedback": ""}"#,
            ],
            host,
            Arc::new(NullSink),
        );

        let response = runtime.run("검색해줘", &[]).await;
        assert!(response.needs_more_input());
        assert_eq!(response.missing, Some(MissingInput::ExecutionPlan));
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn test_path_issue_retry_scenario() {
        let host = Arc::new(
            ScriptedHost::new(vec![
                (
                    "rebuild_summary",
                    json!({"error": {"code": -32000, "message": "invalid paths: notes/missing.md"}}),
                ),
                (
                    "list_docs",
                    json!({"structuredContent": {"paths": ["notes/a.md", "notes/b.md", "assets/img.png"]}}),
                ),
                (
                    "rebuild_summary",
                    json!({"structuredContent": {"summary": "요약했습니다", "output_path": "output.md"}}),
                ),
            ])
            .with_tools(summary_host_tools()),
        );
        let (runtime, _) = runtime_with(
            vec![
                r#"{"route": "local_mcp", "query": "오늘 노트 요약해줘"}"#,
                r#"{"tool": "rebuild_summary", "tool_arguments": {"paths": ["notes/missing.md"]}, "routed_query": "오늘 노트 요약해줘"}"#,
                "요약이 완료되었습니다.",
                r#"{"pass": true, "score": 88, "feedback": ""}"#,
            ],
            host.clone(),
            Arc::new(NullSink),
        );

        let response = runtime.run("오늘 노트 요약해줘", &[]).await;

        let trace = response.agent_trace.as_ref().unwrap();
        assert!(trace.retried, "path issue must set the retried flag");

        let calls = host.tool_calls();
        let summary_calls: Vec<&(String, Value)> = calls
            .iter()
            .filter(|(name, _)| name == "rebuild_summary")
            .collect();
        assert_eq!(summary_calls.len(), 2, "at most two summary-tool calls");
        assert_eq!(
            summary_calls[1].1["paths"],
            json!(["notes/a.md", "notes/b.md"]),
            "retry must only carry .md paths"
        );
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_blocked_github_pr_workflow_scenario() {
        let host = Arc::new(
            ScriptedHost::new(vec![(
                "sync_status",
                json!({"structuredContent": {"is_clean": false, "ready_for_pr": false, "ready_for_pull": false}}),
            )])
            .with_tools(json!([
                {"name": "sync_status", "description": "", "inputSchema": {"properties": {}, "required": []}},
                {"name": "pull_changes", "description": "", "inputSchema": {"properties": {}, "required": []}},
                {"name": "create_pr", "description": "", "inputSchema": {"properties": {}, "required": []}}
            ])),
        );
        let (runtime, llm) = runtime_with(
            vec![
                r#"{"route": "local_mcp", "query": "PR 생성해줘"}"#,
                "PR을 만들 수 없었습니다.",
                r#"{"pass": true, "score": 90, "feedback": ""}"#,
            ],
            host.clone(),
            Arc::new(NullSink),
        );

        let response = runtime.run("PR 생성해줘", &[]).await;

        assert!(response.needs_more_input());
        assert_eq!(response.missing, Some(MissingInput::WorkspaceState));
        let trace = response.agent_trace.unwrap();
        let workflow = trace.workflow.unwrap();
        assert!(!workflow.proceeded);
        assert!(workflow.steps.iter().all(|s| !s.executed));

        let calls: Vec<String> = host.tool_calls().into_iter().map(|(n, _)| n).collect();
        assert_eq!(calls, vec!["sync_status"], "only the initial sync call runs");
        // route + writer + evaluator: the workflow probe needs no extra LLM call
        assert_eq!(llm.call_count(), 3);
    }
}
