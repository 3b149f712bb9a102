//! Shared agent model: the A2A envelope, execution plans, workflow specs,
//! and the agent response every stage hands forward.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const A2A_PROTOCOL_VERSION: &str = "a2a.v1";
pub const WORKFLOW_SCHEMA: &str = "workflow.steps.v1";

/// The envelope carried between orchestrator and agents, forwarded onto the
/// SSE channel for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    pub protocol_version: &'static str,
    pub request_id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
    pub payload: Value,
}

impl A2aMessage {
    pub fn new(
        request_id: &str,
        from: &str,
        to: &str,
        message_type: &str,
        payload: Value,
    ) -> Self {
        A2aMessage {
            protocol_version: A2A_PROTOCOL_VERSION,
            request_id: request_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            message_type: message_type.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }
}

/// One prior turn from the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub text: String,
}

/// The planner's routing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    LocalMcp,
    ChatOnly,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::LocalMcp => "local_mcp",
            RouteKind::ChatOnly => "chat_only",
        }
    }
}

/// Sentinels for `missing` when the agent needs more input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInput {
    Paths,
    ExecutionPlan,
    WorkspaceState,
}

/// Evaluator verdict attached to every polished response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
    pub pass: bool,
    pub score: u8,
    pub feedback: String,
}

impl QualityCheck {
    /// Defensive default when the evaluator output cannot be parsed.
    pub fn lenient() -> Self {
        QualityCheck {
            pass: true,
            score: 80,
            feedback: String::new(),
        }
    }
}

/// Secondary call the planner suggests for harvesting paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySpec {
    pub tool: String,
    #[serde(default)]
    pub tool_arguments: Value,
    #[serde(default)]
    pub expected_paths: Vec<String>,
}

/// Gating condition on a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhenClause {
    SyncFieldEquals { field: String, equals: Value },
    StepExecuted {
        #[serde(rename = "stepId")]
        step_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub tool_arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,
}

/// Declarative sequential workflow (`workflow.steps.v1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub schema: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub mode: String,
    pub steps: Vec<WorkflowStep>,
}

/// What the planner decided to execute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub tool: Option<String>,
    pub tool_arguments: Value,
    pub routed_query: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoverySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowSpec>,
}

impl ExecutionPlan {
    pub fn for_tool(tool: &str, arguments: Value, routed_query: &str) -> Self {
        ExecutionPlan {
            tool: Some(tool.to_string()),
            tool_arguments: arguments,
            routed_query: routed_query.to_string(),
            explanation: String::new(),
            discovery: None,
            workflow: None,
        }
    }
}

/// Per-step outcome recorded on the workflow trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTrace {
    pub id: String,
    pub tool: String,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrace {
    pub workflow_type: String,
    pub proceeded: bool,
    pub steps: Vec<StepTrace>,
}

/// Trace of the plan/execute pipeline, attached to the response for the
/// debug view and the observability frames.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTrace {
    pub route: Option<String>,
    pub legacy_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_tool: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub discovered_paths: Vec<String>,
    pub search_retried: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowTrace>,
    pub retried: bool,
}

/// The uniform response every stage of the pipeline produces and refines.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub action: String,
    pub answer: String,
    pub route: RouteKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingInput>,
    pub mcp_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_check: Option<QualityCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_trace: Option<AgentTrace>,
}

impl AgentResponse {
    pub fn chat_only(answer: String) -> Self {
        AgentResponse {
            action: "chat-only".to_string(),
            answer,
            route: RouteKind::ChatOnly,
            routed_query: None,
            explanation: None,
            tool: None,
            arguments: None,
            result: None,
            requires_input: None,
            missing: None,
            mcp_status: 200,
            quality_check: None,
            agent_trace: None,
        }
    }

    pub fn execution(routed_query: &str) -> Self {
        AgentResponse {
            action: "execute-tool".to_string(),
            answer: String::new(),
            route: RouteKind::LocalMcp,
            routed_query: Some(routed_query.to_string()),
            explanation: None,
            tool: None,
            arguments: None,
            result: None,
            requires_input: None,
            missing: None,
            mcp_status: 200,
            quality_check: None,
            agent_trace: None,
        }
    }

    /// Synthesized failure that still succeeds at the HTTP layer.
    pub fn failure(routed_query: &str, status: u16, answer: String) -> Self {
        let mut response = Self::execution(routed_query);
        response.mcp_status = status;
        response.answer = answer;
        response
    }

    /// The agent needs something only the user can supply.
    pub fn needs_input(routed_query: &str, missing: MissingInput, answer: String) -> Self {
        let mut response = Self::execution(routed_query);
        response.requires_input = Some(true);
        response.missing = Some(missing);
        response.answer = answer;
        response
    }

    pub fn is_success(&self) -> bool {
        self.mcp_status < 400
    }

    pub fn needs_more_input(&self) -> bool {
        self.requires_input == Some(true)
    }
}
