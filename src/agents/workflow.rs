//! Workflow runner: sequential tool steps gated on accumulated sync state.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::agents::executor::{execute, ExecutorContext};
use crate::agents::progress::mcp_progress;
use crate::agents::types::{
    AgentResponse, AgentTrace, ExecutionPlan, MissingInput, StepTrace, WhenClause, WorkflowSpec,
    WorkflowTrace,
};

/// Pull the flat sync payload out of a tool result. Scalars and arrays only;
/// nested objects stay out so `sync_field_equals` compares simple values.
pub fn extract_sync_payload(result: &Value) -> Map<String, Value> {
    let source = result.get("structuredContent").unwrap_or(result);
    let mut payload = Map::new();
    if let Some(obj) = source.as_object() {
        for (key, value) in obj {
            if !value.is_object() {
                payload.insert(key.clone(), value.clone());
            }
        }
    }
    payload
}

fn when_holds(
    when: &WhenClause,
    payload: &Map<String, Value>,
    executed: &HashSet<String>,
) -> Result<(), String> {
    match when {
        WhenClause::SyncFieldEquals { field, equals } => {
            let actual = payload.get(field).cloned().unwrap_or(Value::Null);
            if &actual == equals {
                Ok(())
            } else {
                Err(format!("{} = {} (expected {})", field, actual, equals))
            }
        }
        WhenClause::StepExecuted { step_id } => {
            if executed.contains(step_id) {
                Ok(())
            } else {
                Err(format!("step '{}' did not execute", step_id))
            }
        }
    }
}

/// Execute the workflow steps in declaration order after the initial call.
///
/// A failed gate records the skip reason and moves on; skipped steps never
/// satisfy later `step_executed` predicates. After each successful step the
/// sync payload is refreshed from any sync-status output.
pub async fn run_workflow(
    ctx: &ExecutorContext<'_>,
    spec: &WorkflowSpec,
    initial: AgentResponse,
    trace: &mut AgentTrace,
) -> AgentResponse {
    let routed_query = initial.routed_query.clone().unwrap_or_default();
    let mut payload = initial
        .result
        .as_ref()
        .map(extract_sync_payload)
        .unwrap_or_default();
    let mut executed: HashSet<String> = HashSet::new();
    let mut steps: Vec<StepTrace> = Vec::new();
    let mut last = initial;

    for step in &spec.steps {
        if let Some(when) = &step.when {
            if let Err(reason) = when_holds(when, &payload, &executed) {
                log::info!("[WORKFLOW] skipping step '{}': {}", step.id, reason);
                mcp_progress(
                    ctx.sink,
                    "workflow_step",
                    serde_json::json!({"step": step.id, "skipped": true, "reason": reason}),
                );
                steps.push(StepTrace {
                    id: step.id.clone(),
                    tool: step.tool.clone(),
                    executed: false,
                    skip_reason: Some(reason),
                    status: None,
                });
                continue;
            }
        }

        mcp_progress(
            ctx.sink,
            "workflow_step",
            serde_json::json!({"step": step.id, "tool": step.tool}),
        );
        let plan = ExecutionPlan::for_tool(&step.tool, step.tool_arguments.clone(), &routed_query);
        let response = execute(ctx, &plan, trace).await;
        let succeeded = response.is_success();
        steps.push(StepTrace {
            id: step.id.clone(),
            tool: step.tool.clone(),
            executed: succeeded,
            skip_reason: None,
            status: Some(response.mcp_status),
        });

        if succeeded {
            executed.insert(step.id.clone());
            if step.tool.contains("sync") {
                if let Some(result) = &response.result {
                    payload = extract_sync_payload(result);
                }
            }
            last = response;
        } else {
            log::warn!(
                "[WORKFLOW] step '{}' failed with status {}",
                step.id,
                response.mcp_status
            );
            last = response;
        }
    }

    let mut proceeded = true;
    if spec.workflow_type == "github_pr" {
        let pr_created = executed.iter().any(|id| id.contains("create_pr"));
        if !pr_created {
            proceeded = false;
            let reason = workspace_state_reason(&payload);
            last.answer = format!("{}\n\n{}", reason, last.answer);
            last.requires_input = Some(true);
            last.missing = Some(MissingInput::WorkspaceState);
        }
    }

    trace.workflow = Some(WorkflowTrace {
        workflow_type: spec.workflow_type.clone(),
        proceeded,
        steps,
    });
    last
}

/// Human-readable reason why the PR step did not run, from the sync payload.
fn workspace_state_reason(payload: &Map<String, Value>) -> String {
    let flag = |key: &str| payload.get(key).and_then(Value::as_bool);
    match (flag("is_clean"), flag("ready_for_pr")) {
        (Some(false), _) => {
            "작업 공간에 커밋되지 않은 변경사항이 있어 PR을 생성하지 못했습니다.".to_string()
        }
        (_, Some(false)) => {
            "현재 브랜치가 PR을 생성할 수 있는 상태가 아닙니다.".to_string()
        }
        _ => "작업 공간 상태를 확인하지 못해 PR을 생성하지 않았습니다.".to_string(),
    }
}
