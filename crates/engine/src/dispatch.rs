//! Tool-call classification, enforcement and execution.
//!
//! Enforcement is post-inference: every tool is advertised to the backend,
//! and a call that violates the allowlist or the tool-choice policy is
//! answered with a synthetic error output that loops back to the model. It
//! is never forwarded to an executor and never silently dropped.

use std::{collections::HashMap, sync::Arc, time::Duration};

use context::RequestContext;
use protocol::{FunctionCallPayload, Item, ToolChoice, ToolChoiceMode, ToolDefinition, ToolKind, ToolPhase};
use tokio_util::sync::CancellationToken;
use tools::{ExecutorRegistry, ToolCall, ToolError, ToolExecutor, ToolOutcome};

/// One tool call the model emitted, tied back to its item.
pub(crate) struct EmittedCall {
    pub item_id: String,
    pub output_index: usize,
    pub payload: FunctionCallPayload,
}

/// A server-side call ready to execute.
pub(crate) struct PendingExecution {
    pub item_id: String,
    pub output_index: usize,
    pub tool_type: String,
    pub executor: Arc<dyn ToolExecutor>,
    pub call: ToolCall,
}

/// The dispatch decision for one turn's tool calls.
pub(crate) struct DispatchPlan {
    /// Synthetic error outputs for rejected calls, in call order.
    pub rejected: Vec<Item>,
    /// Executable server-side calls, in call order.
    pub pending: Vec<PendingExecution>,
    /// At least one client-executed function call: the loop pauses.
    pub delegate: bool,
}

pub(crate) fn plan_dispatch(
    calls: Vec<EmittedCall>,
    tools: &[ToolDefinition],
    allowed_tools: Option<&[String]>,
    tool_choice: Option<&ToolChoice>,
    executors: &ExecutorRegistry,
) -> DispatchPlan {
    let by_name: HashMap<&str, &ToolDefinition> =
        tools.iter().map(|tool| (tool.effective_name(), tool)).collect();

    let mut plan = DispatchPlan {
        rejected: Vec::new(),
        pending: Vec::new(),
        delegate: false,
    };

    for emitted in calls {
        let name = emitted.payload.name.as_str();

        if matches!(tool_choice, Some(ToolChoice::Mode(ToolChoiceMode::None))) {
            plan.rejected.push(rejection(
                &emitted.payload,
                "tool calls are disabled for this request (tool_choice is \"none\")",
            ));
            continue;
        }

        if let Some(ToolChoice::Function { name: forced, .. }) = tool_choice
            && name != forced
        {
            plan.rejected.push(rejection(
                &emitted.payload,
                &format!("only the tool `{forced}` may be called for this request"),
            ));
            continue;
        }

        let Some(definition) = by_name.get(name) else {
            plan.rejected
                .push(rejection(&emitted.payload, &format!("unknown tool `{name}`")));
            continue;
        };

        if let Some(allowed) = allowed_tools
            && !allowed.iter().any(|a| a == name)
        {
            plan.rejected.push(rejection(
                &emitted.payload,
                &format!("the tool `{name}` is not in the allowed tools list"),
            ));
            continue;
        }

        if definition.kind() == ToolKind::Function {
            plan.delegate = true;
            continue;
        }

        let Some(executor) = executors.for_definition(definition) else {
            plan.rejected.push(rejection(
                &emitted.payload,
                &format!("no executor is available for the tool `{name}`"),
            ));
            continue;
        };

        plan.pending.push(PendingExecution {
            item_id: emitted.item_id,
            output_index: emitted.output_index,
            tool_type: definition.tool_type.clone(),
            executor,
            call: ToolCall {
                call_id: emitted.payload.call_id.clone(),
                name: name.to_string(),
                arguments: emitted.payload.arguments.clone(),
                definition: (*definition).clone(),
            },
        });
    }

    plan
}

fn rejection(payload: &FunctionCallPayload, message: &str) -> Item {
    Item::function_call_output(&payload.call_id, format!("Error: {message}"))
}

/// The intermediate lifecycle phase a tool type surfaces while running.
pub(crate) fn activity_phase(tool_type: &str) -> Option<ToolPhase> {
    match tool_type {
        "web_search" | "file_search" => Some(ToolPhase::Searching),
        "code_interpreter" => Some(ToolPhase::Interpreting),
        _ => None,
    }
}

/// Execute the pending calls, concurrently when allowed, and return each
/// call's result text in call order. Errors never propagate: they become
/// error strings for the model to react to.
pub(crate) async fn execute_calls(
    pending: &[PendingExecution],
    ctx: &RequestContext,
    parallel: bool,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Vec<Result<String, String>> {
    if parallel {
        // One task per call; join_all keeps result order aligned with call
        // order regardless of completion order.
        let futures: Vec<_> = pending
            .iter()
            .map(|execution| execute_one(execution, ctx, timeout, cancel))
            .collect();

        futures::future::join_all(futures).await
    } else {
        let mut results = Vec::with_capacity(pending.len());

        for execution in pending {
            results.push(execute_one(execution, ctx, timeout, cancel).await);
        }

        results
    }
}

async fn execute_one(
    execution: &PendingExecution,
    ctx: &RequestContext,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, String> {
    let call = tokio::time::timeout(timeout, execution.executor.execute(ctx, &execution.call));

    let outcome = tokio::select! {
        _ = cancel.cancelled() => return Err("tool execution cancelled".to_string()),
        result = call => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout),
        },
    };

    match outcome {
        Ok(ToolOutcome::Output(output)) => Ok(output),
        // The planner never schedules delegate calls for execution.
        Ok(ToolOutcome::Delegate) => Err("tool must be executed by the client".to_string()),
        Err(err) => {
            log::debug!("tool {} failed for request {}: {err}", execution.call.name, ctx.request_id);
            Err(format!("Error: {err}"))
        }
    }
}
