//! C5: Tool Interleaver — runs every tool call from one step concurrently,
//! racing each against the context's abort signal, and assembles results
//! back in call order (§4.5).

use std::sync::Arc;

use corun_domain::ToolCall;
use tracing::{info_span, Instrument};

use crate::context::ExecutionContext;
use crate::tools::{ToolExecutor, ToolOutcome};

/// One tool call's resolved outcome, always tagged with its originating
/// `call_id` so the step loop can fold it back into the right message.
#[derive(Debug, Clone)]
pub struct ToolResultPart {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// A tool whose execution produced a sub-agent suspension (§4.7).
#[derive(Debug, Clone)]
pub struct SuspendedBranch {
    pub call_id: String,
    pub child_run_id: corun_domain::RunId,
    pub manifest_id: String,
    pub suspensions: Vec<corun_domain::Suspension>,
    pub child_stacks: Vec<corun_domain::SuspensionStack>,
}

/// Overall result of interleaving one step's tool calls (§4.5: "If *any*
/// tool returned `Suspended`, the interleaver's overall result is
/// `Suspended`; otherwise `Completed`").
#[derive(Debug, Clone)]
pub enum InterleaveResult {
    Completed {
        tool_result_parts: Vec<ToolResultPart>,
    },
    Suspended {
        branches: Vec<SuspendedBranch>,
        completed_tool_result_parts: Vec<ToolResultPart>,
    },
}

async fn run_one(
    executor: Arc<dyn ToolExecutor>,
    ctx: ExecutionContext,
    call: ToolCall,
) -> (String, ResolvedOne) {
    let call_id = call.call_id.clone();
    if !executor.knows(&call.tool_name) {
        return (
            call_id,
            ResolvedOne::Result(ToolResultPart {
                call_id: call.call_id.clone(),
                content: format!("Unknown tool: '{}'", call.tool_name),
                is_error: true,
            }),
        );
    }

    let outcome_fut = executor.execute(&ctx, &call);
    tokio::select! {
        biased;
        _ = ctx.cancelled() => {
            (
                call.call_id.clone(),
                ResolvedOne::Result(ToolResultPart {
                    call_id: call.call_id,
                    content: "{\"error\":true,\"code\":\"Cancelled\"}".into(),
                    is_error: true,
                }),
            )
        }
        outcome = outcome_fut => {
            let resolved = match outcome {
                ToolOutcome::Success { output } => ResolvedOne::Result(ToolResultPart {
                    call_id: call.call_id.clone(),
                    content: output,
                    is_error: false,
                }),
                ToolOutcome::Error { code, message, .. } => ResolvedOne::Result(ToolResultPart {
                    call_id: call.call_id.clone(),
                    content: format!("{{\"error\":true,\"code\":\"{code}\",\"message\":{message:?}}}"),
                    is_error: true,
                }),
                ToolOutcome::Suspended { child_run_id, manifest_id, suspensions, child_stacks } => {
                    ResolvedOne::Suspended(SuspendedBranch {
                        call_id: call.call_id.clone(),
                        child_run_id,
                        manifest_id,
                        suspensions,
                        child_stacks,
                    })
                }
            };
            (call.call_id, resolved)
        }
    }
}

enum ResolvedOne {
    Result(ToolResultPart),
    Suspended(SuspendedBranch),
}

/// Run every `tool_calls` concurrently under `ctx`, in original order.
pub async fn interleave(
    ctx: &ExecutionContext,
    executor: Arc<dyn ToolExecutor>,
    tool_calls: Vec<ToolCall>,
) -> InterleaveResult {
    let futures = tool_calls.into_iter().map(|call| {
        let executor = executor.clone();
        let child_ctx = ctx.derive(format!("tool:{}", call.call_id));
        let call_id = call.call_id.clone();
        run_one(executor, child_ctx, call).instrument(info_span!("tool_call", call_id = %call_id))
    });

    let resolved = futures_util::future::join_all(futures).await;

    let mut branches = Vec::new();
    let mut parts = Vec::new();
    for (_call_id, resolved_one) in resolved {
        match resolved_one {
            ResolvedOne::Result(part) => parts.push(part),
            ResolvedOne::Suspended(branch) => branches.push(branch),
        }
    }

    if branches.is_empty() {
        InterleaveResult::Completed {
            tool_result_parts: parts,
        }
    } else {
        InterleaveResult::Suspended {
            branches,
            completed_tool_result_parts: parts,
        }
    }
}
