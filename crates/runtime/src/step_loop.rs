//! C6: Step Loop — one LLM round-trip plus tool dispatch cycle (§4.6).
//!
//! A step never mutates the run record directly; it emits observable
//! [`StepEvent`]s over a channel and returns a [`StepOutcome`] the caller
//! (the orchestrator) persists.

use std::sync::Arc;

use corun_domain::{
    ContentPart, FinishReason, Message, MessageContent, RunError, Role, StreamPart, ToolCall,
    ToolDefinition,
};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::context::ExecutionContext;
use crate::interleaver::{self, InterleaveResult, SuspendedBranch};
use crate::llm::LlmClient;
use crate::tools::ToolExecutor;

/// Observable event surfaced during one step, mirroring the subset of
/// [`StreamPart`] the caller is meant to react to plus step-level framing.
#[derive(Debug, Clone)]
pub enum StepEvent {
    TextDelta { text: String },
    ToolCallRequested { call: ToolCall },
    ApprovalRequested { approval_id: String, call: ToolCall },
    StepFinished,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// One or more tool calls ran and produced results (none suspended);
    /// the orchestrator should append these messages and loop again.
    ToolsRan {
        assistant_message: Message,
        tool_message: Message,
    },
    /// Finish reason `stop`, no pending tool calls.
    Completed { assistant_message: Message },
    /// One or more tool calls require approval, or a sub-agent suspended.
    Suspended {
        assistant_message: Message,
        suspensions: Vec<corun_domain::Suspension>,
        suspension_stacks: Vec<corun_domain::SuspensionStack>,
    },
    Cancelled,
    Failed(RunError),
}

fn tool_result_message(parts: Vec<interleaver::ToolResultPart>) -> Message {
    Message {
        role: Role::Tool,
        content: MessageContent::Parts(
            parts
                .into_iter()
                .map(|p| ContentPart::ToolResult {
                    tool_use_id: p.call_id,
                    content: p.content,
                    is_error: p.is_error,
                })
                .collect(),
        ),
    }
}

fn branches_to_suspensions(
    branches: &[SuspendedBranch],
) -> (Vec<corun_domain::Suspension>, Vec<corun_domain::SuspensionStack>) {
    let mut suspensions = Vec::new();
    let mut stacks = Vec::new();
    for branch in branches {
        for s in &branch.suspensions {
            suspensions.push(s.clone());
        }
        for stack in &branch.child_stacks {
            stacks.push(stack.clone());
        }
    }
    (suspensions, stacks)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_step(
    ctx: &ExecutionContext,
    llm: Arc<dyn LlmClient>,
    tool_executor: Arc<dyn ToolExecutor>,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    events: mpsc::UnboundedSender<StepEvent>,
) -> StepOutcome {
    let mut stream = llm
        .stream_completion(messages, tools, ctx.derive("llm-stream"))
        .await;

    let mut text = String::new();
    let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
    let mut pending_approvals: Vec<(String, ToolCall)> = Vec::new();
    let mut finish_reason = FinishReason::Stop;

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return StepOutcome::Cancelled;
            }
            next = stream.next() => {
                match next {
                    None => break,
                    Some(Err(e)) => {
                        return StepOutcome::Failed(RunError {
                            code: "llm_error".into(),
                            message: e.0,
                            metadata: None,
                        });
                    }
                    Some(Ok(part)) => match part {
                        StreamPart::Start | StreamPart::StartStep | StreamPart::TextStart { .. } | StreamPart::TextEnd { .. } => {}
                        StreamPart::TextDelta { text: delta, .. } => {
                            text.push_str(&delta);
                            let _ = events.send(StepEvent::TextDelta { text: delta });
                        }
                        StreamPart::ToolCall { id, name, input } => {
                            let call = ToolCall { call_id: id, tool_name: name, arguments: input };
                            let _ = events.send(StepEvent::ToolCallRequested { call: call.clone() });
                            pending_tool_calls.push(call);
                        }
                        StreamPart::ToolApprovalRequest { approval_id, tool_call } => {
                            let _ = events.send(StepEvent::ApprovalRequested {
                                approval_id: approval_id.clone(),
                                call: tool_call.clone(),
                            });
                            pending_approvals.push((approval_id, tool_call));
                        }
                        StreamPart::FinishStep { finish_reason: fr, .. } => {
                            finish_reason = fr;
                        }
                        StreamPart::Finish { finish_reason: fr, .. } => {
                            finish_reason = fr;
                            let _ = events.send(StepEvent::StepFinished);
                            break;
                        }
                    },
                }
            }
        }
    }

    if finish_reason == FinishReason::Error {
        return StepOutcome::Failed(RunError {
            code: "llm_error".into(),
            message: "completion finished with error".into(),
            metadata: None,
        });
    }

    let assistant_message = Message {
        role: Role::Assistant,
        content: MessageContent::Text(text),
    };

    if !pending_approvals.is_empty() {
        let suspensions = pending_approvals
            .into_iter()
            .map(|(approval_id, call)| corun_domain::Suspension {
                approval_id,
                tool_call_id: call.call_id,
                tool_name: call.tool_name,
                input: call.arguments,
            })
            .collect();
        return StepOutcome::Suspended {
            assistant_message,
            suspensions,
            suspension_stacks: vec![],
        };
    }

    if pending_tool_calls.is_empty() {
        return StepOutcome::Completed { assistant_message };
    }

    match interleaver::interleave(ctx, tool_executor, pending_tool_calls).await {
        InterleaveResult::Completed { tool_result_parts } => StepOutcome::ToolsRan {
            assistant_message,
            tool_message: tool_result_message(tool_result_parts),
        },
        InterleaveResult::Suspended {
            branches,
            completed_tool_result_parts: _,
        } => {
            let (suspensions, suspension_stacks) = branches_to_suspensions(&branches);
            StepOutcome::Suspended {
                assistant_message,
                suspensions,
                suspension_stacks,
            }
        }
    }
}
