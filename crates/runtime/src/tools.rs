//! `ToolExecutor`: the boundary a tool call is dispatched through (§6.2).

use async_trait::async_trait;
use corun_domain::{RunId, ToolCall};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// Outcome of one tool execution, fed into the interleaver (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolOutcome {
    Success {
        output: String,
    },
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
    /// The tool itself spawned a sub-agent run that suspended on approval
    /// (§4.7). The interleaver folds this into its own `Suspended` result.
    Suspended {
        child_run_id: RunId,
        manifest_id: String,
        suspensions: Vec<corun_domain::Suspension>,
        child_stacks: Vec<corun_domain::SuspensionStack>,
    },
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext, tool_call: &ToolCall) -> ToolOutcome;

    /// Whether this executor recognizes `tool_name` at all. The interleaver
    /// consults this before calling `execute` so that unknown tools get the
    /// standard synthetic error instead of a per-implementation guess.
    fn knows(&self, tool_name: &str) -> bool;
}

/// Fixed-script executor for tests and the CLI demo: every call to a known
/// tool name returns the same canned outcome.
#[derive(Debug, Default)]
pub struct ScriptedToolExecutor {
    scripts: std::collections::HashMap<String, ToolOutcome>,
}

impl ScriptedToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, tool_name: impl Into<String>, outcome: ToolOutcome) -> Self {
        self.scripts.insert(tool_name.into(), outcome);
        self
    }
}

#[async_trait]
impl ToolExecutor for ScriptedToolExecutor {
    async fn execute(&self, _ctx: &ExecutionContext, tool_call: &ToolCall) -> ToolOutcome {
        self.scripts
            .get(&tool_call.tool_name)
            .cloned()
            .unwrap_or_else(|| ToolOutcome::Error {
                code: "no_script".into(),
                message: format!("no scripted response for '{}'", tool_call.tool_name),
                retryable: false,
            })
    }

    fn knows(&self, tool_name: &str) -> bool {
        self.scripts.contains_key(tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_executor_returns_configured_outcome() {
        let exec = ScriptedToolExecutor::new().with_response(
            "exec",
            ToolOutcome::Success {
                output: "ok".into(),
            },
        );
        let ctx = ExecutionContext::new("root");
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "exec".into(),
            arguments: serde_json::json!({}),
        };
        match exec.execute(&ctx, &call).await {
            ToolOutcome::Success { output } => assert_eq!(output, "ok"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unscripted_tool_returns_error_outcome() {
        let exec = ScriptedToolExecutor::new();
        let ctx = ExecutionContext::new("root");
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "mystery".into(),
            arguments: serde_json::json!({}),
        };
        match exec.execute(&ctx, &call).await {
            ToolOutcome::Error { code, .. } => assert_eq!(code, "no_script"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!exec.knows("mystery"));
    }
}
