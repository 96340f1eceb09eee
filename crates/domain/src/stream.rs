//! The wire shape of the external LLM streaming client (§6 of the spec).
//!
//! `corun` never implements a streaming client itself — it consumes one
//! through [`crate::tool::ToolCall`] and the [`StreamPart`] protocol below.
//! A provider adapter translates whatever wire format the backend speaks
//! into this stream.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::tool::ToolCall;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One part of a streaming LLM completion.
///
/// The step loop (C6) consumes these in order within a step; a step ends
/// at `FinishStep`, the whole completion ends at `Finish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamPart {
    #[serde(rename = "start")]
    Start,

    #[serde(rename = "start-step")]
    StartStep,

    #[serde(rename = "text-start")]
    TextStart { id: String },

    #[serde(rename = "text-delta")]
    TextDelta { id: String, text: String },

    #[serde(rename = "text-end")]
    TextEnd { id: String },

    #[serde(rename = "tool-call")]
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// An approval is required before the named tool call may run. The
    /// step loop suspends (→ C7) rather than dispatching it to C5.
    #[serde(rename = "tool-approval-request")]
    ToolApprovalRequest {
        approval_id: String,
        tool_call: ToolCall,
    },

    #[serde(rename = "finish-step")]
    FinishStep {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<serde_json::Value>,
        usage: Option<Usage>,
        finish_reason: FinishReason,
    },

    #[serde(rename = "finish")]
    Finish {
        finish_reason: FinishReason,
        total_usage: Option<Usage>,
    },
}

/// Why a completion (or completion step) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Error,
}

/// Token usage for a completion or completion step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Error surfaced by the streaming client. Distinct from [`crate::error::CoreError`]
/// because it crosses the external-collaborator boundary (§1, §6) — the step
/// loop wraps it into a terminal `failed` result rather than propagating it.
#[derive(Debug, thiserror::Error, Clone)]
#[error("llm stream error: {0}")]
pub struct LlmError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_serde_roundtrip() {
        for fr in [
            FinishReason::Stop,
            FinishReason::ToolCalls,
            FinishReason::Length,
            FinishReason::ContentFilter,
            FinishReason::Error,
        ] {
            let json = serde_json::to_string(&fr).unwrap();
            let back: FinishReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, fr);
        }
    }

    #[test]
    fn tool_calls_serializes_kebab_case() {
        let json = serde_json::to_string(&FinishReason::ToolCalls).unwrap();
        assert_eq!(json, "\"tool-calls\"");
    }

    #[test]
    fn stream_part_tool_approval_request_roundtrip() {
        let part = StreamPart::ToolApprovalRequest {
            approval_id: "a1".into(),
            tool_call: ToolCall {
                call_id: "c1".into(),
                tool_name: "exec".into(),
                arguments: serde_json::json!({"command": "ls"}),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool-approval-request");
        assert_eq!(json["approval_id"], "a1");
    }
}
