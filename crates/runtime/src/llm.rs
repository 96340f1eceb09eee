//! `LlmClient`: the streaming completion boundary the step loop (C6) drives
//! (§6.1). `corun` never implements a real provider — only this trait and a
//! scripted test/demo double.

use async_trait::async_trait;
use corun_domain::{BoxStream, FinishReason, LlmError, Message, StreamPart, ToolDefinition, Usage};

use crate::context::ExecutionContext;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        ctx: ExecutionContext,
    ) -> BoxStream<'static, Result<StreamPart, LlmError>>;
}

/// Replays a fixed sequence of `StreamPart`s, ignoring `messages`/`tools`.
/// One script entry is consumed per call, in order; calling past the end of
/// the script yields a single `Finish{Stop}` part.
pub struct ScriptedLlmClient {
    scripts: parking_lot::Mutex<std::collections::VecDeque<Vec<StreamPart>>>,
}

impl ScriptedLlmClient {
    pub fn new(scripts: Vec<Vec<StreamPart>>) -> Self {
        Self {
            scripts: parking_lot::Mutex::new(scripts.into()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn stream_completion(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _ctx: ExecutionContext,
    ) -> BoxStream<'static, Result<StreamPart, LlmError>> {
        let parts = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                vec![StreamPart::Finish {
                    finish_reason: FinishReason::Stop,
                    total_usage: Some(Usage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                    }),
                }]
            });
        Box::pin(futures_util::stream::iter(parts.into_iter().map(Ok)))
    }
}
