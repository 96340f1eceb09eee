//! C9: Observer Chain — ordered lifecycle hooks invoked around a run's
//! start, resume, suspend, complete, cancel, error, and sub-agent
//! boundaries (§4.9).

use std::collections::HashMap;

use async_trait::async_trait;
use corun_domain::{CoreError, RunId, RunRecord};

/// One lifecycle event an observer may react to.
#[derive(Debug, Clone)]
pub enum Event<'a> {
    AgentStart { record: &'a RunRecord },
    AgentResume { record: &'a RunRecord },
    AgentSuspend { record: &'a RunRecord },
    AgentComplete { record: &'a RunRecord },
    AgentError { record: &'a RunRecord, error: &'a CoreError },
    AgentCancelled { record: &'a RunRecord },
    SubAgentStart { parent: RunId, child: RunId },
    SubAgentComplete { parent: RunId, child: RunId },
    SubAgentError { parent: RunId, child: RunId, error: &'a CoreError },
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_event(&self, event: &Event<'_>) -> Result<(), CoreError>;
}

/// Ordered observers, optionally with extra per-manifest observers layered
/// on after the globally-registered ones (§4.9, §9 design notes:
/// `HashMap<ManifestId, Vec<ObserverEntry>>`).
#[derive(Default)]
pub struct ObserverChain {
    global: Vec<std::sync::Arc<dyn Observer>>,
    per_manifest: HashMap<String, Vec<std::sync::Arc<dyn Observer>>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: std::sync::Arc<dyn Observer>) {
        self.global.push(observer);
    }

    pub fn register_for_manifest(
        &mut self,
        manifest_id: impl Into<String>,
        observer: std::sync::Arc<dyn Observer>,
    ) {
        self.per_manifest
            .entry(manifest_id.into())
            .or_default()
            .push(observer);
    }

    /// Run every applicable observer in order. A hook error aborts the
    /// chain and propagates — except for `AgentCancelled`, whose errors are
    /// swallowed (§4.9).
    pub async fn dispatch(&self, manifest_id: &str, event: Event<'_>) -> Result<(), CoreError> {
        let swallow_errors = matches!(event, Event::AgentCancelled { .. });

        for observer in self.global.iter().chain(
            self.per_manifest
                .get(manifest_id)
                .into_iter()
                .flatten(),
        ) {
            if let Err(e) = observer.on_event(&event).await {
                if swallow_errors {
                    tracing::warn!(error = %e, "on_agent_cancelled observer failed, swallowing");
                    continue;
                }
                return Err(e);
            }
        }
        Ok(())
    }
}
