//! Top-level entry points: `orchestrate_run`, `cancel_run`,
//! `signal_cancellation` (§6), tying together C4, C6, C7, C8, C9.

use std::sync::Arc;
use std::time::Duration;

use corun_domain::{
    AgentManifest, CoreError, Message, Result, RunError, RunId, RunRecord, RunStatus,
};
use tokio::sync::mpsc;
use tracing::{info, info_span, Instrument};

use crate::cancel_action::{self, CancelDeps, CancelOutcome};
use crate::cancel_signal::{CancellationSignal, CancellationSignalStore};
use crate::config::{CancelOptions, RunOptions};
use crate::context::ExecutionContext;
use crate::llm::LlmClient;
use crate::observers::{Event, ObserverChain};
use crate::poller;
use crate::run_lock::RunLock;
use crate::state_store::StateStore;
use crate::step_loop::{self, StepEvent, StepOutcome};
use crate::tools::ToolExecutor;

/// Everything an orchestrator call needs, bundled so call sites don't
/// thread six `Arc`s individually.
pub struct Deps {
    pub state_store: Arc<dyn StateStore>,
    pub signal_store: Arc<dyn CancellationSignalStore>,
    pub lock: Arc<dyn RunLock>,
    pub clock: Arc<dyn corun_domain::Clock>,
    pub llm: Arc<dyn LlmClient>,
    pub tool_executor: Arc<dyn ToolExecutor>,
    pub observers: Arc<ObserverChain>,
}

impl Deps {
    fn cancel_deps(&self) -> CancelDeps {
        CancelDeps {
            state_store: self.state_store.clone(),
            signal_store: self.signal_store.clone(),
            lock: self.lock.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// `OrchestrateInput` variants (§6).
pub enum OrchestrateInput {
    Request { prompt: String, manifest: AgentManifest },
    Reply { run_id: RunId, message: String, manifest: AgentManifest },
    Approval { run_id: RunId, approval_id: String, approved: bool, reason: Option<String> },
    Continue { run_id: RunId, manifest: AgentManifest },
}

pub struct OrchestrateHandle {
    pub run_id: RunId,
    pub events: mpsc::UnboundedReceiver<StepEvent>,
    pub result: tokio::task::JoinHandle<Result<RunRecord>>,
}

/// Entry point for a fresh request, a reply to a completed run, an
/// approval/denial resuming a suspended run, or a bare continue (§6).
pub async fn orchestrate_run(
    input: OrchestrateInput,
    options: RunOptions,
    deps: Arc<Deps>,
) -> Result<OrchestrateHandle> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let (run_id, manifest, record) = match input {
        OrchestrateInput::Request { prompt, manifest } => {
            let now = deps.clock.now();
            let mut record = RunRecord::new(manifest.id.clone(), manifest.version.clone(), manifest.id.clone(), now, None);
            record.messages.push(Message::system(manifest.system_prompt.clone()));
            record.messages.push(Message::user(prompt));
            let run_id = record.id;
            deps.state_store
                .set(run_id, record.clone(), Some(options.agent_state_ttl_secs))
                .await?;
            (run_id, manifest, record)
        }
        OrchestrateInput::Reply { run_id, message, manifest } => {
            let mut record = deps
                .state_store
                .get(run_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
            if record.status != RunStatus::Completed {
                return Err(CoreError::BadRequest(
                    "reply is only valid against a completed run".into(),
                ));
            }
            record.messages.push(Message::user(message));
            record.begin_running_segment(deps.clock.now());
            (run_id, manifest, record)
        }
        OrchestrateInput::Approval { run_id, approval_id, approved, reason } => {
            let handle = resume_approval(run_id, &approval_id, approved, reason, options, deps, events_tx).await?;
            return Ok(OrchestrateHandle { run_id, events: events_rx, result: handle });
        }
        OrchestrateInput::Continue { run_id, manifest } => {
            let record = deps
                .state_store
                .get(run_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
            match record.status {
                RunStatus::Running => return Err(CoreError::AlreadyRunning),
                RunStatus::Cancelled | RunStatus::Failed => {
                    return Err(CoreError::BadRequest("cannot continue a terminal run".into()))
                }
                _ => {}
            }
            (run_id, manifest, record)
        }
    };

    deps.observers
        .dispatch(&manifest.id, Event::AgentStart { record: &record })
        .await?;

    let handle = spawn_drive_loop(run_id, manifest, record, options, deps, events_tx);
    Ok(OrchestrateHandle { run_id, events: events_rx, result: handle })
}

/// §4.7 resume: locate the suspension, fold the approval result into
/// `pending_tool_results`, and re-enter the step loop.
async fn resume_approval(
    run_id: RunId,
    approval_id: &str,
    approved: bool,
    reason: Option<String>,
    options: RunOptions,
    deps: Arc<Deps>,
    events_tx: mpsc::UnboundedSender<StepEvent>,
) -> Result<tokio::task::JoinHandle<Result<RunRecord>>> {
    let mut record = deps
        .state_store
        .get(run_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;

    match record.status {
        RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => {
            return Err(CoreError::BadRequest("cannot resume a terminal run".into()));
        }
        RunStatus::Running => {
            if deps.lock.is_locked(run_id).await? {
                return Err(CoreError::AlreadyRunning);
            }
        }
        RunStatus::Suspended => {}
    }

    let idx = record
        .suspensions
        .iter()
        .position(|s| s.approval_id == approval_id)
        .ok_or_else(|| CoreError::NotFound(format!("approval {approval_id} on run {run_id}")))?;
    let suspension = record.suspensions.remove(idx);

    record.pending_tool_results.push(corun_domain::PendingToolResult {
        tool_call_id: suspension.tool_call_id.clone(),
        content: if approved {
            "approved".into()
        } else {
            format!("denied{}", reason.map(|r| format!(": {r}")).unwrap_or_default())
        },
        is_error: !approved,
    });

    if record.suspensions.is_empty() && record.suspension_stacks.is_empty() {
        record.begin_running_segment(deps.clock.now());
    }

    let manifest_id = record.manifest_id.clone();
    let manifest = AgentManifest {
        id: manifest_id,
        version: record.manifest_version.clone(),
        system_prompt: String::new(),
        tool_policy: Default::default(),
        limits: Default::default(),
        allowed_sub_agents: vec![],
    };

    deps.observers
        .dispatch(&manifest.id, Event::AgentResume { record: &record })
        .await?;

    Ok(spawn_drive_loop(run_id, manifest, record, options, deps, events_tx))
}

fn spawn_drive_loop(
    run_id: RunId,
    manifest: AgentManifest,
    mut record: RunRecord,
    options: RunOptions,
    deps: Arc<Deps>,
    events_tx: mpsc::UnboundedSender<StepEvent>,
) -> tokio::task::JoinHandle<Result<RunRecord>> {
    tokio::spawn(
        async move {
            let ctx = ExecutionContext::new(run_id.to_string());
            let poll_interval = Duration::from_millis(options.cancellation_poll_interval_ms);
            let _poller = poller::spawn(run_id, ctx.clone(), deps.signal_store.clone(), poll_interval);

            loop {
                if ctx.is_aborted() {
                    record.mark_cancelled(deps.clock.now(), None);
                    deps.state_store.set(run_id, record.clone(), None).await?;
                    deps.observers
                        .dispatch(&manifest.id, Event::AgentCancelled { record: &record })
                        .await
                        .ok();
                    return Ok(record);
                }

                let tools: Vec<corun_domain::ToolDefinition> = vec![];
                let outcome = step_loop::run_step(
                    &ctx,
                    deps.llm.clone(),
                    deps.tool_executor.clone(),
                    record.messages.clone(),
                    tools,
                    events_tx.clone(),
                )
                .await;

                match outcome {
                    StepOutcome::ToolsRan { assistant_message, tool_message } => {
                        record.messages.push(assistant_message);
                        record.messages.push(tool_message);
                        record.steps += 1;
                        record.current_step_number += 1;
                        deps.state_store
                            .set(run_id, record.clone(), Some(options.agent_state_ttl_secs))
                            .await?;
                    }
                    StepOutcome::Completed { assistant_message } => {
                        record.messages.push(assistant_message);
                        record.mark_completed(deps.clock.now());
                        deps.state_store.set(run_id, record.clone(), None).await?;
                        deps.observers
                            .dispatch(&manifest.id, Event::AgentComplete { record: &record })
                            .await?;
                        return Ok(record);
                    }
                    StepOutcome::Suspended { assistant_message, suspensions, suspension_stacks } => {
                        record.messages.push(assistant_message);
                        record.mark_suspended(deps.clock.now(), suspensions, suspension_stacks);
                        deps.state_store.set(run_id, record.clone(), None).await?;
                        deps.observers
                            .dispatch(&manifest.id, Event::AgentSuspend { record: &record })
                            .await?;
                        return Ok(record);
                    }
                    StepOutcome::Cancelled => {
                        record.mark_cancelled(deps.clock.now(), None);
                        deps.state_store.set(run_id, record.clone(), None).await?;
                        deps.observers
                            .dispatch(&manifest.id, Event::AgentCancelled { record: &record })
                            .await
                            .ok();
                        return Ok(record);
                    }
                    StepOutcome::Failed(err) => {
                        record.mark_failed(deps.clock.now(), err.clone());
                        deps.state_store.set(run_id, record.clone(), None).await?;
                        let core_err = CoreError::Internal(err.message.clone());
                        deps.observers
                            .dispatch(&manifest.id, Event::AgentError { record: &record, error: &core_err })
                            .await
                            .ok();
                        return Err(core_err);
                    }
                }
            }
        }
        .instrument(info_span!("orchestrate_run", run_id = %run_id)),
    )
}

pub async fn cancel_run(run_id: RunId, options: CancelOptions, deps: Arc<Deps>) -> Result<CancelOutcome> {
    info!(%run_id, recursive = options.recursive, "cancel_run invoked");
    cancel_action::cancel_action(run_id, &options, &deps.cancel_deps()).await
}

pub async fn signal_cancellation(
    run_id: RunId,
    reason: Option<String>,
    deps: Arc<Deps>,
) -> Result<()> {
    deps.signal_store
        .set(
            run_id,
            CancellationSignal { cancelled_at: deps.clock.now(), reason },
        )
        .await
}
