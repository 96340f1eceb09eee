//! C8: Cancel Action — classify a run's current state and apply the
//! correct out-of-band cancellation effect (§4.8). The trickiest component:
//! it has to tell a dead holder from a live one using only the lock's TTL.

use std::sync::Arc;
use std::time::Duration;

use corun_domain::{Clock, CoreError, Result, RunError, RunId, RunRecord, RunStatus};
use tracing::{info, warn};

use crate::cancel_signal::{CancellationSignal, CancellationSignalStore};
use crate::config::CancelOptions;
use crate::run_lock::RunLock;
use crate::state_store::StateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    MarkedCancelled,
    MarkedFailed,
    SignaledRunning,
    AlreadyCancelled,
}

pub struct CancelDeps {
    pub state_store: Arc<dyn StateStore>,
    pub signal_store: Arc<dyn CancellationSignalStore>,
    pub lock: Arc<dyn RunLock>,
    pub clock: Arc<dyn Clock>,
}

/// Entry point for C8. Dispatches on the record's current `status` (§4.8
/// step 2).
pub async fn cancel_action(
    run_id: RunId,
    options: &CancelOptions,
    deps: &CancelDeps,
) -> Result<CancelOutcome> {
    let record = deps
        .state_store
        .get(run_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;

    match record.status {
        RunStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
        RunStatus::Completed | RunStatus::Failed => Err(CoreError::BadRequest(format!(
            "run {run_id} is already terminal ({:?})",
            record.status
        ))),
        RunStatus::Suspended => handle_suspended(run_id, options, deps).await,
        RunStatus::Running => handle_running(run_id, options, deps).await,
    }
}

async fn signal(run_id: RunId, options: &CancelOptions, deps: &CancelDeps) -> Result<()> {
    deps.signal_store
        .set(
            run_id,
            CancellationSignal {
                cancelled_at: deps.clock.now(),
                reason: options.reason.clone(),
            },
        )
        .await
}

async fn handle_running(
    run_id: RunId,
    options: &CancelOptions,
    deps: &CancelDeps,
) -> Result<CancelOutcome> {
    let ttl = Duration::from_millis(options.lock_ttl_ms.unwrap_or(30_000));
    let handle = match deps.lock.acquire(run_id, ttl).await? {
        None => {
            signal(run_id, options, deps).await?;
            info!(%run_id, "cancel: lock held by another worker, signaled");
            return Ok(CancelOutcome::SignaledRunning);
        }
        Some(h) => h,
    };

    let result = handle_running_under_lock(run_id, options, deps).await;
    deps.lock.release(&handle).await?;
    result
}

async fn handle_running_under_lock(
    run_id: RunId,
    options: &CancelOptions,
    deps: &CancelDeps,
) -> Result<CancelOutcome> {
    let mut record = deps
        .state_store
        .get(run_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;

    match record.status {
        RunStatus::Completed | RunStatus::Failed => Err(CoreError::BadRequest(format!(
            "run {run_id} reached a terminal state before the lock was acquired"
        ))),
        RunStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
        RunStatus::Suspended => handle_suspended_locked(run_id, &mut record, options, deps).await,
        RunStatus::Running => {
            let now = deps.clock.now();
            let lock_ttl = Duration::from_millis(options.lock_ttl_ms.unwrap_or(30_000));
            let d = record.running_duration(now);
            if d > chrono::Duration::from_std(lock_ttl).unwrap_or(chrono::Duration::zero()) {
                warn!(%run_id, "cancel: prior holder exceeded lock TTL, marking failed");
                record.mark_failed(
                    now,
                    RunError {
                        code: "crashed".into(),
                        message: "run exceeded lock TTL without renewing; presumed crashed".into(),
                        metadata: None,
                    },
                );
                deps.state_store
                    .set(run_id, record, Some(options.lock_ttl_ms.unwrap_or(30_000)))
                    .await?;
                Ok(CancelOutcome::MarkedFailed)
            } else {
                signal(run_id, options, deps).await?;
                Ok(CancelOutcome::SignaledRunning)
            }
        }
    }
}

/// §4.8 `handle_suspended`, entered either directly (record was already
/// suspended) or as a delegation from `handle_running_under_lock`.
async fn handle_suspended(
    run_id: RunId,
    options: &CancelOptions,
    deps: &CancelDeps,
) -> Result<CancelOutcome> {
    let mut record = deps
        .state_store
        .get(run_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
    handle_suspended_locked(run_id, &mut record, options, deps).await
}

async fn handle_suspended_locked(
    run_id: RunId,
    record: &mut RunRecord,
    options: &CancelOptions,
    deps: &CancelDeps,
) -> Result<CancelOutcome> {
    let child_ids: Vec<RunId> = record
        .suspension_stacks
        .iter()
        .flat_map(|stack| stack.entries.iter())
        .map(|e| e.run_id)
        .filter(|id| *id != run_id)
        .collect();

    if options.recursive && !child_ids.is_empty() {
        let child_futures = child_ids.iter().map(|&child_id| {
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = Result<CancelOutcome>> + Send + '_>> =
                Box::pin(cancel_action(child_id, options, deps));
            async move {
                if let Err(e) = fut.await {
                    warn!(run_id = %child_id, error = %e, "recursive child cancel failed, continuing");
                }
            }
        });
        futures_util::future::join_all(child_futures).await;
    }

    // TOCTOU: re-read after recursing into children, since one of them may
    // have bubbled a completion back up into this record.
    let fresh = deps
        .state_store
        .get(run_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;

    match fresh.status {
        RunStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
        RunStatus::Completed | RunStatus::Failed => Err(CoreError::BadRequest(format!(
            "run {run_id} reached a terminal state during recursive cancellation"
        ))),
        RunStatus::Running => {
            // the record resumed between our first read and now; let
            // handle_running re-evaluate it under its own lock logic. Boxed
            // to break the mutual-recursion cycle with handle_running_under_lock.
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = Result<CancelOutcome>> + Send + '_>> =
                Box::pin(handle_running(run_id, options, deps));
            fut.await
        }
        RunStatus::Suspended => {
            let mut fresh = fresh;
            fresh.mark_cancelled(deps.clock.now(), options.reason.clone());
            deps.state_store.set(run_id, fresh, None).await?;
            Ok(CancelOutcome::MarkedCancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel_signal::InMemoryCancellationSignalStore;
    use crate::run_lock::InMemoryRunLock;
    use crate::state_store::InMemoryStateStore;
    use corun_domain::SystemClock;

    fn deps() -> CancelDeps {
        CancelDeps {
            state_store: Arc::new(InMemoryStateStore::new()),
            signal_store: Arc::new(InMemoryCancellationSignalStore::new()),
            lock: Arc::new(InMemoryRunLock::new(Arc::new(SystemClock))),
            clock: Arc::new(SystemClock),
        }
    }

    async fn insert(deps: &CancelDeps, record: RunRecord) -> RunId {
        let id = record.id;
        deps.state_store.set(id, record, None).await.unwrap();
        id
    }

    #[tokio::test]
    async fn cancel_missing_run_is_not_found() {
        let deps = deps();
        let result = cancel_action(RunId::new(), &CancelOptions::default(), &deps).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancel_completed_is_bad_request() {
        let deps = deps();
        let mut record = RunRecord::new("m1", "v1", "m1", chrono::Utc::now(), None);
        record.mark_completed(chrono::Utc::now());
        let id = insert(&deps, record).await;
        let result = cancel_action(id, &CancelOptions::default(), &deps).await;
        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn cancel_already_cancelled_is_idempotent() {
        let deps = deps();
        let mut record = RunRecord::new("m1", "v1", "m1", chrono::Utc::now(), None);
        record.mark_cancelled(chrono::Utc::now(), None);
        let id = insert(&deps, record).await;
        let outcome = cancel_action(id, &CancelOptions::default(), &deps)
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyCancelled);
    }

    #[tokio::test]
    async fn cancel_running_with_free_lock_marks_failed_if_past_ttl() {
        let deps = deps();
        let started_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        let mut record = RunRecord::new("m1", "v1", "m1", started_at, None);
        record.started_at = started_at;
        let id = insert(&deps, record).await;
        let options = CancelOptions { lock_ttl_ms: Some(1000), ..Default::default() };
        let outcome = cancel_action(id, &options, &deps).await.unwrap();
        assert_eq!(outcome, CancelOutcome::MarkedFailed);
    }

    #[tokio::test]
    async fn cancel_running_signals_when_lock_held_by_another_worker() {
        let deps = deps();
        let record = RunRecord::new("m1", "v1", "m1", chrono::Utc::now(), None);
        let id = insert(&deps, record).await;
        // simulate a live worker holding the lock
        deps.lock
            .acquire(id, Duration::from_secs(30))
            .await
            .unwrap();
        let outcome = cancel_action(id, &CancelOptions::default(), &deps)
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::SignaledRunning);
        assert!(deps.signal_store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancel_suspended_marks_cancelled() {
        let deps = deps();
        let mut record = RunRecord::new("m1", "v1", "m1", chrono::Utc::now(), None);
        record.mark_suspended(
            chrono::Utc::now(),
            vec![corun_domain::Suspension {
                approval_id: "a1".into(),
                tool_call_id: "t1".into(),
                tool_name: "exec".into(),
                input: serde_json::json!({}),
            }],
            vec![],
        );
        let id = insert(&deps, record).await;
        let outcome = cancel_action(id, &CancelOptions::default(), &deps)
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::MarkedCancelled);
        let reloaded = deps.state_store.get(id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RunStatus::Cancelled);
    }
}
