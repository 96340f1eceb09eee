//! C4: Cancellation Poller — turns a remote [`CancellationSignal`] into a
//! local [`ExecutionContext`] abort (§4.4).

use std::sync::Arc;
use std::time::Duration;

use corun_domain::RunId;
use tracing::{debug, warn, Instrument};

use crate::cancel_signal::CancellationSignalStore;
use crate::context::ExecutionContext;

/// Owns the `tokio::spawn`ed polling task. Dropping the guard stops the
/// poller — every exit path of the caller (including a panic unwinding
/// through it) tears the task down (§9 design notes).
pub struct PollerGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a poller for `run_id` against `ctx`. At each tick of `interval` it
/// consults `store`; on first observed signal it aborts `ctx` and stops.
/// Ticks never overlap: each iteration awaits the previous store call to
/// finish before sleeping again, so a slow `get` simply delays the next
/// tick rather than stacking polls.
pub fn spawn(
    run_id: RunId,
    ctx: ExecutionContext,
    store: Arc<dyn CancellationSignalStore>,
    interval: Duration,
) -> PollerGuard {
    let handle = tokio::spawn(
        async move {
            loop {
                if ctx.is_aborted() {
                    debug!("poller stopping: context already aborted");
                    return;
                }
                tokio::select! {
                    _ = ctx.cancelled() => {
                        debug!("poller stopping: abort observed while idle");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
                match store.get(run_id).await {
                    Ok(Some(_signal)) => {
                        debug!("cancellation signal observed, aborting context");
                        ctx.abort();
                        return;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "poller: signal store read failed, will retry");
                    }
                }
            }
        }
        .instrument(tracing::info_span!("cancellation_poller", run_id = %run_id)),
    );
    PollerGuard { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel_signal::{CancellationSignal, InMemoryCancellationSignalStore};
    use chrono::Utc;

    #[tokio::test]
    async fn poller_aborts_context_once_signal_observed() {
        let store: Arc<dyn CancellationSignalStore> =
            Arc::new(InMemoryCancellationSignalStore::new());
        let run_id = RunId::new();
        let ctx = ExecutionContext::new("root");
        let _guard = spawn(run_id, ctx.clone(), store.clone(), Duration::from_millis(5));

        assert!(!ctx.is_aborted());
        store
            .set(
                run_id,
                CancellationSignal {
                    cancelled_at: Utc::now(),
                    reason: None,
                },
            )
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .expect("poller should observe signal within timeout");
        assert!(ctx.is_aborted());
    }

    #[tokio::test]
    async fn dropping_guard_stops_the_task() {
        let store: Arc<dyn CancellationSignalStore> =
            Arc::new(InMemoryCancellationSignalStore::new());
        let run_id = RunId::new();
        let ctx = ExecutionContext::new("root");
        let guard = spawn(run_id, ctx.clone(), store.clone(), Duration::from_millis(5));
        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .set(
                run_id,
                CancellationSignal {
                    cancelled_at: Utc::now(),
                    reason: None,
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ctx.is_aborted());
    }
}
