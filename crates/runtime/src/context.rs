//! Execution context: the abort signal and correlation id threaded through
//! every suspension point (§5, §6 `ExecutionContext`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cooperative abort signal shared across a run and (optionally) its
/// children. Cloning an `ExecutionContext` clones the `Arc` handle, not the
/// underlying flag — all clones observe the same abort.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub correlation_id: String,
    inner: Arc<Inner>,
    /// Set when this context was derived from a parent; the parent's abort
    /// fans into this child (`derive`), but the child's own abort does not
    /// propagate back up.
    parent: Option<Arc<Inner>>,
}

impl ExecutionContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            inner: Arc::new(Inner {
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            parent: None,
        }
    }

    /// Derive a child context whose abort is independent, but which also
    /// observes the parent's abort (§6: "the parent's abort propagates
    /// into the child").
    pub fn derive(&self, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            inner: Arc::new(Inner {
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            parent: Some(self.inner.clone()),
        }
    }

    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.aborted.load(Ordering::SeqCst))
    }

    /// Resolves once this context (or an ancestor) is aborted. Safe to await
    /// repeatedly and to race in a `tokio::select!`.
    pub async fn cancelled(&self) {
        if self.is_aborted() {
            return;
        }
        loop {
            let own = self.inner.notify.notified();
            let parent = self.parent.clone();
            if self.is_aborted() {
                return;
            }
            match parent {
                Some(p) => {
                    let parent_notified = p.notify.notified();
                    tokio::select! {
                        _ = own => {}
                        _ = parent_notified => {}
                    }
                }
                None => own.await,
            }
            if self.is_aborted() {
                return;
            }
        }
    }
}
