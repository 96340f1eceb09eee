//! C3: Run Lock — a non-blocking, TTL-scoped distributed mutex used only to
//! *prove* liveness (§3, §4.3). Acquiring a stale lock is what lets C8 tell
//! a dead holder apart from a live one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corun_domain::{Clock, Result, RunId};
use parking_lot::Mutex;
use uuid::Uuid;

/// Proof of ownership returned by a successful `acquire`. Dropping it does
/// not release the lock — callers must call `release` explicitly on every
/// exit path (§3: "releasing is mandatory on every exit path").
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub run_id: RunId,
    pub token: Uuid,
}

#[async_trait]
pub trait RunLock: Send + Sync {
    async fn acquire(&self, run_id: RunId, ttl: Duration) -> Result<Option<LockHandle>>;
    async fn release(&self, handle: &LockHandle) -> Result<()>;
    async fn is_locked(&self, run_id: RunId) -> Result<bool>;
}

struct Entry {
    token: Uuid,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// In-process lock table. A real deployment backs this with a distributed
/// primitive (Redis `SET NX PX`, etc.); this implementation is sufficient
/// for tests and the single-process CLI demo.
pub struct InMemoryRunLock {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<RunId, Entry>>,
}

impl InMemoryRunLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RunLock for InMemoryRunLock {
    async fn acquire(&self, run_id: RunId, ttl: Duration) -> Result<Option<LockHandle>> {
        let now = self.clock.now();
        let mut guard = self.entries.lock();
        if let Some(existing) = guard.get(&run_id) {
            if existing.expires_at > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| corun_domain::CoreError::Internal(e.to_string()))?;
        guard.insert(
            run_id,
            Entry {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(Some(LockHandle { run_id, token }))
    }

    async fn release(&self, handle: &LockHandle) -> Result<()> {
        let mut guard = self.entries.lock();
        if let Some(existing) = guard.get(&handle.run_id) {
            if existing.token == handle.token {
                guard.remove(&handle.run_id);
            }
        }
        Ok(())
    }

    async fn is_locked(&self, run_id: RunId) -> Result<bool> {
        let now = self.clock.now();
        let guard = self.entries.lock();
        Ok(guard.get(&run_id).is_some_and(|e| e.expires_at > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corun_domain::SystemClock;

    #[tokio::test]
    async fn second_acquire_fails_while_first_live() {
        let lock = InMemoryRunLock::new(Arc::new(SystemClock));
        let run_id = RunId::new();
        let h1 = lock
            .acquire(run_id, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(h1.is_some());
        let h2 = lock
            .acquire(run_id, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(h2.is_none());
    }

    #[tokio::test]
    async fn acquire_succeeds_after_release() {
        let lock = InMemoryRunLock::new(Arc::new(SystemClock));
        let run_id = RunId::new();
        let h1 = lock
            .acquire(run_id, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        lock.release(&h1).await.unwrap();
        let h2 = lock
            .acquire(run_id, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(h2.is_some());
    }

    #[tokio::test]
    async fn acquire_succeeds_after_ttl_expiry() {
        let lock = InMemoryRunLock::new(Arc::new(SystemClock));
        let run_id = RunId::new();
        lock.acquire(run_id, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        let h2 = lock.acquire(run_id, Duration::from_secs(30)).await.unwrap();
        assert!(h2.is_some());
    }

    #[tokio::test]
    async fn is_locked_reflects_live_holder() {
        let lock = InMemoryRunLock::new(Arc::new(SystemClock));
        let run_id = RunId::new();
        assert!(!lock.is_locked(run_id).await.unwrap());
        lock.acquire(run_id, Duration::from_secs(30)).await.unwrap();
        assert!(lock.is_locked(run_id).await.unwrap());
    }
}
