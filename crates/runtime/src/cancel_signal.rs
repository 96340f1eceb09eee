//! C2: Cancellation Signal Store — a write-once "cancel run R" flag (§4.2).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corun_domain::{Result, RunId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationSignal {
    pub cancelled_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[async_trait]
pub trait CancellationSignalStore: Send + Sync {
    async fn set(&self, run_id: RunId, signal: CancellationSignal) -> Result<()>;
    async fn get(&self, run_id: RunId) -> Result<Option<CancellationSignal>>;
    async fn del(&self, run_id: RunId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryCancellationSignalStore {
    signals: RwLock<HashMap<RunId, CancellationSignal>>,
}

impl InMemoryCancellationSignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CancellationSignalStore for InMemoryCancellationSignalStore {
    async fn set(&self, run_id: RunId, signal: CancellationSignal) -> Result<()> {
        // Idempotent: the first write wins, later writes do not move
        // `cancelled_at` (§4.2: "second `set` does not alter `cancelled_at`
        // observably").
        let mut guard = self.signals.write();
        guard.entry(run_id).or_insert(signal);
        Ok(())
    }

    async fn get(&self, run_id: RunId) -> Result<Option<CancellationSignal>> {
        Ok(self.signals.read().get(&run_id).cloned())
    }

    async fn del(&self, run_id: RunId) -> Result<()> {
        self.signals.write().remove(&run_id);
        Ok(())
    }
}

/// File-backed variant for the CLI: one file per run, written once.
#[derive(Debug)]
pub struct FileCancellationSignalStore {
    dir: PathBuf,
}

impl FileCancellationSignalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.cancel.json"))
    }
}

#[async_trait]
impl CancellationSignalStore for FileCancellationSignalStore {
    async fn set(&self, run_id: RunId, signal: CancellationSignal) -> Result<()> {
        let path = self.path_for(run_id);
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("cancel.json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&signal)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn get(&self, run_id: RunId) -> Result<Option<CancellationSignal>> {
        match std::fs::read(self.path_for(run_id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn del(&self, run_id: RunId) -> Result<()> {
        match std::fs::remove_file(self.path_for(run_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_set_does_not_move_cancelled_at() {
        let store = InMemoryCancellationSignalStore::new();
        let run_id = RunId::new();
        let first_ts = Utc::now();
        store
            .set(
                run_id,
                CancellationSignal {
                    cancelled_at: first_ts,
                    reason: Some("user requested".into()),
                },
            )
            .await
            .unwrap();
        store
            .set(
                run_id,
                CancellationSignal {
                    cancelled_at: first_ts + chrono::Duration::seconds(5),
                    reason: Some("second caller".into()),
                },
            )
            .await
            .unwrap();
        let signal = store.get(run_id).await.unwrap().unwrap();
        assert_eq!(signal.cancelled_at, first_ts);
        assert_eq!(signal.reason.as_deref(), Some("user requested"));
    }

    #[tokio::test]
    async fn missing_signal_is_none() {
        let store = InMemoryCancellationSignalStore::new();
        assert!(store.get(RunId::new()).await.unwrap().is_none());
    }
}
