//! C1: State Store — persists [`RunRecord`]s keyed by [`RunId`] (§4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use corun_domain::{CoreError, Result, RunId, RunRecord};
use parking_lot::RwLock;

/// Optional time-to-live for a stored record, in seconds. The in-memory and
/// file-backed implementations here treat `ttl` as advisory metadata rather
/// than enforcing eviction — a real backend (Redis, etc.) enforces it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>>;
    async fn set(&self, run_id: RunId, record: RunRecord, ttl_secs: Option<u64>) -> Result<()>;
    async fn del(&self, run_id: RunId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>> {
        Ok(self.records.read().get(&run_id).cloned())
    }

    async fn set(&self, run_id: RunId, record: RunRecord, _ttl_secs: Option<u64>) -> Result<()> {
        if record.schema_version != corun_domain::run::RUN_RECORD_SCHEMA_VERSION {
            return Err(CoreError::Internal(format!(
                "unexpected schema_version {} for run {}",
                record.schema_version, run_id
            )));
        }
        self.records.write().insert(run_id, record);
        Ok(())
    }

    async fn del(&self, run_id: RunId) -> Result<()> {
        self.records.write().remove(&run_id);
        Ok(())
    }
}

/// One JSON file per run under `dir`. Simple and crash-safe enough for the
/// demo CLI: each write is a full-file replace via a temp file + rename.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>> {
        let path = self.path_for(run_id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, run_id: RunId, record: RunRecord, _ttl_secs: Option<u64>) -> Result<()> {
        if record.schema_version != corun_domain::run::RUN_RECORD_SCHEMA_VERSION {
            return Err(CoreError::Internal(format!(
                "unexpected schema_version {} for run {}",
                record.schema_version, run_id
            )));
        }
        Self::ensure_dir(&self.dir)?;
        let path = self.path_for(run_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&record)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn del(&self, run_id: RunId) -> Result<()> {
        let path = self.path_for(run_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record() -> RunRecord {
        RunRecord::new("m1", "v1", "m1", Utc::now(), None)
    }

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let store = InMemoryStateStore::new();
        let record = sample_record();
        let id = record.id;
        store.set(id, record.clone(), None).await.unwrap();
        let back = store.get(id).await.unwrap().unwrap();
        assert_eq!(back.id, id);
        store.del(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(tmp.path());
        let record = sample_record();
        let id = record.id;
        store.set(id, record.clone(), None).await.unwrap();
        let back = store.get(id).await.unwrap().unwrap();
        assert_eq!(back.id, id);
        store.del(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryStateStore::new();
        assert!(store.get(RunId::new()).await.unwrap().is_none());
    }
}
