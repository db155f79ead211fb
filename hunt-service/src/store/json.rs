// JSON File Store
// One pretty-printed JSON document per execution in a directory

use super::{ExecutionRecord, ExecutionStore, StoreError, StoreResult};
use crate::hunt::models::{HuntExecution, HuntStatus, HuntStep};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

/// File-backed execution store
///
/// Each execution lives in `<dir>/<execution_id>.json`. Writes go through a
/// temporary file and a rename so readers never see a half-written document.
pub struct JsonFileStore {
    dir: PathBuf,
    /// Serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "opened json execution store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, execution_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", execution_id))
    }

    async fn read_record(&self, execution_id: Uuid) -> StoreResult<ExecutionRecord> {
        match tokio::fs::read(self.path_for(execution_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(execution_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let path = self.path_for(record.execution.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load, modify and write back one record under the write lock
    async fn modify<F>(&self, execution_id: Uuid, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ExecutionRecord) -> StoreResult<()> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record(execution_id).await?;
        f(&mut record)?;
        self.write_record(&record).await
    }
}

#[async_trait::async_trait]
impl ExecutionStore for JsonFileStore {
    async fn create_execution(&self, execution: &HuntExecution) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.path_for(execution.id)).await? {
            return Err(StoreError::DuplicateExecution(execution.id));
        }
        self.write_record(&ExecutionRecord::new(execution.clone()))
            .await
    }

    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: HuntStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.modify(execution_id, |record| {
            record.set_status(status, completed_at);
            Ok(())
        })
        .await
    }

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<HuntExecution> {
        Ok(self.read_record(execution_id).await?.execution)
    }

    async fn list_executions(&self, case_id: Option<&str>) -> StoreResult<Vec<HuntExecution>> {
        let mut executions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<ExecutionRecord>(&bytes) {
                Ok(record) => {
                    if case_id.map_or(true, |c| record.execution.case_id == c) {
                        executions.push(record.execution);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable execution file");
                }
            }
        }

        executions.sort_by_key(|e| e.created_at);
        Ok(executions)
    }

    async fn create_step(&self, step: &HuntStep) -> StoreResult<()> {
        self.modify(step.execution_id, |record| record.add_step(step))
            .await
    }

    async fn update_step(&self, step: &HuntStep) -> StoreResult<()> {
        self.modify(step.execution_id, |record| record.replace_step(step))
            .await
    }

    async fn list_steps(&self, execution_id: Uuid) -> StoreResult<Vec<HuntStep>> {
        Ok(self.read_record(execution_id).await?.steps)
    }
}
