// Memory Store
// In-process execution store, the default backend

use super::{ExecutionRecord, ExecutionStore, StoreError, StoreResult};
use crate::hunt::models::{HuntExecution, HuntStatus, HuntStep};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Execution store kept in memory for the life of the process
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(&self, execution: &HuntExecution) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&execution.id) {
            return Err(StoreError::DuplicateExecution(execution.id));
        }
        records.insert(execution.id, ExecutionRecord::new(execution.clone()));
        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: HuntStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&execution_id)
            .ok_or(StoreError::NotFound(execution_id))?;
        record.set_status(status, completed_at);
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<HuntExecution> {
        self.records
            .read()
            .await
            .get(&execution_id)
            .map(|r| r.execution.clone())
            .ok_or(StoreError::NotFound(execution_id))
    }

    async fn list_executions(&self, case_id: Option<&str>) -> StoreResult<Vec<HuntExecution>> {
        let records = self.records.read().await;
        let mut executions: Vec<HuntExecution> = records
            .values()
            .filter(|r| case_id.map_or(true, |c| r.execution.case_id == c))
            .map(|r| r.execution.clone())
            .collect();
        executions.sort_by_key(|e| e.created_at);
        Ok(executions)
    }

    async fn create_step(&self, step: &HuntStep) -> StoreResult<()> {
        let mut records = self.records.write().await;
        records
            .get_mut(&step.execution_id)
            .ok_or(StoreError::NotFound(step.execution_id))?
            .add_step(step)
    }

    async fn update_step(&self, step: &HuntStep) -> StoreResult<()> {
        let mut records = self.records.write().await;
        records
            .get_mut(&step.execution_id)
            .ok_or(StoreError::NotFound(step.execution_id))?
            .replace_step(step)
    }

    async fn list_steps(&self, execution_id: Uuid) -> StoreResult<Vec<HuntStep>> {
        self.records
            .read()
            .await
            .get(&execution_id)
            .map(|r| r.steps.clone())
            .ok_or(StoreError::NotFound(execution_id))
    }
}
