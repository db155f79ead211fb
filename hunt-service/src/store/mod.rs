// Execution Store
// Durable record of hunt executions and their steps

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::hunt::models::{HuntExecution, HuntStatus, HuntStep};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("execution {0} not found")]
    NotFound(Uuid),

    #[error("execution {0} already exists")]
    DuplicateExecution(Uuid),

    #[error("step '{step_id}' of execution {execution_id} not found")]
    StepNotFound { execution_id: Uuid, step_id: String },

    #[error("step '{step_id}' of execution {execution_id} already exists")]
    DuplicateStep { execution_id: Uuid, step_id: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of execution and step records
///
/// Implementations must be safe for concurrent use by many executions.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: &HuntExecution) -> StoreResult<()>;

    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: HuntStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<HuntExecution>;

    /// Executions, oldest first, optionally restricted to one case
    async fn list_executions(&self, case_id: Option<&str>) -> StoreResult<Vec<HuntExecution>>;

    async fn create_step(&self, step: &HuntStep) -> StoreResult<()>;

    /// Replace a step record (matched by execution id and step id)
    async fn update_step(&self, step: &HuntStep) -> StoreResult<()>;

    /// Step records in creation order
    async fn list_steps(&self, execution_id: Uuid) -> StoreResult<Vec<HuntStep>>;
}

/// Everything stored about one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution: HuntExecution,
    #[serde(default)]
    pub steps: Vec<HuntStep>,
}

impl ExecutionRecord {
    pub fn new(execution: HuntExecution) -> Self {
        Self {
            execution,
            steps: Vec::new(),
        }
    }

    fn set_status(&mut self, status: HuntStatus, completed_at: Option<DateTime<Utc>>) {
        self.execution.status = status;
        if completed_at.is_some() {
            self.execution.completed_at = completed_at;
        }
    }

    fn add_step(&mut self, step: &HuntStep) -> StoreResult<()> {
        if self.steps.iter().any(|s| s.step_id == step.step_id) {
            return Err(StoreError::DuplicateStep {
                execution_id: step.execution_id,
                step_id: step.step_id.clone(),
            });
        }
        self.steps.push(step.clone());
        Ok(())
    }

    fn replace_step(&mut self, step: &HuntStep) -> StoreResult<()> {
        let existing = self
            .steps
            .iter_mut()
            .find(|s| s.step_id == step.step_id)
            .ok_or_else(|| StoreError::StepNotFound {
                execution_id: step.execution_id,
                step_id: step.step_id.clone(),
            })?;
        *existing = step.clone();
        Ok(())
    }
}

/// Shared behaviour checks run against every store implementation
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::hunt::models::{StepDefinition, StepStatus, UserContext};
    use serde_json::{json, Map};

    pub async fn check_store(store: &dyn ExecutionStore) {
        let user = UserContext::new("u-1", "analyst");
        let first = HuntExecution::new("domain_recon", "case-1", Map::new(), &user);
        let second = HuntExecution::new("username_sweep", "case-2", Map::new(), &user);

        store.create_execution(&first).await.unwrap();
        store.create_execution(&second).await.unwrap();
        assert!(matches!(
            store.create_execution(&first).await,
            Err(StoreError::DuplicateExecution(_))
        ));

        store
            .update_execution_status(first.id, HuntStatus::Running, None)
            .await
            .unwrap();
        let loaded = store.get_execution(first.id).await.unwrap();
        assert_eq!(loaded.status, HuntStatus::Running);
        assert!(loaded.completed_at.is_none());

        let done = Utc::now();
        store
            .update_execution_status(first.id, HuntStatus::Completed, Some(done))
            .await
            .unwrap();
        let loaded = store.get_execution(first.id).await.unwrap();
        assert_eq!(loaded.status, HuntStatus::Completed);
        assert_eq!(loaded.completed_at, Some(done));

        let all = store.list_executions(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let case_two = store.list_executions(Some("case-2")).await.unwrap();
        assert_eq!(case_two.len(), 1);
        assert_eq!(case_two[0].id, second.id);

        let dns = StepDefinition::new("dns", "dns_lookup");
        let whois = StepDefinition::new("whois", "whois_lookup");
        let mut dns_record = HuntStep::started(first.id, &dns);
        store.create_step(&dns_record).await.unwrap();
        store
            .create_step(&HuntStep::never_started(first.id, &whois, StepStatus::Skipped))
            .await
            .unwrap();
        assert!(matches!(
            store.create_step(&dns_record).await,
            Err(StoreError::DuplicateStep { .. })
        ));

        dns_record.output = json!({ "results": [] });
        dns_record.finish(StepStatus::Completed);
        store.update_step(&dns_record).await.unwrap();

        let steps = store.list_steps(first.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_id, "dns");
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[0].output, json!({ "results": [] }));
        assert_eq!(steps[1].status, StepStatus::Skipped);

        assert!(store.list_steps(second.id).await.unwrap().is_empty());

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.get_execution(missing).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.update_step(&HuntStep::started(second.id, &dns)).await,
            Err(StoreError::StepNotFound { .. })
        ));
    }
}
