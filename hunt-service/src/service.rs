// Hunt Service
// Submission, cancellation and inspection of hunt executions

use crate::config::{EngineConfig, StoreConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::execution::events::{HuntEvent, Progress};
use crate::execution::executor::{HuntExecutor, SYSTEM_ERROR_MESSAGE};
use crate::execution::notifier::{ProgressNotifier, Subscription};
use crate::execution::runner::StepRunner;
use crate::hunt::catalog::HuntCatalog;
use crate::hunt::models::{HuntExecution, HuntStatus, HuntStep, StepStatus, UserContext};
use crate::hunt::validation::validate_parameters;
use crate::plugins::{CommandPlugin, EchoPlugin, PluginInvoker, PluginRegistry, RegistryError};
use crate::store::{ExecutionStore, JsonFileStore, MemoryStore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle on an execution whose task is still alive
struct RunningHunt {
    cancel: CancellationToken,
    /// Set to the final status once the supervised task has been joined
    done: watch::Receiver<Option<HuntStatus>>,
}

type RunningTable = Arc<Mutex<HashMap<Uuid, RunningHunt>>>;

/// Entry point for running hunts
///
/// Each submitted hunt runs in its own task, supervised so that a panic marks
/// the execution failed instead of leaving it running forever.
#[derive(Clone)]
pub struct HuntService {
    catalog: Arc<HuntCatalog>,
    store: Arc<dyn ExecutionStore>,
    notifier: Arc<ProgressNotifier>,
    runner: StepRunner,
    running: RunningTable,
}

/// Registry with the echo plugin and the given command plugins
pub fn build_registry(config: &EngineConfig) -> Result<PluginRegistry, RegistryError> {
    let mut registry = PluginRegistry::new();
    registry.register(EchoPlugin::new())?;
    for spec in config.command_specs() {
        registry.register(CommandPlugin::new(spec))?;
    }
    Ok(registry)
}

impl HuntService {
    pub fn new(
        catalog: HuntCatalog,
        store: Arc<dyn ExecutionStore>,
        invoker: Arc<dyn PluginInvoker>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            store,
            notifier: Arc::new(ProgressNotifier::new()),
            runner: StepRunner::new(invoker),
            running: Arc::default(),
        }
    }

    /// Service over the built-in catalog, wired from configuration
    pub async fn from_config(config: &EngineConfig) -> ServiceResult<Self> {
        let registry = build_registry(config)?;
        Self::from_config_with_invoker(config, Arc::new(registry)).await
    }

    /// Like [`HuntService::from_config`] but with a caller-supplied invoker
    pub async fn from_config_with_invoker(
        config: &EngineConfig,
        invoker: Arc<dyn PluginInvoker>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        let store: Arc<dyn ExecutionStore> = match &config.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Json { dir } => Arc::new(JsonFileStore::open(dir.clone()).await?),
        };
        let catalog = HuntCatalog::builtin()?;

        Ok(Self::new(catalog, store, invoker).with_default_step_timeout(config.default_step_timeout()))
    }

    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_default_timeout(timeout);
        self
    }

    pub fn catalog(&self) -> &HuntCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Validate and start a hunt; returns the new execution id
    ///
    /// Nothing is recorded when the hunt name or the parameters are rejected.
    pub async fn submit(
        &self,
        hunt_name: &str,
        case_id: &str,
        initial_parameters: Map<String, Value>,
        user: &UserContext,
    ) -> ServiceResult<Uuid> {
        let (execution_id, _) = self
            .start(hunt_name, case_id, initial_parameters, user, false)
            .await?;
        Ok(execution_id)
    }

    /// Like [`HuntService::submit`], subscribing before the hunt starts so no event is missed
    pub async fn submit_subscribed(
        &self,
        hunt_name: &str,
        case_id: &str,
        initial_parameters: Map<String, Value>,
        user: &UserContext,
    ) -> ServiceResult<(Uuid, Subscription)> {
        let (execution_id, subscription) = self
            .start(hunt_name, case_id, initial_parameters, user, true)
            .await?;
        let subscription = subscription
            .unwrap_or_else(|| self.notifier.subscribe(execution_id));
        Ok((execution_id, subscription))
    }

    async fn start(
        &self,
        hunt_name: &str,
        case_id: &str,
        initial_parameters: Map<String, Value>,
        user: &UserContext,
        subscribe: bool,
    ) -> ServiceResult<(Uuid, Option<Subscription>)> {
        let entry = self
            .catalog
            .get(hunt_name)
            .ok_or_else(|| ServiceError::UnknownHunt(hunt_name.to_string()))?;

        let parameters = validate_parameters(&entry.definition, &initial_parameters)?;
        let execution = HuntExecution::new(hunt_name, case_id, parameters, user);
        let execution_id = execution.id;
        self.store.create_execution(&execution).await?;

        let cancel = CancellationToken::new();
        let executor = HuntExecutor::new(
            execution,
            entry.definition.clone(),
            entry.graph.clone(),
            user.clone(),
            self.store.clone(),
            self.notifier.clone(),
            self.runner.clone(),
        )
        .with_cancel_token(cancel.clone());

        let (done_tx, done_rx) = watch::channel(None);
        lock(&self.running).insert(
            execution_id,
            RunningHunt {
                cancel,
                done: done_rx,
            },
        );

        let subscription = subscribe.then(|| self.notifier.subscribe(execution_id));
        let handle = tokio::spawn(executor.run());

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let status = match handle.await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(%execution_id, error = %e, "hunt task panicked");
                    if let Err(e) = store
                        .update_execution_status(execution_id, HuntStatus::Failed, Some(Utc::now()))
                        .await
                    {
                        tracing::error!(%execution_id, error = %e, "could not record failed status");
                    }
                    notifier.publish(HuntEvent::error(execution_id, SYSTEM_ERROR_MESSAGE));
                    HuntStatus::Failed
                }
            };
            lock(&running).remove(&execution_id);
            let _ = done_tx.send(Some(status));
        });

        tracing::info!(%execution_id, hunt = hunt_name, case_id, user = %user.username, "hunt submitted");
        Ok((execution_id, subscription))
    }

    /// Cancel a running execution
    pub async fn cancel(&self, execution_id: Uuid, user: &UserContext) -> ServiceResult<()> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution.status != HuntStatus::Running {
            return Err(ServiceError::NotCancelable {
                id: execution_id,
                status: execution.status,
            });
        }

        let token = lock(&self.running)
            .get(&execution_id)
            .map(|r| r.cancel.clone());
        match token {
            Some(token) => {
                tracing::info!(%execution_id, user = %user.username, "hunt cancel requested");
                token.cancel();
                Ok(())
            }
            // Recorded as running by a process that is gone
            None => Err(ServiceError::NotCancelable {
                id: execution_id,
                status: execution.status,
            }),
        }
    }

    pub async fn get_status(&self, execution_id: Uuid) -> ServiceResult<HuntExecution> {
        Ok(self.store.get_execution(execution_id).await?)
    }

    pub async fn list_steps(&self, execution_id: Uuid) -> ServiceResult<Vec<HuntStep>> {
        Ok(self.store.list_steps(execution_id).await?)
    }

    pub async fn list_executions(&self, case_id: Option<&str>) -> ServiceResult<Vec<HuntExecution>> {
        Ok(self.store.list_executions(case_id).await?)
    }

    /// Ids of executions whose task is still alive
    pub fn running(&self) -> Vec<Uuid> {
        lock(&self.running).keys().copied().collect()
    }

    /// Subscribe to an execution's events
    ///
    /// For an execution that already ended the subscription yields one
    /// terminal event and then ends.
    pub async fn subscribe(&self, execution_id: Uuid) -> ServiceResult<Subscription> {
        // Subscribe before reading the status so the terminal event cannot slip between
        let subscription = self.notifier.subscribe(execution_id);

        let execution = match self.store.get_execution(execution_id).await {
            Ok(execution) => execution,
            Err(e) => {
                self.notifier.unsubscribe(execution_id, subscription.id());
                return Err(e.into());
            }
        };

        if !execution.status.is_terminal() {
            return Ok(subscription);
        }

        self.notifier.unsubscribe(execution_id, subscription.id());
        let steps = self.store.list_steps(execution_id).await?;
        let event = self.terminal_event(&execution, &steps);
        Ok(Subscription::closed(execution_id, event.into_iter().collect()))
    }

    /// Wait until an execution reaches a terminal status
    pub async fn wait(&self, execution_id: Uuid) -> ServiceResult<HuntStatus> {
        let done = lock(&self.running)
            .get(&execution_id)
            .map(|r| r.done.clone());

        if let Some(mut done) = done {
            loop {
                let current = *done.borrow_and_update();
                if let Some(status) = current {
                    return Ok(status);
                }
                if done.changed().await.is_err() {
                    break;
                }
            }
        }

        Ok(self.store.get_execution(execution_id).await?.status)
    }

    /// Rebuild the final event of a finished execution from its records
    fn terminal_event(&self, execution: &HuntExecution, steps: &[HuntStep]) -> Option<HuntEvent> {
        let total = self
            .catalog
            .get(&execution.hunt_id)
            .map(|e| e.graph.len())
            .unwrap_or(steps.len());
        let definition = self.catalog.get(&execution.hunt_id).map(|e| &e.definition);
        let is_optional = |step: &HuntStep| {
            definition
                .and_then(|d| d.get_step(&step.step_id))
                .map_or(false, |d| d.optional)
        };
        let completed = steps
            .iter()
            .filter(|s| match s.status {
                StepStatus::Completed => true,
                StepStatus::Failed => is_optional(s),
                _ => false,
            })
            .count();
        let progress = Progress::new(completed, total);

        if execution.status == HuntStatus::Failed {
            let failed_required = steps
                .iter()
                .find(|s| s.status == StepStatus::Failed && !is_optional(s));
            let message = match failed_required {
                Some(step) => format!(
                    "step '{}' failed: {}",
                    step.step_id,
                    step.error.as_deref().unwrap_or("unknown error")
                ),
                None => SYSTEM_ERROR_MESSAGE.to_string(),
            };
            return Some(HuntEvent::error(execution.id, message));
        }

        HuntEvent::terminal(execution.id, execution.status, progress)
    }
}

fn lock(table: &RunningTable) -> MutexGuard<'_, HashMap<Uuid, RunningHunt>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::EventKind;
    use crate::plugins::{event_stream, InvocationContext, Plugin, PluginEvent, PluginEventStream};
    use serde_json::json;

    /// Stand-in for every command plugin: echoes after a short pause
    struct QuickEcho {
        name: String,
    }

    #[async_trait::async_trait]
    impl Plugin for QuickEcho {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, params: Map<String, Value>, _: InvocationContext) -> PluginEventStream {
            tokio::time::sleep(Duration::from_millis(5)).await;
            event_stream(vec![PluginEvent::data(json!({ "line": "203.0.113.7", "params": params }))])
        }
    }

    fn service() -> HuntService {
        let mut registry = PluginRegistry::new();
        registry.register(EchoPlugin::new()).unwrap();
        for spec in EngineConfig::default().command_specs() {
            registry.register(QuickEcho { name: spec.name }).unwrap();
        }
        HuntService::new(
            HuntCatalog::builtin().unwrap(),
            Arc::new(MemoryStore::new()),
            Arc::new(registry),
        )
    }

    fn user() -> UserContext {
        UserContext::new("u-1", "analyst")
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_submit_runs_builtin_hunt() {
        let service = service();
        let id = service
            .submit("domain_recon", "case-1", params(json!({ "domain": "example.com" })), &user())
            .await
            .unwrap();

        assert_eq!(service.wait(id).await.unwrap(), HuntStatus::Completed);
        assert!(service.running().is_empty());

        let steps = service.list_steps(id).await.unwrap();
        assert_eq!(steps.len(), 6);
        let reverse = steps.iter().find(|s| s.step_id == "reverse").unwrap();
        assert_eq!(reverse.resolved_parameters["address"], json!("203.0.113.7"));

        let execution = service.get_status(id).await.unwrap();
        assert_eq!(execution.created_by, "u-1");
        assert_eq!(execution.initial_parameters["domain"], json!("example.com"));
    }

    #[tokio::test]
    async fn test_submit_subscribed_sees_every_event() {
        let service = service();
        let (_, mut sub) = service
            .submit_subscribed("username_sweep", "case-4", params(json!({ "username": "octocat" })), &user())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = sub.recv().await {
            kinds.push(event.kind_name());
        }
        assert_eq!(kinds.first(), Some(&"status"));
        assert_eq!(kinds.last(), Some(&"complete"));
        assert_eq!(kinds.iter().filter(|k| **k == "progress").count(), 3);
    }

    #[tokio::test]
    async fn test_rejected_submission_records_nothing() {
        let service = service();

        assert!(matches!(
            service.submit("nope", "case-1", Map::new(), &user()).await,
            Err(ServiceError::UnknownHunt(_))
        ));
        assert!(matches!(
            service.submit("domain_recon", "case-1", Map::new(), &user()).await,
            Err(ServiceError::ParameterValidation(_))
        ));
        assert!(service.list_executions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_after_finish_yields_terminal_event() {
        let service = service();
        let id = service
            .submit("username_sweep", "case-2", params(json!({ "username": "octocat" })), &user())
            .await
            .unwrap();
        service.wait(id).await.unwrap();

        let mut sub = service.subscribe(id).await.unwrap();
        let event = sub.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::Complete { status: HuntStatus::Completed, progress } if progress.completed == 3));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let service = service();
        let missing = Uuid::new_v4();
        assert!(matches!(
            service.get_status(missing).await,
            Err(ServiceError::ExecutionNotFound(_))
        ));
        assert!(matches!(
            service.subscribe(missing).await,
            Err(ServiceError::ExecutionNotFound(_))
        ));
        assert!(matches!(
            service.cancel(missing, &user()).await,
            Err(ServiceError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_finished_execution_is_rejected() {
        let service = service();
        let id = service
            .submit("email_investigation", "case-3", params(json!({ "domain": "example.org" })), &user())
            .await
            .unwrap();
        service.wait(id).await.unwrap();

        assert!(matches!(
            service.cancel(id, &user()).await,
            Err(ServiceError::NotCancelable { status: HuntStatus::Completed, .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_uses_json_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig {
            store: StoreConfig::Json {
                dir: dir.path().to_path_buf(),
            },
            ..EngineConfig::default()
        };
        let service = HuntService::from_config(&config).await.unwrap();
        assert_eq!(service.catalog().len(), 3);
        assert!(service.list_executions(None).await.unwrap().is_empty());
    }
}
