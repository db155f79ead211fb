// Hunt Executor
// Drives one hunt execution: schedules ready steps concurrently and applies the failure policy

use crate::execution::context::RuntimeContext;
use crate::execution::events::{HuntEvent, Progress};
use crate::execution::graph::DependencyGraph;
use crate::execution::notifier::ProgressNotifier;
use crate::execution::runner::{StepError, StepOutcome, StepReport, StepRunner};
use crate::hunt::models::{HuntDefinition, HuntExecution, HuntStatus, HuntStep, StepStatus, UserContext};
use crate::store::{ExecutionStore, StoreError};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Map;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Payload published when the executor itself fails
pub const SYSTEM_ERROR_MESSAGE: &str = "internal system error";

/// Controller for a single hunt execution
///
/// Owns every write to its execution's records. Step failures never escape
/// it; they end up in persisted state and published events.
pub struct HuntExecutor {
    execution: HuntExecution,
    definition: Arc<HuntDefinition>,
    graph: DependencyGraph,
    user: UserContext,
    store: Arc<dyn ExecutionStore>,
    notifier: Arc<ProgressNotifier>,
    runner: StepRunner,
    cancel: CancellationToken,
}

/// Mutable scheduling state of one run
#[derive(Default)]
struct RunState {
    /// Steps done for scheduling and progress (completed, or failed optional)
    completed: HashSet<String>,
    /// Steps that were dispatched
    scheduled: HashSet<String>,
    /// Steps that got a record without running (skipped or canceled)
    skipped: HashSet<String>,
    /// Records of dispatched steps whose final state is not yet persisted
    running: HashMap<String, HuntStep>,
    /// Steps that reported cancellation
    canceled: usize,
    /// First required-step failure
    failure: Option<String>,
}

impl HuntExecutor {
    pub fn new(
        execution: HuntExecution,
        definition: Arc<HuntDefinition>,
        graph: DependencyGraph,
        user: UserContext,
        store: Arc<dyn ExecutionStore>,
        notifier: Arc<ProgressNotifier>,
        runner: StepRunner,
    ) -> Self {
        Self {
            execution,
            definition,
            graph,
            user,
            store,
            notifier,
            runner,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution.id
    }

    /// Token that cancels this execution
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the hunt to a terminal status
    ///
    /// A store failure fails the execution with a generic system error.
    pub async fn run(self) -> HuntStatus {
        let execution_id = self.execution.id;
        let mut state = RunState::default();
        let mut in_flight: JoinSet<StepReport> = JoinSet::new();

        match self.drive(&mut state, &mut in_flight).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "execution store failed, aborting hunt");
                self.abort(&mut state, &mut in_flight).await;
                HuntStatus::Failed
            }
        }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        in_flight: &mut JoinSet<StepReport>,
    ) -> Result<HuntStatus, StoreError> {
        let execution_id = self.execution.id;
        let total = self.graph.len();

        self.store
            .update_execution_status(execution_id, HuntStatus::Running, None)
            .await?;
        tracing::info!(
            %execution_id,
            hunt = %self.definition.name,
            case_id = %self.execution.case_id,
            steps = total,
            "hunt started"
        );
        self.notifier
            .publish(HuntEvent::status(execution_id, HuntStatus::Running));

        let mut context = RuntimeContext::new(self.execution.initial_parameters.clone());

        loop {
            if state.failure.is_none() && !self.cancel.is_cancelled() {
                self.dispatch_ready(&context, state, in_flight).await?;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok(report) => self.handle_report(report, &mut context, state).await?,
                Err(e) => {
                    tracing::error!(%execution_id, error = %e, "step task ended abnormally");
                    state
                        .failure
                        .get_or_insert_with(|| format!("step task ended abnormally: {}", e));
                }
            }
        }

        // Records left running belong to tasks that never reported back
        let leftover: Vec<String> = state.running.keys().cloned().collect();
        for step_id in leftover {
            let Some(mut record) = state.running.remove(&step_id) else {
                continue;
            };
            record.error = Some("step task ended unexpectedly".to_string());
            record.finish(StepStatus::Failed);
            self.persist_finished(state, record).await?;
            state
                .failure
                .get_or_insert_with(|| format!("step '{}' ended unexpectedly", step_id));
        }

        let unscheduled: Vec<String> = self
            .definition
            .steps
            .iter()
            .map(|s| s.step_id.as_str())
            .filter(|id| !state.scheduled.contains(*id) && !state.skipped.contains(*id))
            .map(str::to_string)
            .collect();

        let canceled =
            self.cancel.is_cancelled() && (state.canceled > 0 || !unscheduled.is_empty());

        let status = if canceled {
            for step_id in &unscheduled {
                if let Some(step) = self.definition.get_step(step_id) {
                    self.store
                        .create_step(&HuntStep::never_started(
                            execution_id,
                            step,
                            StepStatus::Canceled,
                        ))
                        .await?;
                    state.skipped.insert(step_id.clone());
                }
            }
            HuntStatus::Canceled
        } else if state.failure.is_some() {
            HuntStatus::Failed
        } else {
            HuntStatus::Completed
        };

        self.store
            .update_execution_status(execution_id, status, Some(Utc::now()))
            .await?;

        let progress = Progress::new(state.completed.len(), total);
        let event = match status {
            HuntStatus::Canceled => HuntEvent::canceled(execution_id, progress),
            HuntStatus::Failed => HuntEvent::error(
                execution_id,
                state
                    .failure
                    .clone()
                    .unwrap_or_else(|| "hunt failed".to_string()),
            ),
            _ => HuntEvent::complete(execution_id, status, progress),
        };

        tracing::info!(%execution_id, %status, completed = state.completed.len(), total, "hunt finished");
        self.notifier.publish(event);

        Ok(status)
    }

    /// Launch every ready step that has not been dispatched yet
    async fn dispatch_ready(
        &self,
        context: &RuntimeContext,
        state: &mut RunState,
        in_flight: &mut JoinSet<StepReport>,
    ) -> Result<(), StoreError> {
        let execution_id = self.execution.id;
        let ready: Vec<String> = self
            .graph
            .ready(&state.completed, &state.scheduled)
            .into_iter()
            .map(str::to_string)
            .collect();

        for step_id in ready {
            let Some(step) = self.definition.get_step(&step_id) else {
                continue;
            };

            let record = HuntStep::started(execution_id, step);
            self.store.create_step(&record).await?;
            state.scheduled.insert(step_id.clone());
            state.running.insert(step_id.clone(), record);

            tracing::info!(%execution_id, step_id = %step_id, plugin = %step.plugin_name, "step dispatched");
            self.notifier.publish(HuntEvent::progress(
                execution_id,
                Progress::new(state.completed.len(), self.graph.len()),
                Some(step_id.clone()),
                format!("running {}", step.display_name),
            ));

            let namespace = context.namespace_for(step);
            let runner = self.runner.clone();
            let step = step.clone();
            let case_id = self.execution.case_id.clone();
            let user = self.user.clone();
            let cancel = self.cancel.clone();

            in_flight.spawn(async move {
                // Inner task so a panicking plugin still reports against its step
                let step_id = step.step_id.clone();
                let task = tokio::spawn(async move {
                    runner.run(&step, &namespace, &case_id, &user, &cancel).await
                });
                match task.await {
                    Ok(report) => report,
                    Err(e) => StepReport {
                        step_id,
                        resolved_parameters: Map::new(),
                        outcome: StepOutcome::Failed(StepError::Plugin(format!(
                            "step task failed: {}",
                            e
                        ))),
                    },
                }
            });
        }

        Ok(())
    }

    /// Persist a step outcome and apply the optional/required policy
    async fn handle_report(
        &self,
        report: StepReport,
        context: &mut RuntimeContext,
        state: &mut RunState,
    ) -> Result<(), StoreError> {
        let execution_id = self.execution.id;
        let total = self.graph.len();
        let step_id = report.step_id;

        let Some(mut record) = state.running.remove(&step_id) else {
            tracing::warn!(%execution_id, step_id = %step_id, "report for unknown step ignored");
            return Ok(());
        };
        let optional = self
            .definition
            .get_step(&step_id)
            .map(|s| s.optional)
            .unwrap_or(false);

        record.resolved_parameters = report.resolved_parameters;

        match report.outcome {
            StepOutcome::Completed(output) => {
                record.output = output.clone();
                record.finish(StepStatus::Completed);
                self.persist_finished(state, record).await?;

                context.record_output(step_id.clone(), output);
                state.completed.insert(step_id.clone());

                tracing::info!(%execution_id, step_id = %step_id, "step completed");
                self.notifier.publish(HuntEvent::step_complete(
                    execution_id,
                    step_id,
                    Progress::new(state.completed.len(), total),
                ));
            }
            StepOutcome::Failed(error) => {
                let message = error.to_string();
                record.error = Some(message.clone());
                record.finish(StepStatus::Failed);
                self.persist_finished(state, record).await?;

                // A failed optional step counts as done; a required failure does not
                if optional {
                    context.record_absent(step_id.clone());
                    state.completed.insert(step_id.clone());
                }

                self.notifier.publish(HuntEvent::step_failed(
                    execution_id,
                    step_id.clone(),
                    message.clone(),
                    optional,
                    Progress::new(state.completed.len(), total),
                ));

                if optional {
                    tracing::warn!(%execution_id, step_id = %step_id, error = %message, "optional step failed, continuing");
                } else {
                    tracing::error!(%execution_id, step_id = %step_id, error = %message, "required step failed");
                    if state.failure.is_none() {
                        let dependents = self.graph.dependents(&step_id);
                        state.failure = Some(if dependents.is_empty() {
                            format!("step '{}' failed: {}", step_id, message)
                        } else {
                            format!(
                                "step '{}' failed: {} (skipped: {})",
                                step_id,
                                message,
                                dependents.join(", ")
                            )
                        });
                        self.skip_unscheduled(state).await?;
                    }
                }
            }
            StepOutcome::Canceled => {
                record.error = Some("canceled".to_string());
                record.finish(StepStatus::Canceled);
                self.persist_finished(state, record).await?;
                state.canceled += 1;
                tracing::info!(%execution_id, step_id = %step_id, "step canceled");
            }
        }

        Ok(())
    }

    /// Write a step's final record; on failure it stays pending for [`Self::abort`]
    async fn persist_finished(&self, state: &mut RunState, record: HuntStep) -> Result<(), StoreError> {
        if let Err(e) = self.store.update_step(&record).await {
            state.running.insert(record.step_id.clone(), record);
            return Err(e);
        }
        Ok(())
    }

    /// Wind down after a store failure
    ///
    /// Cancels and drains in-flight steps, then makes a best-effort pass so every
    /// step ends with a final record and the execution is marked failed.
    async fn abort(&self, state: &mut RunState, in_flight: &mut JoinSet<StepReport>) {
        let execution_id = self.execution.id;
        self.cancel.cancel();

        while let Some(joined) = in_flight.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(%execution_id, error = %e, "step task ended abnormally");
                    continue;
                }
            };
            let Some(record) = state.running.get_mut(&report.step_id) else {
                continue;
            };
            record.resolved_parameters = report.resolved_parameters;
            match report.outcome {
                StepOutcome::Completed(output) => {
                    record.output = output;
                    record.finish(StepStatus::Completed);
                }
                StepOutcome::Failed(error) => {
                    record.error = Some(error.to_string());
                    record.finish(StepStatus::Failed);
                }
                StepOutcome::Canceled => {
                    record.error = Some("canceled".to_string());
                    record.finish(StepStatus::Canceled);
                }
            }
        }

        for (step_id, mut record) in state.running.drain() {
            if !record.status.is_terminal() {
                record.error = Some(SYSTEM_ERROR_MESSAGE.to_string());
                record.finish(StepStatus::Failed);
            }
            if let Err(e) = self.store.update_step(&record).await {
                tracing::error!(%execution_id, step_id = %step_id, error = %e, "could not record final step state");
            }
        }

        for step in &self.definition.steps {
            if state.scheduled.contains(&step.step_id) || state.skipped.contains(&step.step_id) {
                continue;
            }
            let record = HuntStep::never_started(execution_id, step, StepStatus::Skipped);
            match self.store.create_step(&record).await {
                Ok(()) => {
                    state.skipped.insert(step.step_id.clone());
                }
                Err(e) => {
                    tracing::error!(%execution_id, step_id = %step.step_id, error = %e, "could not record skipped step");
                }
            }
        }

        if let Err(e) = self
            .store
            .update_execution_status(execution_id, HuntStatus::Failed, Some(Utc::now()))
            .await
        {
            tracing::error!(%execution_id, error = %e, "could not record failed status");
        }
        self.notifier
            .publish(HuntEvent::error(execution_id, SYSTEM_ERROR_MESSAGE));
    }

    /// Record every never-dispatched step as skipped
    async fn skip_unscheduled(&self, state: &mut RunState) -> Result<(), StoreError> {
        let execution_id = self.execution.id;

        for step in &self.definition.steps {
            if state.scheduled.contains(&step.step_id) || state.skipped.contains(&step.step_id) {
                continue;
            }
            self.store
                .create_step(&HuntStep::never_started(
                    execution_id,
                    step,
                    StepStatus::Skipped,
                ))
                .await?;
            state.skipped.insert(step.step_id.clone());
            tracing::debug!(%execution_id, step_id = %step.step_id, "step skipped");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::EventKind;
    use crate::hunt::models::{ParameterSpec, ParameterType, StepDefinition};
    use crate::hunt::validation::validate_definition;
    use crate::plugins::{event_stream, InvocationContext, Plugin, PluginEvent, PluginEventStream, PluginRegistry};
    use crate::store::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Plugin that logs start/end, waits, then succeeds or fails
    struct Scripted {
        name: String,
        delay: Duration,
        fail: Option<String>,
        log: Log,
    }

    impl Scripted {
        fn ok(name: &str, delay_ms: u64, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                delay: Duration::from_millis(delay_ms),
                fail: None,
                log: log.clone(),
            }
        }

        fn failing(name: &str, delay_ms: u64, log: &Log) -> Self {
            Self {
                fail: Some(format!("{} exploded", name)),
                ..Self::ok(name, delay_ms, log)
            }
        }
    }

    #[async_trait::async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, params: Map<String, Value>, _: InvocationContext) -> PluginEventStream {
            self.log.lock().unwrap().push(format!("start {}", self.name));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("end {}", self.name));

            match &self.fail {
                Some(error) => event_stream(vec![PluginEvent::error(error.clone())]),
                None => event_stream(vec![PluginEvent::data(json!({
                    "plugin": self.name,
                    "params": params,
                }))]),
            }
        }
    }

    /// Memory store with injected step write failures
    struct BrokenStore {
        inner: MemoryStore,
        fail_creates: bool,
        fail_updates_of: Option<&'static str>,
    }

    impl BrokenStore {
        fn failing_creates() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_creates: true,
                fail_updates_of: None,
            }
        }

        fn failing_updates_of(step_id: &'static str) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_creates: false,
                fail_updates_of: Some(step_id),
            }
        }
    }

    fn disk_full() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    #[async_trait::async_trait]
    impl ExecutionStore for BrokenStore {
        async fn create_execution(&self, execution: &HuntExecution) -> crate::store::StoreResult<()> {
            self.inner.create_execution(execution).await
        }

        async fn update_execution_status(
            &self,
            execution_id: Uuid,
            status: HuntStatus,
            completed_at: Option<chrono::DateTime<Utc>>,
        ) -> crate::store::StoreResult<()> {
            self.inner
                .update_execution_status(execution_id, status, completed_at)
                .await
        }

        async fn get_execution(&self, execution_id: Uuid) -> crate::store::StoreResult<HuntExecution> {
            self.inner.get_execution(execution_id).await
        }

        async fn list_executions(&self, case_id: Option<&str>) -> crate::store::StoreResult<Vec<HuntExecution>> {
            self.inner.list_executions(case_id).await
        }

        async fn create_step(&self, step: &HuntStep) -> crate::store::StoreResult<()> {
            if self.fail_creates {
                return Err(disk_full());
            }
            self.inner.create_step(step).await
        }

        async fn update_step(&self, step: &HuntStep) -> crate::store::StoreResult<()> {
            if self.fail_updates_of == Some(step.step_id.as_str()) {
                return Err(disk_full());
            }
            self.inner.update_step(step).await
        }

        async fn list_steps(&self, execution_id: Uuid) -> crate::store::StoreResult<Vec<HuntStep>> {
            self.inner.list_steps(execution_id).await
        }
    }

    struct Harness {
        executor: HuntExecutor,
        store: Arc<dyn ExecutionStore>,
        notifier: Arc<ProgressNotifier>,
        execution_id: Uuid,
    }

    async fn harness(
        definition: HuntDefinition,
        registry: PluginRegistry,
        store: Arc<dyn ExecutionStore>,
    ) -> Harness {
        let graph = validate_definition(&definition).unwrap();
        let user = UserContext::new("u-1", "analyst");
        let mut initial = Map::new();
        initial.insert("domain".to_string(), json!("example.com"));
        let execution = HuntExecution::new(definition.name.clone(), "case-1", initial, &user);
        store.create_execution(&execution).await.unwrap();

        let notifier = Arc::new(ProgressNotifier::new());
        let execution_id = execution.id;
        let executor = HuntExecutor::new(
            execution,
            Arc::new(definition),
            graph,
            user,
            store.clone(),
            notifier.clone(),
            StepRunner::new(Arc::new(registry)),
        );

        Harness {
            executor,
            store,
            notifier,
            execution_id,
        }
    }

    fn diamond() -> HuntDefinition {
        HuntDefinition::new("diamond", "Diamond")
            .parameter(ParameterSpec::required("domain", ParameterType::String, "Target"))
            .step(StepDefinition::new("A", "a").map("domain", "initial.domain"))
            .step(StepDefinition::new("B", "b"))
            .step(
                StepDefinition::new("C", "c")
                    .map("from_a", "A.results[0].data.plugin")
                    .depends_on(["A", "B"]),
            )
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("'{}' not in {:?}", entry, log))
    }

    async fn statuses(store: &Arc<dyn ExecutionStore>, id: Uuid) -> HashMap<String, StepStatus> {
        store
            .list_steps(id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.step_id, s.status))
            .collect()
    }

    #[tokio::test]
    async fn test_join_waits_for_all_dependencies() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::ok("a", 30, &log)).unwrap();
        registry.register(Scripted::ok("b", 60, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let h = harness(diamond(), registry, Arc::new(MemoryStore::new())).await;
        let mut sub = h.notifier.subscribe(h.execution_id);

        assert_eq!(h.executor.run().await, HuntStatus::Completed);

        let log = log.lock().unwrap().clone();
        let start_c = position(&log, "start c");
        assert!(position(&log, "end a") < start_c);
        assert!(position(&log, "end b") < start_c);
        // A and B ran concurrently
        assert!(position(&log, "start b") < position(&log, "end a"));

        let steps = h.store.list_steps(h.execution_id).await.unwrap();
        let c = steps.iter().find(|s| s.step_id == "C").unwrap();
        assert_eq!(c.resolved_parameters["from_a"], json!("a"));
        assert!(steps.iter().all(|s| s.status == StepStatus::Completed));

        let execution = h.store.get_execution(h.execution_id).await.unwrap();
        assert_eq!(execution.status, HuntStatus::Completed);
        assert!(execution.completed_at.is_some());

        let mut kinds = Vec::new();
        while let Some(event) = sub.recv().await {
            kinds.push(event.kind_name());
        }
        assert_eq!(kinds.first(), Some(&"status"));
        assert_eq!(kinds.last(), Some(&"complete"));
        assert_eq!(kinds.iter().filter(|k| **k == "step_complete").count(), 3);
    }

    #[tokio::test]
    async fn test_required_failure_skips_dependents() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::failing("a", 0, &log)).unwrap();
        registry.register(Scripted::ok("b", 20, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let h = harness(diamond(), registry, Arc::new(MemoryStore::new())).await;
        let mut sub = h.notifier.subscribe(h.execution_id);

        assert_eq!(h.executor.run().await, HuntStatus::Failed);

        let statuses = statuses(&h.store, h.execution_id).await;
        assert_eq!(statuses["A"], StepStatus::Failed);
        assert_eq!(statuses["B"], StepStatus::Completed);
        assert_eq!(statuses["C"], StepStatus::Skipped);
        assert!(!log.lock().unwrap().contains(&"start c".to_string()));

        let mut last = None;
        while let Some(event) = sub.recv().await {
            last = Some(event);
        }
        match last.map(|e| e.kind) {
            Some(EventKind::Error { error }) => {
                assert!(error.contains("step 'A' failed"));
                assert!(error.contains("skipped: C"));
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_optional_failure_exposes_null_output() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::failing("probe", 0, &log)).unwrap();
        registry.register(Scripted::ok("report", 0, &log)).unwrap();

        let definition = HuntDefinition::new("optional", "Optional")
            .step(StepDefinition::new("probe", "probe").optional())
            .step(
                StepDefinition::new("report", "report")
                    .map("probe", "probe")
                    .depends_on(["probe"]),
            );

        let h = harness(definition, registry, Arc::new(MemoryStore::new())).await;
        assert_eq!(h.executor.run().await, HuntStatus::Completed);

        let steps = h.store.list_steps(h.execution_id).await.unwrap();
        let probe = steps.iter().find(|s| s.step_id == "probe").unwrap();
        assert_eq!(probe.status, StepStatus::Failed);
        assert_eq!(probe.error.as_deref(), Some("plugin error: probe exploded"));

        let report = steps.iter().find(|s| s.step_id == "report").unwrap();
        assert_eq!(report.status, StepStatus::Completed);
        assert_eq!(report.resolved_parameters["probe"], Value::Null);
    }

    #[tokio::test]
    async fn test_cancel_marks_running_and_pending_steps() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::ok("a", 60_000, &log)).unwrap();
        registry.register(Scripted::ok("b", 0, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let h = harness(diamond(), registry, Arc::new(MemoryStore::new())).await;
        let cancel = h.executor.cancel_token();
        let mut sub = h.notifier.subscribe(h.execution_id);
        let handle = tokio::spawn(h.executor.run());

        // wait until B completed, so A is in flight and C is blocked
        while let Some(event) = sub.recv().await {
            if matches!(event.kind, EventKind::StepComplete { ref step_id, .. } if step_id == "B") {
                break;
            }
        }
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), HuntStatus::Canceled);
        let statuses = statuses(&h.store, h.execution_id).await;
        assert_eq!(statuses["A"], StepStatus::Canceled);
        assert_eq!(statuses["B"], StepStatus::Completed);
        assert_eq!(statuses["C"], StepStatus::Canceled);

        let last = sub.recv().await.unwrap();
        assert_eq!(last.kind_name(), "canceled");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_fails_execution() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::ok("a", 0, &log)).unwrap();
        registry.register(Scripted::ok("b", 0, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(BrokenStore::failing_creates());
        let h = harness(diamond(), registry, store).await;
        let mut sub = h.notifier.subscribe(h.execution_id);

        assert_eq!(h.executor.run().await, HuntStatus::Failed);
        assert_eq!(
            h.store.get_execution(h.execution_id).await.unwrap().status,
            HuntStatus::Failed
        );

        let mut last = None;
        while let Some(event) = sub.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last.map(|e| e.kind),
            Some(EventKind::Error {
                error: SYSTEM_ERROR_MESSAGE.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_step_write_failure_finalizes_remaining_records() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::ok("a", 200, &log)).unwrap();
        registry.register(Scripted::ok("b", 0, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(BrokenStore::failing_updates_of("B"));
        let h = harness(diamond(), registry, store).await;
        let mut sub = h.notifier.subscribe(h.execution_id);

        assert_eq!(h.executor.run().await, HuntStatus::Failed);
        assert_eq!(
            h.store.get_execution(h.execution_id).await.unwrap().status,
            HuntStatus::Failed
        );

        // A was in flight when B's write failed; C never ran
        let statuses = statuses(&h.store, h.execution_id).await;
        assert_eq!(statuses.len(), 3);
        assert!(statuses["A"].is_terminal(), "A left {:?}", statuses["A"]);
        assert_eq!(statuses["C"], StepStatus::Skipped);
        assert!(!log.lock().unwrap().contains(&"start c".to_string()));

        let mut last = None;
        while let Some(event) = sub.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last.map(|e| e.kind),
            Some(EventKind::Error {
                error: SYSTEM_ERROR_MESSAGE.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_progress_counts_only_completed_steps() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Scripted::failing("a", 0, &log)).unwrap();
        registry.register(Scripted::ok("b", 20, &log)).unwrap();
        registry.register(Scripted::ok("c", 0, &log)).unwrap();

        let h = harness(diamond(), registry, Arc::new(MemoryStore::new())).await;
        let mut sub = h.notifier.subscribe(h.execution_id);
        assert_eq!(h.executor.run().await, HuntStatus::Failed);

        let mut seen = Vec::new();
        while let Some(event) = sub.recv().await {
            match event.kind {
                EventKind::StepFailed { step_id, progress, .. } => seen.push((step_id, progress)),
                EventKind::StepComplete { step_id, progress } => seen.push((step_id, progress)),
                _ => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                ("A".to_string(), Progress::new(0, 3)),
                ("B".to_string(), Progress::new(1, 3)),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_hunt_completes() {
        let h = harness(
            HuntDefinition::new("empty", "Empty"),
            PluginRegistry::new(),
            Arc::new(MemoryStore::new()),
        )
        .await;
        assert_eq!(h.executor.run().await, HuntStatus::Completed);
    }
}
