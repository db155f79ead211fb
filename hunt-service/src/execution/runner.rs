// Step Runner
// Executes a single hunt step: resolve parameters, invoke the plugin, enforce the timeout

use crate::hunt::models::{StepDefinition, UserContext};
use crate::plugins::{InvocationContext, InvokeError, PluginEvent, PluginInvoker};
use crate::resolver::{Namespace, ParameterResolver, ResolutionError};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Timeout applied to steps that do not set their own
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("step timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Classified result of one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Collected output: `{"results": [...], "messages": [...]}`
    Completed(Value),
    Failed(StepError),
    /// The hunt was canceled while the step ran
    Canceled,
}

/// What the runner reports back to the controller
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step_id: String,
    pub resolved_parameters: Map<String, Value>,
    pub outcome: StepOutcome,
}

/// Runs individual steps against a plugin invoker
///
/// The runner never decides whether a failure aborts the hunt; that is the
/// controller's call.
#[derive(Clone)]
pub struct StepRunner {
    invoker: Arc<dyn PluginInvoker>,
    default_timeout: Duration,
}

impl StepRunner {
    pub fn new(invoker: Arc<dyn PluginInvoker>) -> Self {
        Self {
            invoker,
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Effective timeout for a step
    pub fn timeout_for(&self, step: &StepDefinition) -> Duration {
        step.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Execute one step
    ///
    /// `cancel` is the execution's token; the plugin gets a child token that is
    /// also cancelled on timeout and once the step is over.
    pub async fn run(
        &self,
        step: &StepDefinition,
        namespace: &Namespace,
        case_id: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> StepReport {
        let resolved = match ParameterResolver::new(namespace).resolve_mapping(&step.parameter_mapping)
        {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(step_id = %step.step_id, error = %e, "parameter resolution failed");
                return StepReport {
                    step_id: step.step_id.clone(),
                    resolved_parameters: Map::new(),
                    outcome: StepOutcome::Failed(e.into()),
                };
            }
        };

        let timeout = self.timeout_for(step);
        let invocation = cancel.child_token();
        let context = InvocationContext::new(case_id, user.clone(), invocation.clone());

        tracing::debug!(
            step_id = %step.step_id,
            plugin = %step.plugin_name,
            timeout_secs = timeout.as_secs(),
            "running step"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => StepOutcome::Canceled,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(step_id = %step.step_id, timeout_secs = timeout.as_secs(), "step timed out");
                StepOutcome::Failed(StepError::Timeout(timeout))
            }
            outcome = self.invoke(&step.plugin_name, resolved.clone(), context) => outcome,
        };

        // Stop the plugin whatever the outcome was
        invocation.cancel();

        StepReport {
            step_id: step.step_id.clone(),
            resolved_parameters: resolved,
            outcome,
        }
    }

    /// Invoke the plugin and fold its events into an outcome
    async fn invoke(
        &self,
        plugin_name: &str,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> StepOutcome {
        let mut stream = match self.invoker.invoke(plugin_name, parameters, context).await {
            Ok(stream) => stream,
            Err(InvokeError::UnknownPlugin(name)) => {
                return StepOutcome::Failed(StepError::UnknownPlugin(name))
            }
        };

        let mut results = Vec::new();
        let mut messages = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                PluginEvent::Status(message) => messages.push(message),
                PluginEvent::Data(data) => results.push(json!({ "type": "data", "data": data })),
                PluginEvent::Error(error) => return StepOutcome::Failed(StepError::Plugin(error)),
            }
        }

        StepOutcome::Completed(json!({ "results": results, "messages": messages }))
    }
}
