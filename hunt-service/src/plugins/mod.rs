// Plugins Module
// The plugin abstraction hunts invoke by name, and the registry that resolves names

pub mod command;
pub mod echo;

// Re-export key types
pub use command::{CommandPlugin, CommandSpec};
pub use echo::EchoPlugin;

use crate::hunt::models::UserContext;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// One event emitted by a running plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PluginEvent {
    /// Informational progress message
    Status(Value),
    /// A result record
    Data(Value),
    /// Terminal failure; the invocation produced no usable result
    Error(String),
}

impl PluginEvent {
    pub fn status(message: impl Into<Value>) -> Self {
        PluginEvent::Status(message.into())
    }

    pub fn data(payload: impl Into<Value>) -> Self {
        PluginEvent::Data(payload.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        PluginEvent::Error(message.into())
    }
}

/// Finite, non-restartable sequence of plugin events
pub type PluginEventStream = Pin<Box<dyn Stream<Item = PluginEvent> + Send>>;

/// Build a stream from events that are already known
pub fn event_stream(events: Vec<PluginEvent>) -> PluginEventStream {
    Box::pin(tokio_stream::iter(events))
}

/// Context handed to a plugin for one invocation
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub case_id: String,
    pub user: UserContext,
    /// Cancelled when the step times out or the hunt is canceled
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(case_id: impl Into<String>, user: UserContext, cancel: CancellationToken) -> Self {
        Self {
            case_id: case_id.into(),
            user,
            cancel,
        }
    }
}

/// A runnable OSINT capability
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Name hunts use to reference the plugin
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Start the plugin and return its event stream
    async fn invoke(
        &self,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> PluginEventStream;
}

/// Failure to start a plugin invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),
}

/// Resolves a plugin name and starts an invocation
#[async_trait::async_trait]
pub trait PluginInvoker: Send + Sync {
    async fn invoke(
        &self,
        plugin_name: &str,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> Result<PluginEventStream, InvokeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is already registered")]
    Duplicate(String),
}

/// Plugin registry: name -> plugin
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name
    pub fn register(&mut self, plugin: impl Plugin + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[async_trait::async_trait]
impl PluginInvoker for PluginRegistry {
    async fn invoke(
        &self,
        plugin_name: &str,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> Result<PluginEventStream, InvokeError> {
        let plugin = self
            .get(plugin_name)
            .ok_or_else(|| InvokeError::UnknownPlugin(plugin_name.to_string()))?;

        tracing::debug!(plugin = plugin_name, case_id = %context.case_id, "invoking plugin");
        Ok(plugin.invoke(parameters, context).await)
    }
}
