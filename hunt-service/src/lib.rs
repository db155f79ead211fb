// Hunt Service Library
// Execution engine for declarative multi-step OSINT hunts

pub mod config;
pub mod error;
pub mod execution;
pub mod hunt;
pub mod plugins;
pub mod resolver;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

pub use config::{ConfigError, EngineConfig, StoreConfig};

pub use service::{build_registry, HuntService};

// Re-export hunt types
pub use hunt::{
    HuntCatalog, HuntDefinition, HuntExecution, HuntStatus, HuntStep, ParameterSpec,
    ParameterType, StepDefinition, StepStatus, UserContext,
};

// Re-export execution types
pub use execution::{
    DefinitionError, DefinitionErrorKind, DependencyGraph, EventKind, HuntEvent, HuntExecutor,
    Progress, ProgressNotifier, StepRunner, Subscription,
};

// Re-export plugin types
pub use plugins::{
    CommandPlugin, CommandSpec, EchoPlugin, InvocationContext, Plugin, PluginEvent,
    PluginEventStream, PluginInvoker, PluginRegistry,
};

// Re-export resolver and store types
pub use resolver::{ParameterResolver, ResolutionError};
pub use store::{ExecutionStore, JsonFileStore, MemoryStore, StoreError};
