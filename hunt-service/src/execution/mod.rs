// Execution Engine Module
// Dependency graph, step runner, hunt executor and progress fan-out

pub mod context;
pub mod events;
pub mod executor;
pub mod graph;
pub mod notifier;
pub mod runner;

// Re-export key types
pub use context::RuntimeContext;
pub use events::{progress_channel, EventKind, HuntEvent, Progress, ProgressReceiver, ProgressSender};
pub use executor::{HuntExecutor, SYSTEM_ERROR_MESSAGE};
pub use graph::{DefinitionError, DefinitionErrorKind, DependencyGraph, StepNode};
pub use notifier::{ProgressNotifier, Subscription};
pub use runner::{StepError, StepOutcome, StepReport, StepRunner, DEFAULT_STEP_TIMEOUT};
