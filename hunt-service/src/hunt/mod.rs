// Hunt Module
// Hunt definitions, records, validation and the built-in catalog

pub mod builtin;
pub mod catalog;
pub mod models;
pub mod validation;

// Re-export key types
pub use catalog::{CatalogEntry, HuntCatalog};
pub use models::{
    HuntDefinition, HuntExecution, HuntStatus, HuntStep, ParameterSpec, ParameterType,
    StepDefinition, StepStatus, UserContext,
};
pub use validation::{
    validate_definition, validate_parameters, ParameterProblem, ParameterValidationError,
};
