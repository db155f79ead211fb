// Service Error Types
// Top-level errors returned by hunt submission and inspection

use crate::config::ConfigError;
use crate::execution::graph::DefinitionError;
use crate::hunt::models::HuntStatus;
use crate::hunt::validation::ParameterValidationError;
use crate::plugins::RegistryError;
use crate::store::StoreError;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    ParameterValidation(#[from] ParameterValidationError),

    #[error("unknown hunt '{0}'")]
    UnknownHunt(String),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("execution {id} cannot be canceled while {status}")]
    NotCancelable { id: Uuid, status: HuntStatus },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::ExecutionNotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_execution_maps_to_not_found() {
        let id = Uuid::new_v4();
        let err: ServiceError = StoreError::NotFound(id).into();
        assert!(matches!(err, ServiceError::ExecutionNotFound(found) if found == id));
    }

    #[test]
    fn test_not_cancelable_message() {
        let id = Uuid::nil();
        let err = ServiceError::NotCancelable {
            id,
            status: HuntStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "execution 00000000-0000-0000-0000-000000000000 cannot be canceled while completed"
        );
    }
}
