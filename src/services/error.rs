//! Error type shared by the services

use std::fmt;

use crate::model::ValidationError;
use crate::storage::StorageError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    /// The payload failed validation
    Validation(ValidationError),

    NotFound(String),

    /// A unique value or a held lock rejected the write
    Conflict(String),

    /// Missing or unusable credentials
    Unauthorized(String),

    /// Valid credentials, but the resource is not available to them
    Forbidden(String),

    /// Any other storage failure
    Storage(StorageError),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        ServiceError::NotFound(format!("{entity} {id} not found"))
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Validation(ValidationError::new(field, message))
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Validation(err) => write!(f, "{}", err),
            ServiceError::NotFound(msg) => write!(f, "{}", msg),
            ServiceError::Conflict(msg) => write!(f, "{}", msg),
            ServiceError::Unauthorized(msg) => write!(f, "{}", msg),
            ServiceError::Forbidden(msg) => write!(f, "{}", msg),
            ServiceError::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Validation(err) => Some(err),
            ServiceError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err)
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => ServiceError::not_found(entity, id),
            StorageError::Conflict(msg) => ServiceError::Conflict(msg),
            StorageError::InvalidReference(_) => {
                ServiceError::invalid("", "a referenced record does not exist")
            }
            other => ServiceError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_storage_errors_map_to_service_errors() {
        let err: ServiceError = StorageError::NotFound { entity: "Agent", id: 4 }.into();
        assert_matches!(err, ServiceError::NotFound(ref msg) if msg == "Agent 4 not found");

        let err: ServiceError = StorageError::Conflict("taken".to_string()).into();
        assert_matches!(err, ServiceError::Conflict(_));

        let err: ServiceError =
            StorageError::InvalidReference("FOREIGN KEY constraint failed".to_string()).into();
        assert_matches!(err, ServiceError::Validation(_));
        assert_eq!(err.to_string(), "a referenced record does not exist");

        let err: ServiceError = StorageError::QueryFailed("boom".to_string()).into();
        assert_matches!(err, ServiceError::Storage(_));
    }
}
