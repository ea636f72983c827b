//! Application-level errors (wraps domain and infrastructure errors)

use thiserror::Error;

use crate::domain::{DomainError, ErrorCategory};
use crate::infrastructure::InfraError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Infra(InfraError),

    #[error("config error: {message}")]
    Config { message: String },
}

/// Domain failures raised inside the store surface as domain errors.
impl From<InfraError> for ApplicationError {
    fn from(e: InfraError) -> Self {
        match e {
            InfraError::Domain(inner) => ApplicationError::Domain(inner),
            other => ApplicationError::Infra(other),
        }
    }
}

impl ApplicationError {
    /// Domain category, if this error carries one.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ApplicationError::Domain(e) => Some(e.category()),
            ApplicationError::Config { .. } => Some(ErrorCategory::Configuration),
            ApplicationError::Infra(_) => None,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
