//! CLI-level errors (wraps application errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::ErrorCategory;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Application(#[from] ApplicationError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<InfraError> for CliError {
    fn from(e: InfraError) -> Self {
        CliError::Application(e.into())
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => crate::exitcode::USAGE,
            CliError::Application(e) => match e.category() {
                Some(ErrorCategory::Validation) => crate::exitcode::DATAERR,
                Some(ErrorCategory::NotFound) => crate::exitcode::NOINPUT,
                Some(ErrorCategory::Configuration) => crate::exitcode::CONFIG,
                Some(ErrorCategory::Structural) => crate::exitcode::SOFTWARE,
                None => match e {
                    ApplicationError::Infra(InfraError::Io { .. }) => crate::exitcode::IOERR,
                    _ => crate::exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use rstest::rstest;

    #[rstest]
    #[case(DomainError::BoundaryNotFound { group: 1, boundary: 9 }, crate::exitcode::DATAERR)]
    #[case(DomainError::NodeNotFound(4), crate::exitcode::NOINPUT)]
    #[case(DomainError::NoRoot { group: 1 }, crate::exitcode::SOFTWARE)]
    #[case(
        DomainError::NotTreeCapable { entity: "x".into(), reason: "y".into() },
        crate::exitcode::CONFIG
    )]
    fn given_domain_error_when_mapping_exit_code_then_follows_category(
        #[case] error: DomainError,
        #[case] expected: i32,
    ) {
        let err = CliError::from(ApplicationError::from(error));
        assert_eq!(err.exit_code(), expected);
    }

    #[test]
    fn given_usage_error_when_mapping_exit_code_then_usage() {
        assert_eq!(
            CliError::Usage("nothing to do".into()).exit_code(),
            crate::exitcode::USAGE
        );
    }
}
