//! Error types for the threadctx CLI
//!
//! Commands propagate `anyhow::Error`; these are the classified failures
//! the exit code is derived from.

use thiserror::Error;
use threadctx_core::ContextError;

/// Classified CLI failure
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// The demonstration scenario did not behave as configured
    #[error("Demo failed: {0}")]
    DemoFailed(String),
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    pub fn file_error(msg: impl Into<String>) -> Self {
        CliError::FileError(msg.into())
    }
}

/// Failure categories, in exit-code terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    File,
    Internal,
}

/// Classify an error chain
pub fn classify(err: &anyhow::Error) -> FailureKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CliError>() {
            return match e {
                CliError::InvalidInput(_) => FailureKind::InvalidInput,
                CliError::FileError(_) => FailureKind::File,
                CliError::DemoFailed(_) => FailureKind::Internal,
            };
        }
        if let Some(e) = cause.downcast_ref::<ContextError>() {
            return match e {
                ContextError::Io(_) => FailureKind::File,
                e if e.is_configuration_error() => FailureKind::InvalidInput,
                _ => FailureKind::Internal,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return FailureKind::File;
        }
    }
    FailureKind::Internal
}
