//! Error types for the propagation engine
//!
//! Registry, definition and resolution errors surface when a service is
//! built or a task is contextualized. Apply and restore errors surface when a
//! contextual task runs.

use crate::context_type::ContextType;
use crate::providers::ProviderError;
use std::fmt;
use thiserror::Error;

/// A provider that could not undo its part of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    /// Category whose restore failed
    pub context_type: ContextType,
    /// Provider error message
    pub reason: String,
}

impl RestoreFailure {
    pub fn new(context_type: ContextType, error: &ProviderError) -> Self {
        Self {
            context_type,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context_type, self.reason)
    }
}

fn join_failures(failures: &[RestoreFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for context operations
#[derive(Error, Debug)]
pub enum ContextError {
    /// A provider was registered for a category that already has one
    #[error("Duplicate context type: {0}")]
    DuplicateCategory(ContextType),

    /// A provider could not read the ambient state of the capturing thread
    #[error("Failed to capture {category} context: {reason}")]
    CaptureFailed {
        category: ContextType,
        reason: String,
    },

    /// A category was listed under more than one policy
    #[error("Context type {category} is configured with more than one policy")]
    ConflictingPolicy { category: String },

    /// A provider could not install state on the worker thread
    ///
    /// `rollback` holds failures from undoing the providers that had
    /// already been applied.
    #[error("Failed to apply {category} context: {reason}")]
    ApplyFailed {
        category: ContextType,
        reason: String,
        rollback: Vec<RestoreFailure>,
    },

    /// One or more providers could not restore the worker thread's state
    #[error("Failed to restore {} context type(s): {}", .failures.len(), join_failures(.failures))]
    RestoreFailed { failures: Vec<RestoreFailure> },

    /// A dependent stage's action panicked; its context was restored
    #[error("Stage action panicked: {reason}")]
    StageFailed { reason: String },

    /// No context service definition with this name
    #[error("Unknown context service definition: {0}")]
    UnknownDefinition(String),

    /// Two definitions share a name
    #[error("Duplicate context service definition: {0}")]
    DuplicateDefinition(String),

    /// Definition parsing or format error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error reading a definition file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContextError {
    /// Create a capture error for a category
    pub fn capture_failed(category: &ContextType, error: &ProviderError) -> Self {
        ContextError::CaptureFailed {
            category: category.clone(),
            reason: error.to_string(),
        }
    }

    /// Create an apply error for a category
    pub fn apply_failed(
        category: &ContextType,
        error: &ProviderError,
        rollback: Vec<RestoreFailure>,
    ) -> Self {
        ContextError::ApplyFailed {
            category: category.clone(),
            reason: error.to_string(),
            rollback,
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        ContextError::Configuration(msg.into())
    }

    /// Check if this error comes from configuration rather than execution
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ContextError::DuplicateCategory(_)
                | ContextError::ConflictingPolicy { .. }
                | ContextError::UnknownDefinition(_)
                | ContextError::DuplicateDefinition(_)
                | ContextError::Configuration(_)
        )
    }

    /// Restore failures carried by this error, if any
    pub fn restore_failures(&self) -> &[RestoreFailure] {
        match self {
            ContextError::ApplyFailed { rollback, .. } => rollback,
            ContextError::RestoreFailed { failures } => failures,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::Configuration(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ContextError {
    fn from(err: serde_yaml::Error) -> Self {
        ContextError::Configuration(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for ContextError {
    fn from(err: toml::de::Error) -> Self {
        ContextError::Configuration(format!("TOML error: {}", err))
    }
}

/// Result type alias for context operations
pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Failure of a contextual task whose work itself returns a `Result`
///
/// Keeps the work's own error intact and never hides restore failures
/// behind it.
#[derive(Error, Debug)]
pub enum TaskError<E> {
    /// The context could not be applied, or restored after successful work
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The work failed; every provider was restored
    #[error("Task failed: {0}")]
    Work(E),

    /// The work failed and some providers could not be restored
    #[error("Task failed: {error} ({} restore failure(s): {})", .restore.len(), join_failures(.restore))]
    WorkAndRestore {
        error: E,
        restore: Vec<RestoreFailure>,
    },
}

impl<E> TaskError<E> {
    /// The work's own error, if the work ran and failed
    pub fn work_error(&self) -> Option<&E> {
        match self {
            TaskError::Work(error) | TaskError::WorkAndRestore { error, .. } => Some(error),
            TaskError::Context(_) => None,
        }
    }

    /// Consume the error, returning the work's own error if there is one
    pub fn into_work_error(self) -> Option<E> {
        match self {
            TaskError::Work(error) | TaskError::WorkAndRestore { error, .. } => Some(error),
            TaskError::Context(_) => None,
        }
    }
}
