//! Core traits for thread context providers
//!
//! This module defines the contract every context category implements,
//! whether it ships with the engine or is registered by a third party.
//! The engine never touches ambient state itself; it only drives these
//! four operations in the order defined by the task protocol.

use crate::context_type::ContextType;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by an individual provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The captured state or restore handle is not of the provider's type
    #[error("Invalid state: expected {expected}")]
    InvalidState { expected: &'static str },

    /// A restore handle was used out of stack order
    #[error("Restore out of order: current depth {current}, handle depth {handle}")]
    OutOfOrder { current: u64, handle: u64 },

    /// The ambient state is not reachable from this thread
    #[error("Provider not available: {0}")]
    Unavailable(String),

    /// A name could not be resolved in the current scope
    #[error("Not found: {scope}/{name}")]
    NotFound { scope: String, name: String },

    /// The provider panicked while being driven by the engine
    #[error("Provider panicked: {0}")]
    Panicked(String),

    /// Generic provider error
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Captured ambient value of one category
///
/// Opaque to the engine. Immutable and shared, so one snapshot can back
/// any number of executions on any number of threads.
#[derive(Clone)]
pub struct ContextState {
    value: Arc<dyn Any + Send + Sync>,
}

impl ContextState {
    /// Wrap a captured value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Borrow the captured value if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Borrow the captured value, failing with `InvalidState` on a type mismatch
    pub fn get<T: Any>(&self) -> ProviderResult<&T> {
        self.downcast_ref::<T>().ok_or(ProviderError::InvalidState {
            expected: type_name::<T>(),
        })
    }
}

impl fmt::Debug for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextState").finish_non_exhaustive()
    }
}

/// Token that undoes exactly one `apply` or `clear` on the current thread
///
/// Handles never leave the thread that produced them.
pub struct RestoreHandle {
    token: Box<dyn Any>,
}

impl RestoreHandle {
    /// Wrap a provider-specific undo token
    pub fn new<T: Any>(token: T) -> Self {
        Self {
            token: Box::new(token),
        }
    }

    /// Recover the provider-specific token
    pub fn into_inner<T: Any>(self) -> ProviderResult<T> {
        self.token
            .downcast::<T>()
            .map(|token| *token)
            .map_err(|_| ProviderError::InvalidState {
                expected: type_name::<T>(),
            })
    }
}

impl fmt::Debug for RestoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreHandle").finish_non_exhaustive()
    }
}

/// Capability set of one context category
///
/// # Contract
///
/// * `capture` only reads the calling thread's ambient value.
/// * `apply` and `clear` install a value on the calling thread and return
///   a handle that undoes precisely that change.
/// * `restore` consumes one handle. Handles from one thread are restored in
///   the reverse order they were produced.
///
/// State mutated by `apply`, `clear` and `restore` must be thread-local:
/// no other thread may observe it.
#[cfg_attr(test, mockall::automock)]
pub trait ContextProvider: Send + Sync + fmt::Debug {
    /// The category this provider manages
    fn context_type(&self) -> ContextType;

    /// Whether the category has a meaningful cleared state
    ///
    /// Categories without one default to unchanged when a definition does
    /// not mention them.
    fn has_default(&self) -> bool {
        true
    }

    /// Read the ambient value from the current thread
    fn capture(&self) -> ProviderResult<ContextState>;

    /// Install a captured value on the current thread
    fn apply(&self, state: &ContextState) -> ProviderResult<RestoreHandle>;

    /// Install the category's cleared value on the current thread
    fn clear(&self) -> ProviderResult<RestoreHandle>;

    /// Undo one prior `apply` or `clear` on the current thread
    fn restore(&self, handle: RestoreHandle) -> ProviderResult<()>;
}

/// Source of third-party providers handed to the registry at start-up
pub trait ProviderDiscovery {
    /// Providers to register, in registration order
    fn discover(&self) -> Vec<Arc<dyn ContextProvider>>;
}
