//! Thread Context Providers
//!
//! This module defines the provider contract and ships the built-in
//! context categories. Third-party categories implement the same
//! [`ContextProvider`] trait and reach the registry through a
//! [`ProviderDiscovery`] at start-up.
//!
//! # Built-in Providers
//!
//! - **Naming**: lookup namespace of the application component
//! - **ClassResolution**: loader used to resolve component classes
//! - **Security**: authenticated caller principal
//! - **Transaction**: active transaction
//!
//! # Architecture
//!
//! Each built-in keeps its ambient value in a thread-local
//! [`ambient::AmbientCell`] and is exposed through an
//! [`ambient::AmbientProvider`]. Application code reads and scopes the
//! values through the module functions (`security::run_as`,
//! `naming::lookup`, ...); the engine only reaches them through the
//! provider trait.

pub mod ambient;
pub mod class_resolution;
pub mod naming;
pub mod security;
pub mod traits;
pub mod transaction;

pub use traits::{
    ContextProvider, ContextState, ProviderDiscovery, ProviderError, ProviderResult,
    RestoreHandle,
};

#[cfg(test)]
pub use traits::MockContextProvider;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run one provider call, turning a panic into a provider error
pub(crate) fn guarded<T>(call: impl FnOnce() -> ProviderResult<T>) -> ProviderResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(&*payload))))
}

/// The built-in providers, in registration order
pub fn builtin_providers() -> Vec<Arc<dyn ContextProvider>> {
    vec![
        Arc::new(naming::provider()),
        Arc::new(class_resolution::provider()),
        Arc::new(security::provider()),
        Arc::new(transaction::provider()),
    ]
}

/// Discovery source yielding the built-in providers
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinProviders;

impl ProviderDiscovery for BuiltinProviders {
    fn discover(&self) -> Vec<Arc<dyn ContextProvider>> {
        builtin_providers()
    }
}
