//! Class resolution scope context
//!
//! Which loader a thread resolves component classes through. Every thread
//! starts in, and is cleared back to, the system scope, which only sees
//! classes shared by all components.

use super::ambient::{AmbientCell, AmbientProvider};
use super::traits::{ProviderError, ProviderResult};
use crate::context_type::ContextType;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Name of the loader every thread starts with
pub const SYSTEM_LOADER: &str = "system";

/// A loader and the set of classes visible through it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassResolutionScope {
    loader: Arc<str>,
    visible: Arc<BTreeSet<String>>,
}

impl ClassResolutionScope {
    /// Create a scope for a loader with no visible classes
    pub fn new(loader: impl Into<Arc<str>>) -> Self {
        Self {
            loader: loader.into(),
            visible: Arc::new(BTreeSet::new()),
        }
    }

    /// The scope shared by all components
    pub fn system() -> Self {
        Self::new(SYSTEM_LOADER)
    }

    /// Make a class visible through this scope (builder pattern)
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.visible).insert(class.into());
        self
    }

    /// Loader name
    pub fn loader(&self) -> &str {
        &self.loader
    }

    /// Whether this is the system scope
    pub fn is_system(&self) -> bool {
        &*self.loader == SYSTEM_LOADER
    }

    /// Resolve a class, returning its loader-qualified name
    pub fn resolve(&self, class: &str) -> ProviderResult<String> {
        if self.visible.contains(class) {
            Ok(format!("{}:{}", self.loader, class))
        } else {
            Err(ProviderError::NotFound {
                scope: self.loader.to_string(),
                name: class.to_string(),
            })
        }
    }
}

impl Default for ClassResolutionScope {
    fn default() -> Self {
        Self::system()
    }
}

thread_local! {
    static CURRENT: AmbientCell<ClassResolutionScope> = AmbientCell::new(ClassResolutionScope::system());
}

/// Provider for [`ContextType::CLASS_RESOLUTION`]
pub fn provider() -> AmbientProvider<ClassResolutionScope> {
    AmbientProvider::new(
        ContextType::CLASS_RESOLUTION,
        &CURRENT,
        ClassResolutionScope::system,
    )
}

/// The current thread's class resolution scope
pub fn current() -> ClassResolutionScope {
    CURRENT.with(|cell| cell.get())
}

/// Replace the current thread's class resolution scope
pub fn set_current(scope: ClassResolutionScope) {
    CURRENT.with(|cell| cell.set(scope));
}

/// Run `f` resolving classes through `scope`
pub fn run_in_scope<R>(scope: ClassResolutionScope, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|cell| cell.scoped(scope, f))
}

/// Resolve a class through the current thread's scope
pub fn load_class(class: &str) -> ProviderResult<String> {
    CURRENT.with(|cell| cell.with(|scope| scope.resolve(class)))
}
