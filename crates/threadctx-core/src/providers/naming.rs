//! Naming scope context
//!
//! The lookup namespace of the application component a thread is working
//! for. Names bound in the component's environment are only resolvable while
//! its scope is current; a cleared thread has no scope at all.

use super::ambient::{AmbientCell, AmbientProvider};
use super::traits::{ProviderError, ProviderResult};
use crate::context_type::ContextType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lookup namespace of one application component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScope {
    component: Arc<str>,
    bindings: Arc<BTreeMap<String, String>>,
}

impl NamingScope {
    /// Create an empty scope for a component
    pub fn new(component: impl Into<Arc<str>>) -> Self {
        Self {
            component: component.into(),
            bindings: Arc::new(BTreeMap::new()),
        }
    }

    /// Add a binding (builder pattern)
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.bindings).insert(name.into(), value.into());
        self
    }

    /// Name of the owning component
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Resolve a name within this scope
    pub fn lookup(&self, name: &str) -> ProviderResult<&str> {
        self.bindings
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ProviderError::NotFound {
                scope: self.component.to_string(),
                name: name.to_string(),
            })
    }
}

thread_local! {
    static CURRENT: AmbientCell<Option<NamingScope>> = AmbientCell::new(None);
}

/// Provider for [`ContextType::NAMING`]
pub fn provider() -> AmbientProvider<Option<NamingScope>> {
    AmbientProvider::new(ContextType::NAMING, &CURRENT, || None)
}

/// The current thread's naming scope
pub fn current() -> Option<NamingScope> {
    CURRENT.with(|cell| cell.get())
}

/// Replace the current thread's naming scope
pub fn set_current(scope: Option<NamingScope>) {
    CURRENT.with(|cell| cell.set(scope));
}

/// Run `f` with `scope` as the current naming scope
pub fn run_in_scope<R>(scope: NamingScope, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|cell| cell.scoped(Some(scope), f))
}

/// Resolve a name in the current thread's naming scope
pub fn lookup(name: &str) -> ProviderResult<String> {
    CURRENT.with(|cell| {
        cell.with(|scope| match scope {
            Some(scope) => scope.lookup(name).map(str::to_string),
            None => Err(ProviderError::Unavailable(format!(
                "no naming scope is active to resolve {}",
                name
            ))),
        })
    })
}
