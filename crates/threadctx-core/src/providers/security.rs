//! Security principal context
//!
//! The authenticated caller a thread acts on behalf of. A cleared thread is
//! unauthenticated.

use super::ambient::{AmbientCell, AmbientProvider};
use crate::context_type::ContextType;
use std::collections::BTreeSet;
use std::sync::Arc;

/// An authenticated caller and its roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: Arc<str>,
    roles: Arc<BTreeSet<String>>,
}

impl Principal {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            roles: Arc::new(BTreeSet::new()),
        }
    }

    /// Grant a role (builder pattern)
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.roles).insert(role.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

thread_local! {
    static CURRENT: AmbientCell<Option<Principal>> = AmbientCell::new(None);
}

/// Provider for [`ContextType::SECURITY`]
pub fn provider() -> AmbientProvider<Option<Principal>> {
    AmbientProvider::new(ContextType::SECURITY, &CURRENT, || None)
}

/// The caller the current thread acts for
pub fn current_principal() -> Option<Principal> {
    CURRENT.with(|cell| cell.get())
}

/// Whether the current caller holds `role`
pub fn is_caller_in_role(role: &str) -> bool {
    CURRENT.with(|cell| {
        cell.with(|principal| principal.as_ref().is_some_and(|p| p.has_role(role)))
    })
}

/// Replace the current thread's principal
pub fn set_principal(principal: Option<Principal>) {
    CURRENT.with(|cell| cell.set(principal));
}

/// Run `f` authenticated as `principal`
pub fn run_as<R>(principal: Principal, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|cell| cell.scoped(Some(principal), f))
}
