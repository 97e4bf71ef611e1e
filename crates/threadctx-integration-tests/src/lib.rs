//! Shared fixtures for the cross-crate propagation tests

use std::sync::Arc;
use threadctx_core::{ContextRegistry, ContextResult, ContextService, ContextServiceDefinition};
use threadctx_spi::{int_context, string_context, SpiProviders};

/// Built-in providers followed by the third-party ones
pub fn registry() -> ContextResult<Arc<ContextRegistry>> {
    Ok(ContextRegistry::builder()
        .with_builtin_providers()?
        .discover(&SpiProviders)?
        .build())
}

/// Propagates the application scopes and IntContext, clears StringContext,
/// leaves the rest alone
pub fn context_a() -> ContextServiceDefinition {
    ContextServiceDefinition::new("app/ContextA")
        .with_propagated(["Application", "IntContext"])
        .with_cleared(["StringContext"])
        .with_unchanged(["Remaining"])
}

/// Leaves IntContext alone and propagates everything else
pub fn context_b() -> ContextServiceDefinition {
    ContextServiceDefinition::new("app/ContextB")
        .with_propagated(["Remaining"])
        .with_cleared(Vec::<String>::new())
        .with_unchanged(["IntContext"])
}

pub fn service(definition: &ContextServiceDefinition) -> ContextResult<ContextService> {
    ContextService::new(registry()?, definition)
}

/// Third-party values observed on the current thread
pub fn third_party() -> (i32, String) {
    (int_context::current(), string_context::current())
}

/// Set both third-party values on the current thread
pub fn set_third_party(int: i32, string: &str) {
    int_context::set(int);
    string_context::set(string);
}
