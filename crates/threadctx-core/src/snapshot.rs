//! Context snapshots
//!
//! A snapshot is the captured ambient value of every registered category,
//! taken at one instant on one thread. It is immutable once taken and may
//! back any number of executions, on any thread, concurrently.

use crate::context_type::ContextType;
use crate::error::{ContextError, ContextResult};
use crate::providers::{guarded, ContextState};
use crate::registry::ContextRegistry;
use std::fmt;

/// Captured state of every category, in registry order
#[derive(Clone)]
pub struct ContextSnapshot {
    states: Vec<(ContextType, ContextState)>,
}

impl ContextSnapshot {
    /// Capture the calling thread's context for every registered category
    ///
    /// Aborts on the first provider that cannot capture; no partial
    /// snapshot is ever returned.
    pub fn capture(registry: &ContextRegistry) -> ContextResult<Self> {
        let mut states = Vec::with_capacity(registry.len());
        for (context_type, provider) in registry.providers() {
            let state = guarded(|| provider.capture()).map_err(|e| {
                tracing::debug!(context_type = %context_type, error = %e, "Context capture failed");
                ContextError::capture_failed(context_type, &e)
            })?;
            states.push((context_type.clone(), state));
        }

        tracing::trace!(count = states.len(), "Captured context snapshot");
        Ok(Self { states })
    }

    /// Captured state of a category
    pub fn get(&self, context_type: &ContextType) -> Option<&ContextState> {
        self.states
            .iter()
            .find(|(ty, _)| ty == context_type)
            .map(|(_, state)| state)
    }

    /// Captured state at a registry position
    pub fn state_at(&self, index: usize) -> Option<&ContextState> {
        self.states.get(index).map(|(_, state)| state)
    }

    /// Categories covered by this snapshot, in registry order
    pub fn context_types(&self) -> impl Iterator<Item = &ContextType> {
        self.states.iter().map(|(ty, _)| ty)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field(
                "context_types",
                &self.states.iter().map(|(ty, _)| ty.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::security::{self, Principal};
    use crate::providers::{
        ContextProvider, MockContextProvider, ProviderError, ProviderResult, RestoreHandle,
    };

    #[test]
    fn test_capture_covers_registry_order() {
        let registry = ContextRegistry::with_builtins();
        let snapshot = ContextSnapshot::capture(&registry).unwrap();

        assert_eq!(snapshot.len(), registry.len());
        let types: Vec<_> = snapshot.context_types().cloned().collect();
        let expected: Vec<_> = registry.context_types().cloned().collect();
        assert_eq!(types, expected);
    }

    #[test]
    fn test_snapshot_is_independent_of_later_changes() {
        let registry = ContextRegistry::with_builtins();
        let snapshot = security::run_as(Principal::new("dave"), || {
            ContextSnapshot::capture(&registry).unwrap()
        });

        let state = snapshot.get(&ContextType::SECURITY).unwrap();
        let principal = state.get::<Option<Principal>>().unwrap();
        assert_eq!(principal.as_ref().map(Principal::name), Some("dave"));
        assert!(security::current_principal().is_none());
    }

    #[test]
    fn test_capture_failure_aborts() {
        let mut failing = MockContextProvider::new();
        failing
            .expect_context_type()
            .return_const(ContextType::from_static("Broken"));
        failing
            .expect_capture()
            .returning(|| Err(ProviderError::Unavailable("no ambient state".into())));

        let registry = ContextRegistry::builder()
            .with_builtin_providers()
            .unwrap()
            .with_provider(failing)
            .unwrap()
            .build();

        let err = ContextSnapshot::capture(&registry).unwrap_err();
        match err {
            ContextError::CaptureFailed { category, reason } => {
                assert_eq!(category.as_str(), "Broken");
                assert!(reason.contains("no ambient state"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[derive(Debug)]
    struct PanickingCapture;

    impl ContextProvider for PanickingCapture {
        fn context_type(&self) -> ContextType {
            ContextType::from_static("Fragile")
        }

        fn capture(&self) -> ProviderResult<ContextState> {
            panic!("capture blew up")
        }

        fn apply(&self, _state: &ContextState) -> ProviderResult<RestoreHandle> {
            Ok(RestoreHandle::new(()))
        }

        fn clear(&self) -> ProviderResult<RestoreHandle> {
            Ok(RestoreHandle::new(()))
        }

        fn restore(&self, _handle: RestoreHandle) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_panicking_capture_becomes_capture_failure() {
        let registry = ContextRegistry::builder()
            .with_builtin_providers()
            .unwrap()
            .with_provider(PanickingCapture)
            .unwrap()
            .build();

        match ContextSnapshot::capture(&registry) {
            Err(ContextError::CaptureFailed { category, reason }) => {
                assert_eq!(category.as_str(), "Fragile");
                assert!(reason.contains("capture blew up"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
