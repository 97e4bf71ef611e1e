//! Context Type Registry
//!
//! The table of context providers the engine drives. Providers are
//! registered during start-up through a [`ContextRegistryBuilder`]; `build`
//! freezes the table into an immutable, shareable [`ContextRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! use threadctx_core::ContextRegistry;
//!
//! let registry = ContextRegistry::builder()
//!     .with_builtin_providers()?        // Naming, ClassResolution, Security, Transaction
//!     .discover(&threadctx_spi::SpiProviders)? // third-party categories, in discovery order
//!     .build();
//! ```

use crate::context_type::ContextType;
use crate::error::{ContextError, ContextResult};
use crate::policy::KnownType;
use crate::providers::{builtin_providers, ContextProvider, ProviderDiscovery};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A provider together with the category it was registered under
#[derive(Clone)]
pub struct RegisteredProvider {
    context_type: ContextType,
    provider: Arc<dyn ContextProvider>,
}

impl RegisteredProvider {
    pub fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    pub fn provider(&self) -> &Arc<dyn ContextProvider> {
        &self.provider
    }
}

/// Immutable, ordered table of context providers
///
/// Order is registration order: built-ins first, then third-party
/// providers in the order they were discovered.
pub struct ContextRegistry {
    entries: Vec<RegisteredProvider>,
    index: HashMap<ContextType, usize>,
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field(
                "context_types",
                &self.entries.iter().map(|e| e.context_type.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ContextRegistry {
    /// Start building a registry
    pub fn builder() -> ContextRegistryBuilder {
        ContextRegistryBuilder::new()
    }

    /// A registry holding only the built-in providers
    ///
    /// Built-in categories are distinct, so nothing is checked here.
    pub fn with_builtins() -> Arc<Self> {
        let entries: Vec<_> = builtin_providers()
            .into_iter()
            .map(|provider| RegisteredProvider {
                context_type: provider.context_type(),
                provider,
            })
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.context_type.clone(), position))
            .collect();
        Arc::new(Self { entries, index })
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered providers in registry order
    pub fn entries(&self) -> &[RegisteredProvider] {
        &self.entries
    }

    /// `(type, provider)` pairs in registry order
    pub fn providers(&self) -> impl Iterator<Item = (&ContextType, &Arc<dyn ContextProvider>)> {
        self.entries.iter().map(|e| (&e.context_type, &e.provider))
    }

    /// Registered categories in registry order
    pub fn context_types(&self) -> impl Iterator<Item = &ContextType> {
        self.entries.iter().map(|e| &e.context_type)
    }

    /// Look up the provider for a category
    pub fn get(&self, context_type: &ContextType) -> Option<&Arc<dyn ContextProvider>> {
        self.index
            .get(context_type)
            .map(|&idx| &self.entries[idx].provider)
    }

    /// Check if a category is registered
    pub fn contains(&self, context_type: &ContextType) -> bool {
        self.index.contains_key(context_type)
    }

    /// Registry position of a category
    pub fn position(&self, context_type: &ContextType) -> Option<usize> {
        self.index.get(context_type).copied()
    }

    /// Categories in registry order, as input to policy resolution
    pub fn known_types(&self) -> Vec<KnownType> {
        self.entries
            .iter()
            .map(|e| KnownType::new(e.context_type.clone(), e.provider.has_default()))
            .collect()
    }
}

/// Start-up builder for a [`ContextRegistry`]
#[derive(Default)]
pub struct ContextRegistryBuilder {
    entries: Vec<RegisteredProvider>,
    index: HashMap<ContextType, usize>,
}

impl ContextRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    ///
    /// Fails with `DuplicateCategory` if its category is already taken.
    pub fn register(&mut self, provider: Arc<dyn ContextProvider>) -> ContextResult<()> {
        let context_type = provider.context_type();
        if self.index.contains_key(&context_type) {
            return Err(ContextError::DuplicateCategory(context_type));
        }

        tracing::debug!(
            context_type = %context_type,
            position = self.entries.len(),
            "Registered context provider"
        );

        self.index.insert(context_type.clone(), self.entries.len());
        self.entries.push(RegisteredProvider {
            context_type,
            provider,
        });
        Ok(())
    }

    /// Register a provider (builder pattern)
    pub fn with_provider<P: ContextProvider + 'static>(mut self, provider: P) -> ContextResult<Self> {
        self.register(Arc::new(provider))?;
        Ok(self)
    }

    /// Register a pre-wrapped Arc provider (builder pattern)
    pub fn with_arc_provider(mut self, provider: Arc<dyn ContextProvider>) -> ContextResult<Self> {
        self.register(provider)?;
        Ok(self)
    }

    /// Register the built-in providers
    pub fn with_builtin_providers(mut self) -> ContextResult<Self> {
        for provider in builtin_providers() {
            self.register(provider)?;
        }
        Ok(self)
    }

    /// Register every provider a discovery source yields, in its order
    pub fn discover(mut self, discovery: &dyn ProviderDiscovery) -> ContextResult<Self> {
        let discovered = discovery.discover();
        tracing::debug!(count = discovered.len(), "Registering discovered context providers");
        for provider in discovered {
            self.register(provider)?;
        }
        Ok(self)
    }

    /// Number of providers registered so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been registered yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the registry
    pub fn build(self) -> Arc<ContextRegistry> {
        Arc::new(ContextRegistry {
            entries: self.entries,
            index: self.index,
        })
    }
}
