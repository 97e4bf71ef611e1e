//! Thread Context Propagation Engine
//!
//! This crate captures the ambient, thread-local context of a submitting
//! thread and re-establishes it around work that later runs on a different
//! worker thread. Each context category is handled by a pluggable
//! [`ContextProvider`]; a named [`ContextServiceDefinition`] decides, per
//! category, whether the worker sees the captured value, a cleared default,
//! or its own value.
//!
//! # Architecture
//!
//! 1. **Providers** (`providers/`): the capture/apply/clear/restore contract
//!    plus the built-in categories (naming scope, class resolution scope,
//!    security principal, transaction).
//! 2. **Registry** (`registry`): the start-up table of providers, frozen
//!    before the first capture.
//! 3. **Policy** (`policy`, `definition`): resolving a definition into one
//!    policy per registered category.
//! 4. **Snapshot** (`snapshot`): the captured value of every category.
//! 5. **Service** (`service`): `contextualize` and friends.
//! 6. **Task** (`task`) and **Stage** (`stage`): the apply / run / restore
//!    protocol for plain work and for dependent stages of a future.
//!
//! # Example
//!
//! ```rust,no_run
//! use threadctx_core::{ContextRegistry, ContextService, ContextServiceDefinition};
//! use threadctx_core::providers::security::{self, Principal};
//!
//! # fn main() -> threadctx_core::ContextResult<()> {
//! let registry = ContextRegistry::builder()
//!     .with_builtin_providers()?
//!     .build();
//!
//! let definition = ContextServiceDefinition::new("app/ContextA")
//!     .with_propagated(["Security"])
//!     .with_cleared(["Remaining"]);
//! let service = ContextService::new(registry, &definition)?;
//!
//! let task = security::run_as(Principal::new("alice"), || {
//!     service.contextualize(|| security::current_principal().map(|p| p.name().to_string()))
//! })?;
//!
//! let seen = std::thread::spawn(move || task.call()).join().unwrap()?;
//! assert_eq!(seen.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

pub mod context_type;
pub mod definition;
pub mod error;
pub mod policy;
pub mod providers;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod stage;
pub mod task;

pub use context_type::{ContextType, TypeSelector};
pub use definition::{ContextServiceDefinition, DefinitionFormat, DefinitionSet};
pub use error::{ContextError, ContextResult, RestoreFailure, TaskError};
pub use policy::{resolve_policies, ContextPolicy, KnownType, ResolvedPolicy};
pub use providers::{
    ContextProvider, ContextState, ProviderDiscovery, ProviderError, ProviderResult,
    RestoreHandle,
};
pub use registry::{ContextRegistry, ContextRegistryBuilder};
pub use service::{ContextService, ContextServices};
pub use snapshot::ContextSnapshot;
pub use stage::ContextualStage;
pub use task::{CapturedContext, Contextual, TaskPhase};
