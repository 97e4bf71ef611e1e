//! Third-Party Context Types
//!
//! Context categories that ship outside the engine. Both implement
//! [`ContextProvider`] directly over their own thread-locals and reach a
//! registry only through [`SpiProviders`].
//!
//! - **IntContext**: an `i32` per thread, cleared to `0`
//! - **StringContext**: a `String` per thread, cleared to `""`
//!
//! # Example
//!
//! ```rust
//! use threadctx_core::ContextRegistry;
//! use threadctx_spi::SpiProviders;
//!
//! # fn main() -> threadctx_core::ContextResult<()> {
//! let registry = ContextRegistry::builder()
//!     .with_builtin_providers()?
//!     .discover(&SpiProviders)?
//!     .build();
//! assert_eq!(registry.len(), 6);
//! # Ok(())
//! # }
//! ```

pub mod int_context;
pub mod string_context;

pub use int_context::IntContextProvider;
pub use string_context::StringContextProvider;

use std::sync::Arc;
use threadctx_core::{ContextProvider, ProviderDiscovery};

/// Discovery source for the providers in this crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiProviders;

impl ProviderDiscovery for SpiProviders {
    fn discover(&self) -> Vec<Arc<dyn ContextProvider>> {
        vec![
            Arc::new(IntContextProvider),
            Arc::new(StringContextProvider),
        ]
    }
}
