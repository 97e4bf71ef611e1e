//! Thread-local ambient slots
//!
//! Building blocks for providers whose ambient value is a single
//! thread-local cell. An [`AmbientCell`] tracks a nesting depth next to its
//! value so that every restore can be checked against stack order, and
//! [`AmbientProvider`] turns such a cell into a full [`ContextProvider`].

use super::traits::{ContextProvider, ContextState, ProviderError, ProviderResult, RestoreHandle};
use crate::context_type::ContextType;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::thread::LocalKey;

struct Frame<T> {
    value: T,
    depth: u64,
}

/// A thread-local value with scoped replacement
pub struct AmbientCell<T> {
    frame: RefCell<Frame<T>>,
}

/// Undo token for one [`AmbientCell::replace`]
#[derive(Debug)]
pub struct AmbientToken<T> {
    previous: T,
    depth: u64,
}

impl<T> AmbientToken<T> {
    /// Nesting depth this token restores from
    pub fn depth(&self) -> u64 {
        self.depth
    }
}

impl<T: Clone> AmbientCell<T> {
    /// Create a cell holding the thread's initial value
    pub const fn new(value: T) -> Self {
        Self {
            frame: RefCell::new(Frame { value, depth: 0 }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.frame.borrow().value.clone()
    }

    /// Inspect the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.frame.borrow().value)
    }

    /// Overwrite the current value without opening a new scope
    pub fn set(&self, value: T) {
        self.frame.borrow_mut().value = value;
    }

    /// Install a value for a nested scope
    pub fn replace(&self, value: T) -> AmbientToken<T> {
        let mut frame = self.frame.borrow_mut();
        let previous = mem::replace(&mut frame.value, value);
        frame.depth += 1;
        AmbientToken {
            previous,
            depth: frame.depth,
        }
    }

    /// Close the innermost scope, reinstating the value it replaced
    pub fn restore(&self, token: AmbientToken<T>) -> ProviderResult<()> {
        let mut frame = self.frame.borrow_mut();
        if frame.depth != token.depth {
            return Err(ProviderError::OutOfOrder {
                current: frame.depth,
                handle: token.depth,
            });
        }
        frame.value = token.previous;
        frame.depth -= 1;
        Ok(())
    }

    /// Current nesting depth
    pub fn depth(&self) -> u64 {
        self.frame.borrow().depth
    }

    /// Run `f` with `value` installed, restoring afterwards even if `f` panics
    pub fn scoped<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        struct Reset<'a, T: Clone> {
            cell: &'a AmbientCell<T>,
            token: Option<AmbientToken<T>>,
        }

        impl<T: Clone> Drop for Reset<'_, T> {
            fn drop(&mut self) {
                if let Some(token) = self.token.take() {
                    if let Err(e) = self.cell.restore(token) {
                        tracing::warn!(error = %e, "Scoped ambient value restored out of order");
                    }
                }
            }
        }

        let _reset = Reset {
            token: Some(self.replace(value)),
            cell: self,
        };
        f()
    }
}

fn unavailable(context_type: &ContextType) -> ProviderError {
    ProviderError::Unavailable(format!(
        "{} context is not accessible on this thread",
        context_type
    ))
}

/// Provider backed by one thread-local [`AmbientCell`]
pub struct AmbientProvider<T: 'static> {
    context_type: ContextType,
    cell: &'static LocalKey<AmbientCell<T>>,
    cleared: fn() -> T,
    has_default: bool,
}

impl<T: Clone + Send + Sync + 'static> AmbientProvider<T> {
    /// Create a provider whose cleared value is produced by `cleared`
    pub fn new(
        context_type: ContextType,
        cell: &'static LocalKey<AmbientCell<T>>,
        cleared: fn() -> T,
    ) -> Self {
        Self {
            context_type,
            cell,
            cleared,
            has_default: true,
        }
    }

    /// Mark the category as having no meaningful cleared value
    pub fn without_default(mut self) -> Self {
        self.has_default = false;
        self
    }

    fn replace(&self, value: T) -> ProviderResult<RestoreHandle> {
        self.cell
            .try_with(|cell| RestoreHandle::new(cell.replace(value)))
            .map_err(|_| unavailable(&self.context_type))
    }
}

impl<T: 'static> fmt::Debug for AmbientProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientProvider")
            .field("context_type", &self.context_type)
            .field("has_default", &self.has_default)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ContextProvider for AmbientProvider<T> {
    fn context_type(&self) -> ContextType {
        self.context_type.clone()
    }

    fn has_default(&self) -> bool {
        self.has_default
    }

    fn capture(&self) -> ProviderResult<ContextState> {
        self.cell
            .try_with(|cell| ContextState::new(cell.get()))
            .map_err(|_| unavailable(&self.context_type))
    }

    fn apply(&self, state: &ContextState) -> ProviderResult<RestoreHandle> {
        let value = state.get::<T>()?.clone();
        self.replace(value)
    }

    fn clear(&self) -> ProviderResult<RestoreHandle> {
        self.replace((self.cleared)())
    }

    fn restore(&self, handle: RestoreHandle) -> ProviderResult<()> {
        let token = handle.into_inner::<AmbientToken<T>>()?;
        self.cell
            .try_with(|cell| cell.restore(token))
            .map_err(|_| unavailable(&self.context_type))?
    }
}
