//! `IntContext`: one integer per thread

use std::cell::Cell;
use threadctx_core::{
    ContextProvider, ContextState, ContextType, ProviderError, ProviderResult, RestoreHandle,
};

/// Category name
pub const INT_CONTEXT: ContextType = ContextType::from_static("IntContext");

/// Value a cleared thread observes
pub const CLEARED: i32 = 0;

thread_local! {
    static VALUE: Cell<i32> = const { Cell::new(CLEARED) };
    static DEPTH: Cell<u64> = const { Cell::new(0) };
}

/// The current thread's value
pub fn current() -> i32 {
    VALUE.with(Cell::get)
}

/// Set the current thread's value
pub fn set(value: i32) {
    VALUE.with(|v| v.set(value));
}

struct Undo {
    previous: i32,
    depth: u64,
}

fn install(value: i32) -> RestoreHandle {
    let previous = VALUE.with(|v| v.replace(value));
    let depth = DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });
    RestoreHandle::new(Undo { previous, depth })
}

/// Provider for [`INT_CONTEXT`]
#[derive(Debug, Default, Clone, Copy)]
pub struct IntContextProvider;

impl ContextProvider for IntContextProvider {
    fn context_type(&self) -> ContextType {
        INT_CONTEXT
    }

    fn capture(&self) -> ProviderResult<ContextState> {
        Ok(ContextState::new(current()))
    }

    fn apply(&self, state: &ContextState) -> ProviderResult<RestoreHandle> {
        let value = *state.get::<i32>()?;
        Ok(install(value))
    }

    fn clear(&self) -> ProviderResult<RestoreHandle> {
        Ok(install(CLEARED))
    }

    fn restore(&self, handle: RestoreHandle) -> ProviderResult<()> {
        let undo = handle.into_inner::<Undo>()?;
        let current_depth = DEPTH.with(Cell::get);
        if current_depth != undo.depth {
            return Err(ProviderError::OutOfOrder {
                current: current_depth,
                handle: undo.depth,
            });
        }
        DEPTH.with(|d| d.set(current_depth - 1));
        set(undo.previous);
        tracing::trace!(value = undo.previous, "IntContext restored");
        Ok(())
    }
}
