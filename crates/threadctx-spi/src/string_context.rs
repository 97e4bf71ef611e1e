//! `StringContext`: one string per thread

use std::cell::{Cell, RefCell};
use threadctx_core::{
    ContextProvider, ContextState, ContextType, ProviderError, ProviderResult, RestoreHandle,
};

/// Category name
pub const STRING_CONTEXT: ContextType = ContextType::from_static("StringContext");

thread_local! {
    static VALUE: RefCell<String> = const { RefCell::new(String::new()) };
    static DEPTH: Cell<u64> = const { Cell::new(0) };
}

/// The current thread's value
pub fn current() -> String {
    VALUE.with(|v| v.borrow().clone())
}

/// Set the current thread's value
pub fn set(value: impl Into<String>) {
    let value = value.into();
    VALUE.with(|v| *v.borrow_mut() = value);
}

struct Undo {
    previous: String,
    depth: u64,
}

fn install(value: String) -> RestoreHandle {
    let previous = VALUE.with(|v| v.replace(value));
    let depth = DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });
    RestoreHandle::new(Undo { previous, depth })
}

/// Provider for [`STRING_CONTEXT`]; a cleared thread sees the empty string
#[derive(Debug, Default, Clone, Copy)]
pub struct StringContextProvider;

impl ContextProvider for StringContextProvider {
    fn context_type(&self) -> ContextType {
        STRING_CONTEXT
    }

    fn capture(&self) -> ProviderResult<ContextState> {
        Ok(ContextState::new(current()))
    }

    fn apply(&self, state: &ContextState) -> ProviderResult<RestoreHandle> {
        let value = state.get::<String>()?.clone();
        Ok(install(value))
    }

    fn clear(&self) -> ProviderResult<RestoreHandle> {
        Ok(install(String::new()))
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
        VALUE.with(|v| *v.borrow_mut() = undo.previous);
        Ok(())
    }
}
