//! Transaction context
//!
//! The transaction a thread is enlisted in. Default definitions clear this
//! category, so work handed to another thread runs outside any transaction
//! unless a definition asks for propagation.

use super::ambient::{AmbientCell, AmbientProvider, AmbientToken};
use crate::context_type::ContextType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an active transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

thread_local! {
    static CURRENT: AmbientCell<Option<TransactionId>> = AmbientCell::new(None);
}

/// Provider for [`ContextType::TRANSACTION`]
pub fn provider() -> AmbientProvider<Option<TransactionId>> {
    AmbientProvider::new(ContextType::TRANSACTION, &CURRENT, || None)
}

/// The transaction the current thread is enlisted in
pub fn current() -> Option<TransactionId> {
    CURRENT.with(|cell| cell.get())
}

/// An open transaction scope on the current thread
///
/// Dropping the guard ends the scope and reinstates whatever transaction
/// was current before [`begin`].
#[must_use = "the transaction ends when the guard is dropped"]
pub struct TransactionGuard {
    id: TransactionId,
    token: Option<AmbientToken<Option<TransactionId>>>,
}

impl TransactionGuard {
    pub fn id(&self) -> TransactionId {
        self.id
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let result = CURRENT.try_with(|cell| cell.restore(token));
            if let Ok(Err(e)) = result {
                tracing::warn!(transaction = %self.id, error = %e, "Transaction scope ended out of order");
            }
        }
    }
}

/// Begin a transaction on the current thread
pub fn begin() -> TransactionGuard {
    let id = TransactionId::new();
    let token = CURRENT.with(|cell| cell.replace(Some(id)));
    tracing::trace!(transaction = %id, "Transaction begun");
    TransactionGuard {
        id,
        token: Some(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ContextProvider;

    #[test]
    fn test_begin_and_end() {
        assert!(current().is_none());
        {
            let tx = begin();
            assert_eq!(current(), Some(tx.id()));

            let nested = begin();
            assert_eq!(current(), Some(nested.id()));
            drop(nested);

            assert_eq!(current(), Some(tx.id()));
        }
        assert!(current().is_none());
    }

    #[test]
    fn test_clear_suspends_transaction() {
        let provider = provider();
        let tx = begin();
        let handle = provider.clear().unwrap();
        assert!(current().is_none());
        provider.restore(handle).unwrap();
        assert_eq!(current(), Some(tx.id()));
    }

    #[test]
    fn test_display() {
        let id = TransactionId::new();
        assert!(id.to_string().starts_with("tx-"));
    }
}
