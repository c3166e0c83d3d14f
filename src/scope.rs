//! Explicit propagation of the active transaction.
//!
//! A [`TxScope`] is passed down a call chain as an ordinary parameter. It
//! carries zero or one [`TransactionHandle`] and never changes after it is
//! created: cloning it yields a child scope that observes the same handle.

use std::fmt;

use crate::{TransactionError, TransactionHandle, TransactionResult};

pub struct TxScope<C> {
    handle: Option<TransactionHandle<C>>,
}

impl<C> TxScope<C> {
    /// A scope with no transaction.
    pub fn root() -> Self {
        Self { handle: None }
    }

    pub(crate) fn with_handle(handle: TransactionHandle<C>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<&TransactionHandle<C>> {
        self.handle.as_ref()
    }

    pub fn has_transaction(&self) -> bool {
        self.handle.is_some()
    }

    /// The handle carried by this scope, whatever its state.
    pub fn require(&self) -> TransactionResult<&TransactionHandle<C>> {
        self.handle.as_ref().ok_or(TransactionError::NoTransaction)
    }

    /// The handle carried by this scope, provided it is still active.
    pub fn active(&self) -> TransactionResult<&TransactionHandle<C>> {
        let handle = self.require()?;
        match handle.state() {
            state if state.is_terminal() => Err(TransactionError::AlreadyFinalized(state)),
            _ => Ok(handle),
        }
    }
}

impl<C> Clone for TxScope<C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<C> Default for TxScope<C> {
    fn default() -> Self {
        Self::root()
    }
}

impl<C> fmt::Debug for TxScope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxScope").field("handle", &self.handle).finish()
    }
}
