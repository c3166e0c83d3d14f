use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use uuid::Uuid;

use crate::{TransactionAware, TransactionError, TransactionResult, TransactionalConnection};

/// Lifecycle state of a [`TransactionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
    /// Commit or rollback was attempted and the datastore reported an error.
    Failed,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxState::Active)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Active => "active",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
            TxState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One open transaction and its state.
///
/// Clones share the same transaction. The connection slot is `Some` exactly
/// while the state is [`TxState::Active`]; both are only changed with the
/// connection lock held. Finishing takes the connection out of the slot, so
/// it goes back to the pool on every path.
pub struct TransactionHandle<C> {
    inner: Arc<HandleInner<C>>,
}

struct HandleInner<C> {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: RwLock<TxState>,
    connection: Mutex<Option<C>>,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
}

impl<C> Clone for TransactionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for TransactionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("created_at", &self.inner.created_at)
            .field("state", &self.state())
            .finish()
    }
}

impl<C> TransactionHandle<C> {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> TxState {
        *self.inner.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TxState::Active
    }

    /// Whether both values refer to the same transaction.
    pub fn same_transaction(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a component that needs to be notified of transaction events.
    pub fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.inner.observers.write().push(observer);
    }
}

impl<C: TransactionalConnection> TransactionHandle<C> {
    pub(crate) fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                state: RwLock::new(TxState::Active),
                connection: Mutex::new(Some(connection)),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Exclusive access to the live connection for running one statement.
    ///
    /// Statements on the same handle are serialized by this lock. Fails with
    /// [`TransactionError::AlreadyFinalized`] once the handle is terminal.
    pub async fn connection(&self) -> TransactionResult<MappedMutexGuard<'_, C>> {
        let guard = self.inner.connection.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut())
            .map_err(|_| TransactionError::AlreadyFinalized(self.state()))
    }

    /// Lock the connection slot. It holds `None` once the handle is terminal.
    pub(crate) async fn lock_slot(&self) -> MutexGuard<'_, Option<C>> {
        self.inner.connection.lock().await
    }

    pub(crate) async fn commit(&self) -> TransactionResult<()> {
        let mut slot = self.inner.connection.lock().await;
        let connection = slot
            .take()
            .ok_or_else(|| TransactionError::AlreadyFinalized(self.state()))?;
        // Failed until the datastore confirms, in case this future is dropped.
        *self.inner.state.write() = TxState::Failed;

        match connection.commit().await {
            Ok(()) => {
                *self.inner.state.write() = TxState::Committed;
                drop(slot);
                tracing::debug!(tx_id = %self.id(), "transaction committed");
                self.notify(TxState::Committed).await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(tx_id = %self.id(), error = %err, "transaction commit failed");
                Err(TransactionError::CommitFailed(err))
            }
        }
    }

    pub(crate) async fn rollback(&self) -> TransactionResult<()> {
        let mut slot = self.inner.connection.lock().await;
        let connection = slot
            .take()
            .ok_or_else(|| TransactionError::AlreadyFinalized(self.state()))?;
        *self.inner.state.write() = TxState::Failed;

        match connection.rollback().await {
            Ok(()) => {
                *self.inner.state.write() = TxState::RolledBack;
                drop(slot);
                tracing::debug!(tx_id = %self.id(), "transaction rolled back");
                self.notify(TxState::RolledBack).await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(tx_id = %self.id(), error = %err, "transaction rollback failed");
                Err(TransactionError::RollbackFailed(err))
            }
        }
    }

    async fn notify(&self, state: TxState) {
        let observers = self.inner.observers.read().clone();
        for observer in observers.iter() {
            let outcome = match state {
                TxState::Committed => observer.on_commit(self.id()).await,
                _ => observer.on_rollback(self.id()).await,
            };
            if let Err(err) = outcome {
                tracing::warn!(
                    tx_id = %self.id(),
                    %state,
                    error = %err,
                    "transaction observer failed"
                );
            }
        }
    }
}
