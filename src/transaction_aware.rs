use async_trait::async_trait;
use uuid::Uuid;

use crate::TransactionResult;

/// Trait for components that need to be notified of transaction lifecycle events.
///
/// Observers are registered on a [`TransactionHandle`](crate::TransactionHandle)
/// and are called once the handle reaches its terminal state. They run after
/// the datastore has already committed or rolled back, so a failing observer
/// is logged and never changes the outcome reported for the unit of work.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful transaction commit.
    async fn on_commit(&self, tx_id: Uuid) -> TransactionResult<()>;

    /// Called after a successful transaction rollback.
    async fn on_rollback(&self, tx_id: Uuid) -> TransactionResult<()>;
}
