use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::AnyPool;

use crate::{TransactionError, TransactionHandle, TransactionResult};

/// A sqlx transaction on an `Any` connection.
pub type AnyTransaction = sqlx::Transaction<'static, Any>;

/// Statement to run through a [`QueryExecutor`].
pub type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// QueryExecutor is the statement surface handed to repositories.
///
/// It is bound either to the pool or to one open transaction, with the same
/// methods in both cases, so a repository is written once and runs inside or
/// outside a unit of work. Datastore errors are passed through unmodified.
#[derive(Clone, Debug)]
pub enum QueryExecutor {
    Pool(AnyPool),
    Transaction(TransactionHandle<AnyTransaction>),
}

impl QueryExecutor {
    pub fn is_transactional(&self) -> bool {
        matches!(self, QueryExecutor::Transaction(_))
    }

    /// Run a statement and return the affected-row acknowledgment.
    pub async fn execute<'q>(&self, query: AnyQuery<'q>) -> TransactionResult<AnyQueryResult> {
        match self {
            QueryExecutor::Pool(pool) => Ok(query.execute(pool).await?),
            QueryExecutor::Transaction(handle) => {
                let mut slot = handle.lock_slot().await;
                let tx = slot
                    .as_mut()
                    .ok_or_else(|| TransactionError::AlreadyFinalized(handle.state()))?;
                Ok(query.execute(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_one<'q>(&self, query: AnyQuery<'q>) -> TransactionResult<AnyRow> {
        match self {
            QueryExecutor::Pool(pool) => Ok(query.fetch_one(pool).await?),
            QueryExecutor::Transaction(handle) => {
                let mut slot = handle.lock_slot().await;
                let tx = slot
                    .as_mut()
                    .ok_or_else(|| TransactionError::AlreadyFinalized(handle.state()))?;
                Ok(query.fetch_one(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_optional<'q>(
        &self,
        query: AnyQuery<'q>,
    ) -> TransactionResult<Option<AnyRow>> {
        match self {
            QueryExecutor::Pool(pool) => Ok(query.fetch_optional(pool).await?),
            QueryExecutor::Transaction(handle) => {
                let mut slot = handle.lock_slot().await;
                let tx = slot
                    .as_mut()
                    .ok_or_else(|| TransactionError::AlreadyFinalized(handle.state()))?;
                Ok(query.fetch_optional(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_all<'q>(&self, query: AnyQuery<'q>) -> TransactionResult<Vec<AnyRow>> {
        match self {
            QueryExecutor::Pool(pool) => Ok(query.fetch_all(pool).await?),
            QueryExecutor::Transaction(handle) => {
                let mut slot = handle.lock_slot().await;
                let tx = slot
                    .as_mut()
                    .ok_or_else(|| TransactionError::AlreadyFinalized(handle.state()))?;
                Ok(query.fetch_all(&mut **tx).await?)
            }
        }
    }
}
