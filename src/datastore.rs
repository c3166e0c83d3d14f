use async_trait::async_trait;
use sqlx::AnyPool;

use crate::{AnyTransaction, QueryExecutor, TransactionHandle};

/// A live transaction resource checked out of a pool.
///
/// Finishing the transaction consumes the resource, which returns the
/// underlying connection to its pool whether the call succeeds or not.
#[async_trait]
pub trait TransactionalConnection: Send + 'static {
    async fn commit(self) -> Result<(), sqlx::Error>;

    async fn rollback(self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl<DB: sqlx::Database> TransactionalConnection for sqlx::Transaction<'static, DB> {
    async fn commit(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::commit(self).await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::rollback(self).await
    }
}

/// Source of transactions and the executor binding for them.
///
/// The coordinator only depends on this contract. [`SqlxDatastore`] is the
/// production implementation; tests plug in their own.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    type Connection: TransactionalConnection;
    type Executor: Clone + Send + Sync + 'static;

    /// Check out a connection and open a transaction on it.
    async fn begin(&self) -> Result<Self::Connection, sqlx::Error>;

    /// Executor bound to the pool, outside of any transaction.
    fn executor(&self) -> Self::Executor;

    /// Executor bound to one open transaction.
    fn bind(&self, handle: &TransactionHandle<Self::Connection>) -> Self::Executor;

    /// Number of connections currently checked out of the pool.
    fn checked_out(&self) -> usize;
}

/// [`Datastore`] backed by a sqlx `Any` pool (PostgreSQL or SQLite).
#[derive(Clone, Debug)]
pub struct SqlxDatastore {
    pool: AnyPool,
}

impl SqlxDatastore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl Datastore for SqlxDatastore {
    type Connection = AnyTransaction;
    type Executor = QueryExecutor;

    async fn begin(&self) -> Result<AnyTransaction, sqlx::Error> {
        self.pool.begin().await
    }

    fn executor(&self) -> QueryExecutor {
        QueryExecutor::Pool(self.pool.clone())
    }

    fn bind(&self, handle: &TransactionHandle<AnyTransaction>) -> QueryExecutor {
        QueryExecutor::Transaction(handle.clone())
    }

    fn checked_out(&self) -> usize {
        (self.pool.size() as usize).saturating_sub(self.pool.num_idle())
    }
}
