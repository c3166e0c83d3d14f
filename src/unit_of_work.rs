use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use crate::{Datastore, TransactionError, TransactionHandle, TransactionResult, TxScope};

/// Lower-level transaction primitives backing the unit-of-work calls.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Connection: Send + 'static;

    /// Check out a connection and return a new scope carrying a fresh
    /// active transaction.
    async fn begin(&self) -> TransactionResult<TxScope<Self::Connection>>;

    /// Commit the transaction carried by `scope`.
    async fn commit(&self, scope: &TxScope<Self::Connection>) -> TransactionResult<()>;

    /// Roll back the transaction carried by `scope`.
    async fn rollback(&self, scope: &TxScope<Self::Connection>) -> TransactionResult<()>;
}

/// Builds the repositories of a unit of work from an executor.
///
/// Any `Fn(E) -> R` works, e.g. `Stores::sql`.
pub trait RepositoryFactory<E>: Send + Sync + 'static {
    type Repositories: Send + Sync + 'static;

    fn build(&self, executor: E) -> Self::Repositories;
}

impl<E, R, F> RepositoryFactory<E> for F
where
    F: Fn(E) -> R + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    type Repositories = R;

    fn build(&self, executor: E) -> R {
        self(executor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Deadline for the callback of a new unit of work. On expiry the
    /// callback is cancelled and the transaction rolled back.
    pub unit_timeout: Option<Duration>,
}

/// What a unit-of-work callback receives: the transaction-bound scope, for
/// passing on to nested calls, and repositories built from that transaction.
pub struct TxContext<R, C> {
    scope: TxScope<C>,
    repos: R,
}

impl<R, C> TxContext<R, C> {
    pub fn scope(&self) -> &TxScope<C> {
        &self.scope
    }

    pub fn repos(&self) -> &R {
        &self.repos
    }

    pub fn into_parts(self) -> (TxScope<C>, R) {
        (self.scope, self.repos)
    }
}

type ConnectionOf<D> = <D as Datastore>::Connection;

/// Unit-of-work coordinator.
///
/// Owns the begin/commit/rollback protocol over a [`Datastore`] and builds
/// transaction-bound repositories with a [`RepositoryFactory`].
pub struct Coordinator<D, F> {
    datastore: Arc<D>,
    factory: Arc<F>,
    config: CoordinatorConfig,
}

impl<D, F> Clone for Coordinator<D, F> {
    fn clone(&self) -> Self {
        Self {
            datastore: Arc::clone(&self.datastore),
            factory: Arc::clone(&self.factory),
            config: self.config.clone(),
        }
    }
}

impl<D, F> Coordinator<D, F>
where
    D: Datastore,
    F: RepositoryFactory<D::Executor>,
{
    pub fn new(datastore: D, factory: F) -> Self {
        Self::with_config(datastore, factory, CoordinatorConfig::default())
    }

    pub fn with_config(datastore: D, factory: F, config: CoordinatorConfig) -> Self {
        Self {
            datastore: Arc::new(datastore),
            factory: Arc::new(factory),
            config,
        }
    }

    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    /// Repositories bound to the pool, for work that needs no transaction.
    pub fn repositories(&self) -> F::Repositories {
        self.factory.build(self.datastore.executor())
    }

    /// Run `work` in a brand-new transaction, even if the caller already
    /// holds one. Commits when `work` succeeds and rolls back otherwise.
    ///
    /// A commit failure is reported as the unit's error. When the rollback
    /// after a failed callback fails too, the error returned is
    /// [`TransactionError::RollbackAfterFailure`] carrying both.
    pub async fn run_in_new_transaction<T, E, W, Fut>(&self, work: W) -> Result<T, E>
    where
        W: FnOnce(TxContext<F::Repositories, ConnectionOf<D>>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + std::error::Error + Send + Sync + 'static,
    {
        let scope = self.begin().await?;
        let handle = scope.require()?.clone();
        let context = self.context(scope, &handle);

        match self.supervise(work(context)).await {
            Ok(Ok(value)) => {
                handle.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => Err(self.abort(&handle, err).await),
            Err(panic) => {
                let outcome = self.abort(&handle, TransactionError::Panicked).await;
                if let TransactionError::RollbackAfterFailure { rollback, .. } = &outcome {
                    tracing::error!(
                        tx_id = %handle.id(),
                        error = %rollback,
                        "rollback after panic failed"
                    );
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Run `work` inside the transaction already carried by `scope`.
    ///
    /// Nothing is begun, committed or rolled back here; the outer unit of
    /// work decides. Fails with [`TransactionError::NoTransaction`] before
    /// touching the datastore when `scope` carries no transaction.
    pub async fn run_with_existing_transaction<T, E, W, Fut>(
        &self,
        scope: &TxScope<ConnectionOf<D>>,
        work: W,
    ) -> Result<T, E>
    where
        W: FnOnce(TxContext<F::Repositories, ConnectionOf<D>>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        let handle = scope.active()?;
        tracing::debug!(tx_id = %handle.id(), "joining existing transaction");
        let context = self.context(scope.clone(), handle);
        work(context).await
    }

    /// Join the transaction carried by `scope`, or begin a new one if there
    /// is none.
    pub async fn run_in_transaction<T, E, W, Fut>(
        &self,
        scope: &TxScope<ConnectionOf<D>>,
        work: W,
    ) -> Result<T, E>
    where
        W: FnOnce(TxContext<F::Repositories, ConnectionOf<D>>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + std::error::Error + Send + Sync + 'static,
    {
        if scope.has_transaction() {
            self.run_with_existing_transaction(scope, work).await
        } else {
            self.run_in_new_transaction(work).await
        }
    }

    fn context(
        &self,
        scope: TxScope<ConnectionOf<D>>,
        handle: &TransactionHandle<ConnectionOf<D>>,
    ) -> TxContext<F::Repositories, ConnectionOf<D>> {
        let repos = self.factory.build(self.datastore.bind(handle));
        TxContext { scope, repos }
    }

    /// Drive the callback, turning a panic into `Err` and an expired
    /// deadline into a [`TransactionError::TimedOut`] failure.
    async fn supervise<T, E, Fut>(&self, work: Fut) -> Result<Result<T, E>, Box<dyn Any + Send>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        let guarded = AssertUnwindSafe(work).catch_unwind();
        match self.config.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(TransactionError::TimedOut(limit).into())),
            },
            None => guarded.await,
        }
    }

    /// Roll back after a failed callback and decide which error to report.
    async fn abort<E>(&self, handle: &TransactionHandle<ConnectionOf<D>>, err: E) -> E
    where
        E: From<TransactionError> + std::error::Error + Send + Sync + 'static,
    {
        tracing::warn!(tx_id = %handle.id(), error = %err, "unit of work failed, rolling back");
        match handle.rollback().await {
            Ok(()) => err,
            // The callback finished the transaction itself; nothing left to undo.
            Err(TransactionError::AlreadyFinalized(state)) => {
                tracing::debug!(
                    tx_id = %handle.id(),
                    %state,
                    "transaction already finalized before rollback"
                );
                err
            }
            Err(rollback) => TransactionError::RollbackAfterFailure {
                cause: Box::new(err),
                rollback: Box::new(rollback),
            }
            .into(),
        }
    }
}

#[async_trait]
impl<D, F> TransactionManager for Coordinator<D, F>
where
    D: Datastore,
    F: RepositoryFactory<D::Executor>,
{
    type Connection = ConnectionOf<D>;

    async fn begin(&self) -> TransactionResult<TxScope<ConnectionOf<D>>> {
        let connection = self
            .datastore
            .begin()
            .await
            .map_err(TransactionError::BeginFailed)?;
        let handle = TransactionHandle::new(connection);
        tracing::debug!(tx_id = %handle.id(), "transaction begun");
        Ok(TxScope::with_handle(handle))
    }

    async fn commit(&self, scope: &TxScope<ConnectionOf<D>>) -> TransactionResult<()> {
        scope.require()?.commit().await
    }

    async fn rollback(&self, scope: &TxScope<ConnectionOf<D>>) -> TransactionResult<()> {
        scope.require()?.rollback().await
    }
}
