//! Transactional Unit of Work Coordinator
//!
//! This crate runs units of work that touch several repositories atomically.
//! The [`Coordinator`] opens a transaction, hands transaction-bound
//! repositories and an explicit [`TxScope`] to caller code, and commits or
//! rolls back depending on the outcome. Nested calls join the outer
//! transaction by receiving the scope as a parameter.

pub mod config;
pub mod datastore;
pub mod error;
pub mod executor;
pub mod handle;
pub mod model;
pub mod scope;
pub mod service;
pub mod store;
pub mod transaction_aware;
pub mod unit_of_work;

pub use datastore::{Datastore, SqlxDatastore, TransactionalConnection};
pub use error::{TransactionError, TransactionResult};
pub use executor::{AnyQuery, AnyTransaction, QueryExecutor};
pub use handle::{TransactionHandle, TxState};
pub use scope::TxScope;
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{
    Coordinator, CoordinatorConfig, RepositoryFactory, TransactionManager, TxContext,
};
