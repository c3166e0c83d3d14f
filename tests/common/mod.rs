#![allow(dead_code)]

pub mod memory;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use tx_coordinator::{TransactionAware, TransactionError, TransactionResult};

pub use memory::{memory_stores, MemoryDatastore, MemoryExecutor};
pub use sqlite::{cleanup_database, setup_database};

/// Records lifecycle notifications, optionally failing each one.
#[derive(Default)]
pub struct Recorder {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> TransactionResult<()> {
        if self.fail {
            Err(TransactionError::DatabaseError(sqlx::Error::Protocol(
                "observer failed".to_string(),
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionAware for Recorder {
    async fn on_commit(&self, _tx_id: Uuid) -> TransactionResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn on_rollback(&self, _tx_id: Uuid) -> TransactionResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

/// Business error used by unit-of-work callbacks in tests
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("business rule violated: {0}")]
    Business(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
