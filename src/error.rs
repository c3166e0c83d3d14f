use std::time::Duration;

use uuid::Uuid;

use crate::handle::TxState;

/// Error type for transaction coordination and transaction-bound repositories.
///
/// Each variant names the phase that failed, so callers can tell an
/// acquisition failure apart from a commit failure or a scope misuse.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("connect to database failed: {0}")]
    ConnectFailed(#[source] sqlx::Error),

    #[error("begin transaction failed: {0}")]
    BeginFailed(#[source] sqlx::Error),

    #[error("commit transaction failed: {0}")]
    CommitFailed(#[source] sqlx::Error),

    #[error("rollback transaction failed: {0}")]
    RollbackFailed(#[source] sqlx::Error),

    /// The unit of work failed and the rollback that followed failed too.
    /// Both messages are kept.
    #[error("{cause}; {rollback}")]
    RollbackAfterFailure {
        cause: Box<dyn std::error::Error + Send + Sync>,
        #[source]
        rollback: Box<TransactionError>,
    },

    #[error("no active transaction in scope")]
    NoTransaction,

    #[error("transaction already finalized ({0})")]
    AlreadyFinalized(TxState),

    #[error("unit of work timed out after {0:?}")]
    TimedOut(Duration),

    #[error("unit of work panicked")]
    Panicked,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl TransactionError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The failure that triggered a rollback, when the rollback itself failed.
    pub fn rollback_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::RollbackAfterFailure { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Result type for transaction-aware operations
pub type TransactionResult<T> = Result<T, TransactionError>;
