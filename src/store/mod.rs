//! Repository contracts and their SQL implementations.
//!
//! Repositories only ever receive an executor. Whether they run inside a
//! unit of work depends solely on which executor they were built from.

mod post;
mod user;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::model::{Post, User};
use crate::{QueryExecutor, TransactionResult};

pub use post::SqlPostStore;
pub use user::SqlUserStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, name: &str, email: &str) -> TransactionResult<User>;

    async fn get_user(&self, id: Uuid) -> TransactionResult<User>;

    /// All users, ordered by name.
    async fn list_users(&self) -> TransactionResult<Vec<User>>;

    async fn update_user(&self, id: Uuid, name: &str, email: &str) -> TransactionResult<User>;

    async fn delete_user(&self, id: Uuid) -> TransactionResult<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(
        &self,
        user_id: Uuid,
        title: &str,
        content: &str,
    ) -> TransactionResult<Post>;

    async fn get_post(&self, id: Uuid) -> TransactionResult<Post>;

    /// Posts of one user, newest first.
    async fn list_posts_by_user(&self, user_id: Uuid) -> TransactionResult<Vec<Post>>;

    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> TransactionResult<Post>;

    async fn delete_post(&self, id: Uuid) -> TransactionResult<()>;
}

/// The repositories a unit of work operates on, all bound to one executor.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
}

impl Stores {
    /// SQL-backed stores sharing `executor`.
    pub fn sql(executor: QueryExecutor) -> Self {
        Self {
            users: Arc::new(SqlUserStore::new(executor.clone())),
            posts: Arc::new(SqlPostStore::new(executor)),
        }
    }
}

fn uuid_column(row: &AnyRow, column: &str) -> TransactionResult<Uuid> {
    let raw: String = row.try_get(column)?;
    let id = Uuid::parse_str(&raw).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })?;
    Ok(id)
}

fn timestamp_column(row: &AnyRow, column: &str) -> TransactionResult<DateTime<Utc>> {
    let millis: i64 = row.try_get(column)?;
    let timestamp =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("timestamp out of range: {millis}").into(),
        })?;
    Ok(timestamp)
}
