use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use super::{timestamp_column, uuid_column, UserStore};
use crate::model::{now_millis, User};
use crate::{QueryExecutor, TransactionError, TransactionResult};

const SELECT_USER: &str = "SELECT id, name, email, created_at, updated_at FROM users";

/// User repository over a [`QueryExecutor`]
pub struct SqlUserStore {
    executor: QueryExecutor,
}

impl SqlUserStore {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }
}

fn to_user(row: &AnyRow) -> TransactionResult<User> {
    Ok(User {
        id: uuid_column(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn create_user(&self, name: &str, email: &str) -> TransactionResult<User> {
        let user = User::new(name.to_string(), email.to_string());
        self.executor
            .execute(
                sqlx::query(
                    "INSERT INTO users (id, name, email, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(user.id.to_string())
                .bind(user.name.clone())
                .bind(user.email.clone())
                .bind(user.created_at.timestamp_millis())
                .bind(user.updated_at.timestamp_millis()),
            )
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> TransactionResult<User> {
        let query = format!("{SELECT_USER} WHERE id = $1");
        let row = self
            .executor
            .fetch_optional(sqlx::query(&query).bind(id.to_string()))
            .await?
            .ok_or_else(|| TransactionError::not_found("user", id))?;
        to_user(&row)
    }

    async fn list_users(&self) -> TransactionResult<Vec<User>> {
        let rows = self
            .executor
            .fetch_all(sqlx::query(&format!("{SELECT_USER} ORDER BY name, id")))
            .await?;
        rows.iter().map(to_user).collect()
    }

    async fn update_user(&self, id: Uuid, name: &str, email: &str) -> TransactionResult<User> {
        let result = self
            .executor
            .execute(
                sqlx::query("UPDATE users SET name = $2, email = $3, updated_at = $4 WHERE id = $1")
                    .bind(id.to_string())
                    .bind(name.to_string())
                    .bind(email.to_string())
                    .bind(now_millis().timestamp_millis()),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(TransactionError::not_found("user", id));
        }
        self.get_user(id).await
    }

    async fn delete_user(&self, id: Uuid) -> TransactionResult<()> {
        let result = self
            .executor
            .execute(sqlx::query("DELETE FROM users WHERE id = $1").bind(id.to_string()))
            .await?;
        if result.rows_affected() == 0 {
            return Err(TransactionError::not_found("user", id));
        }
        Ok(())
    }
}
