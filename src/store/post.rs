use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use super::{timestamp_column, uuid_column, PostStore};
use crate::model::{now_millis, Post};
use crate::{QueryExecutor, TransactionError, TransactionResult};

const SELECT_POST: &str = "SELECT id, user_id, title, content, created_at, updated_at FROM posts";

/// Post repository over a [`QueryExecutor`]
pub struct SqlPostStore {
    executor: QueryExecutor,
}

impl SqlPostStore {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }
}

fn to_post(row: &AnyRow) -> TransactionResult<Post> {
    Ok(Post {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait]
impl PostStore for SqlPostStore {
    async fn create_post(
        &self,
        user_id: Uuid,
        title: &str,
        content: &str,
    ) -> TransactionResult<Post> {
        let post = Post::new(user_id, title.to_string(), content.to_string());
        self.executor
            .execute(
                sqlx::query(
                    "INSERT INTO posts (id, user_id, title, content, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(post.id.to_string())
                .bind(post.user_id.to_string())
                .bind(post.title.clone())
                .bind(post.content.clone())
                .bind(post.created_at.timestamp_millis())
                .bind(post.updated_at.timestamp_millis()),
            )
            .await?;
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> TransactionResult<Post> {
        let query = format!("{SELECT_POST} WHERE id = $1");
        let row = self
            .executor
            .fetch_optional(sqlx::query(&query).bind(id.to_string()))
            .await?
            .ok_or_else(|| TransactionError::not_found("post", id))?;
        to_post(&row)
    }

    async fn list_posts_by_user(&self, user_id: Uuid) -> TransactionResult<Vec<Post>> {
        let rows = self
            .executor
            .fetch_all(
                sqlx::query(&format!(
                    "{SELECT_POST} WHERE user_id = $1 ORDER BY created_at DESC, id"
                ))
                .bind(user_id.to_string()),
            )
            .await?;
        rows.iter().map(to_post).collect()
    }

    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> TransactionResult<Post> {
        let result = self
            .executor
            .execute(
                sqlx::query(
                    "UPDATE posts SET title = $2, content = $3, updated_at = $4 WHERE id = $1",
                )
                .bind(id.to_string())
                .bind(title.to_string())
                .bind(content.to_string())
                .bind(now_millis().timestamp_millis()),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(TransactionError::not_found("post", id));
        }
        self.get_post(id).await
    }

    async fn delete_post(&self, id: Uuid) -> TransactionResult<()> {
        let result = self
            .executor
            .execute(sqlx::query("DELETE FROM posts WHERE id = $1").bind(id.to_string()))
            .await?;
        if result.rows_affected() == 0 {
            return Err(TransactionError::not_found("post", id));
        }
        Ok(())
    }
}
