//! Application service sequencing store calls inside units of work.

use crate::model::{Post, User};
use crate::store::Stores;
use crate::{Coordinator, Datastore, RepositoryFactory, TransactionError, TxScope};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to create user: {0}")]
    CreateUser(#[source] TransactionError),

    #[error("failed to create post: {0}")]
    CreatePost(#[source] TransactionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct Service<D, F> {
    coordinator: Coordinator<D, F>,
}

impl<D, F> Service<D, F>
where
    D: Datastore,
    F: RepositoryFactory<D::Executor, Repositories = Stores>,
{
    pub fn new(coordinator: Coordinator<D, F>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator<D, F> {
        &self.coordinator
    }

    /// Create a user and their first post atomically.
    pub async fn create_user_with_post(
        &self,
        name: &str,
        email: &str,
        title: &str,
        content: &str,
    ) -> ServiceResult<(User, Post)> {
        self.coordinator
            .run_in_new_transaction(|cx| async move {
                let stores = cx.repos();
                let user = stores
                    .users
                    .create_user(name, email)
                    .await
                    .map_err(ServiceError::CreateUser)?;
                let post = stores
                    .posts
                    .create_post(user.id, title, content)
                    .await
                    .map_err(ServiceError::CreatePost)?;
                Ok::<_, ServiceError>((user, post))
            })
            .await
    }

    /// Create a user with several posts atomically. Each post is added by
    /// [`attach_post`](Self::attach_post), which joins this transaction.
    pub async fn create_user_with_posts(
        &self,
        name: &str,
        email: &str,
        posts: &[(&str, &str)],
    ) -> ServiceResult<(User, Vec<Post>)> {
        self.coordinator
            .run_in_new_transaction(|cx| async move {
                let user = cx
                    .repos()
                    .users
                    .create_user(name, email)
                    .await
                    .map_err(ServiceError::CreateUser)?;

                let mut created = Vec::with_capacity(posts.len());
                for (title, content) in posts {
                    created.push(self.attach_post(cx.scope(), user.id, title, content).await?);
                }
                Ok::<_, ServiceError>((user, created))
            })
            .await
    }

    /// Add a post as part of the caller's unit of work.
    ///
    /// Fails with [`TransactionError::NoTransaction`] when `scope` carries no
    /// transaction.
    pub async fn attach_post(
        &self,
        scope: &TxScope<D::Connection>,
        user_id: uuid::Uuid,
        title: &str,
        content: &str,
    ) -> ServiceResult<Post> {
        self.coordinator
            .run_with_existing_transaction(scope, |cx| async move {
                cx.repos()
                    .posts
                    .create_post(user_id, title, content)
                    .await
                    .map_err(ServiceError::CreatePost)
            })
            .await
    }

    pub async fn get_user(&self, id: uuid::Uuid) -> ServiceResult<User> {
        Ok(self.coordinator.repositories().users.get_user(id).await?)
    }

    pub async fn list_posts_by_user(&self, user_id: uuid::Uuid) -> ServiceResult<Vec<Post>> {
        Ok(self.coordinator.repositories().posts.list_posts_by_user(user_id).await?)
    }
}
