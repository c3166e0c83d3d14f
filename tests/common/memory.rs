use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use tx_coordinator::model::{now_millis, Post, User};
use tx_coordinator::store::{PostStore, Stores, UserStore};
use tx_coordinator::{
    Datastore, TransactionError, TransactionHandle, TransactionResult, TransactionalConnection,
};

/// Committed state of the in-memory datastore
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: BTreeMap<Uuid, User>,
    pub posts: BTreeMap<Uuid, Post>,
}

#[derive(Debug, Clone)]
enum Op {
    PutUser(User),
    DeleteUser(Uuid),
    PutPost(Post),
    DeletePost(Uuid),
}

impl Op {
    fn apply(&self, tables: &mut Tables) {
        match self {
            Op::PutUser(user) => {
                tables.users.insert(user.id, user.clone());
            }
            Op::DeleteUser(id) => {
                tables.users.remove(id);
                tables.posts.retain(|_, post| post.user_id != *id);
            }
            Op::PutPost(post) => {
                tables.posts.insert(post.id, post.clone());
            }
            Op::DeletePost(id) => {
                tables.posts.remove(id);
            }
        }
    }
}

pub struct Shared {
    tables: Mutex<Tables>,
    max_connections: usize,
    checked_out: AtomicUsize,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    statements: AtomicUsize,
}

/// In-memory datastore with a bounded pool and injectable failures.
///
/// Writes made inside a transaction are staged on the connection and only
/// applied to the shared tables on commit.
#[derive(Clone)]
pub struct MemoryDatastore {
    shared: Arc<Shared>,
}

impl MemoryDatastore {
    pub fn new(max_connections: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                max_connections,
                checked_out: AtomicUsize::new(0),
                fail_begin: AtomicBool::new(false),
                fail_commit: AtomicBool::new(false),
                fail_rollback: AtomicBool::new(false),
                begins: AtomicUsize::new(0),
                commits: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                statements: AtomicUsize::new(0),
            }),
        }
    }

    pub fn fail_begin(&self, fail: bool) {
        self.shared.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.shared.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.shared.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Tables {
        self.shared.tables.lock().clone()
    }

    pub fn begins(&self) -> usize {
        self.shared.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.shared.statements.load(Ordering::SeqCst)
    }
}

pub struct MemoryConnection {
    shared: Arc<Shared>,
    working: Tables,
    ops: Vec<Op>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shared.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionalConnection for MemoryConnection {
    async fn commit(self) -> Result<(), sqlx::Error> {
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("injected commit failure".to_string()));
        }
        let mut tables = self.shared.tables.lock();
        for op in &self.ops {
            op.apply(&mut tables);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_rollback.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reset by peer",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    type Connection = MemoryConnection;
    type Executor = MemoryExecutor;

    async fn begin(&self) -> Result<MemoryConnection, sqlx::Error> {
        if self.shared.fail_begin.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let previous = self.shared.checked_out.fetch_add(1, Ordering::SeqCst);
        if previous >= self.shared.max_connections {
            self.shared.checked_out.fetch_sub(1, Ordering::SeqCst);
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.shared.begins.fetch_add(1, Ordering::SeqCst);
        let working = self.shared.tables.lock().clone();
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            working,
            ops: Vec::new(),
        })
    }

    fn executor(&self) -> MemoryExecutor {
        MemoryExecutor::Pool(Arc::clone(&self.shared))
    }

    fn bind(&self, handle: &TransactionHandle<MemoryConnection>) -> MemoryExecutor {
        MemoryExecutor::Transaction(handle.clone())
    }

    fn checked_out(&self) -> usize {
        self.shared.checked_out.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub enum MemoryExecutor {
    Pool(Arc<Shared>),
    Transaction(TransactionHandle<MemoryConnection>),
}

impl MemoryExecutor {
    async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> TransactionResult<R> {
        match self {
            MemoryExecutor::Pool(shared) => {
                shared.statements.fetch_add(1, Ordering::SeqCst);
                let tables = shared.tables.lock();
                Ok(f(&tables))
            }
            MemoryExecutor::Transaction(handle) => {
                let connection = handle.connection().await?;
                connection.shared.statements.fetch_add(1, Ordering::SeqCst);
                Ok(f(&connection.working))
            }
        }
    }

    async fn write(&self, op: Op) -> TransactionResult<()> {
        match self {
            MemoryExecutor::Pool(shared) => {
                shared.statements.fetch_add(1, Ordering::SeqCst);
                op.apply(&mut shared.tables.lock());
            }
            MemoryExecutor::Transaction(handle) => {
                let mut connection = handle.connection().await?;
                connection.shared.statements.fetch_add(1, Ordering::SeqCst);
                op.apply(&mut connection.working);
                connection.ops.push(op);
            }
        }
        Ok(())
    }
}

fn constraint_violation(message: &str) -> TransactionError {
    TransactionError::DatabaseError(sqlx::Error::Protocol(message.to_string()))
}

pub struct MemoryUserStore {
    executor: MemoryExecutor,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, name: &str, email: &str) -> TransactionResult<User> {
        if email.is_empty() {
            return Err(constraint_violation("NOT NULL constraint failed: users.email"));
        }
        let user = User::new(name.to_string(), email.to_string());
        self.executor.write(Op::PutUser(user.clone())).await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> TransactionResult<User> {
        self.executor
            .read(|tables| tables.users.get(&id).cloned())
            .await?
            .ok_or_else(|| TransactionError::not_found("user", id))
    }

    async fn list_users(&self) -> TransactionResult<Vec<User>> {
        self.executor
            .read(|tables| {
                let mut users: Vec<User> = tables.users.values().cloned().collect();
                users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                users
            })
            .await
    }

    async fn update_user(&self, id: Uuid, name: &str, email: &str) -> TransactionResult<User> {
        let mut user = self.get_user(id).await?;
        user.name = name.to_string();
        user.email = email.to_string();
        user.updated_at = now_millis();
        self.executor.write(Op::PutUser(user.clone())).await?;
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> TransactionResult<()> {
        self.get_user(id).await?;
        self.executor.write(Op::DeleteUser(id)).await
    }
}

pub struct MemoryPostStore {
    executor: MemoryExecutor,
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create_post(
        &self,
        user_id: Uuid,
        title: &str,
        content: &str,
    ) -> TransactionResult<Post> {
        if title.is_empty() {
            return Err(constraint_violation("CHECK constraint failed: title"));
        }
        let owner_exists = self
            .executor
            .read(|tables| tables.users.contains_key(&user_id))
            .await?;
        if !owner_exists {
            return Err(constraint_violation("FOREIGN KEY constraint failed"));
        }
        let post = Post::new(user_id, title.to_string(), content.to_string());
        self.executor.write(Op::PutPost(post.clone())).await?;
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> TransactionResult<Post> {
        self.executor
            .read(|tables| tables.posts.get(&id).cloned())
            .await?
            .ok_or_else(|| TransactionError::not_found("post", id))
    }

    async fn list_posts_by_user(&self, user_id: Uuid) -> TransactionResult<Vec<Post>> {
        self.executor
            .read(|tables| {
                let mut posts: Vec<Post> = tables
                    .posts
                    .values()
                    .filter(|post| post.user_id == user_id)
                    .cloned()
                    .collect();
                posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
                posts
            })
            .await
    }

    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> TransactionResult<Post> {
        let mut post = self.get_post(id).await?;
        post.title = title.to_string();
        post.content = content.to_string();
        post.updated_at = now_millis();
        self.executor.write(Op::PutPost(post.clone())).await?;
        Ok(post)
    }

    async fn delete_post(&self, id: Uuid) -> TransactionResult<()> {
        self.get_post(id).await?;
        self.executor.write(Op::DeletePost(id)).await
    }
}

/// Repository factory for the in-memory datastore.
pub fn memory_stores(executor: MemoryExecutor) -> Stores {
    Stores {
        users: Arc::new(MemoryUserStore {
            executor: executor.clone(),
        }),
        posts: Arc::new(MemoryPostStore { executor }),
    }
}
