//! Ambient transaction context.
//!
//! An application service opens a transaction once; every repository call
//! beneath it observes the same handle through a task-local stack, with no
//! explicit handle passing. The stack is strictly LIFO and scoped: the push
//! performed by [`TxContext::run`] is undone on every exit path (normal
//! return, error, cancellation) because the scope itself owns the stack.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DataError;
use crate::executor::RelationalExecutor;

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Commit/rollback surface of one open transaction, implemented by backends.
#[async_trait]
pub trait TransactionControl: Send + Sync {
    async fn commit(&self) -> Result<(), DataError>;
    async fn rollback(&self) -> Result<(), DataError>;
}

/// Opaque reference to an active connection/transaction.
///
/// Cloning shares the same underlying transaction; equality is by identity.
#[derive(Clone)]
pub struct TransactionHandle {
    id: u64,
    executor: Arc<dyn RelationalExecutor>,
    control: Arc<dyn TransactionControl>,
}

impl TransactionHandle {
    pub fn new(
        executor: Arc<dyn RelationalExecutor>,
        control: Arc<dyn TransactionControl>,
    ) -> Self {
        Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::Relaxed),
            executor,
            control,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The query surface of this transaction.
    pub fn executor(&self) -> Arc<dyn RelationalExecutor> {
        self.executor.clone()
    }

    pub async fn commit(&self) -> Result<(), DataError> {
        self.control.commit().await
    }

    pub async fn rollback(&self) -> Result<(), DataError> {
        self.control.rollback().await
    }
}

impl PartialEq for TransactionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransactionHandle {}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle").field("id", &self.id).finish()
    }
}

tokio::task_local! {
    static TX_STACK: Vec<TransactionHandle>;
}

/// Stack-scoped access to the currently active transaction.
///
/// Task-local, so two concurrently executing logical requests observe
/// different active handles even though they share one process-wide registry.
pub struct TxContext;

impl TxContext {
    /// The innermost active handle, if any.
    pub fn active() -> Option<TransactionHandle> {
        TX_STACK.try_with(|stack| stack.last().cloned()).ok().flatten()
    }

    pub fn has_active() -> bool {
        Self::active().is_some()
    }

    /// Current nesting depth. Zero outside any transaction scope.
    pub fn depth() -> usize {
        TX_STACK.try_with(Vec::len).unwrap_or(0)
    }

    /// Run `body` with `handle` pushed as the innermost active transaction.
    ///
    /// Popping is guaranteed on every exit path: the pushed stack lives only
    /// for the duration of the scope.
    pub async fn run<F>(handle: TransactionHandle, body: F) -> F::Output
    where
        F: Future,
    {
        let mut stack = TX_STACK.try_with(Clone::clone).unwrap_or_default();
        stack.push(handle);
        TX_STACK.scope(stack, body).await
    }
}
