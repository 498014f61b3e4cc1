use async_trait::async_trait;

use crate::error::DataError;
use crate::tx::TransactionHandle;
use crate::value::{Row, Value};

/// Sort direction for ordered selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// Ordering and pagination of a select.
///
/// No implicit limit: callers are responsible for bounding result size.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<String>,
    pub direction: OrderDirection,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = OrderDirection::Descending;
        self
    }
}

/// The relational query executor the engine is built against.
///
/// An implementation already understands table/column names and basic
/// equality predicates; SQL dialects, query building, and retry policy live
/// behind this boundary. Filters are conjunctions of column equalities.
#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    /// Ordered/paginated select of whole rows.
    async fn select(
        &self,
        table: &str,
        filter: &[(String, Value)],
        options: &SelectOptions,
    ) -> Result<Vec<Row>, DataError>;

    /// First row matching the filter, if any.
    async fn select_one(
        &self,
        table: &str,
        filter: &[(String, Value)],
    ) -> Result<Option<Row>, DataError>;

    /// Insert one row and return it as stored (including server-computed
    /// defaults such as generated keys).
    async fn insert(&self, table: &str, row: Row) -> Result<Row, DataError>;

    /// Apply `changes` to every matching row; returns the first updated row
    /// as stored, or `None` if nothing matched.
    async fn update(
        &self,
        table: &str,
        filter: &[(String, Value)],
        changes: Row,
    ) -> Result<Option<Row>, DataError>;

    /// Delete matching rows, returning how many were removed.
    async fn delete(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError>;

    async fn count(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError>;

    /// Open a transaction on this executor.
    ///
    /// The returned handle is itself a [`RelationalExecutor`] over the
    /// transaction's scope; commit/rollback semantics stay with the backend.
    async fn begin(&self) -> Result<TransactionHandle, DataError>;
}
