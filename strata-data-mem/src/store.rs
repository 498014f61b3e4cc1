use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use strata_data::{
    DataError, OrderDirection, RelationalExecutor, Row, SelectOptions, TransactionHandle, Value,
};

use crate::tx::MemoryTransaction;

pub(crate) type Tables = BTreeMap<String, Vec<Row>>;

/// In-memory relational executor.
///
/// Tables are created on first write; filters are conjunctions of column
/// equalities. Inserts populate a missing id column with a UUID v4 string,
/// standing in for a real backend's generated keys.
///
/// # Example
///
/// ```
/// use strata_data_mem::MemoryExecutor;
///
/// let executor = MemoryExecutor::new();
/// ```
#[derive(Clone)]
pub struct MemoryExecutor {
    tables: Arc<RwLock<Tables>>,
    id_column: String,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::new())),
            id_column: "id".to_string(),
        }
    }

    /// Change the column populated with generated keys (default `id`).
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationalExecutor for MemoryExecutor {
    async fn select(
        &self,
        table: &str,
        filter: &[(String, Value)],
        options: &SelectOptions,
    ) -> Result<Vec<Row>, DataError> {
        Ok(select_rows(&self.tables.read().unwrap(), table, filter, options))
    }

    async fn select_one(
        &self,
        table: &str,
        filter: &[(String, Value)],
    ) -> Result<Option<Row>, DataError> {
        let tables = self.tables.read().unwrap();
        Ok(select_rows(&tables, table, filter, &SelectOptions::new().limit(1)).pop())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, DataError> {
        Ok(insert_row(
            &mut self.tables.write().unwrap(),
            table,
            row,
            &self.id_column,
        ))
    }

    async fn update(
        &self,
        table: &str,
        filter: &[(String, Value)],
        changes: Row,
    ) -> Result<Option<Row>, DataError> {
        Ok(update_rows(
            &mut self.tables.write().unwrap(),
            table,
            filter,
            &changes,
        ))
    }

    async fn delete(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError> {
        Ok(delete_rows(&mut self.tables.write().unwrap(), table, filter))
    }

    async fn count(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError> {
        Ok(count_rows(&self.tables.read().unwrap(), table, filter))
    }

    async fn begin(&self) -> Result<TransactionHandle, DataError> {
        let tx = Arc::new(MemoryTransaction::over(
            self.tables.clone(),
            self.id_column.clone(),
        ));
        Ok(TransactionHandle::new(tx.clone(), tx))
    }
}

fn row_matches(row: &Row, filter: &[(String, Value)]) -> bool {
    filter
        .iter()
        .all(|(column, value)| row.get(column) == Some(value))
}

pub(crate) fn select_rows(
    tables: &Tables,
    table: &str,
    filter: &[(String, Value)],
    options: &SelectOptions,
) -> Vec<Row> {
    let mut rows: Vec<Row> = tables
        .get(table)
        .map(|rows| {
            rows.iter()
                .filter(|r| row_matches(r, filter))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if let Some(column) = &options.order_by {
        rows.sort_by(|a, b| {
            let av = a.get(column).unwrap_or(&Value::Null);
            let bv = b.get(column).unwrap_or(&Value::Null);
            av.compare(bv)
        });
        if options.direction == OrderDirection::Descending {
            rows.reverse();
        }
    }

    let offset = options.offset.unwrap_or(0) as usize;
    if offset > 0 {
        rows = rows.split_off(rows.len().min(offset));
    }
    if let Some(limit) = options.limit {
        rows.truncate(limit as usize);
    }
    rows
}

pub(crate) fn insert_row(tables: &mut Tables, table: &str, mut row: Row, id_column: &str) -> Row {
    let missing_id = match row.get(id_column) {
        None => true,
        Some(value) => value.is_null(),
    };
    if missing_id {
        row.insert(
            id_column.to_string(),
            Value::Text(Uuid::new_v4().to_string()),
        );
    }
    tables.entry(table.to_string()).or_default().push(row.clone());
    row
}

pub(crate) fn update_rows(
    tables: &mut Tables,
    table: &str,
    filter: &[(String, Value)],
    changes: &Row,
) -> Option<Row> {
    let rows = tables.get_mut(table)?;
    let mut first = None;
    for row in rows.iter_mut().filter(|r| row_matches(r, filter)) {
        for (column, value) in changes {
            row.insert(column.clone(), value.clone());
        }
        if first.is_none() {
            first = Some(row.clone());
        }
    }
    first
}

pub(crate) fn delete_rows(tables: &mut Tables, table: &str, filter: &[(String, Value)]) -> u64 {
    let Some(rows) = tables.get_mut(table) else {
        return 0;
    };
    let before = rows.len();
    rows.retain(|r| !row_matches(r, filter));
    (before - rows.len()) as u64
}

pub(crate) fn count_rows(tables: &Tables, table: &str, filter: &[(String, Value)]) -> u64 {
    tables
        .get(table)
        .map(|rows| rows.iter().filter(|r| row_matches(r, filter)).count() as u64)
        .unwrap_or(0)
}
