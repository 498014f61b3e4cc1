use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;

use strata_data::{
    DataError, RelationalExecutor, Row, SelectOptions, TransactionControl, TransactionHandle,
    Value,
};

use crate::store::{
    count_rows, delete_rows, insert_row, select_rows, update_rows, Tables,
};

/// Snapshot transaction over a [`MemoryExecutor`](crate::MemoryExecutor)
/// store.
///
/// `begin` clones the parent state; queries run against the private copy.
/// `commit` swaps the copy back into the parent (last committed transaction
/// wins), `rollback` just discards it. A nested `begin` snapshots the
/// transaction's own copy, giving savepoint semantics.
pub struct MemoryTransaction {
    parent: Arc<RwLock<Tables>>,
    working: Arc<RwLock<Tables>>,
    id_column: String,
    finished: Mutex<bool>,
}

impl MemoryTransaction {
    pub(crate) fn over(parent: Arc<RwLock<Tables>>, id_column: String) -> Self {
        let copy = parent.read().unwrap().clone();
        Self {
            parent,
            working: Arc::new(RwLock::new(copy)),
            id_column,
            finished: Mutex::new(false),
        }
    }

    fn finish(&self) -> Result<(), DataError> {
        let mut finished = self.finished.lock().unwrap();
        if *finished {
            return Err(DataError::Other(
                "transaction already committed or rolled back".to_string(),
            ));
        }
        *finished = true;
        Ok(())
    }
}

#[async_trait]
impl TransactionControl for MemoryTransaction {
    async fn commit(&self) -> Result<(), DataError> {
        self.finish()?;
        let working = self.working.read().unwrap().clone();
        *self.parent.write().unwrap() = working;
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DataError> {
        self.finish()?;
        debug!("memory transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl RelationalExecutor for MemoryTransaction {
    async fn select(
        &self,
        table: &str,
        filter: &[(String, Value)],
        options: &SelectOptions,
    ) -> Result<Vec<Row>, DataError> {
        Ok(select_rows(&self.working.read().unwrap(), table, filter, options))
    }

    async fn select_one(
        &self,
        table: &str,
        filter: &[(String, Value)],
    ) -> Result<Option<Row>, DataError> {
        let tables = self.working.read().unwrap();
        Ok(select_rows(&tables, table, filter, &SelectOptions::new().limit(1)).pop())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, DataError> {
        Ok(insert_row(
            &mut self.working.write().unwrap(),
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
            &mut self.working.write().unwrap(),
            table,
            filter,
            &changes,
        ))
    }

    async fn delete(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError> {
        Ok(delete_rows(&mut self.working.write().unwrap(), table, filter))
    }

    async fn count(&self, table: &str, filter: &[(String, Value)]) -> Result<u64, DataError> {
        Ok(count_rows(&self.working.read().unwrap(), table, filter))
    }

    async fn begin(&self) -> Result<TransactionHandle, DataError> {
        let tx = Arc::new(MemoryTransaction::over(
            self.working.clone(),
            self.id_column.clone(),
        ));
        Ok(TransactionHandle::new(tx.clone(), tx))
    }
}

#[cfg(test)]
mod tests {
    use crate::MemoryExecutor;
    use strata_data::{RelationalExecutor, SelectOptions, Value};

    fn order_row(id: &str) -> strata_data::Row {
        [("id".to_string(), Value::Text(id.to_string()))].into_iter().collect()
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let executor = MemoryExecutor::new();
        let tx = executor.begin().await.unwrap();
        tx.executor().insert("orders", order_row("o-1")).await.unwrap();

        // Invisible outside until commit.
        assert_eq!(executor.count("orders", &[]).await.unwrap(), 0);
        tx.commit().await.unwrap();
        assert_eq!(executor.count("orders", &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let executor = MemoryExecutor::new();
        executor.insert("orders", order_row("o-1")).await.unwrap();

        let tx = executor.begin().await.unwrap();
        tx.executor().delete("orders", &[]).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(executor.count("orders", &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn double_finish_is_rejected() {
        let executor = MemoryExecutor::new();
        let tx = executor.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.rollback().await.is_err());
    }

    #[tokio::test]
    async fn nested_begin_acts_as_savepoint() {
        let executor = MemoryExecutor::new();
        let outer = executor.begin().await.unwrap();
        outer.executor().insert("orders", order_row("o-1")).await.unwrap();

        let inner = outer.executor().begin().await.unwrap();
        inner.executor().insert("orders", order_row("o-2")).await.unwrap();
        inner.rollback().await.unwrap();

        // The savepoint write is gone, the outer write survives.
        let rows = outer
            .executor()
            .select("orders", &[], &SelectOptions::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        outer.commit().await.unwrap();
        assert_eq!(executor.count("orders", &[]).await.unwrap(), 1);
    }
}
