use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use strata_core::{EntityDescriptor, MetaRegistry, TableDescriptor};

use crate::entity::{Entity, FieldAccessor, Patch};
use crate::error::DataError;
use crate::executor::{OrderDirection, RelationalExecutor, SelectOptions};
use crate::mapper::{column_name, FieldMapper};
use crate::page::{Page, Pageable};
use crate::tx::TxContext;
use crate::value::{Row, Value};

/// Repository tuning knobs, deserializable from host application config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    /// Table to use when no entity metadata is registered. Without it,
    /// missing metadata is a configuration error on first use.
    pub fallback_table: Option<String>,
    /// Primary-key attribute to assume when metadata declares none.
    /// Defaults to `id`.
    pub primary_key: Option<String>,
}

/// Resolved per-instance state: table, field mapper, primary key, accessors.
struct Mapping<T: Entity> {
    table: String,
    mapper: FieldMapper,
    pk_field: String,
    pk_column: String,
    accessors: HashMap<&'static str, &'static FieldAccessor<T>>,
}

/// A generic repository for any [`Entity`], driven entirely by registry
/// metadata — no per-entity boilerplate.
///
/// On first use it resolves the entity's descriptors from the
/// [`MetaRegistry`] and builds the [`FieldMapper`]; every operation then
/// routes through the ambient [`TxContext`] handle when one is active, or
/// the repository's own default executor otherwise.
///
/// # Example
///
/// ```ignore
/// let repo: Repository<Order> = Repository::new(registry, executor);
/// let order = repo.create(Patch::new().set("total", "19.99")).await?;
/// let found = repo.find_by_id(order.id.clone().unwrap()).await?;
/// ```
pub struct Repository<T: Entity> {
    registry: Arc<MetaRegistry>,
    executor: Arc<dyn RelationalExecutor>,
    options: RepositoryOptions,
    mapping: OnceCell<Mapping<T>>,
}

impl<T: Entity> Repository<T> {
    pub fn new(registry: Arc<MetaRegistry>, executor: Arc<dyn RelationalExecutor>) -> Self {
        Self::with_options(registry, executor, RepositoryOptions::default())
    }

    pub fn with_options(
        registry: Arc<MetaRegistry>,
        executor: Arc<dyn RelationalExecutor>,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            registry,
            executor,
            options,
            mapping: OnceCell::new(),
        }
    }

    /// Resolve metadata and build the mapper, exactly once per instance.
    ///
    /// Implicitly invoked by every public operation. Metadata absence
    /// degrades automatic mapping (see [`RepositoryOptions::fallback_table`])
    /// but never blocks basic I/O once a table name is known.
    async fn mapping(&self) -> Result<&Mapping<T>, DataError> {
        self.mapping
            .get_or_try_init(|| async { self.resolve_mapping() })
            .await
    }

    fn resolve_mapping(&self) -> Result<Mapping<T>, DataError> {
        let name = T::entity_name();
        let accessors: HashMap<_, _> = T::accessors().iter().map(|a| (a.name, a)).collect();

        match self.registry.entity(name) {
            Some(entity) => {
                let table_descriptor = self
                    .registry
                    .table(&entity.table)
                    .unwrap_or_else(|| synthesize_table(&entity));
                let mapper = FieldMapper::build(&entity, &table_descriptor)?;
                let pk_field = entity
                    .primary_key()
                    .map(|f| f.name.clone())
                    .or_else(|| self.options.primary_key.clone())
                    .unwrap_or_else(|| "id".to_string());
                let pk_column = mapper
                    .column_for(&pk_field)
                    .map(str::to_string)
                    .unwrap_or_else(|| column_name(&pk_field));
                Ok(Mapping {
                    table: entity.table,
                    mapper,
                    pk_field,
                    pk_column,
                    accessors,
                })
            }
            None => {
                let Some(table) = self.options.fallback_table.clone() else {
                    return Err(DataError::Configuration(format!(
                        "no metadata registered for entity `{name}` and no fallback table configured"
                    )));
                };
                warn!(
                    entity = name,
                    table = %table,
                    "no metadata registered; using degraded identity mapping"
                );
                let mapper =
                    FieldMapper::from_field_names(name, T::accessors().iter().map(|a| a.name));
                let pk_field = self
                    .options
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| "id".to_string());
                let pk_column = mapper
                    .column_for(&pk_field)
                    .map(str::to_string)
                    .unwrap_or_else(|| column_name(&pk_field));
                Ok(Mapping {
                    table,
                    mapper,
                    pk_field,
                    pk_column,
                    accessors,
                })
            }
        }
    }

    /// The connection for the current call: the innermost ambient transaction
    /// if one is active, the default executor otherwise.
    fn executor(&self) -> Arc<dyn RelationalExecutor> {
        match TxContext::active() {
            Some(handle) => handle.executor(),
            None => self.executor.clone(),
        }
    }

    fn row_to_entity(&self, mapping: &Mapping<T>, row: Row) -> Result<T, DataError> {
        let mut entity = T::default();
        for (column, raw) in row {
            // Columns outside the mapping never populate an attribute.
            let Some(field) = mapping.mapper.field_for(&column) else {
                continue;
            };
            let Some(value) = mapping.mapper.to_domain(field, raw)? else {
                continue;
            };
            if let Some(accessor) = mapping.accessors.get(field) {
                (accessor.set)(&mut entity, value);
            }
        }
        Ok(entity)
    }

    fn patch_to_row(&self, mapping: &Mapping<T>, patch: &Patch) -> Result<Row, DataError> {
        let mut row = Row::new();
        for (field, value) in patch.iter() {
            let Some(column) = mapping.mapper.column_for(field) else {
                debug!(
                    entity = %mapping.mapper.entity_name(),
                    field = %field,
                    "attribute has no mapped column; skipped"
                );
                continue;
            };
            row.insert(
                column.to_string(),
                mapping.mapper.to_storage(field, value.clone())?,
            );
        }
        Ok(row)
    }

    fn pk_filter(
        &self,
        mapping: &Mapping<T>,
        id: Value,
    ) -> Result<Vec<(String, Value)>, DataError> {
        let id = mapping.mapper.to_storage(&mapping.pk_field, id)?;
        Ok(vec![(mapping.pk_column.clone(), id)])
    }

    async fn fetch_by_id(&self, id: Value) -> Result<Option<T>, DataError> {
        let mapping = self.mapping().await?;
        let filter = self.pk_filter(mapping, id)?;
        let row = self.executor().select_one(&mapping.table, &filter).await?;
        row.map(|r| self.row_to_entity(mapping, r)).transpose()
    }

    /// Single-row lookup by primary key.
    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<T>, DataError> {
        self.fetch_by_id(id.into()).await
    }

    /// Scan with optional ordering/pagination. `order_by` takes an attribute
    /// name and is mapped to its column. No implicit limit.
    pub async fn find_all(&self, options: &SelectOptions) -> Result<Vec<T>, DataError> {
        let mapping = self.mapping().await?;
        let mut options = options.clone();
        if let Some(field) = options.order_by.take() {
            options.order_by = Some(
                mapping
                    .mapper
                    .column_for(&field)
                    .map(str::to_string)
                    .unwrap_or(field),
            );
        }
        let rows = self.executor().select(&mapping.table, &[], &options).await?;
        rows.into_iter()
            .map(|r| self.row_to_entity(mapping, r))
            .collect()
    }

    /// One page of results plus pagination metadata.
    pub async fn find_page(&self, pageable: &Pageable) -> Result<Page<T>, DataError> {
        let mapping = self.mapping().await?;
        let executor = self.executor();
        let total = executor.count(&mapping.table, &[]).await?;

        let mut options = SelectOptions::new()
            .limit(pageable.size)
            .offset(pageable.offset());
        if let Some(sort) = &pageable.sort {
            let (field, direction) = parse_sort(sort);
            options.order_by = Some(
                mapping
                    .mapper
                    .column_for(&field)
                    .map(str::to_string)
                    .unwrap_or(field),
            );
            options.direction = direction;
        }

        let rows = executor.select(&mapping.table, &[], &options).await?;
        let content = rows
            .into_iter()
            .map(|r| self.row_to_entity(mapping, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, pageable, total))
    }

    /// Insert the attributes present in `patch` and return the entity rebuilt
    /// from the stored row, so server-computed defaults are reflected.
    pub async fn create(&self, patch: Patch) -> Result<T, DataError> {
        let mapping = self.mapping().await?;
        let row = self.patch_to_row(mapping, &patch)?;
        let inserted = self.executor().insert(&mapping.table, row).await?;
        self.row_to_entity(mapping, inserted)
    }

    /// Partial update: only attributes present in `patch` reach storage.
    /// `Ok(None)` if no row matched the id.
    pub async fn update(
        &self,
        id: impl Into<Value>,
        patch: Patch,
    ) -> Result<Option<T>, DataError> {
        let id = id.into();
        let mapping = self.mapping().await?;
        let changes = self.patch_to_row(mapping, &patch)?;
        if changes.is_empty() {
            return self.fetch_by_id(id).await;
        }
        let filter = self.pk_filter(mapping, id)?;
        let updated = self
            .executor()
            .update(&mapping.table, &filter, changes)
            .await?;
        updated.map(|r| self.row_to_entity(mapping, r)).transpose()
    }

    /// Returns whether a row was actually removed.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<bool, DataError> {
        let mapping = self.mapping().await?;
        let filter = self.pk_filter(mapping, id.into())?;
        Ok(self.executor().delete(&mapping.table, &filter).await? > 0)
    }

    /// Count rows matching attribute-level equality filters.
    pub async fn count(&self, filter: &[(String, Value)]) -> Result<u64, DataError> {
        let mapping = self.mapping().await?;
        let mut mapped = Vec::with_capacity(filter.len());
        for (field, value) in filter {
            let column = mapping
                .mapper
                .column_for(field)
                .map(str::to_string)
                .unwrap_or_else(|| column_name(field));
            mapped.push((column, mapping.mapper.to_storage(field, value.clone())?));
        }
        self.executor().count(&mapping.table, &mapped).await
    }

    pub async fn exists(&self, id: impl Into<Value>) -> Result<bool, DataError> {
        let mapping = self.mapping().await?;
        let filter = self.pk_filter(mapping, id.into())?;
        Ok(self.executor().count(&mapping.table, &filter).await? > 0)
    }

    /// Run `body` inside a transaction.
    ///
    /// Joins the ambient handle if the caller already opened one (commit
    /// stays with the outermost scope). Otherwise begins on the default
    /// executor, commits on `Ok`, rolls back on `Err`.
    pub async fn transaction<F, Fut, R>(&self, body: F) -> Result<R, DataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, DataError>>,
    {
        self.mapping().await?;
        if TxContext::has_active() {
            return body().await;
        }
        let handle = self.executor.begin().await?;
        let result = TxContext::run(handle.clone(), body()).await;
        match &result {
            Ok(_) => handle.commit().await?,
            Err(_) => handle.rollback().await?,
        }
        result
    }
}

fn synthesize_table(entity: &EntityDescriptor) -> TableDescriptor {
    let mut table = TableDescriptor::new(entity.table.clone());
    for field in entity.mapped_fields() {
        let column = field
            .source_column
            .clone()
            .unwrap_or_else(|| column_name(&field.name));
        table = table.column(column);
    }
    table
}

fn parse_sort(sort: &str) -> (String, OrderDirection) {
    match sort.split_once(',') {
        Some((field, dir)) if dir.trim().eq_ignore_ascii_case("desc") => {
            (field.trim().to_string(), OrderDirection::Descending)
        }
        Some((field, _)) => (field.trim().to_string(), OrderDirection::Ascending),
        None => (sort.trim().to_string(), OrderDirection::Ascending),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_strings() {
        assert_eq!(
            parse_sort("createdAt,desc"),
            ("createdAt".to_string(), OrderDirection::Descending)
        );
        assert_eq!(
            parse_sort("name, asc"),
            ("name".to_string(), OrderDirection::Ascending)
        );
        assert_eq!(
            parse_sort("total"),
            ("total".to_string(), OrderDirection::Ascending)
        );
    }

    #[test]
    fn synthesized_table_uses_the_naming_transform() {
        use strata_core::{FieldDescriptor, FieldKind, RelationKind};

        let entity = EntityDescriptor::new("Order", "orders")
            .field(FieldDescriptor::new("id", FieldKind::Text).primary_key())
            .field(FieldDescriptor::new("totalAmount", FieldKind::Decimal))
            .field(
                FieldDescriptor::new("customer", FieldKind::Relation)
                    .relation(RelationKind::ManyToOne, "Customer"),
            );
        let table = synthesize_table(&entity);
        let columns: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, vec!["id", "total_amount"]);
    }
}
