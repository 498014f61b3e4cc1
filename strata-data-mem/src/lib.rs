//! # strata-data-mem — in-memory backend for the Strata data layer
//!
//! A [`RelationalExecutor`](strata_data::RelationalExecutor) over plain
//! in-process tables, with snapshot-based transactions. It exists for tests,
//! prototyping, and as the reference implementation of the executor
//! boundary; production backends plug a real database into the same trait.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryExecutor`] | Table map behind a lock; equality filters, ordering, paging, generated ids |
//! | [`MemoryTransaction`] | Snapshot transaction: private copy, commit swaps it back, rollback discards |
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use strata_core::MetaRegistry;
//! use strata_data::Repository;
//! use strata_data_mem::MemoryExecutor;
//!
//! # #[derive(Default)] struct Order;
//! # impl strata_data::Entity for Order {
//! #     fn entity_name() -> &'static str { "Order" }
//! #     fn accessors() -> &'static [strata_data::FieldAccessor<Self>] { &[] }
//! # }
//! let registry = Arc::new(MetaRegistry::new());
//! let executor = Arc::new(MemoryExecutor::new());
//! let repo: Repository<Order> = Repository::new(registry, executor);
//! ```

pub mod store;
pub mod tx;

pub use store::MemoryExecutor;
pub use tx::MemoryTransaction;

/// Re-exports of the most commonly used types from `strata-data` and this crate.
pub mod prelude {
    pub use crate::MemoryExecutor;
    pub use strata_data::prelude::*;
}
