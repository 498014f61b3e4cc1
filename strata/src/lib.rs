//! Strata — the metadata-driven persistence engine of the Strata platform.
//!
//! This facade crate re-exports the engine's sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use strata::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature | Default | Crate                              |
//! |---------|---------|------------------------------------|
//! | `mem`   | no      | `strata-data-mem` (in-memory backend) |
//! | `full`  | no      | All of the above                   |
//!
//! # The engine in one paragraph
//!
//! Declare an entity once (field names, semantic types, primary key, table)
//! in the [`MetaRegistry`](strata_core::MetaRegistry); a
//! [`Repository`](strata_data::Repository) derives the attribute↔column
//! mapping, coerces values exactly (arbitrary-precision decimals, dates),
//! performs CRUD and paged queries, and transparently joins the ambient
//! transaction when an application service opened one further up the stack.

pub use strata_core;
pub use strata_data;

#[cfg(feature = "mem")]
pub use strata_data_mem;

// Re-export the core types at the top level for convenience.
pub use strata_core::{
    EntityDescriptor, FieldDescriptor, FieldKind, MetaRegistry, RegistryItem, RelationKind,
    TableDescriptor, TypeConfig,
};
pub use strata_data::{
    DataError, Entity, FieldAccessor, Page, Pageable, Patch, RelationalExecutor, Repository,
    RepositoryOptions, SelectOptions, TransactionHandle, TxContext, Value,
};

/// Re-exports of the most commonly used types across all sub-crates.
pub mod prelude {
    pub use strata_core::prelude::*;
    pub use strata_data::prelude::*;

    #[cfg(feature = "mem")]
    pub use strata_data_mem::MemoryExecutor;
}
