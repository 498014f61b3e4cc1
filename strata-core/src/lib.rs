//! # strata-core — metadata core for the Strata platform
//!
//! Process-wide catalog of declarative metadata: entity and table
//! descriptors, arbitrary extension types, change notifications, and
//! derived-metadata recomputation.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EntityDescriptor`] / [`FieldDescriptor`] | Declarative entity/field descriptions, built with chainable constructors |
//! | [`TableDescriptor`] | Storage-side table/column description |
//! | [`MetaRegistry`] | Named+typed item catalog with listeners and a derivation protocol |
//! | [`TypeConfig`] | Declaration of a type category, optionally derived from source types |
//! | [`RelationDescriptor`] | Derived relation record, one per relation/embedded field |
//! | [`ItemState`] | JSON interop shape (`{ name, __type, fields?, table?, comment? }`) |
//!
//! # Quick start
//!
//! ```
//! use strata_core::{EntityDescriptor, FieldDescriptor, FieldKind, MetaRegistry, RegistryItem};
//!
//! let registry = MetaRegistry::new();
//! registry.register(RegistryItem::entity(
//!     EntityDescriptor::new("Order", "orders")
//!         .field(FieldDescriptor::new("id", FieldKind::Text).primary_key().required())
//!         .field(FieldDescriptor::new("total", FieldKind::Decimal)),
//! ));
//!
//! assert_eq!(registry.entity("Order").unwrap().table, "orders");
//! ```

pub mod descriptor;
pub mod registry;
pub mod relations;
pub mod state;

pub use descriptor::{
    ColumnDescriptor, EntityDescriptor, FieldDescriptor, FieldKind, IndexDescriptor,
    RelationDescriptor, RelationKind, TableDescriptor,
};
pub use registry::{
    ChangeEvent, ChangeKind, ItemPayload, Layer, MetaRegistry, RegistryItem, RegistrySnapshot,
    TypeConfig,
};
pub use state::{FieldState, ItemState};

pub mod prelude {
    //! Re-exports of the most commonly used metadata types.
    pub use crate::{
        EntityDescriptor, FieldDescriptor, FieldKind, MetaRegistry, RegistryItem, RelationKind,
        TableDescriptor,
    };
}
