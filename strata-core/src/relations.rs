//! Built-in entity-relationship extraction.
//!
//! Registered as the derivation behind the `relation` type: every entity
//! field carrying a relation or embedding marker yields one
//! [`RelationDescriptor`], named `"{source}.{field}"`.

use tracing::debug;

use crate::descriptor::RelationDescriptor;
use crate::registry::{RegistryItem, RegistrySnapshot};

pub fn derive_relations(snapshot: &RegistrySnapshot) -> Vec<RegistryItem> {
    let mut out = Vec::new();
    for entity in snapshot.entities() {
        for field in &entity.fields {
            let Some(kind) = field.relation else {
                continue;
            };
            let Some(target) = field.target.clone() else {
                debug!(
                    entity = %entity.name,
                    field = %field.name,
                    "relation field without a target; skipping"
                );
                continue;
            };
            out.push(RegistryItem::relation(RelationDescriptor {
                name: format!("{}.{}", entity.name, field.name),
                source: entity.name.clone(),
                target,
                field: field.name.clone(),
                kind,
            }));
        }
    }
    out
}
