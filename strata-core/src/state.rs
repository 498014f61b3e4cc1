//! Registry interop state.
//!
//! The lint/IDE tooling exchanges registry contents as a JSON-serializable
//! shape: `{ name, __type, fields?, table?, comment? }`. This module converts
//! between that shape and [`RegistryItem`]s, so a registry can be pre-populated
//! from a static-analysis pass and exported for introspection tooling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::descriptor::{
    EntityDescriptor, FieldDescriptor, FieldKind, RelationDescriptor, RelationKind,
    TableDescriptor,
};
use crate::registry::{ItemPayload, Layer, MetaRegistry, RegistryItem, TypeConfig, BUILTIN_TYPES};

/// Interop shape of one field of an entity item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
}

/// Interop shape of one registry item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemState {
    pub name: String,
    #[serde(rename = "__type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, FieldState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Remaining payload for relation records and extension types.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<&FieldDescriptor> for FieldState {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            kind: field.kind,
            label: field.label.clone(),
            required: field.required,
            primary_key: field.primary_key,
            relation: field.relation,
            target: field.target.clone(),
            default: field.default.clone(),
            source_column: field.source_column.clone(),
        }
    }
}

impl FieldState {
    fn into_descriptor(self, name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            kind: self.kind,
            label: self.label,
            required: self.required,
            primary_key: self.primary_key,
            default: self.default,
            relation: self.relation,
            target: self.target,
            source_column: self.source_column,
        }
    }
}

impl From<&RegistryItem> for ItemState {
    fn from(item: &RegistryItem) -> Self {
        let mut state = ItemState {
            name: item.name.clone(),
            item_type: item.item_type.clone(),
            fields: None,
            table: None,
            comment: None,
            columns: None,
            extra: serde_json::Map::new(),
        };
        match &item.payload {
            ItemPayload::Entity(entity) => {
                state.table = Some(entity.table.clone());
                state.comment = entity.comment.clone();
                state.fields = Some(
                    entity
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), FieldState::from(f)))
                        .collect(),
                );
            }
            ItemPayload::Table(table) => {
                state.comment = table.comment.clone();
                state.columns = Some(table.columns.iter().map(|c| c.name.clone()).collect());
            }
            ItemPayload::Relation(rel) => {
                state.extra.insert("source".into(), rel.source.clone().into());
                state.extra.insert("target".into(), rel.target.clone().into());
                state.extra.insert("field".into(), rel.field.clone().into());
                state.extra.insert(
                    "relation".into(),
                    serde_json::to_value(rel.kind).expect("RelationKind serializes"),
                );
            }
            ItemPayload::Custom(value) => {
                if let serde_json::Value::Object(map) = value {
                    state.extra = map.clone();
                } else {
                    state.extra.insert("value".into(), value.clone());
                }
            }
        }
        state
    }
}

impl ItemState {
    /// Rebuild a [`RegistryItem`] from the interop shape.
    ///
    /// Returns `None` for relation states missing their mandatory keys;
    /// anything with a non-built-in type becomes a `Custom` item.
    pub fn into_item(self) -> Option<RegistryItem> {
        let item_type = self.item_type.clone();
        match item_type.as_str() {
            "entity" => {
                let mut entity = EntityDescriptor::new(
                    self.name.clone(),
                    self.table.unwrap_or_else(|| self.name.clone()),
                );
                entity.comment = self.comment;
                // The interop `fields` shape is a map, so declaration order is
                // not recoverable: fields come back in name order.
                for (name, field) in self.fields.unwrap_or_default() {
                    entity.fields.push(field.into_descriptor(&name));
                }
                Some(RegistryItem::entity(entity))
            }
            "table" => {
                let mut table = TableDescriptor::new(self.name.clone());
                table.comment = self.comment;
                for column in self.columns.unwrap_or_default() {
                    table = table.column(column);
                }
                Some(RegistryItem::table(table))
            }
            "relation" => {
                let get = |key: &str| {
                    self.extra
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                };
                let kind = self
                    .extra
                    .get("relation")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                match (get("source"), get("target"), get("field"), kind) {
                    (Some(source), Some(target), Some(field), Some(kind)) => {
                        Some(RegistryItem::relation(RelationDescriptor {
                            name: self.name,
                            source,
                            target,
                            field,
                            kind,
                        }))
                    }
                    _ => {
                        warn!(name = %self.name, "relation state missing source/target/field");
                        None
                    }
                }
            }
            _ => Some(RegistryItem::custom(
                self.name,
                self.item_type,
                serde_json::Value::Object(self.extra),
            )),
        }
    }
}

impl MetaRegistry {
    /// Export every item in the interop shape.
    pub fn export_state(&self) -> Vec<ItemState> {
        self.get_all().iter().map(ItemState::from).collect()
    }

    /// Register pre-populated state (e.g. loaded from a static-analysis pass).
    ///
    /// Extension types that have not been declared yet are declared on the
    /// fly (Model layer, no derivation) so imported items are not dropped.
    pub fn import_state(&self, items: impl IntoIterator<Item = ItemState>) {
        for state in items {
            if !BUILTIN_TYPES.contains(&state.item_type.as_str()) {
                debug!(item_type = %state.item_type, "declaring imported extension type");
                self.register_type(TypeConfig::new(state.item_type.clone(), Layer::Model));
            }
            if let Some(item) = state.into_item() {
                self.register(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> MetaRegistry {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::entity(
            EntityDescriptor::new("Order", "orders")
                .comment("Customer orders")
                .field(
                    FieldDescriptor::new("id", FieldKind::Text)
                        .primary_key()
                        .required(),
                )
                .field(FieldDescriptor::new("totalAmount", FieldKind::Decimal))
                .field(
                    FieldDescriptor::new("customer", FieldKind::Relation)
                        .relation(RelationKind::ManyToOne, "Customer"),
                ),
        ));
        reg.register(RegistryItem::table(
            TableDescriptor::new("orders")
                .column("id")
                .column("total_amount"),
        ));
        reg
    }

    #[test]
    fn exported_shape_uses_interop_keys() {
        let reg = sample_registry();
        let state = reg.export_state();
        let order = state.iter().find(|s| s.name == "Order").unwrap();
        let json = serde_json::to_value(order).unwrap();

        assert_eq!(json["__type"], "entity");
        assert_eq!(json["table"], "orders");
        assert_eq!(json["fields"]["id"]["primaryKey"], true);
        assert_eq!(json["fields"]["id"]["type"], "string");
        assert_eq!(json["fields"]["totalAmount"]["type"], "decimal");
        assert_eq!(json["fields"]["customer"]["relation"], "many-to-one");
    }

    #[test]
    fn state_roundtrip() {
        let reg = sample_registry();
        let state = reg.export_state();

        let restored = MetaRegistry::new();
        restored.import_state(state);

        let entity = restored.entity("Order").unwrap();
        assert_eq!(entity.table, "orders");
        assert_eq!(entity.fields.len(), 3);
        assert_eq!(entity.primary_key().unwrap().name, "id");
        assert_eq!(restored.table("orders").unwrap().columns.len(), 2);
        // Derived relations recompute from the imported entities.
        assert_eq!(restored.relations().len(), 1);
    }

    #[test]
    fn custom_items_roundtrip_through_extra() {
        let reg = MetaRegistry::new();
        reg.register_type(TypeConfig::new("widget", Layer::Model));
        reg.register(RegistryItem::custom(
            "OrderList",
            "widget",
            serde_json::json!({"entity": "Order", "pageSize": 25}),
        ));

        let restored = MetaRegistry::new();
        restored.import_state(reg.export_state());

        let item = restored.get("OrderList").unwrap();
        match item.payload {
            ItemPayload::Custom(value) => {
                assert_eq!(value["entity"], "Order");
                assert_eq!(value["pageSize"], 25);
            }
            other => panic!("expected Custom payload, got {other:?}"),
        }
    }

    #[test]
    fn import_from_raw_json() {
        let raw = serde_json::json!([{
            "name": "Invoice",
            "__type": "entity",
            "table": "invoices",
            "fields": {
                "id": {"type": "string", "primaryKey": true, "required": true},
                "issuedAt": {"type": "date"}
            }
        }]);
        let states: Vec<ItemState> = serde_json::from_value(raw).unwrap();

        let reg = MetaRegistry::new();
        reg.import_state(states);

        let invoice = reg.entity("Invoice").unwrap();
        assert_eq!(invoice.table, "invoices");
        assert_eq!(invoice.get_field("issuedAt").unwrap().kind, FieldKind::Date);
    }
}
