use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use convert_case::{Case, Casing};
use rust_decimal::Decimal;
use tracing::debug;

use strata_core::{EntityDescriptor, FieldKind, TableDescriptor};

use crate::error::DataError;
use crate::value::Value;

/// Convert an attribute name to the table naming convention:
/// a separator before each uppercase letter (except a leading one), lowered.
///
/// Deterministic but not reversible; two attributes colliding on the same
/// column name is a configuration error caught by [`FieldMapper::build`].
pub fn column_name(attribute: &str) -> String {
    attribute.to_case(Case::Snake)
}

/// Per-entity cache of the bidirectional attribute↔column correspondence,
/// plus value-level type conversion in both directions.
///
/// Built lazily on first repository use and kept for the repository
/// instance's lifetime; schema metadata changes require a fresh repository.
#[derive(Debug)]
pub struct FieldMapper {
    entity: String,
    field_to_column: HashMap<String, String>,
    column_to_field: HashMap<String, String>,
    kinds: HashMap<String, FieldKind>,
}

impl FieldMapper {
    /// Match every table column to the entity field whose snake-cased name
    /// (or explicit source-column override) equals it.
    ///
    /// Relation fields are excluded. Unmatched columns are skipped, not
    /// errors. A primary-key field that resolves to no column, or two fields
    /// resolving to the same column, is a `Configuration` error.
    pub fn build(entity: &EntityDescriptor, table: &TableDescriptor) -> Result<Self, DataError> {
        let mut mapper = Self::empty(&entity.name);

        for column in &table.columns {
            let matches: Vec<_> = entity
                .mapped_fields()
                .filter(|f| match &f.source_column {
                    Some(source) => source == &column.name,
                    None => column_name(&f.name) == column.name,
                })
                .collect();
            match matches.as_slice() {
                [] => {
                    debug!(
                        entity = %entity.name,
                        column = %column.name,
                        "column not matched by any field; excluded from automatic mapping"
                    );
                }
                [field] => {
                    mapper
                        .field_to_column
                        .insert(field.name.clone(), column.name.clone());
                    mapper
                        .column_to_field
                        .insert(column.name.clone(), field.name.clone());
                    mapper.kinds.insert(field.name.clone(), field.kind);
                }
                many => {
                    let names: Vec<_> = many.iter().map(|f| f.name.as_str()).collect();
                    return Err(DataError::Configuration(format!(
                        "fields {names:?} of entity `{}` all map to column `{}`",
                        entity.name, column.name
                    )));
                }
            }
        }

        if let Some(pk) = entity.primary_key() {
            if !mapper.field_to_column.contains_key(&pk.name) {
                return Err(DataError::Configuration(format!(
                    "primary key `{}` of entity `{}` resolves to no column of table `{}`",
                    pk.name, entity.name, table.name
                )));
            }
        }

        Ok(mapper)
    }

    /// Identity mapping over plain attribute names, used when no metadata is
    /// registered: every attribute maps to its snake-cased column and values
    /// pass through unconverted.
    pub fn from_field_names<'a>(
        entity: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut mapper = Self::empty(entity);
        for name in names {
            let column = column_name(name);
            mapper.field_to_column.insert(name.to_string(), column.clone());
            mapper.column_to_field.insert(column, name.to_string());
        }
        mapper
    }

    fn empty(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            field_to_column: HashMap::new(),
            column_to_field: HashMap::new(),
            kinds: HashMap::new(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.field_to_column.get(field).map(String::as_str)
    }

    pub fn field_for(&self, column: &str) -> Option<&str> {
        self.column_to_field.get(column).map(String::as_str)
    }

    pub fn mapped_fields(&self) -> impl Iterator<Item = &str> {
        self.field_to_column.keys().map(String::as_str)
    }

    /// Convert a raw storage value to its domain form.
    ///
    /// `Ok(None)` means absence (the attribute stays unset), not a typed zero
    /// value. Decimals are constructed exactly from their string or numeric
    /// form; dates become date values; everything else passes through.
    pub fn to_domain(&self, field: &str, raw: Value) -> Result<Option<Value>, DataError> {
        if raw.is_null() {
            return Ok(None);
        }
        let Some(kind) = self.kinds.get(field) else {
            return Ok(Some(raw));
        };
        let value = match kind {
            FieldKind::Decimal => Value::Decimal(self.parse_decimal(field, &raw)?),
            FieldKind::Date => match raw {
                Value::Date(d) => Value::Date(d),
                Value::DateTime(dt) => Value::Date(dt.date_naive()),
                Value::Text(s) => NaiveDate::from_str(&s)
                    .map(Value::Date)
                    .map_err(|_| DataError::conversion(&self.entity, field, s))?,
                other => return Err(DataError::conversion(&self.entity, field, other)),
            },
            FieldKind::DateTime => match raw {
                Value::DateTime(dt) => Value::DateTime(dt),
                Value::Text(s) => DateTime::parse_from_rfc3339(&s)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| DataError::conversion(&self.entity, field, s))?,
                other => return Err(DataError::conversion(&self.entity, field, other)),
            },
            _ => raw,
        };
        Ok(Some(value))
    }

    /// Convert a domain value to its storage form.
    ///
    /// Decimals serialize to their canonical decimal string (never a binary
    /// float) so a round-trip loses no precision; dates pass through as date
    /// values; absence becomes storage null.
    pub fn to_storage(&self, field: &str, value: Value) -> Result<Value, DataError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let Some(kind) = self.kinds.get(field) else {
            return Ok(value);
        };
        let value = match kind {
            FieldKind::Decimal => Value::Text(self.parse_decimal(field, &value)?.to_string()),
            FieldKind::Date => match value {
                Value::Date(d) => Value::Date(d),
                Value::DateTime(dt) => Value::Date(dt.date_naive()),
                other => return Err(DataError::conversion(&self.entity, field, other)),
            },
            _ => value,
        };
        Ok(value)
    }

    fn parse_decimal(&self, field: &str, raw: &Value) -> Result<Decimal, DataError> {
        match raw {
            Value::Decimal(d) => Ok(*d),
            Value::Integer(i) => Ok(Decimal::from(*i)),
            Value::Text(s) => {
                Decimal::from_str(s).map_err(|_| DataError::conversion(&self.entity, field, s))
            }
            Value::Float(f) => Decimal::try_from(*f)
                .map_err(|_| DataError::conversion(&self.entity, field, f)),
            other => Err(DataError::conversion(&self.entity, field, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{FieldDescriptor, RelationKind};

    fn order() -> EntityDescriptor {
        EntityDescriptor::new("Order", "orders")
            .field(FieldDescriptor::new("id", FieldKind::Text).primary_key())
            .field(FieldDescriptor::new("totalAmount", FieldKind::Decimal))
            .field(FieldDescriptor::new("createdAt", FieldKind::Date))
            .field(
                FieldDescriptor::new("customer", FieldKind::Relation)
                    .relation(RelationKind::ManyToOne, "Customer"),
            )
    }

    fn orders_table() -> TableDescriptor {
        TableDescriptor::new("orders")
            .column("id")
            .column("total_amount")
            .column("created_at")
            .column("legacy_flag")
    }

    #[test]
    fn naming_transform() {
        assert_eq!(column_name("createdAt"), "created_at");
        assert_eq!(column_name("id"), "id");
        assert_eq!(column_name("totalAmountDue"), "total_amount_due");
    }

    #[test]
    fn builds_bidirectional_mapping() {
        let mapper = FieldMapper::build(&order(), &orders_table()).unwrap();
        assert_eq!(mapper.column_for("totalAmount"), Some("total_amount"));
        assert_eq!(mapper.field_for("created_at"), Some("createdAt"));
        // Unmatched columns are excluded, silently.
        assert_eq!(mapper.field_for("legacy_flag"), None);
        // Relation fields never map.
        assert_eq!(mapper.column_for("customer"), None);
    }

    #[test]
    fn source_column_override_wins() {
        let entity = EntityDescriptor::new("Order", "orders").field(
            FieldDescriptor::new("id", FieldKind::Text)
                .primary_key()
                .source_column("order_uid"),
        );
        let table = TableDescriptor::new("orders").column("order_uid");
        let mapper = FieldMapper::build(&entity, &table).unwrap();
        assert_eq!(mapper.column_for("id"), Some("order_uid"));
    }

    #[test]
    fn colliding_fields_are_a_configuration_error() {
        let entity = EntityDescriptor::new("Order", "orders")
            .field(FieldDescriptor::new("createdAt", FieldKind::Date))
            .field(FieldDescriptor::new("created_at", FieldKind::Date));
        let table = TableDescriptor::new("orders").column("created_at");
        let err = FieldMapper::build(&entity, &table).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)), "{err}");
    }

    #[test]
    fn unresolved_primary_key_is_a_configuration_error() {
        let entity = EntityDescriptor::new("Order", "orders")
            .field(FieldDescriptor::new("orderId", FieldKind::Text).primary_key());
        let table = TableDescriptor::new("orders").column("id");
        let err = FieldMapper::build(&entity, &table).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)), "{err}");
    }

    #[test]
    fn decimal_roundtrip_is_exact() {
        let mapper = FieldMapper::build(&order(), &orders_table()).unwrap();
        let stored = mapper
            .to_storage("totalAmount", Value::Text("19.99".into()))
            .unwrap();
        assert_eq!(stored, Value::Text("19.99".into()));
        let domain = mapper.to_domain("totalAmount", stored).unwrap().unwrap();
        assert_eq!(domain, Value::Decimal("19.99".parse().unwrap()));
        assert_eq!(domain.to_string(), "19.99");
    }

    #[test]
    fn null_means_absence() {
        let mapper = FieldMapper::build(&order(), &orders_table()).unwrap();
        assert_eq!(mapper.to_domain("totalAmount", Value::Null).unwrap(), None);
        assert_eq!(
            mapper.to_storage("totalAmount", Value::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn date_values_are_constructed() {
        let mapper = FieldMapper::build(&order(), &orders_table()).unwrap();
        let domain = mapper
            .to_domain("createdAt", Value::Text("2026-08-07".into()))
            .unwrap()
            .unwrap();
        assert_eq!(
            domain,
            Value::Date(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
        );
    }

    #[test]
    fn unparsable_decimal_is_tagged() {
        let mapper = FieldMapper::build(&order(), &orders_table()).unwrap();
        let err = mapper
            .to_domain("totalAmount", Value::Text("nineteen".into()))
            .unwrap_err();
        match err {
            DataError::Conversion { entity, field, raw } => {
                assert_eq!(entity, "Order");
                assert_eq!(field, "totalAmount");
                assert_eq!(raw, "nineteen");
            }
            other => panic!("expected Conversion, got {other}"),
        }
    }

    #[test]
    fn identity_mapping_passes_values_through() {
        let mapper = FieldMapper::from_field_names("Order", ["id", "totalAmount"]);
        assert_eq!(mapper.column_for("totalAmount"), Some("total_amount"));
        let v = mapper
            .to_domain("totalAmount", Value::Text("19.99".into()))
            .unwrap()
            .unwrap();
        assert_eq!(v, Value::Text("19.99".into()));
    }
}
