use std::collections::BTreeMap;

use crate::value::Value;

/// Named getter/setter pair for one attribute of an entity type.
///
/// The mapper reads and writes domain objects exclusively through these, so
/// no dynamic property access is needed: the table of accessors is built once
/// per entity type and indexed by attribute name.
pub struct FieldAccessor<T> {
    pub name: &'static str,
    /// `None` means the attribute is absent (unset), not a typed zero value.
    pub get: fn(&T) -> Option<Value>,
    pub set: fn(&mut T, Value),
}

/// Trait representing a persistable domain type.
///
/// `Default` is the zero-argument constructor the repository uses to produce
/// a blank instance before populating attributes by name.
///
/// # Example
///
/// ```
/// use strata_data::{Entity, FieldAccessor, Value};
///
/// #[derive(Default)]
/// struct User {
///     id: Option<String>,
///     name: Option<String>,
/// }
///
/// impl Entity for User {
///     fn entity_name() -> &'static str {
///         "User"
///     }
///
///     fn accessors() -> &'static [FieldAccessor<Self>] {
///         &[
///             FieldAccessor {
///                 name: "id",
///                 get: |u| u.id.clone().map(Value::Text),
///                 set: |u, v| {
///                     if let Value::Text(s) = v {
///                         u.id = Some(s);
///                     }
///                 },
///             },
///             FieldAccessor {
///                 name: "name",
///                 get: |u| u.name.clone().map(Value::Text),
///                 set: |u, v| {
///                     if let Value::Text(s) = v {
///                         u.name = Some(s);
///                     }
///                 },
///             },
///         ]
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sync + Unpin + 'static {
    /// The name this type is registered under in the metadata registry.
    fn entity_name() -> &'static str;

    /// Accessor table, one entry per persistable attribute.
    fn accessors() -> &'static [FieldAccessor<Self>];

    /// Look up one accessor by attribute name.
    fn accessor(name: &str) -> Option<&'static FieldAccessor<Self>> {
        Self::accessors().iter().find(|a| a.name == name)
    }
}

/// A partial entity: the attributes present in a create/update call.
///
/// Only fields set here reach storage; everything else is left to the
/// executor (server-computed defaults) or untouched on update.
#[derive(Default, Clone, Debug)]
pub struct Patch {
    values: BTreeMap<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Capture every present (non-absent) attribute of an entity.
    pub fn from_entity<T: Entity>(entity: &T) -> Self {
        let mut patch = Self::new();
        for accessor in T::accessors() {
            if let Some(value) = (accessor.get)(entity) {
                patch.values.insert(accessor.name.to_string(), value);
            }
        }
        patch
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        id: Option<String>,
        count: Option<i64>,
    }

    impl Entity for Sample {
        fn entity_name() -> &'static str {
            "Sample"
        }

        fn accessors() -> &'static [FieldAccessor<Self>] {
            &[
                FieldAccessor {
                    name: "id",
                    get: |s| s.id.clone().map(Value::Text),
                    set: |s, v| {
                        if let Value::Text(t) = v {
                            s.id = Some(t);
                        }
                    },
                },
                FieldAccessor {
                    name: "count",
                    get: |s| s.count.map(Value::Integer),
                    set: |s, v| {
                        if let Value::Integer(i) = v {
                            s.count = Some(i);
                        }
                    },
                },
            ]
        }
    }

    #[test]
    fn accessor_roundtrip() {
        let mut s = Sample::default();
        let acc = Sample::accessor("count").unwrap();
        (acc.set)(&mut s, Value::Integer(7));
        assert_eq!((acc.get)(&s), Some(Value::Integer(7)));
        assert!(Sample::accessor("missing").is_none());
    }

    #[test]
    fn patch_captures_present_attributes_only() {
        let s = Sample {
            id: Some("a".into()),
            count: None,
        };
        let patch = Patch::from_entity(&s);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("id"), Some(&Value::Text("a".into())));
        assert!(patch.get("count").is_none());
    }
}
