use serde::{Deserialize, Serialize};

/// Semantic type of one entity attribute.
///
/// This is the declaration-time type the platform reasons about; how a kind
/// maps to a storage column type is the relational executor's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Free-form text.
    #[serde(rename = "string")]
    Text,
    Integer,
    Float,
    /// Arbitrary-precision decimal. Converted without floating-point rounding.
    Decimal,
    #[serde(rename = "boolean")]
    Bool,
    Date,
    DateTime,
    /// Reference into a declared enumeration.
    #[serde(rename = "enum")]
    EnumRef,
    /// Composition/relation field. Excluded from automatic column mapping.
    Relation,
}

/// How a relation field links its source entity to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
    Embedded,
}

/// Declarative description of one entity attribute.
///
/// Built with chainable constructors:
///
/// ```
/// use strata_core::{FieldDescriptor, FieldKind};
///
/// let total = FieldDescriptor::new("totalAmount", FieldKind::Decimal)
///     .label("Total")
///     .required();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Attribute identifier, unique within the entity.
    pub name: String,
    pub kind: FieldKind,
    pub label: Option<String>,
    pub required: bool,
    pub primary_key: bool,
    /// Declared default, kept as JSON so extension tooling can round-trip it.
    pub default: Option<serde_json::Value>,
    pub relation: Option<RelationKind>,
    /// Name of the related entity/value-object descriptor, resolved lazily
    /// against the registry.
    pub target: Option<String>,
    /// Explicit column override; bypasses the naming transform.
    pub source_column: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
            required: false,
            primary_key: false,
            default: None,
            relation: None,
            target: None,
            source_column: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark this field as a relation to `target`.
    ///
    /// Relation fields carry no column of their own; their persistence is the
    /// caller's responsibility.
    pub fn relation(mut self, kind: RelationKind, target: impl Into<String>) -> Self {
        self.kind = FieldKind::Relation;
        self.relation = Some(kind);
        self.target = Some(target.into());
        self
    }

    pub fn source_column(mut self, column: impl Into<String>) -> Self {
        self.source_column = Some(column.into());
        self
    }

    /// Whether this field participates in automatic column mapping.
    pub fn is_mapped(&self) -> bool {
        self.relation.is_none() && self.kind != FieldKind::Relation
    }
}

/// Declarative description of one persistable entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Global unique key in the registry.
    pub name: String,
    pub table: String,
    pub comment: Option<String>,
    /// Declaration order is preserved.
    pub fields: Vec<FieldDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            comment: None,
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The single primary-key field, if declared.
    ///
    /// Composite keys are not supported; the first flagged field wins.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Fields that participate in automatic column mapping.
    pub fn mapped_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_mapped())
    }
}

/// A composite index over entity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Storage-side description of one relational table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub comment: Option<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            comment: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDescriptor { name: name.into() });
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// One column of a [`TableDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
}

/// A derived relation record: one per relation/embedded field, emitted by the
/// built-in entity-relationship extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    /// Registry name, `"{source}.{field}"`.
    pub name: String,
    pub source: String,
    pub target: String,
    pub field: String,
    pub kind: RelationKind,
}
