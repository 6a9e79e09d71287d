//! Schema descriptor types.
//!
//! This module defines the in-memory description of an entity: its fields,
//! their semantic types, nullability, defaults, and foreign-key roles.
//! Descriptors are declared once during application bootstrap and handed to
//! an [`EntityRegistry`](crate::EntityRegistry); they are never mutated
//! afterwards. Everything that resolution derives (effective foreign-key
//! types, target tables) lives on the resolved [`Schema`](crate::Schema).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::registry::EntityId;

/// Default column a foreign key points at when none is given.
pub const DEFAULT_TARGET_COLUMN: &str = "id";

/// Semantic type of a field.
///
/// # Examples
///
/// ```
/// use entity_schema_core::FieldType;
///
/// assert_eq!(FieldType::Boolean.sql_type(), "INTEGER");
/// assert_eq!("timestamp".parse::<FieldType>().unwrap(), FieldType::Timestamp);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 64-bit signed integer.
    Integer,
    /// Floating point number.
    Real,
    /// UTF-8 text.
    Text,
    /// Boolean, stored as `0`/`1`.
    Boolean,
    /// Naive timestamp, stored as ISO-8601 text.
    Timestamp,
    /// Decimal number, stored as `REAL`.
    Decimal,
}

impl FieldType {
    /// All semantic types, in declaration order.
    pub const ALL: [FieldType; 6] = [
        FieldType::Integer,
        FieldType::Real,
        FieldType::Text,
        FieldType::Boolean,
        FieldType::Timestamp,
        FieldType::Decimal,
    ];

    /// SQLite column type used in DDL.
    pub const fn sql_type(self) -> &'static str {
        match self {
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Real | FieldType::Decimal => "REAL",
            FieldType::Text | FieldType::Timestamp => "TEXT",
        }
    }

    /// Stable lowercase name used in fingerprints and persisted metadata.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Decimal => "decimal",
        }
    }

    /// Rust type used for this field in generated source.
    pub const fn rust_type(self) -> &'static str {
        match self {
            FieldType::Integer => "i64",
            FieldType::Real | FieldType::Decimal => "f64",
            FieldType::Text => "String",
            FieldType::Boolean => "bool",
            FieldType::Timestamp => "NaiveDateTime",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| SchemaError::UnknownFieldType(s.to_string()))
    }
}

/// A typed scalar held in a record's field slot or used as a default.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL` / absent value.
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Decimal(f64),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Semantic type of the value, `None` for `Null`.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(FieldType::Integer),
            Value::Real(_) => Some(FieldType::Real),
            Value::Text(_) => Some(FieldType::Text),
            Value::Boolean(_) => Some(FieldType::Boolean),
            Value::Timestamp(_) => Some(FieldType::Timestamp),
            Value::Decimal(_) => Some(FieldType::Decimal),
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) | Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Lazily evaluated foreign-key target.
///
/// Used for forward references: the closure is only called during
/// resolution, after every entity has been registered.
pub type DeferredLookup = Arc<dyn Fn() -> Option<EntityId> + Send + Sync>;

/// Symbolic reference to the entity a foreign key points at.
#[derive(Clone)]
pub enum TargetSpec {
    /// Registry lookup by entity name.
    ByName(String),
    /// Direct handle returned by [`EntityRegistry::register`](crate::EntityRegistry::register).
    ByHandle(EntityId),
    /// Zero-argument lookup evaluated at resolution time.
    ByDeferredLookup(DeferredLookup),
}

impl TargetSpec {
    pub fn by_name(name: impl Into<String>) -> Self {
        TargetSpec::ByName(name.into())
    }

    pub fn by_handle(id: EntityId) -> Self {
        TargetSpec::ByHandle(id)
    }

    pub fn deferred<F>(lookup: F) -> Self
    where
        F: Fn() -> Option<EntityId> + Send + Sync + 'static,
    {
        TargetSpec::ByDeferredLookup(Arc::new(lookup))
    }
}

impl fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::ByName(name) => f.debug_tuple("ByName").field(name).finish(),
            TargetSpec::ByHandle(id) => f.debug_tuple("ByHandle").field(id).finish(),
            TargetSpec::ByDeferredLookup(_) => f.write_str("ByDeferredLookup(..)"),
        }
    }
}

impl From<&str> for TargetSpec {
    fn from(name: &str) -> Self {
        TargetSpec::ByName(name.to_string())
    }
}

impl From<String> for TargetSpec {
    fn from(name: String) -> Self {
        TargetSpec::ByName(name)
    }
}

impl From<EntityId> for TargetSpec {
    fn from(id: EntityId) -> Self {
        TargetSpec::ByHandle(id)
    }
}

/// Foreign-key role of a field.
///
/// # Examples
///
/// ```
/// use entity_schema_core::{ForeignKeySpec, TargetSpec};
///
/// let fk = ForeignKeySpec::new("Author").back_populates("books");
/// assert_eq!(fk.target_column, "id");
/// assert!(matches!(fk.target, TargetSpec::ByName(ref n) if n == "Author"));
/// ```
#[derive(Debug, Clone)]
pub struct ForeignKeySpec {
    /// Entity the key points at.
    pub target: TargetSpec,
    /// Column on the target entity (defaults to `id`).
    pub target_column: String,
    /// Name of the collection accessor installed on the target.
    pub back_populates: Option<String>,
}

impl ForeignKeySpec {
    pub fn new(target: impl Into<TargetSpec>) -> Self {
        Self {
            target: target.into(),
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
            back_populates: None,
        }
    }

    /// Points the key at a column other than `id`.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = column.into();
        self
    }

    /// Installs a reverse collection accessor with the given name.
    pub fn back_populates(mut self, name: impl Into<String>) -> Self {
        self.back_populates = Some(name.into());
        self
    }
}

/// Describes one field of an entity.
///
/// Fields are nullable by default. Foreign-key fields are created with
/// [`FieldDescriptor::foreign`]; their declared type is a placeholder until
/// resolution propagates the target column's type.
///
/// # Examples
///
/// ```
/// use entity_schema_core::{FieldDescriptor, FieldType, Value};
///
/// let active = FieldDescriptor::new("is_active", FieldType::Boolean)
///     .not_null()
///     .default(true);
/// assert!(!active.is_nullable);
/// assert_eq!(active.default_value, Some(Value::Boolean(true)));
/// ```
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub default_value: Option<Value>,
    pub foreign_key: Option<ForeignKeySpec>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            is_primary_key: false,
            is_nullable: true,
            default_value: None,
            foreign_key: None,
        }
    }

    /// Creates a foreign-key field.
    pub fn foreign(name: impl Into<String>, spec: ForeignKeySpec) -> Self {
        Self {
            foreign_key: Some(spec),
            ..Self::new(name, FieldType::Integer)
        }
    }

    /// The conventional integer surrogate key: `id INTEGER PRIMARY KEY NOT NULL`.
    pub fn id() -> Self {
        Self::new(DEFAULT_TARGET_COLUMN, FieldType::Integer)
            .primary_key()
            .not_null()
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }
}

/// In-memory description of an entity and the table it maps to.
///
/// Field order is declaration order and is preserved for column ordering
/// in DDL and for generated source.
///
/// # Examples
///
/// ```
/// use entity_schema_core::{EntityDescriptor, FieldDescriptor, FieldType, ForeignKeySpec};
///
/// let book = EntityDescriptor::new("Book", "books")
///     .with_field(FieldDescriptor::id())
///     .with_field(FieldDescriptor::new("title", FieldType::Text))
///     .with_foreign_key("author_id", ForeignKeySpec::new("Author").back_populates("books"));
///
/// let names: Vec<_> = book.field_names().collect();
/// assert_eq!(names, ["id", "title", "author_id"]);
/// assert_eq!(book.primary_key().unwrap().name, "id");
/// ```
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    table_name: String,
    fields: IndexMap<String, FieldDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Adds a field. Redeclaring a name replaces the earlier field in place.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Adds a foreign-key field.
    pub fn with_foreign_key(self, name: impl Into<String>, spec: ForeignKeySpec) -> Self {
        self.with_field(FieldDescriptor::foreign(name, spec))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// First primary-key field in declaration order.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.values().find(|f| f.is_primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_names_round_trip() {
        for ty in FieldType::ALL {
            assert_eq!(ty.name().parse::<FieldType>().unwrap(), ty);
        }
        assert!("uuid".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(FieldType::Integer.sql_type(), "INTEGER");
        assert_eq!(FieldType::Decimal.sql_type(), "REAL");
        assert_eq!(FieldType::Timestamp.sql_type(), "TEXT");
    }

    #[test]
    fn test_field_defaults_to_nullable() {
        let field = FieldDescriptor::new("title", FieldType::Text);
        assert!(field.is_nullable);
        assert!(!field.is_primary_key);
        assert!(!field.is_foreign_key());
    }

    #[test]
    fn test_redeclared_field_keeps_position() {
        let entity = EntityDescriptor::new("Book", "books")
            .with_field(FieldDescriptor::id())
            .with_field(FieldDescriptor::new("title", FieldType::Text))
            .with_field(FieldDescriptor::new("id", FieldType::Text).primary_key());
        let names: Vec<_> = entity.field_names().collect();
        assert_eq!(names, ["id", "title"]);
        assert_eq!(entity.field("id").unwrap().field_type, FieldType::Text);
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_target_spec_debug_hides_closure() {
        let spec = TargetSpec::deferred(|| None);
        assert_eq!(format!("{spec:?}"), "ByDeferredLookup(..)");
    }
}
