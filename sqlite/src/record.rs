//! Entity instances.

use entity_schema_core::{EntityId, ResolvedEntity, SchemaError, Value};
use indexmap::IndexMap;

use crate::error::Result;

static NULL: Value = Value::Null;

/// One instance of an entity: a slot per field, in declaration order.
///
/// Slots start at the field's declared default, or `Null`. A record only
/// touches the database through [`DbContext`](crate::DbContext).
///
/// # Examples
///
/// ```
/// use entity_schema_core::*;
/// use entity_schema_sqlite::Record;
///
/// let mut registry = EntityRegistry::new();
/// registry.register(EntityDescriptor::new("Author", "authors")
///     .with_field(FieldDescriptor::id())
///     .with_field(FieldDescriptor::new("active", FieldType::Boolean).default(true)))
///     .unwrap();
/// let schema = registry.resolve().unwrap();
///
/// let mut author = Record::new(schema.entity_by_name("Author").unwrap());
/// assert_eq!(author.get("active"), Some(&Value::Boolean(true)));
/// assert!(author.id().is_none());
///
/// author.set("active", false).unwrap();
/// assert!(author.set("age", 3).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: EntityId,
    entity_name: String,
    primary_key: Option<String>,
    values: IndexMap<String, Value>,
}

impl Record {
    /// Creates an unsaved record with every slot at its default.
    pub fn new(entity: &ResolvedEntity) -> Self {
        let values = entity
            .fields()
            .map(|f| {
                let value = f.default_value.clone().unwrap_or(Value::Null);
                (f.name.clone(), value)
            })
            .collect();

        Self {
            entity: entity.id(),
            entity_name: entity.name().to_string(),
            primary_key: entity.primary_key().map(|f| f.name.clone()),
            values,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Sets a field slot.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] listing the entity's fields if
    /// the name does not exist.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        match self.values.get_mut(field) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(SchemaError::UnknownField {
                entity: self.entity_name.clone(),
                field: field.to_string(),
                available: self
                    .values
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into()),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Primary key value, or `None` if unsaved or the entity has no key.
    pub fn id(&self) -> Option<&Value> {
        let pk = self.primary_key.as_deref()?;
        self.values.get(pk).filter(|v| !v.is_null())
    }

    /// Field slots in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub(crate) fn put(&mut self, field: &str, value: Value) {
        if let Some(slot) = self.values.get_mut(field) {
            *slot = value;
        }
    }
}
