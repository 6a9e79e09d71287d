//! Structural validation of resolved entities.
//!
//! Declaring an invalid entity is allowed; the problems listed here are
//! surfaced at the first schema sync, before any statement is executed.
//!
//! # Examples
//!
//! ```
//! use entity_schema_core::*;
//!
//! let mut registry = EntityRegistry::new();
//! registry.register(EntityDescriptor::new("Pair", "pairs")
//!     .with_field(FieldDescriptor::new("left", FieldType::Integer).primary_key())
//!     .with_field(FieldDescriptor::new("right", FieldType::Integer).primary_key()))
//!     .unwrap();
//! let schema = registry.resolve().unwrap();
//!
//! let errors = validate_schema(&schema);
//! assert!(errors.iter().any(|e| matches!(e, ValidationError::MultiplePrimaryKeys { .. })));
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::resolve::{ResolvedEntity, Schema};
use crate::types::{FieldType, Value};

/// Entity validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// More than one field is flagged as primary key.
    #[error("entity {entity} declares more than one primary key: {fields}")]
    MultiplePrimaryKeys { entity: String, fields: String },

    /// Table or column name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must start with a letter or underscore and contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// Entity declares no fields at all.
    #[error("entity {0} declares no fields")]
    NoFields(String),

    /// Two foreign keys back-populate the same accessor name on one entity.
    #[error("entity {entity} receives more than one collection accessor named '{name}'")]
    DuplicateAccessor { entity: String, name: String },

    /// A back-populated accessor has the same name as one of the entity's fields.
    #[error("collection accessor {entity}.{name} collides with a field of the same name")]
    AccessorShadowsField { entity: String, name: String },

    /// Default value does not match the field's type.
    #[error("default value for {entity}.{field} does not match type {expected}")]
    DefaultTypeMismatch {
        entity: String,
        field: String,
        expected: String,
    },
}

/// Returns `true` if `name` can be embedded in SQL without quoting.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_fits(value: &Value, expected: FieldType) -> bool {
    match (value.field_type(), expected) {
        (None, _) => true,
        (Some(actual), expected) if actual == expected => true,
        (Some(FieldType::Integer), FieldType::Real | FieldType::Decimal) => true,
        (Some(FieldType::Real), FieldType::Decimal) => true,
        _ => false,
    }
}

/// Validates every entity of a schema.
pub fn validate_schema(schema: &Schema) -> Vec<ValidationError> {
    schema.entities().flat_map(validate_entity).collect()
}

/// Validates a single entity.
pub fn validate_entity(entity: &ResolvedEntity) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !is_valid_identifier(entity.table_name()) {
        errors.push(ValidationError::InvalidIdentifier(
            entity.table_name().to_string(),
        ));
    }

    if entity.fields().next().is_none() {
        errors.push(ValidationError::NoFields(entity.name().to_string()));
    }

    let primary_keys: Vec<&str> = entity
        .fields()
        .filter(|f| f.is_primary_key)
        .map(|f| f.name.as_str())
        .collect();
    if primary_keys.len() > 1 {
        errors.push(ValidationError::MultiplePrimaryKeys {
            entity: entity.name().to_string(),
            fields: primary_keys.join(", "),
        });
    }

    for field in entity.fields() {
        if !is_valid_identifier(&field.name) {
            errors.push(ValidationError::InvalidIdentifier(field.name.clone()));
        }

        if let Some(default) = &field.default_value {
            if !default_fits(default, field.field_type) {
                errors.push(ValidationError::DefaultTypeMismatch {
                    entity: entity.name().to_string(),
                    field: field.name.clone(),
                    expected: field.field_type.to_string(),
                });
            }
        }
    }

    let mut accessors = HashSet::new();
    for accessor in entity.collection_accessors() {
        if entity.field(&accessor.name).is_some() {
            errors.push(ValidationError::AccessorShadowsField {
                entity: entity.name().to_string(),
                name: accessor.name.clone(),
            });
        } else if !accessors.insert(accessor.name.as_str()) {
            errors.push(ValidationError::DuplicateAccessor {
                entity: entity.name().to_string(),
                name: accessor.name.clone(),
            });
        }
    }

    errors
}
