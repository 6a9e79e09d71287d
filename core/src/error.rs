//! Error types for registration and resolution.
//!
//! These are configuration errors: they surface at bootstrap (registration,
//! resolution) or on first relationship access, and are never retried.
//! Messages that name an unknown entity, field, or accessor list the valid
//! alternatives.

use thiserror::Error;

/// Errors raised while building or resolving a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// An entity with this name is already registered.
    #[error("entity '{0}' is already registered")]
    DuplicateEntity(String),

    /// Two entities map to the same table.
    #[error("table '{table}' is already mapped by entity '{existing}'")]
    DuplicateTable { table: String, existing: String },

    /// Name lookup found no registered entity.
    #[error("unknown entity '{name}'. Available: {available}")]
    UnknownEntity { name: String, available: String },

    /// Target handle or deferred lookup did not yield an entity of this registry.
    #[error("invalid foreign key target for {entity}.{field}: {reason}")]
    InvalidTarget {
        entity: String,
        field: String,
        reason: String,
    },

    /// The foreign key's target column does not exist on the target entity.
    #[error("target column '{column}' not found in {entity}. Available: {available}")]
    UnknownTargetColumn {
        entity: String,
        column: String,
        available: String,
    },

    /// A field name did not match any field of the entity.
    #[error("unknown field '{field}' on {entity}. Available: {available}")]
    UnknownField {
        entity: String,
        field: String,
        available: String,
    },

    /// No relationship accessor with this name exists on the entity.
    #[error("unknown relationship '{name}' on {entity}. Available: {available}")]
    UnknownRelationship {
        entity: String,
        name: String,
        available: String,
    },

    /// A stored type name could not be parsed.
    #[error("unknown field type '{0}'")]
    UnknownFieldType(String),
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Formats candidate names for error messages.
pub(crate) fn join_available<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let joined = names.into_iter().collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
