//! Error types for SQLite schema and record operations.
//!
//! Provides a unified error type covering database access, schema
//! configuration, value conversion, and pre-flight validation failures.

use entity_schema_core::{SchemaError, ValidationError};
use thiserror::Error;

/// Errors that can occur while syncing or accessing the database.
#[derive(Debug, Error)]
pub enum OrmError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Schema configuration error (unknown entity, field, or relationship).
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Entities failed validation; nothing was written.
    #[error("schema validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Value could not be converted to or from its SQLite representation.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// Operation needs a primary key value the record does not have.
    #[error("{0} record has no primary key value")]
    MissingPrimaryKey(String),

    /// Handle does not belong to the context's schema.
    #[error("entity handle {0} does not belong to this schema")]
    UnknownHandle(String),

    /// A record of one entity was passed where another was expected.
    #[error("expected a {expected} record, got {found}")]
    EntityMismatch { expected: String, found: String },

    /// Database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`OrmError`].
pub type Result<T> = std::result::Result<T, OrmError>;
