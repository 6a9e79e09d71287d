//! Error types for code generation.
//!
//! Provides a unified error type covering file I/O, sidecar and
//! configuration serialization, metadata access, and schema resolution.

use entity_schema_core::SchemaError;
use entity_schema_sqlite::OrmError;
use thiserror::Error;

/// Errors that can occur while generating or writing source files.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading persisted metadata failed.
    #[error("metadata store error: {0}")]
    Store(#[from] OrmError),

    /// Declared or reconstructed entities do not resolve.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The database holds no entity metadata to generate from.
    #[error("no entity metadata found in {0}; run a schema sync first")]
    NoMetadata(String),

    /// The database was synced, but with no entities.
    #[error("{0} was synced with no entities; nothing to generate")]
    EmptySchema(String),

    /// An entity declaration file is structurally invalid.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),
}

/// Convenience alias for results with [`CodegenError`].
pub type Result<T> = std::result::Result<T, CodegenError>;
