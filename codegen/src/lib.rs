//! Drift-aware source generation for entity schemas.
//!
//! Generation runs in both directions:
//!
//! - **Forward**: from a resolved [`Schema`](entity_schema_core::Schema) to
//!   DTO structs ([`generate_dtos`]) and a data context
//!   ([`generate_data_context`]).
//! - **Reverse**: from the column mappings persisted by a schema sync back
//!   to entity structs with descriptor builders ([`generate_entities`]),
//!   or straight to descriptors ([`descriptors_from_metadata`]).
//!
//! Every generator returns a [`FileWriter`]. Writing goes through
//! [`FileWriter::write_file`], which records a sidecar hash and refuses to
//! overwrite files edited by hand unless forced.
//!
//! # Quick start
//!
//! ```no_run
//! use entity_schema_codegen::{CodegenConfig, EntityFile, generate_dtos};
//!
//! let config = CodegenConfig::load_or_default("codegen.yml").unwrap();
//! let schema = EntityFile::load("entities.yml").unwrap().resolve().unwrap();
//!
//! generate_dtos(&schema, &config.dto_options())
//!     .write_file("src/dto.rs", &config.cache_dir, false)
//!     .unwrap();
//! ```

mod config;
mod error;
mod forward;
mod reverse;
mod sidecar;
mod writer;

pub use config::{CodegenConfig, EntityDecl, EntityFile, FieldDecl};
pub use error::{CodegenError, Result};
pub use forward::{
    DATA_CONTEXT_NAME, DtoOptions, context_property, dto_name, generate_data_context,
    generate_dtos,
};
pub use reverse::{
    descriptors_from_metadata, entity_name_for_table, generate_entities, load_metadata,
    registry_from_metadata,
};
pub use sidecar::{
    DEFAULT_CACHE_DIR, GeneratedFileRecord, SIDECAR_VERSION, WriteOutcome, content_hash,
    has_user_modifications, sidecar_path,
};
pub use writer::{
    ClassMap, ClassWriter, Edge, FileMap, FileWriter, ImplBlock, LineRange, TaggedLine, Zone,
};
