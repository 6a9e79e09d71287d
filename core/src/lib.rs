//! Entity descriptors, registry and foreign key resolution.
//!
//! This crate defines the in-memory model of a persisted entity set:
//!
//! - [`EntityDescriptor`] / [`FieldDescriptor`]: declared entities and their
//!   fields, with semantic [`FieldType`]s, nullability, defaults and
//!   [`ForeignKeySpec`]s.
//! - [`EntityRegistry`]: caller-owned registry that hands out [`EntityId`]
//!   handles usable as foreign-key targets.
//! - [`Schema`]: the result of [`EntityRegistry::resolve`], with every
//!   foreign key bound to a concrete `(table, column)` and every entity's
//!   relationship accessors built.
//!
//! Validation ([`validate_schema`]) catches structural errors such as
//! multiple primary keys, and [`compute_hash`] fingerprints the entity set
//! for version tracking.
//!
//! # Example
//!
//! ```
//! use entity_schema_core::*;
//!
//! let mut registry = EntityRegistry::new();
//! let author = registry
//!     .register(
//!         EntityDescriptor::new("Author", "authors")
//!             .with_field(FieldDescriptor::id())
//!             .with_field(FieldDescriptor::new("name", FieldType::Text).not_null()),
//!     )
//!     .unwrap();
//! registry
//!     .register(
//!         EntityDescriptor::new("Book", "books")
//!             .with_field(FieldDescriptor::id())
//!             .with_field(FieldDescriptor::new("title", FieldType::Text))
//!             .with_foreign_key("author_id", ForeignKeySpec::new(author).back_populates("books")),
//!     )
//!     .unwrap();
//!
//! let schema = registry.resolve().unwrap();
//! let fk = schema.entity_by_name("Book").unwrap().field("author_id").unwrap();
//! assert_eq!(fk.foreign_key.as_ref().unwrap().target_table, "authors");
//! assert!(validate_schema(&schema).is_empty());
//! ```

mod error;
mod fingerprint;
mod registry;
mod resolve;
mod types;
mod validate;

pub use error::{Result, SchemaError};
pub use fingerprint::compute_hash;
pub use registry::{EntityId, EntityRegistry};
pub use resolve::{
    CollectionAccessor, REFERENCE_SUFFIX, RelationshipDef, ResolvedEntity, ResolvedField,
    ResolvedForeignKey, Schema, SingleAccessor,
};
pub use types::*;
pub use validate::{ValidationError, is_valid_identifier, validate_entity, validate_schema};
