//! SQLite backend for entity schemas.
//!
//! This crate turns a resolved [`Schema`](entity_schema_core::Schema) into
//! tables in a single SQLite file, keeps a persisted description of every
//! synced column for reverse code generation, and provides record access.
//!
//! # Architecture
//!
//! - **`schema`**: DDL for entity tables and the reserved metadata tables
//! - **`metadata`**: [`MetadataStore`], column mappings and version history
//! - **`context`**: [`DbContext`], scoped connections, schema sync, CRUD
//! - **`convert`**: [`Value`](entity_schema_core::Value) ↔ SQLite values and
//!   row-level statements
//! - **`query`** / **`relation`**: single-entity queries and relationship
//!   navigation
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use entity_schema_core::*;
//! use entity_schema_sqlite::{ContextConfig, DbContext, NoSeed};
//!
//! let mut registry = EntityRegistry::new();
//! registry.register(EntityDescriptor::new("Author", "authors")
//!     .with_field(FieldDescriptor::id())
//!     .with_field(FieldDescriptor::new("name", FieldType::Text).not_null()))
//!     .unwrap();
//! registry.register(EntityDescriptor::new("Book", "books")
//!     .with_field(FieldDescriptor::id())
//!     .with_field(FieldDescriptor::new("title", FieldType::Text))
//!     .with_foreign_key("author_id", ForeignKeySpec::new("Author").back_populates("books")))
//!     .unwrap();
//!
//! let db = DbContext::open(
//!     "library.db",
//!     Arc::new(registry.resolve().unwrap()),
//!     ContextConfig::default(),
//! )
//! .unwrap();
//! db.sync_schema(&NoSeed).unwrap();
//!
//! let mut author = db.new_record("Author").unwrap().with("name", "Ada").unwrap();
//! db.insert(&mut author).unwrap();
//!
//! let mut book = db.new_record("Book").unwrap().with("title", "Notes").unwrap();
//! db.set_related(&mut book, "author", Some(&author)).unwrap();
//! db.insert(&mut book).unwrap();
//!
//! let books = db.collection(&author, "books").unwrap().all(&db).unwrap();
//! assert_eq!(books.len(), 1);
//! ```
//!
//! # Table prefix customization
//!
//! The metadata tables are prefixed (default `_entity_schema_`). Prefixes
//! must contain only alphanumeric characters and underscores.

mod context;
mod convert;
mod error;
mod metadata;
mod query;
mod record;
mod relation;
mod schema;

pub use context::{ContextConfig, DbContext, NoSeed, SeedData, SyncReport, VersionPolicy};
pub use convert::{TIMESTAMP_FORMAT, decode_default, encode_default};
pub use error::{OrmError, Result};
pub use metadata::{ColumnMetadata, DEFAULT_PREFIX, MetadataStore, SchemaVersion, TableMetadata};
pub use query::{ColumnRef, Condition, OrderBy, Query, col};
pub use record::Record;
pub use relation::RelatedFetch;
pub use schema::{is_keyword, metadata_tables_sql, quote_ident, table_ddl};
