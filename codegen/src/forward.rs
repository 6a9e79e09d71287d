//! Source generation from a resolved [`Schema`].
//!
//! Produces DTO structs for API surfaces and a `DataContext` holding one
//! entity handle per table, with a seed hook left for the user to fill in.

use std::collections::BTreeSet;

use entity_schema_core::{FieldType, ResolvedEntity, Schema};
use heck::{ToSnakeCase, ToUpperCamelCase};

use crate::writer::FileWriter;

const RULE: &str = "---------------------------------------------------------";

/// Name of the generated data context struct.
pub const DATA_CONTEXT_NAME: &str = "DataContext";

/// Options for [`generate_dtos`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtoOptions {
    /// Field and accessor names left out of every DTO.
    pub sensitive_fields: Vec<String>,
    /// Entities to generate; `None` generates all of them.
    pub entities: Option<Vec<String>>,
    /// Module that DTOs outside the generated set are imported from.
    pub external_module: String,
}

impl Default for DtoOptions {
    fn default() -> Self {
        Self {
            sensitive_fields: vec!["id".to_string()],
            entities: None,
            external_module: "super".to_string(),
        }
    }
}

impl DtoOptions {
    fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive_fields.iter().any(|f| f == name)
    }

    fn includes(&self, entity: &str) -> bool {
        self.entities
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == entity))
    }
}

/// DTO struct name for an entity.
pub fn dto_name(entity: &str) -> String {
    format!("{}Dto", entity.to_upper_camel_case())
}

/// Data context property name for an entity: pluralized snake case.
///
/// # Examples
///
/// ```
/// use entity_schema_codegen::context_property;
///
/// assert_eq!(context_property("Author"), "authors");
/// assert_eq!(context_property("BookCategory"), "book_categories");
/// ```
pub fn context_property(entity: &str) -> String {
    pluralizer::pluralize(&entity.to_snake_case(), 2, false)
}

/// Rust type of a field slot, wrapped in `Option` when nullable.
pub(crate) fn slot_type(field_type: FieldType, nullable: bool) -> String {
    if nullable {
        format!("Option<{}>", field_type.rust_type())
    } else {
        field_type.rust_type().to_string()
    }
}

/// Generates one DTO struct per entity.
///
/// Every non-sensitive field becomes a property; each `back_populates`
/// accessor becomes a `Vec` of the source entity's DTO. DTOs referenced
/// but not generated here are imported from
/// [`external_module`](DtoOptions::external_module).
pub fn generate_dtos(schema: &Schema, opts: &DtoOptions) -> FileWriter {
    let mut fw = FileWriter::new("DTOs");
    fw.add_header_comment(RULE)
        .add_header_comment("AUTO-GENERATED FILE. DO NOT EDIT.")
        .add_header_comment("DTOs generated from entity descriptors.")
        .add_header_comment(RULE);

    let selected: Vec<&ResolvedEntity> = schema
        .entities()
        .filter(|e| opts.includes(e.name()))
        .collect();

    let mut needs_timestamp = false;
    let mut external = BTreeSet::new();
    let mut bodies = Vec::with_capacity(selected.len());

    for entity in &selected {
        let mut properties = Vec::new();
        for field in entity.fields() {
            if opts.is_sensitive(&field.name) {
                continue;
            }
            needs_timestamp |= field.field_type == FieldType::Timestamp;
            properties.push((
                field.name.clone(),
                slot_type(field.field_type, field.is_nullable),
            ));
        }
        for accessor in entity.collection_accessors() {
            if opts.is_sensitive(&accessor.name) {
                continue;
            }
            let source = schema.entity_by_name(&accessor.source_entity);
            let source_name = source.map_or(accessor.source_entity.as_str(), |s| s.name());
            if !opts.includes(source_name) {
                external.insert(dto_name(source_name));
            }
            properties.push((
                accessor.name.clone(),
                format!("Vec<{}>", dto_name(source_name)),
            ));
        }
        bodies.push((dto_name(entity.name()), properties));
    }

    if needs_timestamp {
        fw.add_import("use chrono::NaiveDateTime;");
    }
    fw.add_import("use serde::{Deserialize, Serialize};");
    for name in &external {
        fw.add_import(format!("use {}::{name};", opts.external_module));
    }

    for (name, properties) in bodies {
        let cw = fw.add_class(name);
        cw.add_decorator("#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]");
        for (field, ty) in &properties {
            cw.add_property(field, ty);
        }
    }

    fw
}

/// Generates the `DataContext` struct for a schema.
///
/// The struct holds one [`EntityId`](entity_schema_core::EntityId) per
/// entity, looked up by name at construction, and implements `SeedData`
/// with an empty `seed_data` for the user to edit.
pub fn generate_data_context(schema: &Schema) -> FileWriter {
    let mut fw = FileWriter::new("DataContext");
    fw.add_header_comment(RULE)
        .add_header_comment("AUTO-GENERATED FILE. DO NOT EDIT ANYTHING BUT seed_data.")
        .add_header_comment("Data context generated from entity descriptors.")
        .add_header_comment(RULE);
    fw.add_import("use entity_schema_core::{EntityId, Schema};")
        .add_import("use entity_schema_sqlite::{DbContext, Result, SeedData};");

    let entities: Vec<(String, &str)> = schema
        .entities()
        .map(|e| (context_property(e.name()), e.name()))
        .collect();

    let cw = fw.add_class(DATA_CONTEXT_NAME);
    cw.add_decorator("#[derive(Debug, Clone, Copy, PartialEq, Eq)]");
    for (property, _) in &entities {
        cw.add_property(property, "EntityId");
    }

    let ctor = cw.add_impl(None);
    ctor.add_line("pub fn new(schema: &Schema) -> Result<Self> {", 1)
        .add_line("Ok(Self {", 2);
    for (property, name) in &entities {
        ctor.add_line(
            format!("{property}: schema.require_entity({name:?})?.id(),"),
            3,
        );
    }
    ctor.add_line("})", 2).add_line("}", 1);

    cw.add_impl(Some("SeedData"))
        .add_line("fn seed_data(&self, db: &DbContext) -> Result<()> {", 1)
        .add_line("let _ = db;", 2)
        .add_line("Ok(())", 2)
        .add_line("}", 1);

    fw
}
