//! Entity reconstruction from persisted table metadata.
//!
//! The column mappings written at sync time are enough to rebuild every
//! [`EntityDescriptor`]: names come from the table (singular, upper camel
//! case), foreign keys target entities by name, and defaults are decoded
//! back into typed values. [`generate_entities`] renders the same
//! reconstruction as Rust source.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use entity_schema_core::{
    DEFAULT_TARGET_COLUMN, EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType,
    ForeignKeySpec, TargetSpec, Value,
};
use entity_schema_sqlite::{
    ColumnMetadata, ContextConfig, DbContext, MetadataStore, TableMetadata, decode_default,
};
use heck::ToUpperCamelCase;
use tracing::{debug, info};

use crate::error::{CodegenError, Result};
use crate::forward::slot_type;
use crate::writer::FileWriter;

const RULE: &str = "---------------------------------------------------------";

/// Entity name derived from a table name.
///
/// # Examples
///
/// ```
/// use entity_schema_codegen::entity_name_for_table;
///
/// assert_eq!(entity_name_for_table("books"), "Book");
/// assert_eq!(entity_name_for_table("user_profiles"), "UserProfile");
/// ```
pub fn entity_name_for_table(table: &str) -> String {
    pluralizer::pluralize(table, 1, false).to_upper_camel_case()
}

/// Reads the column mappings of the database at `path`.
///
/// # Errors
///
/// Returns [`CodegenError::NoMetadata`] if the file does not exist or was
/// never synced, and [`CodegenError::EmptySchema`] if a sync recorded no
/// entity mappings.
pub fn load_metadata(path: impl AsRef<Path>, config: ContextConfig) -> Result<TableMetadata> {
    let path = path.as_ref();
    let missing = || CodegenError::NoMetadata(path.display().to_string());
    if !path.exists() {
        return Err(missing());
    }

    let schema = Arc::new(EntityRegistry::new().resolve()?);
    let db = DbContext::open(path, schema, config)?;
    let store = db.store().clone();
    let metadata: TableMetadata = db
        .schema_metadata()?
        .ok_or_else(missing)?
        .into_iter()
        .filter(|(table, _)| !store.is_reserved(table))
        .collect();

    if metadata.is_empty() {
        return Err(CodegenError::EmptySchema(path.display().to_string()));
    }
    debug!(tables = metadata.len(), "loaded table metadata");
    Ok(metadata)
}

fn field_from_column(column: &ColumnMetadata) -> FieldDescriptor {
    let mut field = if column.is_foreign_key {
        let target = column
            .foreign_table
            .as_deref()
            .map(entity_name_for_table)
            .unwrap_or_default();
        let mut spec = ForeignKeySpec::new(TargetSpec::by_name(target));
        if let Some(back) = &column.back_populates {
            spec = spec.back_populates(back.clone());
        }
        if let Some(target_column) = &column.foreign_column {
            if target_column != DEFAULT_TARGET_COLUMN {
                spec = spec.target_column(target_column.clone());
            }
        }
        FieldDescriptor::foreign(column.column_name.clone(), spec)
    } else {
        FieldDescriptor::new(column.column_name.clone(), column.field_type)
    };

    if column.is_primary_key {
        field = field.primary_key();
    }
    field = field.nullable(column.is_nullable);
    if let Some(raw) = &column.default_value {
        field = field.default(decode_default(column.field_type, raw));
    }
    field
}

/// Rebuilds entity descriptors from column mappings.
///
/// Reserved tables of `store` are skipped. Descriptors come out in table
/// name order.
pub fn descriptors_from_metadata(
    metadata: &TableMetadata,
    store: &MetadataStore,
) -> Vec<EntityDescriptor> {
    metadata
        .iter()
        .filter(|(table, _)| !store.is_reserved(table))
        .map(|(table, columns)| {
            columns.iter().fold(
                EntityDescriptor::new(entity_name_for_table(table), table.clone()),
                |entity, column| entity.with_field(field_from_column(column)),
            )
        })
        .collect()
}

/// Registers reconstructed descriptors in a fresh registry.
pub fn registry_from_metadata(
    metadata: &TableMetadata,
    store: &MetadataStore,
) -> Result<EntityRegistry> {
    let mut registry = EntityRegistry::new();
    for entity in descriptors_from_metadata(metadata, store) {
        registry.register(entity)?;
    }
    Ok(registry)
}

/// Source for one builder call that sets a default, or a comment when the
/// value has no literal form.
fn default_expr(value: &Value, imports: &mut BTreeSet<&'static str>) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Boolean(v) => Some(format!(".default({v})")),
        Value::Integer(v) => Some(format!(".default({v}i64)")),
        Value::Real(v) if v.is_finite() => Some(format!(".default({v:?}f64)")),
        Value::Decimal(v) if v.is_finite() => {
            imports.insert("Value");
            Some(format!(".default(Value::Decimal({v:?}))"))
        }
        Value::Text(v) => Some(format!(".default({v:?})")),
        Value::Real(_) | Value::Decimal(_) | Value::Timestamp(_) => None,
    }
}

fn field_expr(field: &FieldDescriptor, imports: &mut BTreeSet<&'static str>) -> String {
    imports.insert("FieldDescriptor");
    let mut expr = match &field.foreign_key {
        Some(fk) => {
            imports.extend(["ForeignKeySpec", "TargetSpec"]);
            let target = match &fk.target {
                TargetSpec::ByName(name) => name.clone(),
                _ => String::new(),
            };
            let mut spec = format!("ForeignKeySpec::new(TargetSpec::by_name({target:?}))");
            if let Some(back) = &fk.back_populates {
                spec.push_str(&format!(".back_populates({back:?})"));
            }
            if fk.target_column != DEFAULT_TARGET_COLUMN {
                spec.push_str(&format!(".target_column({:?})", fk.target_column));
            }
            format!("FieldDescriptor::foreign({:?}, {spec})", field.name)
        }
        None => {
            imports.insert("FieldType");
            format!(
                "FieldDescriptor::new({:?}, FieldType::{:?})",
                field.name, field.field_type
            )
        }
    };

    if field.is_primary_key {
        expr.push_str(".primary_key()");
    }
    if !field.is_nullable {
        expr.push_str(".not_null()");
    }
    if let Some(default) = field.default_value.as_ref().and_then(|v| default_expr(v, imports)) {
        expr.push_str(&default);
    }
    expr
}

/// Generates one entity struct per table in `metadata`.
///
/// Each struct has a typed slot per column, a `Vec` property for every
/// collection other tables declare against it, and a `descriptor()`
/// method rebuilding its [`EntityDescriptor`].
pub fn generate_entities(metadata: &TableMetadata, store: &MetadataStore) -> FileWriter {
    let mut fw = FileWriter::new("Entities");
    fw.add_header_comment(RULE)
        .add_header_comment("AUTO-GENERATED FROM DATABASE METADATA.")
        .add_header_comment("Entities reverse-engineered from the synced schema.")
        .add_header_comment(RULE);

    let mut imports = BTreeSet::from(["EntityDescriptor"]);
    let mut needs_timestamp = false;

    let tables: Vec<(&String, &Vec<ColumnMetadata>)> = metadata
        .iter()
        .filter(|(table, _)| !store.is_reserved(table))
        .collect();

    let mut classes = Vec::with_capacity(tables.len());
    for (table, columns) in &tables {
        let name = entity_name_for_table(table);

        let mut properties: Vec<(String, String)> = columns
            .iter()
            .map(|c| {
                needs_timestamp |= c.field_type == FieldType::Timestamp;
                (c.column_name.clone(), slot_type(c.field_type, c.is_nullable))
            })
            .collect();
        for (other, other_columns) in &tables {
            if other == table {
                continue;
            }
            for column in other_columns.iter() {
                if column.foreign_table.as_deref() == Some(table.as_str()) {
                    if let Some(back) = &column.back_populates {
                        properties.push((
                            back.clone(),
                            format!("Vec<{}>", entity_name_for_table(other)),
                        ));
                    }
                }
            }
        }

        let fields: Vec<String> = columns
            .iter()
            .map(|c| field_expr(&field_from_column(c), &mut imports))
            .collect();
        classes.push((name, table.as_str(), properties, fields));
    }

    if needs_timestamp {
        fw.add_import("use chrono::NaiveDateTime;");
    }
    let names: Vec<&str> = imports.into_iter().collect();
    fw.add_import(format!("use entity_schema_core::{{{}}};", names.join(", ")));

    for (name, table, properties, fields) in classes {
        let cw = fw.add_class(name.clone());
        cw.add_decorator("#[derive(Debug, Clone, PartialEq)]");
        for (property, ty) in &properties {
            cw.add_property(property, ty);
        }

        let body = cw.add_impl(None);
        body.add_line(format!("pub const TABLE: &'static str = {table:?};"), 1)
            .add_line("", 0)
            .add_line("pub fn descriptor() -> EntityDescriptor {", 1)
            .add_line(format!("EntityDescriptor::new({name:?}, Self::TABLE)"), 2);
        for field in &fields {
            body.add_line(format!(".with_field({field})"), 3);
        }
        body.add_line("}", 1);
    }

    info!(entities = tables.len(), "generated entities from metadata");
    fw
}
