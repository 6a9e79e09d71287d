//! SQL generation for entity tables and the reserved metadata tables.
//!
//! Entity tables are created with `CREATE TABLE IF NOT EXISTS`, one column
//! per field in declaration order followed by one `FOREIGN KEY` clause per
//! resolved foreign key. Schema changes are additive only: an existing table
//! is never altered.
//!
//! # Reserved tables
//!
//! The metadata store keeps two tables whose names start with a
//! configurable prefix (default `_entity_schema_`):
//!
//! - `{prefix}table_mappings`: one row per entity column
//! - `{prefix}schema_version`: append-only fingerprint history
//!
//! Prefixes must contain only alphanumeric characters and underscores.

use std::borrow::Cow;

use entity_schema_core::{FieldType, ResolvedEntity, ResolvedField, Value};

use crate::error::{OrmError, Result};

/// Column and table names that must be bracket-escaped in SQL.
const SQL_KEYWORDS: &[&str] = &[
    "order", "group", "select", "where", "from", "table", "index", "key", "limit",
];

/// Validates that a table prefix contains only alphanumeric characters and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(OrmError::InvalidPrefix(prefix.to_string()));
    }
    if !prefix.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(OrmError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Returns `true` if `name` collides with a reserved SQL keyword.
pub fn is_keyword(name: &str) -> bool {
    SQL_KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
}

/// Escapes an identifier that collides with a SQL keyword (`order` → `[order]`).
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    if is_keyword(name) {
        Cow::Owned(format!("[{name}]"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Generates the `CREATE TABLE IF NOT EXISTS` statement for an entity.
///
/// # Examples
///
/// ```
/// use entity_schema_core::*;
/// use entity_schema_sqlite::table_ddl;
///
/// let mut registry = EntityRegistry::new();
/// registry.register(EntityDescriptor::new("Author", "authors")
///     .with_field(FieldDescriptor::id())).unwrap();
/// registry.register(EntityDescriptor::new("Book", "books")
///     .with_field(FieldDescriptor::id())
///     .with_foreign_key("author_id", ForeignKeySpec::new("Author")))
///     .unwrap();
/// let schema = registry.resolve().unwrap();
///
/// let ddl = table_ddl(schema.entity_by_name("Book").unwrap());
/// assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS books ("));
/// assert!(ddl.contains("FOREIGN KEY (author_id) REFERENCES authors(id)"));
/// ```
pub fn table_ddl(entity: &ResolvedEntity) -> String {
    let mut lines: Vec<String> = entity.fields().map(column_definition).collect();

    for field in entity.fields() {
        if let Some(fk) = &field.foreign_key {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(&field.name),
                quote_ident(&fk.target_table),
                quote_ident(&fk.target_column)
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(entity.table_name()),
        lines.join(",\n    ")
    )
}

fn column_definition(field: &ResolvedField) -> String {
    let mut column = format!("{} {}", quote_ident(&field.name), field.field_type.sql_type());

    if field.is_primary_key {
        column.push_str(" PRIMARY KEY");
        if field.field_type == FieldType::Integer {
            column.push_str(" AUTOINCREMENT");
        }
    }
    if !field.is_nullable {
        column.push_str(" NOT NULL");
    }
    // Only boolean defaults are emitted; other defaults live on the record.
    if let Some(Value::Boolean(flag)) = &field.default_value {
        column.push_str(if *flag { " DEFAULT 1" } else { " DEFAULT 0" });
    }

    column
}

/// Generates the SQL for the reserved metadata tables.
///
/// # Errors
///
/// Returns [`OrmError::InvalidPrefix`] if the prefix contains characters
/// other than alphanumerics and underscores, or if it is empty.
pub fn metadata_tables_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let sql = format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}table_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    field_type TEXT NOT NULL,
    sql_type TEXT NOT NULL,
    is_primary_key INTEGER NOT NULL DEFAULT 0,
    is_foreign_key INTEGER NOT NULL DEFAULT 0,
    is_nullable INTEGER NOT NULL DEFAULT 1,
    foreign_table TEXT,
    foreign_column TEXT,
    default_value TEXT,
    back_populates TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(table_name, column_name)
);

CREATE TABLE IF NOT EXISTS {prefix}schema_version (
    version INTEGER PRIMARY KEY AUTOINCREMENT,
    entities_hash TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    entity_count INTEGER NOT NULL
);
"#,
        prefix = prefix
    );

    Ok(sql)
}
