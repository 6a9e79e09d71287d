//! Persisted description of every synced entity.
//!
//! [`MetadataStore`] owns the two reserved tables described in
//! [`schema`](crate::schema): per-column mappings that make reverse code
//! generation possible, and the append-only fingerprint history used for
//! version tracking.

use entity_schema_core::{FieldType, ResolvedEntity};
use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::{encode_default, now_timestamp};
use crate::error::Result;
use crate::schema::{metadata_tables_sql, validate_prefix};

/// Default prefix of the reserved metadata tables.
pub const DEFAULT_PREFIX: &str = "_entity_schema_";

/// One persisted column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub field_type: FieldType,
    pub sql_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub is_nullable: bool,
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
    /// JSON-encoded default, or its plain string form.
    pub default_value: Option<String>,
    pub back_populates: Option<String>,
}

/// Column mappings grouped by table name, in table name order.
pub type TableMetadata = IndexMap<String, Vec<ColumnMetadata>>;

/// One row of the version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version: i64,
    pub entities_hash: String,
    pub applied_at: String,
    pub entity_count: usize,
}

/// Access to the reserved metadata tables under a fixed prefix.
///
/// The store holds no connection; every method runs on the connection (or
/// transaction) it is given, so callers decide the unit of work.
///
/// # Examples
///
/// ```
/// use entity_schema_sqlite::MetadataStore;
/// use rusqlite::Connection;
///
/// let conn = Connection::open_in_memory().unwrap();
/// let store = MetadataStore::default();
///
/// // No mapping table yet: there is no metadata at all.
/// assert!(store.get_all_table_metadata(&conn).unwrap().is_none());
///
/// store.ensure_tables(&conn).unwrap();
/// assert!(store.get_all_table_metadata(&conn).unwrap().unwrap().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MetadataStore {
    prefix: String,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl MetadataStore {
    /// Creates a store for the given table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidPrefix`](crate::OrmError::InvalidPrefix) if
    /// the prefix contains invalid characters.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mappings_table(&self) -> String {
        format!("{}table_mappings", self.prefix)
    }

    pub fn versions_table(&self) -> String {
        format!("{}schema_version", self.prefix)
    }

    /// Returns `true` for tables owned by the store.
    pub fn is_reserved(&self, table: &str) -> bool {
        table.starts_with(&self.prefix)
    }

    /// Creates the metadata tables if they do not exist.
    pub fn ensure_tables(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&metadata_tables_sql(&self.prefix)?)?;
        Ok(())
    }

    /// Replaces all column mappings of an entity's table.
    ///
    /// Returns the number of rows written.
    pub fn record_entity_metadata(
        &self,
        conn: &Connection,
        entity: &ResolvedEntity,
    ) -> Result<usize> {
        let table = self.mappings_table();
        let timestamp = now_timestamp();

        conn.execute(
            &format!("DELETE FROM {table} WHERE table_name = ?1"),
            [entity.table_name()],
        )?;

        let mut stmt = conn.prepare(&format!(
            "INSERT INTO {table} \
             (table_name, column_name, field_type, sql_type, is_primary_key, \
              is_foreign_key, is_nullable, foreign_table, foreign_column, \
              default_value, back_populates, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"
        ))?;

        let mut written = 0;
        for field in entity.fields() {
            let fk = field.foreign_key.as_ref();
            stmt.execute(params![
                entity.table_name(),
                field.name,
                field.field_type.name(),
                field.field_type.sql_type(),
                field.is_primary_key,
                field.is_foreign_key(),
                field.is_nullable,
                fk.map(|fk| fk.target_table.as_str()),
                fk.map(|fk| fk.target_column.as_str()),
                field.default_value.as_ref().and_then(encode_default),
                fk.and_then(|fk| fk.back_populates.as_deref()),
                timestamp,
            ])?;
            written += 1;
        }

        debug!(table = entity.table_name(), columns = written, "recorded metadata");
        Ok(written)
    }

    /// Appends a version row and returns its version number.
    pub fn record_schema_version(
        &self,
        conn: &Connection,
        entities_hash: &str,
        entity_count: usize,
    ) -> Result<i64> {
        conn.execute(
            &format!(
                "INSERT INTO {} (entities_hash, applied_at, entity_count) VALUES (?1, ?2, ?3)",
                self.versions_table()
            ),
            params![entities_hash, now_timestamp(), entity_count as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns the most recent version row, if any.
    pub fn latest_version(&self, conn: &Connection) -> Result<Option<SchemaVersion>> {
        Ok(self.get_schema_versions(conn, 1)?.into_iter().next())
    }

    /// Returns all column mappings grouped by table.
    ///
    /// `None` means the mapping table does not exist; `Some` with an empty
    /// map means it exists but holds no rows.
    pub fn get_all_table_metadata(&self, conn: &Connection) -> Result<Option<TableMetadata>> {
        let table = self.mappings_table();
        if !sqlite_table_exists(conn, &table)? {
            return Ok(None);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT table_name, column_name, field_type, sql_type, is_primary_key, \
             is_foreign_key, is_nullable, foreign_table, foreign_column, default_value, \
             back_populates FROM {table} ORDER BY table_name, id"
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tables = TableMetadata::new();
        for (
            table_name,
            column_name,
            field_type,
            sql_type,
            is_primary_key,
            is_foreign_key,
            is_nullable,
            foreign_table,
            foreign_column,
            default_value,
            back_populates,
        ) in rows
        {
            tables.entry(table_name).or_default().push(ColumnMetadata {
                column_name,
                field_type: field_type.parse()?,
                sql_type,
                is_primary_key,
                is_foreign_key,
                is_nullable,
                foreign_table,
                foreign_column,
                default_value,
                back_populates,
            });
        }

        Ok(Some(tables))
    }

    /// Returns up to `limit` version rows, most recent first.
    pub fn get_schema_versions(
        &self,
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<SchemaVersion>> {
        let table = self.versions_table();
        if !sqlite_table_exists(conn, &table)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT version, entities_hash, applied_at, entity_count FROM {table} \
             ORDER BY version DESC LIMIT ?1"
        ))?;
        let versions = stmt
            .query_map([limit as i64], |row| {
                Ok(SchemaVersion {
                    version: row.get(0)?,
                    entities_hash: row.get(1)?,
                    applied_at: row.get(2)?,
                    entity_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// Returns `true` if column mappings exist for the table.
    pub fn table_exists(&self, conn: &Connection, table_name: &str) -> Result<bool> {
        let table = self.mappings_table();
        if !sqlite_table_exists(conn, &table)? {
            return Ok(false);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE table_name = ?1"),
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Checks `sqlite_master` for a table.
pub(crate) fn sqlite_table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}
