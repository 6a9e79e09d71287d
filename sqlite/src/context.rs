//! Scoped-connection database context.
//!
//! [`DbContext`] owns no connection. Every operation opens the database
//! file, applies the connection pragmas, runs inside a single transaction
//! and closes the connection again, committing on success and rolling back
//! on any error.
//!
//! # Example
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
//! let schema = Arc::new(registry.resolve().unwrap());
//!
//! let db = DbContext::open("data/library.db", schema, ContextConfig::default()).unwrap();
//! let report = db.sync_schema(&NoSeed).unwrap();
//! println!("synced {} tables", report.tables.len());
//!
//! let mut author = db.new_record("Author").unwrap().with("name", "Ada").unwrap();
//! db.insert(&mut author).unwrap();
//! assert!(author.id().is_some());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use entity_schema_core::{
    EntityId, ResolvedEntity, Schema, Value, compute_hash, validate_schema,
};
use indexmap::IndexMap;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::convert;
use crate::error::{OrmError, Result};
use crate::metadata::{DEFAULT_PREFIX, MetadataStore, SchemaVersion, TableMetadata};
use crate::query::{Query, col};
use crate::record::Record;
use crate::schema::table_ddl;

/// When a sync appends to the version history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Append only when the fingerprint differs from the latest stored one.
    #[default]
    OnChange,
    /// Append on every sync.
    Always,
}

/// Connection and sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Prefix of the reserved metadata tables.
    pub prefix: String,
    pub version_policy: VersionPolicy,
    /// Use write-ahead logging.
    pub wal: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            prefix: DEFAULT_PREFIX.to_string(),
            version_policy: VersionPolicy::OnChange,
            wal: true,
        }
    }
}

/// Outcome of [`DbContext::sync_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entity tables ensured, in registration order.
    pub tables: Vec<String>,
    /// Column mapping rows written.
    pub metadata_rows: usize,
    /// Fingerprint of the synced entity set.
    pub entities_hash: String,
    /// Whether the fingerprint differs from the previously stored one.
    pub changed: bool,
    /// Version number appended by this sync, if any.
    pub version: Option<i64>,
}

/// Hook run after a successful schema sync.
///
/// The default implementation does nothing.
pub trait SeedData {
    fn seed_data(&self, db: &DbContext) -> Result<()> {
        let _ = db;
        Ok(())
    }
}

/// Seed hook that inserts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSeed;

impl SeedData for NoSeed {}

/// Entry point for schema sync and record access on one database file.
#[derive(Debug, Clone)]
pub struct DbContext {
    path: PathBuf,
    schema: Arc<Schema>,
    config: ContextConfig,
    store: MetadataStore,
}

impl DbContext {
    /// Creates a context for the database at `path`.
    ///
    /// The parent directory is created if missing; the database file itself
    /// is created by the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidPrefix`] for a bad metadata prefix, or
    /// [`OrmError::Io`] if the directory cannot be created.
    pub fn open(
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        config: ContextConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = MetadataStore::new(config.prefix.clone())?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!(dir = %parent.display(), "created database directory");
            }
        }

        Ok(Self {
            path,
            schema,
            config,
            store,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Resolves a handle against this context's schema.
    pub fn entity(&self, id: EntityId) -> Result<&ResolvedEntity> {
        self.schema
            .entity(id)
            .ok_or_else(|| OrmError::UnknownHandle(id.to_string()))
    }

    /// Creates an unsaved record of the named entity.
    pub fn new_record(&self, entity: &str) -> Result<Record> {
        Ok(Record::new(self.schema.require_entity(entity)?))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.config.busy_timeout)?;
        if self.config.wal {
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(journal_mode = %mode, "opened connection");
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Runs `f` on a fresh connection inside one transaction.
    ///
    /// Commits when `f` succeeds. On error the transaction is rolled back and
    /// the original error returned. The connection is closed on every path.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        match f(&*tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Creates missing tables, records metadata, and tracks the version.
    ///
    /// Every entity is validated before any I/O. Table creation, metadata
    /// and the version row are written in one transaction; the seed hook
    /// runs after it commits.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Validation`] listing every problem found, or the
    /// first database error (after which nothing is committed).
    pub fn sync_schema(&self, seed: &dyn SeedData) -> Result<SyncReport> {
        let errors = validate_schema(&self.schema);
        if !errors.is_empty() {
            return Err(OrmError::Validation(errors));
        }

        let hash = compute_hash(&self.schema);
        let report = self.with_connection(|conn| {
            self.store.ensure_tables(conn)?;

            let mut tables = Vec::with_capacity(self.schema.len());
            let mut metadata_rows = 0;
            for entity in self.schema.entities() {
                conn.execute_batch(&table_ddl(entity))?;
                metadata_rows += self.store.record_entity_metadata(conn, entity)?;
                tables.push(entity.table_name().to_string());
            }

            let latest = self.store.latest_version(conn)?;
            let changed = latest.is_none_or(|v| v.entities_hash != hash);
            let version = if changed || self.config.version_policy == VersionPolicy::Always {
                Some(
                    self.store
                        .record_schema_version(conn, &hash, self.schema.len())?,
                )
            } else {
                None
            };

            Ok(SyncReport {
                tables,
                metadata_rows,
                entities_hash: hash.clone(),
                changed,
                version,
            })
        })?;

        info!(
            tables = report.tables.len(),
            changed = report.changed,
            version = ?report.version,
            "schema synced"
        );

        seed.seed_data(self)?;
        Ok(report)
    }

    /// Returns the persisted column mappings, `None` if never synced.
    pub fn schema_metadata(&self) -> Result<Option<TableMetadata>> {
        self.with_connection(|conn| self.store.get_all_table_metadata(conn))
    }

    /// Returns up to `limit` version rows, most recent first.
    pub fn schema_versions(&self, limit: usize) -> Result<Vec<SchemaVersion>> {
        self.with_connection(|conn| self.store.get_schema_versions(conn, limit))
    }

    /// Inserts a record and stores any generated primary key on it.
    pub fn insert(&self, record: &mut Record) -> Result<()> {
        let entity = self.entity(record.entity())?;
        self.with_connection(|conn| convert::insert_record(conn, entity, record))
    }

    /// Updates a record by primary key; returns the number of rows changed.
    pub fn update(&self, record: &Record) -> Result<usize> {
        let entity = self.entity(record.entity())?;
        convert::check_primary_key(entity, record)?;
        self.with_connection(|conn| convert::update_record(conn, entity, record))
    }

    /// Deletes a record by primary key and clears the key on the record.
    pub fn delete(&self, record: &mut Record) -> Result<usize> {
        let entity = self.entity(record.entity())?;
        convert::check_primary_key(entity, record)?;
        self.with_connection(|conn| convert::delete_record(conn, entity, record))
    }

    /// Updates a record that has a primary key, inserts it otherwise.
    pub fn save(&self, record: &mut Record) -> Result<()> {
        if record.id().is_some() {
            self.update(record).map(|_| ())
        } else {
            self.insert(record)
        }
    }

    /// Fetches one record by primary key.
    pub fn get_by_id(&self, entity: EntityId, id: impl Into<Value>) -> Result<Option<Record>> {
        let resolved = self.entity(entity)?;
        let pk = resolved
            .primary_key()
            .ok_or_else(|| OrmError::MissingPrimaryKey(resolved.name().to_string()))?;
        Query::new(entity).filter(col(&pk.name).eq(id)).first(self)
    }

    /// Fetches every record of an entity.
    pub fn get_all(&self, entity: EntityId) -> Result<Vec<Record>> {
        Query::new(entity).all(self)
    }

    /// Inserts records of any entities in one transaction.
    ///
    /// Records are grouped by entity in order of first appearance. If any
    /// insert fails the whole batch is rolled back and generated keys are
    /// cleared again.
    pub fn insert_many(&self, records: &mut [Record]) -> Result<usize> {
        let groups = self.group_by_entity(records)?;
        let unsaved: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.id().is_none())
            .map(|(i, _)| i)
            .collect();

        let result = self.with_connection(|conn| {
            for (entity, indices) in &groups {
                for &i in indices {
                    convert::insert_record(conn, entity, &mut records[i])?;
                }
            }
            Ok(records.len())
        });

        if result.is_err() {
            for i in unsaved {
                clear_primary_key(&groups, &mut records[i]);
            }
        }
        if let Ok(count) = &result {
            info!(count, entities = groups.len(), "batch inserted");
        }
        result
    }

    /// Updates records of any entities in one transaction.
    ///
    /// Every record must have a primary key; this is checked before the
    /// connection is opened.
    pub fn update_many(&self, records: &[Record]) -> Result<usize> {
        let groups = self.group_by_entity(records)?;
        for (entity, indices) in &groups {
            for &i in indices {
                convert::check_primary_key(entity, &records[i])?;
            }
        }

        self.with_connection(|conn| {
            let mut changed = 0;
            for (entity, indices) in &groups {
                for &i in indices {
                    changed += convert::update_record(conn, entity, &records[i])?;
                }
            }
            Ok(changed)
        })
    }

    fn group_by_entity(&self, records: &[Record]) -> Result<Vec<(&ResolvedEntity, Vec<usize>)>> {
        let mut groups: IndexMap<EntityId, Vec<usize>> = IndexMap::new();
        for (i, record) in records.iter().enumerate() {
            groups.entry(record.entity()).or_default().push(i);
        }
        groups
            .into_iter()
            .map(|(id, indices)| Ok((self.entity(id)?, indices)))
            .collect()
    }
}

fn clear_primary_key(groups: &[(&ResolvedEntity, Vec<usize>)], record: &mut Record) {
    let pk = groups
        .iter()
        .find(|(entity, _)| entity.id() == record.entity())
        .and_then(|(entity, _)| entity.primary_key());
    if let Some(pk) = pk {
        record.put(&pk.name, Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use entity_schema_core::{EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType};
    use tempfile::TempDir;

    use super::*;

    fn context(dir: &TempDir) -> DbContext {
        let mut registry = EntityRegistry::new();
        registry
            .register(
                EntityDescriptor::new("Note", "notes")
                    .with_field(FieldDescriptor::id())
                    .with_field(FieldDescriptor::new("body", FieldType::Text).not_null()),
            )
            .unwrap();
        let schema = Arc::new(registry.resolve().unwrap());
        DbContext::open(dir.path().join("nested/notes.db"), schema, ContextConfig::default())
            .unwrap()
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let db = context(&dir);
        assert!(db.path().parent().unwrap().is_dir());
    }

    #[test]
    fn test_open_rejects_bad_prefix() {
        let dir = TempDir::new().unwrap();
        let schema = Arc::new(EntityRegistry::new().resolve().unwrap());
        let config = ContextConfig {
            prefix: "bad prefix".into(),
            ..ContextConfig::default()
        };
        let err = DbContext::open(dir.path().join("x.db"), schema, config).unwrap_err();
        assert!(matches!(err, OrmError::InvalidPrefix(_)));
    }

    #[test]
    fn test_with_connection_rolls_back_on_error() {
        let dir = TempDir::new().unwrap();
        let db = context(&dir);
        db.sync_schema(&NoSeed).unwrap();

        let result: Result<()> = db.with_connection(|conn| {
            conn.execute("INSERT INTO notes (body) VALUES ('kept?')", [])?;
            Err(OrmError::ConversionError("boom".into()))
        });
        assert!(matches!(result, Err(OrmError::ConversionError(_))));

        let notes = db.schema().lookup("Note").unwrap();
        assert!(db.get_all(notes).unwrap().is_empty());
    }

    #[test]
    fn test_update_without_key_fails_before_io() {
        let dir = TempDir::new().unwrap();
        let db = context(&dir);
        // Never synced: any I/O would fail with a missing table instead.
        let note = db.new_record("Note").unwrap();
        assert!(matches!(
            db.update(&note).unwrap_err(),
            OrmError::MissingPrimaryKey(_)
        ));
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let dir = TempDir::new().unwrap();
        let db = context(&dir);
        db.sync_schema(&NoSeed).unwrap();

        let mut note = db.new_record("Note").unwrap().with("body", "draft").unwrap();
        db.save(&mut note).unwrap();
        let id = note.id().cloned().unwrap();

        note.set("body", "final").unwrap();
        db.save(&mut note).unwrap();

        let stored = db.get_by_id(note.entity(), id).unwrap().unwrap();
        assert_eq!(stored.get("body"), Some(&Value::from("final")));
    }
}
