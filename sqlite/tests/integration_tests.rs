//! Integration tests for the entity-schema-sqlite crate.

use std::sync::Arc;

use entity_schema_core::{
    EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType, ForeignKeySpec, Schema, Value,
};
use entity_schema_sqlite::{
    ContextConfig, DbContext, NoSeed, OrmError, Record, Result, SeedData, VersionPolicy, col,
};
use rusqlite::Connection;
use tempfile::TempDir;

/// Author(id, name) and Book(id, title, author_id → Author.id, back_populates "books").
fn library_schema() -> Schema {
    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityDescriptor::new("Author", "authors")
                .with_field(FieldDescriptor::id())
                .with_field(FieldDescriptor::new("name", FieldType::Text).not_null()),
        )
        .unwrap();
    registry
        .register(
            EntityDescriptor::new("Book", "books")
                .with_field(FieldDescriptor::id())
                .with_field(FieldDescriptor::new("title", FieldType::Text))
                .with_foreign_key(
                    "author_id",
                    ForeignKeySpec::new("Author").back_populates("books"),
                ),
        )
        .unwrap();
    registry.resolve().unwrap()
}

fn open(dir: &TempDir, schema: Schema, config: ContextConfig) -> DbContext {
    DbContext::open(dir.path().join("library.db"), Arc::new(schema), config).unwrap()
}

fn table_sql(db: &DbContext, table: &str) -> String {
    let conn = Connection::open(db.path()).unwrap();
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )
    .unwrap()
}

fn author(db: &DbContext, name: &str) -> Record {
    let mut author = db.new_record("Author").unwrap().with("name", name).unwrap();
    db.insert(&mut author).unwrap();
    author
}

fn book(db: &DbContext, title: &str, author: Option<&Record>) -> Record {
    let mut book = db.new_record("Book").unwrap().with("title", title).unwrap();
    db.set_related(&mut book, "author", author).unwrap();
    db.insert(&mut book).unwrap();
    book
}

// ============================================================================
// Schema sync
// ============================================================================

#[test]
fn test_library_scenario_ddl_and_metadata() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());

    let report = db.sync_schema(&NoSeed).unwrap();
    assert_eq!(report.tables, ["authors", "books"]);
    assert_eq!(report.metadata_rows, 5);
    assert!(report.changed);
    assert_eq!(report.version, Some(1));

    assert!(!table_sql(&db, "authors").contains("FOREIGN KEY"));
    assert!(table_sql(&db, "books").contains("FOREIGN KEY (author_id) REFERENCES authors(id)"));

    let metadata = db.schema_metadata().unwrap().unwrap();
    let books = &metadata["books"];
    let columns: Vec<_> = books.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(columns, ["id", "title", "author_id"]);
    assert!(books[0].is_primary_key);
    assert!(!books[0].is_nullable);
    assert_eq!(books[2].foreign_table.as_deref(), Some("authors"));
    assert_eq!(books[2].back_populates.as_deref(), Some("books"));
}

#[test]
fn test_double_sync_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());

    let first = db.sync_schema(&NoSeed).unwrap();
    let ddl_before = table_sql(&db, "books");
    let metadata_before = db.schema_metadata().unwrap().unwrap();

    let second = db.sync_schema(&NoSeed).unwrap();
    assert_eq!(table_sql(&db, "books"), ddl_before);
    assert_eq!(db.schema_metadata().unwrap().unwrap(), metadata_before);

    assert_eq!(first.entities_hash, second.entities_hash);
    assert!(!second.changed);
    assert_eq!(second.version, None);
    assert_eq!(db.schema_versions(10).unwrap().len(), 1);
}

#[test]
fn test_always_policy_appends_every_sync() {
    let dir = TempDir::new().unwrap();
    let config = ContextConfig {
        version_policy: VersionPolicy::Always,
        ..ContextConfig::default()
    };
    let db = open(&dir, library_schema(), config);

    db.sync_schema(&NoSeed).unwrap();
    let second = db.sync_schema(&NoSeed).unwrap();
    assert!(!second.changed);
    assert_eq!(second.version, Some(2));

    let versions = db.schema_versions(10).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, 2);
    assert_eq!(versions[0].entities_hash, versions[1].entities_hash);
    assert_eq!(versions[0].entity_count, 2);
}

#[test]
fn test_changed_schema_appends_version() {
    let dir = TempDir::new().unwrap();
    open(&dir, library_schema(), ContextConfig::default())
        .sync_schema(&NoSeed)
        .unwrap();

    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityDescriptor::new("Author", "authors")
                .with_field(FieldDescriptor::id())
                .with_field(FieldDescriptor::new("name", FieldType::Text)),
        )
        .unwrap();
    let db = open(&dir, registry.resolve().unwrap(), ContextConfig::default());
    let report = db.sync_schema(&NoSeed).unwrap();
    assert!(report.changed);
    assert_eq!(report.version, Some(2));
}

#[test]
fn test_no_metadata_versus_empty_schema() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, EntityRegistry::new().resolve().unwrap(), ContextConfig::default());
    assert!(db.schema_metadata().unwrap().is_none());
    assert!(db.schema_versions(10).unwrap().is_empty());

    db.sync_schema(&NoSeed).unwrap();
    assert!(db.schema_metadata().unwrap().unwrap().is_empty());
}

#[test]
fn test_validation_fails_before_io() {
    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityDescriptor::new("Pair", "pairs")
                .with_field(FieldDescriptor::new("a", FieldType::Integer).primary_key())
                .with_field(FieldDescriptor::new("b", FieldType::Integer).primary_key()),
        )
        .unwrap();

    let dir = TempDir::new().unwrap();
    let db = open(&dir, registry.resolve().unwrap(), ContextConfig::default());
    let err = db.sync_schema(&NoSeed).unwrap_err();
    assert!(matches!(err, OrmError::Validation(ref errors) if errors.len() == 1));
    assert!(!db.path().exists());
}

#[test]
fn test_custom_prefix() {
    let dir = TempDir::new().unwrap();
    let config = ContextConfig {
        prefix: "meta_".into(),
        ..ContextConfig::default()
    };
    let db = open(&dir, library_schema(), config);
    db.sync_schema(&NoSeed).unwrap();

    let conn = Connection::open(db.path()).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM meta_table_mappings", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 5);
}

struct SeedAuthors;

impl SeedData for SeedAuthors {
    fn seed_data(&self, db: &DbContext) -> Result<()> {
        let authors = db.schema().lookup("Author").unwrap();
        if db.get_all(authors)?.is_empty() {
            let mut ada = db.new_record("Author")?.with("name", "Ada")?;
            db.insert(&mut ada)?;
        }
        Ok(())
    }
}

#[test]
fn test_seed_runs_after_sync() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&SeedAuthors).unwrap();
    db.sync_schema(&SeedAuthors).unwrap();

    let authors = db.schema().lookup("Author").unwrap();
    assert_eq!(db.get_all(authors).unwrap().len(), 1);
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_integer_key_assigned_from_row_id() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let first = author(&db, "Ada");
    let second = author(&db, "Grace");
    assert_eq!(first.id(), Some(&Value::Integer(1)));
    assert_eq!(second.id(), Some(&Value::Integer(2)));
}

#[test]
fn test_text_primary_key_generated() {
    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityDescriptor::new("Token", "tokens")
                .with_field(FieldDescriptor::new("key", FieldType::Text).primary_key())
                .with_field(FieldDescriptor::new("label", FieldType::Text)),
        )
        .unwrap();

    let dir = TempDir::new().unwrap();
    let db = open(&dir, registry.resolve().unwrap(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut token = db.new_record("Token").unwrap().with("label", "api").unwrap();
    db.insert(&mut token).unwrap();

    let key = token.id().and_then(Value::as_str).unwrap().to_string();
    assert_eq!(key.len(), 36);
    assert_ne!(key, "1");

    let stored = db.get_by_id(token.entity(), key.as_str()).unwrap().unwrap();
    assert_eq!(stored.get("label"), Some(&Value::from("api")));
}

#[test]
fn test_failed_text_key_insert_keeps_record_unsaved() {
    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityDescriptor::new("Tag", "tags")
                .with_field(FieldDescriptor::new("code", FieldType::Text).primary_key())
                .with_field(FieldDescriptor::new("label", FieldType::Text).not_null()),
        )
        .unwrap();

    let dir = TempDir::new().unwrap();
    let db = open(&dir, registry.resolve().unwrap(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut tag = db.new_record("Tag").unwrap();
    let err = db.insert(&mut tag).unwrap_err();
    assert!(matches!(err, OrmError::DatabaseError(_)));
    assert!(tag.id().is_none());

    tag.set("label", "x").unwrap();
    db.save(&mut tag).unwrap();
    assert!(tag.id().is_some());
    assert_eq!(db.get_all(tag.entity()).unwrap().len(), 1);
}

#[test]
fn test_update_and_delete() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut ada = author(&db, "Ada");
    ada.set("name", "Ada Lovelace").unwrap();
    assert_eq!(db.update(&ada).unwrap(), 1);

    let id = ada.id().cloned().unwrap();
    let stored = db.get_by_id(ada.entity(), id.clone()).unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("Ada Lovelace")));

    assert_eq!(db.delete(&mut ada).unwrap(), 1);
    assert!(ada.id().is_none());
    assert!(db.get_by_id(ada.entity(), id).unwrap().is_none());
    assert!(matches!(
        db.delete(&mut ada).unwrap_err(),
        OrmError::MissingPrimaryKey(_)
    ));
}

#[test]
fn test_not_null_violation_surfaces_database_error() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut nameless = db.new_record("Author").unwrap();
    let err = db.insert(&mut nameless).unwrap_err();
    assert!(matches!(err, OrmError::DatabaseError(_)));
    assert!(nameless.id().is_none());
}

// ============================================================================
// Queries and relationships
// ============================================================================

#[test]
fn test_back_populated_collection() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let ada = author(&db, "Ada");
    let grace = author(&db, "Grace");
    book(&db, "Notes", Some(&ada));
    book(&db, "Sketch", Some(&ada));
    book(&db, "Compilers", Some(&grace));

    let query = db.collection(&ada, "books").unwrap();
    let titles: Vec<_> = query
        .clone()
        .order_by(col("title").asc())
        .all(&db)
        .unwrap()
        .into_iter()
        .map(|b| b.get("title").cloned().unwrap())
        .collect();
    assert_eq!(titles, [Value::from("Notes"), Value::from("Sketch")]);
    assert_eq!(query.count(&db).unwrap(), 2);
}

#[test]
fn test_unsaved_record_collection_is_empty() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();
    // An orphan book so an `author_id IS NULL` match would be visible.
    book(&db, "Anonymous", None);

    let unsaved = db.new_record("Author").unwrap();
    let query = db.collection(&unsaved, "books").unwrap();
    assert!(query.all(&db).unwrap().is_empty());
    assert_eq!(query.count(&db).unwrap(), 0);
}

#[test]
fn test_unknown_accessor_lists_candidates() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    let ada = db.new_record("Author").unwrap();

    let err = db.collection(&ada, "novels").unwrap_err();
    assert!(err.to_string().contains("novels"));
    assert!(err.to_string().contains("books"));
}

#[test]
fn test_related_fetch() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let ada = author(&db, "Ada");
    let notes = book(&db, "Notes", Some(&ada));
    let orphan = book(&db, "Anonymous", None);

    let fetch = db.related(&notes, "author").unwrap();
    let loaded = fetch.fetch(&db).unwrap().unwrap();
    assert_eq!(loaded.get("name"), Some(&Value::from("Ada")));

    let empty = db.related(&orphan, "author").unwrap();
    assert!(empty.is_empty());
    assert!(empty.fetch(&db).unwrap().is_none());
}

#[test]
fn test_set_related_rejects_wrong_entity() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    let mut notes = db.new_record("Book").unwrap();
    let other = db.new_record("Book").unwrap();
    assert!(matches!(
        db.set_related(&mut notes, "author", Some(&other)).unwrap_err(),
        OrmError::EntityMismatch { .. }
    ));
}

#[test]
fn test_query_filters() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();
    for name in ["Ada", "Alan", "Grace", "Barbara"] {
        author(&db, name);
    }
    let authors = db.schema().lookup("Author").unwrap();

    let a_names = entity_schema_sqlite::Query::new(authors)
        .filter(col("name").like("A%"))
        .count(&db)
        .unwrap();
    assert_eq!(a_names, 2);

    let picked = entity_schema_sqlite::Query::new(authors)
        .filter(col("name").in_(["Grace", "Barbara"]))
        .order_by(col("name").desc())
        .first(&db)
        .unwrap()
        .unwrap();
    assert_eq!(picked.get("name"), Some(&Value::from("Grace")));

    let none = entity_schema_sqlite::Query::new(authors)
        .filter(col("name").in_(Vec::<String>::new()))
        .all(&db)
        .unwrap();
    assert!(none.is_empty());
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_insert_many_across_entities() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut records = vec![
        db.new_record("Author").unwrap().with("name", "Ada").unwrap(),
        db.new_record("Book").unwrap().with("title", "Notes").unwrap(),
        db.new_record("Author").unwrap().with("name", "Grace").unwrap(),
    ];
    assert_eq!(db.insert_many(&mut records).unwrap(), 3);
    assert!(records.iter().all(|r| r.id().is_some()));

    let authors = db.schema().lookup("Author").unwrap();
    assert_eq!(db.get_all(authors).unwrap().len(), 2);
}

#[test]
fn test_insert_many_rolls_back_whole_batch() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut records = vec![
        db.new_record("Author").unwrap().with("name", "Ada").unwrap(),
        // Violates NOT NULL on name.
        db.new_record("Author").unwrap(),
    ];
    assert!(db.insert_many(&mut records).is_err());
    assert!(records.iter().all(|r| r.id().is_none()));

    let authors = db.schema().lookup("Author").unwrap();
    assert!(db.get_all(authors).unwrap().is_empty());
}

#[test]
fn test_update_many_checks_keys_first() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, library_schema(), ContextConfig::default());
    db.sync_schema(&NoSeed).unwrap();

    let mut ada = author(&db, "Ada");
    ada.set("name", "Ada Lovelace").unwrap();
    let unsaved = db.new_record("Author").unwrap().with("name", "Nobody").unwrap();

    let err = db.update_many(&[ada.clone(), unsaved]).unwrap_err();
    assert!(matches!(err, OrmError::MissingPrimaryKey(_)));

    let stored = db.get_by_id(ada.entity(), ada.id().cloned().unwrap()).unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("Ada")));

    assert_eq!(db.update_many(&[ada]).unwrap(), 1);
}
