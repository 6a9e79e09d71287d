//! Integration tests for the entity-schema-codegen crate.

use std::fs;
use std::sync::Arc;

use entity_schema_codegen::{
    CodegenConfig, CodegenError, DtoOptions, EntityFile, FileWriter, GeneratedFileRecord,
    WriteOutcome, descriptors_from_metadata, generate_data_context, generate_dtos,
    generate_entities, load_metadata, registry_from_metadata, sidecar_path,
};
use entity_schema_core::{
    EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType, ForeignKeySpec, Schema, Value,
    compute_hash,
};
use entity_schema_sqlite::{ContextConfig, DbContext, MetadataStore, NoSeed};
use tempfile::TempDir;

fn library_schema() -> Schema {
    let mut registry = EntityRegistry::new();
    let author = registry
        .register(
            EntityDescriptor::new("Author", "authors")
                .with_field(FieldDescriptor::id())
                .with_field(FieldDescriptor::new("name", FieldType::Text).not_null())
                .with_field(FieldDescriptor::new("active", FieldType::Boolean).default(true)),
        )
        .unwrap();
    registry
        .register(
            EntityDescriptor::new("Book", "books")
                .with_field(FieldDescriptor::id())
                .with_field(FieldDescriptor::new("title", FieldType::Text))
                .with_field(FieldDescriptor::new("price", FieldType::Decimal).default(9.5))
                .with_foreign_key(
                    "author_id",
                    ForeignKeySpec::new(author).back_populates("books"),
                ),
        )
        .unwrap();
    registry.resolve().unwrap()
}

fn synced(dir: &TempDir, schema: Schema, config: ContextConfig) -> DbContext {
    let db = DbContext::open(dir.path().join("library.db"), Arc::new(schema), config).unwrap();
    db.sync_schema(&NoSeed).unwrap();
    db
}

fn dto_writer() -> FileWriter {
    generate_dtos(&library_schema(), &DtoOptions::default())
}

// ============================================================================
// Drift detection
// ============================================================================

#[test]
fn test_first_write_records_sidecar() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("src").join("dto.rs");
    let cache = dir.path().join(".entity_schema");

    let outcome = dto_writer().write_file(&output, &cache, false).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);

    let content = fs::read_to_string(&output).unwrap();
    let record = GeneratedFileRecord::load(sidecar_path(&cache, &output)).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.sha256, entity_schema_codegen::content_hash(&content));
    assert_eq!(record.path, output.to_string_lossy());

    let names: Vec<&str> = record.meta.classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["AuthorDto", "BookDto"]);
    let lines: Vec<&str> = content.lines().collect();
    for class in &record.meta.classes {
        assert!(lines[class.span.start].starts_with("pub struct "));
        assert_eq!(lines[class.span.end], "}");
        assert!(lines[class.decorators[0].start].starts_with("#[derive("));
    }
}

#[test]
fn test_hand_edit_is_preserved_until_forced() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("dto.rs");
    let cache = dir.path().join("cache");

    dto_writer().write_file(&output, &cache, false).unwrap();
    let edited = format!("{}\n// keep me\n", fs::read_to_string(&output).unwrap());
    fs::write(&output, &edited).unwrap();

    let outcome = dto_writer().write_file(&output, &cache, false).unwrap();
    assert_eq!(outcome, WriteOutcome::Skipped);
    assert_eq!(fs::read_to_string(&output).unwrap(), edited);

    let outcome = dto_writer().write_file(&output, &cache, true).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
    assert!(!fs::read_to_string(&output).unwrap().contains("keep me"));

    // The forced write refreshed the sidecar, so plain regeneration works again.
    let outcome = dto_writer().write_file(&output, &cache, false).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
}

#[test]
fn test_missing_or_malformed_sidecar_regenerates() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("dto.rs");
    let cache = dir.path().join("cache");

    fs::write(&output, "// written by someone else\n").unwrap();
    let outcome = dto_writer().write_file(&output, &cache, false).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);

    fs::write(&output, "// edited\n").unwrap();
    fs::write(sidecar_path(&cache, &output), "not json").unwrap();
    let outcome = dto_writer().write_file(&output, &cache, false).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
    assert!(fs::read_to_string(&output).unwrap().contains("pub struct AuthorDto"));
}

// ============================================================================
// Forward generation
// ============================================================================

#[test]
fn test_data_context_write() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("context.rs");
    generate_data_context(&library_schema())
        .write_file(&output, dir.path().join("cache"), false)
        .unwrap();

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains("    pub authors: EntityId,"));
    assert!(content.contains("    pub books: EntityId,"));
    assert!(content.contains("    fn seed_data(&self, db: &DbContext) -> Result<()> {"));
}

// ============================================================================
// Reverse generation
// ============================================================================

#[test]
fn test_forward_sync_reverse_round_trip() {
    let dir = TempDir::new().unwrap();
    let original = library_schema();
    let original_hash = compute_hash(&original);
    let db = synced(&dir, original, ContextConfig::default());

    let metadata = load_metadata(db.path(), ContextConfig::default()).unwrap();
    let store = MetadataStore::default();

    let descriptors = descriptors_from_metadata(&metadata, &store);
    assert_eq!(descriptors.len(), 2);
    let book = descriptors.iter().find(|d| d.name() == "Book").unwrap();
    assert_eq!(
        book.field("price").unwrap().default_value,
        Some(Value::Decimal(9.5))
    );

    let rebuilt = registry_from_metadata(&metadata, &store)
        .unwrap()
        .resolve()
        .unwrap();
    assert_eq!(compute_hash(&rebuilt), original_hash);

    let author = rebuilt.entity_by_name("Author").unwrap();
    assert_eq!(author.collection_accessors()[0].name, "books");
    assert_eq!(
        author.field("active").unwrap().default_value,
        Some(Value::Boolean(true))
    );
}

#[test]
fn test_generated_entities_file() {
    let dir = TempDir::new().unwrap();
    let db = synced(&dir, library_schema(), ContextConfig::default());
    let metadata = load_metadata(db.path(), ContextConfig::default()).unwrap();

    let output = dir.path().join("entities.rs");
    generate_entities(&metadata, &MetadataStore::default())
        .write_file(&output, dir.path().join("cache"), false)
        .unwrap();

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains("pub struct Author {"));
    assert!(content.contains("    pub books: Vec<Book>,"));
    assert!(content.contains("    pub price: Option<f64>,"));
    assert!(content.contains(".default(Value::Decimal(9.5))"));
    assert!(content.contains("Value};"));
    assert!(!content.contains("_entity_schema_"));
}

#[test]
fn test_custom_prefix_metadata() {
    let dir = TempDir::new().unwrap();
    let config = ContextConfig {
        prefix: "meta_".to_string(),
        ..ContextConfig::default()
    };
    let db = synced(&dir, library_schema(), config.clone());

    let metadata = load_metadata(db.path(), config).unwrap();
    assert_eq!(
        metadata.keys().collect::<Vec<_>>(),
        ["authors", "books"]
    );

    let err = load_metadata(db.path(), ContextConfig::default()).unwrap_err();
    assert!(matches!(err, CodegenError::NoMetadata(_)));
}

#[test]
fn test_no_metadata_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.db");
    let err = load_metadata(&missing, ContextConfig::default()).unwrap_err();
    assert!(matches!(err, CodegenError::NoMetadata(_)));
    assert!(!missing.exists());

    let empty = dir.path().join("empty.db");
    rusqlite::Connection::open(&empty).unwrap();
    let err = load_metadata(&empty, ContextConfig::default()).unwrap_err();
    assert!(err.to_string().contains("run a schema sync first"));
}

#[test]
fn test_empty_sync_differs_from_fresh_database() {
    let dir = TempDir::new().unwrap();
    let empty = EntityRegistry::new().resolve().unwrap();
    let db = synced(&dir, empty, ContextConfig::default());

    let err = load_metadata(db.path(), ContextConfig::default()).unwrap_err();
    assert!(matches!(err, CodegenError::EmptySchema(_)));
    assert!(err.to_string().contains("synced with no entities"));

    let fresh = dir.path().join("fresh.db");
    rusqlite::Connection::open(&fresh).unwrap();
    let err = load_metadata(&fresh, ContextConfig::default()).unwrap_err();
    assert!(matches!(err, CodegenError::NoMetadata(_)));
}

// ============================================================================
// Declaration files
// ============================================================================

#[test]
fn test_declaration_file_drives_sync() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entities.yml");
    fs::write(
        &path,
        r#"
entities:
  - name: Author
    table: authors
    fields:
      - { name: id, type: integer, primary_key: true }
      - { name: name, type: text, nullable: false }
      - { name: active, type: boolean, default: true }
  - name: Book
    table: books
    fields:
      - { name: id, type: integer, primary_key: true }
      - { name: title, type: text }
      - { name: price, type: decimal }
      - { name: author_id, references: Author, back_populates: books }
"#,
    )
    .unwrap();

    let schema = EntityFile::load(&path).unwrap().resolve().unwrap();
    assert_eq!(compute_hash(&schema), compute_hash(&library_schema()));

    let config = CodegenConfig::default();
    let db = synced(&dir, schema, config.context_config());
    let metadata = load_metadata(db.path(), config.context_config()).unwrap();
    assert_eq!(metadata["books"].len(), 4);
}
