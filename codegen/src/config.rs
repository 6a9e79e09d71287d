//! Generator settings and entity declaration files.
//!
//! [`CodegenConfig`] is the YAML-serializable configuration shared by the
//! generators and the CLI. [`EntityFile`] declares entities in YAML or JSON
//! so that schemas can be synced and generated without writing Rust.
//!
//! # Example YAML
//!
//! ```yaml
//! cache_dir: .entity_schema
//! sensitive_fields: [id, password_hash]
//! prefix: _entity_schema_
//! busy_timeout_ms: 5000
//! version_policy: on_change
//! wal: true
//! ```
//!
//! # Example declaration file
//!
//! ```yaml
//! entities:
//!   - name: Author
//!     table: authors
//!     fields:
//!       - { name: id, type: integer, primary_key: true }
//!       - { name: name, type: text, nullable: false }
//!   - name: Book
//!     table: books
//!     fields:
//!       - { name: id, type: integer, primary_key: true }
//!       - { name: author_id, references: Author, back_populates: books }
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use entity_schema_core::{
    EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType, ForeignKeySpec, Schema,
    TargetSpec,
};
use entity_schema_sqlite::{ContextConfig, DEFAULT_PREFIX, VersionPolicy, decode_default};
use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, Result};
use crate::forward::DtoOptions;
use crate::sidecar::DEFAULT_CACHE_DIR;

/// Generator and connection settings.
///
/// Every key is optional; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Directory holding sidecar records.
    pub cache_dir: PathBuf,
    /// Field names left out of generated DTOs.
    pub sensitive_fields: Vec<String>,
    /// Prefix of the reserved metadata tables.
    pub prefix: String,
    pub busy_timeout_ms: u64,
    pub version_policy: VersionPolicy,
    pub wal: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        let context = ContextConfig::default();
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            sensitive_fields: DtoOptions::default().sensitive_fields,
            prefix: DEFAULT_PREFIX.to_string(),
            busy_timeout_ms: context.busy_timeout.as_millis() as u64,
            version_policy: context.version_policy,
            wal: context.wal,
        }
    }
}

impl CodegenConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](CodegenError::Io) if the file cannot be read, or
    /// [`Yaml`](CodegenError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            prefix: self.prefix.clone(),
            version_policy: self.version_policy,
            wal: self.wal,
        }
    }

    pub fn dto_options(&self) -> DtoOptions {
        DtoOptions {
            sensitive_fields: self.sensitive_fields.clone(),
            ..DtoOptions::default()
        }
    }
}

/// One declared field.
///
/// A field either has a `type` or `references` another entity by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub primary_key: bool,
    /// Defaults to `true`, or `false` for primary keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Target entity name for a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_populates: Option<String>,
}

/// One declared entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDecl>,
}

/// A set of entity declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFile {
    pub entities: Vec<EntityDecl>,
}

impl EntityFile {
    /// Loads declarations from a `.json` file, or YAML for any other extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let decls = if is_json {
            serde_json::from_reader(reader)?
        } else {
            serde_yaml::from_reader(reader)?
        };
        Ok(decls)
    }

    /// Converts the declarations into descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::InvalidDeclaration`] for a field with neither
    /// a type nor a reference.
    pub fn descriptors(&self) -> Result<Vec<EntityDescriptor>> {
        self.entities
            .iter()
            .map(|entity| {
                entity.fields.iter().try_fold(
                    EntityDescriptor::new(entity.name.clone(), entity.table.clone()),
                    |descriptor, field| -> Result<EntityDescriptor> {
                        Ok(descriptor.with_field(field_descriptor(entity, field)?))
                    },
                )
            })
            .collect()
    }

    /// Registers every declared entity; foreign keys target entities by name.
    pub fn to_registry(&self) -> Result<EntityRegistry> {
        let mut registry = EntityRegistry::new();
        for descriptor in self.descriptors()? {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Registers and resolves the declarations.
    pub fn resolve(&self) -> Result<Schema> {
        Ok(self.to_registry()?.resolve()?)
    }
}

fn field_descriptor(entity: &EntityDecl, decl: &FieldDecl) -> Result<FieldDescriptor> {
    let mut field = match (&decl.references, decl.field_type) {
        (Some(target), _) => {
            let mut spec = ForeignKeySpec::new(TargetSpec::by_name(target.clone()));
            if let Some(column) = &decl.target_column {
                spec = spec.target_column(column.clone());
            }
            if let Some(back) = &decl.back_populates {
                spec = spec.back_populates(back.clone());
            }
            FieldDescriptor::foreign(decl.name.clone(), spec)
        }
        (None, Some(field_type)) => FieldDescriptor::new(decl.name.clone(), field_type),
        (None, None) => {
            return Err(CodegenError::InvalidDeclaration(format!(
                "{}.{} needs a type or a reference",
                entity.name, decl.name
            )));
        }
    };

    if decl.primary_key {
        field = field.primary_key();
    }
    field = field.nullable(decl.nullable.unwrap_or(!decl.primary_key));
    if let Some(default) = &decl.default {
        if !default.is_null() {
            let field_type = decl.field_type.unwrap_or(field.field_type);
            field = field.default(decode_default(field_type, &default.to_string()));
        }
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use entity_schema_core::Value;

    use super::*;

    fn library_yaml() -> &'static str {
        r#"
entities:
  - name: Author
    table: authors
    fields:
      - { name: id, type: integer, primary_key: true }
      - { name: name, type: text, nullable: false }
      - { name: active, type: boolean, default: true }
      - { name: rating, type: decimal, default: 4 }
  - name: Book
    table: books
    fields:
      - { name: id, type: integer, primary_key: true }
      - { name: title, type: text }
      - { name: author_id, references: Author, back_populates: books }
"#
    }

    #[test]
    fn test_config_defaults_for_missing_keys() {
        let config: CodegenConfig = serde_yaml::from_str("prefix: meta_\n").unwrap();
        assert_eq!(config.prefix, "meta_");
        assert_eq!(config.cache_dir, PathBuf::from(".entity_schema"));
        assert_eq!(config.sensitive_fields, ["id"]);
        assert_eq!(config.version_policy, VersionPolicy::OnChange);
        assert_eq!(config.context_config().busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegen.yml");
        let config = CodegenConfig {
            version_policy: VersionPolicy::Always,
            sensitive_fields: vec!["id".into(), "secret".into()],
            ..CodegenConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CodegenConfig::load(&path).unwrap(), config);
        assert_eq!(
            CodegenConfig::load_or_default(dir.path().join("missing.yml")).unwrap(),
            CodegenConfig::default()
        );
    }

    #[test]
    fn test_entity_file_resolves() {
        let file: EntityFile = serde_yaml::from_str(library_yaml()).unwrap();
        let schema = file.resolve().unwrap();

        let author = schema.entity_by_name("Author").unwrap();
        assert!(!author.field("id").unwrap().is_nullable);
        assert!(author.field("active").unwrap().is_nullable);
        assert_eq!(
            author.field("active").unwrap().default_value,
            Some(Value::Boolean(true))
        );
        assert_eq!(
            author.field("rating").unwrap().default_value,
            Some(Value::Decimal(4.0))
        );
        assert_eq!(author.collection_accessors()[0].name, "books");

        let fk = schema.entity_by_name("Book").unwrap().field("author_id").unwrap();
        assert_eq!(fk.foreign_key.as_ref().unwrap().target_table, "authors");
    }

    #[test]
    fn test_entity_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        let file: EntityFile = serde_yaml::from_str(library_yaml()).unwrap();
        std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();
        assert_eq!(EntityFile::load(&path).unwrap(), file);
    }

    #[test]
    fn test_untyped_field_is_rejected() {
        let file: EntityFile =
            serde_yaml::from_str("entities:\n  - { name: A, table: a, fields: [{ name: x }] }\n")
                .unwrap();
        let err = file.descriptors().unwrap_err();
        assert!(err.to_string().contains("A.x needs a type or a reference"));
    }
}
