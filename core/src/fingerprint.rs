//! Deterministic fingerprint of the declared entity set.
//!
//! The hash covers entity names, table names, and per-field name, effective
//! type, primary-key flag and nullability. Declaration order, defaults and
//! foreign-key bindings do not affect it.

use sha2::{Digest, Sha256};

use crate::resolve::{ResolvedEntity, Schema};

/// Computes the hex SHA-256 fingerprint of a schema.
///
/// # Examples
///
/// ```
/// use entity_schema_core::*;
///
/// let mut registry = EntityRegistry::new();
/// registry.register(EntityDescriptor::new("Author", "authors")
///     .with_field(FieldDescriptor::id())).unwrap();
/// let schema = registry.resolve().unwrap();
///
/// let hash = compute_hash(&schema);
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, compute_hash(&schema));
/// ```
pub fn compute_hash(schema: &Schema) -> String {
    let mut entities: Vec<&ResolvedEntity> = schema.entities().collect();
    entities.sort_by(|a, b| a.name().cmp(b.name()));

    let signature = entities
        .into_iter()
        .map(entity_signature)
        .collect::<Vec<_>>()
        .join("\n");

    format!("{:x}", Sha256::digest(signature.as_bytes()))
}

fn entity_signature(entity: &ResolvedEntity) -> String {
    let mut fields: Vec<_> = entity.fields().collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    let fields = fields
        .into_iter()
        .map(|f| {
            format!(
                "{}:{}:{}:{}",
                f.name,
                f.field_type.name(),
                f.is_primary_key,
                f.is_nullable
            )
        })
        .collect::<Vec<_>>()
        .join("|");

    format!("{}:{}:{}", entity.name(), entity.table_name(), fields)
}
