//! Two-phase foreign key resolution.
//!
//! Phase 1 walks every foreign key of every registered entity and turns its
//! [`TargetSpec`] into a concrete `(table, column)` binding, propagating the
//! target column's type to the key. The result is a flat table of
//! [`RelationshipDef`]s; no entity is touched while it is being built.
//!
//! Phase 2 derives each entity's fixed accessor set from that table:
//!
//! - a [`SingleAccessor`] for every own foreign key named `<name>_id`,
//!   exposed as `<name>`;
//! - a [`CollectionAccessor`] for every foreign key elsewhere that targets
//!   the entity with `back_populates` set.
//!
//! Because the flat table is complete before phase 2 starts, entities
//! registered late still receive accessors declared by earlier ones.

use std::collections::HashMap;
use std::sync::OnceLock;

use indexmap::IndexMap;

use crate::error::{Result, SchemaError, join_available};
use crate::registry::{EntityId, EntityRegistry};
use crate::types::{EntityDescriptor, FieldDescriptor, FieldType, TargetSpec, Value};

/// Suffix that marks a foreign key as a reference to a single entity.
pub const REFERENCE_SUFFIX: &str = "_id";

/// A foreign key binding produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedForeignKey {
    pub target: EntityId,
    pub target_table: String,
    pub target_column: String,
    pub back_populates: Option<String>,
}

/// A field with its effective type.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: String,
    /// Declared type, or the target column's type for foreign keys.
    pub field_type: FieldType,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub default_value: Option<Value>,
    pub foreign_key: Option<ResolvedForeignKey>,
}

impl ResolvedField {
    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }
}

/// One row of the flat relationship table built in phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    pub owner: EntityId,
    pub field: String,
    pub target: EntityId,
    pub target_table: String,
    pub target_column: String,
    pub back_populates: Option<String>,
}

/// Many-to-one accessor: `book.author` for `book.author_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleAccessor {
    pub name: String,
    pub fk_field: String,
    pub target: EntityId,
}

/// One-to-many accessor: `author.books` for `Book.author_id` with
/// `back_populates = "books"`.
#[derive(Debug)]
pub struct CollectionAccessor {
    pub name: String,
    /// Name of the entity that owns the foreign key.
    pub source_entity: String,
    pub fk_field: String,
    validated: OnceLock<EntityId>,
}

impl CollectionAccessor {
    fn new(name: String, source_entity: String, fk_field: String) -> Self {
        Self {
            name,
            source_entity,
            fk_field,
            validated: OnceLock::new(),
        }
    }

    /// Returns the owning entity, validating the declared names on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownEntity`] or [`SchemaError::UnknownField`]
    /// with the valid alternatives if either name does not exist.
    pub fn source(&self, schema: &Schema) -> Result<EntityId> {
        if let Some(id) = self.validated.get() {
            return Ok(*id);
        }

        let source = schema.require_entity(&self.source_entity)?;
        if source.field(&self.fk_field).is_none() {
            return Err(SchemaError::UnknownField {
                entity: self.source_entity.clone(),
                field: self.fk_field.clone(),
                available: join_available(source.field_names()),
            });
        }

        Ok(*self.validated.get_or_init(|| source.id()))
    }
}

impl Clone for CollectionAccessor {
    fn clone(&self) -> Self {
        Self::new(
            self.name.clone(),
            self.source_entity.clone(),
            self.fk_field.clone(),
        )
    }
}

/// A registered entity after resolution.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    id: EntityId,
    name: String,
    table_name: String,
    fields: IndexMap<String, ResolvedField>,
    single_accessors: Vec<SingleAccessor>,
    collection_accessors: Vec<CollectionAccessor>,
}

impl ResolvedEntity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.get(name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// First primary-key field in declaration order.
    pub fn primary_key(&self) -> Option<&ResolvedField> {
        self.fields.values().find(|f| f.is_primary_key)
    }

    pub fn single_accessors(&self) -> &[SingleAccessor] {
        &self.single_accessors
    }

    pub fn collection_accessors(&self) -> &[CollectionAccessor] {
        &self.collection_accessors
    }

    /// Looks up a many-to-one accessor by name.
    pub fn single_accessor(&self, name: &str) -> Result<&SingleAccessor> {
        self.single_accessors
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| self.unknown_relationship(name))
    }

    /// Looks up a one-to-many accessor by name.
    pub fn collection_accessor(&self, name: &str) -> Result<&CollectionAccessor> {
        self.collection_accessors
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| self.unknown_relationship(name))
    }

    /// Returns the field or an error listing the valid field names.
    pub fn require_field(&self, name: &str) -> Result<&ResolvedField> {
        self.fields.get(name).ok_or_else(|| SchemaError::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
            available: join_available(self.field_names()),
        })
    }

    fn unknown_relationship(&self, name: &str) -> SchemaError {
        let names = self
            .single_accessors
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.collection_accessors.iter().map(|a| a.name.as_str()));
        SchemaError::UnknownRelationship {
            entity: self.name.clone(),
            name: name.to_string(),
            available: join_available(names),
        }
    }
}

/// A fully resolved, read-only schema.
///
/// Produced once by [`EntityRegistry::resolve`] and typically shared behind
/// an `Arc` by the database context and the generators.
#[derive(Debug, Clone)]
pub struct Schema {
    tag: u32,
    entities: Vec<ResolvedEntity>,
    by_name: HashMap<String, EntityId>,
    relationships: Vec<RelationshipDef>,
}

impl Schema {
    /// Returns the entity for a handle issued by the originating registry.
    pub fn entity(&self, id: EntityId) -> Option<&ResolvedEntity> {
        if id.registry() != self.tag {
            return None;
        }
        self.entities.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&ResolvedEntity> {
        self.lookup(name).and_then(|id| self.entity(id))
    }

    pub fn entity_by_table(&self, table: &str) -> Option<&ResolvedEntity> {
        self.entities.iter().find(|e| e.table_name == table)
    }

    /// Returns the entity or an error listing the registered names.
    pub fn require_entity(&self, name: &str) -> Result<&ResolvedEntity> {
        self.entity_by_name(name)
            .ok_or_else(|| SchemaError::UnknownEntity {
                name: name.to_string(),
                available: join_available(self.entities().map(ResolvedEntity::name)),
            })
    }

    /// Entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.iter()
    }

    /// The flat relationship table built during phase 1.
    pub fn relationships(&self) -> &[RelationshipDef] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityRegistry {
    /// Resolves every foreign key and builds relationship accessors.
    ///
    /// Consumes the registry: resolution runs exactly once, after all
    /// entities are registered.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::UnknownEntity`] for a name target that is not registered.
    /// - [`SchemaError::InvalidTarget`] for a handle from another registry or a
    ///   deferred lookup that yields nothing.
    /// - [`SchemaError::UnknownTargetColumn`] when the target column is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use entity_schema_core::*;
    ///
    /// let mut registry = EntityRegistry::new();
    /// registry.register(EntityDescriptor::new("Author", "authors")
    ///     .with_field(FieldDescriptor::id())).unwrap();
    /// registry.register(EntityDescriptor::new("Book", "books")
    ///     .with_field(FieldDescriptor::id())
    ///     .with_foreign_key("author_id", ForeignKeySpec::new("Author").back_populates("books")))
    ///     .unwrap();
    ///
    /// let schema = registry.resolve().unwrap();
    /// let author = schema.entity_by_name("Author").unwrap();
    /// assert_eq!(author.collection_accessors()[0].name, "books");
    /// let book = schema.entity_by_name("Book").unwrap();
    /// assert_eq!(book.single_accessors()[0].name, "author");
    /// ```
    pub fn resolve(self) -> Result<Schema> {
        let tag = self.tag();

        // Phase 1: bind every foreign key target.
        let mut relationships = Vec::new();
        let mut links: HashMap<FieldKey, (FieldKey, FieldType)> = HashMap::new();
        for (owner, entity) in self.iter() {
            for field in entity.fields() {
                let Some(spec) = &field.foreign_key else {
                    continue;
                };
                let (target, target_entity) = self.resolve_target(entity, field, &spec.target)?;
                let target_field = target_entity.field(&spec.target_column).ok_or_else(|| {
                    SchemaError::UnknownTargetColumn {
                        entity: target_entity.name().to_string(),
                        column: spec.target_column.clone(),
                        available: join_available(target_entity.field_names()),
                    }
                })?;

                links.insert(
                    (owner.index(), field.name.clone()),
                    ((target.index(), target_field.name.clone()), target_field.field_type),
                );
                relationships.push(RelationshipDef {
                    owner,
                    field: field.name.clone(),
                    target,
                    target_table: target_entity.table_name().to_string(),
                    target_column: spec.target_column.clone(),
                    back_populates: spec.back_populates.clone(),
                });
            }
        }

        let effective_types = chase_key_types(&links);

        // Phase 2: build each entity's accessor set from the flat table.
        let names: Vec<String> = self.names().map(String::from).collect();
        let mut entities = Vec::with_capacity(self.len());
        for (index, descriptor) in self.into_entities().into_iter().enumerate() {
            let id = EntityId::new(tag, index);
            entities.push(build_entity(
                id,
                descriptor,
                &relationships,
                &effective_types,
                &names,
            ));
        }

        let by_name = entities
            .iter()
            .map(|e| (e.name.clone(), e.id))
            .collect();

        Ok(Schema {
            tag,
            entities,
            by_name,
            relationships,
        })
    }

    fn resolve_target(
        &self,
        owner: &EntityDescriptor,
        field: &FieldDescriptor,
        target: &TargetSpec,
    ) -> Result<(EntityId, &EntityDescriptor)> {
        let invalid = |reason: &str| SchemaError::InvalidTarget {
            entity: owner.name().to_string(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };

        let id = match target {
            TargetSpec::ByName(name) => {
                self.lookup(name).ok_or_else(|| SchemaError::UnknownEntity {
                    name: name.clone(),
                    available: join_available(self.names()),
                })?
            }
            TargetSpec::ByHandle(id) => *id,
            TargetSpec::ByDeferredLookup(lookup) => {
                lookup().ok_or_else(|| invalid("deferred lookup returned no entity"))?
            }
        };

        self.get(id)
            .map(|entity| (id, entity))
            .ok_or_else(|| invalid("handle was not issued by this registry"))
    }
}

/// An entity index paired with one of its field names.
type FieldKey = (usize, String);

/// Follows each foreign key through chained references to the type of the
/// first column that is not itself a foreign key. A cycle stops after every
/// link has been visited once.
fn chase_key_types(
    links: &HashMap<FieldKey, (FieldKey, FieldType)>,
) -> HashMap<FieldKey, FieldType> {
    links
        .iter()
        .map(|(key, (next, declared))| {
            let mut field_type = *declared;
            let mut current = next;
            for _ in 0..links.len() {
                let Some((next, declared)) = links.get(current) else {
                    break;
                };
                field_type = *declared;
                current = next;
            }
            (key.clone(), field_type)
        })
        .collect()
}

fn build_entity(
    id: EntityId,
    descriptor: EntityDescriptor,
    relationships: &[RelationshipDef],
    effective_types: &HashMap<FieldKey, FieldType>,
    names: &[String],
) -> ResolvedEntity {
    let fields = descriptor
        .fields()
        .map(|field| {
            let binding = relationships
                .iter()
                .find(|r| r.owner == id && r.field == field.name);
            let field_type = effective_types
                .get(&(id.index(), field.name.clone()))
                .copied()
                .unwrap_or(field.field_type);
            let resolved = ResolvedField {
                name: field.name.clone(),
                field_type,
                is_primary_key: field.is_primary_key,
                is_nullable: field.is_nullable,
                default_value: field.default_value.clone(),
                foreign_key: binding.map(|r| ResolvedForeignKey {
                    target: r.target,
                    target_table: r.target_table.clone(),
                    target_column: r.target_column.clone(),
                    back_populates: r.back_populates.clone(),
                }),
            };
            (field.name.clone(), resolved)
        })
        .collect();

    let single_accessors = relationships
        .iter()
        .filter(|r| r.owner == id)
        .filter_map(|r| {
            let name = r.field.strip_suffix(REFERENCE_SUFFIX)?;
            (!name.is_empty()).then(|| SingleAccessor {
                name: name.to_string(),
                fk_field: r.field.clone(),
                target: r.target,
            })
        })
        .collect();

    let collection_accessors = relationships
        .iter()
        .filter(|r| r.target == id)
        .filter_map(|r| {
            let name = r.back_populates.clone()?;
            Some(CollectionAccessor::new(
                name,
                names[r.owner.index()].clone(),
                r.field.clone(),
            ))
        })
        .collect();

    ResolvedEntity {
        id,
        name: descriptor.name().to_string(),
        table_name: descriptor.table_name().to_string(),
        fields,
        single_accessors,
        collection_accessors,
    }
}
