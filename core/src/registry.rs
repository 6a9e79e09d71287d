//! Caller-owned entity registry.
//!
//! Entities are registered explicitly during bootstrap. The registry hands
//! out [`EntityId`] handles that can be used as foreign-key targets, and is
//! consumed by [`EntityRegistry::resolve`] once every entity is known.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, SchemaError};
use crate::types::EntityDescriptor;

static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(1);

/// Handle to an entity registered in a specific registry.
///
/// Handles carry the identity of the registry that issued them, so a handle
/// from another registry is rejected during resolution instead of silently
/// pointing at an unrelated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    registry: u32,
    index: u32,
}

impl EntityId {
    pub(crate) fn new(registry: u32, index: usize) -> Self {
        Self {
            registry,
            index: index as u32,
        }
    }

    /// Position of the entity in registration order.
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn registry(self) -> u32 {
        self.registry
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.index)
    }
}

/// Mapping of entity name to descriptor, populated once at bootstrap.
///
/// # Examples
///
/// ```
/// use entity_schema_core::{EntityDescriptor, EntityRegistry, FieldDescriptor};
///
/// let mut registry = EntityRegistry::new();
/// let author = registry
///     .register(EntityDescriptor::new("Author", "authors").with_field(FieldDescriptor::id()))
///     .unwrap();
///
/// assert_eq!(registry.lookup("Author"), Some(author));
/// assert!(registry
///     .register(EntityDescriptor::new("Author", "writers"))
///     .is_err());
/// ```
#[derive(Debug)]
pub struct EntityRegistry {
    tag: u32,
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<String, EntityId>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            tag: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            entities: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers an entity and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateEntity`] if the name is taken, or
    /// [`SchemaError::DuplicateTable`] if another entity maps to the same table.
    pub fn register(&mut self, entity: EntityDescriptor) -> Result<EntityId> {
        if self.by_name.contains_key(entity.name()) {
            return Err(SchemaError::DuplicateEntity(entity.name().to_string()));
        }
        if let Some(existing) = self
            .entities
            .iter()
            .find(|e| e.table_name() == entity.table_name())
        {
            return Err(SchemaError::DuplicateTable {
                table: entity.table_name().to_string(),
                existing: existing.name().to_string(),
            });
        }

        let id = EntityId::new(self.tag, self.entities.len());
        self.by_name.insert(entity.name().to_string(), id);
        self.entities.push(entity);
        Ok(id)
    }

    /// Looks up an entity handle by name.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Returns the descriptor for a handle issued by this registry.
    pub fn get(&self, id: EntityId) -> Option<&EntityDescriptor> {
        if id.registry != self.tag {
            return None;
        }
        self.entities.get(id.index())
    }

    /// Iterates over entities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityDescriptor)> {
        let tag = self.tag;
        self.entities
            .iter()
            .enumerate()
            .map(move |(i, e)| (EntityId::new(tag, i), e))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn tag(&self) -> u32 {
        self.tag
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(EntityDescriptor::name)
    }

    pub(crate) fn into_entities(self) -> Vec<EntityDescriptor> {
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldDescriptor;

    fn entity(name: &str, table: &str) -> EntityDescriptor {
        EntityDescriptor::new(name, table).with_field(FieldDescriptor::id())
    }

    #[test]
    fn test_register_assigns_sequential_handles() {
        let mut registry = EntityRegistry::new();
        let a = registry.register(entity("Author", "authors")).unwrap();
        let b = registry.register(entity("Book", "books")).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(b).unwrap().name(), "Book");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut registry = EntityRegistry::new();
        registry.register(entity("Author", "authors")).unwrap();
        let err = registry.register(entity("Writer", "authors")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTable { ref existing, .. } if existing == "Author"));
    }

    #[test]
    fn test_foreign_handle_not_found() {
        let mut first = EntityRegistry::new();
        let handle = first.register(entity("Author", "authors")).unwrap();

        let mut second = EntityRegistry::new();
        second.register(entity("Book", "books")).unwrap();
        assert!(second.get(handle).is_none());
    }
}
