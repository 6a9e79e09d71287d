//! Relationship navigation over resolved accessors.
//!
//! A record reaches related records through the accessors resolution
//! built for its entity: `book.author` follows the record's own
//! `author_id`, `author.books` finds every book whose `author_id` points
//! back at the author.

use entity_schema_core::{EntityId, ResolvedEntity, Value};

use crate::context::DbContext;
use crate::error::{OrmError, Result};
use crate::query::{Condition, Query, col};
use crate::record::Record;

/// A pending many-to-one lookup.
///
/// Nothing is read until [`fetch`](Self::fetch) is called. A null foreign
/// key resolves to `None` without touching the database.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedFetch {
    target: EntityId,
    column: String,
    value: Value,
}

impl RelatedFetch {
    pub fn target(&self) -> EntityId {
        self.target
    }

    /// Returns `true` if the foreign key is null.
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }

    /// Loads the related record.
    pub fn fetch(&self, db: &DbContext) -> Result<Option<Record>> {
        if self.is_empty() {
            return Ok(None);
        }
        Query::new(self.target)
            .filter(col(&self.column).eq(self.value.clone()))
            .first(db)
    }
}

fn target_column(entity: &ResolvedEntity, fk_field: &str) -> Result<String> {
    let field = entity.require_field(fk_field)?;
    field
        .foreign_key
        .as_ref()
        .map(|fk| fk.target_column.clone())
        .ok_or_else(|| {
            OrmError::ConversionError(format!("{}.{fk_field} is not a foreign key", entity.name()))
        })
}

impl DbContext {
    /// Builds the one-to-many query behind a `back_populates` accessor.
    ///
    /// The query is not executed. For a record whose referenced column is
    /// still null (typically unsaved) the query matches no rows.
    ///
    /// # Errors
    ///
    /// Returns a schema error listing the valid names if the accessor, its
    /// owning entity, or its field does not exist.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # fn demo(db: &entity_schema_sqlite::DbContext) -> entity_schema_sqlite::Result<()> {
    /// let author = db.new_record("Author")?.with("name", "Ada")?;
    /// // Unsaved: the query is valid and returns nothing.
    /// assert!(db.collection(&author, "books")?.all(db)?.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn collection(&self, record: &Record, name: &str) -> Result<Query> {
        let owner = self.entity(record.entity())?;
        let accessor = owner.collection_accessor(name)?;
        let source_id = accessor.source(self.schema())?;
        let source = self.entity(source_id)?;
        let column = target_column(source, &accessor.fk_field)?;

        let key = record.value(&column);
        let query = Query::new(source_id);
        Ok(if key.is_null() {
            query.filter(Condition::never())
        } else {
            query.filter(col(&accessor.fk_field).eq(key.clone()))
        })
    }

    /// Prepares the many-to-one lookup behind a `<name>_id` foreign key.
    pub fn related(&self, record: &Record, name: &str) -> Result<RelatedFetch> {
        let owner = self.entity(record.entity())?;
        let accessor = owner.single_accessor(name)?;
        Ok(RelatedFetch {
            target: accessor.target,
            column: target_column(owner, &accessor.fk_field)?,
            value: record.value(&accessor.fk_field).clone(),
        })
    }

    /// Points a record's foreign key at `other`, or clears it with `None`.
    ///
    /// Only the record in memory changes; save it to persist the link.
    pub fn set_related(
        &self,
        record: &mut Record,
        name: &str,
        other: Option<&Record>,
    ) -> Result<()> {
        let owner = self.entity(record.entity())?;
        let accessor = owner.single_accessor(name)?;
        let column = target_column(owner, &accessor.fk_field)?;

        let value = match other {
            None => Value::Null,
            Some(other) if other.entity() == accessor.target => other.value(&column).clone(),
            Some(other) => {
                return Err(OrmError::EntityMismatch {
                    expected: self.entity(accessor.target)?.name().to_string(),
                    found: other.entity_name().to_string(),
                });
            }
        };

        record.put(&accessor.fk_field, value);
        Ok(())
    }
}
