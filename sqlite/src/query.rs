//! Single-entity query builder.
//!
//! Queries are plain values: building one touches no database. Execution
//! goes through a [`DbContext`], which opens a scoped connection for the
//! duration of the statement.
//!
//! # Example
//!
//! ```no_run
//! use entity_schema_sqlite::{DbContext, Query, col};
//! # fn demo(db: &DbContext, books: entity_schema_core::EntityId) -> entity_schema_sqlite::Result<()> {
//! let recent = Query::new(books)
//!     .filter(col("year").ge(2000))
//!     .filter(col("title").like("The %"))
//!     .order_by(col("year").desc())
//!     .limit(10)
//!     .all(db)?;
//! # Ok(())
//! # }
//! ```

use entity_schema_core::{EntityId, ResolvedEntity, Value};

use crate::context::DbContext;
use crate::convert;
use crate::error::Result;
use crate::record::Record;
use crate::schema::quote_ident;

/// Handle to a column, used only to build conditions and orderings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    name: String,
}

/// Shorthand for [`ColumnRef::new`].
pub fn col(name: impl Into<String>) -> ColumnRef {
    ColumnRef::new(name)
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, op: &str, value: impl Into<Value>) -> Condition {
        Condition {
            sql: format!("{} {op} ?", quote_ident(&self.name)),
            params: vec![value.into()],
            columns: vec![self.name.clone()],
        }
    }

    fn bare(&self, suffix: &str) -> Condition {
        Condition {
            sql: format!("{} {suffix}", quote_ident(&self.name)),
            params: Vec::new(),
            columns: vec![self.name.clone()],
        }
    }

    /// `column = value`; a `Null` value becomes `column IS NULL`.
    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        let value = value.into();
        if value.is_null() {
            return self.is_null();
        }
        self.compare("=", value)
    }

    /// `column != value`; a `Null` value becomes `column IS NOT NULL`.
    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        let value = value.into();
        if value.is_null() {
            return self.is_not_null();
        }
        self.compare("!=", value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.compare("<", value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Condition {
        self.compare("<=", value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.compare(">", value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Condition {
        self.compare(">=", value)
    }

    pub fn like(&self, pattern: impl Into<String>) -> Condition {
        self.compare("LIKE", Value::Text(pattern.into()))
    }

    /// `column IN (...)`; an empty list matches nothing.
    pub fn in_<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        let params: Vec<Value> = values.into_iter().map(Into::into).collect();
        if params.is_empty() {
            return Condition::never();
        }
        let placeholders = vec!["?"; params.len()].join(", ");
        Condition {
            sql: format!("{} IN ({placeholders})", quote_ident(&self.name)),
            params,
            columns: vec![self.name.clone()],
        }
    }

    pub fn is_null(&self) -> Condition {
        self.bare("IS NULL")
    }

    pub fn is_not_null(&self) -> Condition {
        self.bare("IS NOT NULL")
    }

    pub fn asc(&self) -> OrderBy {
        OrderBy {
            column: self.name.clone(),
            descending: false,
        }
    }

    pub fn desc(&self) -> OrderBy {
        OrderBy {
            column: self.name.clone(),
            descending: true,
        }
    }
}

/// A SQL predicate with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    sql: String,
    params: Vec<Value>,
    columns: Vec<String>,
}

impl Condition {
    /// A predicate no row satisfies (`1 = 0`).
    pub fn never() -> Self {
        Self {
            sql: "1 = 0".to_string(),
            params: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Sort key for [`Query::order_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    descending: bool,
}

/// Filters, ordering and limit over one entity's table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity: EntityId,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Adds a condition; conditions are combined with `AND`.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an equality condition on a field.
    pub fn filter_by(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(col(field).eq(value))
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns every matching record.
    pub fn all(&self, db: &DbContext) -> Result<Vec<Record>> {
        let entity = db.entity(self.entity)?;
        let (clauses, params) = self.clauses(entity, true)?;
        db.with_connection(|conn| convert::select_records(conn, entity, &clauses, &params))
    }

    /// Returns the first matching record.
    pub fn first(&self, db: &DbContext) -> Result<Option<Record>> {
        let query = Query {
            limit: Some(1),
            ..self.clone()
        };
        Ok(query.all(db)?.into_iter().next())
    }

    /// Counts matching rows; ordering and limit are ignored.
    pub fn count(&self, db: &DbContext) -> Result<usize> {
        let entity = db.entity(self.entity)?;
        let (clauses, params) = self.clauses(entity, false)?;
        db.with_connection(|conn| convert::count_records(conn, entity, &clauses, &params))
    }

    /// Renders the clauses that follow `FROM <table>`.
    ///
    /// Every referenced column must be a field of the entity.
    fn clauses(&self, entity: &ResolvedEntity, with_order: bool) -> Result<(String, Vec<Value>)> {
        let mut sql = String::new();
        let mut params = Vec::new();

        for condition in &self.conditions {
            for column in &condition.columns {
                entity.require_field(column)?;
            }
        }
        if !self.conditions.is_empty() {
            let predicates: Vec<&str> = self.conditions.iter().map(|c| c.sql.as_str()).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
            params.extend(self.conditions.iter().flat_map(|c| c.params.iter().cloned()));
        }

        if with_order {
            if !self.order.is_empty() {
                let mut keys = Vec::with_capacity(self.order.len());
                for order in &self.order {
                    entity.require_field(&order.column)?;
                    let direction = if order.descending { "DESC" } else { "ASC" };
                    keys.push(format!("{} {direction}", quote_ident(&order.column)));
                }
                sql.push_str(" ORDER BY ");
                sql.push_str(&keys.join(", "));
            }
            if let Some(limit) = self.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        Ok((sql, params))
    }
}
