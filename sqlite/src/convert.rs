//! Conversion between [`Value`]s and SQLite rows.
//!
//! Booleans are stored as `0`/`1`, timestamps as ISO-8601 text and decimals
//! as `REAL`. Reading a column back needs the field's [`FieldType`], since
//! SQLite storage classes alone cannot tell a boolean from an integer.
//!
//! This module also holds the row-level statements used by
//! [`DbContext`](crate::DbContext): insert, update, delete and select of a
//! single entity's records.

use chrono::NaiveDateTime;
use entity_schema_core::{FieldType, ResolvedEntity, ResolvedField, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use crate::error::{OrmError, Result};
use crate::record::Record;
use crate::schema::quote_ident;

/// Storage format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const TIMESTAMP_FALLBACK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Converts a [`Value`] to the SQLite value bound as a parameter.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) | Value::Decimal(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
        Value::Timestamp(v) => SqlValue::Text(v.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Reads a stored SQLite value back as a [`Value`] of the given type.
pub(crate) fn from_sql(field_type: FieldType, value: SqlValue) -> Result<Value> {
    let converted = match (field_type, value) {
        (_, SqlValue::Null) => Value::Null,
        (FieldType::Integer, SqlValue::Integer(v)) => Value::Integer(v),
        (FieldType::Boolean, SqlValue::Integer(v)) => Value::Boolean(v != 0),
        (FieldType::Real, SqlValue::Integer(v)) => Value::Real(v as f64),
        (FieldType::Real, SqlValue::Real(v)) => Value::Real(v),
        (FieldType::Decimal, SqlValue::Integer(v)) => Value::Decimal(v as f64),
        (FieldType::Decimal, SqlValue::Real(v)) => Value::Decimal(v),
        (FieldType::Text, SqlValue::Text(v)) => Value::Text(v),
        (FieldType::Text, SqlValue::Integer(v)) => Value::Text(v.to_string()),
        (FieldType::Text, SqlValue::Real(v)) => Value::Text(v.to_string()),
        (FieldType::Timestamp, SqlValue::Text(v)) => Value::Timestamp(parse_timestamp(&v)?),
        (ty, other) => {
            return Err(OrmError::ConversionError(format!(
                "cannot read {:?} as {ty}",
                other.data_type()
            )));
        }
    };
    Ok(converted)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FALLBACK_FORMAT))
        .map_err(|e| OrmError::ConversionError(format!("invalid timestamp '{raw}': {e}")))
}

/// Encodes a default value for the metadata store.
///
/// Values are stored as JSON; values JSON cannot represent (non-finite
/// floats) fall back to their plain string form. Returns `None` for `Null`.
///
/// # Examples
///
/// ```
/// use entity_schema_core::Value;
/// use entity_schema_sqlite::encode_default;
///
/// assert_eq!(encode_default(&Value::Boolean(true)).as_deref(), Some("true"));
/// assert_eq!(encode_default(&Value::from("draft")).as_deref(), Some("\"draft\""));
/// assert_eq!(encode_default(&Value::Null), None);
/// ```
pub fn encode_default(value: &Value) -> Option<String> {
    let json = match value {
        Value::Null => return None,
        Value::Integer(v) => serde_json::Value::from(*v),
        Value::Boolean(v) => serde_json::Value::from(*v),
        Value::Text(v) => serde_json::Value::from(v.as_str()),
        Value::Timestamp(v) => serde_json::Value::from(v.format(TIMESTAMP_FORMAT).to_string()),
        Value::Real(v) | Value::Decimal(v) => match serde_json::Number::from_f64(*v) {
            Some(n) => serde_json::Value::Number(n),
            None => return Some(v.to_string()),
        },
    };
    Some(json.to_string())
}

/// Decodes a stored default back into a [`Value`] of the given type.
///
/// Anything that does not decode as JSON of the expected shape is kept as
/// text, mirroring the string fallback of [`encode_default`].
pub fn decode_default(field_type: FieldType, raw: &str) -> Value {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Value::Text(raw.to_string());
    };

    let decoded = match field_type {
        FieldType::Boolean => json
            .as_bool()
            .or_else(|| json.as_i64().map(|v| v != 0))
            .map(Value::Boolean),
        FieldType::Integer => json.as_i64().map(Value::Integer),
        FieldType::Real => json.as_f64().map(Value::Real),
        FieldType::Decimal => json.as_f64().map(Value::Decimal),
        FieldType::Text => json.as_str().map(|s| Value::Text(s.to_string())),
        FieldType::Timestamp => json
            .as_str()
            .and_then(|s| parse_timestamp(s).ok())
            .map(Value::Timestamp),
    };

    decoded.unwrap_or_else(|| Value::Text(raw.to_string()))
}

/// Current local time in the metadata timestamp format.
pub(crate) fn now_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn column_list<'a>(fields: impl IntoIterator<Item = &'a ResolvedField>) -> String {
    fields
        .into_iter()
        .map(|f| quote_ident(&f.name).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

fn require_primary_key<'a>(
    entity: &'a ResolvedEntity,
    record: &Record,
) -> Result<(&'a ResolvedField, SqlValue)> {
    let pk = entity
        .primary_key()
        .ok_or_else(|| OrmError::MissingPrimaryKey(entity.name().to_string()))?;
    let value = record.value(&pk.name);
    if value.is_null() {
        return Err(OrmError::MissingPrimaryKey(entity.name().to_string()));
    }
    Ok((pk, to_sql(value)))
}

/// Checks that a record can be updated or deleted, before any I/O.
pub(crate) fn check_primary_key(entity: &ResolvedEntity, record: &Record) -> Result<()> {
    require_primary_key(entity, record).map(|_| ())
}

/// Inserts a record, filling in a generated primary key.
///
/// An integer key without a value is left to SQLite and read back from the
/// row id; a text key without a value gets a fresh UUID v4.
pub(crate) fn insert_record(
    conn: &Connection,
    entity: &ResolvedEntity,
    record: &mut Record,
) -> Result<()> {
    let pk = entity.primary_key();
    let generated = pk
        .filter(|pk| pk.field_type == FieldType::Text && record.value(&pk.name).is_null())
        .map(|pk| (pk.name.as_str(), Value::Text(Uuid::new_v4().to_string())));

    // The record only takes a generated key once the row is stored.
    let value_of = |field: &ResolvedField| -> Value {
        match &generated {
            Some((name, key)) if *name == field.name => key.clone(),
            _ => record.value(&field.name).clone(),
        }
    };

    let columns: Vec<&ResolvedField> = entity
        .fields()
        .filter(|f| !(f.is_primary_key && value_of(f).is_null()))
        .collect();

    let table = quote_ident(entity.table_name());
    let sql = if columns.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            column_list(columns.iter().copied())
        )
    };
    debug!(sql = %sql, "insert");

    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.execute(params_from_iter(columns.iter().map(|f| to_sql(&value_of(f)))))?;

    if let Some((name, key)) = generated {
        record.put(name, key);
    } else if let Some(pk) = pk {
        if record.value(&pk.name).is_null() {
            record.put(&pk.name, Value::Integer(conn.last_insert_rowid()));
        }
    }
    Ok(())
}

/// Updates every non-key column of a record, matched by primary key.
///
/// Returns the number of rows changed.
pub(crate) fn update_record(
    conn: &Connection,
    entity: &ResolvedEntity,
    record: &Record,
) -> Result<usize> {
    let (pk, key) = require_primary_key(entity, record)?;
    let columns: Vec<&ResolvedField> = entity.fields().filter(|f| !f.is_primary_key).collect();
    if columns.is_empty() {
        return Ok(0);
    }

    let assignments = columns
        .iter()
        .map(|f| format!("{} = ?", quote_ident(&f.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE {} = ?",
        quote_ident(entity.table_name()),
        quote_ident(&pk.name)
    );
    debug!(sql = %sql, "update");

    let params = columns
        .iter()
        .map(|f| to_sql(record.value(&f.name)))
        .chain(std::iter::once(key));
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.execute(params_from_iter(params))?)
}

/// Deletes a record by primary key and clears the key on success.
pub(crate) fn delete_record(
    conn: &Connection,
    entity: &ResolvedEntity,
    record: &mut Record,
) -> Result<usize> {
    let (pk, key) = require_primary_key(entity, record)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_ident(entity.table_name()),
        quote_ident(&pk.name)
    );
    debug!(sql = %sql, "delete");

    let deleted = conn.execute(&sql, [key])?;
    record.put(&pk.name, Value::Null);
    Ok(deleted)
}

/// Runs a select over all columns of an entity and builds records.
pub(crate) fn select_records(
    conn: &Connection,
    entity: &ResolvedEntity,
    clauses: &str,
    params: &[Value],
) -> Result<Vec<Record>> {
    let fields: Vec<&ResolvedField> = entity.fields().collect();
    let sql = format!(
        "SELECT {} FROM {}{clauses}",
        column_list(fields.iter().copied()),
        quote_ident(entity.table_name())
    );
    debug!(sql = %sql, "select");

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<Vec<SqlValue>> = stmt
        .query_map(params_from_iter(params.iter().map(to_sql)), |row| {
            (0..fields.len())
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let mut record = Record::new(entity);
            for (field, raw) in fields.iter().zip(row) {
                record.put(&field.name, from_sql(field.field_type, raw)?);
            }
            Ok(record)
        })
        .collect()
}

/// Counts rows of an entity matching the given clauses.
pub(crate) fn count_records(
    conn: &Connection,
    entity: &ResolvedEntity,
    clauses: &str,
    params: &[Value],
) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM {}{clauses}",
        quote_ident(entity.table_name())
    );
    debug!(sql = %sql, "count");

    let count: i64 = conn.query_row(&sql, params_from_iter(params.iter().map(to_sql)), |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_boolean_stored_as_integer() {
        assert_eq!(to_sql(&Value::Boolean(true)), SqlValue::Integer(1));
        assert_eq!(
            from_sql(FieldType::Boolean, SqlValue::Integer(0)).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 5, 250)
            .unwrap();
        let stored = to_sql(&Value::Timestamp(ts));
        assert_eq!(stored, SqlValue::Text("2024-03-01T12:30:05.250".into()));
        assert_eq!(
            from_sql(FieldType::Timestamp, stored).unwrap(),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn test_timestamp_accepts_sqlite_format() {
        let value = from_sql(
            FieldType::Timestamp,
            SqlValue::Text("2024-03-01 12:30:05".into()),
        )
        .unwrap();
        assert!(matches!(value, Value::Timestamp(_)));
    }

    #[test]
    fn test_null_reads_as_null_for_every_type() {
        for ty in FieldType::ALL {
            assert_eq!(from_sql(ty, SqlValue::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_mismatched_storage_is_conversion_error() {
        let err = from_sql(FieldType::Integer, SqlValue::Text("abc".into())).unwrap_err();
        assert!(matches!(err, OrmError::ConversionError(_)));
    }

    #[test]
    fn test_default_encoding() {
        assert_eq!(encode_default(&Value::Integer(5)).as_deref(), Some("5"));
        assert_eq!(encode_default(&Value::Real(1.5)).as_deref(), Some("1.5"));
        assert_eq!(encode_default(&Value::Real(f64::NAN)).as_deref(), Some("NaN"));
    }

    #[test]
    fn test_default_decoding() {
        assert_eq!(decode_default(FieldType::Boolean, "false"), Value::Boolean(false));
        assert_eq!(decode_default(FieldType::Integer, "42"), Value::Integer(42));
        assert_eq!(decode_default(FieldType::Decimal, "2.5"), Value::Decimal(2.5));
        assert_eq!(
            decode_default(FieldType::Text, "\"draft\""),
            Value::Text("draft".into())
        );
        // Plain strings from the fallback encoding stay text.
        assert_eq!(
            decode_default(FieldType::Real, "NaN"),
            Value::Text("NaN".into())
        );
    }
}
