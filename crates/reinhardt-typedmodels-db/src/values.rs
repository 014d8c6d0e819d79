//! Conversion between field values and SQL values
//!
//! Field values travel as `serde_json::Value`; the field's [`FieldType`]
//! decides which SQL type they become. Decoding goes through `sqlx::any`,
//! whose integer and boolean kinds differ per driver (SQLite reports every
//! integer as 64-bit and stores booleans as integers), so each decoder tries
//! the narrowest matching kinds in turn.

use crate::error::{DatabaseError, Result};
use indexmap::IndexMap;
use reinhardt_typedmodels_core::{FieldDef, FieldType};
use sea_query::Value as SqlValue;
use serde_json::Value;
use sqlx::Row;
use sqlx::any::AnyRow;

/// Convert a field value into a SQL literal for `field`
pub(crate) fn to_sql_value(field: &FieldDef, value: &Value) -> Result<SqlValue> {
	let invalid = || DatabaseError::Decode {
		column: field.column(),
		reason: format!("cannot store {value} as {:?}", field.field_type),
	};

	let sql = match field.field_type {
		FieldType::Char { .. } | FieldType::Text => match value {
			Value::Null => SqlValue::String(None),
			Value::String(s) => SqlValue::String(Some(s.clone())),
			_ => return Err(invalid()),
		},
		FieldType::AutoField
		| FieldType::Integer
		| FieldType::BigInteger
		| FieldType::ForeignKey
		| FieldType::OneToOne => match value {
			Value::Null => SqlValue::BigInt(None),
			other => SqlValue::BigInt(Some(other.as_i64().ok_or_else(invalid)?)),
		},
		FieldType::Boolean => match value {
			Value::Null => SqlValue::Bool(None),
			Value::Bool(b) => SqlValue::Bool(Some(*b)),
			_ => return Err(invalid()),
		},
		FieldType::Float => match value {
			Value::Null => SqlValue::Double(None),
			other => SqlValue::Double(Some(other.as_f64().ok_or_else(invalid)?)),
		},
	};
	Ok(sql)
}

/// Decode one column of `row` according to `field`
pub(crate) fn decode_column(row: &AnyRow, field: &FieldDef) -> Result<Value> {
	let column = field.column();
	let value = match field.field_type {
		FieldType::Char { .. } | FieldType::Text => row
			.try_get::<Option<String>, _>(column.as_str())
			.map(|v| v.map_or(Value::Null, Value::String))
			.map_err(|e| decode_error(&column, e))?,
		FieldType::AutoField
		| FieldType::Integer
		| FieldType::BigInteger
		| FieldType::ForeignKey
		| FieldType::OneToOne => decode_integer(row, &column)?.map_or(Value::Null, Value::from),
		FieldType::Boolean => decode_bool(row, &column)?.map_or(Value::Null, Value::Bool),
		FieldType::Float => decode_float(row, &column)?.map_or(Value::Null, Value::from),
	};
	Ok(value)
}

/// Decode every field of `fields` from `row`, keyed by field name
pub(crate) fn decode_row(row: &AnyRow, fields: &[&FieldDef]) -> Result<IndexMap<String, Value>> {
	fields
		.iter()
		.map(|field| Ok((field.name.clone(), decode_column(row, field)?)))
		.collect()
}

/// Decode an integer column whatever width the driver reports
pub(crate) fn decode_integer(row: &AnyRow, column: &str) -> Result<Option<i64>> {
	if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
		return Ok(v);
	}
	if let Ok(v) = row.try_get::<Option<i32>, _>(column) {
		return Ok(v.map(i64::from));
	}
	row.try_get::<Option<i16>, _>(column)
		.map(|v| v.map(i64::from))
		.map_err(|e| decode_error(column, e))
}

fn decode_bool(row: &AnyRow, column: &str) -> Result<Option<bool>> {
	if let Ok(v) = row.try_get::<Option<bool>, _>(column) {
		return Ok(v);
	}
	Ok(decode_integer(row, column)?.map(|v| v != 0))
}

fn decode_float(row: &AnyRow, column: &str) -> Result<Option<f64>> {
	if let Ok(v) = row.try_get::<Option<f64>, _>(column) {
		return Ok(v);
	}
	if let Ok(v) = row.try_get::<Option<f32>, _>(column) {
		return Ok(v.map(f64::from));
	}
	Ok(decode_integer(row, column)?.map(|v| v as f64))
}

fn decode_error(column: &str, err: sqlx::Error) -> DatabaseError {
	DatabaseError::Decode {
		column: column.to_string(),
		reason: err.to_string(),
	}
}
