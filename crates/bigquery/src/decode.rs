//! Schema-driven decoding of result pages into typed rows.
//!
//! # Type Mapping
//!
//! BigQuery sends every scalar cell as a JSON string. Cells are mapped to
//! [`FieldValue`] by the column type:
//! - `INTEGER`, `INT64` → `Integer`
//! - `FLOAT`, `FLOAT64` → `Float`
//! - `NUMERIC`, `BIGNUMERIC` → `Text`, kept exact (they exceed `f64` precision)
//! - `BOOLEAN`, `BOOL` → `Boolean`
//! - `TIMESTAMP` (epoch seconds, e.g. `"1.494114399E9"`) → `Timestamp`
//! - anything else → `Text`
//!
//! A value that does not parse as its declared type falls back to `Text`.
//! REPEATED columns become `Array`, RECORD columns become `Record`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use bqjobs_core::FieldValue;

use crate::api::TableRow;
use crate::result::{FieldMode, ResultPage, ResultSchema, SchemaField};

/// Why a single row could not be decoded. Scoped to that row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("row has {found} cells but the schema has {expected} fields")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("malformed cell for field '{field}': {detail}")]
    MalformedCell { field: String, detail: String },
}

/// A decoded row: `(column name, value)` pairs in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    pub fields: Vec<(String, FieldValue)>,
}

impl DecodedRow {
    /// Value of the named column, if present.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The row as a JSON object keyed by column name.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// `name:value` pairs separated by a single space.
impl fmt::Display for DecodedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}:{value}")?;
        }
        Ok(())
    }
}

/// Lazily decode every row of `page` against `schema`, in page order.
///
/// Each item is independent: a bad row yields an `Err` and the following
/// rows still decode.
pub fn decode_page<'p>(
    schema: &'p ResultSchema,
    page: &'p ResultPage,
) -> impl Iterator<Item = Result<DecodedRow, DecodeError>> + 'p {
    page.rows.iter().map(move |row| decode_row(schema, row))
}

/// Decode one row, pairing each cell with the schema field at the same index.
pub fn decode_row(schema: &ResultSchema, row: &TableRow) -> Result<DecodedRow, DecodeError> {
    if row.f.len() != schema.len() {
        return Err(DecodeError::FieldCountMismatch {
            expected: schema.len(),
            found: row.f.len(),
        });
    }

    let fields = schema
        .fields
        .iter()
        .zip(&row.f)
        .map(|(field, cell)| Ok((field.name.clone(), decode_cell(field, &cell.v)?)))
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(DecodedRow { fields })
}

fn decode_cell(field: &SchemaField, v: &Value) -> Result<FieldValue, DecodeError> {
    if field.mode == FieldMode::Repeated {
        return match v {
            Value::Null => Ok(FieldValue::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| decode_single(field, unwrap_v(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Array),
            other => Err(malformed(field, format!("expected array, got {}", kind(other)))),
        };
    }
    decode_single(field, v)
}

fn decode_single(field: &SchemaField, v: &Value) -> Result<FieldValue, DecodeError> {
    match v {
        Value::Null => Ok(FieldValue::Null),
        _ if field.is_record() => decode_record(field, v),
        Value::String(s) => Ok(parse_field_value(s, &field.field_type)),
        Value::Number(n) => Ok(parse_field_value(&n.to_string(), &field.field_type)),
        Value::Bool(b) => Ok(parse_field_value(&b.to_string(), &field.field_type)),
        other => Err(malformed(field, format!("expected scalar, got {}", kind(other)))),
    }
}

fn decode_record(field: &SchemaField, v: &Value) -> Result<FieldValue, DecodeError> {
    let cells = v
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(field, format!("expected record, got {}", kind(v))))?;

    if cells.len() != field.fields.len() {
        return Err(malformed(
            field,
            format!(
                "record has {} cells but {} sub-fields",
                cells.len(),
                field.fields.len()
            ),
        ));
    }

    field
        .fields
        .iter()
        .zip(cells)
        .map(|(sub, cell)| Ok((sub.name.clone(), decode_cell(sub, unwrap_v(cell))?)))
        .collect::<Result<Vec<_>, _>>()
        .map(FieldValue::Record)
}

/// Array elements and record cells are wrapped as `{"v": ...}`.
fn unwrap_v(cell: &Value) -> &Value {
    cell.get("v").unwrap_or(cell)
}

/// Parse a string value into a `FieldValue` based on the BigQuery type.
///
/// Numeric, boolean and timestamp types fall back to `Text` if parsing fails.
pub(crate) fn parse_field_value(value: &str, field_type: &str) -> FieldValue {
    let normalized_type = field_type.to_ascii_uppercase();

    match normalized_type.as_str() {
        "INTEGER" | "INT64" => value
            .parse::<i64>()
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::Text(value.to_string())),
        "FLOAT" | "FLOAT64" => value
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(value.to_string())),
        "BOOLEAN" | "BOOL" => match value.to_ascii_lowercase().as_str() {
            "true" => FieldValue::Boolean(true),
            "false" => FieldValue::Boolean(false),
            _ => FieldValue::Text(value.to_string()),
        },
        "TIMESTAMP" => parse_timestamp(value)
            .map(FieldValue::Timestamp)
            .unwrap_or_else(|| FieldValue::Text(value.to_string())),
        _ => FieldValue::Text(value.to_string()),
    }
}

/// Parse a TIMESTAMP cell.
///
/// Tries, in order:
/// 1. Epoch seconds as a float: `"1.494114399E9"`, `"1494114399.5"`
/// 2. RFC3339: `"2017-05-06T23:46:39Z"`
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = value.parse::<f64>() {
        if !secs.is_finite() {
            return None;
        }
        let micros = (secs * 1_000_000.0).round();
        if micros.abs() >= i64::MAX as f64 {
            return None;
        }
        return DateTime::from_timestamp_micros(micros as i64);
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn malformed(field: &SchemaField, detail: String) -> DecodeError {
    DecodeError::MalformedCell {
        field: field.name.clone(),
        detail,
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
