//! Export of table contents.
//!
//! Pure functions: (columns, rows) → plain data. No I/O.

use serde_json::{Map, Number};

use crate::rows::{ColumnRegistry, Row, RowStore};
use crate::types::Value;

/// Rows in the store that belong in an export: all of them, except a
/// trailing live row nobody wrote to.
fn exported_rows(rows: &RowStore) -> &[Row] {
    let all = rows.rows();
    match all.split_last() {
        Some((last, finished)) if last.is_empty() => finished,
        _ => all,
    }
}

/// Every exported row as values in column order; missing cells are `None`.
pub fn to_list(columns: &ColumnRegistry, rows: &RowStore) -> Vec<Vec<Option<Value>>> {
    exported_rows(rows)
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.values.get(&column.name).cloned())
                .collect()
        })
        .collect()
}

/// An array of objects keyed by column name, keys in column order.
pub fn to_json(columns: &ColumnRegistry, rows: &RowStore) -> serde_json::Value {
    let objects = exported_rows(rows)
        .iter()
        .map(|row| {
            let object: Map<String, serde_json::Value> = columns
                .iter()
                .map(|column| {
                    let value = row
                        .values
                        .get(&column.name)
                        .map_or(serde_json::Value::Null, value_to_json);
                    (column.name.clone(), value)
                })
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(objects)
}

/// Non-finite floats have no JSON form and become `null`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
    }
}

/// Cell value for a JSON scalar. `null` is an empty cell; arrays and
/// objects are shown as their JSON text.
pub fn value_from_json(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Text(b.to_string())),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        other => Some(Value::Text(other.to_string())),
    }
}

// ============================================================================
// TESTS
// ============================================================================
