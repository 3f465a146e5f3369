//! Conversion of loosely typed values into the semantic type of a target
//! column.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::schema::{ColumnKind, TableColumns, TargetColumnInfo};
use crate::value::{Row, Value};

const EMPTY_OBJECT: &str = "{}";

/// Convert `value` to the type of `column`. Null stays null.
pub fn coerce(value: &Value, column: &TargetColumnInfo) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match column.kind {
        ColumnKind::Bool => Value::Bool(coerce_bool(value)),
        ColumnKind::BigInt => coerce_int(value).map_or(Value::Int(0), Value::Int),
        ColumnKind::Int => coerce_int(value).map_or(Value::Null, Value::Int),
        ColumnKind::Float => coerce_float(value).map_or(Value::Null, Value::Float),
        ColumnKind::DateTime => coerce_timestamp(value).map_or(Value::Null, Value::Timestamp),
        ColumnKind::Json => Value::Text(coerce_json(value)),
        ColumnKind::Enum => coerce_enum(value, &column.enum_values),
        ColumnKind::Text => value.render().map_or(Value::Null, Value::Text),
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Int(number) => *number != 0,
        Value::Float(number) => *number != 0.0,
        other => other
            .render()
            .map(|text| matches!(text.to_lowercase().as_str(), "true" | "1" | "t" | "yes"))
            .unwrap_or(false),
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(number) => Some(*number),
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Float(number) if number.is_finite() => Some(number.trunc() as i64),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(number) => Some(*number),
        Value::Int(number) => Some(*number as f64),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS[.ffffff]`, then ISO 8601 (with `Z` or an
/// offset, or naive with a `T` separator).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let fixed = if text.contains('.') {
        "%Y-%m-%d %H:%M:%S%.f"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, fixed) {
        return Some(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn coerce_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(date) => date.and_hms_opt(0, 0, 0),
        Value::Text(text) => parse_timestamp(text),
        _ => None,
    }
}

fn coerce_json(value: &Value) -> String {
    match value {
        Value::Json(json) => json.to_string(),
        Value::Text(text) => validated_json_text(text),
        Value::Bytes(bytes) => validated_json_text(&String::from_utf8_lossy(bytes)),
        Value::Bool(flag) => flag.to_string(),
        Value::Int(number) => number.to_string(),
        Value::Float(number) => serde_json::Number::from_f64(*number)
            .map_or_else(|| EMPTY_OBJECT.to_string(), |number| number.to_string()),
        Value::Date(_) | Value::Timestamp(_) => value
            .render()
            .map_or_else(|| EMPTY_OBJECT.to_string(), |text| serde_json::Value::String(text).to_string()),
        Value::Null => EMPTY_OBJECT.to_string(),
    }
}

fn validated_json_text(text: &str) -> String {
    if text.trim().is_empty() {
        return EMPTY_OBJECT.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => text.to_string(),
        Err(_) => EMPTY_OBJECT.to_string(),
    }
}

fn coerce_enum(value: &Value, domain: &[String]) -> Value {
    let literal = value.render().unwrap_or_default().trim().to_string();
    match domain.first() {
        Some(first) if !domain.contains(&literal) => Value::Text(first.clone()),
        _ => Value::Text(literal),
    }
}

fn now() -> Value {
    Value::Timestamp(Utc::now().naive_utc())
}

/// Type-appropriate placeholder for a NOT NULL column without a default.
pub fn zero_value(column: &TargetColumnInfo) -> Value {
    match column.kind {
        ColumnKind::Bool => Value::Bool(false),
        ColumnKind::BigInt | ColumnKind::Int => Value::Int(0),
        ColumnKind::Float => Value::Float(0.0),
        ColumnKind::DateTime => now(),
        ColumnKind::Json => Value::text(EMPTY_OBJECT),
        ColumnKind::Enum => Value::Text(column.enum_values.first().cloned().unwrap_or_default()),
        ColumnKind::Text => Value::text(""),
    }
}

/// Value for a NOT NULL column whose converted value is null: the declared
/// default when there is one, else [`zero_value`].
pub fn default_value(column: &TargetColumnInfo) -> Value {
    let Some(declared) = column.default.as_deref() else {
        return zero_value(column);
    };
    let declared = declared.trim();
    let unquoted = declared
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(declared);
    if unquoted.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP") {
        return now();
    }
    match coerce(&Value::text(unquoted), column) {
        Value::Null => zero_value(column),
        value => value,
    }
}

/// Full per-column conversion: coerce, fill NOT NULL, truncate long text.
pub fn coerce_for_column(table: &str, value: &Value, column: &TargetColumnInfo) -> Value {
    let mut coerced = coerce(value, column);
    if coerced.is_null() && !column.nullable {
        coerced = default_value(column);
    }
    if let (Some(max_length), Value::Text(text)) = (column.max_length, &coerced) {
        let length = text.chars().count();
        if length > max_length {
            warn!(
                table = %table,
                column = %column.name,
                from = length,
                to = max_length,
                "truncating value"
            );
            coerced = Value::Text(text.chars().take(max_length).collect());
        }
    }
    coerced
}

/// Coerce every column of `row` that exists in the target table. Columns the
/// target does not have are dropped.
pub fn coerce_row(table: &str, row: Row, columns: &TableColumns) -> Row {
    row.into_iter()
        .filter_map(|(name, value)| {
            let column = columns.get(&name)?;
            let coerced = coerce_for_column(table, &value, column);
            Some((name, coerced))
        })
        .collect()
}
