//! Conversion between MySQL wire values and the dynamic [`Value`] model.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::query_builder::Separated;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use pasarport_core::{Error, Result, Row, Value};

/// Decode every column of `row`.
pub fn decode_row(row: &MySqlRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

/// Decode one cell using the driver-reported type name.
pub fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return Ok(Value::Null);
    }

    let type_name = type_name.to_ascii_uppercase();
    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),
        name if name.ends_with("UNSIGNED") && !name.starts_with("DECIMAL") => row
            .try_get::<u64, _>(index)
            .map(|number| i64::try_from(number).map_or(Value::Float(number as f64), Value::Int)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(Value::Int)
        }
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .map(|number| Value::Float(f64::from(number))),
        "DOUBLE" => row.try_get::<f64, _>(index).map(Value::Float),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(Value::Date),
        "DATETIME" | "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index).map(Value::Timestamp),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|time| Value::Text(time.to_string())),
        "JSON" => row
            .try_get_unchecked::<String, _>(index)
            .map(|text| match serde_json::from_str(&text) {
                Ok(json) => Value::Json(json),
                Err(_) => Value::Text(text),
            }),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get::<Vec<u8>, _>(index).map(Value::Bytes)
        }
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::Text)
            .or_else(|_| row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes)),
    };

    decoded.map_err(|err| Error::Statement(format!("decoding column {index} ({type_name}): {err}")))
}

/// Bind `value` as the next placeholder of a multi-row insert tuple.
pub fn push_bind_value<'qb, 'args: 'qb>(
    tuple: &mut Separated<'qb, 'args, MySql, &'static str>,
    value: Option<&Value>,
) {
    match value.cloned().unwrap_or(Value::Null) {
        Value::Null => tuple.push_bind(None::<String>),
        Value::Bool(flag) => tuple.push_bind(flag),
        Value::Int(number) => tuple.push_bind(number),
        Value::Float(number) => tuple.push_bind(number),
        Value::Text(text) => tuple.push_bind(text),
        Value::Bytes(bytes) => tuple.push_bind(bytes),
        Value::Date(date) => tuple.push_bind(date),
        Value::Timestamp(timestamp) => tuple.push_bind(timestamp),
        Value::Json(json) => tuple.push_bind(json.to_string()),
    };
}
