//! Conversion of document values into values a SQL column can hold

use libsql::Value as SqlValue;

use crate::models::Value;
use crate::util::format_sql_timestamp;

/// Convert one document value into its relational representation.
///
/// Timestamps become `YYYY-MM-DD HH:MM:SS` text, booleans become 1/0, and
/// arrays or nested objects become JSON text with identifiers written as
/// plain strings. Scalars pass through unchanged.
pub fn coerce(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Timestamp(instant) => SqlValue::Text(format_sql_timestamp(instant)),
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_plain_json().to_string()),
        Value::Int(number) => SqlValue::Integer(*number),
        Value::Float(number) if number.is_finite() => SqlValue::Real(*number),
        Value::Float(_) => SqlValue::Null,
        Value::Text(text) | Value::ObjectId(text) => SqlValue::Text(text.clone()),
    }
}
