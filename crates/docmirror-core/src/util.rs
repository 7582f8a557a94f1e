//! Shared utility functions used across multiple modules.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Timestamp layout used for every relational timestamp column.
pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Render an instant as `YYYY-MM-DD HH:MM:SS` (UTC, second precision).
pub fn format_sql_timestamp(value: &DateTime<Utc>) -> String {
    value.format(SQL_TIMESTAMP_FORMAT).to_string()
}

/// Current instant rendered with [`format_sql_timestamp`].
pub fn sql_timestamp_now() -> String {
    format_sql_timestamp(&Utc::now())
}

/// Parse a timestamp written either by this crate or by an external
/// collaborator (SQL layout, RFC 3339, or unix seconds).
pub fn parse_sql_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, SQL_TIMESTAMP_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Truncate text to at most 180 characters for log and ledger messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" visits ".to_string())),
            Some("visits".to_string())
        );
    }

    #[test]
    fn sql_timestamp_round_trips() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let rendered = format_sql_timestamp(&instant);
        assert_eq!(rendered, "2024-03-09 07:05:01");
        assert_eq!(parse_sql_timestamp(&rendered), Some(instant));
    }

    #[test]
    fn parse_sql_timestamp_accepts_rfc3339_and_unix_seconds() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(parse_sql_timestamp("2024-03-09T07:05:01Z"), Some(instant));
        assert_eq!(
            parse_sql_timestamp(&instant.timestamp().to_string()),
            Some(instant)
        );
        assert_eq!(parse_sql_timestamp("yesterday"), None);
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
