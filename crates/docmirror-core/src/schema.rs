//! Relational schema inference for mirror tables
//!
//! A collection has no declared shape, so each sync derives one from a
//! bounded sample of its documents. Types come from the first non-null value
//! seen for a column; later documents that disagree are coerced as-is.

use serde::Serialize;

use crate::flatten::flatten;
use crate::models::{Document, Value};
use crate::util::quote_ident;

/// Surrogate numeric primary key
pub const SURROGATE_KEY_COLUMN: &str = "id";
/// String copy of the source document's `_id`
pub const UNIQUE_ID_COLUMN: &str = "mongo_id";
/// Set by the database when a row is written
pub const SYNCED_AT_COLUMN: &str = "synced_at";
/// Soft-delete flag, owned by the external deletion tracker
pub const IS_DELETED_COLUMN: &str = "is_deleted";
/// Soft-delete instant, owned by the external deletion tracker
pub const DELETED_AT_COLUMN: &str = "deleted_at";
/// Creation instant, always present in a mirror table
pub const CREATED_AT_COLUMN: &str = "createdAt";
/// Last-update instant, always present in a mirror table
pub const UPDATED_AT_COLUMN: &str = "updatedAt";

/// Columns a document field can never map onto
pub const RESERVED_COLUMNS: [&str; 5] = [
    SURROGATE_KEY_COLUMN,
    UNIQUE_ID_COLUMN,
    SYNCED_AT_COLUMN,
    IS_DELETED_COLUMN,
    DELETED_AT_COLUMN,
];

/// Whether a column name collides with a reserved mirror column.
///
/// SQLite identifiers are case-insensitive, so `ID` collides with `id`.
pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Longest string (UTF-16 code units) stored as short text
pub const SHORT_TEXT_MAX: usize = 255;
/// Longest string (UTF-16 code units) stored as long text
pub const LONG_TEXT_MAX: usize = 65_535;

/// Relational type tag of a mirror column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    IdentityKey,
    UniqueId,
    Integer,
    Decimal,
    ShortText,
    LongText,
    VeryLongText,
    Boolean,
    Timestamp,
    Structured,
}

impl ColumnType {
    /// Declared SQL type used in `CREATE TABLE`
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::IdentityKey => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::UniqueId => "VARCHAR(255) NOT NULL UNIQUE",
            Self::Integer => "BIGINT",
            Self::Decimal => "DOUBLE",
            Self::ShortText => "VARCHAR(255)",
            Self::LongText => "TEXT",
            Self::VeryLongText => "LONGTEXT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "DATETIME",
            Self::Structured => "JSON",
        }
    }

    /// Type implied by a single observed value; `None` for null.
    pub fn for_value(value: &Value) -> Option<Self> {
        let column_type = match value {
            Value::Null => return None,
            Value::Int(_) => Self::Integer,
            Value::Float(number) if number.fract() == 0.0 && number.is_finite() => Self::Integer,
            Value::Float(_) => Self::Decimal,
            Value::Bool(_) => Self::Boolean,
            Value::Timestamp(_) => Self::Timestamp,
            Value::Text(text) | Value::ObjectId(text) => Self::for_text(text),
            Value::Array(_) | Value::Object(_) => Self::Structured,
        };
        Some(column_type)
    }

    fn for_text(text: &str) -> Self {
        let units = text.encode_utf16().count();
        if units <= SHORT_TEXT_MAX {
            Self::ShortText
        } else if units <= LONG_TEXT_MAX {
            Self::LongText
        } else {
            Self::VeryLongText
        }
    }
}

/// Inferred column layout of one collection's mirror table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSchema {
    collection: String,
    columns: Vec<(String, ColumnType)>,
}

impl CollectionSchema {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn columns(&self) -> &[(String, ColumnType)] {
        &self.columns
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, column_type)| *column_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    /// Columns the sync job writes (everything but database-filled ones)
    pub fn insertable_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|(name, column_type)| {
                *column_type != ColumnType::IdentityKey && name != SYNCED_AT_COLUMN
            })
            .map(|(name, _)| name.as_str())
    }

    /// `CREATE TABLE` plus index statements for the mirror table.
    ///
    /// The soft-delete columns are always appended; sync never writes them.
    pub fn create_table_sql(&self, table: &str) -> Vec<String> {
        let mut definitions = self
            .columns
            .iter()
            .map(|(name, column_type)| {
                let mut definition = format!("{} {}", quote_ident(name), column_type.sql_type());
                if name == SYNCED_AT_COLUMN {
                    definition.push_str(" DEFAULT CURRENT_TIMESTAMP");
                }
                definition
            })
            .collect::<Vec<_>>();
        definitions.push(format!(
            "{} BOOLEAN NOT NULL DEFAULT 0",
            quote_ident(IS_DELETED_COLUMN)
        ));
        definitions.push(format!("{} DATETIME NULL", quote_ident(DELETED_AT_COLUMN)));

        vec![
            format!(
                "CREATE TABLE {} (\n    {}\n)",
                quote_ident(table),
                definitions.join(",\n    ")
            ),
            format!(
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&format!("idx_{table}_{IS_DELETED_COLUMN}")),
                quote_ident(table),
                quote_ident(IS_DELETED_COLUMN)
            ),
        ]
    }
}

/// Derive a mirror schema from a sample of a collection's documents.
///
/// Columns are ordered: surrogate key, unique id, sampled keys in first-seen
/// order, the creation/update timestamps if the sample lacked them, then
/// `synced_at`. Keys differing only in ASCII case share one column, named
/// after the first spelling seen.
pub fn infer_schema(collection: &str, sample: &[Document]) -> CollectionSchema {
    let mut observed: Vec<(String, Option<ColumnType>)> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    let mut merged: Vec<String> = Vec::new();

    for document in sample {
        let row = flatten(document);
        for (names, seen) in [(row.dropped(), &mut dropped), (row.merged(), &mut merged)] {
            for name in names {
                if !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }

        for (name, value) in row.iter() {
            if name == UNIQUE_ID_COLUMN {
                continue;
            }
            match observed
                .iter_mut()
                .find(|(column, _)| column.eq_ignore_ascii_case(name))
            {
                Some((column, column_type)) => {
                    if column.as_str() != name && !merged.iter().any(|seen| seen == name) {
                        merged.push(name.to_string());
                    }
                    if column_type.is_none() {
                        *column_type = ColumnType::for_value(value);
                    }
                }
                None => observed.push((name.to_string(), ColumnType::for_value(value))),
            }
        }
    }

    if !dropped.is_empty() {
        tracing::warn!(
            "Collection '{}': fields {:?} collide with reserved mirror columns and are not mirrored",
            collection,
            dropped
        );
    }
    if !merged.is_empty() {
        tracing::warn!(
            "Collection '{}': fields {:?} differ from another field only by case and share its column",
            collection,
            merged
        );
    }

    let mut columns = vec![
        (SURROGATE_KEY_COLUMN.to_string(), ColumnType::IdentityKey),
        (UNIQUE_ID_COLUMN.to_string(), ColumnType::UniqueId),
    ];
    columns.extend(
        observed
            .into_iter()
            .map(|(name, column_type)| (name, column_type.unwrap_or(ColumnType::ShortText))),
    );

    let mut schema = CollectionSchema {
        collection: collection.to_string(),
        columns,
    };
    for forced in [CREATED_AT_COLUMN, UPDATED_AT_COLUMN] {
        if !schema.contains(forced) {
            schema
                .columns
                .push((forced.to_string(), ColumnType::Timestamp));
        }
    }
    schema
        .columns
        .push((SYNCED_AT_COLUMN.to_string(), ColumnType::Timestamp));
    schema
}
