//! Document flattening into mirror rows

use libsql::Value as SqlValue;

use crate::coerce::coerce;
use crate::models::{Document, Value, SOURCE_ID_FIELD};
use crate::schema::{is_reserved_column, CollectionSchema, UNIQUE_ID_COLUMN};

/// A document flattened to `column -> value` pairs, values not yet coerced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    columns: Vec<(String, Value)>,
    dropped: Vec<String>,
    merged: Vec<String>,
}

impl FlatRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Field names discarded because they collide with reserved columns
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    /// Field names folded into an earlier column spelled the same up to case
    pub fn merged(&self) -> &[String] {
        &self.merged
    }

    /// The row's unique id, if the document carried one
    pub fn unique_id(&self) -> Option<String> {
        self.get(UNIQUE_ID_COLUMN).and_then(Value::as_id_string)
    }

    /// Coerced column/value lists for an `INSERT` against `schema`.
    ///
    /// Columns the schema doesn't know are dropped; schema columns the row
    /// lacks are left to their defaults.
    pub fn project(&self, schema: &CollectionSchema) -> (Vec<String>, Vec<SqlValue>) {
        schema
            .insertable_columns()
            .filter_map(|column| {
                self.get(column)
                    .map(|value| (column.to_string(), coerce(value)))
            })
            .unzip()
    }

    fn push(&mut self, column: String, value: Value) {
        if let Some(slot) = self
            .columns
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
        {
            if slot.0 != column {
                tracing::debug!("Merging field '{}' into column '{}'", column, slot.0);
                self.merged.push(column);
            }
            slot.1 = value;
        } else {
            self.columns.push((column, value));
        }
    }
}

/// Flatten a document into a single mirror row.
///
/// `_id` becomes the unique-id column. Non-empty nested objects are expanded
/// recursively into `parent_child` columns; arrays, timestamps and
/// identifiers are kept whole. Dots in keys become underscores.
pub fn flatten(document: &Document) -> FlatRow {
    let mut row = FlatRow::default();

    for (key, value) in document.iter() {
        if key == SOURCE_ID_FIELD {
            let id = value.as_id_string().map_or(Value::Null, Value::Text);
            row.push(UNIQUE_ID_COLUMN.to_string(), id);
            continue;
        }
        flatten_into(&mut row, normalize_key(key), value);
    }

    row
}

fn flatten_into(row: &mut FlatRow, column: String, value: &Value) {
    match value {
        Value::Object(nested) if !nested.is_empty() => {
            for (key, child) in nested.iter() {
                flatten_into(row, format!("{column}_{}", normalize_key(key)), child);
            }
        }
        _ if is_reserved_column(&column) => {
            tracing::debug!("Dropping field '{}' (reserved column name)", column);
            row.dropped.push(column);
        }
        _ => row.push(column, value.clone()),
    }
}

fn normalize_key(key: &str) -> String {
    key.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer_schema;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        Document::new()
            .with(SOURCE_ID_FIELD, Value::Text("A1".into()))
            .with("name", Value::Text("x".into()))
            .with(
                "meta",
                Value::Object(
                    Document::new()
                        .with("a", Value::Int(1))
                        .with("b", Value::Int(2)),
                ),
            )
            .with("active", Value::Bool(true))
    }

    #[test]
    fn renames_id_and_flattens_nested_objects() {
        let row = flatten(&sample());
        let columns = row.iter().map(|(name, _)| name).collect::<Vec<_>>();

        assert_eq!(columns, vec!["mongo_id", "name", "meta_a", "meta_b", "active"]);
        assert_eq!(row.unique_id().as_deref(), Some("A1"));
        assert_eq!(row.get("meta_b"), Some(&Value::Int(2)));
    }

    #[test]
    fn object_id_becomes_text_id() {
        let doc = Document::new().with(
            SOURCE_ID_FIELD,
            Value::ObjectId("65a1b2c3d4e5f60718293a4b".into()),
        );
        assert_eq!(
            flatten(&doc).get("mongo_id"),
            Some(&Value::Text("65a1b2c3d4e5f60718293a4b".into()))
        );
    }

    #[test]
    fn recursion_is_unbounded_but_arrays_are_leaves() {
        let deep = Document::new().with(
            "a",
            Value::Object(Document::new().with(
                "b",
                Value::Object(Document::new().with(
                    "c",
                    Value::Array(vec![Value::Object(Document::new().with("d", Value::Int(1)))]),
                )),
            )),
        );
        let row = flatten(&deep);
        assert_eq!(row.iter().map(|(name, _)| name).collect::<Vec<_>>(), vec!["a_b_c"]);
        assert!(matches!(row.get("a_b_c"), Some(Value::Array(_))));
    }

    #[test]
    fn timestamps_and_empty_objects_are_leaves() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let doc = Document::new()
            .with("at", Value::Timestamp(at))
            .with("extra", Value::Object(Document::new()));
        let row = flatten(&doc);

        assert_eq!(row.get("at"), Some(&Value::Timestamp(at)));
        assert_eq!(row.get("extra"), Some(&Value::Object(Document::new())));
    }

    #[test]
    fn dotted_keys_become_underscores() {
        let doc = Document::new()
            .with("geo.lat", Value::Float(1.5))
            .with(
                "addr",
                Value::Object(Document::new().with("zip.code", Value::Text("9".into()))),
            );
        let row = flatten(&doc);
        assert!(row.get("geo_lat").is_some());
        assert!(row.get("addr_zip_code").is_some());
    }

    #[test]
    fn nested_keys_colliding_with_reserved_columns_are_dropped() {
        let doc = Document::new().with(
            "is",
            Value::Object(Document::new().with("deleted", Value::Bool(true))),
        );
        let row = flatten(&doc);
        assert!(row.is_empty());
        assert_eq!(row.dropped().to_vec(), vec!["is_deleted".to_string()]);
    }

    #[test]
    fn reserved_names_match_regardless_of_case() {
        let doc = Document::new()
            .with(SOURCE_ID_FIELD, Value::Text("A1".into()))
            .with("ID", Value::Int(7))
            .with("Synced_At", Value::Text("later".into()))
            .with("name", Value::Text("x".into()));
        let row = flatten(&doc);

        assert_eq!(row.iter().map(|(name, _)| name).collect::<Vec<_>>(), vec!["mongo_id", "name"]);
        assert_eq!(
            row.dropped().to_vec(),
            vec!["ID".to_string(), "Synced_At".to_string()]
        );
    }

    #[test]
    fn keys_differing_by_case_share_the_first_spelling() {
        let doc = Document::new()
            .with("name", Value::Text("first".into()))
            .with("Name", Value::Text("second".into()));
        let row = flatten(&doc);

        assert_eq!(row.len(), 1);
        assert_eq!(row.iter().next(), Some(("name", &Value::Text("second".into()))));
        assert_eq!(row.get("NAME"), Some(&Value::Text("second".into())));
        assert_eq!(row.merged().to_vec(), vec!["Name".to_string()]);
    }

    #[test]
    fn project_coerces_and_keeps_schema_columns_only() {
        let doc = sample();
        let schema = infer_schema("c", std::slice::from_ref(&doc));
        let later = doc.clone().with("surprise", Value::Int(7));

        let (columns, values) = flatten(&later).project(&schema);
        assert_eq!(columns, vec!["mongo_id", "name", "meta_a", "meta_b", "active"]);
        assert_eq!(
            values,
            vec![
                SqlValue::Text("A1".into()),
                SqlValue::Text("x".into()),
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Integer(1),
            ]
        );
    }
}
