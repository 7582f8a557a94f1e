//! Document model
//!
//! Documents are heterogeneous: any key may be present or absent and a key's
//! type may change from one document to the next, so they are modelled as an
//! insertion-ordered map over a closed set of value variants.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as Json};

use crate::error::{Error, Result};

/// Field holding a document's unique identifier in the primary store.
pub const SOURCE_ID_FIELD: &str = "_id";

/// A single field value inside a document
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Opaque store-assigned identifier, kept in its hex text form
    ObjectId(String),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    /// Whether this value is a plain nested mapping
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Short name of the variant, for log messages
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Timestamp(_) => "date",
            Self::ObjectId(_) => "object id",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// String form of a value used as an identifier.
    pub fn as_id_string(&self) -> Option<String> {
        match self {
            Self::Text(text) | Self::ObjectId(text) => Some(text.clone()),
            Self::Int(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Build an identifier value from its string form.
    ///
    /// 24 hex digits is the store's native identifier layout; anything else
    /// stays plain text.
    pub fn id_from_str(id: &str) -> Self {
        if id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::ObjectId(id.to_ascii_lowercase())
        } else {
            Self::Text(id.to_string())
        }
    }

    /// Decode a value from MongoDB Extended JSON (canonical or relaxed).
    pub fn from_extended_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(flag) => Self::Bool(flag),
            Json::Number(number) => Self::from_number(&number),
            Json::String(text) => Self::Text(text),
            Json::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_extended_json).collect())
            }
            Json::Object(map) => decode_wrapper(&map)
                .unwrap_or_else(|| Self::Object(Document::from_json_map(map))),
        }
    }

    /// Decode a value from plain JSON, without Extended JSON wrappers.
    pub fn from_plain_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(flag) => Self::Bool(flag),
            Json::Number(number) => Self::from_number(&number),
            Json::String(text) => Self::Text(text),
            Json::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_plain_json).collect())
            }
            Json::Object(map) => Self::Object(Document {
                fields: map
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_plain_json(value)))
                    .collect(),
            }),
        }
    }

    /// Encode as relaxed Extended JSON so the store can read it back losslessly.
    pub fn to_extended_json(&self) -> Json {
        match self {
            Self::Timestamp(instant) => {
                let mut wrapper = Map::new();
                wrapper.insert("$date".to_string(), Json::String(rfc3339_millis(instant)));
                Json::Object(wrapper)
            }
            Self::ObjectId(hex) => {
                let mut wrapper = Map::new();
                wrapper.insert("$oid".to_string(), Json::String(hex.clone()));
                Json::Object(wrapper)
            }
            Self::Array(items) => Json::Array(items.iter().map(Self::to_extended_json).collect()),
            Self::Object(document) => document.to_extended_json(),
            scalar => scalar.to_plain_json(),
        }
    }

    /// Encode as plain JSON: identifiers become strings and timestamps become
    /// RFC 3339 text, so the result survives a trip through a text column.
    pub fn to_plain_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(flag) => Json::Bool(*flag),
            Self::Int(number) => Json::Number((*number).into()),
            Self::Float(number) => Number::from_f64(*number).map_or(Json::Null, Json::Number),
            Self::Text(text) | Self::ObjectId(text) => Json::String(text.clone()),
            Self::Timestamp(instant) => Json::String(rfc3339_millis(instant)),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_plain_json).collect()),
            Self::Object(document) => Json::Object(
                document
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_plain_json()))
                    .collect(),
            ),
        }
    }

    fn from_number(number: &Number) -> Self {
        number.as_i64().map_or_else(
            || Self::Float(number.as_f64().unwrap_or(f64::NAN)),
            Self::Int,
        )
    }
}

/// An insertion-ordered document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field, replacing an existing value in place
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(name, _)| name == key)?;
        Some(self.fields.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// String form of the document's `_id`, if it has a usable one
    pub fn id(&self) -> Option<String> {
        self.get(SOURCE_ID_FIELD).and_then(Value::as_id_string)
    }

    /// Parse one Extended JSON document (e.g. a `mongoexport` line).
    pub fn from_extended_json_str(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Json>(raw)? {
            Json::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(Error::InvalidInput(format!(
                "expected a JSON object document, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Encode as relaxed Extended JSON
    pub fn to_extended_json(&self) -> Json {
        Json::Object(
            self.iter()
                .map(|(key, value)| (key.to_string(), value.to_extended_json()))
                .collect(),
        )
    }

    fn from_json_map(map: Map<String, Json>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(key, value)| (key, Value::from_extended_json(value)))
                .collect(),
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut document = Self::new();
        for (key, value) in iter {
            document.insert(key, value);
        }
        document
    }
}

/// Decode single-key Extended JSON wrappers (`$oid`, `$date`, `$number*`).
fn decode_wrapper(map: &Map<String, Json>) -> Option<Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    match (key.as_str(), inner) {
        ("$oid", Json::String(hex)) => Some(Value::ObjectId(hex.clone())),
        ("$date", Json::String(text)) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|instant| Value::Timestamp(instant.with_timezone(&Utc))),
        ("$date", Json::Number(number)) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(Value::Timestamp),
        ("$date", Json::Object(nested)) => match nested.get("$numberLong") {
            Some(Json::String(millis)) => millis
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .map(Value::Timestamp),
            _ => None,
        },
        ("$numberLong" | "$numberInt", Json::String(text)) => text.parse().ok().map(Value::Int),
        ("$numberDouble" | "$numberDecimal", Json::String(text)) => {
            text.parse().ok().map(Value::Float)
        }
        _ => None,
    }
}

fn rfc3339_millis(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

const fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
