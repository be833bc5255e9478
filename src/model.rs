//! Host record contract.
//!
//! The host ORM owns persistence of the record itself. This module only
//! describes what the translation layer needs from it: a type declaration
//! ([`ModelSchema`]) and raw attribute access ([`HostRecord`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primary key of a host record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Read a key out of an attribute value. Null and structured values are not keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordKey::Int),
            Value::String(s) if !s.is_empty() => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordKey::Int(id) => Value::from(*id),
            RecordKey::Text(id) => Value::from(id.as_str()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(id) => write!(f, "{}", id),
            RecordKey::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Int(id)
    }
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Text(id.to_string())
    }
}

/// Declaration of a translatable host record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    table: String,
    morph_type: Option<String>,
    primary_key: String,
    translatable: Vec<String>,
    casts: HashMap<String, String>,
    array_like_attributes: Vec<String>,
    array_like_casts: Vec<String>,
    translation_model: Option<String>,
}

impl ModelSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            morph_type: None,
            primary_key: "id".to_string(),
            translatable: Vec::new(),
            casts: HashMap::new(),
            array_like_attributes: Vec::new(),
            array_like_casts: Vec::new(),
            translation_model: None,
        }
    }

    pub fn with_translatable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.translatable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cast(mut self, field: impl Into<String>, cast: impl Into<String>) -> Self {
        self.casts.insert(field.into(), cast.into());
        self
    }

    /// Type-tag stored in `model_type`. Defaults to the table name.
    pub fn with_morph_type(mut self, morph_type: impl Into<String>) -> Self {
        self.morph_type = Some(morph_type.into());
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_array_like_attributes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.array_like_attributes = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_array_like_casts<I, S>(mut self, casts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.array_like_casts = casts.into_iter().map(Into::into).collect();
        self
    }

    /// Use a specific registered translation model for this record type.
    pub fn with_translation_model(mut self, name: impl Into<String>) -> Self {
        self.translation_model = Some(name.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn morph_type(&self) -> &str {
        self.morph_type.as_deref().unwrap_or(&self.table)
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn translatable(&self) -> &[String] {
        &self.translatable
    }

    pub fn is_translatable(&self, key: &str) -> bool {
        self.translatable.iter().any(|field| field == key)
    }

    pub fn cast(&self, key: &str) -> Option<&str> {
        self.casts.get(key).map(String::as_str)
    }

    pub fn casts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.casts.iter().map(|(field, cast)| (field.as_str(), cast.as_str()))
    }

    pub fn array_like_attributes(&self) -> &[String] {
        &self.array_like_attributes
    }

    pub fn array_like_casts(&self) -> &[String] {
        &self.array_like_casts
    }

    pub fn translation_model(&self) -> Option<&str> {
        self.translation_model.as_deref()
    }
}

/// What the translation layer needs from a host record.
///
/// Raw accessors bypass translation entirely; they read and write the
/// base-locale values held on the record.
pub trait HostRecord {
    fn schema(&self) -> &ModelSchema;

    /// Primary key, or `None` while the record has not been persisted.
    fn key(&self) -> Option<RecordKey>;

    fn raw_attribute(&self, key: &str) -> Option<&Value>;

    fn set_raw_attribute(&mut self, key: &str, value: Value);

    fn raw_attributes(&self) -> Map<String, Value>;
}

/// Attribute-map host record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<ModelSchema>,
    attributes: Map<String, Value>,
}

impl Record {
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            attributes: Map::new(),
        }
    }

    pub fn from_attributes(schema: Arc<ModelSchema>, attributes: Map<String, Value>) -> Self {
        Self { schema, attributes }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

impl HostRecord for Record {
    fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    fn key(&self) -> Option<RecordKey> {
        self.attributes
            .get(self.schema.primary_key())
            .and_then(RecordKey::from_value)
    }

    fn raw_attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    fn set_raw_attribute(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }

    fn raw_attributes(&self) -> Map<String, Value> {
        self.attributes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new("posts")
                .with_translatable(["title", "meta"])
                .with_cast("meta", "array"),
        )
    }

    // ==================== RecordKey Tests ====================

    #[test]
    fn test_record_key_from_value() {
        assert_eq!(RecordKey::from_value(&json!(7)), Some(RecordKey::Int(7)));
        assert_eq!(
            RecordKey::from_value(&json!("65f0c2")),
            Some(RecordKey::Text("65f0c2".to_string()))
        );
        assert_eq!(RecordKey::from_value(&Value::Null), None);
        assert_eq!(RecordKey::from_value(&json!("")), None);
        assert_eq!(RecordKey::from_value(&json!(1.5)), None);
    }

    #[test]
    fn test_record_key_display_and_serde() {
        assert_eq!(RecordKey::Int(42).to_string(), "42");
        assert_eq!(RecordKey::from("abc").to_string(), "abc");
        assert_eq!(serde_json::to_value(RecordKey::Int(3)).unwrap(), json!(3));
        let parsed: RecordKey = serde_json::from_value(json!("x1")).unwrap();
        assert_eq!(parsed, RecordKey::Text("x1".to_string()));
    }

    // ==================== ModelSchema Tests ====================

    #[test]
    fn test_schema_defaults() {
        let schema = ModelSchema::new("posts");
        assert_eq!(schema.table(), "posts");
        assert_eq!(schema.morph_type(), "posts");
        assert_eq!(schema.primary_key(), "id");
        assert!(schema.translatable().is_empty());
        assert!(schema.translation_model().is_none());
    }

    #[test]
    fn test_schema_builder() {
        let schema = ModelSchema::new("posts")
            .with_morph_type("App\\Post")
            .with_primary_key("_id")
            .with_translatable(["title"])
            .with_cast("meta", "array")
            .with_translation_model("document");

        assert_eq!(schema.morph_type(), "App\\Post");
        assert_eq!(schema.primary_key(), "_id");
        assert!(schema.is_translatable("title"));
        assert!(!schema.is_translatable("meta"));
        assert_eq!(schema.cast("meta"), Some("array"));
        assert_eq!(schema.cast("title"), None);
        assert_eq!(schema.translation_model(), Some("document"));
    }

    // ==================== Record Tests ====================

    #[test]
    fn test_record_key_from_primary_key_attribute() {
        let record = Record::new(post_schema()).with("title", "Hello");
        assert_eq!(record.key(), None);

        let record = record.with("id", 5);
        assert_eq!(record.key(), Some(RecordKey::Int(5)));
    }

    #[test]
    fn test_record_raw_attributes() {
        let mut record = Record::new(post_schema());
        record.set_raw_attribute("title", json!("Hello"));
        assert_eq!(record.raw_attribute("title"), Some(&json!("Hello")));
        assert_eq!(record.raw_attribute("missing"), None);
        assert_eq!(record.raw_attributes().len(), 1);
    }
}
