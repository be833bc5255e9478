use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Result, TranslatableError};
use crate::model::{ModelSchema, Record};
use crate::query::{ensure_orderable, Condition, Dialect, LocaleScopes};
use crate::store::DocumentCollection;

#[derive(Debug, Clone)]
enum Scope {
    /// Host field filter, applied as-is.
    Field(Value),
    /// Keep hosts that own a translation document matching the filter.
    Has(Value),
    /// Keep hosts that own no translation document matching the filter.
    Missing(Value),
}

/// Host document query with translation-aware scopes.
///
/// Translation scopes are resolved against the translation collection when
/// [`DocumentQuery::filter`] runs, becoming `$in`/`$nin` filters on the host
/// primary key.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    schema: Arc<ModelSchema>,
    translations: Arc<DocumentCollection>,
    scopes: Vec<Scope>,
}

impl DocumentQuery {
    pub fn new(schema: Arc<ModelSchema>, translations: Arc<DocumentCollection>) -> Self {
        Self {
            schema,
            translations,
            scopes: Vec::new(),
        }
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Plain equality on a host field (dotted paths allowed).
    pub fn where_eq(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let mut filter = Map::new();
        filter.insert(field.to_string(), value.into());
        self.scopes.push(Scope::Field(Value::Object(filter)));
        self
    }

    fn translation_filter(&self, locale: &str) -> Value {
        json!({ "model_type": self.schema.morph_type(), "locale": locale })
    }

    fn owner_ids(&self, filter: &Value) -> Result<Vec<Value>> {
        Ok(self
            .translations
            .find(filter)?
            .into_iter()
            .filter_map(|mut doc| doc.as_object_mut().and_then(|d| d.remove("model_id")))
            .collect())
    }

    /// The host filter document for every scope applied so far.
    pub fn filter(&self) -> Result<Value> {
        let pk = self.schema.primary_key();
        let mut filters = Vec::with_capacity(self.scopes.len());

        for scope in &self.scopes {
            let filter = match scope {
                Scope::Field(filter) => filter.clone(),
                Scope::Has(translation) => key_filter(pk, "$in", self.owner_ids(translation)?),
                Scope::Missing(translation) => key_filter(pk, "$nin", self.owner_ids(translation)?),
            };
            filters.push(filter);
        }

        Ok(match filters.len() {
            0 => json!({}),
            1 => filters.remove(0),
            _ => json!({ "$and": filters }),
        })
    }

    /// Matching host documents in collection order.
    pub fn fetch(&self, hosts: &DocumentCollection) -> Result<Vec<Value>> {
        let filter = self.filter()?;
        debug!("Locale document query on {}: {}", hosts.name(), filter);
        hosts.find(&filter)
    }

    pub fn fetch_records(&self, hosts: &DocumentCollection) -> Result<Vec<Record>> {
        self.fetch(hosts)?
            .into_iter()
            .map(|doc| match doc {
                Value::Object(attributes) => Ok(Record::from_attributes(self.schema.clone(), attributes)),
                other => Err(TranslatableError::DocumentStore(format!(
                    "host document is not an object: {}",
                    other
                ))),
            })
            .collect()
    }
}

/// `{pk: {operator: ids}}`
fn key_filter(pk: &str, operator: &str, ids: Vec<Value>) -> Value {
    let mut condition = Map::new();
    condition.insert(operator.to_string(), Value::Array(ids));
    let mut filter = Map::new();
    filter.insert(pk.to_string(), Value::Object(condition));
    Value::Object(filter)
}

impl LocaleScopes for DocumentQuery {
    fn where_locale(&mut self, locale: &str, key: &str, value: &str) -> Result<&mut Self> {
        let condition = match Dialect::Document.json().build_equality("strings", key, value)? {
            Condition::Document(filter) => filter,
            Condition::Sql(_) => {
                return Err(TranslatableError::UnsupportedDialect {
                    driver: Dialect::Document.driver_name().to_string(),
                    operation: "where_locale",
                    supported: "mongodb",
                })
            }
        };
        let filter = json!({ "$and": [self.translation_filter(locale), condition] });
        self.scopes.push(Scope::Has(filter));
        Ok(self)
    }

    fn where_has_locale(&mut self, locale: &str) -> Result<&mut Self> {
        let filter = self.translation_filter(locale);
        self.scopes.push(Scope::Has(filter));
        Ok(self)
    }

    fn where_missing_locale(&mut self, locale: &str) -> Result<&mut Self> {
        let filter = self.translation_filter(locale);
        self.scopes.push(Scope::Missing(filter));
        Ok(self)
    }

    /// Always fails: the document store has no ordering expression.
    fn order_by_locale(&mut self, _locale: &str, key: &str, _direction: &str) -> Result<&mut Self> {
        let json = Dialect::Document.json();
        ensure_orderable(json, "strings", key)?;
        json.build_order("strings", key, key)?;
        Ok(self)
    }
}
