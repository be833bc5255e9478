use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, TranslatableError};
use crate::model::RecordKey;
use crate::store::{StoreKind, TranslationRecord, TranslationStore};

/// Look up a dotted path (`strings.title`) inside a document.
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn matches_operator(field: Option<&Value>, operator: &str, operand: &Value) -> bool {
    match operator {
        "$eq" => field == Some(operand),
        "$ne" => field != Some(operand),
        "$in" => match (field, operand.as_array()) {
            (Some(value), Some(candidates)) => candidates.contains(value),
            _ => false,
        },
        "$nin" => match (field, operand.as_array()) {
            (Some(value), Some(candidates)) => !candidates.contains(value),
            (None, Some(_)) => true,
            _ => false,
        },
        "$exists" => field.is_some() == operand.as_bool().unwrap_or(true),
        _ => false,
    }
}

/// Whether `document` satisfies `filter`.
///
/// Supports nested-field equality on dotted paths, the `$eq`, `$ne`, `$in`,
/// `$nin` and `$exists` operators, and `$and`. An empty filter matches everything.
pub fn matches_filter(document: &Value, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return false;
    };

    conditions.iter().all(|(path, condition)| {
        if path == "$and" {
            return condition
                .as_array()
                .is_some_and(|filters| filters.iter().all(|f| matches_filter(document, f)));
        }

        let field = lookup(document, path);
        if is_operator_object(condition) {
            condition
                .as_object()
                .into_iter()
                .flatten()
                .all(|(operator, operand)| matches_operator(field, operator, operand))
        } else {
            field == Some(condition)
        }
    })
}

/// An in-process document collection.
#[derive(Debug)]
pub struct DocumentCollection {
    name: String,
    documents: Mutex<Vec<Value>>,
}

impl DocumentCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn documents(&self) -> Result<MutexGuard<'_, Vec<Value>>> {
        self.documents
            .lock()
            .map_err(|_| TranslatableError::DocumentStore(format!("collection {} is poisoned", self.name)))
    }

    fn ensure_object(&self, document: &Value) -> Result<()> {
        if document.is_object() {
            Ok(())
        } else {
            Err(TranslatableError::DocumentStore(format!(
                "collection {} only stores objects",
                self.name
            )))
        }
    }

    pub fn insert(&self, document: Value) -> Result<()> {
        self.ensure_object(&document)?;
        self.documents()?.push(document);
        Ok(())
    }

    /// All matching documents in insertion order.
    pub fn find(&self, filter: &Value) -> Result<Vec<Value>> {
        Ok(self
            .documents()?
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect())
    }

    pub fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        Ok(self
            .documents()?
            .iter()
            .find(|doc| matches_filter(doc, filter))
            .cloned())
    }

    /// Replace the first matching document, or insert when none match.
    ///
    /// # Returns
    /// `true` if an existing document was replaced.
    pub fn upsert(&self, filter: &Value, document: Value) -> Result<bool> {
        self.ensure_object(&document)?;
        let mut documents = self.documents()?;
        match documents.iter_mut().find(|doc| matches_filter(doc, filter)) {
            Some(existing) => {
                *existing = document;
                Ok(true)
            }
            None => {
                documents.push(document);
                Ok(false)
            }
        }
    }

    /// Remove every matching document, returning how many were removed.
    pub fn delete_many(&self, filter: &Value) -> Result<u64> {
        let mut documents = self.documents()?;
        let before = documents.len();
        documents.retain(|doc| !matches_filter(doc, filter));
        Ok((before - documents.len()) as u64)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.documents()?.len())
    }
}

/// Named document collections sharing one process.
#[derive(Debug, Clone, Default)]
pub struct DocumentDatabase {
    collections: Arc<Mutex<HashMap<String, Arc<DocumentCollection>>>>,
}

impl DocumentDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a collection, creating it on first use.
    pub fn collection(&self, name: &str) -> Arc<DocumentCollection> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DocumentCollection::new(name)))
            .clone()
    }
}

/// Translation records stored as documents.
#[derive(Debug, Clone)]
pub struct DocumentTranslationStore {
    collection: Arc<DocumentCollection>,
}

impl DocumentTranslationStore {
    pub fn new(collection: Arc<DocumentCollection>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &Arc<DocumentCollection> {
        &self.collection
    }

    fn key_filter(model_id: &RecordKey, model_type: &str, locale: &str) -> Value {
        json!({
            "model_id": model_id.to_value(),
            "model_type": model_type,
            "locale": locale,
        })
    }

    fn decode(document: Value) -> Result<TranslationRecord> {
        let mut record: TranslationRecord = serde_json::from_value(document)?;
        record.mark_persisted();
        Ok(record)
    }
}

#[async_trait]
impl TranslationStore for DocumentTranslationStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    fn table(&self) -> &str {
        self.collection.name()
    }

    async fn find(
        &self,
        model_id: &RecordKey,
        model_type: &str,
        locale: &str,
    ) -> Result<Option<TranslationRecord>> {
        let filter = Self::key_filter(model_id, model_type, locale);
        self.collection
            .find_one(&filter)?
            .map(Self::decode)
            .transpose()
    }

    async fn save(&self, record: &mut TranslationRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let filter = Self::key_filter(&record.model_id, &record.model_type, &record.locale);
        let replaced = self
            .collection
            .upsert(&filter, serde_json::to_value(&*record)?)?;
        record.mark_persisted();
        debug!(
            "{} translation document {}:{}:{}",
            if replaced { "Replaced" } else { "Inserted" },
            record.locale,
            record.model_id,
            record.model_type
        );
        Ok(())
    }

    async fn delete(&self, record: &TranslationRecord) -> Result<()> {
        let filter = Self::key_filter(&record.model_id, &record.model_type, &record.locale);
        self.collection.delete_many(&filter)?;
        Ok(())
    }

    async fn for_model(
        &self,
        model_id: &RecordKey,
        model_type: &str,
    ) -> Result<Vec<TranslationRecord>> {
        let filter = json!({ "model_id": model_id.to_value(), "model_type": model_type });
        let mut records = self
            .collection
            .find(&filter)?
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.locale.cmp(&b.locale));
        Ok(records)
    }
}
