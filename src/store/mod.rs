//! Translation store access.
//!
//! A translation store persists one [`TranslationRecord`] per
//! `(model_id, model_type, locale)`. Which store a host record type uses is
//! decided once per type by [`resolve_translation_model`]: the type's own
//! override, else the configured model, else the default for the connection's
//! dialect.
//!
//! # Architecture
//!
//! - `sql`: relational store over `sqlx::AnyPool` (MySQL, MariaDB, PostgreSQL, SQLite)
//! - `document`: in-process document collections with nested-field filters

mod document;
mod sql;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::TranslatableConfig;
use crate::error::{Result, TranslatableError};
use crate::model::{ModelSchema, RecordKey};
use crate::query::Dialect;

pub use document::{matches_filter, DocumentCollection, DocumentDatabase, DocumentTranslationStore};
pub use sql::SqlTranslationStore;

/// Name of the built-in relational translation model.
pub const RELATIONAL_MODEL: &str = "relational";

/// Name of the built-in document translation model.
pub const DOCUMENT_MODEL: &str = "document";

/// All translated values of one host record in one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub locale: String,
    pub model_id: RecordKey,
    pub model_type: String,
    #[serde(default)]
    pub strings: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    exists: bool,
}

impl TranslationRecord {
    /// A record that has not been persisted yet.
    pub fn new(locale: &str, model_id: RecordKey, model_type: &str) -> Self {
        let now = Utc::now();
        Self {
            locale: locale.to_string(),
            model_id,
            model_type: model_type.to_string(),
            strings: Map::new(),
            created_at: now,
            updated_at: now,
            exists: false,
        }
    }

    /// Whether this record was loaded from, or already written to, the store.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.exists = true;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.strings.get(key)
    }

    /// Merge `values` into `strings`; incoming keys overwrite existing ones.
    pub fn merge(&mut self, values: &Map<String, Value>) {
        for (key, value) in values {
            self.strings.insert(key.clone(), value.clone());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.strings.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Which family of store a translation model persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Relational,
    Document,
}

impl StoreKind {
    pub fn for_dialect(dialect: Dialect) -> Self {
        if dialect.is_document() {
            StoreKind::Document
        } else {
            StoreKind::Relational
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Relational => f.write_str(RELATIONAL_MODEL),
            StoreKind::Document => f.write_str(DOCUMENT_MODEL),
        }
    }
}

/// Persistence contract for translation records.
#[async_trait]
pub trait TranslationStore: Send + Sync + fmt::Debug {
    fn kind(&self) -> StoreKind;

    /// Table or collection holding the translation records.
    fn table(&self) -> &str;

    /// Exact lookup by `(model_id, model_type, locale)`.
    async fn find(
        &self,
        model_id: &RecordKey,
        model_type: &str,
        locale: &str,
    ) -> Result<Option<TranslationRecord>>;

    /// Existing record for the key, or a fresh unsaved one.
    async fn find_or_new(
        &self,
        model_id: &RecordKey,
        model_type: &str,
        locale: &str,
    ) -> Result<TranslationRecord> {
        Ok(self
            .find(model_id, model_type, locale)
            .await?
            .unwrap_or_else(|| TranslationRecord::new(locale, model_id.clone(), model_type)))
    }

    /// Insert or update the record and mark it persisted.
    async fn save(&self, record: &mut TranslationRecord) -> Result<()>;

    async fn delete(&self, record: &TranslationRecord) -> Result<()>;

    /// Every locale's record for one host record, ordered by locale.
    async fn for_model(&self, model_id: &RecordKey, model_type: &str)
        -> Result<Vec<TranslationRecord>>;
}

/// A named translation store type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationModel {
    name: String,
    kind: StoreKind,
    table: Option<String>,
}

impl TranslationModel {
    pub fn new(name: impl Into<String>, kind: StoreKind) -> Self {
        Self {
            name: name.into(),
            kind,
            table: None,
        }
    }

    /// Store this model's records in a dedicated table or collection.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// The model's own table, else the configured one for its store kind.
    pub fn table_name(&self, config: &TranslatableConfig) -> String {
        match (&self.table, self.kind) {
            (Some(table), _) => table.clone(),
            (None, StoreKind::Relational) => config.table.clone(),
            (None, StoreKind::Document) => config.collection.clone(),
        }
    }
}

/// Known translation models, seeded with the two built-ins.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<TranslationModel>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            models: vec![
                TranslationModel::new(RELATIONAL_MODEL, StoreKind::Relational),
                TranslationModel::new(DOCUMENT_MODEL, StoreKind::Document),
            ],
        }
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any existing model with the same name.
    pub fn register(&mut self, model: TranslationModel) {
        self.models.retain(|existing| existing.name != model.name);
        self.models.push(model);
    }

    pub fn get(&self, name: &str) -> Option<&TranslationModel> {
        self.models.iter().find(|model| model.name == name)
    }
}

/// Resolve the translation model a host record type uses.
///
/// # Errors
/// * `UnknownTranslationModel` if the chosen name is not registered
/// * `TranslationModelMismatch` if the model's store kind does not match the dialect
pub fn resolve_translation_model<'a>(
    registry: &'a ModelRegistry,
    config: &TranslatableConfig,
    schema: &ModelSchema,
    dialect: Dialect,
) -> Result<&'a TranslationModel> {
    let expected = StoreKind::for_dialect(dialect);
    let default = match expected {
        StoreKind::Relational => RELATIONAL_MODEL,
        StoreKind::Document => DOCUMENT_MODEL,
    };

    let name = schema
        .translation_model()
        .or(config.translation_model.as_deref())
        .unwrap_or(default);

    let model = registry
        .get(name)
        .ok_or_else(|| TranslatableError::UnknownTranslationModel(name.to_string()))?;

    if model.kind != expected {
        return Err(TranslatableError::TranslationModelMismatch {
            model: name.to_string(),
            expected,
        });
    }

    Ok(model)
}
