//! Per-instance translation state: pending writes and the lookup cache.
//!
//! Both maps are owned by exactly one [`crate::Translatable`] and are never
//! shared, so neither type synchronizes access.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::model::RecordKey;
use crate::store::TranslationRecord;

/// Translations staged for the next flush: `locale -> (attribute -> value)`.
///
/// Locales iterate in sorted order so flushes are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingWrites {
    locales: BTreeMap<String, Map<String, Value>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value` for `key` in `locale`, replacing any earlier staged value.
    pub fn stage(&mut self, locale: &str, key: &str, value: Value) {
        self.locales
            .entry(locale.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn get(&self, locale: &str) -> Option<&Map<String, Value>> {
        self.locales.get(locale)
    }

    pub fn value(&self, locale: &str, key: &str) -> Option<&Value> {
        self.locales.get(locale).and_then(|attrs| attrs.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Map<String, Value>)> {
        self.locales.iter()
    }

    pub fn locales(&self) -> Vec<&str> {
        self.locales.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.locales.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locales.len()
    }

    pub fn clear(&mut self) {
        self.locales.clear();
    }
}

/// Memoized translation lookups keyed by `locale:model_id:model_type`.
///
/// A cached `None` records a confirmed absence so repeated reads of an
/// untranslated locale do not hit the store again.
#[derive(Debug, Clone, Default)]
pub struct TranslationCache {
    entries: HashMap<String, Option<TranslationRecord>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(locale: &str, model_id: &RecordKey, model_type: &str) -> String {
        format!("{}:{}:{}", locale, model_id, model_type)
    }

    pub fn get(&self, key: &str) -> Option<&Option<TranslationRecord>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, record: Option<TranslationRecord>) {
        self.entries.insert(key, record);
    }

    /// Invalidate the entry for one locale of one record.
    pub fn forget(&mut self, locale: &str, model_id: &RecordKey, model_type: &str) {
        self.entries.remove(&Self::key(locale, model_id, model_type));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
