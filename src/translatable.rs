//! Attribute interception for translatable host records.
//!
//! [`Translatable`] wraps a host record and routes reads and writes of its
//! translatable attributes. Base-locale values live on the record itself;
//! values for any other locale are staged in [`PendingWrites`] and persisted
//! to the translation store when [`Translatable::saved`] runs after the host
//! record has been saved.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::buffer::{PendingWrites, TranslationCache};
use crate::classifier::FieldClassifier;
use crate::error::{Result, TranslatableError};
use crate::locale::{is_locale_tag, LocaleContext};
use crate::model::HostRecord;
use crate::store::{TranslationRecord, TranslationStore};

/// A host record with locale-aware attribute access.
#[derive(Debug, Clone)]
pub struct Translatable<R: HostRecord> {
    record: R,
    locale: LocaleContext,
    classifier: Arc<FieldClassifier>,
    store: Arc<dyn TranslationStore>,
    pending: PendingWrites,
    cache: TranslationCache,
}

impl<R: HostRecord> Translatable<R> {
    pub fn new(
        record: R,
        locale: LocaleContext,
        classifier: Arc<FieldClassifier>,
        store: Arc<dyn TranslationStore>,
    ) -> Self {
        Self {
            record,
            locale,
            classifier,
            store,
            pending: PendingWrites::new(),
            cache: TranslationCache::new(),
        }
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    /// Raw access to the host record, for the host's own persistence.
    pub fn record_mut(&mut self) -> &mut R {
        &mut self.record
    }

    pub fn into_inner(self) -> R {
        self.record
    }

    pub fn pending(&self) -> &PendingWrites {
        &self.pending
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn TranslationStore> {
        &self.store
    }

    pub fn classifier(&self) -> &FieldClassifier {
        &self.classifier
    }

    pub fn is_array_like(&self, key: &str) -> bool {
        self.classifier.is_array_like(key)
    }

    // ==================== Locale ====================

    /// Set this instance's locale override; `None` clears it.
    pub fn locale(&mut self, locale: Option<&str>) -> &mut Self {
        self.locale.set_override(locale.map(str::to_string));
        self
    }

    /// The locale reads and writes currently resolve to.
    pub fn current_locale(&self) -> String {
        self.locale.resolve(None)
    }

    pub fn base_locale(&self) -> String {
        self.locale.base()
    }

    /// A detached copy with its own override. `self` is left untouched.
    pub fn in_locale(&self, locale: &str) -> Self
    where
        R: Clone,
    {
        let mut copy = self.clone();
        copy.locale(Some(locale));
        copy
    }

    /// Switch the override until the returned guard is dropped.
    ///
    /// The previous override is restored on drop, including during unwinding,
    /// so this also works across `.await` points.
    pub fn scoped_locale(&mut self, locale: &str) -> LocaleGuard<'_, R> {
        let previous = self.locale.set_override(Some(locale.to_string()));
        LocaleGuard {
            target: self,
            previous: Some(previous),
        }
    }

    /// Run `f` with the override set to `locale`, then restore the previous one.
    pub fn with_locale<T>(&mut self, locale: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        let mut guard = self.scoped_locale(locale);
        f(&mut *guard)
    }

    // ==================== Reads ====================

    /// Read `key` in the current locale.
    ///
    /// Untranslatable keys and the base locale read the record directly.
    /// Other locales return the stored translation, falling back to the base
    /// value when there is none.
    pub async fn get(&mut self, key: &str) -> Result<Option<Value>> {
        let locale = self.locale.resolve(None);
        if !self.record.schema().is_translatable(key) {
            return Ok(self.record.raw_attribute(key).cloned());
        }
        self.read(&locale, key, true).await
    }

    async fn read(&mut self, locale: &str, key: &str, fallback: bool) -> Result<Option<Value>> {
        if self.locale.is_base(locale) {
            return Ok(self.record.raw_attribute(key).cloned());
        }

        let translated = self
            .translation_model(locale)
            .await?
            .and_then(|record| record.get(key))
            .filter(|value| !value.is_null())
            .cloned();

        match translated {
            Some(value) => Ok(Some(value)),
            None if fallback => Ok(self.record.raw_attribute(key).cloned()),
            None => Ok(None),
        }
    }

    /// Explicit single-locale read.
    ///
    /// # Arguments
    /// * `locale` - Locale to read; the base locale reads the stored value
    /// * `key` - A translatable attribute
    /// * `fallback` - Return the base value when the locale has no translation
    ///
    /// # Errors
    /// `NotTranslatable` if `key` is not declared translatable.
    pub async fn get_translation(
        &mut self,
        locale: &str,
        key: &str,
        fallback: bool,
    ) -> Result<Option<Value>> {
        self.ensure_translatable(key)?;
        self.read(locale, key, fallback).await
    }

    /// The stored translation record for `locale`, memoized per instance.
    ///
    /// Records without a primary key have no translations yet and never hit
    /// the store.
    pub async fn translation_model(&mut self, locale: &str) -> Result<Option<&TranslationRecord>> {
        let Some(model_id) = self.record.key() else {
            return Ok(None);
        };
        let model_type = self.record.schema().morph_type().to_string();
        let cache_key = TranslationCache::key(locale, &model_id, &model_type);

        if self.cache.get(&cache_key).is_none() {
            let found = self.store.find(&model_id, &model_type, locale).await?;
            self.cache.insert(cache_key.clone(), found);
        }

        Ok(self.cache.get(&cache_key).and_then(Option::as_ref))
    }

    /// All stored translations, or one locale's strings.
    ///
    /// Without a locale the map is `locale -> {key -> value}`; with a locale
    /// it is that locale's `{key -> value}` (empty when there is none).
    /// Pending writes are not included.
    pub async fn get_translations(&self, locale: Option<&str>) -> Result<Map<String, Value>> {
        let Some(model_id) = self.record.key() else {
            return Ok(Map::new());
        };
        let records = self
            .store
            .for_model(&model_id, self.record.schema().morph_type())
            .await?;

        match locale.filter(|l| !l.is_empty()) {
            Some(locale) => Ok(records
                .into_iter()
                .find(|record| record.locale == locale)
                .map(|record| record.strings)
                .unwrap_or_default()),
            None => Ok(records
                .into_iter()
                .map(|record| (record.locale, Value::Object(record.strings)))
                .collect()),
        }
    }

    pub async fn localizations(&self) -> Result<Map<String, Value>> {
        self.get_translations(None).await
    }

    /// Serialize the record, overlaying translatable keys in a non-base locale.
    pub async fn to_array(&mut self) -> Result<Map<String, Value>> {
        let mut array = self.record.raw_attributes();
        let locale = self.locale.resolve(None);
        if self.locale.is_base(&locale) {
            return Ok(array);
        }

        let keys = self.record.schema().translatable().to_vec();
        for key in keys {
            let value = self.read(&locale, &key, true).await?;
            array.insert(key, value.unwrap_or(Value::Null));
        }
        Ok(array)
    }

    // ==================== Writes ====================

    /// Write `key` in the current locale.
    ///
    /// A translatable, non-array-like key given an object whose keys are all
    /// locale tags is a multi-locale assignment: each entry is routed to its
    /// own locale. Any other structured value on such a key is rejected.
    ///
    /// # Errors
    /// `AmbiguousStructuredValue` for an object or array that is not a
    /// locale map on a translatable key that is not array-like.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        if !self.record.schema().is_translatable(key) {
            self.record.set_raw_attribute(key, value);
            return Ok(self);
        }

        if !self.classifier.is_array_like(key) {
            match value {
                Value::Object(map) => {
                    if map.is_empty() || !map.keys().all(|k| is_locale_tag(k)) {
                        return Err(TranslatableError::AmbiguousStructuredValue {
                            key: key.to_string(),
                        });
                    }
                    for (locale, translated) in map {
                        self.route(&locale, key, translated);
                    }
                    return Ok(self);
                }
                Value::Array(_) => {
                    return Err(TranslatableError::AmbiguousStructuredValue {
                        key: key.to_string(),
                    })
                }
                scalar => {
                    let locale = self.locale.resolve(None);
                    self.route(&locale, key, scalar);
                    return Ok(self);
                }
            }
        }

        let locale = self.locale.resolve(None);
        self.route(&locale, key, value);
        Ok(self)
    }

    /// Explicit single-locale write.
    ///
    /// The base locale goes through [`Translatable::set`], so locale-map and
    /// array-like rules still apply; other locales are staged as-is.
    ///
    /// # Errors
    /// `NotTranslatable` if `key` is not declared translatable.
    pub fn set_translation(
        &mut self,
        locale: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.ensure_translatable(key)?;

        if self.locale.is_base(locale) {
            let result = self.with_locale(locale, |this| this.set(key, value).map(|_| ()));
            result?;
        } else {
            self.pending.stage(locale, key, value.into());
        }
        Ok(self)
    }

    /// Delete one key from a locale's stored translation.
    ///
    /// Deletes the whole translation record once its last key is gone. No-op
    /// if the locale has no translation record or the key is not in it.
    pub async fn remove_translation(&mut self, locale: &str, key: &str) -> Result<()> {
        let Some(mut record) = self.translation_model(locale).await?.cloned() else {
            return Ok(());
        };
        if record.remove(key).is_none() {
            return Ok(());
        }

        let cache_key = TranslationCache::key(locale, &record.model_id, &record.model_type);
        if record.is_empty() {
            self.store.delete(&record).await?;
            debug!("Removed last key from {} translation, record deleted", locale);
            self.cache.insert(cache_key, None);
        } else {
            self.store.save(&mut record).await?;
            self.cache.insert(cache_key, Some(record));
        }
        Ok(())
    }

    /// A typed accessor for one attribute.
    pub fn field(&mut self, key: &str) -> Field<'_, R> {
        Field {
            owner: self,
            key: key.to_string(),
        }
    }

    fn route(&mut self, locale: &str, key: &str, value: Value) {
        if self.locale.is_base(locale) {
            self.record.set_raw_attribute(key, value);
        } else {
            self.pending.stage(locale, key, value);
        }
    }

    fn ensure_translatable(&self, key: &str) -> Result<()> {
        let schema = self.record.schema();
        if schema.is_translatable(key) {
            Ok(())
        } else {
            Err(TranslatableError::NotTranslatable {
                key: key.to_string(),
                model: schema.morph_type().to_string(),
            })
        }
    }

    // ==================== Persistence ====================

    /// Flush pending translations. Call after the host record was saved.
    ///
    /// Each buffered locale is merged into its translation record and saved
    /// on its own; there is no transaction across locales. On a store error
    /// the locales already written stay written and the whole buffer stays
    /// pending.
    ///
    /// # Returns
    /// The number of translation records written.
    ///
    /// # Errors
    /// * `UnsavedRecord` if there are pending writes but the record has no key
    /// * Store errors from the translation store
    pub async fn saved(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let model_type = self.record.schema().morph_type().to_string();
        let model_id = self
            .record
            .key()
            .ok_or_else(|| TranslatableError::UnsavedRecord(model_type.clone()))?;

        let mut written = 0;
        for (locale, values) in self.pending.iter() {
            let mut record = self.store.find_or_new(&model_id, &model_type, locale).await?;
            record.merge(values);
            self.store.save(&mut record).await?;
            self.cache.forget(locale, &model_id, &model_type);
            written += 1;
        }

        self.pending.clear();
        info!(
            "Flushed {} translation record(s) for {} {}",
            written, model_type, model_id
        );
        Ok(written)
    }

    /// Forget cached lookups for one locale, or all of them.
    pub fn flush_translation_cache(&mut self, locale: Option<&str>) {
        match (locale, self.record.key()) {
            (None, _) => self.cache.clear(),
            (Some(locale), Some(model_id)) => {
                self.cache
                    .forget(locale, &model_id, self.record.schema().morph_type())
            }
            (Some(_), None) => {}
        }
    }
}

/// Restores a [`Translatable`]'s previous locale override when dropped.
pub struct LocaleGuard<'a, R: HostRecord> {
    target: &'a mut Translatable<R>,
    previous: Option<Option<String>>,
}

impl<R: HostRecord> Deref for LocaleGuard<'_, R> {
    type Target = Translatable<R>;

    fn deref(&self) -> &Self::Target {
        &*self.target
    }
}

impl<R: HostRecord> DerefMut for LocaleGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.target
    }
}

impl<R: HostRecord> Drop for LocaleGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.target.locale.set_override(previous);
        }
    }
}

/// Accessor for one attribute of a [`Translatable`].
pub struct Field<'a, R: HostRecord> {
    owner: &'a mut Translatable<R>,
    key: String,
}

impl<R: HostRecord> Field<'_, R> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn get(&mut self) -> Result<Option<Value>> {
        self.owner.get(&self.key).await
    }

    pub fn set(&mut self, value: impl Into<Value>) -> Result<()> {
        self.owner.set(&self.key, value).map(|_| ())
    }

    pub async fn translation(&mut self, locale: &str, fallback: bool) -> Result<Option<Value>> {
        self.owner.get_translation(locale, &self.key, fallback).await
    }

    pub fn set_translation(&mut self, locale: &str, value: impl Into<Value>) -> Result<()> {
        self.owner
            .set_translation(locale, &self.key, value)
            .map(|_| ())
    }
}
