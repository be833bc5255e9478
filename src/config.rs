use crate::error::{Result, TranslatableError};
use crate::locale::is_locale_tag;

/// Cast kinds treated as array-like unless overridden.
pub const DEFAULT_ARRAY_LIKE_CASTS: &[&str] = &[
    "array",
    "json",
    "object",
    "collection",
    "encrypted:array",
    "encrypted:object",
    "as_array_object",
    "as_collection",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatableConfig {
    // Field classification
    pub array_like_casts: Vec<String>,
    pub array_like_attributes: Vec<String>,

    // Translation store
    pub translation_model: Option<String>,
    pub table: String,
    pub collection: String,

    // Locales
    pub locale: String,
    pub fallback_locale: String,
}

impl Default for TranslatableConfig {
    fn default() -> Self {
        Self {
            array_like_casts: DEFAULT_ARRAY_LIKE_CASTS
                .iter()
                .map(|cast| cast.to_string())
                .collect(),
            array_like_attributes: Vec::new(),
            translation_model: None,
            table: "translations".to_string(),
            collection: "translations".to_string(),
            locale: "en".to_string(),
            fallback_locale: "en".to_string(),
        }
    }
}

impl TranslatableConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Field classification
            array_like_casts: std::env::var("TRANSLATABLE_ARRAY_LIKE_CASTS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.array_like_casts),
            array_like_attributes: std::env::var("TRANSLATABLE_ARRAY_LIKE_ATTRIBUTES")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.array_like_attributes),

            // Translation store
            translation_model: std::env::var("TRANSLATABLE_MODEL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            table: std::env::var("TRANSLATABLE_TABLE").unwrap_or(defaults.table),
            collection: std::env::var("TRANSLATABLE_COLLECTION").unwrap_or(defaults.collection),

            // Locales
            locale: std::env::var("APP_LOCALE").unwrap_or(defaults.locale),
            fallback_locale: std::env::var("APP_FALLBACK_LOCALE")
                .unwrap_or(defaults.fallback_locale),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject locales that could never match a stored translation.
    pub fn validate(&self) -> Result<()> {
        for locale in [&self.locale, &self.fallback_locale] {
            if !is_locale_tag(locale) {
                return Err(TranslatableError::InvalidLocale(locale.clone()));
            }
        }
        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
