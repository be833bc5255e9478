//! Error types for translation resolution and persistence.

use std::fmt;

use thiserror::Error;

use crate::store::StoreKind;

/// Coarse classification of a [`TranslatableError`].
///
/// Callers that only care about how to react (fix config, fix the call site,
/// switch backend, retry the I/O) can match on this instead of every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Translation store type missing or incompatible with the connection.
    Configuration,
    /// The caller violated an attribute or scope contract.
    InvalidArgument,
    /// The storage dialect has no expression for the requested operation.
    UnsupportedDialect,
    /// The underlying persistence call failed.
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::UnsupportedDialect => "unsupported dialect",
            ErrorKind::Store => "store",
        };
        f.write_str(name)
    }
}

/// Errors raised by the translation engine.
#[derive(Error, Debug)]
pub enum TranslatableError {
    /// No translation model is registered under the configured name
    #[error("Invalid translatable model \"{0}\". Make sure it exists and is registered.")]
    UnknownTranslationModel(String),

    /// The configured translation model targets the wrong kind of store
    #[error("The translatable model \"{model}\" must extend the {expected} translation model.")]
    TranslationModelMismatch { model: String, expected: StoreKind },

    /// A configured locale is not a well-formed locale tag
    #[error("Invalid locale \"{0}\" in configuration")]
    InvalidLocale(String),

    /// Structured value written to a translatable field that is not array-like
    #[error(
        "Translatable attribute \"{key}\" received a structured value but is not declared \
         array-like. Add an array-like cast or list it in the array-like attributes."
    )]
    AmbiguousStructuredValue { key: String },

    /// Explicit translation accessor used on an attribute that is not translatable
    #[error("The attribute \"{key}\" is not marked as translatable on {model}.")]
    NotTranslatable { key: String, model: String },

    /// A query scope was given an empty attribute key
    #[error("The JSON key must not be empty on {0}.")]
    EmptyKey(String),

    /// Pending translations cannot be flushed before the host record has a key
    #[error("Cannot flush translations for an unsaved {0} record.")]
    UnsavedRecord(String),

    /// The storage dialect cannot express the requested operation
    #[error("Driver \"{driver}\" not supported in {operation}. Supported: {supported}.")]
    UnsupportedDialect {
        driver: String,
        operation: &'static str,
        supported: &'static str,
    },

    /// SQL store failure
    #[error("Translation store query failed: {0}")]
    Store(#[from] sqlx::Error),

    /// Document store failure
    #[error("Document store error: {0}")]
    DocumentStore(String),

    /// A stored timestamp is not RFC 3339
    #[error("Invalid timestamp \"{0}\" in translation store")]
    InvalidTimestamp(String),

    /// Translation strings could not be encoded or decoded
    #[error("Failed to (de)serialize translation strings: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TranslatableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslatableError::UnknownTranslationModel(_)
            | TranslatableError::TranslationModelMismatch { .. }
            | TranslatableError::InvalidLocale(_) => ErrorKind::Configuration,
            TranslatableError::AmbiguousStructuredValue { .. }
            | TranslatableError::NotTranslatable { .. }
            | TranslatableError::EmptyKey(_)
            | TranslatableError::UnsavedRecord(_) => ErrorKind::InvalidArgument,
            TranslatableError::UnsupportedDialect { .. } => ErrorKind::UnsupportedDialect,
            TranslatableError::Store(_)
            | TranslatableError::DocumentStore(_)
            | TranslatableError::InvalidTimestamp(_)
            | TranslatableError::Serialization(_) => ErrorKind::Store,
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslatableError>;
