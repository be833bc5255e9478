//! Attribute-level translations for persisted records.
//!
//! A host record keeps its base-locale values inline. Values for other
//! locales are staged per instance and flushed to a side translation store
//! (one record per host record and locale) after the host record is saved.
//! Query scopes filter and sort host records by their translations on
//! MySQL, MariaDB, PostgreSQL, SQLite and an in-process document store.

pub mod buffer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod locale;
pub mod model;
pub mod query;
pub mod store;
pub mod translatable;
pub mod translator;

pub use config::TranslatableConfig;
pub use error::{ErrorKind, Result, TranslatableError};
pub use locale::{AppLocale, LocaleContext, LocaleProvider};
pub use model::{HostRecord, ModelSchema, Record, RecordKey};
pub use query::{Dialect, DocumentQuery, LocaleScopes, SqlQuery};
pub use store::{TranslationRecord, TranslationStore};
pub use translatable::{Field, LocaleGuard, Translatable};
pub use translator::{Backend, Translator};
