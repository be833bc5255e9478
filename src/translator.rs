//! The environment host record types are bound to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{debug, info};

use crate::classifier::FieldClassifier;
use crate::config::TranslatableConfig;
use crate::error::{Result, TranslatableError};
use crate::locale::{LocaleContext, LocaleProvider};
use crate::model::{HostRecord, ModelSchema};
use crate::query::{Dialect, DocumentQuery, SqlQuery};
use crate::store::{
    resolve_translation_model, DocumentDatabase, DocumentTranslationStore, ModelRegistry,
    SqlTranslationStore, TranslationModel, TranslationStore,
};
use crate::translatable::Translatable;

/// Where translation records live.
#[derive(Debug, Clone)]
pub enum Backend {
    Sql { pool: AnyPool, dialect: Dialect },
    Document(DocumentDatabase),
}

impl Backend {
    pub fn dialect(&self) -> Dialect {
        match self {
            Backend::Sql { dialect, .. } => *dialect,
            Backend::Document(_) => Dialect::Document,
        }
    }
}

/// Binds host records to a configuration, a locale provider and a backend.
///
/// The translation store for each host record type and translation model is
/// resolved on first use and reused afterwards.
pub struct Translator {
    config: Arc<TranslatableConfig>,
    locale: Arc<dyn LocaleProvider>,
    backend: Backend,
    registry: ModelRegistry,
    stores: Mutex<HashMap<(String, String), Arc<dyn TranslationStore>>>,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Translator {
    pub fn new(
        config: TranslatableConfig,
        locale: Arc<dyn LocaleProvider>,
        backend: Backend,
    ) -> Self {
        Self {
            config: Arc::new(config),
            locale,
            backend,
            registry: ModelRegistry::new(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Connect to a relational database, picking the dialect from the URL.
    ///
    /// # Arguments
    /// * `url` - Connection URL, e.g. `sqlite::memory:` or `postgres://...`
    ///
    /// # Errors
    /// `UnsupportedDialect` for unknown or document schemes, or a store error
    /// if the connection fails.
    pub async fn connect(
        config: TranslatableConfig,
        locale: Arc<dyn LocaleProvider>,
        url: &str,
    ) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;
        Self::connect_with_dialect(config, locale, url, dialect).await
    }

    /// Connect with an explicit dialect.
    ///
    /// MariaDB servers are reached through `mysql://` URLs, so the scheme
    /// alone cannot select [`Dialect::MariaDb`].
    ///
    /// # Errors
    /// `UnsupportedDialect` for the document dialect, or a store error if the
    /// connection fails.
    pub async fn connect_with_dialect(
        config: TranslatableConfig,
        locale: Arc<dyn LocaleProvider>,
        url: &str,
        dialect: Dialect,
    ) -> Result<Self> {
        dialect.syntax()?;

        sqlx::any::install_default_drivers();
        let mut options = AnyPoolOptions::new();
        if url.contains(":memory:") {
            // each connection would otherwise get its own empty database
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await?;
        info!("Connected translation backend ({})", dialect);

        Ok(Self::new(config, locale, Backend::Sql { pool, dialect }))
    }

    pub fn config(&self) -> &TranslatableConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn pool(&self) -> Option<&AnyPool> {
        match &self.backend {
            Backend::Sql { pool, .. } => Some(pool),
            Backend::Document(_) => None,
        }
    }

    pub fn documents(&self) -> Option<&DocumentDatabase> {
        match &self.backend {
            Backend::Document(db) => Some(db),
            Backend::Sql { .. } => None,
        }
    }

    /// Register a custom translation model, replacing one with the same name.
    pub fn register_model(&mut self, model: TranslationModel) {
        self.registry.register(model);
        self.stores
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Table or collection holding `schema`'s translation records.
    pub fn translation_table(&self, schema: &ModelSchema) -> Result<String> {
        Ok(self.store_for(schema)?.table().to_string())
    }

    /// The translation store for `schema`'s record type.
    ///
    /// Stores are memoized by type-tag and resolved model name, so record
    /// types sharing a tag but choosing different models never share a store.
    ///
    /// # Errors
    /// `Configuration` errors when the record type's translation model is
    /// unknown or does not fit the backend.
    pub fn store_for(&self, schema: &ModelSchema) -> Result<Arc<dyn TranslationStore>> {
        let model = resolve_translation_model(&self.registry, &self.config, schema, self.dialect())?;
        let cache_key = (schema.morph_type().to_string(), model.name().to_string());

        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(store) = stores.get(&cache_key) {
            return Ok(store.clone());
        }

        let table = model.table_name(&self.config);
        let store: Arc<dyn TranslationStore> = match &self.backend {
            Backend::Sql { pool, dialect } => {
                Arc::new(SqlTranslationStore::new(pool.clone(), *dialect, table.as_str())?)
            }
            Backend::Document(db) => Arc::new(DocumentTranslationStore::new(db.collection(&table))),
        };
        debug!(
            "Resolved translation model {} ({}) for {}",
            model.name(),
            table,
            schema.morph_type()
        );

        stores.insert(cache_key, store.clone());
        Ok(store)
    }

    /// Wrap a host record for translated access.
    pub fn wrap<R: HostRecord>(&self, record: R) -> Result<Translatable<R>> {
        let store = self.store_for(record.schema())?;
        let classifier = FieldClassifier::for_model(&self.config, record.schema());
        Ok(Translatable::new(
            record,
            LocaleContext::new(self.locale.clone()),
            Arc::new(classifier),
            store,
        ))
    }

    /// A relational query over `schema`'s table with locale scopes.
    pub fn query(&self, schema: Arc<ModelSchema>) -> Result<SqlQuery> {
        let table = self.translation_table(&schema)?;
        SqlQuery::new(self.dialect(), schema, table)
    }

    /// A document query over `schema`'s collection with locale scopes.
    pub fn document_query(&self, schema: Arc<ModelSchema>) -> Result<DocumentQuery> {
        let table = self.translation_table(&schema)?;
        match &self.backend {
            Backend::Document(db) => Ok(DocumentQuery::new(schema, db.collection(&table))),
            Backend::Sql { dialect, .. } => Err(TranslatableError::UnsupportedDialect {
                driver: dialect.driver_name().to_string(),
                operation: "document queries",
                supported: "mongodb",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::locale::AppLocale;
    use crate::model::Record;
    use crate::store::{StoreKind, RELATIONAL_MODEL};

    fn posts() -> Arc<ModelSchema> {
        Arc::new(ModelSchema::new("posts").with_translatable(["title"]))
    }

    fn document_translator(config: TranslatableConfig) -> Translator {
        Translator::new(
            config,
            Arc::new(AppLocale::new("en", "en")),
            Backend::Document(DocumentDatabase::new()),
        )
    }

    // ==================== Store Resolution Tests ====================

    #[test]
    fn test_store_is_memoized_per_type() {
        let translator = document_translator(TranslatableConfig::default());
        let first = translator.store_for(&posts()).expect("store");
        let second = translator.store_for(&posts()).expect("store");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.kind(), StoreKind::Document);
        assert_eq!(first.table(), "translations");
    }

    #[test]
    fn test_wrong_model_for_backend_fails_on_wrap() {
        let config = TranslatableConfig {
            translation_model: Some(RELATIONAL_MODEL.to_string()),
            ..TranslatableConfig::default()
        };
        let translator = document_translator(config);
        let err = translator
            .wrap(Record::new(posts()).with("id", 1))
            .expect_err("relational model on document backend");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_registered_model_table() {
        let mut translator = document_translator(TranslatableConfig::default());
        translator.register_model(
            TranslationModel::new("post_i18n", StoreKind::Document).with_table("post_i18n"),
        );
        let schema = ModelSchema::new("posts")
            .with_translatable(["title"])
            .with_translation_model("post_i18n");
        assert_eq!(translator.translation_table(&schema).expect("table"), "post_i18n");
        assert_eq!(translator.store_for(&schema).expect("store").table(), "post_i18n");
    }

    #[test]
    fn test_model_override_gets_its_own_store() {
        let mut translator = document_translator(TranslatableConfig::default());
        translator.register_model(
            TranslationModel::new("custom", StoreKind::Document).with_table("post_i18n"),
        );
        let plain = posts();
        let custom = ModelSchema::new("posts")
            .with_translatable(["title"])
            .with_translation_model("custom");

        let plain_store = translator.store_for(&plain).expect("store");
        let custom_store = translator.store_for(&custom).expect("store");

        assert_eq!(plain_store.table(), "translations");
        assert_eq!(custom_store.table(), "post_i18n");
        assert_eq!(translator.translation_table(&custom).expect("table"), "post_i18n");
        assert_eq!(translator.translation_table(&plain).expect("table"), "translations");
    }

    #[tokio::test]
    async fn test_writes_and_scopes_use_the_same_table() {
        use crate::query::LocaleScopes;
        use serde_json::json;

        let db = DocumentDatabase::new();
        let hosts = db.collection("posts");
        hosts.insert(json!({"id": 1, "title": "Hello"})).expect("insert");
        let mut translator = Translator::new(
            TranslatableConfig::default(),
            Arc::new(AppLocale::new("en", "en")),
            Backend::Document(db.clone()),
        );
        translator.register_model(
            TranslationModel::new("custom", StoreKind::Document).with_table("post_i18n"),
        );

        // the plain type-tag resolves first
        translator.store_for(&posts()).expect("store");

        let custom = Arc::new(
            ModelSchema::new("posts")
                .with_translatable(["title"])
                .with_translation_model("custom"),
        );
        let mut post = translator
            .wrap(Record::new(custom.clone()).with("id", 1).with("title", "Hello"))
            .expect("wrap");
        post.set_translation("de", "title", "Hallo").expect("stage");
        post.saved().await.expect("flush");

        assert_eq!(db.collection("post_i18n").count().expect("count"), 1);
        assert_eq!(db.collection("translations").count().expect("count"), 0);

        let mut query = translator.document_query(custom).expect("query");
        query.where_locale("de", "title", "Hallo").expect("scope");
        assert_eq!(query.fetch(&hosts).expect("fetch").len(), 1);
    }

    // ==================== Query Construction Tests ====================

    #[test]
    fn test_document_backend_queries() {
        let translator = document_translator(TranslatableConfig::default());
        assert!(translator.document_query(posts()).is_ok());
        let err = translator.query(posts()).expect_err("no SQL on documents");
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
        assert!(translator.pool().is_none());
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let translator = Translator::connect(
            TranslatableConfig::default(),
            Arc::new(AppLocale::new("en", "en")),
            "sqlite::memory:",
        )
        .await
        .expect("connect");

        assert_eq!(translator.dialect(), Dialect::Sqlite);
        assert!(translator.pool().is_some());
        assert!(translator.query(posts()).is_ok());
        let err = translator.document_query(posts()).expect_err("no documents on SQL");
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }

    #[tokio::test]
    async fn test_connect_with_explicit_dialect() {
        let translator = Translator::connect_with_dialect(
            TranslatableConfig::default(),
            Arc::new(AppLocale::new("en", "en")),
            "sqlite::memory:",
            Dialect::Sqlite,
        )
        .await
        .expect("connect");
        assert_eq!(translator.dialect(), Dialect::Sqlite);

        let err = Translator::connect_with_dialect(
            TranslatableConfig::default(),
            Arc::new(AppLocale::new("en", "en")),
            "sqlite::memory:",
            Dialect::Document,
        )
        .await
        .expect_err("document dialect has no pool");
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = Translator::connect(
            TranslatableConfig::default(),
            Arc::new(AppLocale::new("en", "en")),
            "mssql://localhost/app",
        )
        .await
        .expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }
}
