//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use record_translatable::store::{DocumentCollection, DocumentDatabase};
use record_translatable::{
    AppLocale, Backend, ModelSchema, Record, TranslatableConfig, Translatable, Translator,
};
use serde_json::{json, Value};
use sqlx::{AnyPool, Row};

pub const POSTS_DDL: &str = "CREATE TABLE posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    meta TEXT,
    options TEXT
)";

pub const TRANSLATIONS_DDL: &str = "CREATE TABLE translations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    locale TEXT NOT NULL,
    model_id INTEGER NOT NULL,
    model_type TEXT NOT NULL,
    strings TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

pub const TRANSLATIONS_INDEX: &str =
    "CREATE INDEX translations_lookup ON translations (model_id, model_type, locale)";

/// The post fixture: `title` and `meta` translatable, `meta` and `options` cast as arrays.
pub fn posts_schema() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::new("posts")
            .with_translatable(["title", "meta"])
            .with_cast("meta", "array")
            .with_cast("options", "array"),
    )
}

/// A relational test environment on in-memory SQLite.
pub struct SqlEnv {
    pub translator: Translator,
    pub locale: Arc<AppLocale>,
    pub pool: AnyPool,
    pub schema: Arc<ModelSchema>,
}

impl SqlEnv {
    pub async fn new() -> Self {
        Self::with_url("sqlite::memory:").await
    }

    pub async fn with_url(url: &str) -> Self {
        let locale = Arc::new(AppLocale::new("en", "en"));
        let translator = Translator::connect(TranslatableConfig::default(), locale.clone(), url)
            .await
            .expect("Failed to connect test database");
        let pool = translator.pool().expect("relational backend").clone();

        for ddl in [POSTS_DDL, TRANSLATIONS_DDL, TRANSLATIONS_INDEX] {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .expect("Failed to create test schema");
        }

        Self {
            translator,
            locale,
            pool,
            schema: posts_schema(),
        }
    }

    /// Insert a post row and wrap it, as the host ORM would after `create`.
    pub async fn create_post(&self, title: &str) -> Translatable<Record> {
        let row = sqlx::query("INSERT INTO posts (title) VALUES (?) RETURNING id")
            .bind(title.to_string())
            .fetch_one(&self.pool)
            .await
            .expect("Failed to insert post");
        let id: i64 = row.try_get("id").expect("id column");

        let record = Record::new(self.schema.clone()).with("id", id).with("title", title);
        self.translator.wrap(record).expect("Failed to wrap post")
    }

    pub async fn translation_rows(&self) -> i64 {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM translations")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count translations");
        row.try_get("n").expect("count column")
    }
}

/// A document-store test environment.
pub struct DocumentEnv {
    pub translator: Translator,
    pub locale: Arc<AppLocale>,
    pub hosts: Arc<DocumentCollection>,
    pub schema: Arc<ModelSchema>,
}

impl DocumentEnv {
    pub fn new() -> Self {
        let db = DocumentDatabase::new();
        let hosts = db.collection("posts");
        let locale = Arc::new(AppLocale::new("en", "en"));
        let translator = Translator::new(
            TranslatableConfig::default(),
            locale.clone(),
            Backend::Document(db),
        );

        Self {
            translator,
            locale,
            hosts,
            schema: posts_schema(),
        }
    }

    pub fn create_post(&self, title: &str) -> Translatable<Record> {
        let id = self.hosts.count().expect("count") as i64 + 1;
        self.hosts
            .insert(json!({"id": id, "title": title}))
            .expect("Failed to insert post");

        let record = Record::new(self.schema.clone()).with("id", id).with("title", title);
        self.translator.wrap(record).expect("Failed to wrap post")
    }
}

pub fn ids(posts: &[&Translatable<Record>]) -> Vec<Value> {
    posts
        .iter()
        .map(|p| {
            record_translatable::HostRecord::raw_attribute(p.record(), "id")
                .cloned()
                .expect("post has an id")
        })
        .collect()
}
