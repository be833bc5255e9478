use std::sync::Arc;

use anyhow::{Context, Result};
use record_translatable::{
    AppLocale, Dialect, LocaleScopes, ModelSchema, Record, TranslatableConfig, Translator,
};
use sqlx::AnyPool;
use tracing::info;

const DEMO_POSTS: &[(i64, &str, Option<&str>)] = &[
    (1, "B-en", None),
    (2, "C-en", Some("Apfel")),
    (3, "A-en", Some("Zebra")),
];

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("record_translatable=info".parse()?),
        )
        .init();

    let config = TranslatableConfig::from_env().context("Invalid translatable configuration")?;
    let locale = Arc::new(AppLocale::from_config(&config));
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    info!("Starting translation demo (base locale {})", config.fallback_locale);
    // MariaDB shares the mysql:// scheme, so its dialect is picked explicitly
    let translator = match std::env::var("DATABASE_DRIVER") {
        Ok(driver) => {
            let dialect = Dialect::from_driver(&driver).context("Invalid DATABASE_DRIVER")?;
            Translator::connect_with_dialect(config, locale, &url, dialect).await
        }
        Err(_) => Translator::connect(config, locale, &url).await,
    }
    .context("Failed to connect to DATABASE_URL")?;
    let pool = translator
        .pool()
        .context("Demo needs a relational backend")?
        .clone();
    let dialect = translator.dialect();

    create_tables(&pool, dialect, &translator.config().table).await?;

    let schema = Arc::new(ModelSchema::new("posts").with_translatable(["title"]));
    let syntax = dialect.syntax()?;

    for &(id, title, german) in DEMO_POSTS {
        let insert = format!(
            "INSERT INTO posts (id, title) VALUES ({}, {})",
            syntax.placeholder(1),
            syntax.placeholder(2)
        );
        sqlx::query(&insert)
            .bind(id)
            .bind(title)
            .execute(&pool)
            .await
            .context("Failed to insert demo post")?;

        let mut post = translator.wrap(Record::new(schema.clone()).with("id", id).with("title", title))?;
        if let Some(german) = german {
            post.set_translation("de", "title", german)?;
        }
        post.saved().await?;

        let base = post.get_translation("en", "title", true).await?;
        let translated = post.get_translation("de", "title", true).await?;
        info!("Post {}: en={:?} de={:?}", id, base, translated);
    }

    let mut ordered = translator.query(schema.clone())?;
    ordered.order_by_locale("de", "title", "ASC")?;
    let titles = ordered.pluck_text(&pool, "title").await?;
    info!("Posts ordered by German title: {:?}", titles);

    let mut missing = translator.query(schema)?;
    missing.where_missing_locale("de")?;
    let untranslated = missing.pluck_text(&pool, "title").await?;
    info!("Posts without a German title: {:?}", untranslated);

    Ok(())
}

async fn create_tables(pool: &AnyPool, dialect: Dialect, translations: &str) -> Result<()> {
    let (id_column, json_column) = match dialect {
        Dialect::Postgres => ("BIGINT PRIMARY KEY", "JSONB"),
        Dialect::MySql | Dialect::MariaDb => ("BIGINT PRIMARY KEY", "JSON"),
        _ => ("INTEGER PRIMARY KEY", "TEXT"),
    };
    let serial = match dialect {
        Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
        Dialect::MySql | Dialect::MariaDb => "BIGINT AUTO_INCREMENT PRIMARY KEY",
        _ => "INTEGER PRIMARY KEY AUTOINCREMENT",
    };

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS posts (id {}, title VARCHAR(255) NOT NULL)",
            id_column
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id {},
                locale VARCHAR(16) NOT NULL,
                model_id BIGINT NOT NULL,
                model_type VARCHAR(255) NOT NULL,
                strings {} NOT NULL,
                created_at VARCHAR(64) NOT NULL,
                updated_at VARCHAR(64) NOT NULL
            )",
            translations, serial, json_column
        ),
    ];

    for statement in statements {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .context("Failed to create demo tables")?;
    }
    Ok(())
}
