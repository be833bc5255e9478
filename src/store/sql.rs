use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use tracing::debug;

use crate::error::{Result, TranslatableError};
use crate::model::RecordKey;
use crate::query::{bind_values, Dialect, SqlFragment, SqlSyntax};
use crate::store::{StoreKind, TranslationRecord, TranslationStore};

/// Translation records in a relational table.
///
/// Expected columns: `locale`, `model_id`, `model_type`, `strings` (JSON),
/// `created_at`, `updated_at` (RFC 3339 text). Rows are addressed by the
/// `(model_id, model_type, locale)` triple.
#[derive(Debug, Clone)]
pub struct SqlTranslationStore {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
}

impl SqlTranslationStore {
    /// # Errors
    /// `UnsupportedDialect` when `dialect` is the document dialect.
    pub fn new(pool: AnyPool, dialect: Dialect, table: impl Into<String>) -> Result<Self> {
        dialect.syntax()?;
        Ok(Self {
            pool,
            dialect,
            table: table.into(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn syntax(&self) -> Result<&'static dyn SqlSyntax> {
        self.dialect.syntax()
    }

    /// `WHERE model_id = ? AND model_type = ? [AND locale = ?]`
    fn key_filter(model_id: &RecordKey, model_type: &str, locale: Option<&str>) -> SqlFragment {
        let mut filter = SqlFragment::raw(" WHERE model_id = ");
        filter.bind(model_id).push(" AND model_type = ").bind(model_type);
        if let Some(locale) = locale {
            filter.push(" AND locale = ").bind(locale);
        }
        filter
    }

    fn select(&self, syntax: &dyn SqlSyntax) -> SqlFragment {
        SqlFragment::raw(format!(
            "SELECT locale, model_id, model_type, {} AS strings, created_at, updated_at FROM {}",
            syntax.json_select("strings"),
            syntax.quote_ident(&self.table)
        ))
    }

    async fn fetch(&self, fragment: SqlFragment) -> Result<Vec<TranslationRecord>> {
        let syntax = self.syntax()?;
        let mut binds = Vec::new();
        let sql = fragment.render(syntax, &mut binds);

        let rows = bind_values(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn execute(&self, fragment: SqlFragment) -> Result<u64> {
        let syntax = self.syntax()?;
        let mut binds = Vec::new();
        let sql = fragment.render(syntax, &mut binds);

        let result = bind_values(sqlx::query(&sql), &binds)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TranslationStore for SqlTranslationStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn find(
        &self,
        model_id: &RecordKey,
        model_type: &str,
        locale: &str,
    ) -> Result<Option<TranslationRecord>> {
        let mut query = self.select(self.syntax()?);
        query
            .append(Self::key_filter(model_id, model_type, Some(locale)))
            .push(" LIMIT 1");

        let record = self.fetch(query).await?.into_iter().next();
        debug!(
            "Translation lookup {}:{}:{} -> {}",
            locale,
            model_id,
            model_type,
            if record.is_some() { "found" } else { "absent" }
        );
        Ok(record)
    }

    async fn save(&self, record: &mut TranslationRecord) -> Result<()> {
        let syntax = self.syntax()?;
        let payload = serde_json::to_string(&record.strings)?;
        record.updated_at = Utc::now();
        let updated_at = record.updated_at.to_rfc3339();

        let statement = if record.exists() {
            let mut update = SqlFragment::raw(format!(
                "UPDATE {} SET strings = ",
                syntax.quote_ident(&self.table)
            ));
            update
                .bind(payload)
                .push(syntax.json_param_suffix())
                .push(", updated_at = ")
                .bind(updated_at)
                .append(Self::key_filter(
                    &record.model_id,
                    &record.model_type,
                    Some(&record.locale),
                ));
            update
        } else {
            let mut insert = SqlFragment::raw(format!(
                "INSERT INTO {} (locale, model_id, model_type, strings, created_at, updated_at) VALUES (",
                syntax.quote_ident(&self.table)
            ));
            insert
                .bind(record.locale.as_str())
                .push(", ")
                .bind(&record.model_id)
                .push(", ")
                .bind(record.model_type.as_str())
                .push(", ")
                .bind(payload)
                .push(syntax.json_param_suffix())
                .push(", ")
                .bind(record.created_at.to_rfc3339())
                .push(", ")
                .bind(updated_at)
                .push(")");
            insert
        };

        self.execute(statement).await?;
        record.mark_persisted();
        debug!(
            "Saved translation {}:{}:{} ({} keys)",
            record.locale,
            record.model_id,
            record.model_type,
            record.strings.len()
        );
        Ok(())
    }

    async fn delete(&self, record: &TranslationRecord) -> Result<()> {
        if !record.exists() {
            return Ok(());
        }

        let syntax = self.syntax()?;
        let mut statement =
            SqlFragment::raw(format!("DELETE FROM {}", syntax.quote_ident(&self.table)));
        statement.append(Self::key_filter(
            &record.model_id,
            &record.model_type,
            Some(&record.locale),
        ));

        let removed = self.execute(statement).await?;
        debug!(
            "Deleted translation {}:{}:{} ({} rows)",
            record.locale, record.model_id, record.model_type, removed
        );
        Ok(())
    }

    async fn for_model(
        &self,
        model_id: &RecordKey,
        model_type: &str,
    ) -> Result<Vec<TranslationRecord>> {
        let mut query = self.select(self.syntax()?);
        query
            .append(Self::key_filter(model_id, model_type, None))
            .push(" ORDER BY locale");
        self.fetch(query).await
    }
}

fn record_from_row(row: &AnyRow) -> Result<TranslationRecord> {
    let model_id = match row.try_get::<i64, _>("model_id") {
        Ok(id) => RecordKey::Int(id),
        Err(_) => RecordKey::Text(row.try_get::<String, _>("model_id")?),
    };

    let strings: String = row.try_get("strings")?;
    let strings: Option<Map<String, Value>> = serde_json::from_str(&strings)?;

    let mut record = TranslationRecord::new(
        &row.try_get::<String, _>("locale")?,
        model_id,
        &row.try_get::<String, _>("model_type")?,
    );
    record.strings = strings.unwrap_or_default();
    record.created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
    record.updated_at = parse_timestamp(&row.try_get::<String, _>("updated_at")?)?;
    record.mark_persisted();
    Ok(record)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TranslatableError::InvalidTimestamp(value.to_string()))
}
