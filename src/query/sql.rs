use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Row};
use tracing::debug;

use crate::error::{Result, TranslatableError};
use crate::model::{ModelSchema, Record, RecordKey};
use crate::query::{
    bind_values, ensure_orderable, Condition, Dialect, Direction, LocaleScopes, SqlFragment,
    SqlSyntax, SqlValue,
};

/// Host record query with translation-aware scopes.
///
/// Renders `SELECT host.* FROM host [JOIN ...] [WHERE ...] [ORDER BY ...]`.
/// Every join against the translation table gets its own alias so scopes can
/// be combined freely.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    dialect: Dialect,
    syntax: &'static dyn SqlSyntax,
    schema: Arc<ModelSchema>,
    translations: String,
    joins: Vec<SqlFragment>,
    wheres: Vec<SqlFragment>,
    orders: Vec<SqlFragment>,
    limit: Option<u64>,
    aliases: usize,
}

impl SqlQuery {
    /// Start a query over `schema`'s table.
    ///
    /// # Arguments
    /// * `dialect` - Relational dialect of the connection
    /// * `schema` - Host record type being queried
    /// * `translations` - Translation table for this record type
    ///
    /// # Errors
    /// `UnsupportedDialect` for the document dialect.
    pub fn new(dialect: Dialect, schema: Arc<ModelSchema>, translations: impl Into<String>) -> Result<Self> {
        Ok(Self {
            dialect,
            syntax: dialect.syntax()?,
            schema,
            translations: translations.into(),
            joins: Vec::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
            aliases: 0,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Plain equality on a host column.
    pub fn where_eq(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        let mut condition = SqlFragment::raw(format!("{} = ", self.host_column(column)));
        condition.bind(value);
        self.wheres.push(condition);
        self
    }

    /// Order by a host column.
    pub fn order_by(&mut self, column: &str, direction: &str) -> &mut Self {
        self.orders.push(SqlFragment::raw(format!(
            "{} {}",
            self.host_column(column),
            Direction::parse(direction).as_sql()
        )));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    fn host_column(&self, column: &str) -> String {
        self.syntax.qualify(self.schema.table(), column)
    }

    fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("tr_{}", self.aliases)
    }

    /// `alias.model_id = host.pk AND alias.model_type = ? AND alias.locale = ?`
    fn correlate(&self, alias: &str, locale: &str) -> SqlFragment {
        let mut fragment = SqlFragment::raw(format!(
            "{} = {} AND {} = ",
            self.syntax.qualify(alias, "model_id"),
            self.host_column(self.schema.primary_key()),
            self.syntax.qualify(alias, "model_type"),
        ));
        fragment
            .bind(self.schema.morph_type())
            .push(&format!(" AND {} = ", self.syntax.qualify(alias, "locale")))
            .bind(locale);
        fragment
    }

    fn exists(&mut self, locale: &str, condition: Option<SqlFragment>) {
        let alias = self.next_alias();
        let mut sub = SqlFragment::raw(format!(
            "EXISTS (SELECT 1 FROM {} AS {} WHERE ",
            self.syntax.quote_ident(&self.translations),
            self.syntax.quote_ident(&alias)
        ));
        sub.append(self.correlate(&alias, locale));
        if let Some(condition) = condition {
            sub.push(" AND ").append(condition);
        }
        sub.push(")");
        self.wheres.push(sub);
    }

    fn left_join(&mut self, locale: &str) -> String {
        let alias = self.next_alias();
        let mut join = SqlFragment::raw(format!(
            " LEFT JOIN {} AS {} ON ",
            self.syntax.quote_ident(&self.translations),
            self.syntax.quote_ident(&alias)
        ));
        join.append(self.correlate(&alias, locale));
        self.joins.push(join);
        alias
    }

    /// Render the statement and its bind values.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut statement = SqlFragment::raw(format!(
            "SELECT {}.* FROM {}",
            self.syntax.quote_ident(self.schema.table()),
            self.syntax.quote_ident(self.schema.table())
        ));
        for join in &self.joins {
            statement.append(join.clone());
        }
        for (i, condition) in self.wheres.iter().enumerate() {
            statement.push(if i == 0 { " WHERE " } else { " AND " });
            statement.append(condition.clone());
        }
        for (i, order) in self.orders.iter().enumerate() {
            statement.push(if i == 0 { " ORDER BY " } else { ", " });
            statement.append(order.clone());
        }
        if let Some(limit) = self.limit {
            statement.push(&format!(" LIMIT {}", limit));
        }

        let mut binds = Vec::new();
        let sql = statement.render(self.syntax, &mut binds);
        (sql, binds)
    }

    pub async fn fetch_all(&self, pool: &AnyPool) -> Result<Vec<AnyRow>> {
        let (sql, binds) = self.to_sql();
        debug!("Locale query: {}", sql);
        let rows = bind_values(sqlx::query(&sql), &binds).fetch_all(pool).await?;
        Ok(rows)
    }

    /// Fetch rows as [`Record`]s of this query's schema.
    pub async fn fetch_records(&self, pool: &AnyPool) -> Result<Vec<Record>> {
        let rows = self.fetch_all(pool).await?;
        rows.iter()
            .map(|row| -> Result<Record> {
                Ok(Record::from_attributes(self.schema.clone(), row_attributes(row)?))
            })
            .collect()
    }

    /// Primary keys of the matching records, in query order.
    pub async fn pluck_keys(&self, pool: &AnyPool) -> Result<Vec<RecordKey>> {
        let pk = self.schema.primary_key();
        self.fetch_all(pool)
            .await?
            .iter()
            .map(|row| -> Result<RecordKey> {
                match row.try_get::<i64, _>(pk) {
                    Ok(id) => Ok(RecordKey::Int(id)),
                    Err(_) => Ok(RecordKey::Text(row.try_get::<String, _>(pk)?)),
                }
            })
            .collect()
    }

    /// One text column of the matching records, in query order.
    pub async fn pluck_text(&self, pool: &AnyPool, column: &str) -> Result<Vec<String>> {
        self.fetch_all(pool)
            .await?
            .iter()
            .map(|row| -> Result<String> { Ok(row.try_get::<String, _>(column)?) })
            .collect()
    }
}

/// Decode a row into JSON attributes: integers, then floats, then text.
fn row_attributes(row: &AnyRow) -> Result<Map<String, Value>> {
    let mut attributes = Map::new();
    for column in row.columns() {
        let name = column.name();
        let i = column.ordinal();
        let value = match row.try_get::<Option<i64>, _>(i) {
            Ok(Some(n)) => Value::from(n),
            Ok(None) => Value::Null,
            Err(_) => match row.try_get::<f64, _>(i) {
                Ok(n) => Value::from(n),
                Err(_) => Value::from(row.try_get::<String, _>(i)?),
            },
        };
        attributes.insert(name.to_string(), value);
    }
    Ok(attributes)
}

impl LocaleScopes for SqlQuery {
    fn where_locale(&mut self, locale: &str, key: &str, value: &str) -> Result<&mut Self> {
        let alias = format!("tr_{}", self.aliases + 1);
        let column = self.syntax.qualify(&alias, "strings");
        let condition = match self.dialect.json().build_equality(&column, key, value)? {
            Condition::Sql(fragment) => fragment,
            Condition::Document(_) => {
                return Err(TranslatableError::UnsupportedDialect {
                    driver: self.dialect.driver_name().to_string(),
                    operation: "where_locale",
                    supported: "mysql, mariadb, pgsql, sqlite",
                })
            }
        };
        self.exists(locale, Some(condition));
        Ok(self)
    }

    fn where_has_locale(&mut self, locale: &str) -> Result<&mut Self> {
        self.exists(locale, None);
        Ok(self)
    }

    fn where_missing_locale(&mut self, locale: &str) -> Result<&mut Self> {
        let alias = self.left_join(locale);
        self.wheres.push(SqlFragment::raw(format!(
            "{} IS NULL",
            self.syntax.qualify(&alias, "model_id")
        )));
        Ok(self)
    }

    fn order_by_locale(&mut self, locale: &str, key: &str, direction: &str) -> Result<&mut Self> {
        let alias = format!("tr_{}", self.aliases + 1);
        let column = self.syntax.qualify(&alias, "strings");
        let json = self.dialect.json();
        ensure_orderable(json, &column, key)?;
        let mut order = json.build_order(&column, key, &self.host_column(key))?;
        self.left_join(locale);
        order.push(" ").push(Direction::parse(direction).as_sql());
        self.orders.push(order);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn posts() -> Arc<ModelSchema> {
        Arc::new(ModelSchema::new("posts").with_translatable(["title"]))
    }

    fn query(dialect: Dialect) -> SqlQuery {
        SqlQuery::new(dialect, posts(), "translations").expect("relational dialect")
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn test_plain_select() {
        let (sql, binds) = query(Dialect::Sqlite).to_sql();
        assert_eq!(sql, "SELECT \"posts\".* FROM \"posts\"");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_document_dialect_rejected() {
        let err = SqlQuery::new(Dialect::Document, posts(), "translations")
            .expect_err("no SQL for documents");
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }

    #[test]
    fn test_where_locale_sqlite() {
        let mut q = query(Dialect::Sqlite);
        q.where_locale("de", "title", "Hallo").expect("scope");
        let (sql, binds) = q.to_sql();
        assert_eq!(
            sql,
            "SELECT \"posts\".* FROM \"posts\" WHERE EXISTS (SELECT 1 FROM \"translations\" AS \"tr_1\" \
             WHERE \"tr_1\".\"model_id\" = \"posts\".\"id\" AND \"tr_1\".\"model_type\" = ? \
             AND \"tr_1\".\"locale\" = ? AND json_extract(\"tr_1\".\"strings\", ?) = ?)"
        );
        assert_eq!(
            binds,
            vec![
                SqlValue::from("posts"),
                SqlValue::from("de"),
                SqlValue::from("$.\"title\""),
                SqlValue::from("Hallo"),
            ]
        );
    }

    #[test]
    fn test_where_locale_postgres_numbering() {
        let mut q = query(Dialect::Postgres);
        q.where_eq("status", "live");
        q.where_locale("de", "title", "Hallo").expect("scope");
        let (sql, binds) = q.to_sql();
        assert!(sql.contains("\"posts\".\"status\" = $1"));
        assert!(sql.contains("\"tr_1\".\"model_type\" = $2"));
        assert!(sql.contains("(\"tr_1\".\"strings\"->>$4) = $5"));
        assert_eq!(binds.len(), 5);
    }

    #[test]
    fn test_where_locale_mysql_quoting() {
        let mut q = query(Dialect::MySql);
        q.where_locale("de", "title", "Hallo").expect("scope");
        let (sql, _) = q.to_sql();
        assert!(sql.starts_with("SELECT `posts`.* FROM `posts` WHERE EXISTS"));
        assert!(sql.contains("JSON_UNQUOTE(JSON_EXTRACT(`tr_1`.`strings`, ?)) END = ?"));
    }

    #[test]
    fn test_where_locale_empty_key() {
        let mut q = query(Dialect::Sqlite);
        let err = q.where_locale("de", "", "x").expect_err("empty key");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(q.to_sql().0, "SELECT \"posts\".* FROM \"posts\"");
    }

    #[test]
    fn test_where_has_locale() {
        let mut q = query(Dialect::Sqlite);
        q.where_has_locale("fr").expect("scope");
        let (sql, binds) = q.to_sql();
        assert!(sql.contains("WHERE EXISTS (SELECT 1 FROM \"translations\" AS \"tr_1\""));
        assert!(sql.ends_with("\"tr_1\".\"locale\" = ?)"));
        assert_eq!(binds, vec![SqlValue::from("posts"), SqlValue::from("fr")]);
    }

    #[test]
    fn test_where_missing_locale_uses_outer_join() {
        let mut q = query(Dialect::Sqlite);
        q.where_doesnt_have_locale("fr").expect("scope");
        let (sql, _) = q.to_sql();
        assert_eq!(
            sql,
            "SELECT \"posts\".* FROM \"posts\" LEFT JOIN \"translations\" AS \"tr_1\" \
             ON \"tr_1\".\"model_id\" = \"posts\".\"id\" AND \"tr_1\".\"model_type\" = ? \
             AND \"tr_1\".\"locale\" = ? WHERE \"tr_1\".\"model_id\" IS NULL"
        );
    }

    #[test]
    fn test_order_by_locale() {
        let mut q = query(Dialect::Sqlite);
        q.order_by_locale("de", "title", "desc").expect("scope");
        let (sql, binds) = q.to_sql();
        assert!(sql.contains("LEFT JOIN \"translations\" AS \"tr_1\""));
        assert!(sql.ends_with(
            "ORDER BY COALESCE(json_extract(\"tr_1\".\"strings\", ?), \"posts\".\"title\") DESC"
        ));
        // join binds come before the ORDER BY path
        assert_eq!(binds[2], SqlValue::from("$.\"title\""));
    }

    #[test]
    fn test_order_by_locale_empty_key() {
        let mut q = query(Dialect::Postgres);
        let err = q.order_by_locale("de", "", "ASC").expect_err("empty key");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // a rejected ordering leaves the query untouched
        let (sql, binds) = q.to_sql();
        assert_eq!(sql, "SELECT \"posts\".* FROM \"posts\"");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_mysql_order_by_locale_ignores_json_null() {
        let mut q = query(Dialect::MySql);
        q.order_by_locale("de", "title", "ASC").expect("scope");
        let (sql, binds) = q.to_sql();
        assert!(sql.ends_with(
            "ORDER BY COALESCE(CASE WHEN JSON_TYPE(JSON_EXTRACT(`tr_1`.`strings`, ?)) = 'NULL' \
             THEN NULL ELSE JSON_UNQUOTE(JSON_EXTRACT(`tr_1`.`strings`, ?)) END, `posts`.`title`) ASC"
        ));
        assert_eq!(binds.len(), 4);
    }

    #[test]
    fn test_combined_scopes_use_distinct_aliases() {
        let mut q = query(Dialect::Sqlite);
        q.where_has_locale("de")
            .and_then(|q| q.where_missing_locale("fr"))
            .and_then(|q| q.order_by_locale("de", "title", "ASC"))
            .expect("scopes");
        q.limit(10);
        let (sql, _) = q.to_sql();
        assert!(sql.contains("\"tr_1\""));
        assert!(sql.contains("\"tr_2\""));
        assert!(sql.contains("\"tr_3\""));
        assert!(sql.ends_with("LIMIT 10"));
    }
}
