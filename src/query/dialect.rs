//! Per-backend query strategies.
//!
//! [`JsonDialect`] is the strategy every backend implements for locale-aware
//! filtering and sorting. Relational backends additionally implement
//! [`SqlSyntax`] for placeholders, identifier quoting and JSON extraction.

use std::fmt;

use serde_json::{json, Value};

use crate::error::{Result, TranslatableError};
use crate::query::{Condition, SqlFragment};

const SUPPORTED_DRIVERS: &str = "mysql, mariadb, pgsql, sqlite, mongodb";
const ORDERABLE_DRIVERS: &str = "mysql, mariadb, pgsql, sqlite";

/// Storage dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    MariaDb,
    Postgres,
    Sqlite,
    Document,
}

impl Dialect {
    /// Map a driver name to a dialect.
    ///
    /// # Errors
    /// `UnsupportedDialect` for drivers with no JSON expression support.
    pub fn from_driver(driver: &str) -> Result<Self> {
        match driver.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "mongodb" | "document" => Ok(Dialect::Document),
            _ => Err(TranslatableError::UnsupportedDialect {
                driver: driver.to_string(),
                operation: "JSON queries",
                supported: SUPPORTED_DRIVERS,
            }),
        }
    }

    /// Infer the dialect from a connection URL scheme (`sqlite::memory:`, `postgres://...`).
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        Self::from_driver(scheme)
    }

    pub fn driver_name(&self) -> &'static str {
        self.json().driver()
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Dialect::Document)
    }

    /// The JSON query strategy for this dialect.
    pub fn json(&self) -> &'static dyn JsonDialect {
        match self {
            Dialect::MySql => &MySql,
            Dialect::MariaDb => &MariaDb,
            Dialect::Postgres => &Postgres,
            Dialect::Sqlite => &Sqlite,
            Dialect::Document => &DocumentJson,
        }
    }

    /// SQL syntax rules; only relational dialects have them.
    pub fn syntax(&self) -> Result<&'static dyn SqlSyntax> {
        match self {
            Dialect::MySql => Ok(&MySql),
            Dialect::MariaDb => Ok(&MariaDb),
            Dialect::Postgres => Ok(&Postgres),
            Dialect::Sqlite => Ok(&Sqlite),
            Dialect::Document => Err(TranslatableError::UnsupportedDialect {
                driver: self.driver_name().to_string(),
                operation: "SQL queries",
                supported: ORDERABLE_DRIVERS,
            }),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

/// Locale-aware expression builder implemented once per backend.
pub trait JsonDialect: Send + Sync + fmt::Debug {
    fn driver(&self) -> &'static str;

    /// Condition matching rows whose JSON `column` holds `value` under `key`.
    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition>;

    /// `COALESCE(<column JSON value under key>, <fallback>)` for ordering.
    fn build_order(&self, column: &str, key: &str, fallback: &str) -> Result<SqlFragment>;

    fn supports_order_by(&self) -> bool;
}

/// Relational syntax rules.
pub trait SqlSyntax: Send + Sync + fmt::Debug {
    /// Bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn qualify(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.quote_ident(table), self.quote_ident(column))
    }

    /// JSON path addressing a top-level `key`, bound as a parameter.
    fn json_path(&self, key: &str) -> String {
        format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
    }

    /// Unquoted scalar extraction of `key` from the JSON `column`.
    fn extract_text(&self, column: &str, key: &str) -> SqlFragment;

    /// Appended to a bound JSON document parameter.
    fn json_param_suffix(&self) -> &'static str {
        ""
    }

    /// Expression selecting a JSON column as text.
    fn json_select(&self, column: &str) -> String {
        column.to_string()
    }
}

fn ensure_key(key: &str, column: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TranslatableError::EmptyKey(format!("\"{}\"", column)));
    }
    Ok(())
}

fn unorderable(json: &dyn JsonDialect) -> TranslatableError {
    TranslatableError::UnsupportedDialect {
        driver: json.driver().to_string(),
        operation: "order_by_locale",
        supported: ORDERABLE_DRIVERS,
    }
}

/// Check an `order_by_locale` request before any expression is built.
///
/// # Errors
/// * `EmptyKey` for an empty JSON key
/// * `UnsupportedDialect` when the dialect cannot order by translations
pub fn ensure_orderable(json: &dyn JsonDialect, column: &str, key: &str) -> Result<()> {
    ensure_key(key, column)?;
    if json.supports_order_by() {
        Ok(())
    } else {
        Err(unorderable(json))
    }
}

fn sql_equality(syntax: &dyn SqlSyntax, column: &str, key: &str, value: &str) -> Result<Condition> {
    ensure_key(key, column)?;
    let mut fragment = syntax.extract_text(column, key);
    fragment.push(" = ").bind(value);
    Ok(Condition::Sql(fragment))
}

fn sql_order(syntax: &dyn SqlSyntax, column: &str, key: &str, fallback: &str) -> Result<SqlFragment> {
    ensure_key(key, column)?;
    let mut fragment = SqlFragment::raw("COALESCE(");
    fragment
        .append(syntax.extract_text(column, key))
        .push(", ")
        .push(fallback)
        .push(")");
    Ok(fragment)
}

/// MySQL: `JSON_UNQUOTE(JSON_EXTRACT(col, '$."key"'))`.
///
/// `JSON_UNQUOTE` turns a JSON `null` into the string `'null'`, so a null
/// value is mapped to SQL `NULL` first, as SQLite and PostgreSQL do.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlSyntax for MySql {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn extract_text(&self, column: &str, key: &str) -> SqlFragment {
        let mut fragment =
            SqlFragment::raw(format!("CASE WHEN JSON_TYPE(JSON_EXTRACT({}, ", column));
        fragment
            .bind(self.json_path(key))
            .push(&format!(
                ")) = 'NULL' THEN NULL ELSE JSON_UNQUOTE(JSON_EXTRACT({}, ",
                column
            ))
            .bind(self.json_path(key))
            .push(")) END");
        fragment
    }

    fn json_select(&self, column: &str) -> String {
        format!("CAST({} AS CHAR)", column)
    }
}

impl JsonDialect for MySql {
    fn driver(&self) -> &'static str {
        "mysql"
    }

    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition> {
        sql_equality(self, column, key, value)
    }

    fn build_order(&self, column: &str, key: &str, fallback: &str) -> Result<SqlFragment> {
        sql_order(self, column, key, fallback)
    }

    fn supports_order_by(&self) -> bool {
        true
    }
}

/// MariaDB stores JSON as text; extraction matches MySQL.
#[derive(Debug, Clone, Copy)]
pub struct MariaDb;

impl SqlSyntax for MariaDb {
    fn quote_ident(&self, ident: &str) -> String {
        MySql.quote_ident(ident)
    }

    fn extract_text(&self, column: &str, key: &str) -> SqlFragment {
        MySql.extract_text(column, key)
    }

    fn json_select(&self, column: &str) -> String {
        MySql.json_select(column)
    }
}

impl JsonDialect for MariaDb {
    fn driver(&self) -> &'static str {
        "mariadb"
    }

    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition> {
        sql_equality(self, column, key, value)
    }

    fn build_order(&self, column: &str, key: &str, fallback: &str) -> Result<SqlFragment> {
        sql_order(self, column, key, fallback)
    }

    fn supports_order_by(&self) -> bool {
        true
    }
}

/// PostgreSQL: `(col->>'key')` on a `jsonb` column.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlSyntax for Postgres {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn json_path(&self, key: &str) -> String {
        key.to_string()
    }

    fn extract_text(&self, column: &str, key: &str) -> SqlFragment {
        let mut fragment = SqlFragment::raw(format!("({}->>", column));
        fragment.bind(self.json_path(key)).push(")");
        fragment
    }

    fn json_param_suffix(&self) -> &'static str {
        "::jsonb"
    }

    fn json_select(&self, column: &str) -> String {
        format!("{}::text", column)
    }
}

impl JsonDialect for Postgres {
    fn driver(&self) -> &'static str {
        "pgsql"
    }

    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition> {
        sql_equality(self, column, key, value)
    }

    fn build_order(&self, column: &str, key: &str, fallback: &str) -> Result<SqlFragment> {
        sql_order(self, column, key, fallback)
    }

    fn supports_order_by(&self) -> bool {
        true
    }
}

/// SQLite: `json_extract(col, '$."key"')`, which already unquotes scalars.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlSyntax for Sqlite {
    fn extract_text(&self, column: &str, key: &str) -> SqlFragment {
        let mut fragment = SqlFragment::raw(format!("json_extract({}, ", column));
        fragment.bind(self.json_path(key)).push(")");
        fragment
    }
}

impl JsonDialect for Sqlite {
    fn driver(&self) -> &'static str {
        "sqlite"
    }

    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition> {
        sql_equality(self, column, key, value)
    }

    fn build_order(&self, column: &str, key: &str, fallback: &str) -> Result<SqlFragment> {
        sql_order(self, column, key, fallback)
    }

    fn supports_order_by(&self) -> bool {
        true
    }
}

/// Document store: native nested-field match, no ordering expression.
#[derive(Debug, Clone, Copy)]
pub struct DocumentJson;

impl JsonDialect for DocumentJson {
    fn driver(&self) -> &'static str {
        "mongodb"
    }

    fn build_equality(&self, column: &str, key: &str, value: &str) -> Result<Condition> {
        ensure_key(key, column)?;
        let mut filter = serde_json::Map::new();
        filter.insert(format!("{}.{}", column, key), Value::from(value));
        Ok(Condition::Document(json!(filter)))
    }

    fn build_order(&self, column: &str, key: &str, _fallback: &str) -> Result<SqlFragment> {
        ensure_key(key, column)?;
        Err(unorderable(self))
    }

    fn supports_order_by(&self) -> bool {
        false
    }
}
