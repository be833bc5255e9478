//! Locale-aware query scopes.
//!
//! [`LocaleScopes`] adds translation-store filters and ordering to a host
//! query. [`SqlQuery`] renders them as SQL for the relational dialects;
//! [`DocumentQuery`] turns them into filter documents for the document store.
//! Backend differences live behind the [`JsonDialect`] strategy.

mod dialect;
mod document;
mod sql;

pub use dialect::{
    ensure_orderable, Dialect, DocumentJson, JsonDialect, MariaDb, MySql, Postgres, Sqlite,
    SqlSyntax,
};
pub use document::DocumentQuery;
pub use sql::SqlQuery;

use serde_json::Value;
use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

use crate::error::Result;
use crate::model::RecordKey;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&RecordKey> for SqlValue {
    fn from(key: &RecordKey) -> Self {
        match key {
            RecordKey::Int(id) => SqlValue::Int(*id),
            RecordKey::Text(id) => SqlValue::Text(id.clone()),
        }
    }
}

/// Attach rendered bind values to a query in placeholder order.
pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    binds: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in binds {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Raw(String),
    Bind(SqlValue),
}

/// SQL text interleaved with bound values.
///
/// Placeholders are only assigned when the whole statement is rendered, so
/// fragments can be assembled in any order and still number correctly for
/// dialects with positional (`$n`) parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlFragment {
    parts: Vec<Part>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Raw(sql.into())],
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.parts.push(Part::Raw(sql.to_string()));
        self
    }

    pub fn bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.parts.push(Part::Bind(value.into()));
        self
    }

    pub fn append(&mut self, other: SqlFragment) -> &mut Self {
        self.parts.extend(other.parts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Render to SQL, appending bound values to `binds` in placeholder order.
    pub fn render(&self, syntax: &dyn SqlSyntax, binds: &mut Vec<SqlValue>) -> String {
        let mut sql = String::new();
        for part in &self.parts {
            match part {
                Part::Raw(text) => sql.push_str(text),
                Part::Bind(value) => {
                    binds.push(value.clone());
                    sql.push_str(&syntax.placeholder(binds.len()));
                }
            }
        }
        sql
    }
}

/// A backend-specific filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Sql(SqlFragment),
    Document(Value),
}

/// Sort direction for [`LocaleScopes::order_by_locale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `DESC` in any case means descending; anything else is ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Translation-aware filters and ordering for host record queries.
pub trait LocaleScopes {
    /// Keep records whose `locale` translation has `key == value`.
    fn where_locale(&mut self, locale: &str, key: &str, value: &str) -> Result<&mut Self>;

    /// Keep records with a translation record for `locale`.
    fn where_has_locale(&mut self, locale: &str) -> Result<&mut Self>;

    /// Keep records without a translation record for `locale`.
    fn where_missing_locale(&mut self, locale: &str) -> Result<&mut Self>;

    fn where_doesnt_have_locale(&mut self, locale: &str) -> Result<&mut Self> {
        self.where_missing_locale(locale)
    }

    /// Order by the `locale` translation of `key`, falling back to the base column.
    fn order_by_locale(&mut self, locale: &str, key: &str, direction: &str) -> Result<&mut Self>;
}
