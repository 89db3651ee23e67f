//! Query composition and execution.
//!
//! A [`QueryContext`] takes a base statement and layers an optional filter,
//! sort order and page on top of it, then runs the result on a
//! [`Connection`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::connection::Connection;
use crate::error::{DalError, Result};
use crate::filter::compile::DEFAULT_PREFIX;
use crate::filter::{Filter, Sort};
use crate::provider::{IdentityFetch, Provider};
use crate::schema::TableSchema;
use crate::value::Record;

/// One page of rows plus the unpaged total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Row count of the filtered statement without paging.
    pub total: i64,
    /// Rows of the requested page.
    pub rows: Vec<Record>,
}

/// Base SQL plus filter, sorts, page and caller parameters.
#[derive(Clone)]
pub struct QueryContext {
    provider: Arc<dyn Provider>,
    sql: String,
    filter: Option<Filter>,
    sorts: Vec<Sort>,
    page_index: u64,
    page_size: u64,
    params: Record,
    prefix: String,
}

impl QueryContext {
    /// Creates a context around a base statement.
    pub fn new(provider: Arc<dyn Provider>, sql: impl Into<String>) -> Self {
        Self {
            provider,
            sql: sql.into(),
            filter: None,
            sorts: Vec::new(),
            page_index: 0,
            page_size: 0,
            params: Record::new(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Attaches a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends a sort entry.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Appends several sort entries.
    #[must_use]
    pub fn sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.sorts.extend(sorts);
        self
    }

    /// Requests a page; index is 1-based and a size of 0 disables paging.
    #[must_use]
    pub fn page(mut self, index: u64, size: u64) -> Self {
        self.page_index = index;
        self.page_size = size;
        self
    }

    /// Binds a caller parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.set(name, value);
        self
    }

    /// Binds every field of a record as a caller parameter.
    #[must_use]
    pub fn params(mut self, params: Record) -> Self {
        for (name, value) in params {
            self.params.set(name, value);
        }
        self
    }

    /// Overrides the generated parameter prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Whether a page was requested.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.page_size > 0
    }

    /// Row offset of the requested page.
    pub fn offset(&self) -> Result<u64> {
        if self.page_index == 0 {
            return Ok(0);
        }
        (self.page_index - 1)
            .checked_mul(self.page_size)
            .ok_or(DalError::PageOutOfRange {
                index: self.page_index,
                size: self.page_size,
            })
    }

    /// The base statement with the filter applied, plus every parameter.
    ///
    /// Fails before anything runs when a caller parameter shares its name
    /// with a generated one.
    pub fn filtered(&self) -> Result<(String, Record)> {
        let Some(filter) = &self.filter else {
            return Ok((self.sql.clone(), self.params.clone()));
        };
        let mut counter = 0;
        let mut params = Record::new();
        let clause = self
            .provider
            .compile_filter(filter, &mut counter, &self.prefix, &mut params)?;
        if let Some(name) = params.names().find(|n| self.params.contains(n)) {
            return Err(DalError::ParameterCollision(name.to_string()));
        }
        for (name, value) in self.params.iter() {
            params.set(name, value.clone());
        }
        let sql = if has_where(&self.sql) && is_read_query(&self.sql) {
            format!("SELECT * FROM ({}) N WHERE {clause}", self.sql)
        } else {
            format!("{}\nWHERE {clause}", self.sql)
        };
        Ok((sql, params))
    }

    /// The full statement: filtered, sorted and paged.
    pub fn build(&self) -> Result<(String, Record)> {
        let (mut sql, params) = self.filtered()?;
        if !self.sorts.is_empty() {
            let order: Vec<String> = self.sorts.iter().map(ToString::to_string).collect();
            sql = format!("{sql}\nORDER BY {}", order.join(","));
        }
        if self.is_paged() {
            sql = self.provider.page_sql(&sql, self.offset()?, self.page_size);
        }
        Ok((sql, params))
    }

    /// The count statement over the filtered, unpaged statement.
    pub fn build_count(&self) -> Result<(String, Record)> {
        let (sql, params) = self.filtered()?;
        Ok((format!("SELECT COUNT(*) FROM ({sql}) X"), params))
    }

    /// Executes the statement and returns the affected-row count.
    pub async fn execute(&self, conn: &mut dyn Connection) -> Result<u64> {
        let (sql, params) = self.build()?;
        conn.execute(&sql, &params).await
    }

    /// Executes the statement and returns its first value.
    pub async fn scalar(&self, conn: &mut dyn Connection) -> Result<Value> {
        let (sql, params) = self.build()?;
        conn.scalar(&sql, &params).await
    }

    /// Returns the first row, if any.
    pub async fn single(&self, conn: &mut dyn Connection) -> Result<Option<Record>> {
        let (sql, params) = self.build()?;
        Ok(conn.query(&sql, &params).await?.into_iter().next())
    }

    /// Returns every row.
    pub async fn query(&self, conn: &mut dyn Connection) -> Result<Vec<Record>> {
        let (sql, params) = self.build()?;
        conn.query(&sql, &params).await
    }

    /// Counts the rows of the filtered statement, ignoring sort and page.
    pub async fn count(&self, conn: &mut dyn Connection) -> Result<i64> {
        let (sql, params) = self.build_count()?;
        let value = conn.scalar(&sql, &params).await?;
        Ok(value_as_i64(&value))
    }

    /// Counts, then fetches the requested page. The two statements are
    /// separate round trips with no isolation between them.
    pub async fn page_rows(&self, conn: &mut dyn Connection) -> Result<Page> {
        self.offset()?;
        let total = self.count(conn).await?;
        let rows = self.query(conn).await?;
        Ok(Page { total, rows })
    }

    /// Inserts `values` into `table` and returns the generated identity, if
    /// the table has an auto-increment column. Missing columns bind NULL.
    pub async fn insert(
        provider: &dyn Provider,
        conn: &mut dyn Connection,
        table: &TableSchema,
        values: &Record,
    ) -> Result<Option<Value>> {
        let insert = provider.create_insert(table);
        let params: Record = table
            .ordered_columns()
            .into_iter()
            .filter(|c| !c.auto_increment)
            .map(|c| {
                let value = values
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&c.name))
                    .map_or(Value::Null, |(_, v)| v.clone());
                (c.name.clone(), value)
            })
            .collect();
        match insert.identity {
            None => {
                conn.execute(&insert.sql, &params).await?;
                Ok(None)
            }
            Some(IdentityFetch::Returning) => Ok(Some(conn.scalar(&insert.sql, &params).await?)),
            Some(IdentityFetch::FollowUp(follow_up)) => {
                conn.execute(&insert.sql, &params).await?;
                Ok(Some(conn.scalar(&follow_up, &Record::new()).await?))
            }
        }
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("provider", &self.provider.name())
            .field("sql", &self.sql)
            .field("filter", &self.filter)
            .field("sorts", &self.sorts)
            .field("page_index", &self.page_index)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Returns the DDL that would bring the live table in line with `desired`:
/// CREATE TABLE when it is missing, the ALTER when it differs, `None` when
/// it already matches.
pub async fn plan_table(
    conn: &mut dyn Connection,
    provider: &dyn Provider,
    desired: &TableSchema,
) -> Result<Option<String>> {
    desired.validate()?;
    let params = Record::new()
        .with("database", conn.database())
        .with("table", desired.name.as_str());
    let exists = value_as_i64(&conn.scalar(provider.exists_table_sql(), &params).await?) > 0;
    let current = if exists {
        provider.get_table_schema(conn, &desired.name).await?
    } else {
        None
    };
    let Some(current) = current else {
        return Ok(Some(provider.create_table_sql(desired)));
    };
    let sql = provider.alter_table_sql(desired, &current);
    Ok((!sql.is_empty()).then_some(sql))
}

/// Creates or alters the live table to match `desired` and returns the
/// statement that ran.
pub async fn sync_table(
    conn: &mut dyn Connection,
    provider: &dyn Provider,
    desired: &TableSchema,
) -> Result<Option<String>> {
    let Some(sql) = plan_table(conn, provider, desired).await? else {
        info!(table = %desired.name, "Table is up to date");
        return Ok(None);
    };
    conn.execute_script(&sql).await?;
    info!(table = %desired.name, "Table synchronized");
    Ok(Some(sql))
}

/// Reads a count-like value.
#[must_use]
pub fn value_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Whether the statement contains the keyword WHERE outside identifiers.
fn has_where(sql: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token.eq_ignore_ascii_case("WHERE"))
}

/// Whether the statement's first keyword is SELECT or WITH.
fn is_read_query(sql: &str) -> bool {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();
    first.eq_ignore_ascii_case("SELECT") || first.eq_ignore_ascii_case("WITH")
}
