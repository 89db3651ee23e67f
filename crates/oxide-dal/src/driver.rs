//! sqlx-backed connections.
//!
//! Statements arrive with `@name` placeholders. Before execution they are
//! rewritten to the backend's positional form and the named values are bound
//! in order of appearance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Column as _, Connection as _, Row as _, ValueRef as _};
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionSettings, Connector};
use crate::error::{DalError, Result};
use crate::provider::{Provider, ProviderRegistry};
use crate::value::{Record, SqlValue};

/// URL schemes the bundled drivers understand.
const SCHEMES: [&str; 4] = ["mysql:", "postgres:", "postgresql:", "sqlite:"];

/// Opens [`SqlxConnection`]s, picking the provider by dialect name.
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    providers: ProviderRegistry,
}

impl SqlxConnector {
    /// Creates a connector and installs the sqlx drivers.
    #[must_use]
    pub fn new(providers: ProviderRegistry) -> Self {
        sqlx::any::install_default_drivers();
        Self { providers }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Connection>> {
        let provider = self.providers.get(&settings.dialect)?;
        if !SCHEMES.iter().any(|s| settings.url.starts_with(s)) {
            return Err(DalError::UnsupportedUrl(settings.url.clone()));
        }
        let database = settings.database_name();
        info!(dialect = %provider.name(), database = %database, "Opening connection");
        let conn = AnyConnection::connect(&settings.url).await?;
        Ok(Box::new(SqlxConnection {
            conn,
            provider,
            database,
        }))
    }
}

/// A single sqlx connection.
///
/// Transactions are driven with plain `BEGIN`/`COMMIT`/`ROLLBACK` so the
/// connection can keep one open across calls.
pub struct SqlxConnection {
    conn: AnyConnection,
    provider: Arc<dyn Provider>,
    database: String,
}

impl SqlxConnection {
    async fn run_raw(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqlxConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxConnection")
            .field("provider", &self.provider.name())
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for SqlxConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_raw("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_raw("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_raw("ROLLBACK").await
    }

    async fn execute(&mut self, sql: &str, params: &Record) -> Result<u64> {
        let (text, values) = bind_named(sql, params, self.provider.as_ref());
        debug!(sql = %text, params = values.len(), "Executing SQL");
        let result = build_query(&text, values).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn scalar(&mut self, sql: &str, params: &Record) -> Result<Value> {
        let (text, values) = bind_named(sql, params, self.provider.as_ref());
        debug!(sql = %text, params = values.len(), "Executing SQL");
        let row = build_query(&text, values)
            .fetch_optional(&mut self.conn)
            .await?;
        match row {
            Some(row) if !row.columns().is_empty() => decode_value(&row, 0),
            _ => Ok(Value::Null),
        }
    }

    async fn query(&mut self, sql: &str, params: &Record) -> Result<Vec<Record>> {
        let (text, values) = bind_named(sql, params, self.provider.as_ref());
        debug!(sql = %text, params = values.len(), "Executing SQL");
        let rows = build_query(&text, values).fetch_all(&mut self.conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.run_raw(sql).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        info!(database = %self.database, "Closing connection");
        self.conn.close().await?;
        Ok(())
    }
}

fn build_query(text: &str, values: Vec<SqlValue>) -> Query<'_, Any, AnyArguments<'_>> {
    values
        .into_iter()
        .fold(sqlx::query::<Any>(text), |query, value| match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Blob(b) => query.bind(b),
        })
}

fn decode_row(row: &AnyRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.set(column.name(), decode_value(row, index)?);
    }
    Ok(record)
}

/// Reads a column by trying the scalar kinds the `Any` driver supports.
fn decode_value(row: &AnyRow, index: usize) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(SqlValue::Float(v).into_json());
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::String(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(SqlValue::Blob(v).into_json());
    }
    Err(DalError::Decode {
        column: row.columns()[index].name().to_string(),
        message: "unsupported column type".to_string(),
    })
}

/// Rewrites `@name` placeholders into the provider's positional form and
/// collects the values to bind, in order.
///
/// Quoted strings and identifiers, `--` and `/* */` comments and `@@` system
/// variables are copied verbatim. A name with no matching parameter is left as written,
/// so MySQL user variables keep working. When the positional form carries an
/// index (`$n`), repeated names reuse their first index.
#[must_use]
pub fn bind_named(sql: &str, params: &Record, provider: &dyn Provider) -> (String, Vec<SqlValue>) {
    let indexed = provider.positional_placeholder(1) != provider.positional_placeholder(2);
    let backslash = provider.backslash_escapes();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                let end = quoted_end(bytes, i, quote, backslash && quote != b'`');
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => {
                let end = ident_end(bytes, i + 2);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'@' => {
                let end = ident_end(bytes, i + 1);
                let name = &sql[i + 1..end];
                match params.get(name) {
                    Some(value) if !name.is_empty() => {
                        let index = if indexed {
                            *seen.entry(name).or_insert_with(|| {
                                values.push(SqlValue::from_json(value));
                                values.len()
                            })
                        } else {
                            values.push(SqlValue::from_json(value));
                            values.len()
                        };
                        out.push_str(&provider.positional_placeholder(index));
                    }
                    _ => out.push_str(&sql[i..end]),
                }
                i = end;
            }
            _ => {
                let next = next_char_boundary(sql, i);
                out.push_str(&sql[i..next]);
                i = next;
            }
        }
    }
    (out, values)
}

fn quoted_end(bytes: &[u8], start: usize, quote: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if backslash && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            // A doubled quote is an escaped quote.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

fn next_char_boundary(s: &str, i: usize) -> usize {
    let mut next = i + 1;
    while !s.is_char_boundary(next) {
        next += 1;
    }
    next
}
