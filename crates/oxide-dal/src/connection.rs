//! Connection contract.
//!
//! Statements travel as text with `@name` placeholders plus a [`Record`] of
//! named values; each implementation binds them the way its backend wants.
//! The trait is object safe so a provider can introspect through
//! `&mut dyn Connection` without knowing the driver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::value::Record;

/// An open database connection with at most one transaction at a time.
#[async_trait]
pub trait Connection: Send {
    /// Database (MySQL schema / Postgres catalog) the connection is bound to.
    fn database(&self) -> &str;

    /// Starts a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Executes a statement and returns the affected-row count.
    async fn execute(&mut self, sql: &str, params: &Record) -> Result<u64>;

    /// Executes a statement and returns the first column of the first row,
    /// or `Value::Null` when there is no row.
    async fn scalar(&mut self, sql: &str, params: &Record) -> Result<Value>;

    /// Executes a statement and returns every row.
    async fn query(&mut self, sql: &str, params: &Record) -> Result<Vec<Record>>;

    /// Executes parameterless text that may hold several statements.
    async fn execute_script(&mut self, sql: &str) -> Result<()>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// How to reach a logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Driver URL (`mysql://...`, `postgres://...`, `sqlite:...`).
    pub url: String,
    /// Dialect name used to look up the provider.
    pub dialect: String,
    /// Database/catalog name used for catalog queries. Taken from the URL
    /// path when empty.
    #[serde(default)]
    pub database: String,
}

impl ConnectionSettings {
    /// Creates settings for a URL and dialect.
    pub fn new(url: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dialect: dialect.into(),
            database: String::new(),
        }
    }

    /// The database name: the explicit one, else the last URL path segment
    /// without query string.
    #[must_use]
    pub fn database_name(&self) -> String {
        if !self.database.is_empty() {
            return self.database.clone();
        }
        let without_query = self.url.split('?').next().unwrap_or_default();
        let after_scheme = without_query
            .split_once("://")
            .map_or(without_query, |(_, rest)| rest);
        after_scheme
            .split_once('/')
            .map(|(_, path)| path.rsplit('/').next().unwrap_or_default().to_string())
            .unwrap_or_default()
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection described by `settings`.
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Connection>>;
}
