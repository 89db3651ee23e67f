//! Dialect-aware SQL generation and execution.
//!
//! `oxide-dal` renders and runs the statements a data-access layer needs
//! against MySQL, PostgreSQL or SQLite, behind one [`Provider`] contract:
//! - DDL and DML generated from a [`TableSchema`]
//! - Schema introspection and snapshot diffing into `ALTER TABLE`
//! - Filter trees compiled into parameterized `WHERE` fragments
//! - Query composition with filter, sort and paging ([`QueryContext`])
//! - Named SQL fragments with `{{name}}` expansion ([`SqlMapper`])
//!
//! # Architecture
//!
//! - **Schema** - `Column` and `TableSchema` values
//! - **Filter** - `Filter`/`Sort` and the filter compiler
//! - **Provider** - per-dialect generation, introspection and the registry
//! - **Query** - `QueryContext`, `plan_table`/`sync_table`
//! - **Connection** - the `Connection`/`Connector` contract
//! - **Driver** - `SqlxConnector`, the sqlx-backed implementation
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use oxide_dal::{Filter, QueryContext, Sort, SqliteProvider};
//!
//! let (sql, params) = QueryContext::new(Arc::new(SqliteProvider::new()), "SELECT * FROM users")
//!     .filter(Filter::and(vec![
//!         Filter::eq("status", "active"),
//!         Filter::contains("email", "@example.com"),
//!     ]))
//!     .sort(Sort::desc("created"))
//!     .page(2, 20)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     "SELECT * FROM users\n\
//!      WHERE (status = @P1) AND (email LIKE '%' || @P2 || '%')\n\
//!      ORDER BY created DESC\n\
//!      LIMIT 20 OFFSET 20"
//! );
//! assert_eq!(params.len(), 2);
//! ```

pub mod connection;
pub mod driver;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod provider;
pub mod query;
pub mod schema;
pub mod value;

pub use connection::{Connection, ConnectionSettings, Connector};
pub use driver::SqlxConnector;
pub use error::{DalError, Result};
pub use filter::{CompareOp, Filter, LogicOp, Sort};
pub use mapper::{ExecKind, SqlItem, SqlMapper};
pub use provider::{
    diff_columns, ChangeKind, ColumnChange, DefaultValues, IdentityFetch, InsertSql,
    MySqlProvider, Placement, PostgresProvider, Provider, ProviderRegistry, SqliteProvider,
};
pub use query::{plan_table, sync_table, Page, QueryContext};
pub use schema::{Column, ForeignKeyRef, TableSchema};
pub use value::{Record, SqlValue};
