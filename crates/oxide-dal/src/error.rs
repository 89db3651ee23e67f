//! Error types for SQL generation and execution.

use thiserror::Error;

/// Errors raised while generating or executing SQL.
#[derive(Debug, Error)]
pub enum DalError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No provider is registered under the dialect name.
    #[error("no provider registered for dialect '{0}'")]
    UnknownProvider(String),

    /// No SQL item is defined under the name.
    #[error("unknown SQL definition: {0}")]
    UnknownSqlItem(String),

    /// Named fragments reference each other in a loop.
    #[error("SQL fragment cycle: {}", .0.join(" -> "))]
    FragmentCycle(Vec<String>),

    /// The filter tree violates its structural rules.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A caller parameter uses the same name as a filter-generated one.
    #[error("parameter '{0}' is supplied by the caller and generated by the filter")]
    ParameterCollision(String),

    /// A table schema is inconsistent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The requested page starts beyond the addressable row range.
    #[error("page {index} of size {size} is out of range")]
    PageOutOfRange {
        /// Page index.
        index: u64,
        /// Page size.
        size: u64,
    },

    /// The connection URL cannot be handled by any driver.
    #[error("unsupported connection URL: {0}")]
    UnsupportedUrl(String),

    /// A row value could not be read back.
    #[error("cannot decode column '{column}': {message}")]
    Decode {
        /// Column name.
        column: String,
        /// Decoder message.
        message: String,
    },
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, DalError>;
