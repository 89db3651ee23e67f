//! Error types for flow execution.

use oxide_dal::DalError;

/// Code reported for a cancelled flow.
pub const CANCELLED_CODE: &str = "cancelled";

/// Errors that can occur while running a flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// SQL generation or execution failed.
    #[error(transparent)]
    Dal(#[from] DalError),

    /// A business error carrying its own code.
    #[error("{message}")]
    Coded {
        /// Code reported to the caller unchanged.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// No connection is registered under the name.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// No function is registered under the name.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// No flow is defined under the name.
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    /// A function returned without a `result` entry.
    #[error("Function '{0}' returned no result")]
    MissingResult(String),

    /// A step argument has the wrong shape.
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// Nested flows went deeper than the limit.
    #[error("Flow nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    /// The caller cancelled the flow.
    #[error("Flow cancelled")]
    Cancelled,

    /// A step panicked.
    #[error("Step '{step}' panicked: {message}")]
    Panicked {
        /// Step name.
        step: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// JSON error (configuration or arguments).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (reading configuration).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Creates a coded business error.
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Coded {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates an argument error.
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The explicit error code, if the error carries one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Coded { code, .. } => Some(code),
            Self::Cancelled => Some(CANCELLED_CODE),
            _ => None,
        }
    }
}

/// Result type for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
