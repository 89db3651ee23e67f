//! The caller-facing outcome of a flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;

/// Outcome of a flow: success flag, error code and message, and data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    /// Whether the flow completed.
    pub success: bool,
    /// Explicit error code; empty unless the error carried one.
    pub code: String,
    /// Error message; empty on success.
    pub message: String,
    /// Output of the last step.
    pub data: Value,
}

impl ServiceResult {
    /// A successful result.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    /// An error-shaped result. Only coded errors keep a code.
    #[must_use]
    pub fn from_error(error: &FlowError) -> Self {
        Self {
            success: false,
            code: error.code().unwrap_or_default().to_string(),
            message: error.to_string(),
            data: Value::Null,
        }
    }
}

impl From<crate::Result<Value>> for ServiceResult {
    fn from(outcome: crate::Result<Value>) -> Self {
        match outcome {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}
