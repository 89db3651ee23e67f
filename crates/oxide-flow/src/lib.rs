//! Transactional multi-step service flows.
//!
//! A flow is an ordered list of steps, each invoking a named SQL item, a
//! registered function or another flow. Steps of one run share a single
//! connection, and a single transaction, per logical connection name:
//! - Read-only SQL items run directly on the connection
//! - The first writing item opens the transaction
//! - When the run ends the transaction commits if every step succeeded and
//!   something was written, and rolls back otherwise
//! - Every connection is closed exactly once, whatever the outcome
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use oxide_dal::{ProviderRegistry, SqlxConnector};
//! use oxide_flow::{CancelSignal, FlowRunner, FunctionRegistry, ServiceConfig};
//! use serde_json::json;
//!
//! let services = ServiceConfig::load("services.json")?.into_services(FunctionRegistry::new())?;
//! let runner = FlowRunner::new(
//!     Arc::new(services),
//!     Arc::new(SqlxConnector::new(ProviderRegistry::with_defaults())),
//! );
//! let result = runner
//!     .run("checkout", json!({"cart": 42}), &CancelSignal::new())
//!     .await;
//! assert!(result.success, "{}", result.message);
//! ```

pub mod config;
pub mod connections;
pub mod context;
pub mod error;
pub mod function;
pub mod result;
pub mod runner;
pub mod step;

pub use config::{ServiceConfig, Services};
pub use connections::ConnectionRegistry;
pub use context::{CancelSignal, ConnectionContext, FlowContext};
pub use error::{FlowError, Result};
pub use function::{FlowFunction, FunctionRegistry, RESULT_KEY};
pub use result::ServiceResult;
pub use runner::{FlowRunner, MAX_DEPTH};
pub use step::{FlowDefinition, SqlArgs, Step, StepKind};
