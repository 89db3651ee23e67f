//! Function steps.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use oxide_dal::Record;

use crate::error::{FlowError, Result};

/// Key a function stores its payload under.
pub const RESULT_KEY: &str = "result";

/// A function callable from a flow step.
///
/// Implemented for any `Fn(&Record) -> Result<Record>` closure; annotate the
/// closure's argument and return types so it is inferred as one.
pub trait FlowFunction: Send + Sync {
    /// Runs the function on the resolved step arguments.
    fn call(&self, args: &Record) -> Result<Record>;
}

impl<F> FlowFunction for F
where
    F: Fn(&Record) -> Result<Record> + Send + Sync,
{
    fn call(&self, args: &Record) -> Result<Record> {
        self(args)
    }
}

/// Functions by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FlowFunction>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function, replacing any previous one of that name.
    pub fn register(&mut self, name: impl Into<String>, function: impl FlowFunction + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, function: impl FlowFunction + 'static) -> Self {
        self.register(name, function);
        self
    }

    /// Calls a function and returns its `result` payload.
    pub fn invoke(&self, name: &str, args: &Record) -> Result<Value> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| FlowError::UnknownFunction(name.to_string()))?;
        let mut output = function.call(args)?;
        output
            .remove(RESULT_KEY)
            .ok_or_else(|| FlowError::MissingResult(name.to_string()))
    }

    /// Whether a function is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
