//! Service configuration.
//!
//! A JSON document declares connections, SQL items, flows and per-dialect
//! default-value overrides:
//!
//! ```json
//! {
//!   "connections": { "main": { "url": "sqlite::memory:", "dialect": "sqlite" } },
//!   "sql": [
//!     { "name": "users", "text": "SELECT * FROM users", "connection": "main",
//!       "read_only": true }
//!   ],
//!   "flows": [
//!     { "name": "list_users", "steps": [
//!       { "name": "users", "kind": "sql", "service": "users" } ] }
//!   ],
//!   "defaults": { "sqlite": { "text": "'-'" } }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use oxide_dal::{ConnectionSettings, ProviderRegistry, SqlItem, SqlMapper};

use crate::connections::ConnectionRegistry;
use crate::error::{FlowError, Result};
use crate::function::FunctionRegistry;
use crate::step::{FlowDefinition, StepKind};

/// The on-disk service definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Connection settings by logical name.
    pub connections: BTreeMap<String, ConnectionSettings>,
    /// SQL items.
    pub sql: Vec<SqlItem>,
    /// Flow definitions.
    pub flows: Vec<FlowDefinition>,
    /// Default-value overrides: dialect, then data type, then literal.
    pub defaults: BTreeMap<String, BTreeMap<String, String>>,
}

impl ServiceConfig {
    /// Reads a definition from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validates the definition and builds the runtime bundle.
    ///
    /// Every connection's dialect must be registered, every SQL item must
    /// name a declared connection, and every nested flow step must name a
    /// declared flow.
    pub fn into_services(self, functions: FunctionRegistry) -> Result<Services> {
        let providers = ProviderRegistry::with_defaults();
        for settings in self.connections.values() {
            providers.get(&settings.dialect)?;
        }
        for (dialect, overrides) in &self.defaults {
            let provider = providers.get(dialect)?;
            for (data_type, literal) in overrides {
                provider.set_default_value(data_type, literal);
            }
        }

        let connections: ConnectionRegistry = self.connections.into_iter().collect();
        let mut mapper = SqlMapper::new();
        for item in self.sql {
            connections.get(&item.connection)?;
            mapper.add(item);
        }

        let flows: HashMap<String, FlowDefinition> = self
            .flows
            .into_iter()
            .map(|flow| (flow.name.clone(), flow))
            .collect();
        for flow in flows.values() {
            for step in &flow.steps {
                if step.kind == StepKind::Flow && !flows.contains_key(&step.service) {
                    return Err(FlowError::UnknownFlow(step.service.clone()));
                }
            }
        }

        Ok(Services {
            providers,
            connections,
            mapper,
            flows,
            functions,
        })
    }
}

/// Everything a flow run needs to resolve names.
#[derive(Debug, Default)]
pub struct Services {
    /// Dialect providers.
    pub providers: ProviderRegistry,
    /// Connection settings.
    pub connections: ConnectionRegistry,
    /// SQL items.
    pub mapper: SqlMapper,
    /// Flow definitions by name.
    pub flows: HashMap<String, FlowDefinition>,
    /// Registered functions.
    pub functions: FunctionRegistry,
}

impl Services {
    /// Creates a bundle with the built-in providers and nothing else.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: ProviderRegistry::with_defaults(),
            ..Self::default()
        }
    }

    /// Adds a flow definition.
    pub fn add_flow(&mut self, flow: FlowDefinition) {
        self.flows.insert(flow.name.clone(), flow);
    }

    /// Looks up a flow.
    pub fn flow(&self, name: &str) -> Result<&FlowDefinition> {
        self.flows
            .get(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))
    }
}
