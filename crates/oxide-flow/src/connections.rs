use std::collections::BTreeMap;

use oxide_dal::ConnectionSettings;

use crate::error::{FlowError, Result};

/// Logical connection names mapped to their settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, ConnectionSettings>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers settings under a name.
    pub fn register(&mut self, name: impl Into<String>, settings: ConnectionSettings) {
        self.connections.insert(name.into(), settings);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, settings: ConnectionSettings) -> Self {
        self.register(name, settings);
        self
    }

    /// Settings for a name.
    pub fn get(&self, name: &str) -> Result<&ConnectionSettings> {
        self.connections
            .get(name)
            .ok_or_else(|| FlowError::UnknownConnection(name.to_string()))
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Registered names with their settings, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConnectionSettings)> {
        self.connections.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ConnectionSettings)> for ConnectionRegistry {
    fn from_iter<I: IntoIterator<Item = (String, ConnectionSettings)>>(iter: I) -> Self {
        Self {
            connections: iter.into_iter().collect(),
        }
    }
}
