use std::collections::HashMap;
use std::sync::Arc;

use super::{MySqlProvider, PostgresProvider, Provider, SqliteProvider};
use crate::error::{DalError, Result};

/// Maps dialect names to providers.
///
/// Built once at startup and passed by reference; names are matched
/// case-insensitively.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in dialects and their aliases.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let mysql: Arc<dyn Provider> = Arc::new(MySqlProvider::new());
        let postgres: Arc<dyn Provider> = Arc::new(PostgresProvider::new());
        let sqlite: Arc<dyn Provider> = Arc::new(SqliteProvider::new());
        registry.register("mysql", mysql);
        registry.register("postgres", Arc::clone(&postgres));
        registry.register("postgresql", postgres);
        registry.register("sqlite", Arc::clone(&sqlite));
        registry.register("sqlite3", sqlite);
        registry
    }

    /// Registers a provider under a name, replacing any previous one.
    pub fn register(&mut self, name: &str, provider: Arc<dyn Provider>) {
        self.providers.insert(name.to_ascii_lowercase(), provider);
    }

    /// Looks up a provider.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DalError::UnknownProvider(name.to_string()))
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
