use std::collections::HashMap;
use std::sync::RwLock;

/// Default literals keyed by lowercase data type.
///
/// Each provider instance owns its own map; cloning copies the entries.
#[derive(Debug, Default)]
pub struct DefaultValues {
    entries: RwLock<HashMap<String, String>>,
}

impl DefaultValues {
    /// Creates a map from `(data_type, literal)` pairs.
    #[must_use]
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: RwLock::new(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_string()))
                    .collect(),
            ),
        }
    }

    /// Literal for a data type.
    #[must_use]
    pub fn get(&self, data_type: &str) -> Option<String> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(&data_type.to_ascii_lowercase()).cloned()
    }

    /// Sets or replaces the literal for a data type.
    pub fn set(&self, data_type: &str, literal: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(data_type.to_ascii_lowercase(), literal.to_string());
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for DefaultValues {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        Self {
            entries: RwLock::new(entries),
        }
    }
}
