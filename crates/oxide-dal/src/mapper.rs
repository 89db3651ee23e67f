//! Named SQL fragments.
//!
//! Items are stored by name and may embed other items with `{{name}}`.
//! Resolution substitutes references recursively and caches the expanded
//! text per item.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{DalError, Result};

/// What an item returns when executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// Every row.
    #[default]
    Query,
    /// The first row or nothing.
    Single,
    /// First column of the first row.
    Scalar,
    /// Affected-row count.
    Execute,
}

/// A named SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlItem {
    /// Item name.
    pub name: String,
    /// SQL text, possibly holding `{{other}}` references.
    pub text: String,
    /// Logical connection the item runs against.
    #[serde(default)]
    pub connection: String,
    /// Whether the item only reads; read-only items never open a transaction.
    #[serde(default)]
    pub read_only: bool,
    /// Result shape.
    #[serde(default)]
    pub kind: ExecKind,
}

impl SqlItem {
    /// Creates a writable query item with no connection.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            connection: String::new(),
            read_only: false,
            kind: ExecKind::Query,
        }
    }

    /// Sets the connection name.
    #[must_use]
    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    /// Marks the item read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Sets the result shape.
    #[must_use]
    pub fn kind(mut self, kind: ExecKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Registry of named SQL items with memoized reference expansion.
#[derive(Debug, Default)]
pub struct SqlMapper {
    items: HashMap<String, SqlItem>,
    resolved: RwLock<HashMap<String, String>>,
}

impl SqlMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item and clears the expansion cache.
    pub fn add(&mut self, item: SqlItem) {
        self.items.insert(item.name.clone(), item);
        self.resolved
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Gets an item by name.
    pub fn get(&self, name: &str) -> Result<&SqlItem> {
        self.items
            .get(name)
            .ok_or_else(|| DalError::UnknownSqlItem(name.to_string()))
    }

    /// Iterates over every item.
    pub fn items(&self) -> impl Iterator<Item = &SqlItem> {
        self.items.values()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the mapper holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item's text with every `{{name}}` reference expanded.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let mut stack = Vec::new();
        self.resolve_inner(name, &mut stack)
    }

    fn resolve_inner(&self, name: &str, stack: &mut Vec<String>) -> Result<String> {
        if let Some(text) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(text.clone());
        }
        if stack.iter().any(|n| n == name) {
            let mut path = stack.clone();
            path.push(name.to_string());
            return Err(DalError::FragmentCycle(path));
        }
        let item = self.get(name)?;
        stack.push(name.to_string());

        let mut out = String::with_capacity(item.text.len());
        let mut rest = item.text.as_str();
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let reference = rest[start + 2..start + 2 + len].trim();
            out.push_str(&self.resolve_inner(reference, stack)?);
            rest = &rest[start + 2 + len + 2..];
        }
        out.push_str(rest);

        stack.pop();
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), out.clone());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(items: &[(&str, &str)]) -> SqlMapper {
        let mut mapper = SqlMapper::new();
        for (name, text) in items {
            mapper.add(SqlItem::new(*name, *text));
        }
        mapper
    }

    #[test]
    fn test_nested_references() {
        let mapper = mapper(&[
            ("cols", "id, name"),
            ("base", "SELECT {{cols}} FROM users"),
            ("active", "{{ base }} WHERE active = 1"),
        ]);
        assert_eq!(
            mapper.resolve("active").unwrap(),
            "SELECT id, name FROM users WHERE active = 1"
        );
        // Second call served from the cache.
        assert_eq!(mapper.resolve("base").unwrap(), "SELECT id, name FROM users");
    }

    #[test]
    fn test_unknown_reference() {
        let mapper = mapper(&[("a", "SELECT {{missing}}")]);
        assert!(matches!(
            mapper.resolve("a"),
            Err(DalError::UnknownSqlItem(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mapper = mapper(&[("a", "{{b}}"), ("b", "x {{c}}"), ("c", "{{a}}")]);
        let err = mapper.resolve("a").unwrap_err();
        assert_eq!(err.to_string(), "SQL fragment cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_add_invalidates_cache() {
        let mut mapper = mapper(&[("t", "users"), ("q", "SELECT * FROM {{t}}")]);
        assert_eq!(mapper.resolve("q").unwrap(), "SELECT * FROM users");
        mapper.add(SqlItem::new("t", "people"));
        assert_eq!(mapper.resolve("q").unwrap(), "SELECT * FROM people");
    }

    #[test]
    fn test_unterminated_braces_are_literal() {
        let mapper = mapper(&[("a", "SELECT '{{' AS x")]);
        assert_eq!(mapper.resolve("a").unwrap(), "SELECT '{{' AS x");
    }

    #[test]
    fn test_item_from_json() {
        let item: SqlItem = serde_json::from_str(
            r#"{"name": "count", "text": "SELECT COUNT(*) FROM t", "read_only": true, "kind": "scalar"}"#,
        )
        .unwrap();
        assert!(item.read_only);
        assert_eq!(item.kind, ExecKind::Scalar);
        assert!(item.connection.is_empty());
    }
}
