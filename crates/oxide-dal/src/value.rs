//! Values and records.
//!
//! [`SqlValue`] is the scalar form bound to a statement parameter. [`Record`]
//! is the loosely-typed, tree-shaped bag used both for rows read back from a
//! query and for the parameters handed to one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A SQL value that can be bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Converts a record value into a bindable scalar.
    ///
    /// Arrays and objects have no scalar form; they are bound as their JSON
    /// text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Converts the scalar back into a record value.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s),
            Self::Blob(b) => Value::Array(b.into_iter().map(Value::from).collect()),
        }
    }
}

/// An insertion-ordered, loosely-typed field map.
///
/// Fields are addressed either by name or by dotted path (`"order.customer.id"`).
/// Setting a path creates the intermediate objects it needs; a non-object value
/// sitting on the path is replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON value; anything but an object yields `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Sets a top-level field, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Returns whether a top-level field exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Resolves a dotted path. Numeric segments index into arrays.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets the value at a dotted path.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut map = &mut self.0;
        for segment in parents {
            let slot = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            map = match slot {
                Value::Object(inner) => inner,
                _ => unreachable!("slot was just made an object"),
            };
        }
        map.insert((*last).to_string(), value.into());
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over the top-level fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the record into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Reads a field as text; numbers and booleans are stringified.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Reads a field as an integer, accepting numeric strings.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Reads a field as a flag: `true`, non-zero numbers, `"YES"`, `"1"` and
    /// `"true"` are truthy.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|i| i != 0),
            Some(Value::String(s)) => {
                matches!(s.to_ascii_lowercase().as_str(), "yes" | "1" | "true" | "t")
            }
            _ => false,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_value_from_json() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from_json(&json!(2.5)), SqlValue::Float(2.5));
        assert_eq!(
            SqlValue::from_json(&json!("a")),
            SqlValue::Text("a".to_string())
        );
        assert_eq!(
            SqlValue::from_json(&json!([1, 2])),
            SqlValue::Text("[1,2]".to_string())
        );
    }

    #[test]
    fn test_record_paths() {
        let mut record = Record::new();
        record.set_path("order.customer.id", 7);
        record.set_path("order.total", 12.5);
        assert_eq!(record.get_path("order.customer.id"), Some(&json!(7)));
        assert_eq!(record.get_path("order.total"), Some(&json!(12.5)));
        assert_eq!(record.get_path("order.missing"), None);

        // A scalar on the path is replaced by an object.
        record.set("flat", 1);
        record.set_path("flat.inner", true);
        assert_eq!(record.get_path("flat.inner"), Some(&json!(true)));
    }

    #[test]
    fn test_record_array_path() {
        let record = Record::new().with("rows", json!([{"id": 1}, {"id": 2}]));
        assert_eq!(record.get_path("rows.1.id"), Some(&json!(2)));
        assert_eq!(record.get_path("rows.x.id"), None);
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let record = Record::new().with("z", 1).with("a", 2).with("m", 3);
        let names: Vec<&str> = record.names().collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_record_typed_reads() {
        let record = Record::new()
            .with("n", "12")
            .with("yes", "YES")
            .with("one", 1)
            .with("zero", 0);
        assert_eq!(record.int("n"), Some(12));
        assert!(record.flag("yes"));
        assert!(record.flag("one"));
        assert!(!record.flag("zero"));
        assert!(!record.flag("absent"));
    }
}
