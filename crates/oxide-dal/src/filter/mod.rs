//! Filter trees and sort orders.
//!
//! A [`Filter`] is either a single comparison or a logical combination of
//! child filters. Providers compile it into a parameterized WHERE fragment
//! (see [`compile`]).

pub mod compile;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than or equal (<=)
    Lte,
    /// Substring match (LIKE %value%)
    Contains,
    /// Membership in a comma-separated list
    In,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Gt => write!(f, ">"),
            Self::Lt => write!(f, "<"),
            Self::Gte => write!(f, ">="),
            Self::Lte => write!(f, "<="),
            Self::Contains => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    /// All children hold.
    And,
    /// Any child holds.
    Or,
    /// The single child does not hold.
    Not,
}

/// A filter expression.
///
/// # Example
///
/// ```
/// use oxide_dal::Filter;
///
/// let filter = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::or(vec![Filter::gt("age", 18), Filter::eq("verified", true)]),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Leaf: `name op value`.
    Compare {
        /// Column name.
        name: String,
        /// Operator.
        op: CompareOp,
        /// Compared value. `In` expects a comma-joined string.
        value: Value,
    },
    /// Branch: logical combination of children.
    Logic {
        /// Operator.
        op: LogicOp,
        /// Children, compiled left to right.
        children: Vec<Filter>,
    },
}

impl Filter {
    /// Creates a comparison.
    pub fn compare(name: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    /// Creates an equality filter (name = value).
    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Eq, value)
    }

    /// Creates a greater-than filter (name > value).
    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Gt, value)
    }

    /// Creates a less-than filter (name < value).
    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Lt, value)
    }

    /// Creates a greater-than-or-equal filter (name >= value).
    pub fn gte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Gte, value)
    }

    /// Creates a less-than-or-equal filter (name <= value).
    pub fn lte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Lte, value)
    }

    /// Creates a substring filter.
    pub fn contains(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::Contains, value)
    }

    /// Creates a membership filter from a comma-joined list (`"1,2,3"`).
    ///
    /// The list is split as text, so members cannot themselves contain commas.
    pub fn in_list(name: impl Into<String>, joined: impl Into<Value>) -> Self {
        Self::compare(name, CompareOp::In, joined)
    }

    /// Combines children with AND.
    #[must_use]
    pub fn and(children: Vec<Filter>) -> Self {
        Self::Logic {
            op: LogicOp::And,
            children,
        }
    }

    /// Combines children with OR.
    #[must_use]
    pub fn or(children: Vec<Filter>) -> Self {
        Self::Logic {
            op: LogicOp::Or,
            children,
        }
    }

    /// Negates a filter.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Filter) -> Self {
        Self::Logic {
            op: LogicOp::Not,
            children: vec![child],
        }
    }
}

/// A sort entry: column name and direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sort {
    /// Column name.
    pub name: String,
    /// Whether the order is descending.
    pub descending: bool,
}

impl Sort {
    /// Ascending sort.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    /// Descending sort.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} DESC", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl FromStr for Sort {
    type Err = std::convert::Infallible;

    /// Parses `"name"`, `"name DESC"` or `"name ASC"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some((name, direction)) = trimmed.rsplit_once(char::is_whitespace) {
            if direction.eq_ignore_ascii_case("desc") {
                return Ok(Self::desc(name.trim_end()));
            }
            if direction.eq_ignore_ascii_case("asc") {
                return Ok(Self::asc(name.trim_end()));
            }
        }
        Ok(Self::asc(trimmed))
    }
}

impl Serialize for Sort {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sort {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(text.parse().unwrap_or_else(|never| match never {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_round_trip() {
        for sort in [Sort::asc("Name"), Sort::desc("Name")] {
            let parsed: Sort = sort.to_string().parse().unwrap();
            assert_eq!(parsed, sort);
        }
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!("Name".parse::<Sort>().unwrap(), Sort::asc("Name"));
        assert_eq!("Name DESC".parse::<Sort>().unwrap(), Sort::desc("Name"));
        assert_eq!("Name desc".parse::<Sort>().unwrap(), Sort::desc("Name"));
        assert_eq!("Name ASC".parse::<Sort>().unwrap(), Sort::asc("Name"));
    }

    #[test]
    fn test_sort_serde_uses_text_form() {
        let json = serde_json::to_string(&Sort::desc("created")).unwrap();
        assert_eq!(json, "\"created DESC\"");
        let back: Sort = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sort::desc("created"));
    }

    #[test]
    fn test_filter_from_json() {
        let json = r#"{"Logic": {"op": "And", "children": [
            {"Compare": {"name": "status", "op": "Eq", "value": "active"}},
            {"Compare": {"name": "id", "op": "In", "value": "1,2"}}
        ]}}"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![
                Filter::eq("status", "active"),
                Filter::in_list("id", "1,2")
            ])
        );
    }
}
