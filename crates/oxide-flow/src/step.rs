//! Flow definitions and step arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use oxide_dal::{Filter, Record, Sort};

use crate::error::{FlowError, Result};

/// Which service a step invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// A named SQL item.
    Sql,
    /// A registered function.
    Function,
    /// Another flow.
    Flow,
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name; its output is stored in the flow state under it.
    pub name: String,
    /// Service kind.
    pub kind: StepKind,
    /// Name of the SQL item, function or flow.
    pub service: String,
    /// Arguments; strings starting with `$` are paths into the flow state.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Step {
    /// Creates a step without arguments.
    pub fn new(name: impl Into<String>, kind: StepKind, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            service: service.into(),
            args: Map::new(),
        }
    }

    /// Creates a SQL step.
    pub fn sql(name: impl Into<String>, item: impl Into<String>) -> Self {
        Self::new(name, StepKind::Sql, item)
    }

    /// Creates a function step.
    pub fn function(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self::new(name, StepKind::Function, function)
    }

    /// Creates a nested-flow step.
    pub fn flow(name: impl Into<String>, flow: impl Into<String>) -> Self {
        Self::new(name, StepKind::Flow, flow)
    }

    /// Adds an argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Resolves `$path` references against the flow state.
    #[must_use]
    pub fn resolve_args(&self, state: &Record) -> Record {
        self.args
            .iter()
            .map(|(name, value)| (name.clone(), resolve_value(value, state)))
            .collect()
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Flow name.
    pub name: String,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

impl FlowDefinition {
    /// Creates a flow.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// Replaces `$path` strings, recursing into arrays and objects. A path that
/// matches nothing resolves to null; `$$` escapes a literal `$`.
fn resolve_value(value: &Value, state: &Record) -> Value {
    match value {
        Value::String(s) if s.starts_with("$$") => Value::String(s[1..].to_string()),
        Value::String(s) if s.starts_with('$') => {
            state.get_path(&s[1..]).cloned().unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, state)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, state)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Arguments of a SQL step, split into query shaping and bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlArgs {
    /// `filter` argument.
    pub filter: Option<Filter>,
    /// `sort` argument: one string or a list of strings.
    pub sorts: Vec<Sort>,
    /// `pageIndex` and `pageSize`, when both were given.
    pub page: Option<(u64, u64)>,
    /// Every other argument.
    pub params: Record,
}

impl SqlArgs {
    /// Reserved argument names.
    pub const RESERVED: [&'static str; 4] = ["filter", "sort", "pageIndex", "pageSize"];

    /// Splits resolved step arguments.
    pub fn parse(args: Record) -> Result<Self> {
        let mut parsed = Self::default();
        let mut page_index = None;
        let mut page_size = None;
        for (name, value) in args {
            match name.as_str() {
                "filter" if value.is_null() => {}
                "filter" => parsed.filter = Some(serde_json::from_value(value)?),
                "sort" => parsed.sorts = parse_sorts(&value)?,
                "pageIndex" => page_index = parse_page_number("pageIndex", &value)?,
                "pageSize" => page_size = parse_page_number("pageSize", &value)?,
                _ => {
                    parsed.params.set(name, value);
                }
            }
        }
        if let (Some(index), Some(size)) = (page_index, page_size) {
            parsed.page = Some((index, size));
        }
        Ok(parsed)
    }
}

fn parse_sorts(value: &Value) -> Result<Vec<Sort>> {
    let parse = |text: &str| -> Vec<Sort> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(parse(s)),
        Value::Array(items) => {
            let mut sorts = Vec::new();
            for item in items {
                let Value::String(s) = item else {
                    return Err(FlowError::invalid_argument("sort", "expected strings"));
                };
                sorts.extend(parse(s));
            }
            Ok(sorts)
        }
        _ => Err(FlowError::invalid_argument(
            "sort",
            "expected a string or a list of strings",
        )),
    }
}

fn parse_page_number(name: &str, value: &Value) -> Result<Option<u64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| FlowError::invalid_argument(name, "expected a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FlowError::invalid_argument(name, "expected a non-negative integer")),
        _ => Err(FlowError::invalid_argument(name, "expected a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_args() {
        let state = Record::from_value(json!({
            "input": {"user": {"id": 7}},
            "load": [{"name": "a"}],
        }))
        .unwrap();
        let step = Step::sql("s", "q")
            .arg("id", "$input.user.id")
            .arg("first", "$load.0.name")
            .arg("nested", json!({"ids": ["$input.user.id"]}))
            .arg("missing", "$input.nope")
            .arg("literal", "$$5")
            .arg("plain", 3);
        let args = step.resolve_args(&state);
        assert_eq!(args.get("id"), Some(&json!(7)));
        assert_eq!(args.get("first"), Some(&json!("a")));
        assert_eq!(args.get("nested"), Some(&json!({"ids": [7]})));
        assert_eq!(args.get("missing"), Some(&Value::Null));
        assert_eq!(args.get("literal"), Some(&json!("$5")));
        assert_eq!(args.get("plain"), Some(&json!(3)));
    }

    #[test]
    fn test_sql_args_split_reserved_names() {
        let args = Record::from_value(json!({
            "filter": {"Compare": {"name": "age", "op": "Gt", "value": 18}},
            "sort": ["name", "created DESC"],
            "pageIndex": "2",
            "pageSize": 10,
            "tenant": 3,
        }))
        .unwrap();
        let parsed = SqlArgs::parse(args).unwrap();
        assert_eq!(parsed.filter, Some(Filter::gt("age", 18)));
        assert_eq!(parsed.sorts, vec![Sort::asc("name"), Sort::desc("created")]);
        assert_eq!(parsed.page, Some((2, 10)));
        let names: Vec<&str> = parsed.params.names().collect();
        assert_eq!(names, vec!["tenant"]);
    }

    #[test]
    fn test_page_needs_both_arguments() {
        let args = Record::new().with("pageSize", 10);
        assert_eq!(SqlArgs::parse(args).unwrap().page, None);
    }

    #[test]
    fn test_bad_arguments() {
        let args = Record::new().with("pageIndex", -1).with("pageSize", 10);
        assert!(matches!(
            SqlArgs::parse(args),
            Err(FlowError::InvalidArgument { name, .. }) if name == "pageIndex"
        ));
        let args = Record::new().with("sort", 5);
        assert!(SqlArgs::parse(args).is_err());
    }

    #[test]
    fn test_flow_from_json() {
        let flow: FlowDefinition = serde_json::from_str(
            r#"{"name": "checkout", "steps": [
                {"name": "order", "kind": "sql", "service": "insert_order", "args": {"total": "$input.total"}},
                {"name": "mail", "kind": "function", "service": "notify"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.steps[1].kind, StepKind::Function);
        assert!(flow.steps[1].args.is_empty());
    }
}
