//! Filter compilation.
//!
//! Turns a [`Filter`] into a WHERE fragment, writing one parameter per value
//! into a [`Record`]. Parameter names are `prefix + counter`, the counter
//! being bumped before each allocation in strict left-to-right, depth-first
//! order, so the same tree compiled from the same counter always produces the
//! same text.

use serde_json::Value;

use super::{CompareOp, Filter, LogicOp};
use crate::error::{DalError, Result};
use crate::provider::Provider;
use crate::value::Record;

/// Default parameter name prefix.
pub const DEFAULT_PREFIX: &str = "P";

/// Compiles `filter` using the provider's placeholder and LIKE syntax.
pub fn compile<P: Provider + ?Sized>(
    provider: &P,
    filter: &Filter,
    counter: &mut usize,
    prefix: &str,
    params: &mut Record,
) -> Result<String> {
    match filter {
        Filter::Compare { name, op, value } => {
            compile_compare(provider, name, *op, value, counter, prefix, params)
        }
        Filter::Logic { op, children } => {
            compile_logic(provider, *op, children, counter, prefix, params)
        }
    }
}

fn compile_compare<P: Provider + ?Sized>(
    provider: &P,
    name: &str,
    op: CompareOp,
    value: &Value,
    counter: &mut usize,
    prefix: &str,
    params: &mut Record,
) -> Result<String> {
    if op == CompareOp::In {
        let joined = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let placeholders: Vec<String> = joined
            .split(',')
            .map(|token| {
                let pname = next_name(counter, prefix);
                let placeholder = provider.parameter_placeholder(&pname);
                params.set(pname, Value::String(token.to_string()));
                placeholder
            })
            .collect();
        return Ok(format!("{name} IN ({})", placeholders.join(",")));
    }

    let pname = next_name(counter, prefix);
    let placeholder = provider.parameter_placeholder(&pname);
    params.set(pname, value.clone());

    Ok(match op {
        CompareOp::Contains => format!("{name} LIKE {}", provider.contains_pattern(&placeholder)),
        _ => format!("{name} {op} {placeholder}"),
    })
}

fn compile_logic<P: Provider + ?Sized>(
    provider: &P,
    op: LogicOp,
    children: &[Filter],
    counter: &mut usize,
    prefix: &str,
    params: &mut Record,
) -> Result<String> {
    match op {
        LogicOp::Not => {
            let [child] = children else {
                return Err(DalError::InvalidFilter(format!(
                    "NOT takes exactly one child, got {}",
                    children.len()
                )));
            };
            let inner = compile(provider, child, counter, prefix, params)?;
            Ok(format!("NOT ({inner})"))
        }
        LogicOp::And | LogicOp::Or => {
            if children.is_empty() {
                return Err(DalError::InvalidFilter(format!(
                    "{op:?} needs at least one child"
                )));
            }
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                let sql = compile(provider, child, counter, prefix, params)?;
                parts.push(format!("({sql})"));
            }
            let joiner = if op == LogicOp::And { " AND " } else { " OR " };
            Ok(parts.join(joiner))
        }
    }
}

fn next_name(counter: &mut usize, prefix: &str) -> String {
    *counter += 1;
    format!("{prefix}{counter}")
}
