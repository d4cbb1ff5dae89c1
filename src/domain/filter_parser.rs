//! Quality filter parser.
//!
//! Compiles the `quality` section of an index configuration into a
//! [`FilterTree`] once, when the screening plan is built. Errors carry the JSON
//! path of the offending node.

use serde_json::Value;

use crate::domain::error::FilterError;
use crate::domain::filter::{Comparison, Condition, FilterTree, FilterValue, StrategyRef};
use crate::domain::security::FinancialField;

const ROOT: &str = "quality";
const STRATEGY_KEY: &str = "strategy";

pub fn parse(quality: &Value) -> Result<FilterTree, FilterError> {
    let object = match quality {
        Value::Null => return Ok(FilterTree::default()),
        Value::Object(map) => map,
        other => {
            return Err(FilterError::new(
                ROOT,
                format!("expected an object, found {}", kind(other)),
            ));
        }
    };

    let mut tree = FilterTree::default();
    for (key, node) in object {
        let path = format!("{ROOT}.{key}");
        if key == STRATEGY_KEY {
            tree.strategy = parse_strategy(node, &path)?;
            continue;
        }
        let field = FinancialField::from_name(key)
            .ok_or_else(|| FilterError::new(&path, format!("unknown field '{key}'")))?;
        tree.conditions.extend(parse_field(field, node, &path)?);
    }
    Ok(tree)
}

/// Parse a configuration document held as text.
pub fn parse_str(text: &str) -> Result<FilterTree, FilterError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FilterError::new(ROOT, e.to_string()))?;
    parse(&value)
}

fn parse_field(
    field: FinancialField,
    node: &Value,
    path: &str,
) -> Result<Vec<Condition>, FilterError> {
    let ops = match node {
        Value::Object(ops) if !ops.is_empty() => ops,
        Value::Object(_) => {
            return Err(FilterError::new(path, "expected at least one operator"));
        }
        other => {
            return Err(FilterError::new(
                path,
                format!("expected an operator object, found {}", kind(other)),
            ));
        }
    };

    let mut conditions = Vec::with_capacity(ops.len());
    for (op_name, raw) in ops {
        let op_path = format!("{path}.{op_name}");
        let comparison = Comparison::from_name(op_name).ok_or_else(|| {
            FilterError::new(
                &op_path,
                format!("unknown operator '{op_name}', expected one of gte, lte, gt, lt, equals"),
            )
        })?;
        let value = parse_value(field, comparison, raw, &op_path)?;
        conditions.push(Condition {
            field,
            comparison,
            value,
        });
    }
    Ok(conditions)
}

fn parse_value(
    field: FinancialField,
    comparison: Comparison,
    raw: &Value,
    path: &str,
) -> Result<FilterValue, FilterError> {
    if field.is_text() {
        if comparison != Comparison::Equals {
            return Err(FilterError::new(
                path,
                format!("field '{field}' only supports equals"),
            ));
        }
        return match raw {
            Value::String(s) => Ok(FilterValue::Text(s.clone())),
            other => Err(FilterError::new(
                path,
                format!("expected a string, found {}", kind(other)),
            )),
        };
    }

    match raw.as_f64() {
        Some(v) if v.is_finite() => Ok(FilterValue::Number(v)),
        _ => Err(FilterError::new(
            path,
            format!("expected a number, found {}", kind(raw)),
        )),
    }
}

fn parse_strategy(node: &Value, path: &str) -> Result<Option<StrategyRef>, FilterError> {
    let object = match node {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(FilterError::new(
                path,
                format!("expected an object, found {}", kind(other)),
            ));
        }
    };

    let name = match object.get("type") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(other) => {
            return Err(FilterError::new(
                format!("{path}.type"),
                format!("expected a strategy name, found {}", kind(other)),
            ));
        }
        None => return Err(FilterError::new(path, "missing strategy type")),
    };

    let params = match object.get("params") {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(p)) => p.clone(),
        Some(other) => {
            return Err(FilterError::new(
                format!("{path}.params"),
                format!("expected an object, found {}", kind(other)),
            ));
        }
    };

    Ok(Some(StrategyRef { name, params }))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
