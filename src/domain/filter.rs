//! Screening filter AST.
//!
//! - `Condition`: one `{field, comparison, value}` leaf
//! - `FilterTree`: conditions joined by implicit AND, plus an optional
//!   reference to a ranking strategy whose output becomes the candidate pool

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::security::FinancialField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Gte,
    Lte,
    Gt,
    Lt,
    Equals,
}

impl Comparison {
    pub fn from_name(name: &str) -> Option<Comparison> {
        match name {
            "gte" => Some(Comparison::Gte),
            "lte" => Some(Comparison::Lte),
            "gt" => Some(Comparison::Gt),
            "lt" => Some(Comparison::Lt),
            "equals" | "eq" => Some(Comparison::Equals),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Equals => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(v) => write!(f, "{v}"),
            FilterValue::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: FinancialField,
    pub comparison: Comparison,
    pub value: FilterValue,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.comparison.symbol(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRef {
    pub name: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterTree {
    pub conditions: Vec<Condition>,
    pub strategy: Option<StrategyRef>,
}

impl FilterTree {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.strategy.is_none()
    }

    /// Fields the tree reads, for diagnostics.
    pub fn fields(&self) -> BTreeSet<FinancialField> {
        self.conditions.iter().map(|c| c.field).collect()
    }
}

impl fmt::Display for FilterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            f.write_str("TRUE")?;
        } else {
            let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
            f.write_str(&parts.join(" AND "))?;
        }
        if let Some(strategy) = &self.strategy {
            write!(f, " WITHIN {}", strategy.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_names() {
        assert_eq!(Comparison::from_name("gte"), Some(Comparison::Gte));
        assert_eq!(Comparison::from_name("equals"), Some(Comparison::Equals));
        assert_eq!(Comparison::from_name("between"), None);
    }

    #[test]
    fn display_joins_with_and() {
        let tree = FilterTree {
            conditions: vec![
                Condition {
                    field: FinancialField::PeRatio,
                    comparison: Comparison::Lte,
                    value: FilterValue::Number(20.0),
                },
                Condition {
                    field: FinancialField::Sector,
                    comparison: Comparison::Equals,
                    value: FilterValue::Text("Energy".into()),
                },
            ],
            strategy: Some(StrategyRef {
                name: "dcf".into(),
                params: serde_json::Map::new(),
            }),
        };
        assert_eq!(
            tree.to_string(),
            "peRatio <= 20 AND sector == \"Energy\" WITHIN dcf"
        );
        assert_eq!(tree.fields().len(), 2);
    }

    #[test]
    fn empty_tree() {
        let tree = FilterTree::default();
        assert!(tree.is_empty());
        assert_eq!(tree.to_string(), "TRUE");
    }
}
