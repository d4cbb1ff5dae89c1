//! Filter evaluation engine.
//!
//! # Evaluation Semantics
//!
//! - Conditions are joined by AND and short-circuit on the first failure
//! - A missing field value fails its condition; it is never read as zero
//! - Number equality uses an absolute tolerance of 1e-9
//! - Text equality is case-insensitive and only applies to text fields

use crate::domain::filter::{Comparison, Condition, FilterTree, FilterValue};
use crate::domain::security::Security;

const EPSILON: f64 = 1e-9;

pub fn evaluate(tree: &FilterTree, security: &Security) -> bool {
    tree.conditions
        .iter()
        .all(|condition| evaluate_condition(condition, security))
}

/// The first condition the security fails, if any.
pub fn first_failure<'a>(tree: &'a FilterTree, security: &Security) -> Option<&'a Condition> {
    tree.conditions
        .iter()
        .find(|condition| !evaluate_condition(condition, security))
}

pub fn evaluate_condition(condition: &Condition, security: &Security) -> bool {
    match &condition.value {
        FilterValue::Number(threshold) => match security.number(condition.field) {
            Some(actual) => compare(actual, condition.comparison, *threshold),
            None => false,
        },
        FilterValue::Text(expected) => match security.text(condition.field) {
            Some(actual) => {
                condition.comparison == Comparison::Equals
                    && actual.eq_ignore_ascii_case(expected)
            }
            None => false,
        },
    }
}

fn compare(actual: f64, comparison: Comparison, threshold: f64) -> bool {
    match comparison {
        Comparison::Gte => actual >= threshold,
        Comparison::Lte => actual <= threshold,
        Comparison::Gt => actual > threshold,
        Comparison::Lt => actual < threshold,
        Comparison::Equals => (actual - threshold).abs() < EPSILON,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter_parser::parse;
    use crate::domain::security::{Fundamentals, FinancialField};
    use serde_json::json;

    fn security(pe: Option<f64>, dividend_yield: Option<f64>) -> Security {
        Security {
            symbol: "T".into(),
            name: "Test".into(),
            asset_type: "stock".into(),
            sector: Some("Utilities".into()),
            exchange: None,
            fundamentals: Fundamentals {
                pe_ratio: pe,
                dividend_yield,
                ..Default::default()
            },
        }
    }

    #[test]
    fn all_conditions_must_hold() {
        let tree = parse(&json!({"peRatio": {"lte": 20}, "dividendYield": {"gte": 0.03}})).unwrap();
        assert!(evaluate(&tree, &security(Some(15.0), Some(0.04))));
        assert!(!evaluate(&tree, &security(Some(25.0), Some(0.04))));
        assert!(!evaluate(&tree, &security(Some(15.0), Some(0.01))));
    }

    #[test]
    fn missing_value_fails() {
        let tree = parse(&json!({"peRatio": {"lte": 20}})).unwrap();
        assert!(!evaluate(&tree, &security(None, Some(0.04))));
    }

    #[test]
    fn missing_value_fails_even_for_lower_bound_of_zero() {
        let tree = parse(&json!({"dividendYield": {"gte": 0}})).unwrap();
        assert!(!evaluate(&tree, &security(Some(10.0), None)));
        assert!(evaluate(&tree, &security(Some(10.0), Some(0.0))));
    }

    #[test]
    fn strict_and_inclusive_bounds() {
        let gt = parse(&json!({"peRatio": {"gt": 10}})).unwrap();
        let gte = parse(&json!({"peRatio": {"gte": 10}})).unwrap();
        let lt = parse(&json!({"peRatio": {"lt": 10}})).unwrap();
        let s = security(Some(10.0), None);
        assert!(!evaluate(&gt, &s));
        assert!(evaluate(&gte, &s));
        assert!(!evaluate(&lt, &s));
    }

    #[test]
    fn numeric_equals_uses_tolerance() {
        let tree = parse(&json!({"peRatio": {"equals": 0.3}})).unwrap();
        assert!(evaluate(&tree, &security(Some(0.1 + 0.2), None)));
    }

    #[test]
    fn text_equals_ignores_case() {
        let tree = parse(&json!({"sector": {"equals": "utilities"}})).unwrap();
        assert!(evaluate(&tree, &security(None, None)));
        let mut other = security(None, None);
        other.sector = None;
        assert!(!evaluate(&tree, &other));
    }

    #[test]
    fn empty_tree_passes_everything() {
        assert!(evaluate(&FilterTree::default(), &security(None, None)));
    }

    #[test]
    fn reports_first_failure() {
        let tree = parse(&json!({"peRatio": {"lte": 20}})).unwrap();
        let failed = first_failure(&tree, &security(Some(30.0), None)).unwrap();
        assert_eq!(failed.field, FinancialField::PeRatio);
        assert!(first_failure(&tree, &security(Some(10.0), None)).is_none());
    }
}
