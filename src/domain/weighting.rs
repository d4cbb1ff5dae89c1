//! Target weight schemes. Every scheme returns weights normalized to sum 1.

use std::collections::BTreeMap;

use crate::domain::config::WeightScheme;

/// Weights for `members` (symbol, ranking metric), in the same order.
pub fn target_weights(scheme: &WeightScheme, members: &[(&str, f64)]) -> Vec<f64> {
    if members.is_empty() {
        return Vec::new();
    }
    let raw = match scheme {
        WeightScheme::Equal => equal(members.len()),
        WeightScheme::Score => by_score(members),
        WeightScheme::Fixed { value } => fixed(value, members),
    };
    normalize(raw)
}

fn equal(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn by_score(members: &[(&str, f64)]) -> Vec<f64> {
    let positive: Vec<f64> = members.iter().map(|(_, s)| s.max(0.0)).collect();
    let total: f64 = positive.iter().sum();
    if total > 0.0 && total.is_finite() {
        positive
    } else {
        equal(members.len())
    }
}

fn fixed(value: &BTreeMap<String, f64>, members: &[(&str, f64)]) -> Vec<f64> {
    let listed: Vec<Option<f64>> = members
        .iter()
        .map(|(symbol, _)| value.get(*symbol).copied())
        .collect();
    let listed_total: f64 = listed.iter().flatten().sum();
    let unlisted = listed.iter().filter(|w| w.is_none()).count();

    if unlisted == 0 {
        return if listed_total > 0.0 {
            listed.into_iter().map(|w| w.unwrap_or(0.0)).collect()
        } else {
            equal(members.len())
        };
    }

    let share = (1.0 - listed_total).max(0.0) / unlisted as f64;
    listed.into_iter().map(|w| w.unwrap_or(share)).collect()
}

fn normalize(raw: Vec<f64>) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return equal(raw.len());
    }
    raw.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sum(weights: &[f64]) -> f64 {
        weights.iter().sum()
    }

    #[test]
    fn equal_weights() {
        let w = target_weights(&WeightScheme::Equal, &[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        assert_eq!(w.len(), 3);
        assert_relative_eq!(w[0], 1.0 / 3.0);
        assert_relative_eq!(sum(&w), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn score_weights_proportional() {
        let w = target_weights(&WeightScheme::Score, &[("A", 3.0), ("B", 1.0), ("C", -2.0)]);
        assert_relative_eq!(w[0], 0.75);
        assert_relative_eq!(w[1], 0.25);
        assert_relative_eq!(w[2], 0.0);
    }

    #[test]
    fn score_weights_fall_back_to_equal() {
        let w = target_weights(&WeightScheme::Score, &[("A", -1.0), ("B", 0.0)]);
        assert_relative_eq!(w[0], 0.5);
        assert_relative_eq!(w[1], 0.5);
    }

    #[test]
    fn fixed_weights_split_remainder() {
        let scheme = WeightScheme::Fixed {
            value: BTreeMap::from([("A".to_string(), 0.5)]),
        };
        let w = target_weights(&scheme, &[("A", 0.0), ("B", 0.0), ("C", 0.0)]);
        assert_relative_eq!(w[0], 0.5);
        assert_relative_eq!(w[1], 0.25);
        assert_relative_eq!(w[2], 0.25);
    }

    #[test]
    fn fixed_weights_all_listed_are_normalized() {
        let scheme = WeightScheme::Fixed {
            value: BTreeMap::from([("A".to_string(), 0.3), ("B".to_string(), 0.1)]),
        };
        let w = target_weights(&scheme, &[("A", 0.0), ("B", 0.0)]);
        assert_relative_eq!(w[0], 0.75);
        assert_relative_eq!(w[1], 0.25);
    }

    #[test]
    fn empty_members() {
        assert!(target_weights(&WeightScheme::Equal, &[]).is_empty());
    }
}
