//! Rebalance decision engine.
//!
//! Compares the current composition with the ideal selection and decides what
//! changes, with hysteresis: a constituent leaves only when it fails the
//! quality screen, or when a challenger beats the worst constituent's metric
//! by more than the configured margin.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use log::warn;

use crate::domain::config::{Diversification, IndexConfiguration, OrderDirection};
use crate::domain::diversification::within_cap;
use crate::domain::index::{Constituent, RebalanceAction, RebalanceLogEntry, weights_balanced};
use crate::domain::screening::{Candidate, ScreeningResult};
use crate::domain::weighting::target_weights;

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceDecision {
    pub changed: bool,
    pub composition: Vec<Constituent>,
    pub log: Vec<RebalanceLogEntry>,
}

pub struct RebalanceInput<'a> {
    pub current: &'a [Constituent],
    pub screening: &'a ScreeningResult,
    /// Output of the diversification allocator, best first.
    pub ideal: &'a [Candidate],
    pub config: &'a IndexConfiguration,
    /// Prices for ideal members that are not yet constituents.
    pub entry_prices: &'a HashMap<String, f64>,
    pub date: NaiveDate,
}

/// True when `challenger` beats `incumbent` by more than `margin`, relative
/// to the incumbent's magnitude. A missing incumbent metric always loses.
pub fn beats_by_margin(
    challenger: f64,
    incumbent: Option<f64>,
    margin: f64,
    direction: OrderDirection,
) -> bool {
    let Some(incumbent) = incumbent else {
        return true;
    };
    let advantage = match direction {
        OrderDirection::Desc => challenger - incumbent,
        OrderDirection::Asc => incumbent - challenger,
    };
    advantage > 0.0 && advantage > margin * incumbent.abs()
}

struct Held {
    constituent: Constituent,
    metric: Option<f64>,
    sector: String,
}

pub fn decide(input: &RebalanceInput<'_>) -> RebalanceDecision {
    let unchanged = || RebalanceDecision {
        changed: false,
        composition: input.current.to_vec(),
        log: Vec::new(),
    };

    if input.ideal.is_empty() {
        warn!(
            "screening produced no candidates on {}; keeping current composition",
            input.date
        );
        return unchanged();
    }

    let config = input.config;
    let direction = config.selection.order_direction;
    let margin = config.rebalance.threshold;
    let target_size = config.selection.top_n;
    let caps = match &config.diversification {
        Some(Diversification::MaxCount {
            max_count_per_sector,
        }) => Some(max_count_per_sector),
        _ => None,
    };
    let metric_name = config.selection.order_by.as_deref().unwrap_or("strategyScore");

    let mut log = Vec::new();
    let mut held: Vec<Held> = Vec::new();

    for constituent in input.current {
        let symbol = constituent.symbol.as_str();
        let metric = input.screening.metrics.get(symbol).copied();
        if config.rebalance.check_quality && !input.screening.passes(symbol) {
            let reason = match input.screening.exclusion_reason(symbol) {
                Some(rule) => format!("excluded: {rule}"),
                None if metric.is_none() => format!("no longer has a {metric_name} value"),
                None => "no longer meets the quality criteria".to_string(),
            };
            log.push(entry(input.date, RebalanceAction::Exit, symbol, reason));
            continue;
        }
        let sector = input
            .screening
            .sectors
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| crate::domain::security::UNCLASSIFIED_SECTOR.to_string());
        held.push(Held {
            constituent: constituent.clone(),
            metric,
            sector,
        });
    }

    while held.len() > target_size {
        let Some(worst) = worst_index(&held, direction) else {
            break;
        };
        let gone = held.remove(worst);
        log.push(entry(
            input.date,
            RebalanceAction::Exit,
            &gone.constituent.symbol,
            format!("selection size reduced to {target_size}"),
        ));
    }

    let current_symbols: HashSet<&str> = input.current.iter().map(|c| c.symbol.as_str()).collect();
    let mut challengers: Vec<(&Candidate, f64)> = Vec::new();
    for candidate in input.ideal {
        if current_symbols.contains(candidate.symbol()) {
            continue;
        }
        match input.entry_prices.get(candidate.symbol()) {
            Some(price) if *price > 0.0 => challengers.push((candidate, *price)),
            _ => warn!(
                "no entry price for {} on {}; skipping candidate",
                candidate.symbol(),
                input.date
            ),
        }
    }

    let mut queue = challengers.into_iter();
    let initial = input.current.is_empty();

    while held.len() < target_size {
        let Some((candidate, price)) = queue.next() else {
            break;
        };
        if let Some(caps) = caps {
            if !within_cap(caps, held.iter().map(|h| h.sector.as_str()), candidate.security.sector_or_unclassified()) {
                continue;
            }
        }
        let reason = if initial {
            format!("initial selection: {metric_name} {:.4}", candidate.score)
        } else {
            format!("filled vacancy: {metric_name} {:.4}", candidate.score)
        };
        log.push(entry(input.date, RebalanceAction::Entry, candidate.symbol(), reason));
        held.push(admit(candidate, price, input.date));
    }

    for (candidate, price) in queue {
        let Some(worst) = worst_index(&held, direction) else {
            break;
        };
        if let Some(caps) = caps {
            let remaining = held
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != worst)
                .map(|(_, h)| h.sector.as_str());
            if !within_cap(caps, remaining, candidate.security.sector_or_unclassified()) {
                continue;
            }
        }
        let incumbent = held[worst].metric;
        if !beats_by_margin(candidate.score, incumbent, margin, direction) {
            break;
        }
        let gone = held.remove(worst);
        let incumbent_text = incumbent
            .map(|m| format!("{m:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        log.push(entry(
            input.date,
            RebalanceAction::Exit,
            &gone.constituent.symbol,
            format!(
                "replaced by {}: {metric_name} {incumbent_text} vs {:.4} (margin {:.1}%)",
                candidate.symbol(),
                candidate.score,
                margin * 100.0
            ),
        ));
        log.push(entry(
            input.date,
            RebalanceAction::Entry,
            candidate.symbol(),
            format!(
                "replaced {}: {metric_name} {:.4} vs {incumbent_text}",
                gone.constituent.symbol, candidate.score
            ),
        ));
        held.push(admit(candidate, price, input.date));
    }

    let membership_changed = !log.is_empty();
    held.sort_by(|a, b| a.constituent.symbol.cmp(&b.constituent.symbol));

    let members: Vec<(&str, f64)> = held
        .iter()
        .map(|h| (h.constituent.symbol.as_str(), h.metric.unwrap_or(0.0)))
        .collect();
    let weights = target_weights(&config.weights, &members);

    let drifted = held.iter().zip(&weights).any(|(h, w)| {
        let old = h.constituent.target_weight;
        (w - old).abs() > margin * old.abs().max(f64::EPSILON)
    });
    if !membership_changed && !drifted && weights_balanced(input.current) {
        return unchanged();
    }

    let mut composition = Vec::with_capacity(held.len());
    for (h, weight) in held.into_iter().zip(weights) {
        let mut constituent = h.constituent;
        let previous = constituent.target_weight;
        let existing = current_symbols.contains(constituent.symbol.as_str());
        if existing && (weight - previous).abs() > crate::domain::index::WEIGHT_TOLERANCE {
            log.push(entry(
                input.date,
                RebalanceAction::Rebalance,
                &constituent.symbol,
                format!("weight adjusted from {:.4} to {:.4}", previous, weight),
            ));
        }
        constituent.target_weight = weight;
        composition.push(constituent);
    }

    RebalanceDecision {
        changed: !log.is_empty(),
        composition,
        log,
    }
}

fn admit(candidate: &Candidate, price: f64, date: NaiveDate) -> Held {
    Held {
        constituent: Constituent {
            symbol: candidate.symbol().to_string(),
            target_weight: 0.0,
            entry_price: price,
            entry_date: date,
        },
        metric: Some(candidate.score),
        sector: candidate.security.sector_or_unclassified().to_string(),
    }
}

/// Index of the weakest holding: missing metrics first, then the worst
/// metric, then the later symbol.
fn worst_index(held: &[Held], direction: OrderDirection) -> Option<usize> {
    held.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let by_metric = match (a.metric, b.metric) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => match direction {
                    OrderDirection::Desc => x.total_cmp(&y),
                    OrderDirection::Asc => y.total_cmp(&x),
                },
            };
            by_metric.then_with(|| b.constituent.symbol.cmp(&a.constituent.symbol))
        })
        .map(|(i, _)| i)
}

fn entry(date: NaiveDate, action: RebalanceAction, symbol: &str, reason: String) -> RebalanceLogEntry {
    RebalanceLogEntry {
        date,
        action,
        symbol: symbol.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{SectorCaps, WeightScheme};
    use crate::domain::index::total_weight;
    use crate::domain::security::{Fundamentals, Security};
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn candidate(symbol: &str, sector: &str, score: f64) -> Candidate {
        Candidate {
            security: Security {
                symbol: symbol.into(),
                name: symbol.into(),
                asset_type: "stock".into(),
                sector: Some(sector.into()),
                exchange: None,
                fundamentals: Fundamentals::default(),
            },
            score,
        }
    }

    fn held(symbol: &str, weight: f64) -> Constituent {
        Constituent {
            symbol: symbol.into(),
            target_weight: weight,
            entry_price: 10.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    fn config(top_n: usize) -> IndexConfiguration {
        let mut c = IndexConfiguration::from_json(r#"{"selection": {"orderBy": "dividendYield"}}"#)
            .unwrap();
        c.selection.top_n = top_n;
        c
    }

    fn screening(candidates: &[Candidate], extra_metrics: &[(&str, f64)]) -> ScreeningResult {
        let mut result = ScreeningResult {
            candidates: candidates.to_vec(),
            ..Default::default()
        };
        for c in candidates {
            result.metrics.insert(c.symbol().to_string(), c.score);
            result
                .sectors
                .insert(c.symbol().to_string(), c.security.sector_or_unclassified().to_string());
        }
        for (s, m) in extra_metrics {
            result.metrics.insert(s.to_string(), *m);
        }
        result
    }

    fn prices(symbols: &[&str]) -> HashMap<String, f64> {
        symbols.iter().map(|s| (s.to_string(), 20.0)).collect()
    }

    fn symbols(decision: &RebalanceDecision) -> Vec<&str> {
        decision.composition.iter().map(|c| c.symbol.as_str()).collect()
    }

    #[test]
    fn initial_composition_from_ideal() {
        let ideal = vec![candidate("A", "Tech", 0.05), candidate("B", "Energy", 0.04)];
        let scr = screening(&ideal, &[]);
        let cfg = config(2);
        let p = prices(&["A", "B"]);
        let d = decide(&RebalanceInput {
            current: &[],
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(d.changed);
        assert_eq!(symbols(&d), vec!["A", "B"]);
        assert_eq!(d.log.len(), 2);
        assert!(d.log.iter().all(|e| e.action == RebalanceAction::Entry));
        assert!((total_weight(&d.composition) - 1.0).abs() < 1e-9);
        assert_eq!(d.composition[0].entry_date, date());
        assert_eq!(d.composition[0].entry_price, 20.0);
    }

    #[test]
    fn small_advantage_makes_no_change() {
        // worst holding B at 0.040; challenger C at 0.041 is only 2.5% better
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("A", "Tech", 0.06), candidate("C", "Tech", 0.041)];
        let mut all = ideal.clone();
        all.push(candidate("B", "Tech", 0.040));
        let scr = screening(&all, &[]);
        let cfg = config(2);
        let p = prices(&["C"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(!d.changed);
        assert!(d.log.is_empty());
        assert_eq!(d.composition, current);
    }

    #[test]
    fn large_advantage_swaps_worst() {
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("C", "Tech", 0.08), candidate("A", "Tech", 0.06)];
        let mut all = ideal.clone();
        all.push(candidate("B", "Tech", 0.040));
        let scr = screening(&all, &[]);
        let cfg = config(2);
        let p = prices(&["C"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(d.changed);
        assert_eq!(symbols(&d), vec!["A", "C"]);
        let exit = d.log.iter().find(|e| e.action == RebalanceAction::Exit).unwrap();
        assert_eq!(exit.symbol, "B");
        assert!(exit.reason.contains("replaced by C"));
        let a = d.composition.iter().find(|c| c.symbol == "A").unwrap();
        assert_eq!(a.entry_price, 10.0);
    }

    #[test]
    fn quality_failure_evicts_and_fills_vacancy() {
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("A", "Tech", 0.06), candidate("C", "Tech", 0.03)];
        let scr = screening(&ideal, &[("B", 0.09)]);
        let cfg = config(2);
        let p = prices(&["C"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert_eq!(symbols(&d), vec!["A", "C"]);
        let exit = d.log.iter().find(|e| e.symbol == "B").unwrap();
        assert_eq!(exit.action, RebalanceAction::Exit);
        assert!(exit.reason.contains("quality"));
        let filled = d.log.iter().find(|e| e.symbol == "C").unwrap();
        assert!(filled.reason.contains("vacancy"));
    }

    #[test]
    fn quality_check_disabled_keeps_failing_constituent() {
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("A", "Tech", 0.06), candidate("C", "Tech", 0.03)];
        let scr = screening(&ideal, &[("B", 0.09)]);
        let mut cfg = config(2);
        cfg.rebalance.check_quality = false;
        let p = prices(&["C"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(!d.changed);
    }

    #[test]
    fn excluded_constituent_exits_with_rule() {
        let current = vec![held("AB5", 1.0)];
        let ideal = vec![candidate("C", "Tech", 0.03)];
        let mut scr = screening(&ideal, &[]);
        scr.excluded.push(("AB5".into(), "matches excluded pattern '*5'".into()));
        let cfg = config(1);
        let p = prices(&["C"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert_eq!(symbols(&d), vec!["C"]);
        assert!(d.log[0].reason.starts_with("excluded"));
    }

    #[test]
    fn empty_ideal_keeps_composition() {
        let current = vec![held("A", 1.0)];
        let scr = ScreeningResult::default();
        let cfg = config(1);
        let p = HashMap::new();
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &[],
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(!d.changed);
        assert_eq!(d.composition, current);
    }

    #[test]
    fn candidate_without_price_skipped() {
        let ideal = vec![candidate("A", "Tech", 0.05), candidate("B", "Tech", 0.04)];
        let scr = screening(&ideal, &[]);
        let cfg = config(2);
        let p = prices(&["B"]);
        let d = decide(&RebalanceInput {
            current: &[],
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert_eq!(symbols(&d), vec!["B"]);
        assert!((d.composition[0].target_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shrinking_selection_drops_worst() {
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("A", "Tech", 0.06)];
        let all = vec![candidate("A", "Tech", 0.06), candidate("B", "Tech", 0.05)];
        let scr = screening(&all, &[]);
        let cfg = config(1);
        let p = HashMap::new();
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert_eq!(symbols(&d), vec!["A"]);
        assert!(d.log.iter().any(|e| e.symbol == "B" && e.reason.contains("size reduced")));
        assert!(d
            .log
            .iter()
            .any(|e| e.symbol == "A" && e.action == RebalanceAction::Rebalance));
    }

    #[test]
    fn swap_respects_sector_caps() {
        let current = vec![held("T1", 0.5), held("E1", 0.5)];
        let ideal = vec![candidate("T2", "Tech", 0.50), candidate("T1", "Tech", 0.10)];
        let mut all = ideal.clone();
        all.push(candidate("E1", "Energy", 0.01));
        let scr = screening(&all, &[]);
        let mut cfg = config(2);
        cfg.diversification = Some(Diversification::MaxCount {
            max_count_per_sector: SectorCaps::Uniform(1),
        });
        let p = prices(&["T2"]);
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(!d.changed);
    }

    #[test]
    fn weight_scheme_change_reweights_members() {
        let current = vec![held("A", 0.5), held("B", 0.5)];
        let ideal = vec![candidate("A", "Tech", 3.0), candidate("B", "Tech", 1.0)];
        let scr = screening(&ideal, &[]);
        let mut cfg = config(2);
        cfg.weights = WeightScheme::Fixed {
            value: BTreeMap::from([("A".to_string(), 0.8)]),
        };
        let p = HashMap::new();
        let d = decide(&RebalanceInput {
            current: &current,
            screening: &scr,
            ideal: &ideal,
            config: &cfg,
            entry_prices: &p,
            date: date(),
        });
        assert!(d.changed);
        assert_eq!(d.log.len(), 2);
        assert!(d.log.iter().all(|e| e.action == RebalanceAction::Rebalance));
        assert!((d.composition[0].target_weight - 0.8).abs() < 1e-12);
    }

    #[test]
    fn margin_is_direction_aware() {
        assert!(beats_by_margin(1.10, Some(1.0), 0.05, OrderDirection::Desc));
        assert!(!beats_by_margin(1.04, Some(1.0), 0.05, OrderDirection::Desc));
        assert!(beats_by_margin(9.0, Some(10.0), 0.05, OrderDirection::Asc));
        assert!(!beats_by_margin(9.8, Some(10.0), 0.05, OrderDirection::Asc));
        assert!(beats_by_margin(-5.0, None, 0.05, OrderDirection::Desc));
        assert!(!beats_by_margin(1.0, Some(1.0), 0.0, OrderDirection::Desc));
    }
}
