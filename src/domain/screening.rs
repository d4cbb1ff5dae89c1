//! Screening engine.
//!
//! Compiles an index configuration into a [`ScreeningPlan`] once, then runs it
//! over a security universe:
//!
//! 1. restrict to the configured asset types
//! 2. drop excluded tickers (explicit list and patterns) before anything else
//! 3. when a ranking strategy is configured, its scored output is the pool
//! 4. apply the quality filters on top of the pool
//! 5. rank by the configured metric, ties broken by symbol

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::domain::config::{
    Diversification, IndexConfiguration, OrderDirection, WeightScheme,
};
use crate::domain::error::{EngineError, FilterError};
use crate::domain::exclusion::ExclusionRules;
use crate::domain::filter::FilterTree;
use crate::domain::filter_eval;
use crate::domain::filter_parser;
use crate::domain::ranking_strategy::{RankingStrategy, StrategyParams, StrategyRegistry};
use crate::domain::security::{FinancialField, Security};

pub const STRATEGY_SCORE: &str = "strategyScore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMetric {
    Field(FinancialField),
    StrategyScore,
}

impl RankingMetric {
    pub fn name(self) -> &'static str {
        match self {
            RankingMetric::Field(f) => f.name(),
            RankingMetric::StrategyScore => STRATEGY_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub security: Security,
    /// Value of the ranking metric.
    pub score: f64,
}

impl Candidate {
    pub fn symbol(&self) -> &str {
        &self.security.symbol
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreeningResult {
    /// Securities passing every rule, best first.
    pub candidates: Vec<Candidate>,
    /// Ranking metric of every non-excluded security that has one, whether or
    /// not it passed the filters.
    pub metrics: BTreeMap<String, f64>,
    /// Sector bucket of every non-excluded security.
    pub sectors: BTreeMap<String, String>,
    /// Excluded symbols with the rule that excluded them.
    pub excluded: Vec<(String, String)>,
}

impl ScreeningResult {
    pub fn passes(&self, symbol: &str) -> bool {
        self.candidates.iter().any(|c| c.symbol() == symbol)
    }

    pub fn exclusion_reason(&self, symbol: &str) -> Option<&str> {
        self.excluded
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, reason)| reason.as_str())
    }
}

pub struct ScreeningPlan {
    asset_types: Vec<String>,
    exclusions: ExclusionRules,
    filters: FilterTree,
    strategy: Option<(Arc<dyn RankingStrategy>, StrategyParams)>,
    metric: RankingMetric,
    direction: OrderDirection,
}

impl std::fmt::Debug for ScreeningPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreeningPlan")
            .field("asset_types", &self.asset_types)
            .field("filters", &self.filters)
            .field("strategy", &self.strategy.as_ref().map(|(s, _)| s.name()))
            .field("metric", &self.metric)
            .field("direction", &self.direction)
            .finish()
    }
}

impl ScreeningPlan {
    pub fn compile(
        config: &IndexConfiguration,
        registry: &StrategyRegistry,
    ) -> Result<Self, EngineError> {
        validate_structure(config)?;

        let filters = filter_parser::parse(&config.quality)?;
        let exclusions =
            ExclusionRules::new(&config.excluded_tickers, &config.excluded_ticker_patterns)?;

        let strategy = match &filters.strategy {
            Some(reference) => {
                let strategy = registry.get(&reference.name)?;
                let params = StrategyParams::new(&reference.name, reference.params.clone());
                Some((strategy, params))
            }
            None => None,
        };

        let metric = resolve_metric(config.selection.order_by.as_deref(), strategy.is_some())?;

        Ok(Self {
            asset_types: config
                .asset_types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            exclusions,
            filters,
            strategy,
            metric,
            direction: config.selection.order_direction,
        })
    }

    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    pub fn metric(&self) -> RankingMetric {
        self.metric
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    pub fn exclusions(&self) -> &ExclusionRules {
        &self.exclusions
    }

    /// Order two metric values best first.
    pub fn compare_scores(&self, a: f64, b: f64) -> Ordering {
        match self.direction {
            OrderDirection::Desc => b.total_cmp(&a),
            OrderDirection::Asc => a.total_cmp(&b),
        }
    }

    pub fn screen(&self, universe: &[Security]) -> Result<ScreeningResult, EngineError> {
        let mut result = ScreeningResult::default();

        let mut eligible: Vec<&Security> = Vec::with_capacity(universe.len());
        for security in universe {
            if !self.asset_types.is_empty()
                && !self
                    .asset_types
                    .contains(&security.asset_type.trim().to_lowercase())
            {
                continue;
            }
            if let Some(reason) = self.exclusions.reason(&security.symbol) {
                result.excluded.push((security.symbol.clone(), reason));
                continue;
            }
            eligible.push(security);
        }

        let strategy_scores: Option<BTreeMap<String, f64>> = match &self.strategy {
            Some((strategy, params)) => {
                let owned: Vec<Security> = eligible.iter().map(|s| (*s).clone()).collect();
                let scores = strategy.rank(&owned, params)?;
                debug!(
                    "strategy {} scored {} of {} securities",
                    strategy.name(),
                    scores.len(),
                    owned.len()
                );
                Some(
                    scores
                        .into_iter()
                        .filter(|s| s.score.is_finite())
                        .map(|s| (s.symbol, s.score))
                        .collect(),
                )
            }
            None => None,
        };

        for security in &eligible {
            result.sectors.insert(
                security.symbol.clone(),
                security.sector_or_unclassified().to_string(),
            );
            let metric = match self.metric {
                RankingMetric::Field(field) => security.number(field),
                RankingMetric::StrategyScore => strategy_scores
                    .as_ref()
                    .and_then(|m| m.get(&security.symbol).copied()),
            };
            let Some(score) = metric else {
                continue;
            };
            result.metrics.insert(security.symbol.clone(), score);

            let in_pool = strategy_scores
                .as_ref()
                .is_none_or(|m| m.contains_key(&security.symbol));
            if in_pool && filter_eval::evaluate(&self.filters, security) {
                result.candidates.push(Candidate {
                    security: (*security).clone(),
                    score,
                });
            }
        }

        result.candidates.sort_by(|a, b| {
            self.compare_scores(a.score, b.score)
                .then_with(|| a.security.symbol.cmp(&b.security.symbol))
        });

        debug!(
            "screening: {} securities, {} excluded, {} candidates",
            universe.len(),
            result.excluded.len(),
            result.candidates.len()
        );
        Ok(result)
    }
}

fn resolve_metric(order_by: Option<&str>, has_strategy: bool) -> Result<RankingMetric, FilterError> {
    const PATH: &str = "selection.orderBy";
    match order_by.map(str::trim).filter(|s| !s.is_empty()) {
        None if has_strategy => Ok(RankingMetric::StrategyScore),
        None => Err(FilterError::new(
            PATH,
            "a ranking field is required when no strategy is configured",
        )),
        Some(name) if name.eq_ignore_ascii_case(STRATEGY_SCORE) || name.eq_ignore_ascii_case("score") => {
            if has_strategy {
                Ok(RankingMetric::StrategyScore)
            } else {
                Err(FilterError::new(PATH, "strategyScore requires a strategy"))
            }
        }
        Some(name) => match FinancialField::from_name(name) {
            Some(field) if !field.is_text() => Ok(RankingMetric::Field(field)),
            Some(field) => Err(FilterError::new(
                PATH,
                format!("cannot rank by text field '{field}'"),
            )),
            None => Err(FilterError::new(PATH, format!("unknown field '{name}'"))),
        },
    }
}

fn validate_structure(config: &IndexConfiguration) -> Result<(), FilterError> {
    let selection = &config.selection;
    if selection.top_n == 0 {
        return Err(FilterError::new("selection.topN", "must be at least 1"));
    }
    if let Some(bands) = &selection.score_bands {
        for (i, band) in bands.iter().enumerate() {
            if !band.min.is_finite() || band.max.is_some_and(|max| !(max > band.min)) {
                return Err(FilterError::new(
                    format!("selection.scoreBands[{i}]"),
                    "max must be greater than min",
                ));
            }
        }
    }

    let threshold = config.rebalance.threshold;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(FilterError::new(
            "rebalance.threshold",
            "must be a non-negative number",
        ));
    }

    if let WeightScheme::Fixed { value } = &config.weights {
        let total: f64 = value.values().sum();
        if value.values().any(|w| !w.is_finite() || *w < 0.0) || total > 1.0 + 1e-9 {
            return Err(FilterError::new(
                "weights.value",
                "fixed weights must be non-negative and sum to at most 1",
            ));
        }
    }

    match &config.diversification {
        Some(Diversification::Allocation { sector_allocation }) => {
            let total: f64 = sector_allocation.values().sum();
            if sector_allocation.values().any(|p| !p.is_finite() || *p < 0.0) || total > 100.0 + 1e-9 {
                return Err(FilterError::new(
                    "diversification.sectorAllocation",
                    "percentages must be non-negative and sum to at most 100",
                ));
            }
        }
        Some(Diversification::MaxCount { .. }) | None => {}
    }
    Ok(())
}
