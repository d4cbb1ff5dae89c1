//! Named ranking strategies that an index configuration can embed.
//!
//! A strategy scores the universe; its scored output becomes the screening
//! candidate pool and the score is available as the `strategyScore` ranking
//! metric.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::security::Security;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyScore {
    pub symbol: String,
    pub score: f64,
}

pub trait RankingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn rank(&self, universe: &[Security], params: &StrategyParams)
    -> Result<Vec<StrategyScore>, EngineError>;
}

/// Typed access to the `params` object of a strategy reference.
#[derive(Debug, Clone, Default)]
pub struct StrategyParams {
    strategy: String,
    values: Map<String, Value>,
}

impl StrategyParams {
    pub fn new(strategy: &str, values: Map<String, Value>) -> Self {
        Self {
            strategy: strategy.to_string(),
            values,
        }
    }

    pub fn number(&self, key: &str, default: f64) -> Result<f64, EngineError> {
        Ok(self.optional_number(key)?.unwrap_or(default))
    }

    pub fn optional_number(&self, key: &str) -> Result<Option<f64>, EngineError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => match v.as_f64() {
                Some(n) if n.is_finite() => Ok(Some(n)),
                _ => Err(self.invalid(key, "expected a number")),
            },
        }
    }

    pub fn invalid(&self, key: &str, reason: &str) -> EngineError {
        EngineError::StrategyParam {
            strategy: self.strategy.clone(),
            param: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Discounted cash flow valuation. Scores each security by its upside,
/// `intrinsic_value / price - 1`.
///
/// Params: `growthRate` (0.05), `discountRate` (0.10), `terminalGrowth`
/// (0.02), `years` (5), optional `minUpside`.
#[derive(Debug, Default)]
pub struct DiscountedCashFlow;

impl DiscountedCashFlow {
    pub fn intrinsic_value(
        free_cash_flow: f64,
        growth: f64,
        discount: f64,
        terminal_growth: f64,
        years: u32,
    ) -> f64 {
        let mut value = 0.0;
        let mut cash_flow = free_cash_flow;
        let mut factor = 1.0;
        for _ in 0..years {
            cash_flow *= 1.0 + growth;
            factor *= 1.0 + discount;
            value += cash_flow / factor;
        }
        let terminal = cash_flow * (1.0 + terminal_growth) / (discount - terminal_growth);
        value + terminal / factor
    }
}

impl RankingStrategy for DiscountedCashFlow {
    fn name(&self) -> &'static str {
        "dcf"
    }

    fn rank(
        &self,
        universe: &[Security],
        params: &StrategyParams,
    ) -> Result<Vec<StrategyScore>, EngineError> {
        let growth = params.number("growthRate", 0.05)?;
        let discount = params.number("discountRate", 0.10)?;
        let terminal_growth = params.number("terminalGrowth", 0.02)?;
        let years = params.number("years", 5.0)?;
        let min_upside = params.optional_number("minUpside")?;

        if discount <= terminal_growth {
            return Err(params.invalid("discountRate", "must exceed terminalGrowth"));
        }
        if years < 1.0 || years > 50.0 || years.fract() != 0.0 {
            return Err(params.invalid("years", "must be a whole number between 1 and 50"));
        }

        let mut scores = Vec::new();
        for security in universe {
            let f = &security.fundamentals;
            let (Some(fcf), Some(price)) = (f.free_cash_flow_per_share, f.price) else {
                continue;
            };
            if fcf <= 0.0 || price <= 0.0 {
                continue;
            }
            let intrinsic =
                Self::intrinsic_value(fcf, growth, discount, terminal_growth, years as u32);
            let upside = intrinsic / price - 1.0;
            if min_upside.is_some_and(|min| upside < min) {
                continue;
            }
            scores.push(StrategyScore {
                symbol: security.symbol.clone(),
                score: upside,
            });
        }
        Ok(scores)
    }
}

/// Composite quality rank: mean percentile of ROE (higher is better), net
/// margin (higher is better) and debt/equity (lower is better), on 0..=100.
///
/// Params: optional `minScore`.
#[derive(Debug, Default)]
pub struct QualityRank;

impl RankingStrategy for QualityRank {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn rank(
        &self,
        universe: &[Security],
        params: &StrategyParams,
    ) -> Result<Vec<StrategyScore>, EngineError> {
        let min_score = params.optional_number("minScore")?;

        let mut eligible: Vec<(&str, f64, f64, f64)> = universe
            .iter()
            .filter_map(|s| {
                let f = &s.fundamentals;
                Some((s.symbol.as_str(), f.roe?, f.net_margin?, f.debt_to_equity?))
            })
            .filter(|(_, a, b, c)| a.is_finite() && b.is_finite() && c.is_finite())
            .collect();
        eligible.sort_by(|a, b| a.0.cmp(b.0));

        let roe = percentile_ranks(&eligible.iter().map(|e| e.1).collect::<Vec<_>>());
        let margin = percentile_ranks(&eligible.iter().map(|e| e.2).collect::<Vec<_>>());
        let leverage = percentile_ranks(&eligible.iter().map(|e| -e.3).collect::<Vec<_>>());

        Ok(eligible
            .iter()
            .enumerate()
            .map(|(i, e)| StrategyScore {
                symbol: e.0.to_string(),
                score: (roe[i] + margin[i] + leverage[i]) / 3.0,
            })
            .filter(|s| min_score.is_none_or(|min| s.score >= min))
            .collect())
    }
}

/// Percentile rank (0..=100) of each value; ties share their average rank.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![100.0];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0;
        for k in i..=j {
            ranks[order[k]] = average / (n - 1) as f64 * 100.0;
        }
        i = j + 1;
    }
    ranks
}

pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn RankingStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let dcf: Arc<dyn RankingStrategy> = Arc::new(DiscountedCashFlow);
        let quality: Arc<dyn RankingStrategy> = Arc::new(QualityRank);
        registry.register("dcf", dcf.clone());
        registry.register("discounted_cash_flow", dcf);
        registry.register("quality", quality.clone());
        registry.register("quality_rank", quality);
        registry
    }

    pub fn register(&mut self, name: &str, strategy: Arc<dyn RankingStrategy>) {
        self.strategies.insert(name.to_lowercase(), strategy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RankingStrategy>, EngineError> {
        self.strategies
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| EngineError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
