//! Batch jobs over all enabled indices.
//!
//! Indices run in parallel on a local rayon pool. Within one index every step
//! is sequential: points in ascending date order, then the rebalance. A
//! failure is recorded against its index and never stops the others.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use log::{error, info, warn};
use rayon::prelude::*;

use crate::domain::calendar::TradingCalendar;
use crate::domain::diversification;
use crate::domain::error::EngineError;
use crate::domain::gap_fill::{self, GapFillReport};
use crate::domain::index::IndexDefinition;
use crate::domain::points::PointsEngine;
use crate::domain::ranking_strategy::StrategyRegistry;
use crate::domain::rebalance::{self, RebalanceDecision, RebalanceInput};
use crate::domain::screening::{Candidate, ScreeningPlan};
use crate::ports::index_store::IndexStore;
use crate::ports::market_data_port::{DividendPort, QuotePort};
use crate::ports::universe_port::UniversePort;

/// Everything a job needs; all collaborators are shared across threads.
pub struct JobContext<'a> {
    pub store: &'a dyn IndexStore,
    pub quotes: &'a dyn QuotePort,
    pub dividends: &'a dyn DividendPort,
    pub universe: &'a dyn UniversePort,
    pub registry: &'a StrategyRegistry,
    pub calendar: &'a TradingCalendar,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Points,
    Rebalance,
    /// Points, then rebalance, per index.
    Daily,
}

#[derive(Debug, Default)]
pub struct IndexRun {
    pub points: Option<GapFillReport>,
    pub rebalance: Option<RebalanceDecision>,
}

#[derive(Debug)]
pub struct IndexOutcome {
    pub code: String,
    pub result: Result<IndexRun, EngineError>,
}

#[derive(Debug, Default)]
pub struct JobReport {
    /// One entry per index, ordered by code.
    pub outcomes: Vec<IndexOutcome>,
}

impl JobReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(e) => Some((o.code.as_str(), e)),
            Ok(_) => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, code: &str) -> Option<&IndexOutcome> {
        self.outcomes.iter().find(|o| o.code == code)
    }
}

/// Run `kind` for one index (`only`) or every enabled index.
pub fn run_job(
    ctx: &JobContext<'_>,
    kind: JobKind,
    only: Option<&str>,
    date: NaiveDate,
) -> Result<JobReport, EngineError> {
    let definitions = match only {
        Some(code) => {
            let definition = ctx.store.get_definition(code)?;
            if !definition.enabled {
                warn!("{code} is disabled; skipping");
                return Ok(JobReport::default());
            }
            vec![definition]
        }
        None => ctx.store.list_definitions(true)?,
    };

    info!(
        "{kind:?} job for {date}: {} {}",
        definitions.len(),
        if definitions.len() == 1 { "index" } else { "indices" }
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.threads)
        .build()
        .map_err(|e| EngineError::ConfigInvalid {
            section: "jobs".into(),
            key: "threads".into(),
            reason: e.to_string(),
        })?;

    let mut outcomes: Vec<IndexOutcome> = pool.install(|| {
        definitions
            .par_iter()
            .map(|definition| IndexOutcome {
                code: definition.code.clone(),
                result: run_index(ctx, kind, definition, date),
            })
            .collect()
    });
    outcomes.sort_by(|a, b| a.code.cmp(&b.code));

    for (code, e) in outcomes.iter().filter_map(|o| o.result.as_ref().err().map(|e| (&o.code, e))) {
        error!("{code}: {e}");
    }
    Ok(JobReport { outcomes })
}

pub fn run_points_job(
    ctx: &JobContext<'_>,
    only: Option<&str>,
    today: NaiveDate,
) -> Result<JobReport, EngineError> {
    run_job(ctx, JobKind::Points, only, today)
}

pub fn run_rebalance_job(
    ctx: &JobContext<'_>,
    only: Option<&str>,
    date: NaiveDate,
) -> Result<JobReport, EngineError> {
    run_job(ctx, JobKind::Rebalance, only, date)
}

pub fn run_daily_job(
    ctx: &JobContext<'_>,
    only: Option<&str>,
    today: NaiveDate,
) -> Result<JobReport, EngineError> {
    run_job(ctx, JobKind::Daily, only, today)
}

fn run_index(
    ctx: &JobContext<'_>,
    kind: JobKind,
    definition: &IndexDefinition,
    date: NaiveDate,
) -> Result<IndexRun, EngineError> {
    let mut run = IndexRun::default();
    if matches!(kind, JobKind::Points | JobKind::Daily) {
        let engine = PointsEngine::new(ctx.store, ctx.quotes, ctx.dividends);
        run.points = Some(gap_fill::recover(&engine, ctx.calendar, definition, date)?);
    }
    if matches!(kind, JobKind::Rebalance | JobKind::Daily) {
        run.rebalance = Some(rebalance_index(ctx, definition, date)?);
    }
    Ok(run)
}

/// Screen, allocate and decide for one index, persisting the new composition
/// when it changed.
///
/// Before a changed composition is written the point series is brought up
/// to `date`, so every day up to and including the rebalance date is priced
/// with the weights held at its start. If those points cannot be computed the
/// rebalance fails and the old composition stays.
pub fn rebalance_index(
    ctx: &JobContext<'_>,
    definition: &IndexDefinition,
    date: NaiveDate,
) -> Result<RebalanceDecision, EngineError> {
    let config = &definition.configuration;
    let plan = ScreeningPlan::compile(config, ctx.registry)?;
    let universe = ctx
        .universe
        .list_securities(&config.universe, &config.asset_types)?;
    let screening = plan.screen(&universe)?;
    let ideal = diversification::select(
        &screening.candidates,
        &config.selection,
        config.diversification.as_ref(),
    );

    let current = ctx.store.composition(definition.id)?;
    let held: HashSet<&str> = current.iter().map(|c| c.symbol.as_str()).collect();
    let entry_prices = entry_prices(
        ctx.quotes,
        ideal.iter().filter(|c| !held.contains(c.symbol())),
        date,
    );

    let decision = rebalance::decide(&RebalanceInput {
        current: &current,
        screening: &screening,
        ideal: &ideal,
        config,
        entry_prices: &entry_prices,
        date,
    });

    if decision.changed {
        let engine = PointsEngine::new(ctx.store, ctx.quotes, ctx.dividends);
        gap_fill::recover(&engine, ctx.calendar, definition, date)?;
        ctx.store
            .replace_composition(definition.id, &decision.composition, &decision.log)?;
        info!(
            "{}: rebalanced on {date}, {} constituents, {} log entries",
            definition.code,
            decision.composition.len(),
            decision.log.len()
        );
    } else {
        info!("{}: composition unchanged on {date}", definition.code);
    }
    Ok(decision)
}

/// Close on `date` for each candidate, falling back to its snapshot price.
fn entry_prices<'c>(
    quotes: &dyn QuotePort,
    candidates: impl Iterator<Item = &'c Candidate>,
    date: NaiveDate,
) -> HashMap<String, f64> {
    let mut prices = HashMap::new();
    for candidate in candidates {
        let quoted = match quotes.close_price(candidate.symbol(), date) {
            Ok(price) => price,
            Err(e) => {
                warn!("quote for {} on {date} failed: {e}", candidate.symbol());
                None
            }
        };
        let price = quoted
            .filter(|p| *p > 0.0)
            .or(candidate.security.fundamentals.price.filter(|p| *p > 0.0));
        if let Some(price) = price {
            prices.insert(candidate.symbol().to_string(), price);
        }
    }
    prices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_failures() {
        let report = JobReport {
            outcomes: vec![
                IndexOutcome {
                    code: "A".into(),
                    result: Ok(IndexRun::default()),
                },
                IndexOutcome {
                    code: "B".into(),
                    result: Err(EngineError::UnknownStrategy {
                        name: "tarot".into(),
                    }),
                },
            ],
        };
        assert!(!report.is_success());
        let failed: Vec<&str> = report.failures().map(|(code, _)| code).collect();
        assert_eq!(failed, vec!["B"]);
        assert!(report.outcome("A").unwrap().result.is_ok());
    }

    #[test]
    fn empty_report_is_success() {
        assert!(JobReport::default().is_success());
    }
}
