//! Index points engine.
//!
//! Daily total-return chain: each constituent's return uses the close plus
//! the dividend going ex that day, weighted by the composition in effect, and
//! the index value compounds from the prior point:
//!
//! ```text
//! r_i      = (close_i + dividend_i) / prior_close_i - 1
//! R        = sum(w_i * r_i)
//! points_t = points_{t-1} * (1 + R)
//! ```
//!
//! `prior_close_i` is the latest close on or before the prior point's date,
//! so a constituent missing one day contributes zero for that day only and
//! its move across the gap lands on the day it is priced again.

use chrono::{Days, NaiveDate};
use log::{debug, info, warn};

use crate::domain::error::EngineError;
use crate::domain::index::{IndexDefinition, IndexHistoryPoint};
use crate::ports::index_store::IndexStore;
use crate::ports::market_data_port::{DividendPort, QuotePort};

/// A prior close older than this many calendar days is stale and the
/// constituent counts as missing.
pub const STALE_CLOSE_DAYS: u64 = 30;

/// Market data for one constituent on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstituentQuote {
    pub symbol: String,
    pub weight: f64,
    pub prior_close: Option<f64>,
    pub close: Option<f64>,
    /// Zero when nothing went ex that day.
    pub dividend: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReturn {
    pub total: f64,
    pub current_yield: f64,
    /// Constituents that contributed nothing for lack of prices.
    pub missing: Vec<String>,
}

pub fn compute_daily_return(quotes: &[ConstituentQuote]) -> DailyReturn {
    let mut total = 0.0;
    let mut current_yield = 0.0;
    let mut missing = Vec::new();

    for quote in quotes {
        match (quote.prior_close, quote.close) {
            (Some(prior), Some(close)) if prior > 0.0 && close.is_finite() => {
                let dividend = if quote.dividend.is_finite() { quote.dividend } else { 0.0 };
                let adjusted = close + dividend;
                total += quote.weight * (adjusted / prior - 1.0);
                current_yield += quote.weight * dividend / prior;
            }
            _ => missing.push(quote.symbol.clone()),
        }
    }

    DailyReturn {
        total,
        current_yield,
        missing,
    }
}

/// Chain one day onto `prior`.
pub fn next_point(prior: &IndexHistoryPoint, date: NaiveDate, ret: &DailyReturn) -> IndexHistoryPoint {
    IndexHistoryPoint {
        date,
        points: prior.points * (1.0 + ret.total),
        daily_change: ret.total,
        current_yield: ret.current_yield,
        dividend_points: prior.points * ret.current_yield,
        missing_constituents: u32::try_from(ret.missing.len()).unwrap_or(u32::MAX),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointsOutcome {
    Computed(IndexHistoryPoint),
    /// A point for the date already existed and was left untouched.
    AlreadyComputed(IndexHistoryPoint),
}

impl PointsOutcome {
    pub fn point(&self) -> &IndexHistoryPoint {
        match self {
            PointsOutcome::Computed(p) | PointsOutcome::AlreadyComputed(p) => p,
        }
    }
}

pub struct PointsEngine<'a> {
    store: &'a dyn IndexStore,
    quotes: &'a dyn QuotePort,
    dividends: &'a dyn DividendPort,
}

impl<'a> PointsEngine<'a> {
    pub fn new(
        store: &'a dyn IndexStore,
        quotes: &'a dyn QuotePort,
        dividends: &'a dyn DividendPort,
    ) -> Self {
        Self {
            store,
            quotes,
            dividends,
        }
    }

    pub fn store(&self) -> &'a dyn IndexStore {
        self.store
    }

    /// Compute and persist the point for `date`, chaining from the latest
    /// point before it.
    pub fn compute_for_date(
        &self,
        definition: &IndexDefinition,
        date: NaiveDate,
    ) -> Result<PointsOutcome, EngineError> {
        if let Some(existing) = self.store.point_on(definition.id, date)? {
            debug!("{}: point for {date} already present", definition.code);
            return Ok(PointsOutcome::AlreadyComputed(existing));
        }

        let prior = self
            .store
            .point_before(definition.id, date)?
            .ok_or_else(|| EngineError::MissingBaseline {
                code: definition.code.clone(),
                date,
            })?;

        let composition = self.store.composition(definition.id)?;
        let mut quotes = Vec::with_capacity(composition.len());
        let mut failures = Vec::new();

        for constituent in &composition {
            match self.fetch(&constituent.symbol, prior.date, date) {
                Ok((prior_close, close, dividend)) => quotes.push(ConstituentQuote {
                    symbol: constituent.symbol.clone(),
                    weight: constituent.target_weight,
                    prior_close,
                    close,
                    dividend,
                }),
                Err(e) => {
                    warn!(
                        "{}: market data error for {} on {date}: {e}",
                        definition.code, constituent.symbol
                    );
                    failures.push(format!("{}: {e}", constituent.symbol));
                    quotes.push(ConstituentQuote {
                        symbol: constituent.symbol.clone(),
                        weight: constituent.target_weight,
                        prior_close: None,
                        close: None,
                        dividend: 0.0,
                    });
                }
            }
        }

        let ret = compute_daily_return(&quotes);
        if !composition.is_empty() && ret.missing.len() == composition.len() {
            // nothing priced: an unimported day or a provider outage, never a 0% day
            let reason = if failures.is_empty() {
                format!("no closes for any of {} constituents", composition.len())
            } else {
                failures.join("; ")
            };
            return Err(EngineError::ProviderUnavailable {
                code: definition.code.clone(),
                date,
                reason,
            });
        }

        for symbol in &ret.missing {
            warn!(
                "{}: no usable price for {symbol} on {date}; contributing zero return",
                definition.code
            );
        }

        let point = next_point(&prior, date, &ret);
        if self.store.insert_point(definition.id, &point)? {
            info!(
                "{}: {date} points {:.4} ({:+.4}%)",
                definition.code,
                point.points,
                point.daily_change * 100.0
            );
            Ok(PointsOutcome::Computed(point))
        } else {
            // another writer got there first; its row stands
            let existing = self.store.point_on(definition.id, date)?.unwrap_or(point);
            Ok(PointsOutcome::AlreadyComputed(existing))
        }
    }

    fn fetch(
        &self,
        symbol: &str,
        prior_date: NaiveDate,
        date: NaiveDate,
    ) -> Result<(Option<f64>, Option<f64>, f64), EngineError> {
        let not_before = prior_date
            .checked_sub_days(Days::new(STALE_CLOSE_DAYS))
            .unwrap_or(NaiveDate::MIN);
        let prior_close = self
            .quotes
            .close_on_or_before(symbol, prior_date, not_before)?;
        let close = self.quotes.close_price(symbol, date)?;
        let dividend = self.dividends.dividend(symbol, date)?.unwrap_or(0.0);
        Ok((prior_close, close, dividend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quote(symbol: &str, weight: f64, prior: f64, close: f64, dividend: f64) -> ConstituentQuote {
        ConstituentQuote {
            symbol: symbol.into(),
            weight,
            prior_close: Some(prior),
            close: Some(close),
            dividend,
        }
    }

    fn base() -> IndexHistoryPoint {
        IndexHistoryPoint::inception(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    fn next_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    #[test]
    fn price_rise_of_ten_percent() {
        let ret = compute_daily_return(&[quote("A", 1.0, 50.0, 55.0, 0.0)]);
        let p = next_point(&base(), next_day(), &ret);
        assert_relative_eq!(p.points, 110.0, epsilon = 1e-9);
        assert_relative_eq!(p.daily_change, 0.10, epsilon = 1e-12);
        assert_eq!(p.dividend_points, 0.0);
    }

    #[test]
    fn dividend_counts_as_return() {
        let ret = compute_daily_return(&[quote("A", 1.0, 50.0, 50.0, 1.0)]);
        let p = next_point(&base(), next_day(), &ret);
        assert_relative_eq!(p.daily_change, 0.02, epsilon = 1e-12);
        assert_relative_eq!(p.points, 102.0, epsilon = 1e-9);
        assert_relative_eq!(p.current_yield, 0.02, epsilon = 1e-12);
        // display figure only, already inside points
        assert_relative_eq!(p.dividend_points, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn weighted_sum_of_returns() {
        let ret = compute_daily_return(&[
            quote("A", 0.5, 10.0, 11.0, 0.0),
            quote("B", 0.5, 20.0, 19.0, 0.0),
        ]);
        assert_relative_eq!(ret.total, 0.5 * 0.10 + 0.5 * -0.05, epsilon = 1e-12);
        assert!(ret.missing.is_empty());
    }

    #[test]
    fn missing_price_contributes_zero() {
        let mut gone = quote("B", 0.5, 20.0, 0.0, 0.0);
        gone.close = None;
        let ret = compute_daily_return(&[quote("A", 0.5, 10.0, 11.0, 0.0), gone]);
        assert_relative_eq!(ret.total, 0.05, epsilon = 1e-12);
        assert_eq!(ret.missing, vec!["B".to_string()]);
        let p = next_point(&base(), next_day(), &ret);
        assert_eq!(p.missing_constituents, 1);
    }

    #[test]
    fn zero_prior_close_is_missing() {
        let ret = compute_daily_return(&[quote("A", 1.0, 0.0, 5.0, 0.0)]);
        assert_eq!(ret.total, 0.0);
        assert_eq!(ret.missing.len(), 1);
    }

    #[test]
    fn empty_composition_is_flat() {
        let ret = compute_daily_return(&[]);
        let p = next_point(&base(), next_day(), &ret);
        assert_eq!(p.points, 100.0);
        assert_eq!(p.daily_change, 0.0);
    }

    #[test]
    fn outcome_exposes_point() {
        let p = base();
        assert_eq!(PointsOutcome::AlreadyComputed(p.clone()).point(), &p);
    }
}
