//! Market data ports: daily closes and dividends.
//!
//! `Ok(None)` means the provider answered and has no value for that day.
//! `Err` means the provider could not be asked.

use chrono::NaiveDate;

use crate::domain::error::EngineError;

pub trait QuotePort: Send + Sync {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError>;

    /// Latest close dated within `not_before..=date`.
    ///
    /// The default walks back one day at a time; adapters backed by a query
    /// language override it with a single lookup.
    fn close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        let mut day = date;
        while day >= not_before {
            if let Some(close) = self.close_price(symbol, day)? {
                return Ok(Some(close));
            }
            day = match day.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
        }
        Ok(None)
    }
}

pub trait DividendPort: Send + Sync {
    /// Cash dividend per share going ex on `date`.
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError>;
}

/// A provider serving both closes and dividends.
pub trait MarketDataPort: QuotePort + DividendPort {}

impl<T: QuotePort + DividendPort> MarketDataPort for T {}
