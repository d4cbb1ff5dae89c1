//! Bounded retry around a market data provider.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use log::warn;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::{DividendPort, MarketDataPort, QuotePort};

pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_MS: u64 = 200;

/// Retries transient provider errors up to `retries` extra times, waiting
/// `backoff * attempt` between attempts. `Ok(None)` is never retried.
pub struct RetryingMarketData {
    inner: Arc<dyn MarketDataPort>,
    retries: u32,
    backoff: Duration,
}

impl RetryingMarketData {
    pub fn new(inner: Arc<dyn MarketDataPort>, retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }

    pub fn from_config(inner: Arc<dyn MarketDataPort>, config: &dyn ConfigPort) -> Self {
        let retries = config
            .get_int("market_data", "retries", i64::from(DEFAULT_RETRIES))
            .clamp(0, 10) as u32;
        let backoff = config
            .get_int("market_data", "retry_backoff_ms", DEFAULT_BACKOFF_MS as i64)
            .max(0) as u64;
        Self::new(inner, retries, Duration::from_millis(backoff))
    }

    fn attempt<T>(
        &self,
        what: &str,
        call: impl Fn() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!("{what} failed ({e}); retry {attempt}/{}", self.retries);
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff * attempt);
                    }
                }
                other => return other,
            }
        }
    }
}

impl QuotePort for RetryingMarketData {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.attempt(&format!("close for {symbol} on {date}"), || {
            self.inner.close_price(symbol, date)
        })
    }

    fn close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        self.attempt(&format!("close for {symbol} from {not_before} to {date}"), || {
            self.inner.close_on_or_before(symbol, date, not_before)
        })
    }
}

impl DividendPort for RetryingMarketData {
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.attempt(&format!("dividend for {symbol} on {date}"), || {
            self.inner.dividend(symbol, date)
        })
    }
}
