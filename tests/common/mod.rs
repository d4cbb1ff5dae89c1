#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use theoindex::adapters::sqlite_adapter::SqliteAdapter;
use theoindex::domain::calendar::TradingCalendar;
use theoindex::domain::config::IndexConfiguration;
use theoindex::domain::error::EngineError;
use theoindex::domain::index::{Constituent, IndexDefinition, NewIndexDefinition};
use theoindex::domain::jobs::JobContext;
use theoindex::domain::ranking_strategy::StrategyRegistry;
use theoindex::domain::security::{Fundamentals, Security};
use theoindex::ports::index_store::IndexStore;
use theoindex::ports::market_data_port::{DividendPort, QuotePort};
use theoindex::ports::universe_port::UniversePort;

/// Closes and dividends keyed by symbol and date, with symbols that always
/// fail and symbols quoted at one price every day.
#[derive(Default)]
pub struct MockMarket {
    pub closes: HashMap<(String, NaiveDate), f64>,
    pub flat: HashMap<String, f64>,
    pub dividends: HashMap<(String, NaiveDate), f64>,
    pub errors: HashSet<String>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_close(mut self, symbol: &str, date: NaiveDate, close: f64) -> Self {
        self.closes.insert((symbol.to_string(), date), close);
        self
    }

    /// One close per date, in order.
    pub fn with_series(mut self, symbol: &str, series: &[(NaiveDate, f64)]) -> Self {
        for (date, close) in series {
            self.closes.insert((symbol.to_string(), *date), *close);
        }
        self
    }

    /// `close` on every date without an explicit close.
    pub fn with_flat(mut self, symbol: &str, close: f64) -> Self {
        self.flat.insert(symbol.to_string(), close);
        self
    }

    pub fn with_dividend(mut self, symbol: &str, date: NaiveDate, amount: f64) -> Self {
        self.dividends.insert((symbol.to_string(), date), amount);
        self
    }

    pub fn with_error(mut self, symbol: &str) -> Self {
        self.errors.insert(symbol.to_string());
        self
    }

    fn check(&self, symbol: &str) -> Result<(), EngineError> {
        if self.errors.contains(symbol) {
            return Err(EngineError::Provider {
                reason: format!("{symbol}: connection refused"),
            });
        }
        Ok(())
    }
}

impl QuotePort for MockMarket {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.check(symbol)?;
        Ok(self
            .closes
            .get(&(symbol.to_string(), date))
            .or_else(|| self.flat.get(symbol))
            .copied())
    }
}

impl DividendPort for MockMarket {
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.check(symbol)?;
        Ok(self.dividends.get(&(symbol.to_string(), date)).copied())
    }
}

/// A fixed universe; the universe name is ignored.
pub struct MockUniverse {
    pub securities: Vec<Security>,
}

impl MockUniverse {
    pub fn new(securities: Vec<Security>) -> Self {
        Self { securities }
    }
}

impl UniversePort for MockUniverse {
    fn list_securities(
        &self,
        _universe: &str,
        asset_types: &[String],
    ) -> Result<Vec<Security>, EngineError> {
        Ok(self
            .securities
            .iter()
            .filter(|s| {
                asset_types.is_empty()
                    || asset_types.iter().any(|t| t.eq_ignore_ascii_case(&s.asset_type))
            })
            .cloned()
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

pub fn stock(symbol: &str, sector: &str, dividend_yield: f64, price: f64) -> Security {
    Security {
        symbol: symbol.to_string(),
        name: format!("{symbol} Inc"),
        asset_type: "stock".to_string(),
        sector: Some(sector.to_string()),
        exchange: Some("NYSE".to_string()),
        fundamentals: Fundamentals {
            price: Some(price),
            dividend_yield: Some(dividend_yield),
            pe_ratio: Some(15.0),
            ..Fundamentals::default()
        },
    }
}

pub fn configuration(json: &str) -> IndexConfiguration {
    IndexConfiguration::from_json(json).unwrap()
}

/// Top `top_n` by dividend yield, equal weights.
pub fn yield_config(top_n: usize) -> IndexConfiguration {
    configuration(&format!(
        r#"{{"selection": {{"topN": {top_n}, "orderBy": "dividendYield"}}}}"#
    ))
}

pub fn create_index(
    store: &dyn IndexStore,
    code: &str,
    configuration: IndexConfiguration,
    inception: NaiveDate,
) -> IndexDefinition {
    store
        .create_definition(&NewIndexDefinition {
            code: code.to_string(),
            name: format!("{code} index"),
            methodology: String::new(),
            configuration,
            inception_date: inception,
        })
        .unwrap()
}

pub fn constituent(symbol: &str, weight: f64, entered: NaiveDate) -> Constituent {
    Constituent {
        symbol: symbol.to_string(),
        target_weight: weight,
        entry_price: 10.0,
        entry_date: entered,
    }
}

pub fn hold(store: &dyn IndexStore, index: &IndexDefinition, members: &[Constituent]) {
    store.replace_composition(index.id, members, &[]).unwrap();
}

pub fn job_context<'a>(
    store: &'a SqliteAdapter,
    market: &'a MockMarket,
    universe: &'a dyn UniversePort,
    registry: &'a StrategyRegistry,
    calendar: &'a TradingCalendar,
) -> JobContext<'a> {
    JobContext {
        store,
        quotes: market,
        dividends: market,
        universe,
        registry,
        calendar,
        threads: 2,
    }
}
