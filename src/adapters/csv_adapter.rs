//! CSV market data adapter.
//!
//! Serves closes and dividends from a directory holding one `<SYMBOL>.csv`
//! per security with the columns `date,close[,dividend]`. Also reads the
//! long-format `symbol,date,close[,dividend]` files used for bulk import.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use log::debug;

use crate::domain::error::EngineError;
use crate::domain::market::{DividendRecord, PriceRecord};
use crate::ports::market_data_port::{DividendPort, QuotePort};

/// Close and dividend for one day.
type DaySeries = BTreeMap<NaiveDate, (f64, Option<f64>)>;

pub struct CsvAdapter {
    base_path: PathBuf,
    cache: Mutex<HashMap<String, Arc<DaySeries>>>,
}

/// Contents of a long-format price file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PriceFile {
    pub prices: Vec<PriceRecord>,
    pub dividends: Vec<DividendRecord>,
}

fn csv_err(path: &Path, line: usize, reason: impl std::fmt::Display) -> EngineError {
    EngineError::Csv {
        reason: format!("{}:{line}: {reason}", path.display()),
    }
}

fn parse_date(path: &Path, line: usize, text: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| csv_err(path, line, format!("invalid date '{text}': {e}")))
}

fn parse_number(path: &Path, line: usize, column: &str, text: &str) -> Result<f64, EngineError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|e| csv_err(path, line, format!("invalid {column} '{text}': {e}")))?;
    if !value.is_finite() {
        return Err(csv_err(path, line, format!("{column} is not finite")));
    }
    Ok(value)
}

/// Optional dividend column; blank means none.
fn parse_dividend(
    path: &Path,
    line: usize,
    text: Option<&str>,
) -> Result<Option<f64>, EngineError> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => {
            let amount = parse_number(path, line, "dividend", t)?;
            Ok((amount > 0.0).then_some(amount))
        }
        None => Ok(None),
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Parsed series for `symbol`, or `None` when it has no file.
    fn series(&self, symbol: &str) -> Result<Option<Arc<DaySeries>>, EngineError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(series) = cache.get(symbol) {
                return Ok(Some(Arc::clone(series)));
            }
        }

        let path = self.csv_path(symbol);
        if !path.exists() {
            debug!("no price file for {symbol} at {}", path.display());
            return Ok(None);
        }
        let series = Arc::new(Self::read_symbol_file(&path)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(symbol.to_string(), Arc::clone(&series));
        }
        Ok(Some(series))
    }

    fn read_symbol_file(path: &Path) -> Result<DaySeries, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| EngineError::Provider {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut series = DaySeries::new();

        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| csv_err(path, line, e))?;
            let date = parse_date(
                path,
                line,
                record.get(0).ok_or_else(|| csv_err(path, line, "missing date column"))?,
            )?;
            let close = parse_number(
                path,
                line,
                "close",
                record.get(1).ok_or_else(|| csv_err(path, line, "missing close column"))?,
            )?;
            let dividend = parse_dividend(path, line, record.get(2))?;
            series.insert(date, (close, dividend));
        }
        Ok(series)
    }

    /// Read a long-format `symbol,date,close[,dividend]` file.
    pub fn read_price_file(path: &Path) -> Result<PriceFile, EngineError> {
        let content = fs::read_to_string(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut file = PriceFile::default();

        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| csv_err(path, line, e))?;
            let symbol = record
                .get(0)
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| csv_err(path, line, "missing symbol column"))?;
            let date = parse_date(
                path,
                line,
                record.get(1).ok_or_else(|| csv_err(path, line, "missing date column"))?,
            )?;
            let close = parse_number(
                path,
                line,
                "close",
                record.get(2).ok_or_else(|| csv_err(path, line, "missing close column"))?,
            )?;
            if let Some(amount) = parse_dividend(path, line, record.get(3))? {
                file.dividends.push(DividendRecord {
                    symbol: symbol.clone(),
                    ex_date: date,
                    amount,
                });
            }
            file.prices.push(PriceRecord {
                symbol,
                date,
                close,
            });
        }
        Ok(file)
    }
}

impl QuotePort for CsvAdapter {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        Ok(self
            .series(symbol)?
            .and_then(|s| s.get(&date).map(|(close, _)| *close)))
    }

    fn close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        if not_before > date {
            return Ok(None);
        }
        Ok(self
            .series(symbol)?
            .and_then(|s| s.range(not_before..=date).next_back().map(|(_, (close, _))| *close)))
    }
}

impl DividendPort for CsvAdapter {
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        Ok(self
            .series(symbol)?
            .and_then(|s| s.get(&date).and_then(|(_, dividend)| *dividend)))
    }
}
