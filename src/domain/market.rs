//! Market data records loaded by the import commands.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DividendRecord {
    pub symbol: String,
    pub ex_date: NaiveDate,
    pub amount: f64,
}
