//! Index entities: definition, composition snapshot, point history and the
//! rebalance audit log.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::config::IndexConfiguration;

pub const BASE_POINTS: f64 = 100.0;
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub methodology: String,
    pub configuration: IndexConfiguration,
    pub inception_date: NaiveDate,
    pub enabled: bool,
}

/// Fields supplied when registering an index; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIndexDefinition {
    pub code: String,
    pub name: String,
    pub methodology: String,
    pub configuration: IndexConfiguration,
    pub inception_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub symbol: String,
    pub target_weight: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
}

pub fn total_weight(composition: &[Constituent]) -> f64 {
    composition.iter().map(|c| c.target_weight).sum()
}

/// True for an empty composition or one whose weights sum to 1.
pub fn weights_balanced(composition: &[Constituent]) -> bool {
    composition.is_empty() || (total_weight(composition) - 1.0).abs() <= WEIGHT_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHistoryPoint {
    pub date: NaiveDate,
    pub points: f64,
    pub daily_change: f64,
    pub current_yield: f64,
    /// Dividend contribution expressed in points. Display only: the dividend
    /// is already inside `daily_change`.
    pub dividend_points: f64,
    pub missing_constituents: u32,
}

impl IndexHistoryPoint {
    pub fn inception(date: NaiveDate) -> Self {
        Self {
            date,
            points: BASE_POINTS,
            daily_change: 0.0,
            current_yield: 0.0,
            dividend_points: 0.0,
            missing_constituents: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebalanceAction {
    Entry,
    Exit,
    Rebalance,
}

impl RebalanceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RebalanceAction::Entry => "ENTRY",
            RebalanceAction::Exit => "EXIT",
            RebalanceAction::Rebalance => "REBALANCE",
        }
    }
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(RebalanceAction::Entry),
            "EXIT" => Ok(RebalanceAction::Exit),
            "REBALANCE" => Ok(RebalanceAction::Rebalance),
            other => Err(format!("unknown rebalance action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceLogEntry {
    pub date: NaiveDate,
    pub action: RebalanceAction,
    pub symbol: String,
    pub reason: String,
}
