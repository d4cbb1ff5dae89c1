//! Index configuration document.
//!
//! The admin-authored JSON blob stored with each index definition. Only the
//! structural parts are typed here; the `quality` section stays raw JSON and
//! is compiled into a filter tree by [`crate::domain::filter_parser`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_REBALANCE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfiguration {
    #[serde(default)]
    pub universe: String,
    #[serde(default)]
    pub asset_types: Vec<String>,
    #[serde(default)]
    pub excluded_tickers: Vec<String>,
    #[serde(default)]
    pub excluded_ticker_patterns: Vec<String>,
    #[serde(default = "empty_object")]
    pub quality: serde_json::Value,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub weights: WeightScheme,
    #[serde(default)]
    pub rebalance: RebalanceSettings,
    #[serde(default)]
    pub diversification: Option<Diversification>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl IndexConfiguration {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default)]
    pub score_bands: Option<Vec<ScoreBand>>,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            order_by: None,
            order_direction: OrderDirection::Desc,
            score_bands: None,
        }
    }
}

/// Score range `[min, max)`; an absent `max` is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBand {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    pub max_count: usize,
}

impl ScoreBand {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && self.max.is_none_or(|max| score < max)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WeightScheme {
    #[default]
    Equal,
    /// Proportional to each constituent's (positive) ranking metric.
    Score,
    /// Explicit symbol -> weight map; unlisted constituents share the remainder.
    Fixed { value: BTreeMap<String, f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_check_quality")]
    pub check_quality: bool,
}

fn default_threshold() -> f64 {
    DEFAULT_REBALANCE_THRESHOLD
}

fn default_check_quality() -> bool {
    true
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REBALANCE_THRESHOLD,
            check_quality: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Diversification {
    /// Sector -> percentage of the selection (0..=100).
    Allocation {
        #[serde(rename = "sectorAllocation")]
        sector_allocation: BTreeMap<String, f64>,
    },
    MaxCount {
        #[serde(rename = "maxCountPerSector")]
        max_count_per_sector: SectorCaps,
    },
}

/// Per-sector admission caps. A bare number applies to every sector; a map
/// may name a `"*"` default for sectors it does not list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectorCaps {
    Uniform(usize),
    PerSector(BTreeMap<String, usize>),
}

impl SectorCaps {
    pub fn cap_for(&self, sector: &str) -> usize {
        match self {
            SectorCaps::Uniform(n) => *n,
            SectorCaps::PerSector(map) => map
                .get(sector)
                .or_else(|| map.get("*"))
                .copied()
                .unwrap_or(usize::MAX),
        }
    }
}
