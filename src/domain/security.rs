//! Securities of the screening universe and their financial fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sector bucket for securities without a classification.
pub const UNCLASSIFIED_SECTOR: &str = "Unclassified";

/// Fundamental data for one security. Every field is optional: a missing value
/// is distinct from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fundamentals {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub net_margin: Option<f64>,
    pub gross_margin: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub eps: Option<f64>,
    pub free_cash_flow_per_share: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_growth_years: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub fundamentals: Fundamentals,
}

impl Security {
    pub fn sector_or_unclassified(&self) -> &str {
        match self.sector.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => UNCLASSIFIED_SECTOR,
        }
    }

    pub fn number(&self, field: FinancialField) -> Option<f64> {
        let f = &self.fundamentals;
        let value = match field {
            FinancialField::Price => f.price,
            FinancialField::MarketCap => f.market_cap,
            FinancialField::PeRatio => f.pe_ratio,
            FinancialField::PbRatio => f.pb_ratio,
            FinancialField::PsRatio => f.ps_ratio,
            FinancialField::DividendYield => f.dividend_yield,
            FinancialField::PayoutRatio => f.payout_ratio,
            FinancialField::Roe => f.roe,
            FinancialField::Roa => f.roa,
            FinancialField::DebtToEquity => f.debt_to_equity,
            FinancialField::CurrentRatio => f.current_ratio,
            FinancialField::NetMargin => f.net_margin,
            FinancialField::GrossMargin => f.gross_margin,
            FinancialField::RevenueGrowth => f.revenue_growth,
            FinancialField::EarningsGrowth => f.earnings_growth,
            FinancialField::Eps => f.eps,
            FinancialField::FreeCashFlowPerShare => f.free_cash_flow_per_share,
            FinancialField::BookValuePerShare => f.book_value_per_share,
            FinancialField::Beta => f.beta,
            FinancialField::DividendGrowthYears => f.dividend_growth_years,
            FinancialField::Sector | FinancialField::AssetType | FinancialField::Exchange => None,
        };
        value.filter(|v| v.is_finite())
    }

    pub fn text(&self, field: FinancialField) -> Option<&str> {
        match field {
            FinancialField::Sector => self.sector.as_deref(),
            FinancialField::AssetType => Some(self.asset_type.as_str()),
            FinancialField::Exchange => self.exchange.as_deref(),
            _ => None,
        }
        .filter(|s| !s.is_empty())
    }
}

/// A named field of a security usable in filters and rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FinancialField {
    Price,
    MarketCap,
    PeRatio,
    PbRatio,
    PsRatio,
    DividendYield,
    PayoutRatio,
    Roe,
    Roa,
    DebtToEquity,
    CurrentRatio,
    NetMargin,
    GrossMargin,
    RevenueGrowth,
    EarningsGrowth,
    Eps,
    FreeCashFlowPerShare,
    BookValuePerShare,
    Beta,
    DividendGrowthYears,
    Sector,
    AssetType,
    Exchange,
}

impl FinancialField {
    pub const ALL: [FinancialField; 23] = [
        FinancialField::Price,
        FinancialField::MarketCap,
        FinancialField::PeRatio,
        FinancialField::PbRatio,
        FinancialField::PsRatio,
        FinancialField::DividendYield,
        FinancialField::PayoutRatio,
        FinancialField::Roe,
        FinancialField::Roa,
        FinancialField::DebtToEquity,
        FinancialField::CurrentRatio,
        FinancialField::NetMargin,
        FinancialField::GrossMargin,
        FinancialField::RevenueGrowth,
        FinancialField::EarningsGrowth,
        FinancialField::Eps,
        FinancialField::FreeCashFlowPerShare,
        FinancialField::BookValuePerShare,
        FinancialField::Beta,
        FinancialField::DividendGrowthYears,
        FinancialField::Sector,
        FinancialField::AssetType,
        FinancialField::Exchange,
    ];

    /// Canonical camelCase name, as written in index configurations.
    pub fn name(self) -> &'static str {
        match self {
            FinancialField::Price => "price",
            FinancialField::MarketCap => "marketCap",
            FinancialField::PeRatio => "peRatio",
            FinancialField::PbRatio => "pbRatio",
            FinancialField::PsRatio => "psRatio",
            FinancialField::DividendYield => "dividendYield",
            FinancialField::PayoutRatio => "payoutRatio",
            FinancialField::Roe => "roe",
            FinancialField::Roa => "roa",
            FinancialField::DebtToEquity => "debtToEquity",
            FinancialField::CurrentRatio => "currentRatio",
            FinancialField::NetMargin => "netMargin",
            FinancialField::GrossMargin => "grossMargin",
            FinancialField::RevenueGrowth => "revenueGrowth",
            FinancialField::EarningsGrowth => "earningsGrowth",
            FinancialField::Eps => "eps",
            FinancialField::FreeCashFlowPerShare => "freeCashFlowPerShare",
            FinancialField::BookValuePerShare => "bookValuePerShare",
            FinancialField::Beta => "beta",
            FinancialField::DividendGrowthYears => "dividendGrowthYears",
            FinancialField::Sector => "sector",
            FinancialField::AssetType => "assetType",
            FinancialField::Exchange => "exchange",
        }
    }

    /// Accepts camelCase and snake_case spellings, case-insensitively.
    pub fn from_name(name: &str) -> Option<FinancialField> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().to_lowercase() == wanted)
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            FinancialField::Sector | FinancialField::AssetType | FinancialField::Exchange
        )
    }
}

impl fmt::Display for FinancialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
