//! Core domain types and logic.

pub mod calendar;
pub mod config;
pub mod config_validation;
pub mod diversification;
pub mod error;
pub mod exclusion;
pub mod filter;
pub mod filter_eval;
pub mod filter_parser;
pub mod gap_fill;
pub mod index;
pub mod jobs;
pub mod market;
pub mod points;
pub mod ranking_strategy;
pub mod rebalance;
pub mod screening;
pub mod security;
pub mod weighting;
