//! theoindex: theoretical market index engine.
//!
//! Screens a security universe into index compositions, rebalances them with
//! hysteresis and keeps a total-return point series per index, back-filling
//! missed days.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
