//! Port traits implemented by the adapters.

pub mod config_port;
pub mod index_store;
pub mod market_data_port;
pub mod universe_port;
