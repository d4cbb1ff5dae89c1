//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod retrying;
pub mod sqlite_adapter;
