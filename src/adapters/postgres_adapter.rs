//! PostgreSQL market data adapter.
//!
//! Reads closes from `public.ohlcv` and dividends from `public.dividends` of
//! an existing market database.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use postgres::types::ToSql;
use postgres::{Config, NoTls};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::{DividendPort, QuotePort};

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| EngineError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;
        let timeout_secs = config.get_int("postgres", "timeout_secs", 10).max(1) as u64;
        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;

        let mut pg_config: Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| EngineError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;
        pg_config.connect_timeout(Duration::from_secs(timeout_secs));
        pg_config.options(&format!("-c statement_timeout={}", timeout_secs * 1000));

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(timeout_secs))
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn single_value(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<f64>, EngineError> {
        let mut client = self.pool.get().map_err(|e: r2d2::Error| EngineError::Provider {
            reason: e.to_string(),
        })?;
        let rows = client
            .query(query, params)
            .map_err(|e| EngineError::Provider {
                reason: e.to_string(),
            })?;
        Ok(rows.first().and_then(|row| row.get::<_, Option<f64>>(0)))
    }
}

impl QuotePort for PostgresAdapter {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        // timestamptz column: match the whole day
        let start: DateTime<Utc> = date.and_time(NaiveTime::MIN).and_utc();
        let end: DateTime<Utc> = match date.succ_opt() {
            Some(next) => next.and_time(NaiveTime::MIN).and_utc(),
            None => return Ok(None),
        };
        let query = "SELECT close::double precision FROM public.ohlcv \
                     WHERE code = $1 AND date >= $2 AND date < $3 \
                     ORDER BY date DESC LIMIT 1";
        self.single_value(query, &[&symbol, &start, &end])
    }

    fn close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        let start: DateTime<Utc> = not_before.and_time(NaiveTime::MIN).and_utc();
        let end: DateTime<Utc> = match date.succ_opt() {
            Some(next) => next.and_time(NaiveTime::MIN).and_utc(),
            None => return Ok(None),
        };
        let query = "SELECT close::double precision FROM public.ohlcv \
                     WHERE code = $1 AND date >= $2 AND date < $3 \
                     ORDER BY date DESC LIMIT 1";
        self.single_value(query, &[&symbol, &start, &end])
    }
}

impl DividendPort for PostgresAdapter {
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        let query = "SELECT SUM(amount)::double precision FROM public.dividends \
                     WHERE code = $1 AND ex_date = $2";
        self.single_value(query, &[&symbol, &date])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    #[test]
    fn from_config_missing_connection_string() {
        let config = EmptyConfig;
        let result = PostgresAdapter::from_config(&config);
        match result {
            Err(EngineError::ConfigMissing { section, key }) => {
                assert_eq!(section, "postgres");
                assert_eq!(key, "connection_string");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
