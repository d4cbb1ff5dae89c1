//! Configuration validation.
//!
//! Checks the engine INI settings before any job runs, and index definitions
//! before they are stored.

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::EngineError;
use crate::domain::index::NewIndexDefinition;
use crate::domain::ranking_strategy::StrategyRegistry;
use crate::domain::screening::ScreeningPlan;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSource {
    Sqlite,
    Csv,
    Postgres,
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_sqlite(config)?;
    validate_market_data(config)?;
    calendar(config)?;
    validate_jobs(config)?;
    Ok(())
}

/// Market data source from `[market_data] source`, defaulting to sqlite.
pub fn market_source(config: &dyn ConfigPort) -> Result<MarketSource, EngineError> {
    let source = config
        .get_string("market_data", "source")
        .unwrap_or_else(|| "sqlite".to_string());
    match source.trim().to_lowercase().as_str() {
        "" | "sqlite" => Ok(MarketSource::Sqlite),
        "csv" => Ok(MarketSource::Csv),
        "postgres" => Ok(MarketSource::Postgres),
        other => Err(EngineError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "source".to_string(),
            reason: format!("unknown source '{other}', expected sqlite, csv or postgres"),
        }),
    }
}

/// Trading calendar from `[calendar] holidays`.
pub fn calendar(config: &dyn ConfigPort) -> Result<TradingCalendar, EngineError> {
    match config.get_string("calendar", "holidays") {
        Some(list) => TradingCalendar::from_list(&list),
        None => Ok(TradingCalendar::default()),
    }
}

/// Structural checks on a new index, then a full compile of its screening
/// configuration.
pub fn validate_definition(
    definition: &NewIndexDefinition,
    registry: &StrategyRegistry,
) -> Result<(), EngineError> {
    let code = definition.code.as_str();
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EngineError::DefinitionInvalid {
            code: code.to_string(),
            reason: "code must be non-empty and use only letters, digits, '-' and '_'".to_string(),
        });
    }
    if definition.name.trim().is_empty() {
        return Err(EngineError::DefinitionInvalid {
            code: code.to_string(),
            reason: "name must not be empty".to_string(),
        });
    }
    ScreeningPlan::compile(&definition.configuration, registry)?;
    Ok(())
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, EngineError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_sqlite(config: &dyn ConfigPort) -> Result<(), EngineError> {
    required(config, "sqlite", "path")?;
    if config.get_int("sqlite", "pool_size", 4) < 1 {
        return Err(EngineError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "pool_size".to_string(),
            reason: "pool_size must be at least 1".to_string(),
        });
    }
    if config.get_int("sqlite", "busy_timeout_ms", 5000) < 0 {
        return Err(EngineError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "busy_timeout_ms".to_string(),
            reason: "busy_timeout_ms must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_market_data(config: &dyn ConfigPort) -> Result<(), EngineError> {
    match market_source(config)? {
        MarketSource::Sqlite => {}
        MarketSource::Csv => {
            required(config, "market_data", "csv_dir")?;
        }
        MarketSource::Postgres => {
            required(config, "postgres", "connection_string")?;
            if config.get_int("postgres", "timeout_secs", 10) < 1 {
                return Err(EngineError::ConfigInvalid {
                    section: "postgres".to_string(),
                    key: "timeout_secs".to_string(),
                    reason: "timeout_secs must be at least 1".to_string(),
                });
            }
        }
    }

    let retries = config.get_int("market_data", "retries", 2);
    if !(0..=10).contains(&retries) {
        return Err(EngineError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "retries".to_string(),
            reason: "retries must be between 0 and 10".to_string(),
        });
    }
    if config.get_int("market_data", "retry_backoff_ms", 200) < 0 {
        return Err(EngineError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "retry_backoff_ms".to_string(),
            reason: "retry_backoff_ms must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_jobs(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if config.get_int("jobs", "threads", 0) < 0 {
        return Err(EngineError::ConfigInvalid {
            section: "jobs".to_string(),
            key: "threads".to_string(),
            reason: "threads must be non-negative (0 uses all cores)".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::config::IndexConfiguration;
    use chrono::NaiveDate;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn definition(code: &str, config_json: &str) -> NewIndexDefinition {
        NewIndexDefinition {
            code: code.into(),
            name: "Test".into(),
            methodology: String::new(),
            configuration: IndexConfiguration::from_json(config_json).unwrap(),
            inception_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    #[test]
    fn valid_engine_config_passes() {
        let config = make_config(
            r#"
[sqlite]
path = /tmp/theoindex.db
pool_size = 4
busy_timeout_ms = 2000

[market_data]
source = csv
csv_dir = /data/prices
retries = 3
retry_backoff_ms = 100

[calendar]
holidays = 2024-12-25, 2025-01-01

[jobs]
threads = 2
"#,
        );
        assert!(validate_engine_config(&config).is_ok());
        assert_eq!(market_source(&config).unwrap(), MarketSource::Csv);
        assert_eq!(calendar(&config).unwrap().holidays().count(), 2);
    }

    #[test]
    fn minimal_config_defaults_to_sqlite() {
        let config = make_config("[sqlite]\npath = index.db\n");
        assert!(validate_engine_config(&config).is_ok());
        assert_eq!(market_source(&config).unwrap(), MarketSource::Sqlite);
    }

    #[test]
    fn missing_sqlite_path_fails() {
        let config = make_config("[jobs]\nthreads = 1\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigMissing { key, .. } if key == "path"));
    }

    #[test]
    fn zero_pool_size_fails() {
        let config = make_config("[sqlite]\npath = a.db\npool_size = 0\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "pool_size"));
    }

    #[test]
    fn csv_source_requires_directory() {
        let config = make_config("[sqlite]\npath = a.db\n[market_data]\nsource = csv\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigMissing { key, .. } if key == "csv_dir"));
    }

    #[test]
    fn postgres_source_requires_connection_string() {
        let config = make_config("[sqlite]\npath = a.db\n[market_data]\nsource = postgres\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(
            matches!(err, EngineError::ConfigMissing { section, key } if section == "postgres" && key == "connection_string")
        );
    }

    #[test]
    fn unknown_source_fails() {
        let config = make_config("[sqlite]\npath = a.db\n[market_data]\nsource = bloomberg\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "source"));
    }

    #[test]
    fn retries_out_of_range_fails() {
        let config = make_config("[sqlite]\npath = a.db\n[market_data]\nretries = 50\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "retries"));
    }

    #[test]
    fn bad_holiday_fails() {
        let config = make_config("[sqlite]\npath = a.db\n[calendar]\nholidays = christmas\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "holidays"));
    }

    #[test]
    fn negative_threads_fails() {
        let config = make_config("[sqlite]\npath = a.db\n[jobs]\nthreads = -1\n");
        let err = validate_engine_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "threads"));
    }

    #[test]
    fn valid_definition_passes() {
        let registry = StrategyRegistry::with_builtins();
        let def = definition("HIGH_YIELD-1", r#"{"selection": {"orderBy": "dividendYield"}}"#);
        assert!(validate_definition(&def, &registry).is_ok());
    }

    #[test]
    fn bad_code_fails() {
        let registry = StrategyRegistry::with_builtins();
        let def = definition("high yield", r#"{"selection": {"orderBy": "dividendYield"}}"#);
        assert!(matches!(
            validate_definition(&def, &registry),
            Err(EngineError::DefinitionInvalid { .. })
        ));
    }

    #[test]
    fn definition_with_bad_filter_fails() {
        let registry = StrategyRegistry::with_builtins();
        let def = definition(
            "HY",
            r#"{"quality": {"peRatio": {"between": 3}}, "selection": {"orderBy": "dividendYield"}}"#,
        );
        assert!(matches!(
            validate_definition(&def, &registry),
            Err(EngineError::Filter(_))
        ));
    }
}
