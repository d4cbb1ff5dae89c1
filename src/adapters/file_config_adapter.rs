//! INI engine configuration (`[sqlite]`, `[market_data]`, `[postgres]`,
//! `[calendar]`, `[jobs]`).

use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EngineError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EngineError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENGINE_INI: &str = r#"
[sqlite]
path = /var/lib/theoindex/index.db
pool_size = 8

[market_data]
source = postgres
retry_backoff_ms = 250

[postgres]
connection_string = host=localhost dbname=market

[calendar]
holidays = 2024-12-25, 2025-01-01

[jobs]
threads = 4
"#;

    #[test]
    fn reads_engine_sections() {
        let adapter = FileConfigAdapter::from_string(ENGINE_INI).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path").as_deref(),
            Some("/var/lib/theoindex/index.db")
        );
        assert_eq!(adapter.get_int("sqlite", "pool_size", 1), 8);
        assert_eq!(
            adapter.get_string("postgres", "connection_string").as_deref(),
            Some("host=localhost dbname=market")
        );
        assert_eq!(
            adapter.get_string("calendar", "holidays").as_deref(),
            Some("2024-12-25, 2025-01-01")
        );
        assert_eq!(adapter.get_int("jobs", "threads", 0), 4);
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string(ENGINE_INI).unwrap();
        assert_eq!(adapter.get_string("sqlite", "journal"), None);
        assert_eq!(adapter.get_string("nowhere", "path"), None);
        assert_eq!(adapter.get_int("market_data", "retries", 2), 2);
        assert_eq!(adapter.get_double("market_data", "jitter", 0.5), 0.5);
    }

    #[test]
    fn non_numeric_values_fall_back() {
        let adapter =
            FileConfigAdapter::from_string("[jobs]\nthreads = many\nratio = lots\n").unwrap();
        assert_eq!(adapter.get_int("jobs", "threads", 3), 3);
        assert_eq!(adapter.get_double("jobs", "ratio", 1.5), 1.5);
    }

    #[test]
    fn bools_accept_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[sqlite]\na = yes\nb = On\nc = 0\nd = false\ne = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("sqlite", "a", false));
        assert!(adapter.get_bool("sqlite", "b", false));
        assert!(!adapter.get_bool("sqlite", "c", true));
        assert!(!adapter.get_bool("sqlite", "d", true));
        assert!(adapter.get_bool("sqlite", "e", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[sqlite]\npath = idx.db\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("sqlite", "path").as_deref(), Some("idx.db"));
    }

    #[test]
    fn from_file_missing_is_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/theoindex.ini").unwrap_err();
        assert!(
            matches!(err, EngineError::ConfigParse { file, .. } if file.ends_with("theoindex.ini"))
        );
    }
}
