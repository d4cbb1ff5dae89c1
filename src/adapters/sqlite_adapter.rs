//! SQLite adapter: index store, market data tables and the security universe.

use std::time::Duration;

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};

use crate::domain::config::IndexConfiguration;
use crate::domain::error::EngineError;
use crate::domain::index::{
    Constituent, IndexDefinition, IndexHistoryPoint, NewIndexDefinition, RebalanceAction,
    RebalanceLogEntry,
};
use crate::domain::market::{DividendRecord, PriceRecord};
use crate::domain::security::{Fundamentals, Security};
use crate::ports::config_port::ConfigPort;
use crate::ports::index_store::IndexStore;
use crate::ports::market_data_port::{DividendPort, QuotePort};
use crate::ports::universe_port::UniversePort;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS index_definitions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        methodology TEXT NOT NULL DEFAULT '',
        configuration TEXT NOT NULL,
        inception_date TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS index_composition (
        index_id INTEGER NOT NULL REFERENCES index_definitions(id),
        symbol TEXT NOT NULL,
        target_weight REAL NOT NULL,
        entry_price REAL NOT NULL,
        entry_date TEXT NOT NULL,
        PRIMARY KEY (index_id, symbol)
    );
    CREATE TABLE IF NOT EXISTS index_history (
        index_id INTEGER NOT NULL REFERENCES index_definitions(id),
        date TEXT NOT NULL,
        points REAL NOT NULL,
        daily_change REAL NOT NULL,
        current_yield REAL NOT NULL DEFAULT 0,
        dividend_points REAL NOT NULL DEFAULT 0,
        missing_constituents INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (index_id, date)
    );
    CREATE TABLE IF NOT EXISTS rebalance_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        index_id INTEGER NOT NULL REFERENCES index_definitions(id),
        date TEXT NOT NULL,
        action TEXT NOT NULL,
        symbol TEXT NOT NULL,
        reason TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rebalance_log_index ON rebalance_log(index_id, date);
    CREATE TABLE IF NOT EXISTS prices (
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        close REAL NOT NULL,
        PRIMARY KEY (symbol, date)
    );
    CREATE TABLE IF NOT EXISTS dividends (
        symbol TEXT NOT NULL,
        ex_date TEXT NOT NULL,
        amount REAL NOT NULL,
        PRIMARY KEY (symbol, ex_date)
    );
    CREATE TABLE IF NOT EXISTS securities (
        universe TEXT NOT NULL,
        symbol TEXT NOT NULL,
        name TEXT NOT NULL,
        asset_type TEXT NOT NULL,
        sector TEXT,
        exchange TEXT,
        fundamentals TEXT NOT NULL,
        PRIMARY KEY (universe, symbol)
    );";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> EngineError {
    EngineError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> EngineError {
    EngineError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored date inside a row mapper.
fn column_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<IndexHistoryPoint> {
    Ok(IndexHistoryPoint {
        date: column_date(row, 0)?,
        points: row.get(1)?,
        daily_change: row.get(2)?,
        current_yield: row.get(3)?,
        dividend_points: row.get(4)?,
        missing_constituents: row.get(5)?,
    })
}

const POINT_COLUMNS: &str =
    "date, points, daily_change, current_yield, dividend_points, missing_constituents";

struct DefinitionRow {
    id: i64,
    code: String,
    name: String,
    methodology: String,
    configuration: String,
    inception_date: NaiveDate,
    enabled: bool,
}

const DEFINITION_COLUMNS: &str =
    "id, code, name, methodology, configuration, inception_date, enabled";

fn definition_row(row: &Row<'_>) -> rusqlite::Result<DefinitionRow> {
    Ok(DefinitionRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        methodology: row.get(3)?,
        configuration: row.get(4)?,
        inception_date: column_date(row, 5)?,
        enabled: row.get(6)?,
    })
}

impl DefinitionRow {
    fn into_definition(self) -> Result<IndexDefinition, EngineError> {
        let configuration = IndexConfiguration::from_json(&self.configuration).map_err(|e| {
            EngineError::DefinitionInvalid {
                code: self.code.clone(),
                reason: format!("stored configuration is not valid: {e}"),
            }
        })?;
        Ok(IndexDefinition {
            id: self.id,
            code: self.code,
            name: self.name,
            methodology: self.methodology,
            configuration,
            inception_date: self.inception_date,
            enabled: self.enabled,
        })
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| EngineError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let busy_timeout = config.get_int("sqlite", "busy_timeout_ms", 5000).max(0) as u64;

        let manager = SqliteConnectionManager::file(&db_path).with_init(move |conn| {
            conn.busy_timeout(Duration::from_millis(busy_timeout))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database; the connection is never reaped.
    pub fn in_memory() -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, EngineError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), EngineError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_prices(&self, prices: &[PriceRecord]) -> Result<usize, EngineError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT OR REPLACE INTO prices (symbol, date, close) VALUES (?1, ?2, ?3)")
                .map_err(query_err)?;
            for p in prices {
                stmt.execute(params![p.symbol, format_date(p.date), p.close])
                    .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(prices.len())
    }

    pub fn insert_dividends(&self, dividends: &[DividendRecord]) -> Result<usize, EngineError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO dividends (symbol, ex_date, amount) VALUES (?1, ?2, ?3)",
                )
                .map_err(query_err)?;
            for d in dividends {
                stmt.execute(params![d.symbol, format_date(d.ex_date), d.amount])
                    .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(dividends.len())
    }

    /// Insert or refresh the snapshot of `securities` within `universe`.
    pub fn upsert_securities(
        &self,
        universe: &str,
        securities: &[Security],
    ) -> Result<usize, EngineError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO securities
                        (universe, symbol, name, asset_type, sector, exchange, fundamentals)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for s in securities {
                let fundamentals = serde_json::to_string(&s.fundamentals)?;
                stmt.execute(params![
                    universe,
                    s.symbol,
                    s.name,
                    s.asset_type,
                    s.sector,
                    s.exchange,
                    fundamentals
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(securities.len())
    }

    fn index_id(&self, code: &str) -> Result<i64, EngineError> {
        self.conn()?
            .query_row(
                "SELECT id FROM index_definitions WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?
            .ok_or_else(|| EngineError::IndexNotFound { code: code.into() })
    }

    fn single_point(
        &self,
        sql: &str,
        index_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Option<IndexHistoryPoint>, EngineError> {
        let conn = self.conn()?;
        let result = match date {
            Some(date) => conn.query_row(sql, params![index_id, format_date(date)], point_from_row),
            None => conn.query_row(sql, params![index_id], point_from_row),
        };
        result.optional().map_err(query_err)
    }

    fn market_value(
        &self,
        sql: &str,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        self.conn()?
            .query_row(sql, params![symbol, format_date(date)], |row| row.get(0))
            .optional()
            .map_err(query_err)
    }
}

impl IndexStore for SqliteAdapter {
    fn create_definition(
        &self,
        definition: &NewIndexDefinition,
    ) -> Result<IndexDefinition, EngineError> {
        let configuration = definition.configuration.to_json()?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO index_definitions (code, name, methodology, configuration, inception_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                definition.code,
                definition.name,
                definition.methodology,
                configuration,
                format_date(definition.inception_date)
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(EngineError::DuplicateIndex {
                    code: definition.code.clone(),
                });
            }
            Err(e) => return Err(query_err(e)),
        }

        Ok(IndexDefinition {
            id: conn.last_insert_rowid(),
            code: definition.code.clone(),
            name: definition.name.clone(),
            methodology: definition.methodology.clone(),
            configuration: definition.configuration.clone(),
            inception_date: definition.inception_date,
            enabled: true,
        })
    }

    fn update_configuration(
        &self,
        code: &str,
        configuration: &IndexConfiguration,
    ) -> Result<(), EngineError> {
        let json = configuration.to_json()?;
        let updated = self
            .conn()?
            .execute(
                "UPDATE index_definitions
                 SET configuration = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE code = ?2",
                params![json, code],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(EngineError::IndexNotFound { code: code.into() });
        }
        Ok(())
    }

    fn set_enabled(&self, code: &str, enabled: bool) -> Result<(), EngineError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE index_definitions
                 SET enabled = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE code = ?2",
                params![enabled, code],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(EngineError::IndexNotFound { code: code.into() });
        }
        Ok(())
    }

    fn get_definition(&self, code: &str) -> Result<IndexDefinition, EngineError> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {DEFINITION_COLUMNS} FROM index_definitions WHERE code = ?1"),
                params![code],
                definition_row,
            )
            .optional()
            .map_err(query_err)?
            .ok_or_else(|| EngineError::IndexNotFound { code: code.into() })?;
        row.into_definition()
    }

    fn list_definitions(&self, enabled_only: bool) -> Result<Vec<IndexDefinition>, EngineError> {
        let rows: Vec<DefinitionRow> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {DEFINITION_COLUMNS} FROM index_definitions
                     WHERE enabled = 1 OR ?1 = 0
                     ORDER BY code"
                ))
                .map_err(query_err)?;
            stmt.query_map(params![enabled_only], definition_row)
                .map_err(query_err)?
                .collect::<Result<_, _>>()
                .map_err(query_err)?
        };
        rows.into_iter().map(DefinitionRow::into_definition).collect()
    }

    fn composition(&self, index_id: i64) -> Result<Vec<Constituent>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, target_weight, entry_price, entry_date
                 FROM index_composition WHERE index_id = ?1 ORDER BY symbol",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![index_id], |row| {
                Ok(Constituent {
                    symbol: row.get(0)?,
                    target_weight: row.get(1)?,
                    entry_price: row.get(2)?,
                    entry_date: column_date(row, 3)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn replace_composition(
        &self,
        index_id: i64,
        composition: &[Constituent],
        log: &[RebalanceLogEntry],
    ) -> Result<(), EngineError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "DELETE FROM index_composition WHERE index_id = ?1",
            params![index_id],
        )
        .map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO index_composition
                        (index_id, symbol, target_weight, entry_price, entry_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(query_err)?;
            for c in composition {
                stmt.execute(params![
                    index_id,
                    c.symbol,
                    c.target_weight,
                    c.entry_price,
                    format_date(c.entry_date)
                ])
                .map_err(query_err)?;
            }

            let mut stmt = tx
                .prepare(
                    "INSERT INTO rebalance_log (index_id, date, action, symbol, reason)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(query_err)?;
            for entry in log {
                stmt.execute(params![
                    index_id,
                    format_date(entry.date),
                    entry.action.as_str(),
                    entry.symbol,
                    entry.reason
                ])
                .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)
    }

    fn latest_point(&self, index_id: i64) -> Result<Option<IndexHistoryPoint>, EngineError> {
        self.single_point(
            &format!(
                "SELECT {POINT_COLUMNS} FROM index_history
                 WHERE index_id = ?1 ORDER BY date DESC LIMIT 1"
            ),
            index_id,
            None,
        )
    }

    fn point_before(
        &self,
        index_id: i64,
        date: NaiveDate,
    ) -> Result<Option<IndexHistoryPoint>, EngineError> {
        self.single_point(
            &format!(
                "SELECT {POINT_COLUMNS} FROM index_history
                 WHERE index_id = ?1 AND date < ?2 ORDER BY date DESC LIMIT 1"
            ),
            index_id,
            Some(date),
        )
    }

    fn point_on(
        &self,
        index_id: i64,
        date: NaiveDate,
    ) -> Result<Option<IndexHistoryPoint>, EngineError> {
        self.single_point(
            &format!("SELECT {POINT_COLUMNS} FROM index_history WHERE index_id = ?1 AND date = ?2"),
            index_id,
            Some(date),
        )
    }

    fn insert_point(&self, index_id: i64, point: &IndexHistoryPoint) -> Result<bool, EngineError> {
        let written = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO index_history
                    (index_id, date, points, daily_change, current_yield, dividend_points,
                     missing_constituents)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    index_id,
                    format_date(point.date),
                    point.points,
                    point.daily_change,
                    point.current_yield,
                    point.dividend_points,
                    point.missing_constituents
                ],
            )
            .map_err(query_err)?;
        Ok(written > 0)
    }

    fn history(
        &self,
        index_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<IndexHistoryPoint>, EngineError> {
        let from = from.map(format_date).unwrap_or_else(|| "0000-01-01".into());
        let to = to.map(format_date).unwrap_or_else(|| "9999-12-31".into());
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {POINT_COLUMNS} FROM index_history
                 WHERE index_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![index_id, from, to], point_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn rebalance_log(
        &self,
        index_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<RebalanceLogEntry>, EngineError> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let raw: Vec<(NaiveDate, String, String, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT date, action, symbol, reason FROM rebalance_log
                     WHERE index_id = ?1 ORDER BY date DESC, id DESC LIMIT ?2",
                )
                .map_err(query_err)?;
            stmt.query_map(params![index_id, limit], |row| {
                Ok((column_date(row, 0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(query_err)?
            .collect::<Result<_, _>>()
            .map_err(query_err)?
        };

        raw.into_iter()
            .map(|(date, action, symbol, reason)| {
                let action = action
                    .parse::<RebalanceAction>()
                    .map_err(|reason| EngineError::DatabaseQuery { reason })?;
                Ok(RebalanceLogEntry {
                    date,
                    action,
                    symbol,
                    reason,
                })
            })
            .collect()
    }
}

impl QuotePort for SqliteAdapter {
    fn close_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.market_value(
            "SELECT close FROM prices WHERE symbol = ?1 AND date = ?2",
            symbol,
            date,
        )
    }

    fn close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        self.conn()?
            .query_row(
                "SELECT close FROM prices
                 WHERE symbol = ?1 AND date <= ?2 AND date >= ?3
                 ORDER BY date DESC LIMIT 1",
                params![symbol, format_date(date), format_date(not_before)],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)
    }
}

impl DividendPort for SqliteAdapter {
    fn dividend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        self.market_value(
            "SELECT amount FROM dividends WHERE symbol = ?1 AND ex_date = ?2",
            symbol,
            date,
        )
    }
}

impl UniversePort for SqliteAdapter {
    fn list_securities(
        &self,
        universe: &str,
        asset_types: &[String],
    ) -> Result<Vec<Security>, EngineError> {
        let raw: Vec<(String, String, String, Option<String>, Option<String>, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT symbol, name, asset_type, sector, exchange, fundamentals
                     FROM securities
                     WHERE ?1 = '' OR universe = ?1
                     ORDER BY symbol, universe",
                )
                .map_err(query_err)?;
            stmt.query_map(params![universe], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(query_err)?
            .collect::<Result<_, _>>()
            .map_err(query_err)?
        };

        let mut securities: Vec<Security> = Vec::with_capacity(raw.len());
        for (symbol, name, asset_type, sector, exchange, fundamentals) in raw {
            if securities.last().is_some_and(|s| s.symbol == symbol) {
                continue;
            }
            if !asset_types.is_empty()
                && !asset_types.iter().any(|t| t.eq_ignore_ascii_case(&asset_type))
            {
                continue;
            }
            let fundamentals: Fundamentals = serde_json::from_str(&fundamentals)?;
            securities.push(Security {
                symbol,
                name,
                asset_type,
                sector,
                exchange,
                fundamentals,
            });
        }
        Ok(securities)
    }
}
