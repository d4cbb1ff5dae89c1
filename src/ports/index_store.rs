//! Persistence port for index definitions, compositions, history and the
//! rebalance log.

use chrono::NaiveDate;

use crate::domain::config::IndexConfiguration;
use crate::domain::error::EngineError;
use crate::domain::index::{
    Constituent, IndexDefinition, IndexHistoryPoint, NewIndexDefinition, RebalanceLogEntry,
};

pub trait IndexStore: Send + Sync {
    /// Fails with `DuplicateIndex` when the code is taken.
    fn create_definition(&self, definition: &NewIndexDefinition)
    -> Result<IndexDefinition, EngineError>;

    fn update_configuration(
        &self,
        code: &str,
        configuration: &IndexConfiguration,
    ) -> Result<(), EngineError>;

    fn set_enabled(&self, code: &str, enabled: bool) -> Result<(), EngineError>;

    /// Fails with `IndexNotFound` for an unknown code.
    fn get_definition(&self, code: &str) -> Result<IndexDefinition, EngineError>;

    fn list_definitions(&self, enabled_only: bool) -> Result<Vec<IndexDefinition>, EngineError>;

    fn composition(&self, index_id: i64) -> Result<Vec<Constituent>, EngineError>;

    /// Replace the whole composition and append `log` in one transaction.
    fn replace_composition(
        &self,
        index_id: i64,
        composition: &[Constituent],
        log: &[RebalanceLogEntry],
    ) -> Result<(), EngineError>;

    fn latest_point(&self, index_id: i64) -> Result<Option<IndexHistoryPoint>, EngineError>;

    /// Latest point strictly before `date`.
    fn point_before(
        &self,
        index_id: i64,
        date: NaiveDate,
    ) -> Result<Option<IndexHistoryPoint>, EngineError>;

    fn point_on(&self, index_id: i64, date: NaiveDate)
    -> Result<Option<IndexHistoryPoint>, EngineError>;

    /// Insert unless a point for that date exists. Returns whether a row was
    /// written.
    fn insert_point(&self, index_id: i64, point: &IndexHistoryPoint) -> Result<bool, EngineError>;

    /// Points in ascending date order within the optional bounds.
    fn history(
        &self,
        index_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<IndexHistoryPoint>, EngineError>;

    /// Log entries, newest first.
    fn rebalance_log(
        &self,
        index_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<RebalanceLogEntry>, EngineError>;
}
