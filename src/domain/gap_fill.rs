//! Gap-fill recovery: seed an index at its inception and replay every missed
//! trading day, oldest first.

use chrono::NaiveDate;
use log::info;

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::EngineError;
use crate::domain::index::{IndexDefinition, IndexHistoryPoint};
use crate::domain::points::{PointsEngine, PointsOutcome};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapFillReport {
    /// The inception point was written by this run.
    pub seeded: bool,
    /// Dates computed by this run, ascending.
    pub computed: Vec<NaiveDate>,
    /// Dates found already present.
    pub already_present: Vec<NaiveDate>,
    pub latest: Option<IndexHistoryPoint>,
}

/// Bring the point series of `definition` up to `today`.
///
/// Stops at the first failing date; points written before it stay, so the
/// next run resumes from there.
pub fn recover(
    engine: &PointsEngine<'_>,
    calendar: &TradingCalendar,
    definition: &IndexDefinition,
    today: NaiveDate,
) -> Result<GapFillReport, EngineError> {
    let store = engine.store();
    let mut report = GapFillReport::default();

    if definition.inception_date > today {
        info!(
            "{}: inception {} is after {today}; nothing to do",
            definition.code, definition.inception_date
        );
        return Ok(report);
    }

    let latest = match store.latest_point(definition.id)? {
        Some(point) => point,
        None => {
            let seed = IndexHistoryPoint::inception(definition.inception_date);
            report.seeded = store.insert_point(definition.id, &seed)?;
            info!(
                "{}: seeded at {} with {}",
                definition.code, seed.date, seed.points
            );
            seed
        }
    };

    let pending = calendar.trading_days_between(latest.date, today);
    if pending.len() > 1 {
        info!(
            "{}: replaying {} missed trading days from {}",
            definition.code,
            pending.len(),
            pending[0]
        );
    }

    report.latest = Some(latest);
    for date in pending {
        match engine.compute_for_date(definition, date)? {
            PointsOutcome::Computed(point) => {
                report.computed.push(date);
                report.latest = Some(point);
            }
            PointsOutcome::AlreadyComputed(point) => {
                report.already_present.push(date);
                report.latest = Some(point);
            }
        }
    }
    Ok(report)
}
