//! Daily performance: the record, the production-sheet fold, and the
//! write protocol.
//!
//! Production sheets deliver three streams for the same calendar days:
//! store summaries, per-machine breakdowns, and top-10 lists. The
//! summary is the anchor. Enrichment streams only ever attach to an
//! anchored day; they never create rows, so replaying a partial export
//! cannot manufacture phantom days. Summaries themselves are
//! insert-once per (store, date) unless the caller forces a refresh.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::decode::{
    build_date, day_of_column, decode_cells, MachineDayCell, MachineDayStat, StoreDayCell,
    Top10Cell, Top10Entry,
};
use crate::error::RankResult;
use crate::normalize::RowError;
use crate::store::RankStore;
use crate::types::StoreId;

/// One store-day of observed performance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPerformance {
    pub store_id:       StoreId,
    pub date:           NaiveDate,
    pub total_diff:     i64,
    pub avg_diff:       f64,
    pub avg_games:      f64,
    pub total_visitors: i64,
    /// machine_id -> that machine's day. BTreeMap keeps the stored
    /// JSON stable across runs.
    pub machines:       BTreeMap<String, MachineDayStat>,
    pub top10:          Vec<Top10Entry>,
    /// 0 = Sunday .. 6 = Saturday. Derived from `date`, never read
    /// from the source feed.
    pub day_of_week:    u32,
    pub is_event_day:   bool,
    pub weather:        Option<String>,
}

impl DailyPerformance {
    /// Composite row key, `S001_2025-07-14`.
    pub fn perf_key(&self) -> String {
        format!("{}_{}", self.store_id, self.date.format("%Y-%m-%d"))
    }

    pub fn from_summary(store_id: &str, date: NaiveDate, cell: &StoreDayCell) -> Self {
        Self {
            store_id: store_id.to_string(),
            date,
            total_diff: cell.total_diff,
            avg_diff: cell.avg_diff,
            avg_games: cell.avg_games,
            total_visitors: cell.visitors,
            machines: BTreeMap::new(),
            top10: Vec::new(),
            day_of_week: date.weekday().num_days_from_sunday(),
            is_event_day: cell.is_event,
            weather: cell.weather.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStream {
    StoreSummary,
    MachineSummary,
    Top10,
}

impl DataStream {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "store_summary" | "store" | "summary" => Some(DataStream::StoreSummary),
            "machine_summary" | "machine" | "machines" => Some(DataStream::MachineSummary),
            "top10" | "top10_rankings" | "top_10" => Some(DataStream::Top10),
            _ => None,
        }
    }
}

/// Everything a production sheet said about one store, keyed by date.
#[derive(Debug, Default)]
pub struct StorePerfBatch {
    pub store_id:     String,
    pub summaries:    BTreeMap<NaiveDate, StoreDayCell>,
    pub machine_days: BTreeMap<NaiveDate, BTreeMap<String, MachineDayStat>>,
    pub top10_days:   BTreeMap<NaiveDate, Vec<Top10Entry>>,
}

/// Fold a production sheet into per-store batches.
///
/// The header row maps column positions onto days of the month; each
/// data row contributes one stream. Cells that fail to decode become
/// row errors and the rest of the sheet proceeds.
pub fn collect(rows: &[Vec<String>]) -> (Vec<StorePerfBatch>, Vec<RowError>) {
    let mut errors = Vec::new();
    let mut batches: BTreeMap<String, StorePerfBatch> = BTreeMap::new();
    if rows.is_empty() {
        return (Vec::new(), errors);
    }

    // column index -> day of month
    let day_cols: Vec<(usize, u32)> = rows[0]
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| day_of_column(name).map(|d| (idx, d)))
        .collect();

    for (i, row) in rows.iter().enumerate().skip(1) {
        let row_no = i + 1;
        let store_id = row.first().map(|s| s.trim()).unwrap_or("");
        if store_id.is_empty() {
            errors.push(RowError::new(row_no, "empty store_id"));
            continue;
        }
        let stream = match DataStream::parse(row.get(1).map(|s| s.as_str()).unwrap_or("")) {
            Some(s) => s,
            None => {
                errors.push(RowError::new(
                    row_no,
                    format!("unknown data_type '{}'", row.get(1).map(|s| s.trim()).unwrap_or("")),
                ));
                continue;
            }
        };
        let batch = batches
            .entry(store_id.to_string())
            .or_insert_with(|| StorePerfBatch {
                store_id: store_id.to_string(),
                ..StorePerfBatch::default()
            });

        for &(idx, day) in &day_cols {
            let cell = match row.get(idx) {
                Some(c) if !c.trim().is_empty() => c.as_str(),
                _ => continue,
            };
            let col = format!("day_{day}");
            match stream {
                DataStream::StoreSummary => match decode_cells::<StoreDayCell>(cell) {
                    Ok(cells) => {
                        for c in cells {
                            match build_date(c.year, c.month, day) {
                                Some(date) => {
                                    batch.summaries.insert(date, c);
                                }
                                None => errors.push(bad_date(row_no, &col, c.year, c.month, day)),
                            }
                        }
                    }
                    Err(e) => errors.push(RowError::new(row_no, format!("{col}: {e}"))),
                },
                DataStream::MachineSummary => match decode_cells::<MachineDayCell>(cell) {
                    Ok(cells) => {
                        for c in cells {
                            match build_date(c.year, c.month, day) {
                                Some(date) => {
                                    batch
                                        .machine_days
                                        .entry(date)
                                        .or_default()
                                        .extend(c.machines);
                                }
                                None => errors.push(bad_date(row_no, &col, c.year, c.month, day)),
                            }
                        }
                    }
                    Err(e) => errors.push(RowError::new(row_no, format!("{col}: {e}"))),
                },
                DataStream::Top10 => match decode_cells::<Top10Cell>(cell) {
                    Ok(cells) => {
                        for c in cells {
                            match build_date(c.year, c.month, day) {
                                Some(date) => {
                                    let mut rankings = c.rankings;
                                    rankings.sort_by_key(|r| r.rank);
                                    batch.top10_days.insert(date, rankings);
                                }
                                None => errors.push(bad_date(row_no, &col, c.year, c.month, day)),
                            }
                        }
                    }
                    Err(e) => errors.push(RowError::new(row_no, format!("{col}: {e}"))),
                },
            }
        }
    }
    (batches.into_values().collect(), errors)
}

fn bad_date(row_no: usize, col: &str, year: i32, month: u32, day: u32) -> RowError {
    RowError::new(row_no, format!("{col}: no such date {year}-{month:02}-{day:02}"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PerfWriteStats {
    pub summaries_written: usize,
    pub summaries_skipped: usize,
    pub machine_merges:    usize,
    pub top10_merges:      usize,
    pub anchors_missing:   usize,
}

impl PerfWriteStats {
    pub fn records_applied(&self) -> usize {
        self.summaries_written + self.machine_merges + self.top10_merges
    }
}

/// Write one store's batch.
///
/// Summaries land first so same-batch enrichments find their anchor.
/// Already-present summaries are skipped unless `force`; enrichment
/// for a day with no anchor is dropped with a warning.
pub fn persist_batch(
    store: &RankStore,
    batch: &StorePerfBatch,
    force: bool,
) -> RankResult<PerfWriteStats> {
    let mut stats = PerfWriteStats::default();
    let mut present: BTreeSet<NaiveDate> = store.performance_dates(&batch.store_id)?;

    for (date, cell) in &batch.summaries {
        if present.contains(date) && !force {
            stats.summaries_skipped += 1;
            continue;
        }
        let perf = DailyPerformance::from_summary(&batch.store_id, *date, cell);
        store.upsert_performance_summary(&perf, force)?;
        present.insert(*date);
        stats.summaries_written += 1;
    }

    for (date, machines) in &batch.machine_days {
        if !present.contains(date) {
            log::warn!(
                "machine data for {} {date} has no summary anchor, skipped",
                batch.store_id
            );
            stats.anchors_missing += 1;
            continue;
        }
        if store.merge_machine_day(&batch.store_id, *date, machines)? {
            stats.machine_merges += 1;
        }
    }

    for (date, entries) in &batch.top10_days {
        if !present.contains(date) {
            log::warn!(
                "top10 data for {} {date} has no summary anchor, skipped",
                batch.store_id
            );
            stats.anchors_missing += 1;
            continue;
        }
        if store.merge_top10(&batch.store_id, *date, entries)? {
            stats.top10_merges += 1;
        }
    }

    log::debug!(
        "perf batch {}: {} summaries written, {} skipped, {} machine merges, {} top10 merges",
        batch.store_id,
        stats.summaries_written,
        stats.summaries_skipped,
        stats.machine_merges,
        stats.top10_merges
    );
    Ok(stats)
}
