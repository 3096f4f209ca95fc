//! CSV ingestion entry point.
//!
//! One call takes one uploaded file: sniff the dialect, normalize the
//! rows, write what survived, and leave an audit row behind. Bad rows
//! are reported and skipped; only an unrecognizable or empty file fails
//! the whole batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RankConfig;
use crate::csv::dialect::{self, Dialect};
use crate::csv::{parse_line, split_records};
use crate::error::{RankError, RankResult};
use crate::normalize::{event_master, machine_master, store_profile, RowError};
use crate::perf;
use crate::store::RankStore;

/// Outcome of one ingested file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub batch_id:       String,
    pub dialect:        Dialect,
    pub success:        bool,
    pub rows_processed: usize,
    pub rows_failed:    usize,
    pub errors:         Vec<String>,
}

pub fn ingest_csv(
    store: &RankStore,
    cfg: &RankConfig,
    text: &str,
    force: bool,
) -> RankResult<IngestReport> {
    let started_at = chrono::Utc::now().to_rfc3339();

    let records = split_records(text);
    if records.is_empty() {
        return Err(RankError::EmptyInput);
    }
    let rows: Vec<Vec<String>> = records.iter().map(|r| parse_line(r)).collect();

    let detected = dialect::detect(&rows[0]);
    if detected == Dialect::Unknown {
        return Err(RankError::UnknownDialect {
            header: rows[0].join(","),
        });
    }

    let (processed, failures) = match detected {
        Dialect::StoreProfile => ingest_store_profiles(store, cfg, &rows)?,
        Dialect::MachineMaster => ingest_machines(store, cfg, &rows)?,
        Dialect::EventMaster => ingest_events(store, &rows)?,
        Dialect::ProductionData => ingest_production(store, &rows, force)?,
        Dialect::Unknown => unreachable!("rejected above"),
    };

    let report = IngestReport {
        batch_id:       Uuid::new_v4().to_string(),
        dialect:        detected,
        success:        processed > 0 || failures.is_empty(),
        rows_processed: processed,
        rows_failed:    failures.len(),
        errors:         clip_errors(failures, cfg.ingest.max_reported_errors),
    };
    store.record_ingest_batch(&report, &started_at)?;
    log::info!(
        "ingest batch {} ({}): {} processed, {} failed",
        report.batch_id,
        report.dialect.as_str(),
        report.rows_processed,
        report.rows_failed
    );
    Ok(report)
}

// ── Per-dialect writers ─────────────────────────────────────────────────

fn ingest_store_profiles(
    store: &RankStore,
    cfg: &RankConfig,
    rows: &[Vec<String>],
) -> RankResult<(usize, Vec<RowError>)> {
    let has_header = dialect::has_header_row(&rows[0]);
    let out = store_profile::normalize(rows, has_header, &cfg.ingest);

    let mut details: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for detail in out.details {
        details.entry(detail.store_id.clone()).or_default().push(detail);
    }
    for profile in &out.stores {
        store.upsert_store(profile)?;
        let own = details.remove(&profile.store_id).unwrap_or_default();
        store.replace_store_details(&profile.store_id, &own)?;
    }
    Ok((out.stores.len(), out.errors))
}

fn ingest_machines(
    store: &RankStore,
    cfg: &RankConfig,
    rows: &[Vec<String>],
) -> RankResult<(usize, Vec<RowError>)> {
    let out = machine_master::normalize(rows, true, &cfg.ingest);
    for machine in &out.machines {
        store.upsert_machine(machine)?;
    }
    Ok((out.machines.len(), out.errors))
}

fn ingest_events(store: &RankStore, rows: &[Vec<String>]) -> RankResult<(usize, Vec<RowError>)> {
    let today = chrono::Local::now().date_naive();
    let out = event_master::normalize(rows, true, today);
    for event in &out.events {
        store.upsert_event(event)?;
    }
    Ok((out.events.len(), out.errors))
}

fn ingest_production(
    store: &RankStore,
    rows: &[Vec<String>],
    force: bool,
) -> RankResult<(usize, Vec<RowError>)> {
    let (batches, errors) = perf::collect(rows);
    let mut applied = 0usize;
    for batch in &batches {
        let stats = perf::persist_batch(store, batch, force)?;
        applied += stats.records_applied();
    }
    Ok((applied, errors))
}

/// Recompute every active machine's popularity from the current keyword
/// table. Run after the keyword list changes; explicit per-machine
/// overrides are rewritten like any other stale value. Returns the
/// number of machines whose score moved.
pub fn recompute_popularity(store: &RankStore, cfg: &RankConfig) -> RankResult<usize> {
    let mut changed = 0usize;
    for machine in store.active_machines()? {
        let fresh = machine_master::popularity_for(&machine.name, &cfg.ingest);
        if fresh != machine.popularity {
            store.update_machine_popularity(&machine.machine_id, fresh)?;
            changed += 1;
        }
    }
    log::info!("popularity recompute: {changed} machines updated");
    Ok(changed)
}

/// Keep failure reports bounded so one garbled file cannot flood the
/// audit log.
fn clip_errors(failures: Vec<RowError>, max: usize) -> Vec<String> {
    let total = failures.len();
    let mut errors: Vec<String> = failures
        .into_iter()
        .take(max)
        .map(|e| e.to_string())
        .collect();
    if total > max {
        errors.push(format!("{} more rows failed", total - max));
    }
    errors
}
