//! Daily performance persistence.
//!
//! A summary row is the anchor for a (store, date). Machine and top10
//! payloads are merged into the anchor's JSON columns and must never
//! create a row on their own.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::decode::{MachineDayStat, Top10Entry};
use crate::error::RankResult;
use crate::perf::DailyPerformance;
use crate::store::{date_to_text, text_to_date, RankStore};

impl RankStore {
    /// Dates that already have a summary anchor for this store.
    pub fn performance_dates(&self, store_id: &str) -> RankResult<BTreeSet<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT perf_date FROM daily_performance WHERE store_id = ?1")?;
        let texts = stmt
            .query_map(params![store_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        texts.iter().map(|t| text_to_date(t)).collect()
    }

    /// Write a summary anchor. Without `force` an existing row is left
    /// untouched; with `force` the summary fields are refreshed while the
    /// merged machine and top10 columns are preserved.
    pub fn upsert_performance_summary(
        &self,
        perf: &DailyPerformance,
        force: bool,
    ) -> RankResult<()> {
        let machines = serde_json::to_string(&perf.machines)?;
        let top10 = serde_json::to_string(&perf.top10)?;
        let conflict = if force {
            "ON CONFLICT(store_id, perf_date) DO UPDATE SET
                 total_diff = excluded.total_diff,
                 avg_diff = excluded.avg_diff,
                 avg_games = excluded.avg_games,
                 total_visitors = excluded.total_visitors,
                 day_of_week = excluded.day_of_week,
                 is_event_day = excluded.is_event_day,
                 weather = excluded.weather"
        } else {
            "ON CONFLICT(store_id, perf_date) DO NOTHING"
        };
        let sql = format!(
            "INSERT INTO daily_performance (perf_key, store_id, perf_date, total_diff,
                                            avg_diff, avg_games, total_visitors,
                                            machine_performances, top10_rankings,
                                            day_of_week, is_event_day, weather)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             {conflict}"
        );
        self.conn.execute(
            &sql,
            params![
                perf.perf_key(),
                perf.store_id,
                date_to_text(perf.date),
                perf.total_diff,
                perf.avg_diff,
                perf.avg_games,
                perf.total_visitors,
                machines,
                top10,
                perf.day_of_week as i64,
                if perf.is_event_day { 1i32 } else { 0i32 },
                perf.weather,
            ],
        )?;
        Ok(())
    }

    /// Merge per-machine stats into an anchored row. Incoming machine ids
    /// overwrite stored ones, other machines are kept. Returns false when
    /// no anchor exists.
    pub fn merge_machine_day(
        &self,
        store_id: &str,
        date: NaiveDate,
        machines: &BTreeMap<String, MachineDayStat>,
    ) -> RankResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT machine_performances FROM daily_performance
                 WHERE store_id = ?1 AND perf_date = ?2",
                params![store_id, date_to_text(date)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(json) = existing else {
            return Ok(false);
        };
        let mut merged: BTreeMap<String, MachineDayStat> = serde_json::from_str(&json)?;
        for (machine_id, stat) in machines {
            merged.insert(machine_id.clone(), stat.clone());
        }
        let updated = serde_json::to_string(&merged)?;
        tx.execute(
            "UPDATE daily_performance SET machine_performances = ?1
             WHERE store_id = ?2 AND perf_date = ?3",
            params![updated, store_id, date_to_text(date)],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Replace the top10 list of an anchored row. Returns false when no
    /// anchor exists.
    pub fn merge_top10(
        &self,
        store_id: &str,
        date: NaiveDate,
        entries: &[Top10Entry],
    ) -> RankResult<bool> {
        let json = serde_json::to_string(entries)?;
        let changed = self.conn.execute(
            "UPDATE daily_performance SET top10_rankings = ?1
             WHERE store_id = ?2 AND perf_date = ?3",
            params![json, store_id, date_to_text(date)],
        )?;
        Ok(changed > 0)
    }

    /// Performance rows up to and including `asof`, newest first. The
    /// cutoff keeps a re-analysis of a past date blind to data ingested
    /// since.
    pub fn performance_history(
        &self,
        store_id: &str,
        asof: NaiveDate,
        limit: usize,
    ) -> RankResult<Vec<DailyPerformance>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, perf_date, total_diff, avg_diff, avg_games,
                    total_visitors, machine_performances, top10_rankings,
                    day_of_week, is_event_day, weather
             FROM daily_performance
             WHERE store_id = ?1 AND perf_date <= ?2
             ORDER BY perf_date DESC LIMIT ?3",
        )?;
        let raw = stmt
            .query_map(
                params![store_id, date_to_text(asof), limit as i64],
                perf_row_mapper,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.into_perf()).collect()
    }

    pub fn performance_on(
        &self,
        store_id: &str,
        date: NaiveDate,
    ) -> RankResult<Option<DailyPerformance>> {
        let raw = self
            .conn
            .query_row(
                "SELECT store_id, perf_date, total_diff, avg_diff, avg_games,
                        total_visitors, machine_performances, top10_rankings,
                        day_of_week, is_event_day, weather
                 FROM daily_performance WHERE store_id = ?1 AND perf_date = ?2",
                params![store_id, date_to_text(date)],
                perf_row_mapper,
            )
            .optional()?;
        match raw {
            Some(r) => Ok(Some(r.into_perf()?)),
            None => Ok(None),
        }
    }

    pub fn performance_count(&self, store_id: &str) -> RankResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM daily_performance WHERE store_id = ?1",
                params![store_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

/// Performance row with the date and JSON columns still undecoded.
struct PerfRow {
    perf:          DailyPerformance,
    date_text:     String,
    machines_json: String,
    top10_json:    String,
}

impl PerfRow {
    fn into_perf(self) -> RankResult<DailyPerformance> {
        let mut perf = self.perf;
        perf.date = text_to_date(&self.date_text)?;
        perf.machines = serde_json::from_str(&self.machines_json)?;
        perf.top10 = serde_json::from_str(&self.top10_json)?;
        Ok(perf)
    }
}

fn perf_row_mapper(row: &rusqlite::Row) -> rusqlite::Result<PerfRow> {
    Ok(PerfRow {
        perf: DailyPerformance {
            store_id:       row.get(0)?,
            date:           NaiveDate::default(),
            total_diff:     row.get(2)?,
            avg_diff:       row.get(3)?,
            avg_games:      row.get(4)?,
            total_visitors: row.get(5)?,
            machines:       BTreeMap::new(),
            top10:          Vec::new(),
            day_of_week:    row.get::<_, i64>(8)? as u32,
            is_event_day:   row.get::<_, i32>(9)? != 0,
            weather:        row.get(10)?,
        },
        date_text:     row.get(1)?,
        machines_json: row.get(6)?,
        top10_json:    row.get(7)?,
    })
}
