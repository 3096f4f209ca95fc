//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Pipeline stages call store methods; they never execute SQL directly.

mod analysis;
mod performance;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{RankError, RankResult};
use crate::ingest::IngestReport;
use crate::normalize::event_master::Event;
use crate::normalize::machine_master::Machine;
use crate::normalize::store_profile::{Store, StoreDetail};

pub use analysis::AnalysisRow;

pub struct RankStore {
    conn: Connection,
}

impl RankStore {
    pub fn open(path: &str) -> RankResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RankResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RankResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_analysis.sql"))?;
        Ok(())
    }

    // ── Stores ──────────────────────────────────────────────────────────

    /// Insert a store or refresh every profile field of an existing one.
    pub fn upsert_store(&self, store: &Store) -> RankResult<()> {
        let popular = serde_json::to_string(&store.popular_machines)?;
        self.conn.execute(
            "INSERT INTO store (store_id, name, prefecture, nearest_station,
                                station_walk_min, station_distance_m, opening_hours,
                                total_machines, pachinko_machines, pachislot_machines,
                                has_parking, smoking_allowed, event_frequency,
                                latitude, longitude, popular_machines, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, datetime('now'))
             ON CONFLICT(store_id) DO UPDATE SET
                 name = excluded.name,
                 prefecture = excluded.prefecture,
                 nearest_station = excluded.nearest_station,
                 station_walk_min = excluded.station_walk_min,
                 station_distance_m = excluded.station_distance_m,
                 opening_hours = excluded.opening_hours,
                 total_machines = excluded.total_machines,
                 pachinko_machines = excluded.pachinko_machines,
                 pachislot_machines = excluded.pachislot_machines,
                 has_parking = excluded.has_parking,
                 smoking_allowed = excluded.smoking_allowed,
                 event_frequency = excluded.event_frequency,
                 latitude = excluded.latitude,
                 longitude = excluded.longitude,
                 popular_machines = excluded.popular_machines,
                 active = excluded.active,
                 updated_at = datetime('now')",
            params![
                store.store_id,
                store.name,
                store.prefecture,
                store.nearest_station,
                store.station_walk_min.map(|v| v as i64),
                store.station_distance_m.map(|v| v as i64),
                store.opening_hours,
                store.total_machines,
                store.pachinko_machines,
                store.pachislot_machines,
                if store.has_parking { 1i32 } else { 0i32 },
                if store.smoking_allowed { 1i32 } else { 0i32 },
                store.event_frequency,
                store.latitude,
                store.longitude,
                popular,
                if store.active { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn get_store(&self, store_id: &str) -> RankResult<Option<Store>> {
        let raw = self
            .conn
            .query_row(
                "SELECT store_id, name, prefecture, nearest_station,
                        station_walk_min, station_distance_m, opening_hours,
                        total_machines, pachinko_machines, pachislot_machines,
                        has_parking, smoking_allowed, event_frequency,
                        latitude, longitude, popular_machines, active
                 FROM store WHERE store_id = ?1",
                params![store_id],
                store_row_mapper,
            )
            .optional()?;
        match raw {
            Some(r) => Ok(Some(r.into_store()?)),
            None => Ok(None),
        }
    }

    /// All active stores, ordered by id for deterministic iteration.
    pub fn active_stores(&self) -> RankResult<Vec<Store>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, name, prefecture, nearest_station,
                    station_walk_min, station_distance_m, opening_hours,
                    total_machines, pachinko_machines, pachislot_machines,
                    has_parking, smoking_allowed, event_frequency,
                    latitude, longitude, popular_machines, active
             FROM store WHERE active = 1 ORDER BY store_id",
        )?;
        let raw = stmt
            .query_map([], store_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.into_store()).collect()
    }

    /// Replace the catch-all attribute rows attached to a store.
    pub fn replace_store_details(&self, store_id: &str, details: &[StoreDetail]) -> RankResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM store_detail WHERE store_id = ?1",
            params![store_id],
        )?;
        for d in details {
            tx.execute(
                "INSERT INTO store_detail (store_id, seq, attr_key, attr_label,
                                           attr_value, category, tier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    d.store_id,
                    d.seq,
                    d.attr_key,
                    d.attr_label,
                    d.attr_value,
                    d.category,
                    d.tier
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn store_details(&self, store_id: &str) -> RankResult<Vec<StoreDetail>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, seq, attr_key, attr_label, attr_value, category, tier
             FROM store_detail WHERE store_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![store_id], |row| {
            Ok(StoreDetail {
                store_id:   row.get(0)?,
                seq:        row.get(1)?,
                attr_key:   row.get(2)?,
                attr_label: row.get(3)?,
                attr_value: row.get(4)?,
                category:   row.get(5)?,
                tier:       row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into);
        rows
    }

    // ── Machines ────────────────────────────────────────────────────────

    pub fn upsert_machine(&self, machine: &Machine) -> RankResult<()> {
        self.conn.execute(
            "INSERT INTO machine (machine_id, name, manufacturer, machine_type,
                                  rtp_percent, popularity, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
             ON CONFLICT(machine_id) DO UPDATE SET
                 name = excluded.name,
                 manufacturer = excluded.manufacturer,
                 machine_type = excluded.machine_type,
                 rtp_percent = excluded.rtp_percent,
                 popularity = excluded.popularity,
                 active = excluded.active,
                 updated_at = datetime('now')",
            params![
                machine.machine_id,
                machine.name,
                machine.manufacturer,
                machine.machine_type,
                machine.rtp_percent,
                machine.popularity,
                if machine.active { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn get_machine(&self, machine_id: &str) -> RankResult<Option<Machine>> {
        self.conn
            .query_row(
                "SELECT machine_id, name, manufacturer, machine_type,
                        rtp_percent, popularity, active
                 FROM machine WHERE machine_id = ?1",
                params![machine_id],
                machine_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn active_machines(&self) -> RankResult<Vec<Machine>> {
        let mut stmt = self.conn.prepare(
            "SELECT machine_id, name, manufacturer, machine_type,
                    rtp_percent, popularity, active
             FROM machine WHERE active = 1 ORDER BY machine_id",
        )?;
        let rows = stmt.query_map([], machine_row_mapper)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into);
        rows
    }

    /// Popularity is the one machine field rewritten outside ingestion.
    pub fn update_machine_popularity(&self, machine_id: &str, popularity: i64) -> RankResult<()> {
        self.conn.execute(
            "UPDATE machine SET popularity = ?1, updated_at = datetime('now')
             WHERE machine_id = ?2",
            params![popularity, machine_id],
        )?;
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn upsert_event(&self, event: &Event) -> RankResult<()> {
        let store_ids = serde_json::to_string(&event.store_ids)?;
        self.conn.execute(
            "INSERT INTO event (event_id, name, event_date, store_ids, event_type,
                                bonus_multiplier, description, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
             ON CONFLICT(event_id) DO UPDATE SET
                 name = excluded.name,
                 event_date = excluded.event_date,
                 store_ids = excluded.store_ids,
                 event_type = excluded.event_type,
                 bonus_multiplier = excluded.bonus_multiplier,
                 description = excluded.description,
                 active = excluded.active,
                 updated_at = datetime('now')",
            params![
                event.event_id,
                event.name,
                date_to_text(event.event_date),
                store_ids,
                event.event_type,
                event.bonus_multiplier,
                event.description,
                if event.active { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn get_event(&self, event_id: &str) -> RankResult<Option<Event>> {
        let raw = self
            .conn
            .query_row(
                "SELECT event_id, name, event_date, store_ids, event_type,
                        bonus_multiplier, description, active
                 FROM event WHERE event_id = ?1",
                params![event_id],
                event_row_mapper,
            )
            .optional()?;
        match raw {
            Some(r) => Ok(Some(r.into_event()?)),
            None => Ok(None),
        }
    }

    /// Active events scheduled on the given date, ordered by id.
    pub fn events_on(&self, date: NaiveDate) -> RankResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, name, event_date, store_ids, event_type,
                    bonus_multiplier, description, active
             FROM event WHERE event_date = ?1 AND active = 1 ORDER BY event_id",
        )?;
        let raw = stmt
            .query_map(params![date_to_text(date)], event_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.into_event()).collect()
    }

    // ── Ingest audit log ────────────────────────────────────────────────

    pub fn record_ingest_batch(&self, report: &IngestReport, started_at: &str) -> RankResult<()> {
        let errors = serde_json::to_string(&report.errors)?;
        self.conn.execute(
            "INSERT INTO ingest_log (batch_id, dialect, success, rows_processed,
                                     rows_failed, errors, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
            params![
                report.batch_id,
                report.dialect.as_str(),
                if report.success { 1i32 } else { 0i32 },
                report.rows_processed as i64,
                report.rows_failed as i64,
                errors,
                started_at,
            ],
        )?;
        Ok(())
    }

    // ── Test helpers ────────────────────────────────────────────────────

    pub fn store_count(&self) -> RankResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM store", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn machine_count(&self) -> RankResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM machine", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn event_count(&self) -> RankResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn ingest_log_count(&self) -> RankResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM ingest_log", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

// ── Date encoding ───────────────────────────────────────────────────────

/// Dates are stored as TEXT in `YYYY-MM-DD` so they sort and compare in SQL.
pub(crate) fn date_to_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn text_to_date(text: &str) -> RankResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| RankError::Other(anyhow::anyhow!("Bad stored date '{text}': {e}")))
}

// ── Row mappers ─────────────────────────────────────────────────────────

/// Store row with JSON columns still undecoded.
struct StoreRow {
    store: Store,
    popular_json: String,
}

impl StoreRow {
    fn into_store(self) -> RankResult<Store> {
        let mut store = self.store;
        store.popular_machines = serde_json::from_str(&self.popular_json)?;
        Ok(store)
    }
}

fn store_row_mapper(row: &rusqlite::Row) -> rusqlite::Result<StoreRow> {
    Ok(StoreRow {
        store: Store {
            store_id:           row.get(0)?,
            name:               row.get(1)?,
            prefecture:         row.get(2)?,
            nearest_station:    row.get(3)?,
            station_walk_min:   row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
            station_distance_m: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
            opening_hours:      row.get(6)?,
            total_machines:     row.get(7)?,
            pachinko_machines:  row.get(8)?,
            pachislot_machines: row.get(9)?,
            has_parking:        row.get::<_, i32>(10)? != 0,
            smoking_allowed:    row.get::<_, i32>(11)? != 0,
            event_frequency:    row.get(12)?,
            latitude:           row.get(13)?,
            longitude:          row.get(14)?,
            popular_machines:   Vec::new(),
            active:             row.get::<_, i32>(16)? != 0,
        },
        popular_json: row.get(15)?,
    })
}

fn machine_row_mapper(row: &rusqlite::Row) -> rusqlite::Result<Machine> {
    Ok(Machine {
        machine_id:   row.get(0)?,
        name:         row.get(1)?,
        manufacturer: row.get(2)?,
        machine_type: row.get(3)?,
        rtp_percent:  row.get(4)?,
        popularity:   row.get(5)?,
        active:       row.get::<_, i32>(6)? != 0,
    })
}

/// Event row with the date and store list still undecoded.
struct EventRow {
    event:      Event,
    date_text:  String,
    stores_json: String,
}

impl EventRow {
    fn into_event(self) -> RankResult<Event> {
        let mut event = self.event;
        event.event_date = text_to_date(&self.date_text)?;
        event.store_ids = serde_json::from_str(&self.stores_json)?;
        Ok(event)
    }
}

fn event_row_mapper(row: &rusqlite::Row) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        event: Event {
            event_id:         row.get(0)?,
            name:             row.get(1)?,
            event_date:       NaiveDate::default(),
            store_ids:        Vec::new(),
            event_type:       row.get(4)?,
            bonus_multiplier: row.get(5)?,
            description:      row.get(6)?,
            active:           row.get::<_, i32>(7)? != 0,
        },
        date_text:   row.get(2)?,
        stores_json: row.get(3)?,
    })
}
