//! Embedded-JSON payload decoding for production data cells.
//!
//! Production sheets pack one JSON array per day column (`day_1` ..
//! `day_31`). Depending on which tool exported the sheet, the cell
//! value may additionally be wrapped in a layer of CSV-style quoting
//! with every inner quote doubled. The decoder peels that layer when
//! present, then insists on a JSON array before handing anything to
//! serde. A cell that fails any step is reported as a cell error and
//! never becomes a half-parsed record.
//!
//! Dates are never trusted from the payload alone: the day of month
//! comes from the column name, the year and month from the payload,
//! and the combination must survive `NaiveDate::from_ymd_opt`.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Day of month encoded in a production column name: `day_14` -> 14.
pub fn day_of_column(name: &str) -> Option<u32> {
    let rest = name.trim().strip_prefix("day_")?;
    let day: u32 = rest.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

/// Rebuild a calendar date from payload year/month and the column day.
pub fn build_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Peel one layer of spreadsheet quoting if the cell carries it.
///
/// `"[{""year"": 2025}]"` becomes `[{"year": 2025}]`; a cell that is
/// already bare JSON passes through untouched.
pub fn unwrap_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.to_string()
    }
}

/// Decode one day cell into typed payload entries.
///
/// An empty cell is absence of data, not an error. Anything non-empty
/// must unwrap to a complete JSON array of the expected shape; the
/// error string describes the first failing step.
pub fn decode_cells<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, String> {
    let cleaned = unwrap_cell(raw);
    let body = cleaned.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if !body.starts_with('[') || !body.ends_with(']') {
        return Err(format!(
            "cell is not a JSON array (starts with {:?})",
            body.chars().next().unwrap_or(' ')
        ));
    }
    serde_json::from_str(body).map_err(|e| format!("JSON decode failed: {e}"))
}

// ── Payload shapes ─────────────────────────────────────────────────
//
// year and month are deliberately non-defaulted: a payload that cannot
// be dated cannot be stored.

/// Store-level daily summary payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDayCell {
    pub year:  i32,
    pub month: u32,
    #[serde(default)]
    pub total_diff: i64,
    #[serde(default)]
    pub avg_diff: f64,
    #[serde(default)]
    pub avg_games: f64,
    #[serde(default)]
    pub visitors: i64,
    #[serde(default)]
    pub is_event: bool,
    #[serde(default)]
    pub weather: Option<String>,
}

/// Per-machine daily performance payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineDayCell {
    pub year:  i32,
    pub month: u32,
    #[serde(default)]
    pub machines: HashMap<String, MachineDayStat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineDayStat {
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub total_diff: i64,
    #[serde(default)]
    pub avg_diff: f64,
    #[serde(default)]
    pub total_games: i64,
    #[serde(default)]
    pub units: HashMap<String, UnitStat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitStat {
    #[serde(default)]
    pub diff: i64,
    #[serde(default)]
    pub games: i64,
}

impl MachineDayStat {
    /// The source's own average when present, otherwise recomputed from
    /// unit-level diffs, otherwise the day total.
    pub fn effective_avg_diff(&self) -> f64 {
        if self.avg_diff != 0.0 {
            return self.avg_diff;
        }
        if !self.units.is_empty() {
            let sum: i64 = self.units.values().map(|u| u.diff).sum();
            return sum as f64 / self.units.len() as f64;
        }
        self.total_diff as f64
    }
}

/// Daily top-10 ranking payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Top10Cell {
    pub year:  i32,
    pub month: u32,
    #[serde(default)]
    pub rankings: Vec<Top10Entry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Top10Entry {
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub unit_id: String,
    #[serde(default)]
    pub diff: i64,
    #[serde(default)]
    pub games: i64,
}

/// Event-calendar payload carried in event master day columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDayCell {
    pub year:  i32,
    pub month: u32,
    #[serde(default)]
    pub store_ids: Vec<String>,
}
