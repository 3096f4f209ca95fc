//! Machine master normalizer.
//!
//! Two sheet shapes exist in the wild. Newer exports are flat, one
//! machine per row; older ones reuse the long attribute format the
//! store profiles use. Both land on the same `Machine` record. When a
//! sheet carries no explicit popularity column the machine gets a
//! keyword-scanned estimate so the scorer never sees a blank.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{field, first_float, first_int, RowError};
use crate::config::{defaults, IngestConfig};
use crate::types::MachineId;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub machine_id:   MachineId,
    pub name:         String,
    pub manufacturer: String,
    pub machine_type: String,
    pub rtp_percent:  Option<f64>,
    pub popularity:   i64,
    pub active:       bool,
}

#[derive(Debug, Default)]
pub struct MachineMasterOutput {
    pub machines: Vec<Machine>,
    pub errors:   Vec<RowError>,
}

/// Assumed popularity for a machine that declares none: a neutral base
/// plus a bonus per matched name fragment, clamped to 0..=100.
pub fn popularity_for(name: &str, cfg: &IngestConfig) -> i64 {
    let lower = name.to_lowercase();
    let mut score = defaults::POPULARITY_BASE;
    for kw in &cfg.popularity_keywords {
        if lower.contains(&kw.keyword.to_lowercase()) {
            score += kw.bonus;
        }
    }
    score.clamp(0, 100)
}

fn normalize_type(raw: &str) -> String {
    let t = raw.trim();
    if t.contains("パチスロ") || t.contains("スロット") || t.contains("スロ") {
        return "pachislot".to_string();
    }
    if t.contains("パチンコ") {
        return "pachinko".to_string();
    }
    match t.to_ascii_lowercase().as_str() {
        "pachinko" => "pachinko".to_string(),
        "pachislot" | "slot" => "pachislot".to_string(),
        _ => defaults::MACHINE_TYPE.to_string(),
    }
}

fn parse_rtp(raw: &str) -> Option<f64> {
    // Stated as 機械割: plausible values sit near 100%.
    first_float(raw).filter(|v| *v > 0.0 && *v < 200.0)
}

/// Normalize a machine master sheet, flat or long format.
pub fn normalize(
    rows: &[Vec<String>],
    has_header: bool,
    cfg: &IngestConfig,
) -> MachineMasterOutput {
    let header: Vec<String> = if has_header && !rows.is_empty() {
        rows[0].iter().map(|h| h.trim().to_ascii_lowercase()).collect()
    } else {
        Vec::new()
    };
    let long_format = header.iter().any(|h| h == "element");
    if long_format {
        normalize_long(rows, cfg)
    } else {
        normalize_flat(rows, has_header, cfg)
    }
}

// Flat layout: machine_id, machine_name, manufacturer, machine_type,
// rtp_percent, popularity (optional).
fn normalize_flat(rows: &[Vec<String>], has_header: bool, cfg: &IngestConfig) -> MachineMasterOutput {
    let mut out = MachineMasterOutput::default();
    for (i, row) in rows.iter().enumerate().skip(usize::from(has_header)) {
        let row_no = i + 1;
        let machine_id = field(row, 0).trim().to_string();
        let name = field(row, 1).trim().to_string();
        if machine_id.is_empty() {
            out.errors.push(RowError::new(row_no, "empty machine_id"));
            continue;
        }
        if name.is_empty() {
            out.errors.push(RowError::new(
                row_no,
                format!("machine {machine_id}: missing name, skipped"),
            ));
            continue;
        }
        let popularity = first_int(field(row, 5))
            .map(|p| p.clamp(0, 100))
            .unwrap_or_else(|| popularity_for(&name, cfg));
        out.machines.push(Machine {
            machine_id,
            manufacturer: non_empty_or(field(row, 2), defaults::MANUFACTURER),
            machine_type: normalize_type(field(row, 3)),
            rtp_percent: parse_rtp(field(row, 4)),
            popularity,
            active: true,
            name,
        });
    }
    out
}

// Long layout: machine_id, seq, element, element_label, information.
fn normalize_long(rows: &[Vec<String>], cfg: &IngestConfig) -> MachineMasterOutput {
    #[derive(Default)]
    struct Draft {
        name:         String,
        manufacturer: String,
        machine_type: String,
        rtp:          Option<f64>,
        popularity:   Option<i64>,
        first_row:    usize,
    }
    let mut out = MachineMasterOutput::default();
    let mut drafts: BTreeMap<String, Draft> = BTreeMap::new();

    for (i, row) in rows.iter().enumerate().skip(1) {
        let row_no = i + 1;
        let machine_id = field(row, 0).trim().to_string();
        if machine_id.is_empty() {
            out.errors.push(RowError::new(row_no, "empty machine_id"));
            continue;
        }
        let draft = drafts.entry(machine_id).or_insert_with(|| Draft {
            first_row: row_no,
            ..Draft::default()
        });
        let key = field(row, 2).trim();
        let label = field(row, 3).trim();
        let value = field(row, 4).trim();
        let matches = |aliases: &[&str]| aliases.contains(&key) || aliases.contains(&label);
        if matches(&["機種名", "名称", "machine_name", "name"]) {
            draft.name = value.to_string();
        } else if matches(&["メーカー", "manufacturer"]) {
            draft.manufacturer = value.to_string();
        } else if matches(&["タイプ", "種別", "machine_type", "type"]) {
            draft.machine_type = normalize_type(value);
        } else if matches(&["機械割", "rtp", "rtp_percent", "出玉率"]) {
            draft.rtp = parse_rtp(value);
        } else if matches(&["人気度", "popularity"]) {
            draft.popularity = first_int(value).map(|p| p.clamp(0, 100));
        }
        // Unmatched machine attributes have no side table; dropped.
    }

    for (machine_id, draft) in drafts {
        if draft.name.is_empty() {
            out.errors.push(RowError::new(
                draft.first_row,
                format!("machine {machine_id}: missing name, skipped"),
            ));
            continue;
        }
        let popularity = draft
            .popularity
            .unwrap_or_else(|| popularity_for(&draft.name, cfg));
        out.machines.push(Machine {
            machine_id,
            manufacturer: non_empty_or(&draft.manufacturer, defaults::MANUFACTURER),
            machine_type: if draft.machine_type.is_empty() {
                defaults::MACHINE_TYPE.to_string()
            } else {
                draft.machine_type
            },
            rtp_percent: draft.rtp,
            popularity,
            active: true,
            name: draft.name,
        });
    }
    out
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let v = value.trim();
    if v.is_empty() { fallback.to_string() } else { v.to_string() }
}
