//! Store profile normalizer.
//!
//! Profile sheets are long-format: one row per attribute, grouped by
//! store. The fold walks rows in order, routes each attribute through
//! a declarative key table onto the typed `Store` record, and keeps
//! every unmatched attribute as a `StoreDetail` so nothing the
//! operator typed is lost. A store is admitted only once it has a
//! displayable name and a prefecture; everything else defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{field, first_float, first_int, split_list, truthy, RowError};
use crate::config::IngestConfig;
use crate::types::StoreId;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Store {
    pub store_id:           StoreId,
    pub name:               String,
    pub prefecture:         String,
    pub nearest_station:    String,
    pub station_walk_min:   Option<u32>,
    pub station_distance_m: Option<u32>,
    pub opening_hours:      String,
    pub total_machines:     i64,
    pub pachinko_machines:  i64,
    pub pachislot_machines: i64,
    pub has_parking:        bool,
    pub smoking_allowed:    bool,
    pub event_frequency:    f64,
    pub latitude:           Option<f64>,
    pub longitude:          Option<f64>,
    pub popular_machines:   Vec<String>,
    pub active:             bool,
}

/// An attribute row the key table has no mapping for. Preserved
/// verbatim alongside the typed record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDetail {
    pub store_id:   StoreId,
    pub seq:        i64,
    pub attr_key:   String,
    pub attr_label: String,
    pub attr_value: String,
    pub category:   String,
    pub tier:       String,
}

#[derive(Debug, Default)]
pub struct StoreProfileOutput {
    pub stores:  Vec<Store>,
    pub details: Vec<StoreDetail>,
    pub errors:  Vec<RowError>,
}

// ── Attribute key table ────────────────────────────────────────────
//
// Alias lists cover the spellings seen across operator sheets. Keys
// are matched exactly (trimmed) against element first, then against
// element_label.

type Apply = fn(&mut Store, &str, &IngestConfig);

const ATTRIBUTES: &[(&[&str], Apply)] = &[
    (&["店舗名", "店名", "正式名称", "name"], set_name),
    (&["都道府県", "県", "エリア", "prefecture"], set_prefecture),
    (&["最寄駅", "最寄り駅", "駅", "station"], set_station),
    (&["駅徒歩", "徒歩", "駅からの距離", "アクセス", "walk"], set_walk),
    (&["営業時間", "営業", "hours"], set_hours),
    (&["総台数", "台数", "設置台数"], set_total_machines),
    (&["パチンコ台数", "パチンコ"], set_pachinko_machines),
    (&["パチスロ台数", "スロット台数", "パチスロ", "スロット"], set_pachislot_machines),
    (&["駐車場", "parking"], set_parking),
    (&["喫煙", "喫煙環境", "smoking"], set_smoking),
    (&["イベント頻度", "イベント", "取材頻度"], set_event_frequency),
    (&["緯度経度", "座標", "位置情報"], set_geo),
    (&["人気機種", "主力機種", "看板機種"], set_popular_machines),
];

fn lookup(key: &str) -> Option<Apply> {
    let key = key.trim();
    ATTRIBUTES
        .iter()
        .find(|(aliases, _)| aliases.contains(&key))
        .map(|(_, apply)| *apply)
}

fn set_name(s: &mut Store, v: &str, _: &IngestConfig) {
    let v = v.trim();
    if !v.is_empty() {
        s.name = v.to_string();
    }
}

fn set_prefecture(s: &mut Store, v: &str, _: &IngestConfig) {
    s.prefecture = v.trim().to_string();
}

fn set_station(s: &mut Store, v: &str, _: &IngestConfig) {
    s.nearest_station = v.trim().to_string();
}

fn set_walk(s: &mut Store, v: &str, cfg: &IngestConfig) {
    let speed = cfg.walk_speed_m_per_min.max(1);
    if v.contains('m') || v.contains('ｍ') || v.contains("メートル") {
        if let Some(m) = first_int(v).filter(|m| *m > 0) {
            s.station_distance_m = Some(m as u32);
            s.station_walk_min = Some((m as u32).div_ceil(speed));
        }
    } else if let Some(minutes) = first_int(v).filter(|m| *m > 0) {
        s.station_walk_min = Some(minutes as u32);
        s.station_distance_m = Some(minutes as u32 * speed);
    }
}

fn set_hours(s: &mut Store, v: &str, _: &IngestConfig) {
    s.opening_hours = v.trim().to_string();
}

fn set_total_machines(s: &mut Store, v: &str, _: &IngestConfig) {
    s.total_machines = first_int(v).unwrap_or(0).max(0);
}

fn set_pachinko_machines(s: &mut Store, v: &str, _: &IngestConfig) {
    s.pachinko_machines = first_int(v).unwrap_or(0).max(0);
}

fn set_pachislot_machines(s: &mut Store, v: &str, _: &IngestConfig) {
    s.pachislot_machines = first_int(v).unwrap_or(0).max(0);
}

fn set_parking(s: &mut Store, v: &str, _: &IngestConfig) {
    s.has_parking = truthy(v);
}

fn set_smoking(s: &mut Store, v: &str, _: &IngestConfig) {
    // 分煙 (separated areas) still counts as smoking available;
    // 禁煙 overrides everything.
    if v.contains("禁煙") {
        s.smoking_allowed = false;
    } else {
        s.smoking_allowed = truthy(v) || v.contains('可') || v.contains("分煙");
    }
}

fn set_event_frequency(s: &mut Store, v: &str, _: &IngestConfig) {
    // Normalized to events per month.
    if v.contains("毎日") {
        s.event_frequency = 30.0;
        return;
    }
    if let Some(n) = first_int(v).filter(|n| *n >= 0) {
        s.event_frequency = if v.contains('週') { n as f64 * 4.0 } else { n as f64 };
    }
}

fn set_geo(s: &mut Store, v: &str, _: &IngestConfig) {
    let parts: Vec<&str> = v.split([',', '、']).map(str::trim).collect();
    if parts.len() == 2 {
        if let (Some(lat), Some(lng)) = (first_float(parts[0]), first_float(parts[1])) {
            s.latitude = Some(lat);
            s.longitude = Some(lng);
        }
    }
}

fn set_popular_machines(s: &mut Store, v: &str, _: &IngestConfig) {
    s.popular_machines = split_list(v);
}

// ── The fold ───────────────────────────────────────────────────────

struct Draft {
    store:      Store,
    sheet_name: String,
    first_row:  usize,
}

/// Fold attribute rows into stores.
///
/// Row layout: store_id, store_name, seq, element, element_label,
/// information, category, priority. When `has_header` is false the
/// first row is already data (legacy headerless exports).
pub fn normalize(
    rows: &[Vec<String>],
    has_header: bool,
    cfg: &IngestConfig,
) -> StoreProfileOutput {
    let mut out = StoreProfileOutput::default();
    let mut drafts: BTreeMap<String, Draft> = BTreeMap::new();

    let start = usize::from(has_header);
    for (i, row) in rows.iter().enumerate().skip(start) {
        let row_no = i + 1;
        if row.len() < 6 {
            out.errors.push(RowError::new(
                row_no,
                format!("expected at least 6 columns, got {}", row.len()),
            ));
            continue;
        }
        let store_id = field(row, 0).trim().to_string();
        if store_id.is_empty() {
            out.errors.push(RowError::new(row_no, "empty store_id"));
            continue;
        }

        let draft = drafts.entry(store_id.clone()).or_insert_with(|| Draft {
            store: Store {
                store_id: store_id.clone(),
                active: true,
                ..Store::default()
            },
            sheet_name: String::new(),
            first_row:  row_no,
        });
        let sheet_name = field(row, 1).trim();
        if draft.sheet_name.is_empty() && !sheet_name.is_empty() {
            draft.sheet_name = sheet_name.to_string();
        }

        let key = field(row, 3);
        let label = field(row, 4);
        let value = field(row, 5);
        match lookup(key).or_else(|| lookup(label)) {
            Some(apply) => apply(&mut draft.store, value, cfg),
            None => out.details.push(StoreDetail {
                store_id,
                seq:        first_int(field(row, 2)).unwrap_or(0),
                attr_key:   key.trim().to_string(),
                attr_label: label.trim().to_string(),
                attr_value: value.trim().to_string(),
                category:   field(row, 6).trim().to_string(),
                tier:       field(row, 7).trim().to_string(),
            }),
        }
    }

    for (store_id, mut draft) in drafts {
        if draft.store.name.is_empty() {
            draft.store.name = draft.sheet_name.clone();
        }
        if draft.store.name.is_empty() || draft.store.prefecture.is_empty() {
            out.errors.push(RowError::new(
                draft.first_row,
                format!("store {store_id}: missing name or prefecture, skipped"),
            ));
            out.details.retain(|d| d.store_id != store_id);
            continue;
        }
        out.stores.push(draft.store);
    }
    out
}
