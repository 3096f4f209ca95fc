//! Event master normalizer.
//!
//! Event sheets use the long attribute format, with a twist: calendar
//! placement arrives as `day_N` attribute rows whose value is an
//! embedded JSON array naming year, month, and the stores running the
//! event that day. The fold collects every valid placement; the
//! earliest one becomes the event's canonical date and the union of
//! store ids becomes its audience. Events whose sheet never yields a
//! single valid date fall back to the ingest date rather than being
//! dropped, since the bonus logic keys off event type, not date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{field, first_float, RowError};
use crate::config::defaults;
use crate::decode::{build_date, day_of_column, decode_cells, EventDayCell};
use crate::types::EventId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id:         EventId,
    pub name:             String,
    pub event_date:       NaiveDate,
    pub store_ids:        Vec<String>,
    pub event_type:       String,
    pub bonus_multiplier: f64,
    pub description:      String,
    pub active:           bool,
}

#[derive(Debug, Default)]
pub struct EventMasterOutput {
    pub events: Vec<Event>,
    pub errors: Vec<RowError>,
}

fn normalize_event_type(raw: &str) -> String {
    let t = raw.trim();
    if t.contains("新台") || t.contains("新装") || t.to_ascii_lowercase().contains("new") {
        return "new_machine".to_string();
    }
    if t.contains("特定") || t.contains("周年") || t.contains("ゾロ目") {
        return "special_day".to_string();
    }
    if t.contains("キャンペーン") || t.contains("取材") {
        return "campaign".to_string();
    }
    match t.to_ascii_lowercase().as_str() {
        "new_machine" | "special_day" | "campaign" => t.to_ascii_lowercase(),
        _ => t.to_string(),
    }
}

/// Normalize an event master sheet.
///
/// Long layout: event_id, seq, element, element_label, information.
/// `today` anchors events that carry no usable calendar payload.
pub fn normalize(
    rows: &[Vec<String>],
    has_header: bool,
    today: NaiveDate,
) -> EventMasterOutput {
    #[derive(Default)]
    struct Draft {
        name:        String,
        event_type:  String,
        multiplier:  Option<f64>,
        description: String,
        dates:       BTreeSet<NaiveDate>,
        store_ids:   Vec<String>,
        first_row:   usize,
    }

    let mut out = EventMasterOutput::default();
    let mut drafts: BTreeMap<String, Draft> = BTreeMap::new();

    for (i, row) in rows.iter().enumerate().skip(usize::from(has_header)) {
        let row_no = i + 1;
        let event_id = field(row, 0).trim().to_string();
        if event_id.is_empty() {
            out.errors.push(RowError::new(row_no, "empty event_id"));
            continue;
        }
        let draft = drafts.entry(event_id).or_insert_with(|| Draft {
            first_row: row_no,
            ..Draft::default()
        });
        let key = field(row, 2).trim();
        let label = field(row, 3).trim();
        let value = field(row, 4).trim();
        let matches = |aliases: &[&str]| aliases.contains(&key) || aliases.contains(&label);

        if let Some(day) = day_of_column(key) {
            match decode_cells::<EventDayCell>(value) {
                Ok(cells) => {
                    for cell in cells {
                        match build_date(cell.year, cell.month, day) {
                            Some(date) => {
                                draft.dates.insert(date);
                                for sid in cell.store_ids {
                                    let sid = sid.trim().to_string();
                                    if !sid.is_empty() && !draft.store_ids.contains(&sid) {
                                        draft.store_ids.push(sid);
                                    }
                                }
                            }
                            None => out.errors.push(RowError::new(
                                row_no,
                                format!("{key}: no such date {}-{:02}-{day:02}", cell.year, cell.month),
                            )),
                        }
                    }
                }
                Err(e) => out.errors.push(RowError::new(row_no, format!("{key}: {e}"))),
            }
        } else if matches(&["イベント名", "名称", "event_name", "name"]) {
            draft.name = value.to_string();
        } else if matches(&["種別", "イベント種別", "event_type", "type"]) {
            draft.event_type = normalize_event_type(value);
        } else if matches(&["倍率", "ボーナス倍率", "bonus_multiplier", "multiplier"]) {
            draft.multiplier = first_float(value).filter(|m| *m >= 0.0);
        } else if matches(&["説明", "詳細", "description"]) {
            draft.description = value.to_string();
        } else if matches(&["対象店舗", "store_ids", "stores"]) {
            for sid in super::split_list(value) {
                if !draft.store_ids.contains(&sid) {
                    draft.store_ids.push(sid);
                }
            }
        }
    }

    for (event_id, draft) in drafts {
        if draft.name.is_empty() {
            out.errors.push(RowError::new(
                draft.first_row,
                format!("event {event_id}: missing name, skipped"),
            ));
            continue;
        }
        let event_date = draft.dates.iter().next().copied().unwrap_or(today);
        out.events.push(Event {
            event_id,
            name: draft.name,
            event_date,
            store_ids: draft.store_ids,
            event_type: draft.event_type,
            bonus_multiplier: draft.multiplier.unwrap_or(defaults::BONUS_MULTIPLIER),
            description: draft.description,
            active: true,
        });
    }
    out
}
