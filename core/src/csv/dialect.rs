//! CSV dialect detection.
//!
//! Upstream exports arrive without any envelope saying what they are,
//! so the ingest entry point sniffs the header row. Checks run from the
//! most specific signature to the least so that a sheet matching two
//! patterns lands on the narrower one. Store profile sheets in
//! particular share the `store_id` column with production data, and
//! some older profile exports carry no header at all.

use serde::{Deserialize, Serialize};

use crate::decode::day_of_column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    StoreProfile,
    MachineMaster,
    EventMaster,
    ProductionData,
    Unknown,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::StoreProfile => "store_profile",
            Dialect::MachineMaster => "machine_master",
            Dialect::EventMaster => "event_master",
            Dialect::ProductionData => "production_data",
            Dialect::Unknown => "unknown",
        }
    }
}

/// Classify a parsed CSV by its first row.
///
/// `first_row` doubles as the headerless probe: legacy store-profile
/// exports have no header, so a first row that does not match any
/// header signature but looks like profile data (five or more columns
/// with an integer sequence in the second) is treated as one.
pub fn detect(first_row: &[String]) -> Dialect {
    let header: Vec<String> = first_row
        .iter()
        .map(|f| f.trim().to_ascii_lowercase())
        .collect();
    let has = |name: &str| header.iter().any(|h| h == name);

    // Long-format profile sheets carry the attribute machinery columns
    // alongside store identity. This must win over the production
    // check below, which also sees store_id.
    if has("element") && has("information") && has("store_name") {
        return Dialect::StoreProfile;
    }
    if has("machine_id") || has("machine_name") {
        return Dialect::MachineMaster;
    }
    if has("event_id") || has("event_name") {
        return Dialect::EventMaster;
    }
    if has("store_id") && header.iter().any(|h| day_of_column(h).is_some()) {
        return Dialect::ProductionData;
    }
    if looks_like_headerless_profile(first_row) {
        return Dialect::StoreProfile;
    }
    Dialect::Unknown
}

/// True when the detector matched a header row rather than the
/// headerless probe, i.e. data starts at row two.
pub fn has_header_row(first_row: &[String]) -> bool {
    !looks_like_headerless_profile(first_row)
}

fn looks_like_headerless_profile(row: &[String]) -> bool {
    // Profile data rows: store_id, store_name, seq, element, ...
    // with seq a small integer. A real header never parses there.
    row.len() >= 5
        && !row[0].trim().is_empty()
        && row[2].trim().parse::<u32>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn store_profile_header_wins_over_production() {
        let header = row(&[
            "store_id",
            "store_name",
            "no",
            "element",
            "element_label",
            "information",
        ]);
        assert_eq!(detect(&header), Dialect::StoreProfile);
    }

    #[test]
    fn machine_and_event_masters_detected_by_id_columns() {
        assert_eq!(
            detect(&row(&["machine_id", "machine_name", "manufacturer"])),
            Dialect::MachineMaster
        );
        assert_eq!(
            detect(&row(&["event_id", "no", "element", "information"])),
            Dialect::EventMaster
        );
    }

    #[test]
    fn production_needs_store_id_and_day_columns() {
        let header = row(&["store_id", "data_type", "day_1", "day_2"]);
        assert_eq!(detect(&header), Dialect::ProductionData);
        let no_days = row(&["store_id", "data_type", "total"]);
        assert_eq!(detect(&no_days), Dialect::Unknown);
    }

    #[test]
    fn headerless_profile_probe() {
        let data = row(&["S001", "ホールAlpha", "1", "店舗名", "店舗名", "ホールAlpha"]);
        assert_eq!(detect(&data), Dialect::StoreProfile);
        assert!(!has_header_row(&data));
    }

    #[test]
    fn garbage_is_unknown() {
        assert_eq!(detect(&row(&["foo", "bar"])), Dialect::Unknown);
    }
}
