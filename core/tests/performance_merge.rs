//! Production data ingestion: the summary-anchor protocol, merge
//! semantics, and forced refresh.

use chrono::NaiveDate;
use hallrank_core::config::RankConfig;
use hallrank_core::ingest::ingest_csv;
use hallrank_core::store::RankStore;

fn test_store() -> RankStore {
    let store = RankStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const SUMMARY_SHEET: &str = r#"store_id,data_type,day_14,day_15
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 12480, ""avg_diff"": 156.0, ""avg_games"": 6200, ""visitors"": 380, ""is_event"": true, ""weather"": ""晴れ""}]",
"#;

const SUMMARY_SHEET_V2: &str = r#"store_id,data_type,day_14,day_15
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 999, ""avg_diff"": 12.0, ""avg_games"": 4000, ""visitors"": 120}]",
"#;

const MACHINE_SHEET_M001: &str = r#"store_id,data_type,day_14,day_15
S001,machine_summary,"[{""year"": 2025, ""month"": 7, ""machines"": {""M001"": {""machine_name"": ""アイムジャグラーEX"", ""total_diff"": 3200, ""avg_diff"": 160.0, ""total_games"": 18000, ""units"": {""1021"": {""diff"": 800, ""games"": 6300}, ""1022"": {""diff"": -150, ""games"": 5400}}}}}]",
"#;

const MACHINE_SHEET_M002: &str = r#"store_id,data_type,day_14,day_15
S001,machine_summary,"[{""year"": 2025, ""month"": 7, ""machines"": {""M002"": {""machine_name"": ""スマスロ北斗の拳"", ""total_diff"": -410, ""avg_diff"": -20.5, ""total_games"": 9400}}}]",
"#;

const MACHINE_SHEET_M001_V2: &str = r#"store_id,data_type,day_14,day_15
S001,machine_summary,"[{""year"": 2025, ""month"": 7, ""machines"": {""M001"": {""machine_name"": ""アイムジャグラーEX"", ""total_diff"": 5000, ""avg_diff"": 250.0, ""total_games"": 18200}}}]",
"#;

const TOP10_SHEET: &str = r#"store_id,data_type,day_14,day_15
S001,top10,"[{""year"": 2025, ""month"": 7, ""rankings"": [{""rank"": 2, ""machine_id"": ""M002"", ""machine_name"": ""スマスロ北斗の拳"", ""unit_id"": ""1031"", ""diff"": 2100, ""games"": 7800}, {""rank"": 1, ""machine_id"": ""M001"", ""machine_name"": ""アイムジャグラーEX"", ""unit_id"": ""1021"", ""diff"": 3300, ""games"": 8100}]}]",
"#;

const TOP10_SHEET_V2: &str = r#"store_id,data_type,day_14,day_15
S001,top10,"[{""year"": 2025, ""month"": 7, ""rankings"": [{""rank"": 1, ""machine_id"": ""M009"", ""machine_name"": ""リゼロ2"", ""unit_id"": ""1099"", ""diff"": 4100, ""games"": 8800}]}]",
"#;

/// A store summary creates the anchor row. The day of week comes from
/// the reconstructed date (2025-07-14 is a Monday), never from the
/// payload.
#[test]
fn summary_anchors_a_day() {
    let store = test_store();
    let cfg = RankConfig::default();

    let report = ingest_csv(&store, &cfg, SUMMARY_SHEET, false).unwrap();
    assert!(report.success);
    assert_eq!(report.rows_processed, 1);

    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.total_diff, 12480);
    assert_eq!(perf.avg_diff, 156.0);
    assert_eq!(perf.total_visitors, 380);
    assert!(perf.is_event_day);
    assert_eq!(perf.weather.as_deref(), Some("晴れ"));
    assert_eq!(perf.day_of_week, 1);
    assert!(perf.machines.is_empty());
    assert!(perf.top10.is_empty());
}

/// Machine data for a day with no summary anchor is dropped, not
/// turned into a phantom row.
#[test]
fn enrichment_without_anchor_is_dropped() {
    let store = test_store();
    let cfg = RankConfig::default();

    let report = ingest_csv(&store, &cfg, MACHINE_SHEET_M001, false).unwrap();
    assert_eq!(report.rows_processed, 0);
    assert_eq!(report.rows_failed, 0);
    assert_eq!(store.performance_count("S001").unwrap(), 0);
}

/// Machine payloads from separate files merge into one record: new
/// machine ids extend the map, a re-sent id overwrites its own entry,
/// and nothing duplicates.
#[test]
fn machine_data_merges_into_anchor() {
    let store = test_store();
    let cfg = RankConfig::default();

    ingest_csv(&store, &cfg, SUMMARY_SHEET, false).unwrap();
    ingest_csv(&store, &cfg, MACHINE_SHEET_M001, false).unwrap();
    ingest_csv(&store, &cfg, MACHINE_SHEET_M002, false).unwrap();

    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.machines.len(), 2);
    assert_eq!(perf.machines["M001"].units.len(), 2);
    assert_eq!(perf.machines["M002"].avg_diff, -20.5);
    assert_eq!(store.performance_count("S001").unwrap(), 1, "merge must not create rows");

    ingest_csv(&store, &cfg, MACHINE_SHEET_M001_V2, false).unwrap();
    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.machines.len(), 2, "re-sent machine must overwrite, not append");
    assert_eq!(perf.machines["M001"].avg_diff, 250.0);
}

/// Top10 payloads replace the stored list wholesale and come back
/// sorted by rank regardless of payload order.
#[test]
fn top10_replaces_and_sorts() {
    let store = test_store();
    let cfg = RankConfig::default();

    ingest_csv(&store, &cfg, SUMMARY_SHEET, false).unwrap();
    ingest_csv(&store, &cfg, TOP10_SHEET, false).unwrap();

    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.top10.len(), 2);
    assert_eq!(perf.top10[0].rank, 1);
    assert_eq!(perf.top10[0].machine_id, "M001");
    assert_eq!(perf.top10[1].rank, 2);

    ingest_csv(&store, &cfg, TOP10_SHEET_V2, false).unwrap();
    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.top10.len(), 1, "a new top10 list replaces the old one");
    assert_eq!(perf.top10[0].machine_id, "M009");
}

/// Re-sending a summary for an anchored day without force leaves the
/// original numbers in place.
#[test]
fn resend_without_force_preserves_summary() {
    let store = test_store();
    let cfg = RankConfig::default();

    ingest_csv(&store, &cfg, SUMMARY_SHEET, false).unwrap();
    let report = ingest_csv(&store, &cfg, SUMMARY_SHEET_V2, false).unwrap();
    assert_eq!(report.rows_processed, 0, "skipped summary must not count as applied");

    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.total_diff, 12480);
}

/// A forced refresh updates the summary numbers but keeps the merged
/// machine map.
#[test]
fn force_refreshes_summary_and_keeps_enrichment() {
    let store = test_store();
    let cfg = RankConfig::default();

    ingest_csv(&store, &cfg, SUMMARY_SHEET, false).unwrap();
    ingest_csv(&store, &cfg, MACHINE_SHEET_M001, false).unwrap();
    ingest_csv(&store, &cfg, SUMMARY_SHEET_V2, true).unwrap();

    let perf = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert_eq!(perf.total_diff, 999, "forced summary must win");
    assert_eq!(perf.machines.len(), 1, "forced summary must not wipe merged machines");
    assert!(!perf.is_event_day, "event flag follows the forced summary");
}

/// One broken day cell fails that day only; the sibling day on the
/// same row still lands.
#[test]
fn malformed_cell_fails_that_day_only() {
    let sheet = r#"store_id,data_type,day_14,day_15
S001,store_summary,"[{""year"": 2025","[{""year"": 2025, ""month"": 7, ""total_diff"": 800, ""avg_diff"": 40.0, ""avg_games"": 5000, ""visitors"": 210}]"
"#;
    let store = test_store();
    let cfg = RankConfig::default();

    let report = ingest_csv(&store, &cfg, sheet, false).unwrap();
    assert!(report.success);
    assert_eq!(report.rows_processed, 1);
    assert_eq!(report.rows_failed, 1);
    assert!(report.errors[0].contains("day_14"));

    assert!(store.performance_on("S001", date(2025, 7, 14)).unwrap().is_none());
    assert!(store.performance_on("S001", date(2025, 7, 15)).unwrap().is_some());
}

/// A truncated machine payload for one day leaves the sibling day's
/// machine map intact.
#[test]
fn broken_machine_cell_leaves_sibling_day_intact() {
    let anchors = r#"store_id,data_type,day_14,day_15
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 100, ""avg_diff"": 5.0, ""avg_games"": 5000, ""visitors"": 200}]","[{""year"": 2025, ""month"": 7, ""total_diff"": 200, ""avg_diff"": 10.0, ""avg_games"": 5200, ""visitors"": 220}]"
"#;
    let machines = r#"store_id,data_type,day_14,day_15
S001,machine_summary,"[{""year"": 2025, ""month"": 7, ""machines"": {""M001"":","[{""year"": 2025, ""month"": 7, ""machines"": {""M001"": {""machine_name"": ""アイムジャグラーEX"", ""avg_diff"": 120.0}}}]"
"#;
    let store = test_store();
    let cfg = RankConfig::default();

    ingest_csv(&store, &cfg, anchors, false).unwrap();
    let report = ingest_csv(&store, &cfg, machines, false).unwrap();
    assert_eq!(report.rows_failed, 1);
    assert!(report.errors[0].contains("day_14"));

    let day14 = store.performance_on("S001", date(2025, 7, 14)).unwrap().unwrap();
    assert!(day14.machines.is_empty(), "the broken day must stay bare");
    let day15 = store.performance_on("S001", date(2025, 7, 15)).unwrap().unwrap();
    assert_eq!(day15.machines["M001"].avg_diff, 120.0);
}

/// A payload whose year/month cannot combine with the column's day
/// into a real date is rejected.
#[test]
fn impossible_reconstructed_dates_are_rejected() {
    let sheet = r#"store_id,data_type,day_31
S001,store_summary,"[{""year"": 2025, ""month"": 6, ""total_diff"": 100, ""avg_diff"": 5.0, ""avg_games"": 3000, ""visitors"": 90}]"
"#;
    let store = test_store();
    let cfg = RankConfig::default();

    let report = ingest_csv(&store, &cfg, sheet, false).unwrap();
    assert_eq!(report.rows_failed, 1);
    assert!(report.errors[0].contains("no such date"));
    assert_eq!(store.performance_count("S001").unwrap(), 0);
}

/// One sheet can carry several stores; each gets its own anchor.
#[test]
fn one_sheet_feeds_many_stores() {
    let sheet = r#"store_id,data_type,day_14
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 100, ""avg_diff"": 5.0, ""avg_games"": 5000, ""visitors"": 200}]"
S002,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": -300, ""avg_diff"": -15.0, ""avg_games"": 4200, ""visitors"": 150}]"
"#;
    let store = test_store();
    let cfg = RankConfig::default();

    let report = ingest_csv(&store, &cfg, sheet, false).unwrap();
    assert_eq!(report.rows_processed, 2);
    assert_eq!(store.performance_count("S001").unwrap(), 1);
    assert_eq!(store.performance_count("S002").unwrap(), 1);
}
