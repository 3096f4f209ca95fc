//! The ingest gate itself: dialect sniffing, whole-file rejection,
//! per-row failure accounting, and the audit trail.

use hallrank_core::config::RankConfig;
use hallrank_core::csv::dialect::Dialect;
use hallrank_core::ingest::{ingest_csv, recompute_popularity};
use hallrank_core::store::RankStore;
use hallrank_core::RankError;

fn test_store() -> RankStore {
    let store = RankStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

const PROFILE_SHEET: &str = "\
store_id,store_name,no,element,element_label,information,category,priority
S001,ホール上野,1,店舗名,正式名称,ホール上野本店,基本情報,1
S001,ホール上野,2,都道府県,所在地,東京都,基本情報,1
S001,ホール上野,3,最寄駅,アクセス,上野駅,基本情報,2
";

const MACHINE_SHEET: &str = "\
machine_id,machine_name,manufacturer,machine_type,rtp_percent,popularity
M001,アイムジャグラーEX,北電子,パチスロ,97.0,
";

const EVENT_SHEET: &str = r#"event_id,no,element,element_label,information
E001,1,イベント名,名称,スロパチ取材
E001,2,day_7,7日,"[{""year"": 2025, ""month"": 7, ""store_ids"": [""S001""]}]"
"#;

const PRODUCTION_SHEET: &str = r#"store_id,data_type,day_14
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 5000, ""avg_diff"": 62.5, ""avg_games"": 6000, ""visitors"": 300}]"
"#;

/// A header no dialect claims rejects the whole file before anything
/// is written, including the audit row.
#[test]
fn unrecognizable_header_rejects_the_file() {
    let store = test_store();
    let cfg = RankConfig::default();

    let err = ingest_csv(&store, &cfg, "foo,bar\n1,2\n", false).unwrap_err();
    assert!(
        matches!(err, RankError::UnknownDialect { ref header } if header == "foo,bar"),
        "got {err}"
    );
    assert_eq!(store.ingest_log_count().unwrap(), 0);
}

/// Files with no records at all are rejected outright.
#[test]
fn empty_input_is_rejected() {
    let store = test_store();
    let cfg = RankConfig::default();

    assert!(matches!(
        ingest_csv(&store, &cfg, "", false),
        Err(RankError::EmptyInput)
    ));
    assert!(matches!(
        ingest_csv(&store, &cfg, "\n\n", false),
        Err(RankError::EmptyInput)
    ));
    assert_eq!(store.ingest_log_count().unwrap(), 0);
}

/// Each of the four sheet shapes reaches its own writer, and every
/// accepted batch leaves an audit row.
#[test]
fn each_dialect_routes_to_its_writer() {
    let store = test_store();
    let cfg = RankConfig::default();

    let profiles = ingest_csv(&store, &cfg, PROFILE_SHEET, false).unwrap();
    assert_eq!(profiles.dialect, Dialect::StoreProfile);
    assert_eq!(store.store_count().unwrap(), 1);

    let machines = ingest_csv(&store, &cfg, MACHINE_SHEET, false).unwrap();
    assert_eq!(machines.dialect, Dialect::MachineMaster);
    assert_eq!(store.machine_count().unwrap(), 1);

    let events = ingest_csv(&store, &cfg, EVENT_SHEET, false).unwrap();
    assert_eq!(events.dialect, Dialect::EventMaster);
    assert_eq!(store.event_count().unwrap(), 1);

    let production = ingest_csv(&store, &cfg, PRODUCTION_SHEET, false).unwrap();
    assert_eq!(production.dialect, Dialect::ProductionData);
    assert_eq!(production.rows_processed, 1);

    assert_eq!(store.ingest_log_count().unwrap(), 4);
    for report in [&profiles, &machines, &events, &production] {
        assert!(report.success);
        assert!(!report.batch_id.is_empty());
    }
}

/// Bad rows are skipped and counted; the batch still succeeds as long
/// as something was written.
#[test]
fn bad_rows_are_counted_not_fatal() {
    let store = test_store();
    let cfg = RankConfig::default();

    let text = format!("{PROFILE_SHEET}S002,ホール蒲田,9\nS003,ホール大森,9\n");
    let report = ingest_csv(&store, &cfg, &text, false).unwrap();

    assert!(report.success);
    assert_eq!(report.rows_processed, 1);
    assert_eq!(report.rows_failed, 2);
    assert_eq!(report.errors.len(), 2);
    for error in &report.errors {
        assert!(error.contains("columns"), "unexpected message: {error}");
    }
    assert_eq!(store.store_count().unwrap(), 1);
    assert_eq!(store.ingest_log_count().unwrap(), 1);
}

/// The error list is clipped at the configured cap with a summary
/// line; the failure count still reflects every bad row.
#[test]
fn error_reports_are_clipped() {
    let store = test_store();
    let mut cfg = RankConfig::default();
    cfg.ingest.max_reported_errors = 3;

    let mut text = String::from(
        "store_id,store_name,no,element,element_label,information,category,priority\n",
    );
    for n in 0..5 {
        text.push_str(&format!("S10{n},ホール,9\n"));
    }
    let report = ingest_csv(&store, &cfg, &text, false).unwrap();

    assert!(!report.success, "nothing was written so the batch failed");
    assert_eq!(report.rows_processed, 0);
    assert_eq!(report.rows_failed, 5);
    assert_eq!(report.errors.len(), 4);
    assert_eq!(report.errors[3], "2 more rows failed");
}

/// Audit rows accumulate across batches rather than replacing each
/// other.
#[test]
fn audit_rows_accumulate() {
    let store = test_store();
    let cfg = RankConfig::default();

    for _ in 0..3 {
        ingest_csv(&store, &cfg, MACHINE_SHEET, false).unwrap();
    }
    assert_eq!(store.ingest_log_count().unwrap(), 3);
    assert_eq!(store.machine_count().unwrap(), 1, "same machine upserted each time");
}

/// The bulk recompute rewrites popularity from the current keyword
/// table, replacing explicit overrides and stale values alike.
#[test]
fn popularity_recompute_refreshes_stale_scores() {
    let store = test_store();
    let cfg = RankConfig::default();

    let sheet = "\
machine_id,machine_name,manufacturer,machine_type,rtp_percent,popularity
M001,アイムジャグラーEX,北電子,パチスロ,97.0,
M002,ゴーゴージャグラー3,北電子,パチスロ,96.0,10
M003,ディスクアップ2,サミー,パチスロ,98.0,95
";
    ingest_csv(&store, &cfg, sheet, false).unwrap();
    assert_eq!(store.get_machine("M001").unwrap().unwrap().popularity, 80);
    assert_eq!(store.get_machine("M002").unwrap().unwrap().popularity, 10);

    let changed = recompute_popularity(&store, &cfg).unwrap();
    assert_eq!(changed, 2, "M001 was already current");
    assert_eq!(store.get_machine("M002").unwrap().unwrap().popularity, 80);
    assert_eq!(store.get_machine("M003").unwrap().unwrap().popularity, 50);
}
