//! Ranking assembly: dense ranks, active-store filtering, and the
//! commentary paths, finishing with a CSV-to-ranking run.

use chrono::NaiveDate;
use hallrank_core::analysis::analyze_all;
use hallrank_core::commentary::CommentaryProvider;
use hallrank_core::config::RankConfig;
use hallrank_core::ingest::ingest_csv;
use hallrank_core::normalize::store_profile::Store;
use hallrank_core::ranking::rank_stores;
use hallrank_core::scoring::{PlayStrategy, RecommendationTier, ScoreAnalysis};
use hallrank_core::store::RankStore;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn mem() -> RankStore {
    let db = RankStore::in_memory().unwrap();
    db.migrate().unwrap();
    db
}

fn seed_store(db: &RankStore, id: &str, active: bool) {
    db.upsert_store(&Store {
        store_id:        id.to_string(),
        name:            format!("ホール{id}"),
        prefecture:      "東京都".to_string(),
        nearest_station: "新宿駅".to_string(),
        active,
        ..Store::default()
    })
    .unwrap();
}

fn analysis(
    store_id: &str,
    date: NaiveDate,
    total: i64,
    tier: RecommendationTier,
    rationale: &[&str],
) -> ScoreAnalysis {
    ScoreAnalysis {
        store_id:             store_id.to_string(),
        analysis_date:        date,
        total_score:          total,
        base_score:           total as f64 - 10.0,
        event_bonus:          0.0,
        machine_popularity:   5.0,
        access_score:         5.0,
        personal_adjustment:  0.0,
        predicted_win_rate:   30 + total * 6 / 10,
        confidence:           75,
        tier,
        recommended_machines: Vec::new(),
        play_strategy:        PlayStrategy::default(),
        rationale:            rationale.iter().map(|s| s.to_string()).collect(),
    }
}

struct EchoProvider;

impl CommentaryProvider for EchoProvider {
    fn commentary(&self, store: &Store, analysis: &ScoreAnalysis) -> anyhow::Result<String> {
        Ok(format!("{}は総合{}点です", store.name, analysis.total_score))
    }
}

struct OfflineProvider;

impl CommentaryProvider for OfflineProvider {
    fn commentary(&self, _: &Store, _: &ScoreAnalysis) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("gateway offline"))
    }
}

/// Equal scores share a rank and the next distinct score takes the
/// following rank: 83, 83, 78 ranks as 1, 1, 2. Ties order by id.
#[test]
fn equal_scores_share_a_dense_rank() {
    let db = mem();
    let date = d(2025, 7, 14);
    for id in ["S101", "S102", "S103"] {
        seed_store(&db, id, true);
    }
    db.replace_score_analysis(&analysis("S103", date, 78, RecommendationTier::Recommended, &[]))
        .unwrap();
    db.replace_score_analysis(&analysis("S102", date, 83, RecommendationTier::Recommended, &[]))
        .unwrap();
    db.replace_score_analysis(&analysis("S101", date, 83, RecommendationTier::Recommended, &[]))
        .unwrap();

    let ranked = rank_stores(&db, date, None).unwrap();
    let got: Vec<(u32, &str, i64)> = ranked
        .iter()
        .map(|r| (r.rank, r.store_id.as_str(), r.total_score))
        .collect();
    assert_eq!(
        got,
        vec![(1, "S101", 83), (1, "S102", 83), (2, "S103", 78)]
    );
}

/// A store taken out of service disappears from the ranking even when
/// an analysis row for the date still exists.
#[test]
fn retired_stores_drop_out_of_the_ranking() {
    let db = mem();
    let date = d(2025, 7, 14);
    seed_store(&db, "S104", true);
    seed_store(&db, "S105", false);
    db.replace_score_analysis(&analysis("S104", date, 60, RecommendationTier::Neutral, &[]))
        .unwrap();
    db.replace_score_analysis(&analysis("S105", date, 90, RecommendationTier::HighlyRecommended, &[]))
        .unwrap();

    let ranked = rank_stores(&db, date, None).unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].store_id, "S104");
    assert_eq!(ranked[0].rank, 1);
}

/// Without a provider the comment is built from the tier and the first
/// rationale line; an empty rationale keeps just the tier sentence.
#[test]
fn fallback_comments_follow_the_tier() {
    let db = mem();
    let date = d(2025, 7, 14);
    for id in ["S201", "S202", "S203"] {
        seed_store(&db, id, true);
    }
    db.replace_score_analysis(&analysis(
        "S201",
        date,
        85,
        RecommendationTier::HighlyRecommended,
        &["出玉好調が続いています"],
    ))
    .unwrap();
    db.replace_score_analysis(&analysis("S202", date, 50, RecommendationTier::Neutral, &[]))
        .unwrap();
    db.replace_score_analysis(&analysis(
        "S203",
        date,
        20,
        RecommendationTier::NotRecommended,
        &["回収傾向です"],
    ))
    .unwrap();

    let ranked = rank_stores(&db, date, None).unwrap();
    assert_eq!(ranked[0].comment, "本日の狙い目です。出玉好調が続いています。");
    assert_eq!(ranked[1].comment, "平常営業の見込みです。");
    assert_eq!(ranked[2].comment, "本日は見送りが無難です。回収傾向です。");
}

/// A working provider supplies the published comment.
#[test]
fn provider_text_is_published_when_it_succeeds() {
    let db = mem();
    let date = d(2025, 7, 14);
    seed_store(&db, "S301", true);
    db.replace_score_analysis(&analysis("S301", date, 72, RecommendationTier::Recommended, &[]))
        .unwrap();

    let ranked = rank_stores(&db, date, Some(&EchoProvider)).unwrap();
    assert_eq!(ranked[0].comment, "ホールS301は総合72点です");
}

/// A failing provider never blocks the ranking; the deterministic
/// fallback takes its place.
#[test]
fn provider_failure_falls_back_to_deterministic_text() {
    let db = mem();
    let date = d(2025, 7, 14);
    seed_store(&db, "S302", true);
    db.replace_score_analysis(&analysis(
        "S302",
        date,
        72,
        RecommendationTier::Recommended,
        &["イベント開催日です"],
    ))
    .unwrap();

    let ranked = rank_stores(&db, date, Some(&OfflineProvider)).unwrap();
    assert_eq!(ranked[0].comment, "期待値の高い店舗です。イベント開催日です。");
}

/// Re-analyzing a store for the same date replaces the stored row
/// instead of accumulating duplicates.
#[test]
fn reanalysis_replaces_the_stored_row() {
    let db = mem();
    let date = d(2025, 7, 14);
    seed_store(&db, "S401", true);
    db.replace_score_analysis(&analysis("S401", date, 55, RecommendationTier::Neutral, &[]))
        .unwrap();
    db.replace_score_analysis(&analysis("S401", date, 71, RecommendationTier::Recommended, &[]))
        .unwrap();

    assert_eq!(db.analysis_count().unwrap(), 1);
    let ranked = rank_stores(&db, date, None).unwrap();
    assert_eq!(ranked[0].total_score, 71);
}

const PROFILE_SHEET: &str = "\
store_id,store_name,no,element,element_label,information,category,priority
S001,ホール新宿,1,店舗名,正式名称,ホール新宿東口店,基本情報,1
S001,ホール新宿,2,都道府県,所在地,東京都,基本情報,1
S001,ホール新宿,3,最寄駅,アクセス,新宿駅,基本情報,2
S002,ホール川崎,1,店舗名,正式名称,ホール川崎駅前店,基本情報,1
S002,ホール川崎,2,都道府県,所在地,神奈川県,基本情報,1
S002,ホール川崎,3,最寄駅,アクセス,川崎駅,基本情報,2
";

const PRODUCTION_SHEET: &str = r#"store_id,data_type,day_14
S001,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": 16000, ""avg_diff"": 200.0, ""avg_games"": 7000, ""visitors"": 400}]"
S002,store_summary,"[{""year"": 2025, ""month"": 7, ""total_diff"": -8000, ""avg_diff"": -100.0, ""avg_games"": 4000, ""visitors"": 150}]"
"#;

/// The whole path: profiles and production data in through the CSV
/// gate, analyses computed, ranking out.
#[test]
fn csv_to_ranking_full_pipeline() {
    let db = mem();
    let cfg = RankConfig::default();
    let date = d(2025, 7, 14);

    let profiles = ingest_csv(&db, &cfg, PROFILE_SHEET, false).unwrap();
    assert!(profiles.success, "profile ingest failed: {:?}", profiles.errors);
    let production = ingest_csv(&db, &cfg, PRODUCTION_SHEET, false).unwrap();
    assert!(production.success, "production ingest failed: {:?}", production.errors);
    assert_eq!(production.rows_processed, 2);

    let analyses = analyze_all(&db, &cfg, date).unwrap();
    assert_eq!(analyses.len(), 2);

    let ranked = rank_stores(&db, date, None).unwrap();
    assert_eq!(ranked.len(), 2);

    let leader = &ranked[0];
    assert_eq!(leader.rank, 1);
    assert_eq!(leader.store_id, "S001");
    assert_eq!(leader.store_name, "ホール新宿東口店");
    assert_eq!(leader.prefecture, "東京都");
    assert_eq!(leader.total_score, 70);
    assert_eq!(leader.predicted_win_rate, 82);
    assert!(!leader.comment.is_empty());

    let trailer = &ranked[1];
    assert_eq!(trailer.rank, 2);
    assert_eq!(trailer.store_id, "S002");
    assert!(trailer.total_score < leader.total_score);
    assert!((25..=90).contains(&trailer.predicted_win_rate));
}
