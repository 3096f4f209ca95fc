//! rank-runner: command line driver for the parlor ranking pipeline.
//!
//! Usage:
//!   rank-runner --db parlors.db --ingest stores.csv --ingest july.csv
//!   rank-runner --db parlors.db --analyze 2025-07-14 --top 10
//!   rank-runner --db parlors.db --ingest july_v2.csv --force --analyze today

use anyhow::Result;
use chrono::NaiveDate;
use hallrank_core::{analysis, config::RankConfig, ingest, ranking, store::RankStore};
use std::env;
use std::fs;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or("ranking.db");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");
    let analyze = args
        .windows(2)
        .find(|w| w[0] == "--analyze")
        .map(|w| w[1].as_str());
    let ingest_files: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "--ingest")
        .map(|w| w[1].as_str())
        .collect();
    let force = args.iter().any(|a| a == "--force");
    let recompute = args.iter().any(|a| a == "--recompute-popularity");
    let top = parse_arg(&args, "--top", 10usize);

    if ingest_files.is_empty() && analyze.is_none() && !recompute {
        print_usage();
        return Ok(());
    }

    let store = RankStore::open(db)?;
    store.migrate()?;
    let cfg = match RankConfig::load(data_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::info!("using built-in config: {e}");
            RankConfig::default()
        }
    };

    for path in &ingest_files {
        let text =
            fs::read_to_string(path).map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let report = ingest::ingest_csv(&store, &cfg, &text, force)?;
        println!(
            "ingested {path} as {}: {} processed, {} failed",
            report.dialect.as_str(),
            report.rows_processed,
            report.rows_failed
        );
        for err in &report.errors {
            println!("    {err}");
        }
    }

    if recompute {
        let changed = ingest::recompute_popularity(&store, &cfg)?;
        println!("recomputed machine popularity: {changed} updated");
    }

    if let Some(raw) = analyze {
        let date = parse_date(raw)?;
        let analyses = analysis::analyze_all(&store, &cfg, date)?;
        let ranked = ranking::rank_stores(&store, date, None)?;
        print_ranking(date, analyses.len(), &ranked, top);
    }

    Ok(())
}

fn print_ranking(
    date: NaiveDate,
    analyzed: usize,
    ranked: &[hallrank_core::ranking::RankedStore],
    top: usize,
) {
    println!();
    println!("=== RANKING {date} ===");
    println!("  stores analyzed: {analyzed}");
    if ranked.is_empty() {
        println!("  (no stores ranked; ingest profiles and production data first)");
        return;
    }
    let shown = if top == 0 { ranked.len() } else { top };
    for entry in ranked.iter().take(shown) {
        println!(
            "  {:>2}. {} ({} / {})",
            entry.rank, entry.store_name, entry.prefecture, entry.nearest_station
        );
        println!(
            "      score {:>3}  win {:>2}%  {}",
            entry.total_score, entry.predicted_win_rate, entry.comment
        );
    }
    if ranked.len() > shown {
        println!("  ... and {} more", ranked.len() - shown);
    }
}

fn print_usage() {
    println!("rank-runner: ingest parlor CSVs, score stores and print the daily ranking");
    println!();
    println!("  --db PATH         SQLite database (default ranking.db)");
    println!("  --data-dir DIR    config directory (default ./data)");
    println!("  --ingest FILE     ingest a CSV file; repeat for several files");
    println!("  --force           overwrite already-loaded production summaries");
    println!("  --recompute-popularity  refresh machine popularity from the keyword table");
    println!("  --analyze DATE    score all stores for DATE (YYYY-MM-DD or 'today')");
    println!("  --top N           ranking rows to print, 0 for all (default 10)");
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    if raw == "today" {
        return Ok(chrono::Local::now().date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Bad date '{raw}' (want YYYY-MM-DD or 'today'): {e}"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
