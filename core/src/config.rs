//! Tunables for ingestion and scoring.
//!
//! Everything here ships with built-in defaults so the pipeline runs
//! without any config files on disk. An operator can override the lot
//! by pointing `RankConfig::load` at a data directory containing
//! `heuristics/ranking.json`. The score weights themselves live in
//! `scoring.rs` as named constants; this module carries the data-like
//! knobs (label lists, calendars, unit conversions) that vary per
//! deployment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Field defaults applied by the normalizers ──────────────────────
//
// Every silently-applied default in the pipeline, in one place.
//
//   field                  default       applied when
//   ---------------------  ------------  -------------------------------
//   machine.manufacturer   ""            source column empty or missing
//   machine.machine_type   "pachislot"   source value not a known type
//   machine.popularity     keyword scan  no explicit popularity column
//   event.bonus_multiplier 1.0           value missing or unparseable
//   event.event_date       ingest date   no calendar payload in any row
//   store walk distance    walk minutes x walk_speed_m_per_min
//   store (all counters)   0 / false     attribute never seen
pub mod defaults {
    pub const MANUFACTURER: &str = "";
    pub const MACHINE_TYPE: &str = "pachislot";
    pub const BONUS_MULTIPLIER: f64 = 1.0;
    pub const POPULARITY_BASE: i64 = 50;
}

// ── Ingest ─────────────────────────────────────────────────────────

/// A substring that raises a machine's assumed popularity when it
/// appears in the machine name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularityKeyword {
    pub keyword: String,
    pub bonus:   i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Meters covered per minute of walking. "徒歩7分" becomes
    /// 7 * this many meters from the station.
    pub walk_speed_m_per_min: u32,
    /// Name fragments that mark a machine as a crowd draw.
    pub popularity_keywords: Vec<PopularityKeyword>,
    /// Per-batch cap on row errors carried into the ingest report.
    pub max_reported_errors: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            walk_speed_m_per_min: 80,
            popularity_keywords: vec![
                kw("ジャグラー", 30),
                kw("juggler", 30),
                kw("北斗", 20),
                kw("エヴァ", 20),
                kw("ヱヴァ", 20),
                kw("バジリスク", 15),
                kw("まどか", 15),
                kw("ゴッド", 15),
                kw("リゼロ", 15),
                kw("番長", 10),
                kw("絆", 10),
                kw("海物語", 10),
            ],
            max_reported_errors: 10,
        }
    }
}

fn kw(keyword: &str, bonus: i64) -> PopularityKeyword {
    PopularityKeyword { keyword: keyword.to_string(), bonus }
}

// ── Scoring ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherKind {
    Sunny,
    Rain,
    Snow,
    Other,
}

/// Label lists mapping free-text weather strings onto the three kinds
/// the scorer distinguishes. Both Japanese and English labels appear in
/// source feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherLabels {
    pub sunny: Vec<String>,
    pub rain:  Vec<String>,
    pub snow:  Vec<String>,
}

impl WeatherLabels {
    pub fn classify(&self, label: &str) -> WeatherKind {
        let label = label.trim();
        if label.is_empty() {
            return WeatherKind::Other;
        }
        let hit = |pool: &[String]| pool.iter().any(|l| label.contains(l.as_str()));
        if hit(&self.sunny) {
            WeatherKind::Sunny
        } else if hit(&self.rain) {
            WeatherKind::Rain
        } else if hit(&self.snow) {
            WeatherKind::Snow
        } else {
            WeatherKind::Other
        }
    }
}

impl Default for WeatherLabels {
    fn default() -> Self {
        Self {
            sunny: vec!["晴".into(), "sunny".into(), "clear".into()],
            rain:  vec!["雨".into(), "rain".into()],
            snow:  vec!["雪".into(), "snow".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// How many most-recent performance days feed one analysis.
    pub history_window: usize,
    /// Games a fully-occupied store could theoretically log per unit
    /// per day. Utilization is avg_games relative to this.
    pub theoretical_max_games: f64,
    pub weather: WeatherLabels,
    /// National holidays for the operating calendar, YYYY-MM-DD.
    pub holidays: Vec<NaiveDate>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            history_window: 30,
            theoretical_max_games: 8000.0,
            weather: WeatherLabels::default(),
            holidays: Vec::new(),
        }
    }
}

// ── Aggregate ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct RankingFile {
    #[serde(default)]
    ingest:  Option<IngestConfig>,
    #[serde(default)]
    scoring: Option<ScoringConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct RankConfig {
    pub ingest:  IngestConfig,
    pub scoring: ScoringConfig,
}

impl RankConfig {
    /// Load overrides from the data/ directory. Sections absent from
    /// the file keep their built-in defaults.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/heuristics/ranking.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: RankingFile = serde_json::from_str(&content)?;
        Ok(Self {
            ingest:  file.ingest.unwrap_or_default(),
            scoring: file.scoring.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_labels_cover_japanese_and_english() {
        let labels = WeatherLabels::default();
        assert_eq!(labels.classify("晴れ"), WeatherKind::Sunny);
        assert_eq!(labels.classify("sunny"), WeatherKind::Sunny);
        assert_eq!(labels.classify("小雨"), WeatherKind::Rain);
        assert_eq!(labels.classify("snow"), WeatherKind::Snow);
        assert_eq!(labels.classify("曇り"), WeatherKind::Other);
        assert_eq!(labels.classify(""), WeatherKind::Other);
    }

    #[test]
    fn defaults_are_usable_without_files() {
        let cfg = RankConfig::default();
        assert_eq!(cfg.ingest.walk_speed_m_per_min, 80);
        assert_eq!(cfg.scoring.history_window, 30);
        assert!(!cfg.ingest.popularity_keywords.is_empty());
    }
}
