//! The expected-value scoring engine.
//!
//! Pure functions from observed history plus store/event/weather
//! context to a `ScoreAnalysis`. Nothing here touches the database or
//! the clock; the caller assembles inputs and the engine is fully
//! deterministic, so identical inputs always reproduce identical
//! scores.
//!
//! The weights below are heuristics carried over from years of manual
//! hall-watching, not fitted parameters. Treat them as a consistency
//! contract: changing one shifts every published ranking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, WeatherKind};
use crate::decode::MachineDayStat;
use crate::normalize::store_profile::Store;
use crate::perf::DailyPerformance;
use crate::types::StoreId;

// ── Component ranges ───────────────────────────────────────────────

const BASE_START: f64 = 30.0;
const BASE_MIN: f64 = 0.0;
const BASE_MAX: f64 = 60.0;

const EVENT_START: f64 = 10.0;
const EVENT_MAX: f64 = 20.0;
const EVENT_NEW_MACHINE: f64 = 5.0;
const EVENT_SPECIAL_DAY: f64 = 3.0;
const EVENT_CAMPAIGN: f64 = 2.0;

const POPULARITY_DEFAULT: f64 = 5.0;
const POPULARITY_MAX: f64 = 10.0;

const ACCESS_START: f64 = 5.0;
const ACCESS_MAX: f64 = 10.0;

const WEATHER_MIN: f64 = -5.0;
const WEATHER_MAX: f64 = 5.0;

const WIN_RATE_BASE: f64 = 30.0;
const WIN_RATE_MIN: i64 = 25;
const WIN_RATE_MAX: i64 = 90;

const CONFIDENCE_BASE: i64 = 70;
const CONFIDENCE_MIN: i64 = 50;
const CONFIDENCE_MAX: i64 = 95;
const VARIANCE_STABLE: f64 = 50.0;
const VARIANCE_VOLATILE: f64 = 200.0;

// ── Context inputs ─────────────────────────────────────────────────

/// Event context for the analysis day, resolved by the caller from the
/// event master and the day's performance flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventContext {
    pub is_event_day:     bool,
    pub event_type:       String,
    pub event_name:       String,
    pub bonus_multiplier: f64,
}

impl EventContext {
    pub fn none() -> Self {
        Self {
            is_event_day:     false,
            event_type:       String::new(),
            event_name:       String::new(),
            bonus_multiplier: 1.0,
        }
    }
}

/// Calendar and weather context for the analysis day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherContext {
    pub weather:     Option<String>,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u32,
    pub is_holiday:  bool,
}

// ── Output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    HighlyRecommended,
    Recommended,
    Neutral,
    NotRecommended,
}

impl RecommendationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationTier::HighlyRecommended => "highly_recommended",
            RecommendationTier::Recommended => "recommended",
            RecommendationTier::Neutral => "neutral",
            RecommendationTier::NotRecommended => "not_recommended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "highly_recommended" => Some(RecommendationTier::HighlyRecommended),
            "recommended" => Some(RecommendationTier::Recommended),
            "neutral" => Some(RecommendationTier::Neutral),
            "not_recommended" => Some(RecommendationTier::NotRecommended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedMachine {
    pub machine_id:    String,
    pub machine_name:  String,
    pub unit_range:    String,
    pub expected_diff: i64,
    pub reason:        String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayStrategy {
    pub entry_time:      String,
    pub target_machines: Vec<String>,
    pub avoid_machines:  Vec<String>,
    pub strategy:        String,
    pub warnings:        Vec<String>,
}

/// One store's complete analysis for one day. Component fields are kept
/// unrounded. The day's weather/calendar adjustment folds into
/// `total_score` only; it is not carried as a component of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreAnalysis {
    pub store_id:             StoreId,
    pub analysis_date:        NaiveDate,
    pub total_score:          i64,
    pub base_score:           f64,
    pub event_bonus:          f64,
    pub machine_popularity:   f64,
    pub access_score:         f64,
    pub personal_adjustment:  f64,
    pub predicted_win_rate:   i64,
    pub confidence:           i64,
    pub tier:                 RecommendationTier,
    pub recommended_machines: Vec<RecommendedMachine>,
    pub play_strategy:        PlayStrategy,
    pub rationale:            Vec<String>,
}

impl ScoreAnalysis {
    /// Composite row key, `S001_2025-07-14`.
    pub fn analysis_key(&self) -> String {
        format!("{}_{}", self.store_id, self.analysis_date.format("%Y-%m-%d"))
    }
}

// ── The engine ─────────────────────────────────────────────────────

/// Score one store for one day.
///
/// `history` is most-recent-first; entry 0 is the day under analysis
/// when production data for it exists. Older entries form the prior
/// against which the current day is judged.
pub fn score(
    history: &[DailyPerformance],
    store: &Store,
    event: &EventContext,
    weather: &WeatherContext,
    date: NaiveDate,
    cfg: &ScoringConfig,
) -> ScoreAnalysis {
    let current = history.first();
    let prior: Vec<f64> = history.iter().skip(1).map(|p| p.avg_diff).collect();

    let base = base_score(current, &prior, cfg);
    let event_bonus = event_bonus(event, store.event_frequency);
    let popularity = machine_popularity(store, current);
    let access = access_score(store);
    let weather_adj = weather_adjustment(weather, cfg);
    let personal = 0.0;

    let raw_total = base + event_bonus + popularity + access + weather_adj + personal;
    let total = (raw_total.round() as i64).clamp(0, 100);

    let current_avg = current.map(|p| p.avg_diff).unwrap_or(0.0);
    let win_rate = predicted_win_rate(total, current_avg);
    let confidence = confidence(&prior);
    let tier = tier_for(total, confidence);

    let recommended = recommend_machines(store, current);
    let strategy = play_strategy(tier, event, total, confidence, &recommended, current);
    let rationale = build_rationale(base, event_bonus, access, event, weather, cfg);

    ScoreAnalysis {
        store_id: store.store_id.clone(),
        analysis_date: date,
        total_score: total,
        base_score: base,
        event_bonus,
        machine_popularity: popularity,
        access_score: access,
        personal_adjustment: personal,
        predicted_win_rate: win_rate,
        confidence,
        tier,
        recommended_machines: recommended,
        play_strategy: strategy,
        rationale,
    }
}

/// Base component, 0..=60. Starts neutral and moves with the current
/// day's payout, utilization, and traffic, plus how the day compares
/// to the store's own prior.
fn base_score(current: Option<&DailyPerformance>, prior: &[f64], cfg: &ScoringConfig) -> f64 {
    let mut score = BASE_START;
    let (avg_diff, avg_games, visitors) = match current {
        Some(p) => (p.avg_diff, p.avg_games, p.total_visitors),
        None => (0.0, 0.0, 0),
    };

    score += (avg_diff / 10.0).clamp(-20.0, 20.0);

    let max_games = cfg.theoretical_max_games.max(1.0);
    let utilization = avg_games / max_games * 100.0;
    score += ((utilization - 70.0) / 3.0).clamp(-10.0, 10.0);

    if visitors > 0 {
        score += ((visitors as f64 - 200.0) / 20.0).clamp(-10.0, 10.0);
    }

    if !prior.is_empty() {
        let prior_mean = prior.iter().sum::<f64>() / prior.len() as f64;
        score += ((avg_diff - prior_mean) / 5.0).clamp(-10.0, 10.0);
    }

    score.clamp(BASE_MIN, BASE_MAX)
}

/// Event component, 0..=20. Zero on a plain day; on event days the
/// bonus scales with event type, the advertised multiplier, and how
/// often the store actually runs events.
fn event_bonus(event: &EventContext, event_frequency: f64) -> f64 {
    if !event.is_event_day {
        return 0.0;
    }
    let mut bonus = EVENT_START;
    bonus += match event.event_type.as_str() {
        "new_machine" => EVENT_NEW_MACHINE,
        "special_day" => EVENT_SPECIAL_DAY,
        "campaign" => EVENT_CAMPAIGN,
        _ => 0.0,
    };
    bonus *= event.bonus_multiplier.max(0.0);
    bonus *= (event_frequency / 10.0).clamp(0.8, 1.2);
    bonus.clamp(0.0, EVENT_MAX)
}

/// Popularity component, 0..=10, neutral 5 when the store's declared
/// draws can't be matched against today's machine data.
fn machine_popularity(store: &Store, current: Option<&DailyPerformance>) -> f64 {
    let Some(perf) = current else {
        return POPULARITY_DEFAULT;
    };
    if store.popular_machines.is_empty() || perf.machines.is_empty() {
        return POPULARITY_DEFAULT;
    }
    let mut matched = Vec::new();
    for tag in &store.popular_machines {
        for (machine_id, stat) in &perf.machines {
            if machine_id == tag || stat.machine_name.contains(tag.as_str()) {
                matched.push((stat.effective_avg_diff() / 100.0).clamp(0.0, POPULARITY_MAX));
                break;
            }
        }
    }
    if matched.is_empty() {
        return POPULARITY_DEFAULT;
    }
    matched.iter().sum::<f64>() / matched.len() as f64
}

/// Access component, 0..=10: station distance dominates, parking and a
/// smoking section each add a point.
fn access_score(store: &Store) -> f64 {
    let mut score = ACCESS_START;
    if let Some(distance) = store.station_distance_m {
        score += ((200.0 - distance as f64) / 50.0).clamp(-3.0, 3.0);
    }
    if store.has_parking {
        score += 1.0;
    }
    if store.smoking_allowed {
        score += 1.0;
    }
    score.clamp(0.0, ACCESS_MAX)
}

/// Weather and calendar component, -5..=5.
fn weather_adjustment(ctx: &WeatherContext, cfg: &ScoringConfig) -> f64 {
    let mut adj: f64 = 0.0;
    if let Some(label) = &ctx.weather {
        adj += match cfg.weather.classify(label) {
            WeatherKind::Sunny => 1.0,
            WeatherKind::Rain => 2.0,
            WeatherKind::Snow => -1.0,
            WeatherKind::Other => 0.0,
        };
    }
    if ctx.day_of_week == 0 || ctx.day_of_week == 6 {
        adj += 1.0;
    }
    if ctx.is_holiday {
        adj += 2.0;
    }
    adj.clamp(WEATHER_MIN, WEATHER_MAX)
}

fn predicted_win_rate(total: i64, current_avg_diff: f64) -> i64 {
    let diff_lift = (current_avg_diff.max(0.0) / 20.0).min(10.0);
    let raw = WIN_RATE_BASE + total as f64 * 0.6 + diff_lift;
    (raw.round() as i64).clamp(WIN_RATE_MIN, WIN_RATE_MAX)
}

/// Confidence 50..=95: grows with prior depth, nudged by how stable
/// the prior payouts were.
fn confidence(prior: &[f64]) -> i64 {
    let mut conf = CONFIDENCE_BASE + (prior.len() as i64 * 2).min(20);
    if !prior.is_empty() {
        let var = population_variance(prior);
        if var < VARIANCE_STABLE {
            conf += 5;
        } else if var > VARIANCE_VOLATILE {
            conf -= 10;
        }
    }
    conf.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

fn population_variance(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64
}

fn tier_for(total: i64, confidence: i64) -> RecommendationTier {
    if total >= 80 && confidence >= 80 {
        RecommendationTier::HighlyRecommended
    } else if total >= 65 && confidence >= 70 {
        RecommendationTier::Recommended
    } else if total >= 45 {
        RecommendationTier::Neutral
    } else {
        RecommendationTier::NotRecommended
    }
}

// ── Recommendations ────────────────────────────────────────────────

/// Top positive movers from today's machine data, falling back to the
/// store's declared draws when no per-machine data exists yet.
fn recommend_machines(
    store: &Store,
    current: Option<&DailyPerformance>,
) -> Vec<RecommendedMachine> {
    if let Some(perf) = current {
        let mut ranked: Vec<(&String, &MachineDayStat)> = perf
            .machines
            .iter()
            .filter(|(_, stat)| stat.effective_avg_diff() > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.effective_avg_diff()
                .partial_cmp(&a.1.effective_avg_diff())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        if !ranked.is_empty() {
            return ranked
                .into_iter()
                .take(3)
                .map(|(machine_id, stat)| RecommendedMachine {
                    machine_id:    machine_id.clone(),
                    machine_name:  display_name(machine_id, &stat.machine_name),
                    unit_range:    unit_range(stat),
                    expected_diff: stat.effective_avg_diff().round() as i64,
                    reason:        format!(
                        "直近平均差枚+{}",
                        stat.effective_avg_diff().round() as i64
                    ),
                })
                .collect();
        }
    }
    store
        .popular_machines
        .iter()
        .take(3)
        .map(|tag| RecommendedMachine {
            machine_id:    String::new(),
            machine_name:  tag.clone(),
            unit_range:    String::new(),
            expected_diff: 0,
            reason:        "店舗の看板機種".to_string(),
        })
        .collect()
}

fn display_name(machine_id: &str, machine_name: &str) -> String {
    if machine_name.trim().is_empty() {
        machine_id.to_string()
    } else {
        machine_name.to_string()
    }
}

/// Render unit ids as a compact range: numeric ids become "1021-1028",
/// anything else falls back to the lexicographic span.
fn unit_range(stat: &MachineDayStat) -> String {
    if stat.units.is_empty() {
        return String::new();
    }
    let numeric: Option<Vec<u32>> = stat
        .units
        .keys()
        .map(|k| k.trim().parse::<u32>().ok())
        .collect();
    if let Some(mut nums) = numeric {
        nums.sort_unstable();
        let (lo, hi) = (nums[0], nums[nums.len() - 1]);
        return if lo == hi {
            format!("{lo}番台")
        } else {
            format!("{lo}-{hi}番台")
        };
    }
    let mut keys: Vec<&String> = stat.units.keys().collect();
    keys.sort();
    if keys.len() == 1 {
        keys[0].clone()
    } else {
        format!("{}-{}", keys[0], keys[keys.len() - 1])
    }
}

fn play_strategy(
    tier: RecommendationTier,
    event: &EventContext,
    total: i64,
    confidence: i64,
    recommended: &[RecommendedMachine],
    current: Option<&DailyPerformance>,
) -> PlayStrategy {
    let entry_time = if event.is_event_day {
        "開店前から並ぶ"
    } else {
        match tier {
            RecommendationTier::HighlyRecommended => "開店直後",
            RecommendationTier::Recommended => "午前中",
            RecommendationTier::Neutral => "午後から様子見",
            RecommendationTier::NotRecommended => "見送り推奨",
        }
    };

    let target_machines = recommended
        .iter()
        .map(|r| r.machine_name.clone())
        .filter(|n| !n.is_empty())
        .collect();

    let mut avoid: Vec<(&String, f64)> = current
        .map(|perf| {
            perf.machines
                .iter()
                .filter(|(_, stat)| stat.effective_avg_diff() < 0.0)
                .map(|(id, stat)| (id, stat.effective_avg_diff()))
                .collect()
        })
        .unwrap_or_default();
    avoid.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let avoid_machines = avoid
        .into_iter()
        .take(2)
        .map(|(id, _)| {
            current
                .and_then(|p| p.machines.get(id))
                .map(|s| display_name(id, &s.machine_name))
                .unwrap_or_else(|| id.clone())
        })
        .collect();

    let strategy = match tier {
        RecommendationTier::HighlyRecommended => {
            "高設定投入が期待できる日です。朝から狙い台を確保してください。"
        }
        RecommendationTier::Recommended => {
            "期待値はプラス圏です。データを見ながら好調な島を狙ってください。"
        }
        RecommendationTier::Neutral => {
            "無理追いは禁物です。回転数と差枚の推移を確認してから着席してください。"
        }
        RecommendationTier::NotRecommended => {
            "この日は期待値が見込めません。見学にとどめることを推奨します。"
        }
    };

    let mut warnings = vec!["軍資金は余裕を持って設定してください".to_string()];
    if confidence < 60 {
        warnings.push("データ件数が少ないため参考程度にしてください".to_string());
    }
    if total < 45 {
        warnings.push("近隣の他店舗も比較検討してください".to_string());
    }

    PlayStrategy {
        entry_time: entry_time.to_string(),
        target_machines,
        avoid_machines,
        strategy: strategy.to_string(),
        warnings,
    }
}

fn build_rationale(
    base: f64,
    event_bonus: f64,
    access: f64,
    event: &EventContext,
    weather: &WeatherContext,
    cfg: &ScoringConfig,
) -> Vec<String> {
    let mut lines = Vec::new();
    if base >= 50.0 {
        lines.push("過去データから高い期待値が見込めます".to_string());
    } else if base <= 30.0 {
        lines.push("回収傾向のため慎重な台選びを推奨します".to_string());
    } else {
        lines.push("平常営業の範囲内で安定した期待値です".to_string());
    }
    if event.is_event_day && event_bonus > 0.0 {
        let label = if !event.event_name.is_empty() {
            event.event_name.clone()
        } else {
            match event.event_type.as_str() {
                "new_machine" => "新台入替".to_string(),
                "special_day" => "特定日".to_string(),
                "campaign" => "キャンペーン".to_string(),
                _ => "イベント".to_string(),
            }
        };
        lines.push(format!("{label}開催日のため期待値が上乗せされています"));
    }
    if access >= 8.0 {
        lines.push("駅近でアクセス良好、仕事帰りにも向いています".to_string());
    }
    if let Some(label) = &weather.weather {
        if cfg.weather.classify(label) == WeatherKind::Rain {
            lines.push("雨天のため稼働が伸びやすい傾向があります".to_string());
        }
    }
    lines
}
