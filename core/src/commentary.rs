//! Reader-facing commentary.
//!
//! An external provider (an LLM gateway, an editorial queue) can supply
//! richer prose, but the published ranking never depends on one being
//! reachable. When no provider is wired in or the provider fails, the
//! comment is built deterministically from the stored analysis.

use serde_json::Value;

use crate::normalize::store_profile::Store;
use crate::scoring::{RecommendationTier, ScoreAnalysis};

/// Source of store commentary. Implementations may block on network I/O;
/// callers treat any error as "use the fallback".
pub trait CommentaryProvider {
    fn commentary(&self, store: &Store, analysis: &ScoreAnalysis) -> anyhow::Result<String>;
}

/// Fields an externally produced analysis payload must carry before we
/// accept it as a substitute for our own.
pub const REQUIRED_ANALYSIS_FIELDS: [&str; 11] = [
    "total_score",
    "base_score",
    "event_bonus",
    "machine_popularity",
    "access_score",
    "personal_adjustment",
    "predicted_win_rate",
    "confidence",
    "recommended_machines",
    "play_strategy",
    "rationale",
];

/// Check an external analysis payload for the required fields. Returns
/// every missing field name, not just the first, so the provider gets one
/// complete correction instead of a ping-pong.
pub fn validate_external_analysis(payload: &Value) -> Result<(), Vec<String>> {
    let missing: Vec<String> = REQUIRED_ANALYSIS_FIELDS
        .iter()
        .filter(|field| payload.get(**field).is_none())
        .map(|field| field.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

/// Deterministic comment built from the tier and the first rationale
/// line. Same analysis in, same comment out.
pub fn fallback_comment(tier: RecommendationTier, rationale: &[String]) -> String {
    let lead = match tier {
        RecommendationTier::HighlyRecommended => "本日の狙い目です",
        RecommendationTier::Recommended => "期待値の高い店舗です",
        RecommendationTier::Neutral => "平常営業の見込みです",
        RecommendationTier::NotRecommended => "本日は見送りが無難です",
    };
    match rationale.first() {
        Some(line) => format!("{lead}。{line}。"),
        None => format!("{lead}。"),
    }
}

/// Ask the provider if one is wired in, fall back on any failure.
pub fn commentary_or_fallback(
    provider: Option<&dyn CommentaryProvider>,
    store: &Store,
    analysis: &ScoreAnalysis,
) -> String {
    if let Some(p) = provider {
        match p.commentary(store, analysis) {
            Ok(comment) => return comment,
            Err(e) => log::warn!(
                "commentary provider failed for {}, using fallback: {e}",
                store.store_id
            ),
        }
    }
    fallback_comment(analysis.tier, &analysis.rationale)
}
