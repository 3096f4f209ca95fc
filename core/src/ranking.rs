//! Daily ranking assembly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::commentary::{self, CommentaryProvider};
use crate::error::RankResult;
use crate::store::RankStore;

/// One published ranking entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedStore {
    pub rank:               u32,
    pub store_id:           String,
    pub store_name:         String,
    pub prefecture:         String,
    pub nearest_station:    String,
    pub total_score:        i64,
    pub predicted_win_rate: i64,
    pub comment:            String,
}

/// Build the ranking for a date from the stored analyses. Stores are
/// ordered by score with ties sharing a rank; the next distinct score
/// takes the following rank, so 83, 83, 78 ranks as 1, 1, 2.
pub fn rank_stores(
    store: &RankStore,
    date: NaiveDate,
    provider: Option<&dyn CommentaryProvider>,
) -> RankResult<Vec<RankedStore>> {
    let rows = store.analyses_for_date(date)?;
    let mut ranked = Vec::with_capacity(rows.len());
    let mut rank = 0u32;
    let mut last_score: Option<i64> = None;

    for row in rows {
        if last_score != Some(row.total_score) {
            rank += 1;
            last_score = Some(row.total_score);
        }
        let comment = comment_for(store, date, provider, &row)?;
        ranked.push(RankedStore {
            rank,
            store_id: row.store_id,
            store_name: row.store_name,
            prefecture: row.prefecture,
            nearest_station: row.nearest_station,
            total_score: row.total_score,
            predicted_win_rate: row.predicted_win_rate,
            comment,
        });
    }
    Ok(ranked)
}

/// The provider path needs the full profile and analysis; without a
/// provider the stored tier and rationale are enough.
fn comment_for(
    store: &RankStore,
    date: NaiveDate,
    provider: Option<&dyn CommentaryProvider>,
    row: &crate::store::AnalysisRow,
) -> RankResult<String> {
    if provider.is_some() {
        let profile = store.get_store(&row.store_id)?;
        let analysis = store.get_score_analysis(&row.store_id, date)?;
        if let (Some(profile), Some(analysis)) = (profile, analysis) {
            return Ok(commentary::commentary_or_fallback(
                provider, &profile, &analysis,
            ));
        }
    }
    Ok(commentary::fallback_comment(row.tier, &row.rationale))
}
