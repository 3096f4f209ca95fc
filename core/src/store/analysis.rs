//! Score analysis persistence.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::error::{RankError, RankResult};
use crate::scoring::{RecommendationTier, ScoreAnalysis};
use crate::store::{date_to_text, text_to_date, RankStore};

/// One row of the daily ranking query, analysis joined with its store.
#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub store_id:           String,
    pub store_name:         String,
    pub prefecture:         String,
    pub nearest_station:    String,
    pub total_score:        i64,
    pub predicted_win_rate: i64,
    pub confidence:         i64,
    pub tier:               RecommendationTier,
    pub rationale:          Vec<String>,
}

impl RankStore {
    /// Re-running an analysis for the same store and date replaces the
    /// previous row outright.
    pub fn replace_score_analysis(&self, analysis: &ScoreAnalysis) -> RankResult<()> {
        let recommended = serde_json::to_string(&analysis.recommended_machines)?;
        let strategy = serde_json::to_string(&analysis.play_strategy)?;
        let rationale = serde_json::to_string(&analysis.rationale)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO score_analysis
                 (analysis_key, store_id, analysis_date, total_score, base_score,
                  event_bonus, machine_popularity, access_score,
                  personal_adjustment, predicted_win_rate, confidence, tier,
                  recommended_machines, play_strategy, rationale, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))",
            params![
                analysis.analysis_key(),
                analysis.store_id,
                date_to_text(analysis.analysis_date),
                analysis.total_score,
                analysis.base_score,
                analysis.event_bonus,
                analysis.machine_popularity,
                analysis.access_score,
                analysis.personal_adjustment,
                analysis.predicted_win_rate,
                analysis.confidence,
                analysis.tier.as_str(),
                recommended,
                strategy,
                rationale,
            ],
        )?;
        Ok(())
    }

    pub fn get_score_analysis(
        &self,
        store_id: &str,
        date: NaiveDate,
    ) -> RankResult<Option<ScoreAnalysis>> {
        let raw = self
            .conn
            .query_row(
                "SELECT store_id, analysis_date, total_score, base_score, event_bonus,
                        machine_popularity, access_score, personal_adjustment,
                        predicted_win_rate, confidence, tier,
                        recommended_machines, play_strategy, rationale
                 FROM score_analysis WHERE store_id = ?1 AND analysis_date = ?2",
                params![store_id, date_to_text(date)],
                analysis_row_mapper,
            )
            .optional()?;
        match raw {
            Some(r) => Ok(Some(r.into_analysis()?)),
            None => Ok(None),
        }
    }

    /// All analyses for a date joined with their active stores, best score
    /// first with ties broken by store id.
    pub fn analyses_for_date(&self, date: NaiveDate) -> RankResult<Vec<AnalysisRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.store_id, s.name, s.prefecture, s.nearest_station,
                    a.total_score, a.predicted_win_rate, a.confidence, a.tier,
                    a.rationale
             FROM score_analysis a
             JOIN store s ON s.store_id = a.store_id
             WHERE a.analysis_date = ?1 AND s.active = 1
             ORDER BY a.total_score DESC, a.store_id ASC",
        )?;
        let raw = stmt
            .query_map(params![date_to_text(date)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (store_id, name, prefecture, station, total, win, conf, tier, rationale) in raw {
            rows.push(AnalysisRow {
                store_id,
                store_name: name,
                prefecture,
                nearest_station: station,
                total_score: total,
                predicted_win_rate: win,
                confidence: conf,
                tier: parse_tier(&tier)?,
                rationale: serde_json::from_str(&rationale)?,
            });
        }
        Ok(rows)
    }

    pub fn analysis_count(&self) -> RankResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM score_analysis", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

fn parse_tier(raw: &str) -> RankResult<RecommendationTier> {
    RecommendationTier::parse(raw)
        .ok_or_else(|| RankError::Other(anyhow::anyhow!("Unknown stored tier '{raw}'")))
}

/// Analysis row with the date, tier and JSON columns still undecoded.
struct AnalysisRaw {
    analysis:         ScoreAnalysis,
    date_text:        String,
    tier_text:        String,
    recommended_json: String,
    strategy_json:    String,
    rationale_json:   String,
}

impl AnalysisRaw {
    fn into_analysis(self) -> RankResult<ScoreAnalysis> {
        let mut a = self.analysis;
        a.analysis_date = text_to_date(&self.date_text)?;
        a.tier = parse_tier(&self.tier_text)?;
        a.recommended_machines = serde_json::from_str(&self.recommended_json)?;
        a.play_strategy = serde_json::from_str(&self.strategy_json)?;
        a.rationale = serde_json::from_str(&self.rationale_json)?;
        Ok(a)
    }
}

fn analysis_row_mapper(row: &rusqlite::Row) -> rusqlite::Result<AnalysisRaw> {
    Ok(AnalysisRaw {
        analysis: ScoreAnalysis {
            store_id:             row.get(0)?,
            analysis_date:        NaiveDate::default(),
            total_score:          row.get(2)?,
            base_score:           row.get(3)?,
            event_bonus:          row.get(4)?,
            machine_popularity:   row.get(5)?,
            access_score:         row.get(6)?,
            personal_adjustment:  row.get(7)?,
            predicted_win_rate:   row.get(8)?,
            confidence:           row.get(9)?,
            tier:                 RecommendationTier::Neutral,
            recommended_machines: Vec::new(),
            play_strategy:        Default::default(),
            rationale:            Vec::new(),
        },
        date_text:        row.get(1)?,
        tier_text:        row.get(10)?,
        recommended_json: row.get(11)?,
        strategy_json:    row.get(12)?,
        rationale_json:   row.get(13)?,
    })
}
