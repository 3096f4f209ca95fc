//! Analysis orchestration.
//!
//! Pulls a store's profile, recent history and the day's event and
//! weather context out of the database, runs the scoring engine and
//! writes the result back.

use chrono::{Datelike, NaiveDate};

use crate::config::RankConfig;
use crate::error::{RankError, RankResult};
use crate::scoring::{self, EventContext, ScoreAnalysis, WeatherContext};
use crate::store::RankStore;

/// Score one store for one date and persist the result.
pub fn analyze_store(
    store: &RankStore,
    cfg: &RankConfig,
    store_id: &str,
    date: NaiveDate,
) -> RankResult<ScoreAnalysis> {
    let profile = store
        .get_store(store_id)?
        .ok_or_else(|| RankError::StoreNotFound {
            store_id: store_id.to_string(),
        })?;

    let history = store.performance_history(store_id, date, cfg.scoring.history_window)?;
    let on_date = history.iter().find(|p| p.date == date);

    let event = resolve_event_context(store, store_id, date, on_date.map(|p| p.is_event_day))?;
    let weather = WeatherContext {
        weather:     on_date.and_then(|p| p.weather.clone()),
        day_of_week: date.weekday().num_days_from_sunday(),
        is_holiday:  cfg.scoring.holidays.contains(&date),
    };

    let analysis = scoring::score(&history, &profile, &event, &weather, date, &cfg.scoring);
    store.replace_score_analysis(&analysis)?;
    log::info!(
        "analyzed {store_id} for {date}: score {} tier {}",
        analysis.total_score,
        analysis.tier.as_str()
    );
    Ok(analysis)
}

/// Score every active store for a date. A store that fails is logged and
/// skipped so one bad profile cannot take down the whole run.
pub fn analyze_all(
    store: &RankStore,
    cfg: &RankConfig,
    date: NaiveDate,
) -> RankResult<Vec<ScoreAnalysis>> {
    let mut analyses = Vec::new();
    for profile in store.active_stores()? {
        match analyze_store(store, cfg, &profile.store_id, date) {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => log::warn!("analysis failed for {}: {e}", profile.store_id),
        }
    }
    Ok(analyses)
}

/// Scheduled events win over the per-day flag in the performance data.
/// When only the flag is set we know an event happened but not which, so
/// the context carries no type and the default multiplier.
fn resolve_event_context(
    store: &RankStore,
    store_id: &str,
    date: NaiveDate,
    perf_flag: Option<bool>,
) -> RankResult<EventContext> {
    let scheduled = store.events_on(date)?;
    let matched = scheduled
        .into_iter()
        .find(|e| e.store_ids.iter().any(|s| s == store_id));
    if let Some(event) = matched {
        return Ok(EventContext {
            is_event_day:     true,
            event_type:       event.event_type,
            event_name:       event.name,
            bonus_multiplier: event.bonus_multiplier,
        });
    }
    if perf_flag == Some(true) {
        return Ok(EventContext {
            is_event_day:     true,
            event_type:       String::new(),
            event_name:       String::new(),
            bonus_multiplier: 1.0,
        });
    }
    Ok(EventContext::none())
}
