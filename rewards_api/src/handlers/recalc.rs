//! Recalculation trigger (operator and cron)

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

use super::require_operator;
use crate::{
    error::Result,
    lock::{self, LockOptions},
    process_cache::CachedSummary,
    recalc::run_recalculation,
    AppState,
};

/// Recompute the whitelist season. A run already in progress yields 202.
pub async fn recalc(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse> {
    require_operator(&state, &headers)?;
    let season = state.config.rewards.resolve()?;
    let season_id = season.season_id.as_str();

    let lock_key = state.ledger.keys().recalc_lock(season_id);
    let token = match lock::acquire(state.ledger.store(), &lock_key, LockOptions::RECALC).await {
        Ok(Some(token)) => Some(token),
        Ok(None) => {
            info!(season = %season_id, "Recalculation already running");
            state.metrics.lock_busy("wl-recalc");
            state.metrics.observe_recalc("already_running", None);
            return Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "already_running",
                    "seasonId": season_id,
                })),
            ));
        }
        Err(e) => {
            warn!(season = %season_id, error = %e, "Recalc lock unavailable; running without it");
            None
        }
    };

    let started = Instant::now();
    let now_ms = state.now_ms();
    let metrics_season_id = state.metrics_season_id(season_id);
    let result = run_recalculation(
        &state.ledger,
        &state.config.rewards,
        season_id,
        &metrics_season_id,
        now_ms,
    )
    .await;

    if let Some(token) = token {
        if let Err(e) = lock::release(state.ledger.store(), &lock_key, &token).await {
            warn!(season = %season_id, error = %e, "Recalc lock release failed; waiting for TTL");
        }
    }

    match result {
        Ok((report, summary)) => {
            state
                .metrics
                .observe_recalc("completed", Some(started.elapsed().as_secs_f64()));
            state
                .cache
                .remember_summary(
                    season_id,
                    CachedSummary {
                        summary,
                        updated_at: Some(now_ms),
                    },
                )
                .await;
            Ok((StatusCode::OK, Json(serde_json::to_value(report)?)))
        }
        Err(e) => {
            state.metrics.observe_recalc("failed", None);
            Err(e.into())
        }
    }
}
