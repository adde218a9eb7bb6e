//! Read-only endpoints: health, metrics, whitelist summary, user view, dry run

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use validator::Validate;

use super::{require_address, require_operator, AddressQuery};
use crate::{
    error::{AppError, Result},
    process_cache::CachedSummary,
    recalc::compute_season,
    reward_math::{
        evaluate_wallet, get_claim_state, preview_row, ClaimState, EvaluationInput, SeasonSummary,
        WalletEvaluation, WalletRewardRow,
    },
    signature::normalize_address,
    store::StoreError,
    validation::{DryRunRequest, ValidationRejection},
    AppState,
};

const DEFAULT_DRY_RUN_LIMIT: usize = 100;

/// Liveness plus a store round-trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.now_ms();
    match state.ledger.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "ok",
                "timestamp": now,
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Health check: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "store": "unavailable",
                    "timestamp": now,
                })),
            )
        }
    }
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {}", e)))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub season_id: String,
    pub summary: Option<SeasonSummary>,
    pub updated_at: Option<i64>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_opens_at: Option<i64>,
}

/// Season aggregates. Falls back to the last summary this process saw when
/// the store cannot be read.
pub async fn summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>> {
    let rewards = &state.config.rewards;
    let season_id = rewards.season_id.clone().ok_or_else(|| {
        AppError::NotConfigured("WHITELIST_SEASON_ID is not set".to_string())
    })?;
    let claim_opens_at = rewards.claim_opens_at_ms();

    let fresh = async {
        let summary = state.ledger.load_summary(&season_id).await?;
        let updated_at = state.ledger.load_updated_at(&season_id).await?;
        Ok::<_, StoreError>((summary, updated_at))
    }
    .await;

    match fresh {
        Ok((summary, updated_at)) => {
            if let Some(summary) = &summary {
                state
                    .cache
                    .remember_summary(
                        &season_id,
                        CachedSummary {
                            summary: summary.clone(),
                            updated_at,
                        },
                    )
                    .await;
            }
            Ok(Json(SummaryResponse {
                season_id,
                summary,
                updated_at,
                stale: false,
                claim_opens_at,
            }))
        }
        Err(e) => match state.cache.last_summary(&season_id).await {
            Some(cached) => {
                warn!(season = %season_id, error = %e, "Serving cached summary");
                Ok(Json(SummaryResponse {
                    season_id,
                    summary: Some(cached.summary),
                    updated_at: cached.updated_at,
                    stale: true,
                    claim_opens_at,
                }))
            }
            None => Err(e.into()),
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub season_id: String,
    pub address: String,
    /// Not yet materialized by a recalculation
    pub pending: bool,
    pub preview: bool,
    pub rank: Option<u64>,
    /// Wallets ranked by the last recalculation
    pub ranked_wallets: u64,
    pub row: WalletRewardRow,
    pub claim_state: ClaimState,
}

/// One wallet's reward row and claimable state. Whitelisted wallets the last
/// run has not seen get a preview computed on the fly.
pub async fn user(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<UserResponse>> {
    let address = require_address(query.address.as_deref())?;
    let rewards = &state.config.rewards;
    let season = rewards.resolve()?;
    let now_ms = state.now_ms();
    let ranked_wallets = state.ledger.leaderboard_size(&season.season_id).await?;

    if let Some(row) = state.ledger.load_reward_row(&season.season_id, &address).await? {
        let rank = state
            .ledger
            .leaderboard_rank(&season.season_id, &address)
            .await?
            .map(|r| r + 1);
        let claim_state = get_claim_state(&row.position(), season.schedule(), now_ms);
        return Ok(Json(UserResponse {
            season_id: season.season_id,
            address,
            pending: false,
            preview: false,
            rank,
            ranked_wallets,
            row,
            claim_state,
        }));
    }

    let presale = state
        .ledger
        .is_whitelisted(&address)
        .await?
        .ok_or_else(|| AppError::NotFound("Address is not whitelisted".to_string()))?;

    let metrics_season = state.metrics_season_id(&season.season_id);
    let points = state.ledger.load_points_metrics(&metrics_season, &address).await?;
    let evaluation = evaluate_wallet(EvaluationInput {
        wallet: &address,
        presale: Some(&presale),
        points: points.as_ref(),
        existing: None,
        params: &rewards.params,
        now_ms,
    });

    let last_scales = match state.ledger.load_summary(&season.season_id).await {
        Ok(Some(summary)) => Some((summary.budget_base_scale, summary.budget_bonus_scale)),
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, "Summary unreadable; previewing from cached scales");
            state
                .cache
                .last_summary(&season.season_id)
                .await
                .map(|c| (c.summary.budget_base_scale, c.summary.budget_bonus_scale))
        }
    };

    let row = preview_row(&evaluation, &rewards.params, &season.season_id, last_scales, now_ms);
    let claim_state = get_claim_state(&row.position(), season.schedule(), now_ms);

    Ok(Json(UserResponse {
        season_id: season.season_id,
        address,
        pending: true,
        preview: true,
        rank: None,
        ranked_wallets,
        row,
        claim_state,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunItem {
    pub evaluation: WalletEvaluation,
    pub row: WalletRewardRow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunSingle {
    pub season_id: String,
    pub evaluation: WalletEvaluation,
    pub row: WalletRewardRow,
    pub claim_state: ClaimState,
    pub summary: SeasonSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunBatch {
    pub season_id: String,
    pub summary: SeasonSummary,
    pub base_total_raw: Decimal,
    pub bonus_total_raw: Decimal,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<DryRunItem>,
}

/// Body fields take precedence over query parameters
fn merge_dry_run(query: DryRunRequest, body: Option<DryRunRequest>) -> DryRunRequest {
    match body {
        Some(body) => DryRunRequest {
            address: body.address.or(query.address),
            offset: body.offset.or(query.offset),
            limit: body.limit.or(query.limit),
        },
        None => query,
    }
}

/// Operator preview of a full recalculation without writing anything
pub async fn dry_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DryRunRequest>,
    body: Option<Json<DryRunRequest>>,
) -> Result<impl IntoResponse> {
    require_operator(&state, &headers)?;

    let request = merge_dry_run(query, body.map(|Json(b)| b));
    request
        .validate()
        .map_err(|e| AppError::from(ValidationRejection::ValidationError(e)))?;

    let rewards = &state.config.rewards;
    let season = rewards.resolve()?;
    let now_ms = state.now_ms();
    let metrics_season = state.metrics_season_id(&season.season_id);
    let computation = compute_season(
        &state.ledger,
        rewards,
        &season.season_id,
        &metrics_season,
        now_ms,
    )
    .await?;

    if let Some(raw) = request.address.as_deref() {
        let address = normalize_address(raw).ok_or_else(|| AppError::ValidationError {
            field: "address".to_string(),
            message: "must be a 0x-prefixed 20-byte hex address".to_string(),
        })?;
        let index = computation
            .evaluations
            .iter()
            .position(|e| e.address == address)
            .ok_or_else(|| AppError::NotFound("Address is not whitelisted".to_string()))?;

        let evaluation = computation.evaluations[index].clone();
        let row = computation.outcome.rows[index].clone();
        let claim_state = get_claim_state(&row.position(), season.schedule(), now_ms);
        return Ok(Json(serde_json::to_value(DryRunSingle {
            season_id: season.season_id,
            evaluation,
            row,
            claim_state,
            summary: computation.summary,
        })?));
    }

    let offset = request.offset.unwrap_or(0);
    let limit = request.limit.unwrap_or(DEFAULT_DRY_RUN_LIMIT);
    let total = computation.evaluations.len();
    let items = computation
        .evaluations
        .into_iter()
        .zip(computation.outcome.rows)
        .skip(offset)
        .take(limit)
        .map(|(evaluation, row)| DryRunItem { evaluation, row })
        .collect();

    Ok(Json(serde_json::to_value(DryRunBatch {
        season_id: season.season_id,
        summary: computation.summary,
        base_total_raw: computation.outcome.base_total_raw,
        bonus_total_raw: computation.outcome.bonus_total_raw,
        total,
        offset,
        limit,
        items,
    })?))
}
