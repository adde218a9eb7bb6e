//! Points leaderboard reward endpoints

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::{
    acquire_claim_lock, check_claim_rate, ensure_claim_open, release_claim_lock, require_address,
    require_admin, verify_claim_request, AddressQuery, ClaimReceipt,
};
use crate::{
    config::ResolvedSeason,
    error::{AppError, Result},
    lock::{self, LockOptions},
    points::{
        build_snapshot, points_position, resolve_entitlement, EntitlementSource, PointsClaimRecord,
        PointsReward, PointsSnapshot,
    },
    reward_math::{compute_claim_payout, get_claim_state, leaderboard_score, ClaimState},
    signature::{normalize_address, points_claim_message},
    validation::{ClaimRequest, ValidatedJson},
    AppState,
};

const PROGRAM: &str = "points";

/// Reward table as served, finalized or live
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsTableResponse {
    pub season_id: String,
    pub finalized: bool,
    pub finalized_at: Option<i64>,
    pub claim_opens_at: i64,
    pub claim_open: bool,
    pub reward_pool_crx: Decimal,
    pub top_n: usize,
    pub total_points: Decimal,
    pub total_reward_crx: Decimal,
    pub rewards: Vec<PointsReward>,
}

impl PointsTableResponse {
    fn new(season: &ResolvedSeason, snapshot: PointsSnapshot, finalized: bool, now_ms: i64) -> Self {
        Self {
            season_id: season.season_id.clone(),
            finalized,
            finalized_at: finalized.then_some(snapshot.finalized_at),
            claim_opens_at: season.claim_opens_at_ms,
            claim_open: now_ms >= season.claim_opens_at_ms,
            reward_pool_crx: snapshot.reward_pool_crx,
            top_n: snapshot.top_n,
            total_points: snapshot.total_points,
            total_reward_crx: snapshot.total_reward_crx,
            rewards: snapshot.rewards,
        }
    }
}

/// The finalized table, or the live one computed from the current ranking
pub async fn summary(State(state): State<AppState>) -> Result<Json<PointsTableResponse>> {
    let config = &state.config.points;
    let season = config.resolve()?;
    let now_ms = state.now_ms();

    if let Some(snapshot) = state.ledger.load_points_snapshot(&season.season_id).await? {
        return Ok(Json(PointsTableResponse::new(&season, snapshot, true, now_ms)));
    }

    let ranked = state.ledger.load_points_ranking(&season.season_id).await?;
    let live = build_snapshot(&season.season_id, config, &ranked, now_ms);
    Ok(Json(PointsTableResponse::new(&season, live, false, now_ms)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsUserResponse {
    pub season_id: String,
    pub address: String,
    pub source: EntitlementSource,
    pub rank: u32,
    pub points: Decimal,
    pub entitlement_crx: Decimal,
    pub claim_count: u64,
    pub claim_version: u64,
    pub last_claim_at: Option<i64>,
    pub claim_state: ClaimState,
}

pub async fn user(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<PointsUserResponse>> {
    let address = require_address(query.address.as_deref())?;
    let config = &state.config.points;
    let season = config.resolve()?;
    let now_ms = state.now_ms();

    let (reward, source) = resolve_entitlement(&state.ledger, config, &season.season_id, &address)
        .await?
        .ok_or_else(|| AppError::NotFound("Address has no points reward".to_string()))?;
    let record = state
        .ledger
        .load_points_claim(&season.season_id, &address)
        .await?;

    let position = points_position(
        reward.reward_crx,
        config,
        season.claim_opens_at_ms,
        record.as_ref(),
    );

    Ok(Json(PointsUserResponse {
        season_id: season.season_id.clone(),
        address,
        source,
        rank: reward.rank,
        points: reward.points,
        entitlement_crx: reward.reward_crx,
        claim_count: record.as_ref().map_or(0, |r| r.claim_count),
        claim_version: record.as_ref().map_or(0, |r| r.claim_version),
        last_claim_at: record.as_ref().and_then(|r| r.last_claim_at),
        claim_state: get_claim_state(&position, season.schedule(), now_ms),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsClaimResponse {
    pub season_id: String,
    pub address: String,
    pub source: EntitlementSource,
    pub entitlement_crx: Decimal,
    pub claim: ClaimReceipt,
    pub claim_state: ClaimState,
    pub claim_version: u64,
}

/// Claim the currently claimable part of a points reward
pub async fn claim(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ClaimRequest>,
) -> Result<Json<PointsClaimResponse>> {
    let address = normalize_address(&request.address).ok_or_else(|| AppError::ValidationError {
        field: "address".to_string(),
        message: "must be a 0x-prefixed 20-byte hex address".to_string(),
    })?;

    let config = &state.config.points;
    let season = config.resolve()?;
    if let Some(requested) = request.season_id.as_deref() {
        if requested != season.season_id {
            return Err(AppError::BadRequest(format!("Unknown season {}", requested)));
        }
    }
    let now_ms = state.now_ms();
    let message = points_claim_message(&season.season_id, &address, request.issued_at);
    if let Err(e) = verify_claim_request(
        &request,
        &address,
        &season,
        &message,
        config.claim_signature_ttl_seconds,
        config.claim_max_future_skew_seconds,
        now_ms,
    ) {
        state.metrics.record_claim(PROGRAM, e.error_code());
        return Err(e);
    }
    // Only signed requests spend the wallet's quota
    check_claim_rate(&state, PROGRAM, &address)?;

    let lock_key = state
        .ledger
        .keys()
        .points_claim_lock(&season.season_id, &address);
    let token = acquire_claim_lock(&state, PROGRAM, &lock_key).await?;
    let result = claim_locked(&state, &season, &address, now_ms).await;
    release_claim_lock(&state, &lock_key, &token).await;

    match &result {
        Ok(response) => {
            state.metrics.record_claim(PROGRAM, "paid");
            state
                .metrics
                .add_claimed(PROGRAM, leaderboard_score(response.claim.amount_crx));
        }
        Err(e) => state.metrics.record_claim(PROGRAM, e.error_code()),
    }
    result.map(Json)
}

async fn claim_locked(
    state: &AppState,
    season: &ResolvedSeason,
    address: &str,
    now_ms: i64,
) -> Result<PointsClaimResponse> {
    let config = &state.config.points;
    let (reward, source) = resolve_entitlement(&state.ledger, config, &season.season_id, address)
        .await?
        .ok_or_else(|| AppError::NotFound("Address has no points reward".to_string()))?;
    let record = state
        .ledger
        .load_points_claim(&season.season_id, address)
        .await?;

    let position = points_position(
        reward.reward_crx,
        config,
        season.claim_opens_at_ms,
        record.as_ref(),
    );
    let payout = compute_claim_payout(&position, season.schedule(), now_ms);
    if payout.is_empty() {
        return Err(AppError::NothingClaimable {
            claim_state: serde_json::to_value(&payout.state)?,
        });
    }

    let previous = record.unwrap_or_default();
    let next = PointsClaimRecord {
        address: address.to_string(),
        season_id: season.season_id.clone(),
        entitlement_crx: reward.reward_crx,
        immediate_claimed_crx: payout.next_immediate_claimed_crx,
        streamed_claimed_crx: payout.next_streamed_claimed_crx,
        claim_count: previous.claim_count + 1,
        claim_version: previous.claim_version + 1,
        last_claim_at: Some(now_ms),
    };
    if let Err(e) = state
        .ledger
        .persist_points_claim(&season.season_id, &next)
        .await
    {
        warn!(
            season = %season.season_id,
            wallet = %address,
            amount = %payout.claim_total_crx,
            error = %e,
            "Points claim computed but not persisted"
        );
        return Err(e.into());
    }

    info!(
        season = %season.season_id,
        wallet = %address,
        amount = %payout.claim_total_crx,
        source = ?source,
        version = next.claim_version,
        "Points claim paid"
    );

    let updated = points_position(reward.reward_crx, config, season.claim_opens_at_ms, Some(&next));
    Ok(PointsClaimResponse {
        season_id: season.season_id.clone(),
        address: address.to_string(),
        source,
        entitlement_crx: reward.reward_crx,
        claim: ClaimReceipt {
            amount_crx: payout.claim_total_crx,
            immediate_crx: payout.immediate_crx,
            streamed_crx: payout.streamed_crx,
            claimed_at: now_ms,
        },
        claim_state: get_claim_state(&updated, season.schedule(), now_ms),
        claim_version: next.claim_version,
    })
}

/// Freeze the reward table of a season once its claim window has opened
pub async fn finalize(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PointsSnapshot>> {
    require_admin(&state, &headers)?;
    let config = &state.config.points;
    let season = config.resolve()?;
    let now_ms = state.now_ms();
    ensure_claim_open(&season, now_ms)?;

    let lock_key = state.ledger.keys().points_finalize_lock(&season.season_id);
    let token = match lock::acquire(state.ledger.store(), &lock_key, LockOptions::RECALC).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            state.metrics.lock_busy("points-finalize");
            return Err(AppError::Conflict("Finalization already in progress".to_string()));
        }
        Err(e) => {
            warn!(season = %season.season_id, error = %e, "Finalize lock unavailable");
            return Err(AppError::LockUnavailable);
        }
    };

    let result = finalize_locked(&state, &season, now_ms).await;
    if let Err(e) = lock::release(state.ledger.store(), &lock_key, &token).await {
        warn!(season = %season.season_id, error = %e, "Finalize lock release failed; waiting for TTL");
    }
    result.map(Json)
}

async fn finalize_locked(
    state: &AppState,
    season: &ResolvedSeason,
    now_ms: i64,
) -> Result<PointsSnapshot> {
    if state
        .ledger
        .load_points_snapshot(&season.season_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "Season {} is already finalized",
            season.season_id
        )));
    }

    let ranked = state.ledger.load_points_ranking(&season.season_id).await?;
    let snapshot = build_snapshot(&season.season_id, &state.config.points, &ranked, now_ms);
    state
        .ledger
        .store_points_snapshot(&season.season_id, &snapshot)
        .await?;

    info!(
        season = %season.season_id,
        winners = snapshot.rewards.len(),
        total_points = %snapshot.total_points,
        total_reward = %snapshot.total_reward_crx,
        "Points season finalized"
    );
    Ok(snapshot)
}
