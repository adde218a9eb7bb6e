//! Whitelist reward claims

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{info, warn};

use super::{
    acquire_claim_lock, check_claim_rate, release_claim_lock, verify_claim_request, ClaimReceipt,
};
use crate::{
    config::ResolvedSeason,
    error::{AppError, Result},
    ledger::ClaimUpdate,
    reward_math::{compute_claim_payout, get_claim_state, leaderboard_score, ClaimState},
    signature::{normalize_address, whitelist_claim_message},
    validation::{ClaimRequest, ValidatedJson},
    AppState,
};

const PROGRAM: &str = "whitelist";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub season_id: String,
    pub address: String,
    pub claim: ClaimReceipt,
    pub claim_state: ClaimState,
    pub claim_version: u64,
}

/// Claim whatever is currently claimable for a whitelisted wallet
pub async fn claim(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ClaimRequest>,
) -> Result<Json<ClaimResponse>> {
    let address = normalize_address(&request.address).ok_or_else(|| AppError::ValidationError {
        field: "address".to_string(),
        message: "must be a 0x-prefixed 20-byte hex address".to_string(),
    })?;

    let rewards = &state.config.rewards;
    let season = rewards.resolve()?;
    if let Some(requested) = request.season_id.as_deref() {
        if requested != season.season_id {
            return Err(AppError::BadRequest(format!("Unknown season {}", requested)));
        }
    }
    let now_ms = state.now_ms();
    let message = whitelist_claim_message(&season.season_id, &address, request.issued_at);
    if let Err(e) = verify_claim_request(
        &request,
        &address,
        &season,
        &message,
        rewards.claim_signature_ttl_seconds,
        rewards.claim_max_future_skew_seconds,
        now_ms,
    ) {
        state.metrics.record_claim(PROGRAM, e.error_code());
        return Err(e);
    }
    // Only signed requests spend the wallet's quota
    check_claim_rate(&state, PROGRAM, &address)?;

    let lock_key = state.ledger.keys().claim_lock(&season.season_id, &address);
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

/// Read, compute and persist while holding the wallet's claim lock
async fn claim_locked(
    state: &AppState,
    season: &ResolvedSeason,
    address: &str,
    now_ms: i64,
) -> Result<ClaimResponse> {
    let row = state
        .ledger
        .load_reward_row(&season.season_id, address)
        .await?
        .ok_or_else(|| AppError::NotFound("No rewards recorded for this address".to_string()))?;

    let payout = compute_claim_payout(&row.position(), season.schedule(), now_ms);
    if payout.is_empty() {
        return Err(AppError::NothingClaimable {
            claim_state: serde_json::to_value(&payout.state)?,
        });
    }

    let update = ClaimUpdate {
        immediate_claimed_crx: payout.next_immediate_claimed_crx,
        streamed_claimed_crx: payout.next_streamed_claimed_crx,
        claim_count: row.claim_count + 1,
        claim_version: row.claim_version + 1,
        last_claim_at: now_ms,
    };
    if let Err(e) = state
        .ledger
        .persist_claim(&season.season_id, address, &update)
        .await
    {
        warn!(
            season = %season.season_id,
            wallet = %address,
            amount = %payout.claim_total_crx,
            error = %e,
            "Claim computed but not persisted"
        );
        return Err(e.into());
    }

    info!(
        season = %season.season_id,
        wallet = %address,
        amount = %payout.claim_total_crx,
        immediate = %payout.immediate_crx,
        streamed = %payout.streamed_crx,
        version = update.claim_version,
        "Whitelist claim paid"
    );

    let mut position = row.position();
    position.immediate_claimed_crx = update.immediate_claimed_crx;
    position.streamed_claimed_crx = update.streamed_claimed_crx;

    Ok(ClaimResponse {
        season_id: season.season_id.clone(),
        address: address.to_string(),
        claim: ClaimReceipt {
            amount_crx: payout.claim_total_crx,
            immediate_crx: payout.immediate_crx,
            streamed_crx: payout.streamed_crx,
            claimed_at: now_ms,
        },
        claim_state: get_claim_state(&position, season.schedule(), now_ms),
        claim_version: update.claim_version,
    })
}
