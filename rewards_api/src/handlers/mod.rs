//! HTTP handlers
//!
//! Shared gates used by both claim programs live here: address parsing,
//! operator authorization, rate limiting, signature checks and the claim lock.

use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{
    authorizer::authorize,
    config::ResolvedSeason,
    error::AppError,
    lock::{self, LockOptions},
    signature::{check_freshness, normalize_address, recover_personal_signer},
    tracing_logger::token_prefix,
    validation::ClaimRequest,
    AppState,
};

pub mod claim;
pub mod points;
pub mod queries;
pub mod recalc;

#[derive(Debug, Default, Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

/// Paid-out amounts of one claim
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub amount_crx: Decimal,
    pub immediate_crx: Decimal,
    pub streamed_crx: Decimal,
    pub claimed_at: i64,
}

pub(crate) fn require_address(raw: Option<&str>) -> Result<String, AppError> {
    let raw = raw.ok_or_else(|| AppError::ValidationError {
        field: "address".to_string(),
        message: "is required".to_string(),
    })?;
    normalize_address(raw).ok_or_else(|| AppError::ValidationError {
        field: "address".to_string(),
        message: "must be a 0x-prefixed 20-byte hex address".to_string(),
    })
}

/// Bearer gate for operator endpoints. With no secret configured the
/// endpoint is disabled rather than left open.
pub(crate) fn require_operator(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    require_secret(
        headers,
        &state.config.secrets.operator(),
        "no REWARDS_ADMIN_SECRET or CRON_SECRET configured",
    )
}

/// Admin-only gate; cron secrets are not accepted
pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    require_secret(
        headers,
        &state.config.secrets.admin,
        "no REWARDS_ADMIN_SECRET configured",
    )
}

fn require_secret(headers: &HeaderMap, secrets: &[String], missing: &str) -> Result<(), AppError> {
    if secrets.iter().all(|s| s.trim().is_empty()) {
        return Err(AppError::NotConfigured(missing.to_string()));
    }
    if !authorize(headers, secrets) {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    Ok(())
}

pub(crate) fn check_claim_rate(state: &AppState, program: &str, address: &str) -> Result<(), AppError> {
    state
        .cache
        .check_claim_rate(&format!("{}:{}", program, address))
        .map_err(|wait| {
            state.metrics.record_claim(program, "rate_limited");
            AppError::RateLimitExceeded {
                retry_after: wait.as_secs().max(1),
            }
        })
}

/// Claim-open time in the future (403)
pub(crate) fn ensure_claim_open(season: &ResolvedSeason, now_ms: i64) -> Result<(), AppError> {
    if now_ms < season.claim_opens_at_ms {
        return Err(AppError::ClaimNotOpen {
            claim_opens_at: season.claim_opens_at_ms,
        });
    }
    Ok(())
}

/// Freshness, claim gate and signer recovery, in that order
pub(crate) fn verify_claim_request(
    request: &ClaimRequest,
    address: &str,
    season: &ResolvedSeason,
    message: &str,
    ttl_seconds: u64,
    max_future_skew_seconds: u64,
    now_ms: i64,
) -> Result<(), AppError> {
    check_freshness(request.issued_at, now_ms, ttl_seconds, max_future_skew_seconds)?;
    ensure_claim_open(season, now_ms)?;

    let signer = recover_personal_signer(message, &request.signature)?;
    if signer != address {
        debug!(claimed = %address, recovered = %signer, "Claim signer mismatch");
        return Err(AppError::InvalidSignature);
    }
    Ok(())
}

/// Take the per-wallet claim lock. Busy is a retryable 409; a lock
/// subsystem outage fails closed with 503.
pub(crate) async fn acquire_claim_lock(
    state: &AppState,
    program: &str,
    key: &str,
) -> Result<String, AppError> {
    match lock::acquire(state.ledger.store(), key, LockOptions::CLAIM).await {
        Ok(Some(token)) => {
            debug!(lock = %key, token = %token_prefix(&token), "Claim lock acquired");
            Ok(token)
        }
        Ok(None) => {
            state.metrics.lock_busy(program);
            state.metrics.record_claim(program, "lock_busy");
            Err(AppError::ClaimInProgress)
        }
        Err(e) => {
            error!(lock = %key, error = %e, "Claim lock unavailable; refusing claim");
            state.metrics.record_claim(program, "lock_unavailable");
            Err(AppError::LockUnavailable)
        }
    }
}

/// Release after the locked section; TTL covers a failed release
pub(crate) async fn release_claim_lock(state: &AppState, key: &str, token: &str) {
    match lock::release(state.ledger.store(), key, token).await {
        Ok(true) => debug!(lock = %key, token = %token_prefix(token), "Claim lock released"),
        Ok(false) => warn!(lock = %key, token = %token_prefix(token), "Claim lock not released; waiting for TTL"),
        Err(e) => warn!(lock = %key, error = %e, "Claim lock release failed; waiting for TTL"),
    }
}
