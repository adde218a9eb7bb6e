//! Whitelist season recalculation
//!
//! Full-population recompute: scan the whitelist, read every wallet's inputs,
//! evaluate, cap, summarize and write the result back in one batch. Safe to
//! re-run at any time since evaluation carries activation and claim progress
//! forward from the stored rows.

use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

use crate::{
    config::RewardsConfig,
    ledger::RewardLedger,
    reward_math::{
        apply_budget_cap, build_summary, evaluate_wallet, CapOutcome, EvaluationInput,
        SeasonSummary, WalletEvaluation,
    },
    store::StoreResult,
};

/// In-memory evaluation of a whole season
#[derive(Debug, Clone)]
pub struct SeasonComputation {
    pub evaluations: Vec<WalletEvaluation>,
    pub outcome: CapOutcome,
    pub summary: SeasonSummary,
}

/// Result of a persisted recalculation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcReport {
    pub season_id: String,
    pub processed: usize,
    pub wallet_count: u64,
    pub activated_count: u64,
    pub total_allocated_crx: Decimal,
    pub budget_cap_crx: Decimal,
    pub budget_base_scale: Decimal,
    pub budget_bonus_scale: Decimal,
    pub updated_at: i64,
    pub duration_ms: u64,
}

/// Evaluate every whitelisted wallet without writing anything
pub async fn compute_season(
    ledger: &RewardLedger,
    config: &RewardsConfig,
    season_id: &str,
    metrics_season_id: &str,
    now_ms: i64,
) -> StoreResult<SeasonComputation> {
    let wallets = ledger.scan_whitelisted_wallets().await?;
    let inputs = ledger
        .load_wallet_inputs(season_id, metrics_season_id, &wallets)
        .await?;
    debug!(season = %season_id, wallets = inputs.len(), "Loaded wallet inputs");

    let evaluations: Vec<WalletEvaluation> = inputs
        .iter()
        .map(|input| {
            evaluate_wallet(EvaluationInput {
                wallet: &input.address,
                presale: input.presale.as_ref(),
                points: input.points.as_ref(),
                existing: input.existing.as_ref(),
                params: &config.params,
                now_ms,
            })
        })
        .collect();

    let outcome = apply_budget_cap(&evaluations, &config.params, season_id, now_ms);
    let summary = build_summary(&outcome, &config.params, season_id, now_ms);

    Ok(SeasonComputation {
        evaluations,
        outcome,
        summary,
    })
}

/// Recompute and persist the whole season
pub async fn run_recalculation(
    ledger: &RewardLedger,
    config: &RewardsConfig,
    season_id: &str,
    metrics_season_id: &str,
    now_ms: i64,
) -> StoreResult<(RecalcReport, SeasonSummary)> {
    let started = Instant::now();
    let computation = compute_season(ledger, config, season_id, metrics_season_id, now_ms).await?;
    ledger
        .persist_recalculation(season_id, &computation.outcome.rows, &computation.summary, now_ms)
        .await?;

    let summary = computation.summary;
    let report = RecalcReport {
        season_id: season_id.to_string(),
        processed: computation.outcome.rows.len(),
        wallet_count: summary.wallet_count,
        activated_count: summary.activated_count,
        total_allocated_crx: summary.total_allocated_crx,
        budget_cap_crx: summary.budget_cap_crx,
        budget_base_scale: summary.budget_base_scale,
        budget_bonus_scale: summary.budget_bonus_scale,
        updated_at: now_ms,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        season = %season_id,
        wallets = report.wallet_count,
        activated = report.activated_count,
        allocated = %report.total_allocated_crx,
        cap = %report.budget_cap_crx,
        base_scale = %report.budget_base_scale,
        bonus_scale = %report.budget_bonus_scale,
        duration_ms = report.duration_ms,
        "Recalculation complete"
    );

    Ok((report, summary))
}
