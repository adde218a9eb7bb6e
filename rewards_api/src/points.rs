//! Points leaderboard rewards
//!
//! A fixed pool is shared by the top wallets of the points leaderboard in
//! proportion to their points. Until an operator finalizes the season the
//! table is recomputed from the live ranking on every read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{
    config::PointsConfig,
    ledger::{push_opt, Fields, RewardLedger},
    reward_math::{floor6, round6, VestingPosition},
    store::StoreResult,
};

/// One wallet's share of the points pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsReward {
    pub rank: u32,
    pub address: String,
    pub points: Decimal,
    pub reward_crx: Decimal,
}

/// Finalized reward table of a points season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsSnapshot {
    pub season_id: String,
    pub reward_pool_crx: Decimal,
    pub top_n: usize,
    pub total_points: Decimal,
    pub total_reward_crx: Decimal,
    pub finalized_at: i64,
    pub rewards: Vec<PointsReward>,
}

impl PointsSnapshot {
    pub fn reward_for(&self, address: &str) -> Option<&PointsReward> {
        self.rewards.iter().find(|r| r.address == address)
    }
}

/// Where an entitlement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementSource {
    Live,
    Snapshot,
}

/// Claim progress of one wallet in a points season
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsClaimRecord {
    pub address: String,
    pub season_id: String,
    pub entitlement_crx: Decimal,
    pub immediate_claimed_crx: Decimal,
    pub streamed_claimed_crx: Decimal,
    pub claim_count: u64,
    pub claim_version: u64,
    pub last_claim_at: Option<i64>,
}

impl PointsClaimRecord {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("address".to_string(), self.address.clone()),
            ("seasonId".to_string(), self.season_id.clone()),
            ("entitlementCrx".to_string(), self.entitlement_crx.to_string()),
            ("immediateClaimedCrx".to_string(), self.immediate_claimed_crx.to_string()),
            ("streamedClaimedCrx".to_string(), self.streamed_claimed_crx.to_string()),
            ("claimCount".to_string(), self.claim_count.to_string()),
            ("claimVersion".to_string(), self.claim_version.to_string()),
        ];
        push_opt(&mut fields, "lastClaimAt", self.last_claim_at);
        fields
    }

    pub fn from_fields(raw: &HashMap<String, String>) -> StoreResult<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let f = Fields(raw);
        Ok(Some(PointsClaimRecord {
            address: f.string("address"),
            season_id: f.string("seasonId"),
            entitlement_crx: f.decimal("entitlementCrx")?,
            immediate_claimed_crx: f.decimal("immediateClaimedCrx")?,
            streamed_claimed_crx: f.decimal("streamedClaimedCrx")?,
            claim_count: f.u64("claimCount")?,
            claim_version: f.u64("claimVersion")?,
            last_claim_at: f.opt_i64("lastClaimAt")?,
        }))
    }
}

/// Rank-derived reward table.
///
/// Excluded addresses and non-positive scores are dropped, the best `top_n`
/// remain (ties ordered by address) and each gets `pool * points / total`,
/// truncated so the table never exceeds the pool.
pub fn compute_points_rewards(
    ranked: &[(String, Decimal)],
    excluded: &HashSet<String>,
    reward_pool_crx: Decimal,
    top_n: usize,
) -> Vec<PointsReward> {
    let mut eligible: Vec<(String, Decimal)> = ranked
        .iter()
        .map(|(address, points)| (address.to_lowercase(), *points))
        .filter(|(address, points)| *points > Decimal::ZERO && !excluded.contains(address))
        .collect();
    eligible.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    // Keep each address once, at its best score
    let mut seen = HashSet::with_capacity(eligible.len());
    eligible.retain(|(address, _)| seen.insert(address.clone()));
    eligible.truncate(top_n);

    let total_points: Decimal = eligible.iter().map(|(_, points)| *points).sum();
    let pool = reward_pool_crx.max(Decimal::ZERO);

    eligible
        .into_iter()
        .enumerate()
        .map(|(i, (address, points))| PointsReward {
            rank: i as u32 + 1,
            address,
            points,
            reward_crx: if total_points > Decimal::ZERO {
                floor6(pool * points / total_points)
            } else {
                Decimal::ZERO
            },
        })
        .collect()
}

pub fn build_snapshot(
    season_id: &str,
    config: &PointsConfig,
    ranked: &[(String, Decimal)],
    now_ms: i64,
) -> PointsSnapshot {
    let rewards = compute_points_rewards(
        ranked,
        &config.excluded_addresses,
        config.reward_pool_crx,
        config.top_n,
    );
    PointsSnapshot {
        season_id: season_id.to_string(),
        reward_pool_crx: config.reward_pool_crx,
        top_n: config.top_n,
        total_points: rewards.iter().map(|r| r.points).sum(),
        total_reward_crx: rewards.iter().map(|r| r.reward_crx).sum(),
        finalized_at: now_ms,
        rewards,
    }
}

/// The wallet's entitlement: the finalized snapshot if one exists, otherwise
/// the live table. `None` when the wallet is not in the table.
pub async fn resolve_entitlement(
    ledger: &RewardLedger,
    config: &PointsConfig,
    season_id: &str,
    address: &str,
) -> StoreResult<Option<(PointsReward, EntitlementSource)>> {
    if let Some(snapshot) = ledger.load_points_snapshot(season_id).await? {
        return Ok(snapshot
            .reward_for(address)
            .cloned()
            .map(|reward| (reward, EntitlementSource::Snapshot)));
    }

    let ranked = ledger.load_points_ranking(season_id).await?;
    let rewards = compute_points_rewards(
        &ranked,
        &config.excluded_addresses,
        config.reward_pool_crx,
        config.top_n,
    );
    Ok(rewards
        .into_iter()
        .find(|r| r.address == address)
        .map(|reward| (reward, EntitlementSource::Live)))
}

/// Vesting position of a points entitlement; streaming starts at claim open
pub fn points_position(
    entitlement_crx: Decimal,
    config: &PointsConfig,
    claim_opens_at_ms: i64,
    record: Option<&PointsClaimRecord>,
) -> VestingPosition {
    let immediate_claimable_crx = round6(entitlement_crx * config.immediate_pct);
    VestingPosition {
        immediate_claimable_crx,
        streamed_crx: round6((entitlement_crx - immediate_claimable_crx).max(Decimal::ZERO)),
        stream_start_at: Some(claim_opens_at_ms),
        stream_days: config.stream_days,
        immediate_claimed_crx: record.map(|r| r.immediate_claimed_crx).unwrap_or_default(),
        streamed_claimed_crx: record.map(|r| r.streamed_claimed_crx).unwrap_or_default(),
    }
}
