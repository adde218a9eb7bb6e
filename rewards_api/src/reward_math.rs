//! Reward math: deterministic allocation, budget cap, vesting and payouts
//!
//! Everything here is pure. Amounts are CRX with 6 decimals, held as
//! `Decimal` so that sums across a whole season add up exactly.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const MS_PER_DAY: i64 = 86_400_000;

pub const BASE_SALT: &str = "whitelist-base";
pub const BONUS_SALT: &str = "whitelist-bonus";

/// Round to 6 decimals, halves away from zero
pub fn round6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate to 6 decimals
pub fn floor6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(6, RoundingStrategy::ToZero)
}

/// 32-bit FNV-1a over the UTF-8 bytes of `input`
pub fn fnv1a32(input: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Map `identifier` uniformly into `[min, max]`, reproducibly.
///
/// The same `(identifier, min, max, salt)` always yields the same amount;
/// different salts give unrelated amounts for the same identifier.
pub fn deterministic_in_range(identifier: &str, min: Decimal, max: Decimal, salt: &str) -> Decimal {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let hash = fnv1a32(&format!("{}:{}", salt, identifier));
    let span = high - low;
    round6(low + span * Decimal::from(hash) / Decimal::from(u32::MAX))
}

/// Allocation parameters for one whitelist season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardParams {
    pub budget_cap_crx: Decimal,
    pub base_min_crx: Decimal,
    pub base_max_crx: Decimal,
    pub bonus_min_crx: Decimal,
    pub bonus_max_crx: Decimal,
    pub activation_window_days: u32,
    pub volume_threshold_usd: Decimal,
    pub micro_lp_usd: Decimal,
    pub immediate_pct: Decimal,
    pub stream_days: u32,
}

/// Global claim gate of a season
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSchedule {
    pub claim_opens_at_ms: i64,
}

/// Whitelist source-of-truth record for a wallet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresaleRecord {
    pub created_at: Option<i64>,
}

/// Externally maintained trading metrics for a wallet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointsMetrics {
    pub volume_usd: Decimal,
    pub lp_usd: Decimal,
    pub points: Decimal,
}

/// Persisted reward entitlement and claim progress of one wallet in one season
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRewardRow {
    pub address: String,
    pub season_id: String,
    pub whitelisted: bool,
    pub activation_qualified: bool,
    pub whitelisted_at: Option<i64>,
    pub activated_at: Option<i64>,
    pub window_ends_at: Option<i64>,
    pub volume_usd: Decimal,
    pub lp_usd: Decimal,
    pub base_reward_crx: Decimal,
    pub activation_bonus_crx: Decimal,
    pub total_reward_crx: Decimal,
    pub immediate_claimable_crx: Decimal,
    pub streamed_crx: Decimal,
    pub stream_start_at: Option<i64>,
    pub stream_days: u32,
    pub immediate_claimed_crx: Decimal,
    pub streamed_claimed_crx: Decimal,
    pub claim_count: u64,
    pub claim_version: u64,
    pub last_claim_at: Option<i64>,
    pub budget_base_scale: Decimal,
    pub budget_bonus_scale: Decimal,
    pub updated_at: i64,
}

impl WalletRewardRow {
    pub fn position(&self) -> VestingPosition {
        VestingPosition {
            immediate_claimable_crx: self.immediate_claimable_crx,
            streamed_crx: self.streamed_crx,
            stream_start_at: self.stream_start_at,
            stream_days: self.stream_days,
            immediate_claimed_crx: self.immediate_claimed_crx,
            streamed_claimed_crx: self.streamed_claimed_crx,
        }
    }
}

/// The vesting-relevant slice of any reward record
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VestingPosition {
    pub immediate_claimable_crx: Decimal,
    pub streamed_crx: Decimal,
    pub stream_start_at: Option<i64>,
    pub stream_days: u32,
    pub immediate_claimed_crx: Decimal,
    pub streamed_claimed_crx: Decimal,
}

/// Season-wide aggregates written next to the reward rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonSummary {
    pub season_id: String,
    pub wallet_count: u64,
    pub activated_count: u64,
    pub budget_cap_crx: Decimal,
    pub base_allocated_crx: Decimal,
    pub bonus_allocated_crx: Decimal,
    pub total_allocated_crx: Decimal,
    pub total_immediate_crx: Decimal,
    pub total_streamed_crx: Decimal,
    pub immediate_pct: Decimal,
    pub stream_days: u32,
    /// Full precision; previews of later wallets reuse these
    #[serde(with = "rust_decimal::serde::str")]
    pub budget_base_scale: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub budget_bonus_scale: Decimal,
    pub updated_at: i64,
}

/// Everything `evaluate_wallet` looks at
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub wallet: &'a str,
    pub presale: Option<&'a PresaleRecord>,
    pub points: Option<&'a PointsMetrics>,
    pub existing: Option<&'a WalletRewardRow>,
    pub params: &'a RewardParams,
    pub now_ms: i64,
}

/// Entitlement of one wallet before the budget cap
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEvaluation {
    pub address: String,
    pub whitelisted: bool,
    pub whitelisted_at: i64,
    pub window_ends_at: i64,
    pub within_window: bool,
    pub volume_usd: Decimal,
    pub lp_usd: Decimal,
    pub has_swap: bool,
    pub met_volume_threshold: bool,
    pub met_micro_lp: bool,
    pub activation_now: bool,
    pub activated_at: Option<i64>,
    pub activation_qualified: bool,
    pub base_reward_raw: Decimal,
    pub bonus_reward_raw: Decimal,
    pub existing_immediate_claimed_crx: Decimal,
    pub existing_streamed_claimed_crx: Decimal,
    pub existing_claim_count: u64,
    pub existing_claim_version: u64,
    pub existing_last_claim_at: Option<i64>,
}

/// Evaluate activation and raw rewards of a single wallet.
///
/// Activation is sticky: once a row carries `activated_at` it is kept even
/// after the window closes, so re-running never resets a vesting clock.
pub fn evaluate_wallet(input: EvaluationInput<'_>) -> WalletEvaluation {
    let EvaluationInput {
        wallet,
        presale,
        points,
        existing,
        params,
        now_ms,
    } = input;

    let whitelisted_at = presale
        .and_then(|p| p.created_at)
        .or_else(|| existing.and_then(|row| row.whitelisted_at))
        .unwrap_or(now_ms);
    let window_ends_at =
        whitelisted_at.saturating_add(i64::from(params.activation_window_days) * MS_PER_DAY);
    let within_window = now_ms <= window_ends_at;

    let volume_usd = points.map(|p| p.volume_usd).unwrap_or_default();
    let lp_usd = points.map(|p| p.lp_usd).unwrap_or_default();
    let has_swap = volume_usd > Decimal::ZERO;
    let met_volume_threshold = volume_usd >= params.volume_threshold_usd;
    let met_micro_lp = lp_usd >= params.micro_lp_usd;
    let activation_now = has_swap && (met_volume_threshold || met_micro_lp);

    let activated_at = existing
        .and_then(|row| row.activated_at)
        .or(if within_window && activation_now {
            Some(now_ms)
        } else {
            None
        });
    let activation_qualified = activated_at.is_some();

    let base_reward_raw =
        deterministic_in_range(wallet, params.base_min_crx, params.base_max_crx, BASE_SALT);
    let bonus_reward_raw = if activation_qualified {
        deterministic_in_range(wallet, params.bonus_min_crx, params.bonus_max_crx, BONUS_SALT)
    } else {
        Decimal::ZERO
    };

    WalletEvaluation {
        address: wallet.to_string(),
        whitelisted: presale.is_some() || existing.map_or(false, |row| row.whitelisted),
        whitelisted_at,
        window_ends_at,
        within_window,
        volume_usd,
        lp_usd,
        has_swap,
        met_volume_threshold,
        met_micro_lp,
        activation_now,
        activated_at,
        activation_qualified,
        base_reward_raw,
        bonus_reward_raw,
        existing_immediate_claimed_crx: existing
            .map(|row| row.immediate_claimed_crx)
            .unwrap_or_default(),
        existing_streamed_claimed_crx: existing
            .map(|row| row.streamed_claimed_crx)
            .unwrap_or_default(),
        existing_claim_count: existing.map_or(0, |row| row.claim_count),
        existing_claim_version: existing.map_or(0, |row| row.claim_version),
        existing_last_claim_at: existing.and_then(|row| row.last_claim_at),
    }
}

/// Result of applying the season budget to a population
#[derive(Debug, Clone, PartialEq)]
pub struct CapOutcome {
    pub rows: Vec<WalletRewardRow>,
    pub base_total_raw: Decimal,
    pub bonus_total_raw: Decimal,
    pub base_scale: Decimal,
    pub bonus_scale: Decimal,
}

/// Two-tier waterfall: base rewards take the budget first, bonuses share
/// whatever is left. Scaled amounts are truncated to 6 decimals so the
/// allocated total never exceeds the cap.
pub fn apply_budget_cap(
    entries: &[WalletEvaluation],
    params: &RewardParams,
    season_id: &str,
    now_ms: i64,
) -> CapOutcome {
    let cap = params.budget_cap_crx.max(Decimal::ZERO);
    let base_total_raw: Decimal = entries.iter().map(|e| e.base_reward_raw).sum();
    let bonus_total_raw: Decimal = entries.iter().map(|e| e.bonus_reward_raw).sum();

    let over_budget = base_total_raw > cap;
    let bonus_budget = if over_budget {
        Decimal::ZERO
    } else {
        cap - base_total_raw
    };

    let base_scale = if over_budget {
        cap / base_total_raw
    } else {
        Decimal::ONE
    };
    let bonus_scale = if over_budget {
        Decimal::ZERO
    } else if bonus_total_raw > Decimal::ZERO {
        (bonus_budget / bonus_total_raw).min(Decimal::ONE)
    } else {
        Decimal::ONE
    };
    let bonus_scaled = bonus_total_raw > bonus_budget;

    let rows = entries
        .iter()
        .map(|entry| {
            let base_reward_crx = if over_budget {
                floor6(entry.base_reward_raw * cap / base_total_raw)
            } else {
                floor6(entry.base_reward_raw)
            };
            let activation_bonus_crx = if over_budget {
                Decimal::ZERO
            } else if bonus_scaled {
                floor6(entry.bonus_reward_raw * bonus_budget / bonus_total_raw)
            } else {
                floor6(entry.bonus_reward_raw)
            };
            materialize_row(
                entry,
                base_reward_crx,
                activation_bonus_crx,
                (base_scale, bonus_scale),
                params,
                season_id,
                now_ms,
            )
        })
        .collect();

    CapOutcome {
        rows,
        base_total_raw,
        bonus_total_raw,
        base_scale,
        bonus_scale,
    }
}

/// Build the stored row for an evaluated wallet from its capped amounts
fn materialize_row(
    entry: &WalletEvaluation,
    base_reward_crx: Decimal,
    activation_bonus_crx: Decimal,
    (base_scale, bonus_scale): (Decimal, Decimal),
    params: &RewardParams,
    season_id: &str,
    now_ms: i64,
) -> WalletRewardRow {
    let total_reward_crx = base_reward_crx + activation_bonus_crx;
    let immediate_claimable_crx = round6(total_reward_crx * params.immediate_pct);
    let streamed_crx = round6((total_reward_crx - immediate_claimable_crx).max(Decimal::ZERO));

    WalletRewardRow {
        address: entry.address.clone(),
        season_id: season_id.to_string(),
        whitelisted: entry.whitelisted,
        activation_qualified: entry.activation_qualified,
        whitelisted_at: Some(entry.whitelisted_at),
        activated_at: entry.activated_at,
        window_ends_at: Some(entry.window_ends_at),
        volume_usd: entry.volume_usd,
        lp_usd: entry.lp_usd,
        base_reward_crx,
        activation_bonus_crx,
        total_reward_crx,
        immediate_claimable_crx,
        streamed_crx,
        stream_start_at: entry.activated_at.or(Some(entry.whitelisted_at)),
        stream_days: params.stream_days,
        immediate_claimed_crx: entry.existing_immediate_claimed_crx,
        streamed_claimed_crx: entry.existing_streamed_claimed_crx,
        claim_count: entry.existing_claim_count,
        claim_version: entry.existing_claim_version,
        last_claim_at: entry.existing_last_claim_at,
        budget_base_scale: base_scale,
        budget_bonus_scale: bonus_scale,
        updated_at: now_ms,
    }
}

/// Row for a wallet the last recalculation has not materialized yet.
///
/// Uses the scale factors of the last summary when there is one, so the
/// preview matches what the next run would most likely allocate.
pub fn preview_row(
    entry: &WalletEvaluation,
    params: &RewardParams,
    season_id: &str,
    last_scales: Option<(Decimal, Decimal)>,
    now_ms: i64,
) -> WalletRewardRow {
    let (base_scale, bonus_scale) = last_scales.unwrap_or((Decimal::ONE, Decimal::ONE));
    materialize_row(
        entry,
        floor6(entry.base_reward_raw * base_scale),
        floor6(entry.bonus_reward_raw * bonus_scale),
        (base_scale, bonus_scale),
        params,
        season_id,
        now_ms,
    )
}

/// Aggregate the capped rows of a season
pub fn build_summary(
    outcome: &CapOutcome,
    params: &RewardParams,
    season_id: &str,
    now_ms: i64,
) -> SeasonSummary {
    let rows = &outcome.rows;
    let base_allocated_crx: Decimal = rows.iter().map(|r| r.base_reward_crx).sum();
    let bonus_allocated_crx: Decimal = rows.iter().map(|r| r.activation_bonus_crx).sum();

    SeasonSummary {
        season_id: season_id.to_string(),
        wallet_count: rows.len() as u64,
        activated_count: rows.iter().filter(|r| r.activation_qualified).count() as u64,
        budget_cap_crx: params.budget_cap_crx,
        base_allocated_crx,
        bonus_allocated_crx,
        total_allocated_crx: base_allocated_crx + bonus_allocated_crx,
        total_immediate_crx: rows.iter().map(|r| r.immediate_claimable_crx).sum(),
        total_streamed_crx: rows.iter().map(|r| r.streamed_crx).sum(),
        immediate_pct: params.immediate_pct,
        stream_days: params.stream_days,
        budget_base_scale: outcome.base_scale,
        budget_bonus_scale: outcome.bonus_scale,
        updated_at: now_ms,
    }
}

/// Claimable view of a position at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimState {
    pub claim_open: bool,
    pub claim_opens_at: i64,
    pub stream_start_at: Option<i64>,
    pub stream_ends_at: Option<i64>,
    pub stream_progress: Decimal,
    pub immediate_claimable_crx: Decimal,
    pub streamed_crx: Decimal,
    pub vested_streamed_crx: Decimal,
    pub immediate_claimed_crx: Decimal,
    pub streamed_claimed_crx: Decimal,
    pub immediate_remaining_crx: Decimal,
    pub streamed_remaining_crx: Decimal,
    pub claimable_now_crx: Decimal,
}

/// Linear vesting of the streamed bucket plus the global claim gate
pub fn get_claim_state(position: &VestingPosition, schedule: ClaimSchedule, now_ms: i64) -> ClaimState {
    let claim_open = now_ms >= schedule.claim_opens_at_ms;
    let stream_duration_ms = i64::from(position.stream_days) * MS_PER_DAY;

    let stream_progress = match position.stream_start_at {
        None => Decimal::ZERO,
        Some(_) if stream_duration_ms <= 0 => Decimal::ONE,
        Some(start) => {
            let elapsed_ms = now_ms.saturating_sub(start).max(0);
            (Decimal::from(elapsed_ms) / Decimal::from(stream_duration_ms)).min(Decimal::ONE)
        }
    };

    let vested_streamed_crx = round6(position.streamed_crx * stream_progress);
    let immediate_remaining_crx = round6(
        (position.immediate_claimable_crx - position.immediate_claimed_crx).max(Decimal::ZERO),
    );
    let streamed_remaining_crx =
        round6((vested_streamed_crx - position.streamed_claimed_crx).max(Decimal::ZERO));
    let claimable_now_crx = if claim_open {
        round6(immediate_remaining_crx + streamed_remaining_crx)
    } else {
        Decimal::ZERO
    };

    ClaimState {
        claim_open,
        claim_opens_at: schedule.claim_opens_at_ms,
        stream_start_at: position.stream_start_at,
        stream_ends_at: position
            .stream_start_at
            .map(|start| start.saturating_add(stream_duration_ms)),
        stream_progress: stream_progress.round_dp(6),
        immediate_claimable_crx: position.immediate_claimable_crx,
        streamed_crx: position.streamed_crx,
        vested_streamed_crx,
        immediate_claimed_crx: position.immediate_claimed_crx,
        streamed_claimed_crx: position.streamed_claimed_crx,
        immediate_remaining_crx,
        streamed_remaining_crx,
        claimable_now_crx,
    }
}

/// What a claim at `now_ms` would pay and the claimed totals to persist
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayout {
    pub claim_total_crx: Decimal,
    pub immediate_crx: Decimal,
    pub streamed_crx: Decimal,
    pub next_immediate_claimed_crx: Decimal,
    pub next_streamed_claimed_crx: Decimal,
    pub state: ClaimState,
}

impl ClaimPayout {
    pub fn is_empty(&self) -> bool {
        self.claim_total_crx <= Decimal::ZERO
    }
}

/// Pay the immediate bucket first, then vested streamed funds. Does not
/// touch storage; the caller persists the `next_*` totals under its lock.
pub fn compute_claim_payout(
    position: &VestingPosition,
    schedule: ClaimSchedule,
    now_ms: i64,
) -> ClaimPayout {
    let state = get_claim_state(position, schedule, now_ms);

    if state.claimable_now_crx <= Decimal::ZERO {
        return ClaimPayout {
            claim_total_crx: Decimal::ZERO,
            immediate_crx: Decimal::ZERO,
            streamed_crx: Decimal::ZERO,
            next_immediate_claimed_crx: position.immediate_claimed_crx,
            next_streamed_claimed_crx: position.streamed_claimed_crx,
            state,
        };
    }

    let budget = state.claimable_now_crx;
    let immediate_crx = round6(state.immediate_remaining_crx.min(budget));
    let streamed_crx = round6(
        state
            .streamed_remaining_crx
            .min((budget - immediate_crx).max(Decimal::ZERO)),
    );

    ClaimPayout {
        claim_total_crx: round6(immediate_crx + streamed_crx),
        immediate_crx,
        streamed_crx,
        next_immediate_claimed_crx: round6(position.immediate_claimed_crx + immediate_crx),
        next_streamed_claimed_crx: round6(position.streamed_claimed_crx + streamed_crx),
        state,
    }
}

/// Sorted-set score for a CRX amount
pub fn leaderboard_score(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn params() -> RewardParams {
        RewardParams {
            budget_cap_crx: d("100000"),
            base_min_crx: d("20"),
            base_max_crx: d("50"),
            bonus_min_crx: d("10"),
            bonus_max_crx: d("30"),
            activation_window_days: 7,
            volume_threshold_usd: d("50"),
            micro_lp_usd: d("10"),
            immediate_pct: d("0.3"),
            stream_days: 30,
        }
    }

    const T0: i64 = 1_700_000_000_000;

    fn wallet(i: usize) -> String {
        format!("0x{:040x}", i)
    }

    fn evaluation(address: &str, base: Decimal, bonus: Decimal) -> WalletEvaluation {
        WalletEvaluation {
            address: address.to_string(),
            whitelisted: true,
            whitelisted_at: T0,
            window_ends_at: T0 + 7 * MS_PER_DAY,
            within_window: true,
            volume_usd: Decimal::ZERO,
            lp_usd: Decimal::ZERO,
            has_swap: false,
            met_volume_threshold: false,
            met_micro_lp: false,
            activation_now: false,
            activated_at: if bonus > Decimal::ZERO { Some(T0) } else { None },
            activation_qualified: bonus > Decimal::ZERO,
            base_reward_raw: base,
            bonus_reward_raw: bonus,
            existing_immediate_claimed_crx: Decimal::ZERO,
            existing_streamed_claimed_crx: Decimal::ZERO,
            existing_claim_count: 0,
            existing_claim_version: 0,
            existing_last_claim_at: None,
        }
    }

    #[test]
    fn test_fnv1a32_reference_vectors() {
        assert_eq!(fnv1a32(""), 0x811c_9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_deterministic_in_range_is_stable_and_bounded() {
        let w = wallet(42);
        let first = deterministic_in_range(&w, d("20"), d("50"), BASE_SALT);
        for _ in 0..10 {
            assert_eq!(deterministic_in_range(&w, d("20"), d("50"), BASE_SALT), first);
        }
        assert!(first >= d("20") && first <= d("50"));
        assert!(first.scale() <= 6);

        // Swapped bounds behave the same
        assert_eq!(deterministic_in_range(&w, d("50"), d("20"), BASE_SALT), first);
    }

    #[test]
    fn test_salts_decorrelate_outputs() {
        let differing = (0..50)
            .map(wallet)
            .filter(|w| {
                deterministic_in_range(w, d("0"), d("1000"), BASE_SALT)
                    != deterministic_in_range(w, d("0"), d("1000"), BONUS_SALT)
            })
            .count();
        assert!(differing >= 45);
    }

    #[test]
    fn test_evaluate_wallet_without_activation() {
        let p = params();
        let presale = PresaleRecord { created_at: Some(T0) };
        let eval = evaluate_wallet(EvaluationInput {
            wallet: &wallet(1),
            presale: Some(&presale),
            points: None,
            existing: None,
            params: &p,
            now_ms: T0 + 1_000,
        });

        assert!(eval.whitelisted);
        assert!(eval.within_window);
        assert!(!eval.activation_qualified);
        assert_eq!(eval.activated_at, None);
        assert_eq!(eval.bonus_reward_raw, Decimal::ZERO);
        assert!(eval.base_reward_raw >= d("20") && eval.base_reward_raw <= d("50"));
        assert_eq!(eval.window_ends_at, T0 + 7 * MS_PER_DAY);
    }

    #[test]
    fn test_activation_requires_swap_and_threshold() {
        let p = params();
        let presale = PresaleRecord { created_at: Some(T0) };
        let run = |volume: &str, lp: &str| {
            let metrics = PointsMetrics {
                volume_usd: d(volume),
                lp_usd: d(lp),
                points: Decimal::ZERO,
            };
            evaluate_wallet(EvaluationInput {
                wallet: &wallet(2),
                presale: Some(&presale),
                points: Some(&metrics),
                existing: None,
                params: &p,
                now_ms: T0 + MS_PER_DAY,
            })
        };

        assert!(run("60", "0").activation_qualified);
        assert!(run("1", "10").activation_qualified);
        assert!(!run("1", "5").activation_qualified);
        // LP without any swap does not count
        assert!(!run("0", "1000").activation_qualified);

        let activated = run("60", "0");
        assert_eq!(activated.activated_at, Some(T0 + MS_PER_DAY));
        assert!(activated.bonus_reward_raw >= d("10") && activated.bonus_reward_raw <= d("30"));
    }

    #[test]
    fn test_activation_is_permanent_across_recomputes() {
        let p = params();
        let presale = PresaleRecord { created_at: Some(T0) };
        let metrics = PointsMetrics {
            volume_usd: d("100"),
            lp_usd: Decimal::ZERO,
            points: Decimal::ZERO,
        };
        let first = evaluate_wallet(EvaluationInput {
            wallet: &wallet(3),
            presale: Some(&presale),
            points: Some(&metrics),
            existing: None,
            params: &p,
            now_ms: T0 + 2 * MS_PER_DAY,
        });
        let row = apply_budget_cap(&[first.clone()], &p, "s1", T0).rows.remove(0);

        // Past the window and no longer meeting criteria
        let second = evaluate_wallet(EvaluationInput {
            wallet: &wallet(3),
            presale: Some(&presale),
            points: None,
            existing: Some(&row),
            params: &p,
            now_ms: T0 + 30 * MS_PER_DAY,
        });
        assert!(!second.within_window);
        assert_eq!(second.activated_at, first.activated_at);
        assert!(second.activation_qualified);
        assert_eq!(second.bonus_reward_raw, first.bonus_reward_raw);
    }

    #[test]
    fn test_activation_outside_window_is_ignored() {
        let p = params();
        let presale = PresaleRecord { created_at: Some(T0) };
        let metrics = PointsMetrics {
            volume_usd: d("100"),
            lp_usd: Decimal::ZERO,
            points: Decimal::ZERO,
        };
        let eval = evaluate_wallet(EvaluationInput {
            wallet: &wallet(4),
            presale: Some(&presale),
            points: Some(&metrics),
            existing: None,
            params: &p,
            now_ms: T0 + 8 * MS_PER_DAY,
        });
        assert!(eval.activation_now);
        assert!(!eval.activation_qualified);
    }

    #[test]
    fn test_claimed_amounts_are_carried_forward() {
        let p = params();
        let existing = WalletRewardRow {
            address: wallet(5),
            whitelisted: true,
            whitelisted_at: Some(T0),
            immediate_claimed_crx: d("4.5"),
            streamed_claimed_crx: d("1.25"),
            claim_count: 2,
            claim_version: 2,
            last_claim_at: Some(T0 + 5),
            ..Default::default()
        };
        let eval = evaluate_wallet(EvaluationInput {
            wallet: &wallet(5),
            presale: None,
            points: None,
            existing: Some(&existing),
            params: &p,
            now_ms: T0 + MS_PER_DAY,
        });
        assert_eq!(eval.whitelisted_at, T0);
        let row = apply_budget_cap(&[eval], &p, "s1", T0).rows.remove(0);
        assert_eq!(row.immediate_claimed_crx, d("4.5"));
        assert_eq!(row.streamed_claimed_crx, d("1.25"));
        assert_eq!(row.claim_count, 2);
        assert_eq!(row.claim_version, 2);
        assert_eq!(row.last_claim_at, Some(T0 + 5));
    }

    #[test]
    fn test_scenario_a_unactivated_wallet_split() {
        let p = params();
        let eval = evaluate_wallet(EvaluationInput {
            wallet: &wallet(6),
            presale: Some(&PresaleRecord { created_at: Some(T0) }),
            points: None,
            existing: None,
            params: &p,
            now_ms: T0,
        });
        let row = apply_budget_cap(&[eval], &p, "s1", T0).rows.remove(0);

        assert_eq!(row.activation_bonus_crx, Decimal::ZERO);
        assert_eq!(row.total_reward_crx, row.base_reward_crx);
        assert_eq!(row.immediate_claimable_crx, round6(row.total_reward_crx * p.immediate_pct));
        assert_eq!(row.immediate_claimable_crx + row.streamed_crx, row.total_reward_crx);
        assert_eq!(row.stream_start_at, Some(T0));
    }

    #[test]
    fn test_scenario_b_over_budget_scales_base_and_drops_bonus() {
        let mut p = params();
        p.budget_cap_crx = d("10000");
        let entries: Vec<WalletEvaluation> = (0..10_000)
            .map(|i| evaluation(&wallet(i), d("30"), if i % 3 == 0 { d("12") } else { Decimal::ZERO }))
            .collect();

        let outcome = apply_budget_cap(&entries, &p, "s1", T0);
        assert_eq!(outcome.base_total_raw, d("300000"));
        assert_eq!(outcome.base_scale, d("10000") / d("300000"));
        assert_eq!(outcome.bonus_scale, Decimal::ZERO);
        for row in &outcome.rows {
            assert_eq!(row.base_reward_crx, d("1"));
            assert_eq!(row.activation_bonus_crx, Decimal::ZERO);
        }
        let summary = build_summary(&outcome, &p, "s1", T0);
        assert_eq!(summary.total_allocated_crx, d("10000"));
        assert_eq!(summary.wallet_count, 10_000);
    }

    #[test]
    fn test_bonus_shares_only_the_leftover_budget() {
        let mut p = params();
        p.budget_cap_crx = d("100");
        let entries = vec![
            evaluation(&wallet(1), d("30"), d("20")),
            evaluation(&wallet(2), d("40"), d("40")),
        ];
        let outcome = apply_budget_cap(&entries, &p, "s1", T0);

        assert_eq!(outcome.base_scale, Decimal::ONE);
        assert_eq!(outcome.bonus_scale, d("0.5"));
        assert_eq!(outcome.rows[0].base_reward_crx, d("30"));
        assert_eq!(outcome.rows[0].activation_bonus_crx, d("10"));
        assert_eq!(outcome.rows[1].activation_bonus_crx, d("20"));
        let summary = build_summary(&outcome, &p, "s1", T0);
        assert_eq!(summary.total_allocated_crx, d("100"));
        assert_eq!(summary.activated_count, 2);
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        let p = params();
        let entries: Vec<WalletEvaluation> = (0..997)
            .map(|i| {
                let w = wallet(i * 7919);
                let base = deterministic_in_range(&w, d("20"), d("50"), BASE_SALT);
                let bonus = if i % 2 == 0 {
                    deterministic_in_range(&w, d("10"), d("30"), BONUS_SALT)
                } else {
                    Decimal::ZERO
                };
                evaluation(&w, base, bonus)
            })
            .collect();

        for cap in ["0", "1", "333.333333", "25000", "40000", "1000000"] {
            let mut p = p.clone();
            p.budget_cap_crx = d(cap);
            let outcome = apply_budget_cap(&entries, &p, "s1", T0);
            let allocated: Decimal = outcome
                .rows
                .iter()
                .map(|r| r.base_reward_crx + r.activation_bonus_crx)
                .sum();
            assert!(allocated <= d(cap), "cap {} allocated {}", cap, allocated);
            for row in &outcome.rows {
                assert_eq!(row.total_reward_crx, row.base_reward_crx + row.activation_bonus_crx);
            }
            if outcome.base_total_raw + outcome.bonus_total_raw > d(cap) {
                // Truncation loses at most one micro-unit per wallet
                let slack = d(cap) - allocated;
                assert!(slack <= Decimal::new(entries.len() as i64 * 2, 6));
            }
        }
    }

    #[test]
    fn test_preview_row_applies_last_scales() {
        let p = params();
        let entry = evaluation(&wallet(9), d("40"), d("20"));
        let row = preview_row(&entry, &p, "s1", Some((d("0.5"), d("0.25"))), T0);
        assert_eq!(row.base_reward_crx, d("20"));
        assert_eq!(row.activation_bonus_crx, d("5"));
        assert_eq!(row.total_reward_crx, d("25"));

        let unscaled = preview_row(&entry, &p, "s1", None, T0);
        assert_eq!(unscaled.total_reward_crx, d("60"));
    }

    fn vesting_row() -> VestingPosition {
        VestingPosition {
            immediate_claimable_crx: d("30"),
            streamed_crx: d("70"),
            stream_start_at: Some(T0),
            stream_days: 30,
            immediate_claimed_crx: Decimal::ZERO,
            streamed_claimed_crx: Decimal::ZERO,
        }
    }

    const OPEN: ClaimSchedule = ClaimSchedule { claim_opens_at_ms: T0 };

    #[test]
    fn test_vesting_is_linear_and_monotonic() {
        let position = vesting_row();
        let duration = 30 * MS_PER_DAY;

        assert_eq!(get_claim_state(&position, OPEN, T0).vested_streamed_crx, Decimal::ZERO);
        assert_eq!(get_claim_state(&position, OPEN, T0 + duration / 2).vested_streamed_crx, d("35"));
        assert_eq!(get_claim_state(&position, OPEN, T0 + duration).vested_streamed_crx, d("70"));
        assert_eq!(get_claim_state(&position, OPEN, T0 + 2 * duration).vested_streamed_crx, d("70"));

        let mut previous = Decimal::ZERO;
        for step in 0..=60 {
            let vested = get_claim_state(&position, OPEN, T0 + step * duration / 60).vested_streamed_crx;
            assert!(vested >= previous);
            previous = vested;
        }
    }

    #[test]
    fn test_extreme_stream_start_saturates() {
        let mut position = vesting_row();
        position.stream_start_at = Some(i64::MIN);
        let state = get_claim_state(&position, OPEN, T0);
        assert_eq!(state.vested_streamed_crx, d("70"));

        position.stream_start_at = Some(i64::MAX);
        let state = get_claim_state(&position, OPEN, i64::MIN);
        assert_eq!(state.vested_streamed_crx, Decimal::ZERO);
    }

    #[test]
    fn test_no_stream_start_means_nothing_vested() {
        let mut position = vesting_row();
        position.stream_start_at = None;
        let state = get_claim_state(&position, OPEN, T0 + 90 * MS_PER_DAY);
        assert_eq!(state.vested_streamed_crx, Decimal::ZERO);
        assert_eq!(state.claimable_now_crx, d("30"));
    }

    #[test]
    fn test_claim_gate_blocks_before_open() {
        let schedule = ClaimSchedule { claim_opens_at_ms: T0 + MS_PER_DAY };
        let state = get_claim_state(&vesting_row(), schedule, T0 + 1);
        assert!(!state.claim_open);
        assert_eq!(state.claimable_now_crx, Decimal::ZERO);
        assert_eq!(state.immediate_remaining_crx, d("30"));
    }

    #[test]
    fn test_payout_pays_immediate_then_streamed() {
        let position = vesting_row();
        let payout = compute_claim_payout(&position, OPEN, T0 + 15 * MS_PER_DAY);
        assert_eq!(payout.immediate_crx, d("30"));
        assert_eq!(payout.streamed_crx, d("35"));
        assert_eq!(payout.claim_total_crx, d("65"));
        assert_eq!(payout.next_immediate_claimed_crx, d("30"));
        assert_eq!(payout.next_streamed_claimed_crx, d("35"));
    }

    #[test]
    fn test_zero_claimable_leaves_totals_unchanged() {
        let mut position = vesting_row();
        position.immediate_claimed_crx = d("30");
        position.streamed_claimed_crx = d("10");
        let payout = compute_claim_payout(&position, OPEN, T0 + 1);
        assert!(payout.is_empty());
        assert_eq!(payout.claim_total_crx, Decimal::ZERO);
        assert_eq!(payout.next_immediate_claimed_crx, d("30"));
        assert_eq!(payout.next_streamed_claimed_crx, d("10"));
    }

    #[test]
    fn test_repeat_claim_at_same_time_pays_nothing() {
        let now = T0 + 10 * MS_PER_DAY;
        let mut position = vesting_row();
        let first = compute_claim_payout(&position, OPEN, now);
        assert!(!first.is_empty());

        position.immediate_claimed_crx = first.next_immediate_claimed_crx;
        position.streamed_claimed_crx = first.next_streamed_claimed_crx;
        let second = compute_claim_payout(&position, OPEN, now);
        assert_eq!(second.claim_total_crx, Decimal::ZERO);

        // More vests later
        let later = compute_claim_payout(&position, OPEN, now + MS_PER_DAY);
        assert!(later.streamed_crx > Decimal::ZERO);
        assert_eq!(later.immediate_crx, Decimal::ZERO);
    }
}
