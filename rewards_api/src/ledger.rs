//! Reward ledger persistence
//!
//! Key layout, hash codecs for reward rows and the read/write paths used by
//! the recalculation job, claims and queries.

use rust_decimal::{prelude::FromPrimitive, Decimal};
use std::{
    collections::{BTreeSet, HashMap},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    points::{PointsClaimRecord, PointsSnapshot},
    reward_math::{leaderboard_score, PointsMetrics, PresaleRecord, SeasonSummary, WalletRewardRow},
    signature::normalize_address,
    store::{KvCommand, KvStore, StoreError, StoreResult},
};

/// SCAN page size hint
const SCAN_COUNT: usize = 500;
/// Upper bound on SCAN rounds before giving up on a misbehaving store
const MAX_SCAN_ROUNDS: usize = 100_000;
/// Wallets per pipelined read
const READ_BATCH: usize = 200;

/// Namespaced key builder
#[derive(Debug, Clone)]
pub struct LedgerKeys {
    prefix: String,
}

impl LedgerKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn whitelist_entry(&self, address: &str) -> String {
        format!("{}:whitelist:entry:{}", self.prefix, address)
    }

    pub fn whitelist_entry_pattern(&self) -> String {
        format!("{}:whitelist:entry:*", self.prefix)
    }

    fn whitelist_entry_prefix(&self) -> String {
        format!("{}:whitelist:entry:", self.prefix)
    }

    pub fn points_wallet(&self, season_id: &str, address: &str) -> String {
        format!("{}:points:{}:wallet:{}", self.prefix, season_id, address)
    }

    pub fn reward_row(&self, season_id: &str, address: &str) -> String {
        format!("{}:wl-rewards:{}:user:{}", self.prefix, season_id, address)
    }

    pub fn leaderboard(&self, season_id: &str) -> String {
        format!("{}:wl-rewards:{}:leaderboard", self.prefix, season_id)
    }

    pub fn summary(&self, season_id: &str) -> String {
        format!("{}:wl-rewards:{}:summary", self.prefix, season_id)
    }

    pub fn updated_at(&self, season_id: &str) -> String {
        format!("{}:wl-rewards:{}:updated-at", self.prefix, season_id)
    }

    pub fn claim_lock(&self, season_id: &str, address: &str) -> String {
        format!("{}:lock:wl-claim:{}:{}", self.prefix, season_id, address)
    }

    pub fn recalc_lock(&self, season_id: &str) -> String {
        format!("{}:lock:wl-recalc:{}", self.prefix, season_id)
    }

    pub fn points_leaderboard(&self, season_id: &str) -> String {
        format!("{}:points:{}:leaderboard", self.prefix, season_id)
    }

    pub fn points_claim(&self, season_id: &str, address: &str) -> String {
        format!("{}:points:{}:claim:{}", self.prefix, season_id, address)
    }

    pub fn points_claim_lock(&self, season_id: &str, address: &str) -> String {
        format!("{}:lock:points-claim:{}:{}", self.prefix, season_id, address)
    }

    pub fn points_final_rewards(&self, season_id: &str) -> String {
        format!("{}:points:{}:final-rewards", self.prefix, season_id)
    }

    pub fn points_finalize_lock(&self, season_id: &str) -> String {
        format!("{}:lock:points-finalize:{}", self.prefix, season_id)
    }
}

/// Typed reads over a raw hash
pub(crate) struct Fields<'a>(pub(crate) &'a HashMap<String, String>);

impl<'a> Fields<'a> {
    fn raw(&self, name: &str) -> Option<&'a str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn invalid(name: &str, value: &str) -> StoreError {
        StoreError::Serialization(format!("field {} has invalid value {:?}", name, value))
    }

    pub(crate) fn string(&self, name: &str) -> String {
        self.raw(name).unwrap_or_default().to_string()
    }

    pub(crate) fn decimal(&self, name: &str) -> StoreResult<Decimal> {
        match self.raw(name) {
            None => Ok(Decimal::ZERO),
            Some(v) => Decimal::from_str(v)
                .or_else(|_| Decimal::from_scientific(v))
                .map_err(|_| Self::invalid(name, v)),
        }
    }

    pub(crate) fn opt_i64(&self, name: &str) -> StoreResult<Option<i64>> {
        match self.raw(name) {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| Self::invalid(name, v)),
        }
    }

    pub(crate) fn u64(&self, name: &str) -> StoreResult<u64> {
        match self.raw(name) {
            None => Ok(0),
            Some(v) => v.parse().map_err(|_| Self::invalid(name, v)),
        }
    }

    pub(crate) fn u32(&self, name: &str) -> StoreResult<u32> {
        match self.raw(name) {
            None => Ok(0),
            Some(v) => v.parse().map_err(|_| Self::invalid(name, v)),
        }
    }

    pub(crate) fn bool(&self, name: &str) -> bool {
        matches!(self.raw(name), Some("true") | Some("1"))
    }

    /// Timestamp stored either as epoch milliseconds or RFC 3339
    pub(crate) fn timestamp(&self, name: &str) -> Option<i64> {
        let v = self.raw(name)?;
        v.parse::<i64>().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(v)
                .ok()
                .map(|dt| dt.timestamp_millis())
        })
    }
}

pub(crate) fn push_opt(fields: &mut Vec<(String, String)>, name: &str, value: Option<i64>) {
    if let Some(v) = value {
        fields.push((name.to_string(), v.to_string()));
    }
}

impl WalletRewardRow {
    /// Flatten into hash fields. `None` timestamps are omitted.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("address".to_string(), self.address.clone()),
            ("seasonId".to_string(), self.season_id.clone()),
            ("whitelisted".to_string(), self.whitelisted.to_string()),
            ("activationQualified".to_string(), self.activation_qualified.to_string()),
            ("volumeUsd".to_string(), self.volume_usd.to_string()),
            ("lpUsd".to_string(), self.lp_usd.to_string()),
            ("baseRewardCrx".to_string(), self.base_reward_crx.to_string()),
            ("activationBonusCrx".to_string(), self.activation_bonus_crx.to_string()),
            ("totalRewardCrx".to_string(), self.total_reward_crx.to_string()),
            ("immediateClaimableCrx".to_string(), self.immediate_claimable_crx.to_string()),
            ("streamedCrx".to_string(), self.streamed_crx.to_string()),
            ("streamDays".to_string(), self.stream_days.to_string()),
            ("immediateClaimedCrx".to_string(), self.immediate_claimed_crx.to_string()),
            ("streamedClaimedCrx".to_string(), self.streamed_claimed_crx.to_string()),
            ("claimCount".to_string(), self.claim_count.to_string()),
            ("claimVersion".to_string(), self.claim_version.to_string()),
            ("budgetBaseScale".to_string(), self.budget_base_scale.to_string()),
            ("budgetBonusScale".to_string(), self.budget_bonus_scale.to_string()),
            ("updatedAt".to_string(), self.updated_at.to_string()),
        ];
        push_opt(&mut fields, "whitelistedAt", self.whitelisted_at);
        push_opt(&mut fields, "activatedAt", self.activated_at);
        push_opt(&mut fields, "windowEndsAt", self.window_ends_at);
        push_opt(&mut fields, "streamStartAt", self.stream_start_at);
        push_opt(&mut fields, "lastClaimAt", self.last_claim_at);
        fields
    }

    /// Decode a stored hash; `Ok(None)` for an empty (missing) hash
    pub fn from_fields(raw: &HashMap<String, String>) -> StoreResult<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let f = Fields(raw);
        Ok(Some(WalletRewardRow {
            address: f.string("address"),
            season_id: f.string("seasonId"),
            whitelisted: f.bool("whitelisted"),
            activation_qualified: f.bool("activationQualified"),
            whitelisted_at: f.opt_i64("whitelistedAt")?,
            activated_at: f.opt_i64("activatedAt")?,
            window_ends_at: f.opt_i64("windowEndsAt")?,
            volume_usd: f.decimal("volumeUsd")?,
            lp_usd: f.decimal("lpUsd")?,
            base_reward_crx: f.decimal("baseRewardCrx")?,
            activation_bonus_crx: f.decimal("activationBonusCrx")?,
            total_reward_crx: f.decimal("totalRewardCrx")?,
            immediate_claimable_crx: f.decimal("immediateClaimableCrx")?,
            streamed_crx: f.decimal("streamedCrx")?,
            stream_start_at: f.opt_i64("streamStartAt")?,
            stream_days: f.u32("streamDays")?,
            immediate_claimed_crx: f.decimal("immediateClaimedCrx")?,
            streamed_claimed_crx: f.decimal("streamedClaimedCrx")?,
            claim_count: f.u64("claimCount")?,
            claim_version: f.u64("claimVersion")?,
            last_claim_at: f.opt_i64("lastClaimAt")?,
            budget_base_scale: f.decimal("budgetBaseScale")?,
            budget_bonus_scale: f.decimal("budgetBonusScale")?,
            updated_at: f.opt_i64("updatedAt")?.unwrap_or_default(),
        }))
    }
}

fn presale_from_fields(raw: &HashMap<String, String>) -> Option<PresaleRecord> {
    if raw.is_empty() {
        return None;
    }
    let f = Fields(raw);
    Some(PresaleRecord {
        created_at: f.timestamp("createdAt").or_else(|| f.timestamp("timestamp")),
    })
}

fn metrics_from_fields(raw: &HashMap<String, String>) -> StoreResult<Option<PointsMetrics>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let f = Fields(raw);
    Ok(Some(PointsMetrics {
        volume_usd: f.decimal("volumeUsd")?,
        lp_usd: f.decimal("lpUsd")?,
        points: f.decimal("points")?,
    }))
}

/// Everything stored about one wallet that a recalculation reads
#[derive(Debug, Clone, Default)]
pub struct WalletInputs {
    pub address: String,
    pub presale: Option<PresaleRecord>,
    pub points: Option<PointsMetrics>,
    pub existing: Option<WalletRewardRow>,
}

/// Claimed-amount fields written by a successful claim
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimUpdate {
    pub immediate_claimed_crx: Decimal,
    pub streamed_claimed_crx: Decimal,
    pub claim_count: u64,
    pub claim_version: u64,
    pub last_claim_at: i64,
}

impl ClaimUpdate {
    pub(crate) fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("immediateClaimedCrx".to_string(), self.immediate_claimed_crx.to_string()),
            ("streamedClaimedCrx".to_string(), self.streamed_claimed_crx.to_string()),
            ("claimCount".to_string(), self.claim_count.to_string()),
            ("claimVersion".to_string(), self.claim_version.to_string()),
            ("lastClaimAt".to_string(), self.last_claim_at.to_string()),
        ]
    }
}

/// Read/write access to the reward ledger
#[derive(Clone)]
pub struct RewardLedger {
    store: Arc<dyn KvStore>,
    keys: LedgerKeys,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn KvStore>, keys: LedgerKeys) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }

    /// Every whitelisted wallet, deduplicated and sorted
    pub async fn scan_whitelisted_wallets(&self) -> StoreResult<Vec<String>> {
        let pattern = self.keys.whitelist_entry_pattern();
        let prefix = self.keys.whitelist_entry_prefix();
        let mut wallets = BTreeSet::new();
        let mut cursor = 0u64;
        let mut rounds = 0usize;

        loop {
            let (next, keys) = self.store.scan_match(cursor, &pattern, SCAN_COUNT).await?;
            for key in keys {
                match key.strip_prefix(&prefix).and_then(normalize_address) {
                    Some(address) => {
                        wallets.insert(address);
                    }
                    None => debug!("Skipping malformed whitelist key: {}", key),
                }
            }

            rounds += 1;
            if next == 0 {
                break;
            }
            if rounds >= MAX_SCAN_ROUNDS {
                warn!(rounds, "Whitelist scan stopped at round limit; cursor never returned to 0");
                break;
            }
            cursor = next;
        }

        debug!(wallets = wallets.len(), rounds, "Whitelist scan complete");
        Ok(wallets.into_iter().collect())
    }

    /// Pipelined reads of presale, metrics and current reward row per wallet
    pub async fn load_wallet_inputs(
        &self,
        season_id: &str,
        metrics_season_id: &str,
        wallets: &[String],
    ) -> StoreResult<Vec<WalletInputs>> {
        let mut inputs = Vec::with_capacity(wallets.len());

        for chunk in wallets.chunks(READ_BATCH) {
            let mut keys = Vec::with_capacity(chunk.len() * 3);
            for address in chunk {
                keys.push(self.keys.whitelist_entry(address));
                keys.push(self.keys.points_wallet(metrics_season_id, address));
                keys.push(self.keys.reward_row(season_id, address));
            }

            let hashes = self.store.hgetall_many(&keys).await?;
            if hashes.len() != keys.len() {
                return Err(StoreError::Backend(format!(
                    "pipelined read returned {} results for {} keys",
                    hashes.len(),
                    keys.len()
                )));
            }

            for (address, triple) in chunk.iter().zip(hashes.chunks(3)) {
                inputs.push(WalletInputs {
                    address: address.clone(),
                    presale: presale_from_fields(&triple[0]),
                    points: metrics_from_fields(&triple[1])?,
                    existing: WalletRewardRow::from_fields(&triple[2])?,
                });
            }
        }

        Ok(inputs)
    }

    pub async fn is_whitelisted(&self, address: &str) -> StoreResult<Option<PresaleRecord>> {
        let raw = self.store.hgetall(&self.keys.whitelist_entry(address)).await?;
        Ok(presale_from_fields(&raw))
    }

    pub async fn load_points_metrics(
        &self,
        season_id: &str,
        address: &str,
    ) -> StoreResult<Option<PointsMetrics>> {
        let raw = self
            .store
            .hgetall(&self.keys.points_wallet(season_id, address))
            .await?;
        metrics_from_fields(&raw)
    }

    pub async fn load_reward_row(
        &self,
        season_id: &str,
        address: &str,
    ) -> StoreResult<Option<WalletRewardRow>> {
        let raw = self
            .store
            .hgetall(&self.keys.reward_row(season_id, address))
            .await?;
        WalletRewardRow::from_fields(&raw)
    }

    pub async fn load_summary(&self, season_id: &str) -> StoreResult<Option<SeasonSummary>> {
        match self.store.get(&self.keys.summary(season_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn load_updated_at(&self, season_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .store
            .get(&self.keys.updated_at(season_id))
            .await?
            .and_then(|v| v.parse().ok()))
    }

    /// Zero-based rank on the reward leaderboard
    pub async fn leaderboard_rank(&self, season_id: &str, address: &str) -> StoreResult<Option<u64>> {
        self.store
            .zrevrank(&self.keys.leaderboard(season_id), address)
            .await
    }

    /// Wallets on the reward leaderboard
    pub async fn leaderboard_size(&self, season_id: &str) -> StoreResult<u64> {
        self.store.zcard(&self.keys.leaderboard(season_id)).await
    }

    /// Replace rows, leaderboard, summary and timestamp in one transaction
    pub async fn persist_recalculation(
        &self,
        season_id: &str,
        rows: &[WalletRewardRow],
        summary: &SeasonSummary,
        now_ms: i64,
    ) -> StoreResult<()> {
        let mut commands = Vec::with_capacity(rows.len() + 3);
        commands.push(KvCommand::ZReplace {
            key: self.keys.leaderboard(season_id),
            members: rows
                .iter()
                .map(|row| (row.address.clone(), leaderboard_score(row.total_reward_crx)))
                .collect(),
        });
        for row in rows {
            commands.push(KvCommand::HReplace {
                key: self.keys.reward_row(season_id, &row.address),
                fields: row.to_fields(),
            });
        }
        commands.push(KvCommand::Set {
            key: self.keys.summary(season_id),
            value: serde_json::to_string(summary)?,
        });
        commands.push(KvCommand::Set {
            key: self.keys.updated_at(season_id),
            value: now_ms.to_string(),
        });

        self.store.exec_batch(commands).await?;
        info!(
            season = %season_id,
            wallets = rows.len(),
            "Persisted recalculated reward ledger"
        );
        Ok(())
    }

    /// Write only the claim fields of a reward row
    pub async fn persist_claim(
        &self,
        season_id: &str,
        address: &str,
        update: &ClaimUpdate,
    ) -> StoreResult<()> {
        self.store
            .hset_multiple(&self.keys.reward_row(season_id, address), &update.to_fields())
            .await
    }

    /// Full points ranking, highest first
    pub async fn load_points_ranking(&self, season_id: &str) -> StoreResult<Vec<(String, Decimal)>> {
        let members = self
            .store
            .zrevrange_withscores(&self.keys.points_leaderboard(season_id), 0, -1)
            .await?;
        Ok(members
            .into_iter()
            .map(|(address, score)| {
                let points = Decimal::from_f64(score).unwrap_or_default();
                (address.to_lowercase(), points)
            })
            .collect())
    }

    pub async fn load_points_claim(
        &self,
        season_id: &str,
        address: &str,
    ) -> StoreResult<Option<PointsClaimRecord>> {
        let raw = self
            .store
            .hgetall(&self.keys.points_claim(season_id, address))
            .await?;
        PointsClaimRecord::from_fields(&raw)
    }

    pub async fn persist_points_claim(
        &self,
        season_id: &str,
        record: &PointsClaimRecord,
    ) -> StoreResult<()> {
        self.store
            .exec_batch(vec![KvCommand::HReplace {
                key: self.keys.points_claim(season_id, &record.address),
                fields: record.to_fields(),
            }])
            .await
    }

    pub async fn load_points_snapshot(&self, season_id: &str) -> StoreResult<Option<PointsSnapshot>> {
        match self.store.get(&self.keys.points_final_rewards(season_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn store_points_snapshot(
        &self,
        season_id: &str,
        snapshot: &PointsSnapshot,
    ) -> StoreResult<()> {
        self.store
            .set(
                &self.keys.points_final_rewards(season_id),
                &serde_json::to_string(snapshot)?,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> (Arc<MemoryStore>, RewardLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = RewardLedger::new(store.clone(), LedgerKeys::new("cx"));
        (store, ledger)
    }

    fn addr(i: u32) -> String {
        format!("0x{:040x}", i)
    }

    #[test]
    fn test_key_layout() {
        let keys = LedgerKeys::new("cx");
        assert_eq!(keys.whitelist_entry("0xab"), "cx:whitelist:entry:0xab");
        assert_eq!(keys.reward_row("s1", "0xab"), "cx:wl-rewards:s1:user:0xab");
        assert_eq!(keys.leaderboard("s1"), "cx:wl-rewards:s1:leaderboard");
        assert_eq!(keys.claim_lock("s1", "0xab"), "cx:lock:wl-claim:s1:0xab");
        assert_eq!(keys.recalc_lock("s1"), "cx:lock:wl-recalc:s1");
        assert_eq!(keys.points_final_rewards("p1"), "cx:points:p1:final-rewards");
    }

    #[test]
    fn test_row_fields_survive_storage() {
        let row = WalletRewardRow {
            address: addr(1),
            season_id: "s1".to_string(),
            whitelisted: true,
            activation_qualified: true,
            whitelisted_at: Some(10),
            activated_at: Some(20),
            base_reward_crx: Decimal::new(12_345_678, 6),
            total_reward_crx: Decimal::new(12_345_678, 6),
            stream_days: 30,
            claim_count: 3,
            ..Default::default()
        };
        let raw: HashMap<String, String> = row.to_fields().into_iter().collect();
        assert!(!raw.contains_key("lastClaimAt"));
        assert_eq!(WalletRewardRow::from_fields(&raw).unwrap(), Some(row));
        assert_eq!(WalletRewardRow::from_fields(&HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_corrupt_row_is_a_serialization_error() {
        let raw: HashMap<String, String> =
            [("address".to_string(), addr(1)), ("immediateClaimedCrx".to_string(), "abc".to_string())]
                .into_iter()
                .collect();
        assert!(matches!(
            WalletRewardRow::from_fields(&raw),
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_dedupes_and_skips_malformed_keys() {
        let (store, ledger) = ledger();
        for i in 0..1200 {
            store
                .hset_multiple(
                    &ledger.keys().whitelist_entry(&addr(i)),
                    &[("createdAt".to_string(), "1000".to_string())],
                )
                .await
                .unwrap();
        }
        store
            .hset_multiple("cx:whitelist:entry:not-an-address", &[("x".to_string(), "1".to_string())])
            .await
            .unwrap();

        let wallets = ledger.scan_whitelisted_wallets().await.unwrap();
        assert_eq!(wallets.len(), 1200);
        assert_eq!(wallets[0], addr(0));
    }

    #[tokio::test]
    async fn test_load_wallet_inputs_reads_all_sources() {
        let (store, ledger) = ledger();
        let a = addr(7);
        store
            .hset_multiple(
                &ledger.keys().whitelist_entry(&a),
                &[("createdAt".to_string(), "2024-01-01T00:00:00Z".to_string())],
            )
            .await
            .unwrap();
        store
            .hset_multiple(
                &ledger.keys().points_wallet("p1", &a),
                &[
                    ("volumeUsd".to_string(), "75.5".to_string()),
                    ("lpUsd".to_string(), "3".to_string()),
                ],
            )
            .await
            .unwrap();

        let inputs = ledger
            .load_wallet_inputs("s1", "p1", &[a.clone(), addr(8)])
            .await
            .unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].presale.as_ref().unwrap().created_at, Some(1_704_067_200_000));
        assert_eq!(inputs[0].points.as_ref().unwrap().volume_usd, Decimal::new(755, 1));
        assert!(inputs[0].existing.is_none());
        assert!(inputs[1].presale.is_none());
    }

    #[tokio::test]
    async fn test_persist_claim_touches_only_claim_fields() {
        let (_store, ledger) = ledger();
        let row = WalletRewardRow {
            address: addr(2),
            season_id: "s1".to_string(),
            total_reward_crx: Decimal::from(40),
            ..Default::default()
        };
        let summary = SeasonSummary {
            season_id: "s1".to_string(),
            wallet_count: 1,
            budget_base_scale: Decimal::from(5) / Decimal::from(6),
            budget_bonus_scale: Decimal::ZERO,
            ..Default::default()
        };
        ledger
            .persist_recalculation("s1", &[row.clone()], &summary, 99)
            .await
            .unwrap();

        ledger
            .persist_claim(
                "s1",
                &row.address,
                &ClaimUpdate {
                    immediate_claimed_crx: Decimal::from(12),
                    streamed_claimed_crx: Decimal::ZERO,
                    claim_count: 1,
                    claim_version: 1,
                    last_claim_at: 500,
                },
            )
            .await
            .unwrap();

        let stored = ledger.load_reward_row("s1", &row.address).await.unwrap().unwrap();
        assert_eq!(stored.total_reward_crx, Decimal::from(40));
        assert_eq!(stored.immediate_claimed_crx, Decimal::from(12));
        assert_eq!(stored.claim_version, 1);
        assert_eq!(stored.last_claim_at, Some(500));
        assert_eq!(ledger.load_summary("s1").await.unwrap(), Some(summary));
        assert_eq!(ledger.load_updated_at("s1").await.unwrap(), Some(99));
        assert_eq!(ledger.leaderboard_rank("s1", &row.address).await.unwrap(), Some(0));
        assert_eq!(ledger.leaderboard_size("s1").await.unwrap(), 1);
    }
}
