//! Shared harness: an in-process router over a memory store and a manual clock

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tower::ServiceExt;

use currentx_rewards_api::{
    build_router,
    config::Config,
    ledger::LedgerKeys,
    process_cache::ManualClock,
    reward_math::MS_PER_DAY,
    signature::{
        address_from_public_key, personal_message_hash, points_claim_message,
        whitelist_claim_message,
    },
    store::{AtomicStore, KvCommand, KvStore, MemoryStore, StoreError, StoreResult},
    AppState,
};

pub const T0: i64 = 1_750_000_000_000;
pub const CLAIM_OPENS_AT: i64 = T0 + 10 * MS_PER_DAY;
pub const ADMIN_SECRET: &str = "admin-secret";
pub const CRON_SECRET: &str = "cron-secret";
pub const WL_SEASON: &str = "wl-1";
pub const POINTS_SEASON: &str = "pts-1";

pub fn base_env() -> Vec<(&'static str, String)> {
    vec![
        ("WHITELIST_SEASON_ID", WL_SEASON.to_string()),
        ("WHITELIST_CLAIM_OPENS_AT", CLAIM_OPENS_AT.to_string()),
        ("POINTS_SEASON_ID", POINTS_SEASON.to_string()),
        ("POINTS_CLAIM_OPENS_AT", CLAIM_OPENS_AT.to_string()),
        ("POINTS_REWARD_POOL_CRX", "1000".to_string()),
        ("POINTS_TOP_N", "3".to_string()),
        ("REWARDS_ADMIN_SECRET", ADMIN_SECRET.to_string()),
        ("CRON_SECRET", CRON_SECRET.to_string()),
        ("CLAIM_RATE_LIMIT_PER_MINUTE", "600".to_string()),
    ]
}

/// Memory store whose hash field updates can be switched to fail.
/// Batched writes are unaffected, so recalculations still land.
#[derive(Clone, Default)]
pub struct FlakyHashWrites {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl KvStore for FlakyHashWrites {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.inner.del(key).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<bool> {
        self.inner.set_nx_ex(key, value, ttl_seconds).await
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.inner.hgetall(key).await
    }

    async fn hgetall_many(&self, keys: &[String]) -> StoreResult<Vec<HashMap<String, String>>> {
        self.inner.hgetall_many(keys).await
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("READONLY replica".to_string()));
        }
        self.inner.hset_multiple(key, fields).await
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.inner.zrevrange_withscores(key, start, stop).await
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        self.inner.zrevrank(key, member).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.inner.zcard(key).await
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.inner.scan_match(cursor, pattern, count).await
    }

    async fn exec_batch(&self, commands: Vec<KvCommand>) -> StoreResult<()> {
        self.inner.exec_batch(commands).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn atomic(&self) -> Option<&dyn AtomicStore> {
        self.inner.atomic()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    hash_writes: Arc<AtomicBool>,
    pub clock: ManualClock,
    pub keys: LedgerKeys,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Base environment with `overrides` applied on top; an empty value unsets
    pub fn with_env(overrides: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = base_env()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        let keys = LedgerKeys::new(config.server.key_prefix.clone());

        let flaky = FlakyHashWrites::default();
        let store = flaky.inner.clone();
        let hash_writes = flaky.failing.clone();
        let clock = ManualClock::new(T0 + MS_PER_DAY);
        let state = AppState::new(config, Arc::new(flaky))
            .unwrap()
            .with_clock(Arc::new(clock.clone()));

        Self {
            router: build_router(state),
            store,
            hash_writes,
            clock,
            keys,
        }
    }

    /// Make the app's hash field updates fail; seeding through `store` still works
    pub fn fail_hash_writes(&self, failing: bool) {
        self.hash_writes.store(failing, Ordering::SeqCst);
    }

    pub async fn whitelist(&self, address: &str, created_at: i64) {
        self.store
            .hset_multiple(
                &self.keys.whitelist_entry(address),
                &[("createdAt".to_string(), created_at.to_string())],
            )
            .await
            .unwrap();
    }

    pub async fn trade(&self, address: &str, volume_usd: &str, lp_usd: &str) {
        self.store
            .hset_multiple(
                &self.keys.points_wallet(POINTS_SEASON, address),
                &[
                    ("volumeUsd".to_string(), volume_usd.to_string()),
                    ("lpUsd".to_string(), lp_usd.to_string()),
                    ("points".to_string(), "0".to_string()),
                ],
            )
            .await
            .unwrap();
    }

    pub async fn rank_points(&self, ranking: &[(&str, f64)]) {
        self.store
            .exec_batch(vec![KvCommand::ZReplace {
                key: self.keys.points_leaderboard(POINTS_SEASON),
                members: ranking.iter().map(|(a, p)| (a.to_string(), *p)).collect(),
            }])
            .await
            .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn operator(&self, method: Method, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn recalc(&self) -> (StatusCode, Value) {
        self.operator(Method::POST, "/recalc", ADMIN_SECRET).await
    }
}

/// A wallet that can sign claim messages
pub struct TestWallet {
    secret: SecretKey,
    pub address: String,
}

impl TestWallet {
    pub fn new(seed: u8) -> Self {
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Self {
            secret,
            address: address_from_public_key(&public),
        }
    }

    pub fn sign(&self, message: &str) -> String {
        let msg = Message::from_slice(&personal_message_hash(message)).unwrap();
        let (recovery_id, compact) = Secp256k1::new()
            .sign_ecdsa_recoverable(&msg, &self.secret)
            .serialize_compact();
        let mut bytes = compact.to_vec();
        bytes.push(recovery_id.to_i32() as u8 + 27);
        format!("0x{}", hex::encode(bytes))
    }

    pub fn whitelist_claim(&self, issued_at: i64) -> Value {
        let message = whitelist_claim_message(WL_SEASON, &self.address, issued_at);
        json!({
            "address": self.address,
            "signature": self.sign(&message),
            "issuedAt": issued_at,
        })
    }

    pub fn points_claim(&self, issued_at: i64) -> Value {
        let message = points_claim_message(POINTS_SEASON, &self.address, issued_at);
        json!({
            "address": self.address,
            "signature": self.sign(&message),
            "issuedAt": issued_at,
        })
    }
}

/// Amounts are serialized as JSON floats
pub fn dec(value: &Value) -> Decimal {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => panic!("not a decimal: {}", other),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap()
}
