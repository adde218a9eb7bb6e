//! Process-scoped cache
//!
//! Created once at startup and injected through `AppState`. Holds the
//! last-known-good season summaries used when the store is unreachable and
//! the per-address claim rate limiter. Nothing here is persisted; losing it
//! on restart is fine.

use governor::{
    clock::{Clock as _, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::RwLock;

use crate::reward_math::SeasonSummary;

/// Above this many tracked addresses, stale limiter entries are dropped
const LIMITER_RETAIN_THRESHOLD: usize = 10_000;

/// Wall clock in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock
#[derive(Debug, Default, Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now_ms)))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary as last read from, or written to, the store
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSummary {
    pub summary: SeasonSummary,
    pub updated_at: Option<i64>,
}

pub struct ProcessCache {
    summaries: RwLock<HashMap<String, CachedSummary>>,
    claim_limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl ProcessCache {
    pub fn new(claims_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(claims_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            summaries: RwLock::new(HashMap::new()),
            claim_limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            clock: DefaultClock::default(),
        }
    }

    pub async fn remember_summary(&self, season_id: &str, entry: CachedSummary) {
        self.summaries
            .write()
            .await
            .insert(season_id.to_string(), entry);
    }

    pub async fn last_summary(&self, season_id: &str) -> Option<CachedSummary> {
        self.summaries.read().await.get(season_id).cloned()
    }

    /// `Err(retry_after)` when `key` has used up its claim attempts
    pub fn check_claim_rate(&self, key: &str) -> Result<(), Duration> {
        if self.claim_limiter.len() > LIMITER_RETAIN_THRESHOLD {
            self.claim_limiter.retain_recent();
        }
        self.claim_limiter
            .check_key(&key.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl Default for ProcessCache {
    fn default() -> Self {
        Self::new(10)
    }
}
