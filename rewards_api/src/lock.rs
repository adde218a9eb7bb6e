//! Distributed mutual exclusion on top of the ledger store
//!
//! A lock is a single key holding a random token with a TTL. Acquisition is
//! `SET NX EX` with a bounded number of retries; release is an atomic
//! compare-and-delete so a holder can never remove a lock that expired and
//! was re-acquired by somebody else. Stores without atomic scripting never
//! release early: the TTL is the only way out.

use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{KvStore, StoreResult};

/// Lock acquisition parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub ttl_seconds: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl LockOptions {
    /// Per-wallet claim lock: short TTL, a couple of quick retries
    pub const CLAIM: LockOptions = LockOptions {
        ttl_seconds: 15,
        retries: 2,
        retry_delay_ms: 120,
    };

    /// Season recalculation lock: no waiting, long TTL
    pub const RECALC: LockOptions = LockOptions {
        ttl_seconds: 300,
        retries: 0,
        retry_delay_ms: 0,
    };
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::CLAIM
    }
}

/// Try to take `key`. `Ok(None)` means the lock is held by someone else for
/// every attempt; `Err` means the store itself could not be reached.
pub async fn acquire(
    store: &dyn KvStore,
    key: &str,
    options: LockOptions,
) -> StoreResult<Option<String>> {
    let token = Uuid::new_v4().to_string();
    let attempts = options.retries.saturating_add(1);

    for attempt in 0..attempts {
        if store.set_nx_ex(key, &token, options.ttl_seconds).await? {
            debug!(lock = %key, attempt, "Lock acquired");
            return Ok(Some(token));
        }
        if attempt + 1 < attempts && options.retry_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.retry_delay_ms)).await;
        }
    }

    debug!(lock = %key, attempts, "Lock busy");
    Ok(None)
}

/// Release `key` if it still holds `token`. Returns whether it was deleted.
pub async fn release(store: &dyn KvStore, key: &str, token: &str) -> StoreResult<bool> {
    match store.atomic() {
        Some(atomic) => {
            let released = atomic.compare_and_delete(key, token).await?;
            if !released {
                warn!(lock = %key, "Lock was no longer held by this token at release");
            }
            Ok(released)
        }
        None => {
            warn!(
                lock = %key,
                "Store has no atomic compare-and-delete; leaving lock to expire"
            );
            Ok(false)
        }
    }
}
