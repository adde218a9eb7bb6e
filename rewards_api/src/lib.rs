//! CurrentX rewards API
//!
//! Whitelist and points-leaderboard reward ledger: deterministic allocation
//! under a season budget, linear vesting and signed, lock-protected claims,
//! all stored in a key-value store (Redis in production).

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod authorizer;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod lock;
pub mod metrics;
pub mod points;
pub mod process_cache;
pub mod recalc;
pub mod reward_math;
pub mod signature;
pub mod store;
pub mod tracing_logger;
pub mod validation;

use crate::{
    config::Config,
    ledger::{LedgerKeys, RewardLedger},
    metrics::RewardsMetrics,
    process_cache::{Clock, ProcessCache, SystemClock},
    store::KvStore,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: RewardLedger,
    pub cache: Arc<ProcessCache>,
    pub metrics: Arc<RewardsMetrics>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn KvStore>) -> Result<Self, prometheus::Error> {
        let keys = LedgerKeys::new(config.server.key_prefix.clone());
        let cache = ProcessCache::new(config.server.claim_rate_limit_per_minute);
        Ok(Self {
            ledger: RewardLedger::new(store, keys),
            cache: Arc::new(cache),
            metrics: Arc::new(RewardsMetrics::new()?),
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Season whose points rows feed whitelist activation
    pub fn metrics_season_id(&self, whitelist_season_id: &str) -> String {
        self.config
            .points
            .season_id
            .clone()
            .unwrap_or_else(|| whitelist_season_id.to_string())
    }
}

/// All routes with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::queries::health))
        .route("/metrics", get(handlers::queries::metrics))
        // Whitelist rewards
        .route("/summary", get(handlers::queries::summary))
        .route("/user", get(handlers::queries::user))
        .route(
            "/dry-run",
            get(handlers::queries::dry_run).post(handlers::queries::dry_run),
        )
        .route("/claim", post(handlers::claim::claim))
        .route("/recalc", post(handlers::recalc::recalc))
        .route("/cron/recalc", get(handlers::recalc::recalc))
        // Points leaderboard rewards
        .route("/points/summary", get(handlers::points::summary))
        .route("/points/user", get(handlers::points::user))
        .route("/points/claim", post(handlers::points::claim))
        .route("/points/finalize", post(handlers::points::finalize))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
