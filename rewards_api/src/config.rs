//! Environment configuration with validation
//!
//! Every value is read, defaulted and clamped exactly once here. Handlers only
//! ever see the typed structs.

use rust_decimal::Decimal;
use serde::Serialize;
use std::{collections::HashSet, env, str::FromStr};

use crate::reward_math::{ClaimSchedule, RewardParams};

const MS_PER_HOUR: i64 = 3_600_000;
const MAX_FUTURE_SKEW_HARD_LIMIT_SECONDS: u64 = 300;

/// Application configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub rewards: RewardsConfig,
    pub points: PointsConfig,
    #[serde(skip)]
    pub secrets: AdminSecrets,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub claim_rate_limit_per_minute: u32,
}

/// Whitelist season parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsConfig {
    pub season_id: Option<String>,
    pub params: RewardParams,
    pub finalization_window_hours: u32,
    pub season_end_at: Option<i64>,
    pub claim_opens_at_override: Option<i64>,
    pub claim_signature_ttl_seconds: u64,
    pub claim_max_future_skew_seconds: u64,
}

/// Points leaderboard season parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsConfig {
    pub season_id: Option<String>,
    pub season_end_at: Option<i64>,
    pub claim_opens_at_override: Option<i64>,
    pub finalization_window_hours: u32,
    pub reward_pool_crx: Decimal,
    pub top_n: usize,
    pub excluded_addresses: HashSet<String>,
    pub immediate_pct: Decimal,
    pub stream_days: u32,
    pub claim_signature_ttl_seconds: u64,
    pub claim_max_future_skew_seconds: u64,
}

/// Bearer secrets accepted by operator endpoints
#[derive(Debug, Clone, Default)]
pub struct AdminSecrets {
    pub admin: Vec<String>,
    pub cron: Vec<String>,
}

impl AdminSecrets {
    /// Secrets that may trigger or inspect a recalculation
    pub fn operator(&self) -> Vec<String> {
        self.admin.iter().chain(self.cron.iter()).cloned().collect()
    }
}

/// A season whose id and claim-open time are both known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSeason {
    pub season_id: String,
    pub claim_opens_at_ms: i64,
}

impl ResolvedSeason {
    pub fn schedule(&self) -> ClaimSchedule {
        ClaimSchedule {
            claim_opens_at_ms: self.claim_opens_at_ms,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Season not configured: {0}")]
    NotConfigured(String),
}

/// Reads raw values by name; `env::var` in production, a map in tests
struct Source<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.string(name)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn decimal(&self, name: &str, default: Decimal, min: Decimal, max: Decimal) -> Decimal {
        self.string(name)
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(default)
            .max(min)
            .min(max)
    }

    fn integer<T>(&self, name: &str, default: T, min: T, max: T) -> T
    where
        T: FromStr + Ord,
    {
        self.string(name)
            .and_then(|v| v.parse::<T>().ok())
            .unwrap_or(default)
            .clamp(min, max)
    }

    /// Millisecond timestamp; accepts epoch milliseconds or RFC 3339
    fn timestamp(&self, name: &str) -> Option<i64> {
        let raw = self.string(name)?;
        if let Ok(ms) = raw.parse::<i64>() {
            return Some(ms).filter(|ms| *ms > 0);
        }
        chrono::DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.timestamp_millis())
    }
}

fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Values above 1 are read as percentages (`30` means 30%)
fn normalize_pct(raw: Decimal) -> Decimal {
    let pct = if raw > Decimal::ONE {
        raw / dec(100)
    } else {
        raw
    };
    pct.max(Decimal::ZERO).min(Decimal::ONE)
}

/// Ordered pair with `min <= max`
fn ordered(a: Decimal, b: Decimal) -> (Decimal, Decimal) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn resolve_claim_opens_at(
    override_at: Option<i64>,
    season_end_at: Option<i64>,
    finalization_window_hours: u32,
) -> Option<i64> {
    override_at.or_else(|| {
        season_end_at.map(|end| end.saturating_add(i64::from(finalization_window_hours) * MS_PER_HOUR))
    })
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source(lookup);

        let server = ServerConfig {
            host: src.string("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: match src.string("SERVER_PORT") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort)?,
                None => 8081,
            },
            redis_url: src.string("REDIS_URL"),
            key_prefix: src
                .string("REWARDS_KEY_PREFIX")
                .unwrap_or_else(|| "cx".to_string()),
            claim_rate_limit_per_minute: src.integer("CLAIM_RATE_LIMIT_PER_MINUTE", 10, 1, 600),
        };

        let rewards = RewardsConfig::from_source(&src);
        let points = PointsConfig::from_source(&src, &rewards);
        let secrets = AdminSecrets {
            admin: src.list("REWARDS_ADMIN_SECRET"),
            cron: src.list("CRON_SECRET"),
        };

        let config = Config {
            server,
            rewards,
            points,
            secrets,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.server.key_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(
                "REWARDS_KEY_PREFIX must not contain whitespace".to_string(),
            ));
        }
        Ok(())
    }
}

impl RewardsConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>) -> Self {
        let cap_limit = dec(1_000_000_000);
        let reward_limit = dec(1_000_000);

        let (base_min_crx, base_max_crx) = ordered(
            src.decimal("WHITELIST_BASE_MIN_CRX", dec(20), Decimal::ZERO, reward_limit),
            src.decimal("WHITELIST_BASE_MAX_CRX", dec(50), Decimal::ZERO, reward_limit),
        );
        let (bonus_min_crx, bonus_max_crx) = ordered(
            src.decimal("WHITELIST_BONUS_MIN_CRX", dec(10), Decimal::ZERO, reward_limit),
            src.decimal("WHITELIST_BONUS_MAX_CRX", dec(30), Decimal::ZERO, reward_limit),
        );

        let params = RewardParams {
            budget_cap_crx: src.decimal("WHITELIST_BUDGET_CAP_CRX", dec(100_000), Decimal::ZERO, cap_limit),
            base_min_crx,
            base_max_crx,
            bonus_min_crx,
            bonus_max_crx,
            activation_window_days: src.integer("WHITELIST_ACTIVATION_WINDOW_DAYS", 7, 1, 365),
            volume_threshold_usd: src.decimal("WHITELIST_VOLUME_THRESHOLD_USD", dec(50), Decimal::ZERO, cap_limit),
            micro_lp_usd: src.decimal("WHITELIST_MICRO_LP_USD", dec(10), Decimal::ZERO, cap_limit),
            immediate_pct: normalize_pct(src.decimal(
                "WHITELIST_IMMEDIATE_PCT",
                Decimal::new(3, 1),
                Decimal::ZERO,
                dec(100),
            )),
            stream_days: src.integer("WHITELIST_STREAM_DAYS", 30, 1, 3650),
        };

        let skew: u64 = src.integer("CLAIM_MAX_FUTURE_SKEW_SECONDS", 60, 0, u64::MAX);

        RewardsConfig {
            season_id: src.string("WHITELIST_SEASON_ID"),
            params,
            finalization_window_hours: src.integer("WHITELIST_FINALIZATION_WINDOW_HOURS", 24, 0, 720),
            season_end_at: src.timestamp("WHITELIST_SEASON_END_AT"),
            claim_opens_at_override: src.timestamp("WHITELIST_CLAIM_OPENS_AT"),
            claim_signature_ttl_seconds: src.integer("CLAIM_SIGNATURE_TTL_SECONDS", 600, 60, 3600),
            claim_max_future_skew_seconds: skew.min(MAX_FUTURE_SKEW_HARD_LIMIT_SECONDS),
        }
    }

    pub fn claim_opens_at_ms(&self) -> Option<i64> {
        resolve_claim_opens_at(
            self.claim_opens_at_override,
            self.season_end_at,
            self.finalization_window_hours,
        )
    }

    /// Season id and claim-open time, or `NotConfigured`
    pub fn resolve(&self) -> Result<ResolvedSeason, ConfigError> {
        let season_id = self
            .season_id
            .clone()
            .ok_or_else(|| ConfigError::NotConfigured("WHITELIST_SEASON_ID is not set".to_string()))?;
        let claim_opens_at_ms = self.claim_opens_at_ms().ok_or_else(|| {
            ConfigError::NotConfigured(
                "claim open time unresolved: set WHITELIST_CLAIM_OPENS_AT or WHITELIST_SEASON_END_AT"
                    .to_string(),
            )
        })?;
        Ok(ResolvedSeason {
            season_id,
            claim_opens_at_ms,
        })
    }
}

impl PointsConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>, rewards: &RewardsConfig) -> Self {
        PointsConfig {
            season_id: src.string("POINTS_SEASON_ID"),
            season_end_at: src.timestamp("POINTS_SEASON_END_AT"),
            claim_opens_at_override: src.timestamp("POINTS_CLAIM_OPENS_AT"),
            finalization_window_hours: rewards.finalization_window_hours,
            reward_pool_crx: src.decimal(
                "POINTS_REWARD_POOL_CRX",
                Decimal::ZERO,
                Decimal::ZERO,
                dec(1_000_000_000),
            ),
            top_n: src.integer("POINTS_TOP_N", 100, 1, 1000),
            excluded_addresses: src
                .list("POINTS_EXCLUDED_ADDRESSES")
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
            immediate_pct: rewards.params.immediate_pct,
            stream_days: rewards.params.stream_days,
            claim_signature_ttl_seconds: rewards.claim_signature_ttl_seconds,
            claim_max_future_skew_seconds: rewards.claim_max_future_skew_seconds,
        }
    }

    pub fn claim_opens_at_ms(&self) -> Option<i64> {
        resolve_claim_opens_at(
            self.claim_opens_at_override,
            self.season_end_at,
            self.finalization_window_hours,
        )
    }

    pub fn resolve(&self) -> Result<ResolvedSeason, ConfigError> {
        let season_id = self
            .season_id
            .clone()
            .ok_or_else(|| ConfigError::NotConfigured("POINTS_SEASON_ID is not set".to_string()))?;
        let claim_opens_at_ms = self.claim_opens_at_ms().ok_or_else(|| {
            ConfigError::NotConfigured(
                "points claim open time unresolved: set POINTS_CLAIM_OPENS_AT or POINTS_SEASON_END_AT"
                    .to_string(),
            )
        })?;
        Ok(ResolvedSeason {
            season_id,
            claim_opens_at_ms,
        })
    }
}
