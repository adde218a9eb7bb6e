//! Prometheus metrics for claims and recalculation

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct RewardsMetrics {
    registry: Registry,
    claims: IntCounterVec,
    claimed_crx: CounterVec,
    recalc_duration: Histogram,
    recalc_runs: IntCounterVec,
    lock_busy: IntCounterVec,
}

impl RewardsMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("currentx_rewards".to_string()), None)?;

        let claims = IntCounterVec::new(
            Opts::new("claims_total", "Claim attempts by program and outcome"),
            &["program", "outcome"],
        )?;
        let claimed_crx = CounterVec::new(
            Opts::new("claimed_crx_total", "CRX paid out by claims"),
            &["program"],
        )?;
        let recalc_duration = Histogram::with_opts(
            HistogramOpts::new("recalc_duration_seconds", "Season recalculation duration")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        let recalc_runs = IntCounterVec::new(
            Opts::new("recalc_runs_total", "Recalculation triggers by outcome"),
            &["outcome"],
        )?;
        let lock_busy = IntCounterVec::new(
            Opts::new("lock_busy_total", "Lock acquisitions that found the lock held"),
            &["lock"],
        )?;

        registry.register(Box::new(claims.clone()))?;
        registry.register(Box::new(claimed_crx.clone()))?;
        registry.register(Box::new(recalc_duration.clone()))?;
        registry.register(Box::new(recalc_runs.clone()))?;
        registry.register(Box::new(lock_busy.clone()))?;

        Ok(Self {
            registry,
            claims,
            claimed_crx,
            recalc_duration,
            recalc_runs,
            lock_busy,
        })
    }

    pub fn record_claim(&self, program: &str, outcome: &str) {
        self.claims.with_label_values(&[program, outcome]).inc();
    }

    pub fn add_claimed(&self, program: &str, amount_crx: f64) {
        if amount_crx > 0.0 {
            self.claimed_crx.with_label_values(&[program]).inc_by(amount_crx);
        }
    }

    pub fn observe_recalc(&self, outcome: &str, seconds: Option<f64>) {
        self.recalc_runs.with_label_values(&[outcome]).inc();
        if let Some(seconds) = seconds {
            self.recalc_duration.observe(seconds);
        }
    }

    pub fn lock_busy(&self, lock: &str) {
        self.lock_busy.with_label_values(&[lock]).inc();
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
