//! Run-time counters and the periodic summary.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

/// Monotone counters shared across the orchestrator and the listener tasks.
#[derive(Debug)]
pub struct BotMetrics {
    pub scan_cycles: AtomicU64,
    pub opportunities_found: AtomicU64,
    pub triangular_opportunities: AtomicU64,
    pub simulation_failures: AtomicU64,
    pub execution_failures: AtomicU64,
    pub successful_arbs: AtomicU64,
    pub jito_submissions: AtomicU64,
    pub new_pools_detected: AtomicU64,
    pub backrun_signals: AtomicU64,
    /// Net realized profit in borrow-token raw units.
    pub total_profit: AtomicI64,
    /// Lamports spent on fees and tips.
    pub total_gas_spent: AtomicU64,
    started_at: Instant,
    started_wall: DateTime<Utc>,
}

impl BotMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scan_cycles: AtomicU64::new(0),
            opportunities_found: AtomicU64::new(0),
            triangular_opportunities: AtomicU64::new(0),
            simulation_failures: AtomicU64::new(0),
            execution_failures: AtomicU64::new(0),
            successful_arbs: AtomicU64::new(0),
            jito_submissions: AtomicU64::new(0),
            new_pools_detected: AtomicU64::new(0),
            backrun_signals: AtomicU64::new(0),
            total_profit: AtomicI64::new(0),
            total_gas_spent: AtomicU64::new(0),
            started_at: Instant::now(),
            started_wall: Utc::now(),
        })
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_profit(&self, amount: i128) {
        let clamped = amount.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        self.total_profit.fetch_add(clamped, Ordering::Relaxed);
    }

    pub fn add_gas(&self, lamports: u64) {
        self.total_gas_spent.fetch_add(lamports, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// One-line state dump for the periodic summary.
    pub fn summary(&self) -> String {
        format!(
            "started={} uptime={}s cycles={} opps={} tri={} sims_failed={} execs_failed={} \
             landed={} jito={} new_pools={} backruns={} profit={} gas_lamports={}",
            self.started_wall.format("%Y-%m-%dT%H:%M:%SZ"),
            self.uptime_secs(),
            self.scan_cycles.load(Ordering::Relaxed),
            self.opportunities_found.load(Ordering::Relaxed),
            self.triangular_opportunities.load(Ordering::Relaxed),
            self.simulation_failures.load(Ordering::Relaxed),
            self.execution_failures.load(Ordering::Relaxed),
            self.successful_arbs.load(Ordering::Relaxed),
            self.jito_submissions.load(Ordering::Relaxed),
            self.new_pools_detected.load(Ordering::Relaxed),
            self.backrun_signals.load(Ordering::Relaxed),
            self.total_profit.load(Ordering::Relaxed),
            self.total_gas_spent.load(Ordering::Relaxed),
        )
    }

    pub fn log_summary(&self) {
        info!(target: "metrics", "{}", self.summary());
    }
}
