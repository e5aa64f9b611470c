//! Prometheus metrics for game cycles, the ledger and the RNG

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};

pub struct EngineMetrics {
    registry: Registry,
    start_time: Instant,
    pub cycles_total: IntCounterVec,
    pub wagered_minor_units: IntCounter,
    pub won_minor_units: IntCounter,
    pub play_rejections: IntCounterVec,
    pub rng_health_checks: IntCounterVec,
    pub audit_failures: IntCounter,
    pub ledger_postings: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("rgs_cycles_total", "Game cycles by final status"),
            &["status"],
        )?;
        let wagered_minor_units = IntCounter::new(
            "rgs_wagered_minor_units_total",
            "Sum of debited wagers in minor units",
        )?;
        let won_minor_units = IntCounter::new(
            "rgs_won_minor_units_total",
            "Sum of credited wins in minor units",
        )?;
        let play_rejections = IntCounterVec::new(
            Opts::new("rgs_play_rejections_total", "Plays rejected before the wager debit"),
            &["reason"],
        )?;
        let rng_health_checks = IntCounterVec::new(
            Opts::new("rgs_rng_health_checks_total", "RNG self tests by result"),
            &["result"],
        )?;
        let audit_failures = IntCounter::new(
            "rgs_audit_failures_total",
            "Audit events that could not be recorded",
        )?;
        let ledger_postings = IntCounterVec::new(
            Opts::new("rgs_ledger_postings_total", "Ledger transactions by type"),
            &["type"],
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(wagered_minor_units.clone()))?;
        registry.register(Box::new(won_minor_units.clone()))?;
        registry.register(Box::new(play_rejections.clone()))?;
        registry.register(Box::new(rng_health_checks.clone()))?;
        registry.register(Box::new(audit_failures.clone()))?;
        registry.register(Box::new(ledger_postings.clone()))?;

        Ok(Self {
            registry,
            start_time: Instant::now(),
            cycles_total,
            wagered_minor_units,
            won_minor_units,
            play_rejections,
            rng_health_checks,
            audit_failures,
            ledger_postings,
        })
    }

    pub fn record_cycle(&self, status: &str) {
        self.cycles_total.with_label_values(&[status]).inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.play_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_posting(&self, tx_type: &str) {
        self.ledger_postings.with_label_values(&[tx_type]).inc();
    }

    pub fn record_health_check(&self, passed: bool) {
        let result = if passed { "pass" } else { "fail" };
        self.rng_health_checks.with_label_values(&[result]).inc();
    }

    /// Counters only ever go up; negative amounts are ignored.
    pub fn add_wagered(&self, amount: i64) {
        if amount > 0 {
            self.wagered_minor_units.inc_by(amount as u64);
        }
    }

    pub fn add_won(&self, amount: i64) {
        if amount > 0 {
            self.won_minor_units.inc_by(amount as u64);
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
