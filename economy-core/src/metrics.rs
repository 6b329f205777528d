//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the economy core.
//!
//! # Metrics
//!
//! - `economy_operations_total{op}` - Completed economic operations
//! - `economy_rejections_total{op}` - Operations rejected by validation
//! - `economy_ledger_entries_total` - Ledger rows appended
//! - `economy_reversals_total` - Entries flipped to reversed
//! - `economy_op_duration_seconds` - Operation latency histogram
//!
//! Each instance owns its registry, so tests can open as many ledgers as
//! they like without collector collisions.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed operations, by operation name
    pub operations_total: IntCounterVec,

    /// Rejected operations, by operation name
    pub rejections_total: IntCounterVec,

    /// Ledger rows appended
    pub entries_total: IntCounter,

    /// Entries flipped to reversed
    pub reversals_total: IntCounter,

    /// Operation latency
    pub op_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("economy_operations_total", "Completed economic operations"),
            &["op"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "economy_rejections_total",
                "Operations rejected by validation",
            ),
            &["op"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let entries_total = IntCounter::with_opts(Opts::new(
            "economy_ledger_entries_total",
            "Ledger rows appended",
        ))?;
        registry.register(Box::new(entries_total.clone()))?;

        let reversals_total = IntCounter::with_opts(Opts::new(
            "economy_reversals_total",
            "Entries flipped to reversed",
        ))?;
        registry.register(Box::new(reversals_total.clone()))?;

        let op_duration = Histogram::with_opts(
            HistogramOpts::new("economy_op_duration_seconds", "Operation latency").buckets(vec![
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
            ]),
        )?;
        registry.register(Box::new(op_duration.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            entries_total,
            reversals_total,
            op_duration,
            registry,
        })
    }
}
