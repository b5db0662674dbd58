//! Engine instrumentation
//!
//! Counters and per-phase latency histograms. None of this feeds back into
//! scheduling or validation.

use crate::engine::BatchStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram for tracking value distributions
pub struct Histogram {
    /// Upper bucket boundaries (in microseconds)
    buckets: Vec<u64>,
    /// Counts per bucket, plus one overflow bucket
    counts: Vec<AtomicU64>,
    /// Sum of all values
    sum: AtomicU64,
    /// Total count
    count: AtomicU64,
}

impl Histogram {
    /// Create histogram with default buckets
    pub fn new() -> Self {
        Self::with_buckets(vec![
            10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 250_000,
        ])
    }

    /// Create histogram with custom buckets
    pub fn with_buckets(mut buckets: Vec<u64>) -> Self {
        buckets.sort_unstable();
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value
    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let slot = self.buckets.partition_point(|boundary| *boundary < value);
        if let Some(counter) = self.counts.get(slot) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get mean value
    pub fn mean(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Get total count
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Per-bucket counts; the last entry counts values above every boundary
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Timed stage of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Balancing or planning
    Schedule,
    /// Speculative execution and local commit, or plan execution
    Execute,
    /// Validation and cascade
    Validate,
    /// Recheck of the abort set
    Recheck,
    /// Fallback re-execution
    Fallback,
}

impl Phase {
    /// Every phase
    pub const ALL: [Phase; 5] = [
        Phase::Schedule,
        Phase::Execute,
        Phase::Validate,
        Phase::Recheck,
        Phase::Fallback,
    ];

    /// Metric name
    pub fn name(self) -> &'static str {
        match self {
            Phase::Schedule => "schedule",
            Phase::Execute => "execute",
            Phase::Validate => "validate",
            Phase::Recheck => "recheck",
            Phase::Fallback => "fallback",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Thread-safe engine metrics
#[derive(Default)]
pub struct EngineMetrics {
    batches: AtomicU64,
    transactions: AtomicU64,
    speculative_aborts: AtomicU64,
    recheck_recoveries: AtomicU64,
    fallback_transactions: AtomicU64,
    mispredictions: AtomicU64,
    phases: [Histogram; 5],
}

impl EngineMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latency of one phase
    pub fn observe(&self, phase: Phase, elapsed: Duration) {
        self.phases[phase.index()].observe(saturating_micros(elapsed));
    }

    /// Fold a finished batch into the counters
    pub fn record_batch(&self, stats: &BatchStats) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.transactions
            .fetch_add(stats.transactions as u64, Ordering::Relaxed);
        self.speculative_aborts
            .fetch_add(stats.aborted_after_validation as u64, Ordering::Relaxed);
        self.recheck_recoveries.fetch_add(
            stats
                .aborted_after_validation
                .saturating_sub(stats.aborted_after_recheck) as u64,
            Ordering::Relaxed,
        );
        self.fallback_transactions
            .fetch_add(stats.fallback_transactions as u64, Ordering::Relaxed);
        self.mispredictions
            .fetch_add(stats.mispredictions as u64, Ordering::Relaxed);

        let timings = &stats.timings;
        for (phase, micros) in [
            (Phase::Schedule, timings.schedule_us),
            (Phase::Execute, timings.execute_us),
            (Phase::Validate, timings.validate_us),
            (Phase::Recheck, timings.recheck_us),
            (Phase::Fallback, timings.fallback_us),
        ] {
            self.phases[phase.index()].observe(micros);
        }
    }

    /// Histogram of one phase
    pub fn phase(&self, phase: Phase) -> &Histogram {
        &self.phases[phase.index()]
    }

    /// Copy every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = [
            ("batches", &self.batches),
            ("transactions", &self.transactions),
            ("speculative_aborts", &self.speculative_aborts),
            ("recheck_recoveries", &self.recheck_recoveries),
            ("fallback_transactions", &self.fallback_transactions),
            ("mispredictions", &self.mispredictions),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.load(Ordering::Relaxed)))
        .collect();

        let phases = Phase::ALL
            .into_iter()
            .map(|phase| {
                let h = self.phase(phase);
                (
                    phase.name().to_string(),
                    HistogramSummary {
                        mean: h.mean(),
                        count: h.total_count(),
                    },
                )
            })
            .collect();

        MetricsSnapshot { counters, phases }
    }
}

/// Whole microseconds in `elapsed`, clamped to `u64::MAX`
pub(crate) fn saturating_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Phase latency summaries, microseconds
    pub phases: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Total observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Export snapshot as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export snapshot as compact JSON string
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
