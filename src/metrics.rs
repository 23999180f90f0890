//! Pipeline counters, surfaced on `/api/health`.
//!
//! Every drop, suppression and retry in the pipeline increments one of
//! these; nothing here blocks the hot path.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Ingest buffer overflowed, oldest message dropped.
    pub ingest_overflow: AtomicU64,
    /// Messages that yielded no usable event.
    pub parse_miss: AtomicU64,
    /// Events dropped for exceeding the ingest latency budget.
    pub stale_dropped: AtomicU64,
    pub eligibility_rejected: AtomicU64,
    pub dedup_suppressed: AtomicU64,
    pub enrich_failures: AtomicU64,
    pub write_retries: AtomicU64,
    pub emergency_writes: AtomicU64,
    pub mirror_failures: AtomicU64,
    /// Fan-out channel overflow; the log is unaffected.
    pub fanout_dropped: AtomicU64,
    pub delivery_failures: AtomicU64,
    /// Parse misses keyed by `source_id:reason`.
    parse_miss_reasons: RwLock<HashMap<String, u64>>,
}

pub type SharedMetrics = Arc<Metrics>;

impl Metrics {
    pub fn new() -> SharedMetrics {
        Arc::new(Metrics::default())
    }

    pub fn record_parse_miss(&self, source_id: &str, reason: &str) {
        self.parse_miss.fetch_add(1, Ordering::Relaxed);
        let key = format!("{source_id}:{reason}");
        *self.parse_miss_reasons.write().entry(key).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingest_overflow: self.ingest_overflow.load(Ordering::Relaxed),
            parse_miss: self.parse_miss.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            eligibility_rejected: self.eligibility_rejected.load(Ordering::Relaxed),
            dedup_suppressed: self.dedup_suppressed.load(Ordering::Relaxed),
            enrich_failures: self.enrich_failures.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            emergency_writes: self.emergency_writes.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
            fanout_dropped: self.fanout_dropped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            parse_miss_reasons: self.parse_miss_reasons.read().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub ingest_overflow: u64,
    pub parse_miss: u64,
    pub stale_dropped: u64,
    pub eligibility_rejected: u64,
    pub dedup_suppressed: u64,
    pub enrich_failures: u64,
    pub write_retries: u64,
    pub emergency_writes: u64,
    pub mirror_failures: u64,
    pub fanout_dropped: u64,
    pub delivery_failures: u64,
    pub parse_miss_reasons: HashMap<String, u64>,
}
