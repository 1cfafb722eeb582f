//! Chain-service metrics.

use std::sync::Arc;

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

#[derive(Clone)]
pub struct ChainMetrics(Arc<Inner>);

struct Inner {
    blocks_finalized: Counter,
    blocks_rejected: Counter,
    verify_seconds: Histogram,
    finalize_seconds: Histogram,
    optimistic_builds_started: Counter,
    failed_blocks: Gauge,
    deposits_ingested: Counter,
}

impl ChainMetrics {
    pub fn new() -> Self {
        let buckets = [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
        Self(Arc::new(Inner {
            blocks_finalized: Counter::default(),
            blocks_rejected: Counter::default(),
            verify_seconds: Histogram::new(buckets.into_iter()),
            finalize_seconds: Histogram::new(buckets.into_iter()),
            optimistic_builds_started: Counter::default(),
            failed_blocks: Gauge::default(),
            deposits_ingested: Counter::default(),
        }))
    }

    pub fn register(&self, registry: &mut Registry) {
        let sub = registry.sub_registry_with_prefix("chain");
        sub.register("blocks_finalized", "Finalized blocks", self.0.blocks_finalized.clone());
        sub.register(
            "blocks_rejected",
            "Blocks rejected during verify or finalize",
            self.0.blocks_rejected.clone(),
        );
        sub.register(
            "verify_seconds",
            "Wall time of proposal verification",
            self.0.verify_seconds.clone(),
        );
        sub.register(
            "finalize_seconds",
            "Wall time of block finalization",
            self.0.finalize_seconds.clone(),
        );
        sub.register(
            "optimistic_builds_started",
            "Optimistic next-slot payload builds requested",
            self.0.optimistic_builds_started.clone(),
        );
        sub.register(
            "failed_blocks",
            "Slots currently parked for deposit catch-up retry",
            self.0.failed_blocks.clone(),
        );
        sub.register(
            "deposits_ingested",
            "Deposits buffered from the execution layer",
            self.0.deposits_ingested.clone(),
        );
    }

    pub fn observe_verify(&self, seconds: f64, accepted: bool) {
        self.0.verify_seconds.observe(seconds);
        if !accepted {
            self.0.blocks_rejected.inc();
        }
    }

    pub fn observe_finalize(&self, seconds: f64, committed: bool) {
        self.0.finalize_seconds.observe(seconds);
        if committed {
            self.0.blocks_finalized.inc();
        } else {
            self.0.blocks_rejected.inc();
        }
    }

    pub fn record_optimistic_build(&self) {
        self.0.optimistic_builds_started.inc();
    }

    pub fn set_failed_blocks(&self, count: usize) {
        self.0.failed_blocks.set(count as i64);
    }

    pub fn record_deposits(&self, count: usize) {
        self.0.deposits_ingested.inc_by(count as u64);
    }
}

impl Default for ChainMetrics {
    fn default() -> Self {
        Self::new()
    }
}
