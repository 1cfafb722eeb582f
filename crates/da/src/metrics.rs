//! Blob pipeline metrics.

use std::sync::Arc;

use prometheus_client::{
    metrics::{counter::Counter, histogram::Histogram},
    registry::Registry,
};

#[derive(Clone)]
pub struct BlobMetrics(Arc<Inner>);

struct Inner {
    verifications_success: Counter,
    verifications_failure: Counter,
    verification_seconds: Histogram,
    sidecars_persisted: Counter,
}

impl BlobMetrics {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            verifications_success: Counter::default(),
            verifications_failure: Counter::default(),
            verification_seconds: Histogram::new(
                [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0].into_iter(),
            ),
            sidecars_persisted: Counter::default(),
        }))
    }

    pub fn register(&self, registry: &mut Registry) {
        let sub = registry.sub_registry_with_prefix("blob");
        sub.register(
            "verifications_success",
            "Sidecar batches that passed verification",
            self.0.verifications_success.clone(),
        );
        sub.register(
            "verifications_failure",
            "Sidecar batches that failed verification",
            self.0.verifications_failure.clone(),
        );
        sub.register(
            "verification_seconds",
            "Wall time of sidecar batch verification",
            self.0.verification_seconds.clone(),
        );
        sub.register(
            "sidecars_persisted",
            "Sidecars written to the availability store",
            self.0.sidecars_persisted.clone(),
        );
    }

    pub fn record_verification(&self, success: bool, seconds: f64) {
        if success {
            self.0.verifications_success.inc();
        } else {
            self.0.verifications_failure.inc();
        }
        self.0.verification_seconds.observe(seconds);
    }

    pub fn record_persisted(&self, count: usize) {
        self.0.sidecars_persisted.inc_by(count as u64);
    }
}

impl Default for BlobMetrics {
    fn default() -> Self {
        Self::new()
    }
}
