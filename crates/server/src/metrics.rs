//! Prometheus metrics for the HTTP surface.

use ghgp_runtime::snapshot::SnapshotCounts;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub requests: IntCounterVec,
    pub active_requests: IntGauge,
    pub snapshot_fetches: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("ghgp_requests_total", "Requests handled, by operation and status"),
            &["operation", "status"],
        )?;
        let active_requests = IntGauge::with_opts(Opts::new(
            "ghgp_active_requests",
            "Requests currently being dispatched",
        ))?;
        let snapshot_fetches = IntCounter::with_opts(Opts::new(
            "ghgp_snapshot_fetches_total",
            "Snapshot downloads started by this process",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(snapshot_fetches.clone()))?;

        Ok(Self {
            registry,
            requests,
            active_requests,
            snapshot_fetches,
        })
    }

    /// Count a request as active until the returned guard drops.
    pub fn track_active(&self) -> ActiveRequest {
        self.active_requests.inc();
        ActiveRequest {
            gauge: self.active_requests.clone(),
        }
    }

    /// Bring the fetch counter up to the cache's own count.
    pub fn observe_snapshots(&self, counts: SnapshotCounts) {
        let seen = self.snapshot_fetches.get();
        if counts.fetches > seen {
            self.snapshot_fetches.inc_by(counts.fetches - seen);
        }
    }

    /// Text exposition format plus its content type.
    pub fn render(&self) -> prometheus::Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

/// Decrements `ghgp_active_requests` on drop.
pub struct ActiveRequest {
    gauge: IntGauge,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
