//! Point-in-time utilization relative to the discovered limits.
//!
//! CPU utilization is measured over a short window: read the process CPU
//! time, suspend for the window, read it again, and divide the consumed time
//! by `window * cpu_cores`. The wait is a `tokio::time::sleep`, so only the
//! sampling future is parked; other admission checks and request bookkeeping
//! keep running meanwhile.
//!
//! Memory utilization is the resident set size over the memory ceiling.

mod process;

pub use process::{ProcessProbe, SystemProcessProbe};

use crate::admission::RequestGauge;
use crate::limits::{LimitDiscovery, ResourceLimits};
use crate::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Length of the CPU measurement window.
pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Utilization figures for one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Share of the CPU allotment used during the window, capped at 1.0.
    pub cpu_utilization: f64,
    /// Resident memory over the memory ceiling. Not capped.
    pub memory_utilization: f64,
    pub active_request_count: u64,
}

/// Produces [`ResourceSnapshot`]s for the admission controller.
///
/// `active_requests` is read as-is when the snapshot is assembled, it is
/// not part of the measurement.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self, active_requests: &RequestGauge) -> Result<ResourceSnapshot>;
}

/// Samples the current process against cgroup/host limits.
pub struct ProcessSampler {
    discovery: LimitDiscovery,
    limits: ArcSwap<ResourceLimits>,
    probe: Arc<dyn ProcessProbe>,
    window: Duration,
}

impl ProcessSampler {
    /// Runs discovery once and samples the current process.
    pub fn new(discovery: LimitDiscovery) -> Self {
        let limits = discovery.discover();
        Self {
            discovery,
            limits: ArcSwap::from_pointee(limits),
            probe: Arc::new(SystemProcessProbe::new()),
            window: DEFAULT_SAMPLE_WINDOW,
        }
    }

    /// Replace the process readings (CPU time, resident memory).
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Limits currently used as the denominator.
    pub fn limits(&self) -> ResourceLimits {
        **self.limits.load()
    }

    /// Run discovery again and swap in the result.
    ///
    /// Limits are never refreshed on their own; this is the only way to pick
    /// up a changed container allotment.
    pub fn rediscover_limits(&self) -> ResourceLimits {
        let limits = self.discovery.discover();
        self.limits.store(Arc::new(limits));
        limits
    }
}

#[async_trait]
impl ResourceSampler for ProcessSampler {
    async fn sample(&self, active_requests: &RequestGauge) -> Result<ResourceSnapshot> {
        let limits = self.limits();

        let cpu_before = self.probe.cpu_time()?;
        let started = tokio::time::Instant::now();
        tokio::time::sleep(self.window).await;
        let elapsed = started.elapsed();
        let cpu_after = self.probe.cpu_time()?;

        let consumed = cpu_after.saturating_sub(cpu_before);
        let cpu_utilization = cpu_ratio(consumed, elapsed, limits.cpu_cores);

        let resident = self.probe.memory_in_use()?;
        let memory_utilization = resident as f64 / limits.memory_bytes.max(1) as f64;

        let snapshot = ResourceSnapshot {
            cpu_utilization,
            memory_utilization,
            active_request_count: active_requests.current(),
        };
        debug!(
            cpu = snapshot.cpu_utilization,
            memory = snapshot.memory_utilization,
            active = snapshot.active_request_count,
            window_ms = elapsed.as_millis() as u64,
            "resource snapshot"
        );
        Ok(snapshot)
    }
}

fn cpu_ratio(consumed: Duration, elapsed: Duration, cores: f64) -> f64 {
    let capacity = elapsed.as_secs_f64() * cores;
    if !capacity.is_finite() || capacity <= 0.0 {
        return 0.0;
    }
    (consumed.as_secs_f64() / capacity).min(1.0)
}
