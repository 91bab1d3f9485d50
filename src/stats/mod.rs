//! Decision counters and periodic reporting.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StatsAggregator`] | Running counters fed by every admission decision |
//! | [`Stats`] | Read-only snapshot with derived percentages |
//! | [`StatsSink`] | Destination for periodic reports |
//! | [`StatsReporter`] | Background task pushing [`Stats`] to a sink at a fixed interval |
//!
//! Percentages are derived on read and never stored. Resetting counters does
//! not touch breaker state or thresholds, which live in the controller.

mod sink;

pub use sink::{noop_sink, InMemoryStatsSink, NoopStatsSink, StatsSink, TracingStatsSink};

use crate::admission::DecisionReason;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default interval of the periodic report.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Rejections per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionCounts {
    pub cpu: u64,
    pub memory: u64,
    pub active_requests: u64,
    pub circuit_breaker: u64,
}

/// Counters plus derived percentages, as returned by [`StatsAggregator::snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_requests: u64,
    pub server_operations: u64,
    pub client_operations: u64,
    pub server_percentage: f64,
    pub client_percentage: f64,
    pub rejection_reasons: RejectionCounts,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    server_operations: u64,
    client_operations: u64,
    rejections: RejectionCounts,
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    counters: Mutex<Counters>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        match self.counters.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_request(&self) {
        let mut c = self.lock();
        c.total_requests = c.total_requests.saturating_add(1);
    }

    /// Count one decision as a server or client operation.
    pub fn record_decision(&self, reason: DecisionReason) {
        let mut c = self.lock();
        let bucket = match reason {
            DecisionReason::Healthy => {
                c.server_operations += 1;
                return;
            }
            DecisionReason::Cpu => &mut c.rejections.cpu,
            DecisionReason::Memory => &mut c.rejections.memory,
            DecisionReason::ActiveRequests => &mut c.rejections.active_requests,
            DecisionReason::CircuitBreaker => &mut c.rejections.circuit_breaker,
        };
        *bucket += 1;
        c.client_operations += 1;
    }

    pub fn snapshot(&self) -> Stats {
        let c = self.lock();
        let processed = c.server_operations + c.client_operations;
        Stats {
            total_requests: c.total_requests,
            server_operations: c.server_operations,
            client_operations: c.client_operations,
            server_percentage: percentage(c.server_operations, processed),
            client_percentage: percentage(c.client_operations, processed),
            rejection_reasons: c.rejections,
        }
    }

    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }
}

/// `part / whole * 100`, rounded to two decimals; 0 when nothing was processed.
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Handle to the periodic stats report task. Dropping it stops reporting.
#[derive(Debug)]
pub struct StatsReporter {
    handle: JoinHandle<()>,
}

impl StatsReporter {
    /// Push a snapshot of `stats` to `sink` every `every`, starting one
    /// interval from now. Must be called within a tokio runtime.
    pub fn spawn(stats: Arc<StatsAggregator>, sink: Arc<dyn StatsSink>, every: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Sink failures never propagate.
                let _ = sink.report(stats.snapshot()).await;
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
