use super::builder::AdmissionControllerBuilder;
use super::decision::{AdmissionDecision, DecisionReason};
use super::gauge::{RequestGauge, RequestGuard};
use super::thresholds::{Thresholds, ThresholdsUpdate};
use crate::resilience::{CircuitBreaker, CircuitBreakerSnapshot, CircuitState};
use crate::sampler::{ResourceSampler, ResourceSnapshot};
use crate::stats::{Stats, StatsAggregator, StatsReporter, StatsSink};
use crate::Result;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether a unit of work runs on this node or goes back to the caller.
///
/// One instance is shared (by reference or `Arc`) by every request handler.
/// All state is internally synchronized; no lock is held across the sampling
/// wait, so concurrent checks and request bookkeeping interleave freely.
pub struct AdmissionController {
    pub(crate) sampler: Arc<dyn ResourceSampler>,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) thresholds: RwLock<Thresholds>,
    pub(crate) gauge: Arc<RequestGauge>,
    pub(crate) stats: Arc<StatsAggregator>,
    pub(crate) stats_sink: Arc<dyn StatsSink>,
    pub(crate) report_interval: Duration,
}

impl AdmissionController {
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::new()
    }

    /// Register a request as in flight.
    pub fn start_request(&self) {
        let active = self.gauge.increment();
        self.stats.record_request();
        debug!(active, "request started");
    }

    /// Mark a request as finished. Extra calls are clamped at zero.
    pub fn complete_request(&self) {
        let active = self.gauge.decrement();
        debug!(active, "request completed");
    }

    /// [`start_request`](Self::start_request) now and
    /// [`complete_request`](Self::complete_request) when the guard drops.
    pub fn begin_request(&self) -> RequestGuard {
        self.start_request();
        RequestGuard::new(Arc::clone(&self.gauge))
    }

    pub fn active_requests(&self) -> u64 {
        self.gauge.current()
    }

    /// `true` when the work should run locally.
    pub async fn can_handle_on_server(&self) -> bool {
        self.evaluate().await.allowed
    }

    /// Full admission check.
    ///
    /// An open breaker short-circuits without sampling. Otherwise the node is
    /// sampled and the first violated threshold (cpu, memory, active
    /// requests) becomes the rejection reason. A failed sample is treated as
    /// unhealthy and counted under `circuitBreaker`.
    pub async fn evaluate(&self) -> AdmissionDecision {
        if self.breaker.is_open() {
            let decision =
                AdmissionDecision::rejected(DecisionReason::CircuitBreaker, "circuit breaker open");
            self.stats.record_decision(decision.reason);
            debug!(allowed = false, reason = %decision.reason, "admission decision");
            return decision;
        }

        let decision = match self.sampler.sample(&self.gauge).await {
            Ok(snapshot) => self.current_thresholds().evaluate(&snapshot),
            Err(e) => {
                warn!(error = %e, "resource sampling failed, offloading to caller");
                AdmissionDecision::rejected(
                    DecisionReason::CircuitBreaker,
                    format!("sampling failed: {}", e),
                )
            }
        };

        self.breaker.record_outcome(decision.allowed);
        self.stats.record_decision(decision.reason);
        debug!(
            allowed = decision.allowed,
            reason = %decision.reason,
            details = %decision.details,
            "admission decision"
        );
        decision
    }

    /// Sample the node without touching breaker or stats.
    pub async fn current_metrics(&self) -> Result<ResourceSnapshot> {
        self.sampler.sample(&self.gauge).await
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Zero all counters. Thresholds and breaker state are kept.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn update_thresholds(&self, update: &ThresholdsUpdate) {
        let mut thresholds = match self.thresholds.write() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        thresholds.merge(update);
        debug!(
            cpu = thresholds.cpu,
            memory = thresholds.memory,
            active_requests = thresholds.active_requests,
            "thresholds updated"
        );
    }

    pub fn current_thresholds(&self) -> Thresholds {
        match self.thresholds.read() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Start pushing [`Stats`] to the configured sink at the configured
    /// interval. Reporting stops when the returned handle is dropped.
    pub fn spawn_stats_reporter(&self) -> StatsReporter {
        StatsReporter::spawn(
            Arc::clone(&self.stats),
            Arc::clone(&self.stats_sink),
            self.report_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::RequestGauge;
    use crate::{Error, ErrorContext};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Steady(ResourceSnapshot);

    #[async_trait]
    impl ResourceSampler for Steady {
        async fn sample(&self, active: &RequestGauge) -> Result<ResourceSnapshot> {
            Ok(ResourceSnapshot {
                active_request_count: active.current(),
                ..self.0
            })
        }
    }

    struct Broken(AtomicUsize);

    #[async_trait]
    impl ResourceSampler for Broken {
        async fn sample(&self, _active: &RequestGauge) -> Result<ResourceSnapshot> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::sampling_with_context(
                "probe unavailable",
                ErrorContext::new().with_source("test"),
            ))
        }
    }

    fn controller(sampler: Arc<dyn ResourceSampler>) -> AdmissionController {
        AdmissionController::builder().sampler(sampler).build()
    }

    fn idle() -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_utilization: 0.1,
            memory_utilization: 0.1,
            active_request_count: 0,
        }
    }

    #[tokio::test]
    async fn bracketing_tracks_gauge_and_totals() {
        let c = controller(Arc::new(Steady(idle())));
        c.start_request();
        c.start_request();
        assert_eq!(c.active_requests(), 2);
        c.complete_request();
        c.complete_request();
        c.complete_request();
        assert_eq!(c.active_requests(), 0);
        assert_eq!(c.stats().total_requests, 2);
    }

    #[tokio::test]
    async fn guard_completes_on_early_exit() {
        let c = controller(Arc::new(Steady(idle())));
        let work = |fail: bool| -> std::result::Result<(), &'static str> {
            let _guard = c.begin_request();
            if fail {
                return Err("boom");
            }
            Ok(())
        };
        assert!(work(true).is_err());
        assert!(work(false).is_ok());
        assert_eq!(c.active_requests(), 0);
        assert_eq!(c.stats().total_requests, 2);
    }

    #[tokio::test]
    async fn active_request_threshold_sees_live_gauge() {
        let c = controller(Arc::new(Steady(idle())));
        c.update_thresholds(&ThresholdsUpdate::new().active_requests(2));

        let _a = c.begin_request();
        assert!(c.can_handle_on_server().await);
        let _b = c.begin_request();
        let d = c.evaluate().await;
        assert_eq!(d.reason, DecisionReason::ActiveRequests);
        assert_eq!(d.details, "active requests 2 >= 2");
    }

    #[tokio::test]
    async fn sampling_failure_offloads_and_feeds_breaker() {
        let sampler = Arc::new(Broken(AtomicUsize::new(0)));
        let c = controller(sampler.clone());

        let d = c.evaluate().await;
        assert!(!d.allowed);
        assert_eq!(d.reason, DecisionReason::CircuitBreaker);
        assert!(d.details.starts_with("sampling failed"));
        assert_eq!(c.breaker_snapshot().consecutive_failures, 1);
        assert_eq!(c.stats().rejection_reasons.circuit_breaker, 1);
        assert_eq!(sampler.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_sampling_failures_open_the_breaker() {
        let sampler = Arc::new(Broken(AtomicUsize::new(0)));
        let c = controller(sampler.clone());

        for _ in 0..5 {
            assert!(!c.can_handle_on_server().await);
        }
        assert_eq!(c.breaker_state(), CircuitState::Open);

        assert!(!c.can_handle_on_server().await);
        assert_eq!(sampler.0.load(Ordering::SeqCst), 5, "open breaker skips sampling");
        assert_eq!(c.stats().rejection_reasons.circuit_breaker, 6);
    }

    #[tokio::test]
    async fn current_metrics_has_no_side_effects() {
        let c = controller(Arc::new(Steady(idle())));
        let _g = c.begin_request();
        let snap = c.current_metrics().await.unwrap();
        assert_eq!(snap.active_request_count, 1);
        let s = c.stats();
        assert_eq!(s.server_operations + s.client_operations, 0);
    }
}
