use super::controller::AdmissionController;
use super::gauge::RequestGauge;
use super::thresholds::Thresholds;
use crate::clock::{system_clock, Clock};
use crate::config::AdmissionConfig;
use crate::limits::LimitDiscovery;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::sampler::{ProcessSampler, ResourceSampler};
use crate::stats::{StatsAggregator, StatsSink, TracingStatsSink};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Builder for [`AdmissionController`].
///
/// Everything not supplied comes from [`AdmissionConfig`] defaults: a
/// [`ProcessSampler`] over the discovered limits, the system clock and a
/// [`TracingStatsSink`]. The configuration is passed through
/// [`AdmissionConfig::sanitized`] at build time, so a zero interval or window
/// is raised to the smallest usable value rather than reaching the runtime.
pub struct AdmissionControllerBuilder {
    config: AdmissionConfig,
    /// Exact breaker settings; the config only holds whole seconds.
    breaker: Option<CircuitBreakerConfig>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    clock: Arc<dyn Clock>,
    stats_sink: Arc<dyn StatsSink>,
}

impl AdmissionControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: AdmissionConfig::default(),
            breaker: None,
            sampler: None,
            clock: system_clock(),
            stats_sink: Arc::new(TracingStatsSink),
        }
    }

    /// Replace the whole configuration. Clears a breaker set through
    /// [`circuit_breaker`](Self::circuit_breaker).
    pub fn config(mut self, config: AdmissionConfig) -> Self {
        self.config = config;
        self.breaker = None;
        self
    }

    /// Load defaults plus `OFFLOAD_*` environment overrides.
    pub fn config_from_env(self) -> Self {
        self.config(AdmissionConfig::from_env())
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Breaker settings with sub-second timeout precision.
    pub fn circuit_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = Some(cfg);
        self
    }

    pub fn sample_window(mut self, window: Duration) -> Self {
        self.config.sample_window_ms = (window.as_millis() as u64).max(1);
        self
    }

    pub fn report_interval(mut self, every: Duration) -> Self {
        self.config.report_interval_secs = every.as_secs().max(1);
        self
    }

    /// Inject a sampler. Limit discovery is skipped entirely when set.
    pub fn sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Time source for the circuit breaker.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = sink;
        self
    }

    pub fn build(self) -> AdmissionController {
        let config = self.config.sanitized();
        let breaker = self.breaker.unwrap_or_else(|| config.breaker());
        let sampler = self.sampler.unwrap_or_else(|| {
            let discovery = LimitDiscovery::with_cgroup_root(config.cgroup_root.clone());
            Arc::new(ProcessSampler::new(discovery).with_window(config.sample_window()))
        });

        AdmissionController {
            sampler,
            breaker: CircuitBreaker::with_clock(breaker, self.clock),
            thresholds: RwLock::new(config.thresholds),
            gauge: Arc::new(RequestGauge::new()),
            stats: Arc::new(StatsAggregator::new()),
            stats_sink: self.stats_sink,
            report_interval: config.report_interval(),
        }
    }
}

impl Default for AdmissionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::resilience::CircuitState;
    use crate::sampler::ResourceSnapshot;
    use crate::Result;
    use async_trait::async_trait;

    struct Hot;

    #[async_trait]
    impl ResourceSampler for Hot {
        async fn sample(&self, _active: &RequestGauge) -> Result<ResourceSnapshot> {
            Ok(ResourceSnapshot {
                cpu_utilization: 1.0,
                memory_utilization: 0.0,
                active_request_count: 0,
            })
        }
    }

    #[test]
    fn builder_applies_thresholds_and_interval() {
        let c = AdmissionControllerBuilder::new()
            .sampler(Arc::new(Hot))
            .thresholds(Thresholds {
                cpu: 0.5,
                memory: 0.5,
                active_requests: 3,
            })
            .report_interval(Duration::from_secs(5))
            .build();
        assert_eq!(c.current_thresholds().active_requests, 3);
        assert_eq!(c.report_interval, Duration::from_secs(5));
    }

    #[test]
    fn zero_durations_in_config_are_raised() {
        let c = AdmissionControllerBuilder::new()
            .sampler(Arc::new(Hot))
            .config(AdmissionConfig {
                report_interval_secs: 0,
                sample_window_ms: 0,
                breaker_failure_threshold: 0,
                ..AdmissionConfig::default()
            })
            .build();
        assert_eq!(c.report_interval, Duration::from_secs(1));
        assert_eq!(c.breaker_snapshot().failure_threshold, 1);
    }

    #[test]
    fn sub_second_breaker_timeout_is_kept() {
        let clock = ManualClock::new();
        let c = AdmissionControllerBuilder::new()
            .sampler(Arc::new(Hot))
            .circuit_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(1)
                    .with_timeout(Duration::from_millis(500)),
            )
            .clock(Arc::new(clock.clone()))
            .build();
        assert_eq!(c.breaker_snapshot().timeout_ms, 500);

        c.breaker.record_outcome(false);
        assert!(c.breaker.is_open());
        clock.advance(Duration::from_millis(400));
        assert!(c.breaker.is_open());
        clock.advance(Duration::from_millis(101));
        assert!(!c.breaker.is_open());
    }

    #[tokio::test]
    async fn builder_wires_breaker_config_and_clock() {
        let clock = ManualClock::new();
        let c = AdmissionControllerBuilder::new()
            .sampler(Arc::new(Hot))
            .circuit_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(2)
                    .with_timeout(Duration::from_secs(10)),
            )
            .clock(Arc::new(clock.clone()))
            .build();

        c.evaluate().await;
        c.evaluate().await;
        assert_eq!(c.breaker_state(), CircuitState::Open);

        clock.advance(Duration::from_secs(11));
        c.evaluate().await;
        assert_eq!(c.breaker_state(), CircuitState::Open, "hot trial reopens");
        assert_eq!(c.breaker_snapshot().timeout_ms, 10_000);
    }
}
