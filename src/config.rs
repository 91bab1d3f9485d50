//! Controller configuration.
//!
//! Every field has a default, so an empty YAML document is valid. Environment
//! variables override file values:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OFFLOAD_CPU_THRESHOLD` | `thresholds.cpu` |
//! | `OFFLOAD_MEMORY_THRESHOLD` | `thresholds.memory` |
//! | `OFFLOAD_MAX_ACTIVE_REQUESTS` | `thresholds.activeRequests` |
//! | `OFFLOAD_BREAKER_FAILURE_THRESHOLD` | `breaker_failure_threshold` |
//! | `OFFLOAD_BREAKER_TIMEOUT_SECS` | `breaker_timeout_secs` |
//! | `OFFLOAD_SAMPLE_WINDOW_MS` | `sample_window_ms` |
//! | `OFFLOAD_REPORT_INTERVAL_SECS` | `report_interval_secs` |
//! | `OFFLOAD_CGROUP_ROOT` | `cgroup_root` |
//!
//! Values that fail to parse are ignored.

use crate::admission::Thresholds;
use crate::limits::DEFAULT_CGROUP_ROOT;
use crate::resilience::CircuitBreakerConfig;
use crate::sampler::DEFAULT_SAMPLE_WINDOW;
use crate::stats::DEFAULT_REPORT_INTERVAL;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub thresholds: Thresholds,
    pub breaker_failure_threshold: u32,
    pub breaker_timeout_secs: u64,
    pub sample_window_ms: u64,
    pub report_interval_secs: u64,
    pub cgroup_root: PathBuf,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let breaker = CircuitBreakerConfig::default();
        Self {
            thresholds: Thresholds::default(),
            breaker_failure_threshold: breaker.failure_threshold,
            breaker_timeout_secs: breaker.timeout.as_secs(),
            sample_window_ms: DEFAULT_SAMPLE_WINDOW.as_millis() as u64,
            report_interval_secs: DEFAULT_REPORT_INTERVAL.as_secs(),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
        }
    }
}

impl AdmissionConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (the environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        if let Some(v) = get("OFFLOAD_CPU_THRESHOLD").and_then(|s| parse_ratio(&s)) {
            self.thresholds.cpu = v;
        }
        if let Some(v) = get("OFFLOAD_MEMORY_THRESHOLD").and_then(|s| parse_ratio(&s)) {
            self.thresholds.memory = v;
        }
        if let Some(v) = get("OFFLOAD_MAX_ACTIVE_REQUESTS").and_then(|s| parse::<u64>(&s)) {
            self.thresholds.active_requests = v;
        }
        if let Some(v) = get("OFFLOAD_BREAKER_FAILURE_THRESHOLD").and_then(|s| parse::<u32>(&s)) {
            self.breaker_failure_threshold = v.max(1);
        }
        if let Some(v) = get("OFFLOAD_BREAKER_TIMEOUT_SECS").and_then(|s| parse::<u64>(&s)) {
            self.breaker_timeout_secs = v;
        }
        if let Some(v) = get("OFFLOAD_SAMPLE_WINDOW_MS").and_then(|s| parse::<u64>(&s)) {
            self.sample_window_ms = v.max(1);
        }
        if let Some(v) = get("OFFLOAD_REPORT_INTERVAL_SECS").and_then(|s| parse::<u64>(&s)) {
            self.report_interval_secs = v.max(1);
        }
        if let Some(v) = get("OFFLOAD_CGROUP_ROOT").filter(|s| !s.is_empty()) {
            self.cgroup_root = PathBuf::from(v);
        }
        self
    }

    /// Clamp fields that would stall or disable the controller to their
    /// nearest usable value, logging each correction. Invalid ratios fall
    /// back to their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Thresholds::default();
        if !valid_ratio(self.thresholds.cpu) {
            warn!(value = self.thresholds.cpu, "invalid cpu threshold, using default");
            self.thresholds.cpu = defaults.cpu;
        }
        if !valid_ratio(self.thresholds.memory) {
            warn!(value = self.thresholds.memory, "invalid memory threshold, using default");
            self.thresholds.memory = defaults.memory;
        }
        if self.breaker_failure_threshold == 0 {
            warn!("breaker_failure_threshold 0 raised to 1");
            self.breaker_failure_threshold = 1;
        }
        if self.sample_window_ms == 0 {
            warn!("sample_window_ms 0 raised to 1");
            self.sample_window_ms = 1;
        }
        if self.report_interval_secs == 0 {
            warn!("report_interval_secs 0 raised to 1");
            self.report_interval_secs = 1;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !valid_ratio(self.thresholds.cpu) {
            return Err(invalid("thresholds.cpu", self.thresholds.cpu));
        }
        if !valid_ratio(self.thresholds.memory) {
            return Err(invalid("thresholds.memory", self.thresholds.memory));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(invalid("breaker_failure_threshold", 0));
        }
        if self.sample_window_ms == 0 {
            return Err(invalid("sample_window_ms", 0));
        }
        if self.report_interval_secs == 0 {
            return Err(invalid("report_interval_secs", 0));
        }
        Ok(())
    }

    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.breaker_failure_threshold)
            .with_timeout(Duration::from_secs(self.breaker_timeout_secs))
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.sample_window_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

fn parse<T: FromStr>(s: &str) -> Option<T> {
    s.parse::<T>().ok()
}

fn valid_ratio(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn parse_ratio(s: &str) -> Option<f64> {
    parse::<f64>(s).filter(|v| valid_ratio(*v))
}

fn invalid(field: &str, value: impl std::fmt::Display) -> Error {
    Error::configuration_with_context(
        format!("invalid value {}", value),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("admission_config"),
    )
}
