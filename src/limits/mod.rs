//! Effective CPU and memory ceilings of the running process.
//!
//! Discovery walks a list of [`LimitProbe`] layers for each resource
//! independently and keeps the first bounded answer:
//!
//! | Layer | Source |
//! |-------|--------|
//! | [`CgroupV2Probe`] | `cpu.max`, `memory.max` in the unified hierarchy |
//! | [`CgroupV1Probe`] | `cpu.cfs_quota_us` / `cpu.cfs_period_us`, `memory.limit_in_bytes` |
//! | [`HostProbe`] | all host cores and all physical memory |
//!
//! A layer that errors or reports "unbounded" is skipped with a warning.
//! Discovery itself never fails.

mod cgroup;
mod host;

pub use cgroup::{CgroupV1Probe, CgroupV2Probe, DEFAULT_CGROUP_ROOT};
pub use host::HostProbe;

use crate::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// CPU and memory allotment attributed to this process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// Fractional cores (a quota of 150ms per 100ms period is 1.5).
    pub cpu_cores: f64,
    pub memory_bytes: u64,
}

/// One layer of limit lookup.
///
/// `Ok(None)` means the layer has no bound to report for that resource.
pub trait LimitProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn cpu_cores(&self) -> Result<Option<f64>>;
    fn memory_bytes(&self) -> Result<Option<u64>>;
}

/// Ordered set of limit layers.
pub struct LimitDiscovery {
    probes: Vec<Box<dyn LimitProbe>>,
}

impl LimitDiscovery {
    /// cgroup v2, then cgroup v1, then host totals, all under the default root.
    pub fn system() -> Self {
        Self::with_cgroup_root(DEFAULT_CGROUP_ROOT)
    }

    pub fn with_cgroup_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_probes(vec![
            Box::new(CgroupV2Probe::new(root.clone())),
            Box::new(CgroupV1Probe::new(root)),
            Box::new(HostProbe),
        ])
    }

    pub fn from_probes(probes: Vec<Box<dyn LimitProbe>>) -> Self {
        Self { probes }
    }

    pub fn discover(&self) -> ResourceLimits {
        let cpu_cores = self.discover_cpu();
        let memory_bytes = self.discover_memory();
        let limits = ResourceLimits {
            cpu_cores,
            memory_bytes,
        };
        info!(
            cpu_cores = limits.cpu_cores,
            memory_bytes = limits.memory_bytes,
            "resource limits discovered"
        );
        limits
    }

    fn discover_cpu(&self) -> f64 {
        for probe in &self.probes {
            match probe.cpu_cores() {
                Ok(Some(cores)) if cores.is_finite() && cores > 0.0 => return cores,
                Ok(_) => warn!(layer = probe.name(), "no cpu limit reported, trying next layer"),
                Err(e) => warn!(layer = probe.name(), error = %e, "cpu limit lookup failed, trying next layer"),
            }
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        warn!(cores, "no layer reported a cpu limit, using available parallelism");
        cores as f64
    }

    fn discover_memory(&self) -> u64 {
        for probe in &self.probes {
            match probe.memory_bytes() {
                Ok(Some(bytes)) if bytes > 0 => return bytes,
                Ok(_) => warn!(layer = probe.name(), "no memory limit reported, trying next layer"),
                Err(e) => warn!(layer = probe.name(), error = %e, "memory limit lookup failed, trying next layer"),
            }
        }
        warn!("no layer reported a memory limit, memory threshold is inactive");
        u64::MAX
    }
}

impl Default for LimitDiscovery {
    fn default() -> Self {
        Self::system()
    }
}

/// Discover limits for the current environment using the default layers.
pub fn discover() -> ResourceLimits {
    LimitDiscovery::system().discover()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ErrorContext};

    struct Fixed {
        cpu: std::result::Result<Option<f64>, ()>,
        mem: std::result::Result<Option<u64>, ()>,
    }

    impl LimitProbe for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn cpu_cores(&self) -> Result<Option<f64>> {
            self.cpu.map_err(|_| {
                Error::discovery_with_context("unreadable", ErrorContext::new().with_source("fixed"))
            })
        }
        fn memory_bytes(&self) -> Result<Option<u64>> {
            self.mem.map_err(|_| {
                Error::discovery_with_context("unreadable", ErrorContext::new().with_source("fixed"))
            })
        }
    }

    #[test]
    fn first_bounded_layer_wins() {
        let discovery = LimitDiscovery::from_probes(vec![
            Box::new(Fixed { cpu: Ok(Some(2.0)), mem: Ok(Some(512)) }),
            Box::new(Fixed { cpu: Ok(Some(8.0)), mem: Ok(Some(4096)) }),
        ]);
        let limits = discovery.discover();
        assert_eq!(limits.cpu_cores, 2.0);
        assert_eq!(limits.memory_bytes, 512);
    }

    #[test]
    fn errors_and_unbounded_layers_are_skipped_per_resource() {
        let discovery = LimitDiscovery::from_probes(vec![
            Box::new(Fixed { cpu: Err(()), mem: Ok(None) }),
            Box::new(Fixed { cpu: Ok(None), mem: Ok(Some(1 << 30)) }),
            Box::new(Fixed { cpu: Ok(Some(4.0)), mem: Ok(Some(1 << 34)) }),
        ]);
        let limits = discovery.discover();
        assert_eq!(limits.cpu_cores, 4.0);
        assert_eq!(limits.memory_bytes, 1 << 30);
    }

    #[test]
    fn nonsense_cpu_values_are_skipped() {
        let discovery = LimitDiscovery::from_probes(vec![
            Box::new(Fixed { cpu: Ok(Some(0.0)), mem: Ok(Some(0)) }),
            Box::new(Fixed { cpu: Ok(Some(f64::NAN)), mem: Err(()) }),
            Box::new(Fixed { cpu: Ok(Some(0.5)), mem: Ok(Some(64)) }),
        ]);
        let limits = discovery.discover();
        assert_eq!(limits.cpu_cores, 0.5);
        assert_eq!(limits.memory_bytes, 64);
    }

    #[test]
    fn all_layers_failing_still_yields_limits() {
        let discovery = LimitDiscovery::from_probes(vec![Box::new(Fixed {
            cpu: Err(()),
            mem: Err(()),
        })]);
        let limits = discovery.discover();
        assert!(limits.cpu_cores >= 1.0);
        assert_eq!(limits.memory_bytes, u64::MAX);
    }

    #[test]
    fn limits_serialize_camel_case() {
        let limits = ResourceLimits {
            cpu_cores: 1.5,
            memory_bytes: 1024,
        };
        let json = serde_json::to_value(limits).unwrap();
        assert_eq!(json["cpuCores"], 1.5);
        assert_eq!(json["memoryBytes"], 1024);
    }
}
