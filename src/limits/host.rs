//! Host-wide totals, the last discovery layer.

use super::LimitProbe;
use crate::Result;
use sysinfo::System;

/// All logical cores and all physical memory of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl LimitProbe for HostProbe {
    fn name(&self) -> &'static str {
        "host"
    }

    fn cpu_cores(&self) -> Result<Option<f64>> {
        let mut sys = System::new();
        sys.refresh_cpu();
        let cores = sys.cpus().len();
        if cores > 0 {
            return Ok(Some(cores as f64));
        }
        let cores = std::thread::available_parallelism()?.get();
        Ok(Some(cores as f64))
    }

    fn memory_bytes(&self) -> Result<Option<u64>> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        Ok((total > 0).then_some(total))
    }
}
