use crate::{Error, ErrorContext, Result};
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, System};

/// Raw readings about the current process.
pub trait ProcessProbe: Send + Sync {
    /// Total CPU time (user + system) consumed so far.
    fn cpu_time(&self) -> Result<Duration>;
    /// Memory in active use, in bytes.
    fn memory_in_use(&self) -> Result<u64>;
}

/// Reads this process through `getrusage` and `sysinfo`.
pub struct SystemProcessProbe {
    pid: Option<Pid>,
    sys: Mutex<System>,
}

impl SystemProcessProbe {
    pub fn new() -> Self {
        Self {
            pid: sysinfo::get_current_pid().ok(),
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProcessProbe {
    #[cfg(unix)]
    fn cpu_time(&self) -> Result<Duration> {
        use nix::sys::resource::{getrusage, UsageWho};

        let usage = getrusage(UsageWho::RUSAGE_SELF).map_err(|errno| {
            Error::sampling_with_context(
                "getrusage failed",
                ErrorContext::new()
                    .with_details(errno.to_string())
                    .with_source("process_probe"),
            )
        })?;
        let user = usage.user_time();
        let system = usage.system_time();
        let micros = (user.tv_sec() + system.tv_sec()) as i128 * 1_000_000
            + (user.tv_usec() + system.tv_usec()) as i128;
        Ok(Duration::from_micros(micros.max(0) as u64))
    }

    #[cfg(not(unix))]
    fn cpu_time(&self) -> Result<Duration> {
        Err(Error::sampling_with_context(
            "process CPU time is not available on this platform",
            ErrorContext::new().with_source("process_probe"),
        ))
    }

    fn memory_in_use(&self) -> Result<u64> {
        let pid = self.pid.ok_or_else(|| {
            Error::sampling_with_context(
                "current pid unknown",
                ErrorContext::new().with_source("process_probe"),
            )
        })?;
        let mut sys = match self.sys.lock() {
            Ok(sys) => sys,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !sys.refresh_process(pid) {
            return Err(Error::sampling_with_context(
                "process vanished from the process table",
                ErrorContext::new()
                    .with_details(format!("pid {}", pid))
                    .with_source("process_probe"),
            ));
        }
        sys.process(pid).map(|p| p.memory()).ok_or_else(|| {
            Error::sampling_with_context(
                "process memory unavailable",
                ErrorContext::new().with_source("process_probe"),
            )
        })
    }
}
