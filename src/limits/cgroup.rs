//! Linux control-group limit layers.

use super::LimitProbe;
use crate::{Error, ErrorContext, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Mount point of the cgroup filesystem inside a container.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// cgroup v1 reports "no limit" as a page-aligned value close to `i64::MAX`.
const V1_UNLIMITED_FLOOR: u64 = 1 << 62;

/// Unified hierarchy (cgroup v2).
#[derive(Debug, Clone)]
pub struct CgroupV2Probe {
    root: PathBuf,
}

impl CgroupV2Probe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LimitProbe for CgroupV2Probe {
    fn name(&self) -> &'static str {
        "cgroup_v2"
    }

    fn cpu_cores(&self) -> Result<Option<f64>> {
        let path = self.root.join("cpu.max");
        parse_cpu_max(&read_trimmed(&path)?, &path)
    }

    fn memory_bytes(&self) -> Result<Option<u64>> {
        let path = self.root.join("memory.max");
        let content = read_trimmed(&path)?;
        if content == "max" {
            return Ok(None);
        }
        parse_u64(&content, &path, self.name()).map(Some)
    }
}

/// Legacy per-controller hierarchies (cgroup v1).
#[derive(Debug, Clone)]
pub struct CgroupV1Probe {
    root: PathBuf,
}

impl CgroupV1Probe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LimitProbe for CgroupV1Probe {
    fn name(&self) -> &'static str {
        "cgroup_v1"
    }

    fn cpu_cores(&self) -> Result<Option<f64>> {
        let quota_path = self.root.join("cpu").join("cpu.cfs_quota_us");
        let quota = read_trimmed(&quota_path)?;
        // -1 means no quota
        if quota.starts_with('-') {
            return Ok(None);
        }
        let quota = parse_u64(&quota, &quota_path, self.name())?;

        let period_path = self.root.join("cpu").join("cpu.cfs_period_us");
        let period = parse_u64(&read_trimmed(&period_path)?, &period_path, self.name())?;
        Ok(cores_from_quota(quota, period))
    }

    fn memory_bytes(&self) -> Result<Option<u64>> {
        let path = self.root.join("memory").join("memory.limit_in_bytes");
        let bytes = parse_u64(&read_trimmed(&path)?, &path, self.name())?;
        Ok((bytes < V1_UNLIMITED_FLOOR).then_some(bytes))
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// `cpu.max` holds `"<quota> <period>"`, quota being `max` when unbounded.
fn parse_cpu_max(content: &str, path: &Path) -> Result<Option<f64>> {
    let mut fields = content.split_whitespace();
    let quota = fields.next().unwrap_or_default();
    if quota == "max" {
        return Ok(None);
    }
    let quota = parse_u64(quota, path, "cgroup_v2")?;
    let period = match fields.next() {
        Some(p) => parse_u64(p, path, "cgroup_v2")?,
        None => 100_000,
    };
    Ok(cores_from_quota(quota, period))
}

fn cores_from_quota(quota: u64, period: u64) -> Option<f64> {
    if quota == 0 || period == 0 {
        return None;
    }
    Some(quota as f64 / period as f64)
}

fn parse_u64(value: &str, path: &Path, source: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|e| {
        Error::discovery_with_context(
            format!("expected an integer, got '{}'", value),
            ErrorContext::for_file(path, source).with_details(e.to_string()),
        )
    })
}
