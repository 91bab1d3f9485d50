use super::decision::{AdmissionDecision, DecisionReason};
use crate::sampler::ResourceSnapshot;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Limits a snapshot must stay under for work to run locally.
///
/// A metric violates its threshold when it is greater than or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    /// Fraction of the CPU allotment.
    pub cpu: f64,
    /// Fraction of the memory ceiling.
    pub memory: f64,
    /// In-flight requests, counting the one being decided.
    #[serde(alias = "active_requests")]
    pub active_requests: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 0.75,
            memory: 0.60,
            active_requests: 12,
        }
    }
}

impl Thresholds {
    /// Overwrite only the fields present in `update`.
    pub fn merge(&mut self, update: &ThresholdsUpdate) {
        if let Some(cpu) = update.cpu {
            if let Some(v) = valid_ratio("cpu", cpu) {
                self.cpu = v;
            }
        }
        if let Some(memory) = update.memory {
            if let Some(v) = valid_ratio("memory", memory) {
                self.memory = v;
            }
        }
        if let Some(active) = update.active_requests {
            self.active_requests = active;
        }
    }

    /// Check cpu, then memory, then active requests; the first violation wins.
    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> AdmissionDecision {
        if snapshot.cpu_utilization >= self.cpu {
            return AdmissionDecision::rejected(
                DecisionReason::Cpu,
                format!("cpu {:.2} >= {:.2}", snapshot.cpu_utilization, self.cpu),
            );
        }
        if snapshot.memory_utilization >= self.memory {
            return AdmissionDecision::rejected(
                DecisionReason::Memory,
                format!("memory {:.2} >= {:.2}", snapshot.memory_utilization, self.memory),
            );
        }
        if snapshot.active_request_count >= self.active_requests {
            return AdmissionDecision::rejected(
                DecisionReason::ActiveRequests,
                format!(
                    "active requests {} >= {}",
                    snapshot.active_request_count, self.active_requests
                ),
            );
        }
        AdmissionDecision::healthy()
    }
}

fn valid_ratio(key: &str, value: f64) -> Option<f64> {
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        warn!(key, value, "ignoring invalid threshold value");
        None
    }
}

/// Partial threshold update. Absent fields keep their current value.
///
/// Deserializing ignores keys that are not threshold names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "active_requests")]
    pub active_requests: Option<u64>,
}

impl ThresholdsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn memory(mut self, memory: f64) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn active_requests(mut self, n: u64) -> Self {
        self.active_requests = Some(n);
        self
    }

    /// Parse an update from a JSON object such as `{"cpu": 0.5}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}
