use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a placement decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    Healthy,
    Cpu,
    Memory,
    ActiveRequests,
    /// Breaker open, or the health evaluation itself failed.
    CircuitBreaker,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Healthy => "healthy",
            DecisionReason::Cpu => "cpu",
            DecisionReason::Memory => "memory",
            DecisionReason::ActiveRequests => "activeRequests",
            DecisionReason::CircuitBreaker => "circuitBreaker",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    /// `true` means run locally; `false` means hand the work back to the caller.
    pub allowed: bool,
    pub reason: DecisionReason,
    pub details: String,
}

impl AdmissionDecision {
    pub fn healthy() -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Healthy,
            details: "all metrics within thresholds".to_string(),
        }
    }

    /// A rejection. Passing [`DecisionReason::Healthy`] here is a logic error
    /// and still yields `allowed == false`.
    pub fn rejected(reason: DecisionReason, details: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_serialize_as_bucket_names() {
        for reason in [
            DecisionReason::Healthy,
            DecisionReason::Cpu,
            DecisionReason::Memory,
            DecisionReason::ActiveRequests,
            DecisionReason::CircuitBreaker,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, serde_json::Value::String(reason.as_str().to_string()));
        }
    }

    #[test]
    fn decision_json_shape() {
        let d = AdmissionDecision::rejected(DecisionReason::Cpu, "cpu 0.80 >= 0.75");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "cpu");
        assert_eq!(json["details"], "cpu 0.80 >= 0.75");
    }
}
