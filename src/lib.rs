//! # adaptive-offload
//!
//! Resource-aware admission control for compute requests: run the requested
//! workload on this node, or hand it back to the caller to run itself.
//!
//! ## Overview
//!
//! The decision protects the node from overload while keeping as much work
//! local as capacity allows. It combines three pieces of state:
//!
//! - **Resource sampling** relative to the CPU and memory ceilings the
//!   environment actually grants (cgroup v2, cgroup v1, host totals)
//! - **A circuit breaker** that stops evaluating a node that keeps coming
//!   back unhealthy
//! - **Decision statistics** with server/client ratios and per-reason
//!   rejection counts
//!
//! Every failure path degrades toward offloading; nothing in the decision
//! path returns an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adaptive_offload::{AdmissionController, ThresholdsUpdate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = AdmissionController::builder().config_from_env().build();
//!     let _reporter = controller.spawn_stats_reporter();
//!
//!     let _guard = controller.begin_request();
//!     if controller.can_handle_on_server().await {
//!         // run locally
//!     }
//!
//!     controller.update_thresholds(&ThresholdsUpdate::new().cpu(0.5));
//!     println!("{:?}", controller.stats());
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`admission`] | Controller, thresholds, decisions, request gauge |
//! | [`limits`] | CPU/memory ceiling discovery |
//! | [`sampler`] | Utilization snapshots over a short window |
//! | [`resilience`] | Circuit breaker |
//! | [`stats`] | Decision counters and periodic reporting |
//! | [`dispatch`] | Local-or-remote execution helper |
//! | [`config`] | YAML and environment configuration |
//! | [`clock`] | Injectable time source |

pub mod admission;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod limits;
pub mod resilience;
pub mod sampler;
pub mod stats;

// Re-export main types for convenience
pub use admission::{
    AdmissionController, AdmissionControllerBuilder, AdmissionDecision, DecisionReason,
    RequestGuard, Thresholds, ThresholdsUpdate,
};
pub use config::AdmissionConfig;
pub use dispatch::{Placement, Workload};
pub use limits::ResourceLimits;
pub use resilience::CircuitState;
pub use sampler::ResourceSnapshot;
pub use stats::Stats;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
