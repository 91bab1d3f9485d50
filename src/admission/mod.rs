//! Placement decisions: run locally or hand back to the caller.
//!
//! ## Overview
//!
//! Callers bracket every unit of work with a request guard and ask the
//! controller once per dispatch:
//!
//! ```rust,no_run
//! use adaptive_offload::AdmissionController;
//!
//! # async fn handle(controller: &AdmissionController) {
//! let _guard = controller.begin_request();
//! if controller.can_handle_on_server().await {
//!     // execute in-process
//! } else {
//!     // send the workload description back to the caller
//! }
//! # }
//! ```
//!
//! The check consults the circuit breaker, samples the node, compares the
//! snapshot against [`Thresholds`] in the fixed order cpu, memory, active
//! requests, then feeds the breaker and the stats counters. Every failure
//! path ends in "offload", never in an error.

mod builder;
mod controller;
mod decision;
mod gauge;
mod thresholds;

pub use builder::AdmissionControllerBuilder;
pub use controller::AdmissionController;
pub use decision::{AdmissionDecision, DecisionReason};
pub use gauge::{RequestGauge, RequestGuard};
pub use thresholds::{Thresholds, ThresholdsUpdate};
