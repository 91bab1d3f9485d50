//! Failure isolation for the admission check.
//!
//! ## Circuit Breaker
//!
//! The breaker stops the controller from repeatedly evaluating a node that
//! keeps coming back unhealthy:
//! - **Closed**: every check proceeds to resource sampling
//! - **Open**: checks are answered "offload" without sampling
//! - **Half-Open**: one trial sample decides whether to close again
//!
//! ```rust
//! use adaptive_offload::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if !breaker.is_open() {
//!     // Evaluate node health...
//!     breaker.record_outcome(true);
//! }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
