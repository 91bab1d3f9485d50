//! Run a workload locally or describe it for the caller to run.
//!
//! [`AdmissionController::dispatch`] wraps the whole usage contract: it
//! brackets the call with a request guard, asks for one decision, and either
//! executes the workload in-process (timing it) or returns its serializable
//! description. The controller never learns how remote execution went.
//!
//! `dispatch` runs the workload inline on the calling task, which blocks the
//! executor thread for the whole computation. For CPU-bound work on a shared
//! runtime use [`AdmissionController::dispatch_blocking`], which moves the
//! computation to tokio's blocking pool so other admission checks and their
//! sampling windows keep running.

use crate::admission::{AdmissionController, DecisionReason};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A unit of work the controller can place.
pub trait Workload {
    type Output;
    /// What the caller needs to run the work itself (code reference, inputs).
    type Descriptor: Serialize;

    fn name(&self) -> &str;

    /// Execute in-process.
    fn run(&self) -> Self::Output;

    fn describe(&self) -> Self::Descriptor;
}

/// Where a dispatched workload ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement<O, D> {
    Local {
        output: O,
        elapsed: Duration,
    },
    Remote {
        descriptor: D,
        reason: DecisionReason,
        details: String,
    },
}

impl<O, D> Placement<O, D> {
    pub fn is_local(&self) -> bool {
        matches!(self, Placement::Local { .. })
    }
}

impl AdmissionController {
    /// Decide and, if admitted, run `workload` on the current task.
    ///
    /// The computation blocks the executor thread until it returns. On a
    /// current-thread runtime nothing else makes progress meanwhile; prefer
    /// [`dispatch_blocking`](Self::dispatch_blocking) for heavy work.
    pub async fn dispatch<W: Workload>(&self, workload: &W) -> Placement<W::Output, W::Descriptor> {
        let _guard = self.begin_request();
        if let Some(remote) = self.offload_or_admit(workload).await {
            return remote;
        }

        let started = Instant::now();
        let output = workload.run();
        let elapsed = started.elapsed();
        log_local(workload.name(), elapsed);
        Placement::Local { output, elapsed }
    }

    /// Like [`dispatch`](Self::dispatch), but an admitted workload runs on
    /// tokio's blocking pool while this task awaits it.
    ///
    /// A panic inside the workload is resumed on the caller. Fails only when
    /// the blocking task is cancelled, which happens during runtime shutdown.
    pub async fn dispatch_blocking<W>(
        &self,
        workload: Arc<W>,
    ) -> Result<Placement<W::Output, W::Descriptor>>
    where
        W: Workload + Send + Sync + 'static,
        W::Output: Send + 'static,
    {
        let _guard = self.begin_request();
        if let Some(remote) = self.offload_or_admit(workload.as_ref()).await {
            return Ok(remote);
        }

        let started = Instant::now();
        let task = Arc::clone(&workload);
        let output = match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(output) => output,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(Error::workload_with_context(
                    "blocking workload cancelled",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source(workload.name()),
                ))
            }
        };
        let elapsed = started.elapsed();
        log_local(workload.name(), elapsed);
        Ok(Placement::Local { output, elapsed })
    }

    async fn offload_or_admit<W: Workload>(
        &self,
        workload: &W,
    ) -> Option<Placement<W::Output, W::Descriptor>> {
        let decision = self.evaluate().await;
        if decision.allowed {
            return None;
        }
        debug!(
            workload = workload.name(),
            reason = %decision.reason,
            "workload offloaded to caller"
        );
        Some(Placement::Remote {
            descriptor: workload.describe(),
            reason: decision.reason,
            details: decision.details,
        })
    }
}

fn log_local(name: &str, elapsed: Duration) {
    info!(
        workload = name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "workload executed locally"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::RequestGauge;
    use crate::sampler::{ResourceSampler, ResourceSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixed(f64);

    #[async_trait]
    impl ResourceSampler for Fixed {
        async fn sample(&self, active: &RequestGauge) -> Result<ResourceSnapshot> {
            Ok(ResourceSnapshot {
                cpu_utilization: self.0,
                memory_utilization: 0.0,
                active_request_count: active.current(),
            })
        }
    }

    struct Sum(u64);

    impl Workload for Sum {
        type Output = u64;
        type Descriptor = serde_json::Value;

        fn name(&self) -> &str {
            "sum"
        }
        fn run(&self) -> u64 {
            (1..=self.0).sum()
        }
        fn describe(&self) -> serde_json::Value {
            serde_json::json!({ "algorithm": "sum", "input": self.0 })
        }
    }

    #[tokio::test]
    async fn idle_node_runs_locally() {
        let c = AdmissionController::builder()
            .sampler(Arc::new(Fixed(0.1)))
            .build();
        let placement = c.dispatch(&Sum(10)).await;
        assert!(placement.is_local());
        match placement {
            Placement::Local { output, .. } => assert_eq!(output, 55),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.active_requests(), 0);
        assert_eq!(c.stats().server_operations, 1);
    }

    #[tokio::test]
    async fn busy_node_returns_descriptor() {
        let c = AdmissionController::builder()
            .sampler(Arc::new(Fixed(0.95)))
            .build();
        match c.dispatch(&Sum(10)).await {
            Placement::Remote {
                descriptor, reason, ..
            } => {
                assert_eq!(reason, DecisionReason::Cpu);
                assert_eq!(descriptor["input"], 10);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.active_requests(), 0);
        assert_eq!(c.stats().total_requests, 1);
    }
    /// Spins until `flag` is set by another task, up to a deadline.
    struct AwaitFlag(Arc<AtomicBool>);

    impl Workload for AwaitFlag {
        type Output = bool;
        type Descriptor = &'static str;

        fn name(&self) -> &str {
            "await_flag"
        }
        fn run(&self) -> bool {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if self.0.load(Ordering::SeqCst) {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            false
        }
        fn describe(&self) -> &'static str {
            "await_flag"
        }
    }

    // current-thread runtime: the flag task can only run if the workload is
    // off the executor thread
    #[tokio::test]
    async fn blocking_dispatch_lets_the_runtime_progress() {
        let c = AdmissionController::builder()
            .sampler(Arc::new(Fixed(0.1)))
            .build();
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move { setter.store(true, Ordering::SeqCst) });

        let placement = c.dispatch_blocking(Arc::new(AwaitFlag(flag))).await.unwrap();
        match placement {
            Placement::Local { output, .. } => assert!(output, "runtime stalled during workload"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.active_requests(), 0);
        assert_eq!(c.stats().server_operations, 1);
    }

    #[tokio::test]
    async fn blocking_dispatch_offloads_without_running() {
        let c = AdmissionController::builder()
            .sampler(Arc::new(Fixed(0.95)))
            .build();
        let placement = c.dispatch_blocking(Arc::new(Sum(10))).await.unwrap();
        assert!(!placement.is_local());
        assert_eq!(c.active_requests(), 0);
    }

    struct Explode;

    impl Workload for Explode {
        type Output = ();
        type Descriptor = ();

        fn name(&self) -> &str {
            "explode"
        }
        fn run(&self) {
            panic!("workload failed");
        }
        fn describe(&self) {}
    }

    #[tokio::test]
    #[should_panic(expected = "workload failed")]
    async fn blocking_dispatch_resumes_workload_panics() {
        let c = AdmissionController::builder()
            .sampler(Arc::new(Fixed(0.1)))
            .build();
        let _ = c.dispatch_blocking(Arc::new(Explode)).await;
    }
}
