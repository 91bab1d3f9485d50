use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Number of requests currently in flight. Never goes below zero.
#[derive(Debug, Default)]
pub struct RequestGauge {
    active: AtomicU64,
}

impl RequestGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new value.
    pub fn increment(&self) -> u64 {
        self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Returns the new value. Decrementing at zero is a no-op.
    pub fn decrement(&self) -> u64 {
        match self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn current(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Marks one request as in flight until dropped.
///
/// Obtained from [`AdmissionController::begin_request`](super::AdmissionController::begin_request).
/// Dropping the guard on any path (early return, `?`, panic unwind) completes
/// the request exactly once.
#[must_use = "dropping the guard completes the request immediately"]
#[derive(Debug)]
pub struct RequestGuard {
    gauge: Arc<RequestGauge>,
}

impl RequestGuard {
    pub(crate) fn new(gauge: Arc<RequestGauge>) -> Self {
        Self { gauge }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let active = self.gauge.decrement();
        debug!(active, "request completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn decrement_clamps_at_zero() {
        let gauge = RequestGauge::new();
        assert_eq!(gauge.decrement(), 0);
        assert_eq!(gauge.increment(), 1);
        assert_eq!(gauge.decrement(), 0);
        assert_eq!(gauge.decrement(), 0);
        assert_eq!(gauge.current(), 0);
    }

    #[test]
    fn guard_releases_on_drop() {
        let gauge = Arc::new(RequestGauge::new());
        gauge.increment();
        {
            let _guard = RequestGuard::new(Arc::clone(&gauge));
            assert_eq!(gauge.current(), 1);
        }
        assert_eq!(gauge.current(), 0);
    }

    #[test]
    fn concurrent_unbalanced_updates_never_underflow() {
        let gauge = Arc::new(RequestGauge::new());
        let mut handles = vec![];
        for i in 0..8 {
            let g = Arc::clone(&gauge);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    if i % 2 == 0 {
                        g.increment();
                    }
                    g.decrement();
                    g.decrement();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gauge.current(), 0);
    }
}
