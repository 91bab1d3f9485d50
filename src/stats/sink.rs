use super::Stats;
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Destination for periodic stats reports.
///
/// Report failures are swallowed by the reporter; a sink can never affect
/// admission decisions.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn report(&self, stats: Stats) -> Result<()>;
}

/// Discards every report.
pub struct NoopStatsSink;

#[async_trait]
impl StatsSink for NoopStatsSink {
    async fn report(&self, _stats: Stats) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn StatsSink> {
    Arc::new(NoopStatsSink)
}

/// Logs each report as a structured `info` event. This is the default sink.
#[derive(Debug, Default)]
pub struct TracingStatsSink;

#[async_trait]
impl StatsSink for TracingStatsSink {
    async fn report(&self, stats: Stats) -> Result<()> {
        let r = &stats.rejection_reasons;
        info!(
            total_requests = stats.total_requests,
            server_operations = stats.server_operations,
            client_operations = stats.client_operations,
            server_percentage = stats.server_percentage,
            client_percentage = stats.client_percentage,
            rejected_cpu = r.cpu,
            rejected_memory = r.memory,
            rejected_active_requests = r.active_requests,
            rejected_circuit_breaker = r.circuit_breaker,
            "admission stats"
        );
        Ok(())
    }
}

/// In-memory sink for testing.
pub struct InMemoryStatsSink {
    reports: Arc<RwLock<Vec<Stats>>>,
    max_reports: usize,
}

impl InMemoryStatsSink {
    pub fn new(max: usize) -> Self {
        Self {
            reports: Arc::new(RwLock::new(Vec::new())),
            max_reports: max,
        }
    }
    pub fn reports(&self) -> Vec<Stats> {
        self.reports.read().map(|r| r.clone()).unwrap_or_default()
    }
    pub fn len(&self) -> usize {
        self.reports.read().map(|r| r.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn clear(&self) {
        if let Ok(mut r) = self.reports.write() {
            r.clear();
        }
    }
}

#[async_trait]
impl StatsSink for InMemoryStatsSink {
    async fn report(&self, stats: Stats) -> Result<()> {
        if let Ok(mut reports) = self.reports.write() {
            reports.push(stats);
            if reports.len() > self.max_reports {
                reports.remove(0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsAggregator;

    #[tokio::test]
    async fn in_memory_sink_keeps_latest_reports() {
        let agg = StatsAggregator::new();
        let sink = InMemoryStatsSink::new(2);
        for _ in 0..3 {
            agg.record_request();
            sink.report(agg.snapshot()).await.unwrap();
        }
        let totals: Vec<u64> = sink.reports().iter().map(|s| s.total_requests).collect();
        assert_eq!(totals, vec![2, 3]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn tracing_and_noop_sinks_accept_reports() {
        let stats = StatsAggregator::new().snapshot();
        assert!(TracingStatsSink.report(stats.clone()).await.is_ok());
        assert!(noop_sink().report(stats).await.is_ok());
    }
}
