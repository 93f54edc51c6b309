use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::cycle::CycleReport;
use crate::telemetry::alerts::AlertManager;
use crate::telemetry::MetricsPort;

/// In-process metrics sink. Counters are lock-free; the last report sits behind a lock.
pub struct MetricsCollector {
    cycles: AtomicU64,
    errors: AtomicU64,
    consecutive_errors: AtomicU32,
    signals_generated: AtomicU64,
    signals_approved: AtomicU64,
    vetoed_cycles: AtomicU64,
    trades_executed: AtomicU64,
    trades_failed: AtomicU64,
    emergency_stops: AtomicU64,
    open: AtomicBool,
    last_report: RwLock<Option<CycleReport>>,
    alerts: Option<Arc<AlertManager>>,
}

impl MetricsCollector {
    pub fn new(alerts: Option<Arc<AlertManager>>) -> Self {
        Self {
            cycles: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            signals_generated: AtomicU64::new(0),
            signals_approved: AtomicU64::new(0),
            vetoed_cycles: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            trades_failed: AtomicU64::new(0),
            emergency_stops: AtomicU64::new(0),
            open: AtomicBool::new(false),
            last_report: RwLock::new(None),
            alerts,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Failure streak as last reported by the orchestrator; zero after a recorded cycle.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    pub fn trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    pub fn trades_failed(&self) -> u64 {
        self.trades_failed.load(Ordering::Relaxed)
    }

    pub fn emergency_stops(&self) -> u64 {
        self.emergency_stops.load(Ordering::Relaxed)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub fn log_summary(&self) {
        info!(
            "=== METRICS === cycles={} errors={} streak={} signals={}/{} vetoed={} trades={} failed={} stops={}",
            self.cycles(),
            self.errors.load(Ordering::Relaxed),
            self.consecutive_errors(),
            self.signals_approved.load(Ordering::Relaxed),
            self.signals_generated.load(Ordering::Relaxed),
            self.vetoed_cycles.load(Ordering::Relaxed),
            self.trades_executed(),
            self.trades_failed(),
            self.emergency_stops(),
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl MetricsPort for MetricsCollector {
    async fn initialize(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        if let Some(alerts) = &self.alerts {
            if !alerts.is_configured() {
                warn!("Alerting enabled but no channel configured");
            }
        }
        Ok(())
    }

    async fn record_cycle(&self, report: &CycleReport) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            anyhow::bail!("metrics sink not initialized");
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.signals_generated
            .fetch_add(report.signals_generated as u64, Ordering::Relaxed);
        self.signals_approved
            .fetch_add(report.signals_approved as u64, Ordering::Relaxed);
        if !report.can_trade {
            self.vetoed_cycles.fetch_add(1, Ordering::Relaxed);
        }
        self.trades_executed
            .fetch_add(report.trades_executed as u64, Ordering::Relaxed);
        self.trades_failed
            .fetch_add(report.trades_failed as u64, Ordering::Relaxed);

        *self.last_report.write().await = Some(report.clone());
        Ok(())
    }

    async fn increment_error_count(&self, consecutive: u32) -> Result<()> {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.consecutive_errors.store(consecutive, Ordering::Relaxed);
        if let Some(alerts) = &self.alerts {
            alerts.on_cycle_error(consecutive).await;
        }
        Ok(())
    }

    async fn get_error_count(&self) -> Result<u64> {
        Ok(self.errors.load(Ordering::Relaxed))
    }

    async fn emergency_stop(&self, reason: &str) -> Result<()> {
        self.emergency_stops.fetch_add(1, Ordering::Relaxed);
        if let Some(alerts) = &self.alerts {
            alerts.on_kill_switch(reason).await;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.log_summary();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(can_trade: bool, executed: usize, failed: usize) -> CycleReport {
        CycleReport {
            cycle: 1,
            started_at: Utc::now(),
            duration_ms: 3,
            symbols_in_snapshot: 2,
            signals_generated: 2,
            signals_approved: if can_trade { 2 } else { 0 },
            can_trade,
            risk_reasons: vec![],
            trades_executed: executed,
            trades_failed: failed,
        }
    }

    #[tokio::test]
    async fn test_record_requires_initialize() {
        let metrics = MetricsCollector::default();
        assert!(metrics.record_cycle(&report(true, 1, 0)).await.is_err());

        metrics.initialize().await.unwrap();
        metrics.record_cycle(&report(true, 2, 0)).await.unwrap();
        metrics.record_cycle(&report(true, 1, 1)).await.unwrap();
        metrics.record_cycle(&report(false, 0, 0)).await.unwrap();

        assert_eq!(metrics.cycles(), 3);
        assert_eq!(metrics.trades_executed(), 3);
        assert_eq!(metrics.trades_failed(), 1);
        assert!(!metrics.last_report().await.unwrap().can_trade);

        metrics.cleanup().await.unwrap();
        assert!(metrics.record_cycle(&report(true, 1, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_error_count_is_monotonic() {
        let metrics = MetricsCollector::default();
        for n in 1..=4 {
            metrics.increment_error_count(n).await.unwrap();
        }
        assert_eq!(metrics.get_error_count().await.unwrap(), 4);
        assert_eq!(metrics.consecutive_errors(), 4);

        metrics.emergency_stop("test").await.unwrap();
        assert_eq!(metrics.emergency_stops(), 1);
    }

    #[tokio::test]
    async fn test_streak_resets_on_recorded_cycle() {
        let metrics = MetricsCollector::default();
        metrics.initialize().await.unwrap();
        metrics.increment_error_count(1).await.unwrap();
        metrics.increment_error_count(2).await.unwrap();
        metrics.record_cycle(&report(true, 1, 0)).await.unwrap();
        assert_eq!(metrics.consecutive_errors(), 0);

        metrics.increment_error_count(1).await.unwrap();
        assert_eq!(metrics.consecutive_errors(), 1);
        assert_eq!(metrics.get_error_count().await.unwrap(), 3);
    }
}
