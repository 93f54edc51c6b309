pub mod alerts;
pub mod latency;
pub mod metrics;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::cycle::CycleReport;

pub use alerts::AlertManager;
pub use latency::LatencyTracker;
pub use metrics::MetricsCollector;

/// Sink for cycle outcomes and error counters.
#[async_trait]
pub trait MetricsPort: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn record_cycle(&self, report: &CycleReport) -> Result<()>;

    /// Called once per failed cycle with the current consecutive-failure count.
    async fn increment_error_count(&self, consecutive: u32) -> Result<()>;

    async fn get_error_count(&self) -> Result<u64>;

    /// Notified once when the kill switch trips.
    async fn emergency_stop(&self, _reason: &str) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<()>;
}
