pub mod exchange;
pub mod snapshot;
pub mod synthetic;
pub mod time_sync;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::market::MarketSnapshot;

pub use exchange::ExchangeManager;
pub use snapshot::SnapshotFeed;
pub use synthetic::SyntheticFeed;
pub use time_sync::HttpDateProbe;

/// Connectivity to the configured exchanges.
#[async_trait]
pub trait ExchangeConnectivity: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn test_connections(&self) -> bool;
    async fn cleanup(&self) -> Result<()>;
}

/// Source of the latest per-symbol market data.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn get_latest_snapshot(&self) -> Result<MarketSnapshot>;
    async fn test_connection(&self) -> bool;
    async fn cleanup(&self) -> Result<()>;
}

/// Measures local clock offset against a reference (positive = local behind).
#[async_trait]
pub trait TimeSyncProbe: Send + Sync {
    async fn clock_offset_ms(&self) -> Result<i64>;
}
