use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::feeds::MarketDataPort;
use crate::models::market::{IndicatorBundle, MarketSnapshot};

/// Bundles older than this are dropped from paper-mode snapshots.
pub const DEFAULT_MAX_AGE_SECS: i64 = 30;

/// Latest-value store for per-symbol indicator bundles.
///
/// Publishers (ingestion tasks, the synthetic feed) call `publish`; the
/// cycle reads a point-in-time copy via `get_latest_snapshot`.
pub struct SnapshotFeed {
    latest: Arc<DashMap<String, IndicatorBundle>>,
    max_age: Option<chrono::Duration>,
    open: AtomicBool,
}

impl SnapshotFeed {
    pub fn new(max_age: Option<chrono::Duration>) -> Self {
        Self {
            latest: Arc::new(DashMap::new()),
            max_age,
            open: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, symbol: impl Into<String>, bundle: IndicatorBundle) {
        self.latest.insert(symbol.into(), bundle);
    }

    pub fn symbol_count(&self) -> usize {
        self.latest.len()
    }
}

impl Default for SnapshotFeed {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl MarketDataPort for SnapshotFeed {
    async fn initialize(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        info!("Snapshot feed open ({} symbols cached)", self.latest.len());
        Ok(())
    }

    async fn get_latest_snapshot(&self) -> Result<MarketSnapshot> {
        if !self.open.load(Ordering::SeqCst) {
            anyhow::bail!("Snapshot feed is not open");
        }

        let now = Utc::now();
        let mut bundles = BTreeMap::new();
        for entry in self.latest.iter() {
            if let Some(max_age) = self.max_age {
                let age = now - entry.value().timestamp;
                if age > max_age {
                    warn!(
                        "Dropping stale data for {}: {}ms old",
                        entry.key(),
                        age.num_milliseconds()
                    );
                    continue;
                }
            }
            bundles.insert(entry.key().clone(), entry.value().clone());
        }

        if bundles.is_empty() {
            anyhow::bail!("No fresh market data available");
        }

        Ok(MarketSnapshot::new(bundles, now))
    }

    async fn test_connection(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn cleanup(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.latest.clear();
        info!("Snapshot feed closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_requires_open_feed() {
        let feed = SnapshotFeed::default();
        feed.publish("BTC", IndicatorBundle::new(40.0, Utc::now()));
        assert!(feed.get_latest_snapshot().await.is_err());
        assert!(!feed.test_connection().await);

        feed.initialize().await.unwrap();
        let snap = feed.get_latest_snapshot().await.unwrap();
        assert_eq!(snap.get("BTC").unwrap().rsi, 40.0);
    }

    #[tokio::test]
    async fn test_empty_feed_is_error() {
        let feed = SnapshotFeed::default();
        feed.initialize().await.unwrap();
        assert!(feed.get_latest_snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_stale_bundles_dropped() {
        let feed = SnapshotFeed::new(Some(chrono::Duration::seconds(10)));
        feed.initialize().await.unwrap();
        feed.publish("OLD", IndicatorBundle::new(40.0, Utc::now() - chrono::Duration::minutes(5)));
        feed.publish("NEW", IndicatorBundle::new(60.0, Utc::now()));

        let snap = feed.get_latest_snapshot().await.unwrap();
        assert!(snap.get("OLD").is_none());
        assert!(snap.get("NEW").is_some());
    }

    #[tokio::test]
    async fn test_cleanup_closes() {
        let feed = SnapshotFeed::default();
        feed.initialize().await.unwrap();
        feed.publish("BTC", IndicatorBundle::new(40.0, Utc::now()));
        feed.cleanup().await.unwrap();
        assert!(!feed.test_connection().await);
        assert_eq!(feed.symbol_count(), 0);
    }
}
