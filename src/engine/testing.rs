//! In-memory ports for orchestrator and scheduler unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::engine::orchestrator::{Components, CycleOrchestrator};
use crate::error::ExecutionError;
use crate::execution::OrderBackend;
use crate::feeds::{ExchangeConnectivity, MarketDataPort, TimeSyncProbe};
use crate::models::cycle::CycleReport;
use crate::models::market::{IndicatorBundle, MarketSnapshot};
use crate::models::order::OrderAck;
use crate::models::signal::Signal;
use crate::risk::risk_manager::PortfolioLedger;
use crate::telemetry::MetricsPort;

pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.ops.stage_timeout_ms = 1_000;
    config
}

/// BTC oversold (one buy), ETH neutral.
pub(crate) fn oversold_snapshot() -> MarketSnapshot {
    let now = Utc::now();
    MarketSnapshot::from_pairs([
        ("BTC/USDT", IndicatorBundle::new(25.0, now).with_price(100.0)),
        ("ETH/USDT", IndicatorBundle::new(50.0, now).with_price(10.0)),
    ])
}

pub(crate) struct FakeExchange {
    pub healthy: AtomicBool,
}

#[async_trait]
impl ExchangeConnectivity for FakeExchange {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connections(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct FakeData {
    snapshot: Mutex<MarketSnapshot>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

impl FakeData {
    pub fn set(&self, snapshot: MarketSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

#[async_trait]
impl MarketDataPort for FakeData {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn get_latest_snapshot(&self) -> Result<MarketSnapshot> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("feed down");
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeMetrics {
    pub cycles: AtomicUsize,
    pub errors: AtomicUsize,
    pub stops: AtomicUsize,
    pub reported_streaks: Mutex<Vec<u32>>,
}

#[async_trait]
impl MetricsPort for FakeMetrics {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn record_cycle(&self, _: &CycleReport) -> Result<()> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn increment_error_count(&self, consecutive: u32) -> Result<()> {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.reported_streaks.lock().unwrap().push(consecutive);
        Ok(())
    }

    async fn get_error_count(&self) -> Result<u64> {
        Ok(self.errors.load(Ordering::SeqCst) as u64)
    }

    async fn emergency_stop(&self, _: &str) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct FixedLedger {
    exposure: f64,
    pnl: f64,
}

#[async_trait]
impl PortfolioLedger for FixedLedger {
    async fn exposure_pct(&self, _: &MarketSnapshot) -> Result<f64> {
        Ok(self.exposure)
    }

    async fn daily_pnl_pct(&self, _: &MarketSnapshot) -> Result<f64> {
        Ok(self.pnl)
    }
}

#[derive(Default)]
pub(crate) struct AckBackend {
    pub calls: AtomicUsize,
}

#[async_trait]
impl OrderBackend for AckBackend {
    async fn place_order(&self, signal: &Signal) -> Result<OrderAck, ExecutionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderAck {
            order_id: format!("test-{n}"),
            symbol: signal.symbol.clone(),
            action: signal.action,
            quantity: dec!(1),
            fill_price: dec!(100),
            timestamp: Utc::now(),
        })
    }
}

pub(crate) struct FixedClock(pub i64);

#[async_trait]
impl TimeSyncProbe for FixedClock {
    async fn clock_offset_ms(&self) -> Result<i64> {
        Ok(self.0)
    }
}

pub(crate) struct Harness {
    pub exchange: Arc<FakeExchange>,
    pub data: Arc<FakeData>,
    pub metrics: Arc<FakeMetrics>,
    pub backend: Arc<AckBackend>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            exchange: Arc::new(FakeExchange {
                healthy: AtomicBool::new(true),
            }),
            data: Arc::new(FakeData {
                snapshot: Mutex::new(MarketSnapshot::default()),
                fail: AtomicBool::new(false),
                hang: AtomicBool::new(false),
            }),
            metrics: Arc::new(FakeMetrics::default()),
            backend: Arc::new(AckBackend::default()),
        }
    }

    fn components(&self, exposure: f64, pnl: f64) -> Components {
        Components {
            exchange: self.exchange.clone(),
            market_data: self.data.clone(),
            metrics: self.metrics.clone(),
            ledger: Arc::new(FixedLedger { exposure, pnl }),
            paper_backend: self.backend.clone(),
            live_backend: None,
            time_sync: None,
        }
    }

    pub fn orchestrator(&self, config: Config) -> CycleOrchestrator {
        self.orchestrator_with_ledger(config, 0.0, 0.0)
    }

    pub fn orchestrator_with_ledger(&self, config: Config, exposure: f64, pnl: f64) -> CycleOrchestrator {
        CycleOrchestrator::new(Arc::new(config), self.components(exposure, pnl))
    }

    pub fn orchestrator_with_clock(&self, config: Config, clock: FixedClock) -> CycleOrchestrator {
        let mut components = self.components(0.0, 0.0);
        components.time_sync = Some(Arc::new(clock));
        CycleOrchestrator::new(Arc::new(config), components)
    }
}
