//! Paper-mode startup as wired by the binary: synthetic feed into a
//! snapshot feed, real exchange manager, position ledger and paper fills,
//! driven by the scheduler on a paused clock.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use athena::config::Config;
use athena::engine::{Components, CycleOrchestrator, CycleScheduler};
use athena::execution::PaperBackend;
use athena::feeds::{snapshot, synthetic};
use athena::feeds::{ExchangeManager, SnapshotFeed, SyntheticFeed};
use athena::risk::position_manager::PositionManager;
use athena::telemetry::{MetricsCollector, MetricsPort};

#[tokio::test(start_paused = true)]
async fn test_slow_cadence_paper_run_has_data_from_first_cycle() {
    let mut config = Config::default();
    config.ops.cycle_interval_ms = 5_000;
    config.ops.error_threshold = 1;
    let config = Arc::new(config);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let feed = Arc::new(SnapshotFeed::new(Some(chrono::Duration::seconds(
        snapshot::DEFAULT_MAX_AGE_SECS,
    ))));
    let publisher = SyntheticFeed::new(feed.clone(), config.symbols(), synthetic::DEFAULT_TICK)
        .start(shutdown_tx.subscribe());

    let positions = Arc::new(PositionManager::new(dec!(10000)));
    let metrics = Arc::new(MetricsCollector::default());
    let mut orchestrator = CycleOrchestrator::new(
        config.clone(),
        Components {
            exchange: Arc::new(ExchangeManager::new(config.exchanges.clone(), Duration::from_secs(5))),
            market_data: feed.clone(),
            metrics: metrics.clone(),
            ledger: positions.clone(),
            paper_backend: Arc::new(PaperBackend::new(&config.paper, positions.clone())),
            live_backend: None,
            time_sync: None,
        },
    );
    orchestrator.initialize().await.unwrap();

    let cycle_shutdown = shutdown_tx.subscribe();
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(38)).await;
            let _ = shutdown_tx.send(());
        });
    }

    // Cycles at t=0, 5, ..., 35
    let cycles = CycleScheduler::from_config(&config)
        .run(&mut orchestrator, cycle_shutdown)
        .await
        .unwrap();

    assert_eq!(cycles, 8);
    assert_eq!(metrics.cycles(), 8);
    assert_eq!(metrics.get_error_count().await.unwrap(), 0);
    assert_eq!(feed.symbol_count(), config.symbols().len());

    let state = orchestrator.state_handle();
    assert!(!state.is_emergency_stopped());
    assert_eq!(state.consecutive_errors(), 0);

    orchestrator.cleanup().await;
    publisher.await.unwrap();
}
