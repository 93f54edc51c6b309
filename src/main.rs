use athena::config::Config;
use athena::engine::{Components, CycleOrchestrator, CycleScheduler};
use athena::execution::{OrderBackend, PaperBackend};
use athena::feeds::{snapshot, synthetic};
use athena::feeds::{ExchangeManager, HttpDateProbe, SnapshotFeed, SyntheticFeed, TimeSyncProbe};
use athena::models::order::TradingMode;
use athena::risk::position_manager::PositionManager;
use athena::telemetry::{AlertManager, MetricsCollector};

use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load config before tracing so its log level can be the default filter
    let loaded = Config::load();
    let level = loaded
        .as_ref()
        .map(|c| c.telemetry.log_level.clone())
        .unwrap_or_else(|_| "info".into());
    init_tracing(&level);

    let config = Arc::new(loaded.context("configuration error")?);

    info!("================================================");
    info!("  ATHENA trading agent v{}", env!("CARGO_PKG_VERSION"));
    info!("================================================");
    info!("  Mode:      {}", config.mode);
    info!(
        "  Strategy:  {} (buy < {}, sell > {})",
        config.strategy.kind, config.strategy.entry.rsi_low, config.strategy.exit.rsi_high
    );
    info!(
        "  Risk:      exposure cap {}%, daily loss cap {}%",
        config.risk.global_exposure_cap_pct, config.risk.daily_loss_cap_pct
    );
    info!(
        "  Kill switch: {} (threshold {} consecutive errors)",
        config.ops.kill_switch_enabled, config.ops.error_threshold
    );
    info!("  Symbols:   {:?}", config.symbols());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // === Market data ===
    let snapshot_feed = Arc::new(SnapshotFeed::new(Some(chrono::Duration::seconds(
        snapshot::DEFAULT_MAX_AGE_SECS,
    ))));
    if config.mode == TradingMode::Paper {
        SyntheticFeed::new(snapshot_feed.clone(), config.symbols(), synthetic::DEFAULT_TICK)
            .start(shutdown_tx.subscribe());
    } else {
        warn!("No market data publisher wired for {} mode", config.mode);
    }

    // === Portfolio and execution ===
    let starting_capital = Decimal::from_f64_retain(config.paper.starting_capital)
        .context("starting capital is not representable as a decimal")?;
    let positions = Arc::new(PositionManager::new(starting_capital));
    let paper_backend: Arc<dyn OrderBackend> =
        Arc::new(PaperBackend::new(&config.paper, positions.clone()));

    // === Telemetry ===
    let alerts = Arc::new(AlertManager::new(config.telemetry.clone()));
    let metrics = Arc::new(MetricsCollector::new(Some(alerts)));

    let time_sync = config.ops.time_sync_url.as_ref().map(|url| {
        Arc::new(HttpDateProbe::new(url.clone(), PROBE_TIMEOUT)) as Arc<dyn TimeSyncProbe>
    });

    let mut orchestrator = CycleOrchestrator::new(
        config.clone(),
        Components {
            exchange: Arc::new(ExchangeManager::new(config.exchanges.clone(), PROBE_TIMEOUT)),
            market_data: snapshot_feed.clone(),
            metrics: metrics.clone(),
            ledger: positions.clone(),
            paper_backend,
            live_backend: None,
            time_sync,
        },
    );

    if let Err(e) = orchestrator.initialize().await {
        error!("Startup aborted: {e}");
        let _ = shutdown_tx.send(());
        orchestrator.cleanup().await;
        return Err(e.into());
    }

    // === Spawn telemetry loop ===
    {
        let metrics = metrics.clone();
        let positions = positions.clone();
        let latency = orchestrator.latency();
        let state = orchestrator.state_handle();
        let every = Duration::from_secs(config.telemetry.summary_interval_secs.max(1));
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            let mut trading_day = Utc::now().date_naive();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let today = Utc::now().date_naive();
                        if today != trading_day {
                            positions.reset_daily().await;
                            trading_day = today;
                        }
                        info!(
                            "State: {} | consecutive errors: {} | emergency stop: {}",
                            state.lifecycle(),
                            state.consecutive_errors(),
                            state.is_emergency_stopped()
                        );
                        metrics.log_summary();
                        positions.log_summary().await;
                        latency.log_summary();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // === Ctrl+C ===
    let cycle_shutdown = shutdown_tx.subscribe();
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received, finishing current cycle..."),
                Err(e) => error!("Failed to listen for Ctrl+C, shutting down: {e}"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    info!("=== ATHENA running. Press Ctrl+C to shutdown. ===");
    let run = CycleScheduler::from_config(&config)
        .run(&mut orchestrator, cycle_shutdown)
        .await;

    let _ = shutdown_tx.send(());
    orchestrator.cleanup().await;
    positions.log_summary().await;

    let cycles = run?;
    info!("ATHENA shutdown complete after {cycles} cycles.");
    Ok(())
}
