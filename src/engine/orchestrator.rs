use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::state::{CycleState, Lifecycle, StateHandle};
use crate::error::{Component, CycleError, InitializationError, NotInitialized, Stage};
use crate::execution::{ExecutionEngine, OrderBackend};
use crate::feeds::{ExchangeConnectivity, MarketDataPort, TimeSyncProbe};
use crate::models::cycle::CycleReport;
use crate::risk::risk_manager::{PortfolioLedger, RiskAssessor};
use crate::signals::{create_strategy, SignalGenerator};
use crate::telemetry::{LatencyTracker, MetricsPort};

/// Collaborators injected into the orchestrator.
pub struct Components {
    pub exchange: Arc<dyn ExchangeConnectivity>,
    pub market_data: Arc<dyn MarketDataPort>,
    pub metrics: Arc<dyn MetricsPort>,
    pub ledger: Arc<dyn PortfolioLedger>,
    pub paper_backend: Arc<dyn OrderBackend>,
    pub live_backend: Option<Arc<dyn OrderBackend>>,
    pub time_sync: Option<Arc<dyn TimeSyncProbe>>,
}

/// A failed cycle, as seen after the error handler ran.
#[derive(Debug)]
pub struct CycleFailure {
    pub error: CycleError,
    pub consecutive_errors: u32,
    /// This failure pushed the count past the threshold and set the emergency stop.
    pub kill_switch_tripped: bool,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(CycleFailure),
    /// Emergency stop active; nothing was fetched or traded.
    Skipped,
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Failed(_))
    }
}

/// Drives fetch → generate → assess → execute → report, one cycle per call.
///
/// Owns the lifecycle, the consecutive-error counter and the emergency-stop
/// flag. Single writer: every mutation happens through `&mut self`, and
/// other tasks observe state through a `StateHandle`.
pub struct CycleOrchestrator {
    config: Arc<Config>,
    exchange: Arc<dyn ExchangeConnectivity>,
    market_data: Arc<dyn MarketDataPort>,
    metrics: Arc<dyn MetricsPort>,
    time_sync: Option<Arc<dyn TimeSyncProbe>>,
    strategy: Box<dyn SignalGenerator>,
    risk: RiskAssessor,
    execution: ExecutionEngine,
    symbols: Vec<String>,
    state: CycleState,
    handle: StateHandle,
    /// Started components, in acquisition order.
    acquired: Vec<Component>,
    latency: Arc<LatencyTracker>,
    cycles: u64,
}

impl CycleOrchestrator {
    pub fn new(config: Arc<Config>, components: Components) -> Self {
        let strategy = create_strategy(&config.strategy);
        let risk = RiskAssessor::new(config.risk.clone(), components.ledger);
        let execution = ExecutionEngine::new(
            components.paper_backend,
            components.live_backend,
            config.stage_timeout(),
        );
        let symbols = config.symbols();

        Self {
            exchange: components.exchange,
            market_data: components.market_data,
            metrics: components.metrics,
            time_sync: components.time_sync,
            strategy,
            risk,
            execution,
            symbols,
            state: CycleState::default(),
            handle: StateHandle::default(),
            acquired: Vec::new(),
            latency: Arc::new(LatencyTracker::new(1000)),
            cycles: 0,
            config,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle
    }

    pub fn state_handle(&self) -> StateHandle {
        self.handle.clone()
    }

    pub fn latency(&self) -> Arc<LatencyTracker> {
        self.latency.clone()
    }

    /// Start exchange, market data and metrics in that order, then run the
    /// safety checks. Any failure is fatal; components already started stay
    /// acquired until `cleanup()`.
    pub async fn initialize(&mut self) -> Result<(), InitializationError> {
        if self.state.lifecycle != Lifecycle::Uninitialized {
            return Err(InitializationError::InvalidState(self.state.lifecycle));
        }
        self.transition(Lifecycle::Initializing);
        info!(
            "Initializing agent: mode={} strategy={} symbols={:?}",
            self.config.mode,
            self.strategy.name(),
            self.symbols
        );

        let result = match self.start_components().await {
            Ok(()) => self.run_safety_checks().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Initialization failed: {e}");
            self.transition(Lifecycle::Uninitialized);
            return Err(e);
        }

        self.state.initialized = true;
        self.transition(Lifecycle::Ready);
        Ok(())
    }

    async fn start_components(&mut self) -> Result<(), InitializationError> {
        let limit = self.config.stage_timeout();
        for component in [Component::Exchange, Component::MarketData, Component::Metrics] {
            if self.acquired.contains(&component) {
                continue;
            }
            let started = match component {
                Component::Exchange => within(limit, self.exchange.initialize()).await,
                Component::MarketData => within(limit, self.market_data.initialize()).await,
                Component::Metrics => within(limit, self.metrics.initialize()).await,
            };
            started.map_err(|source| InitializationError::Component { component, source })?;
            self.acquired.push(component);
            info!("Started {component}");
        }
        Ok(())
    }

    async fn run_safety_checks(&self) -> Result<(), InitializationError> {
        let limit = self.config.stage_timeout();

        let exchanges_ok = tokio::time::timeout(limit, self.exchange.test_connections())
            .await
            .unwrap_or(false);
        if !exchanges_ok {
            return Err(InitializationError::SafetyCheck(
                "exchange connectivity probe failed".into(),
            ));
        }

        let data_ok = tokio::time::timeout(limit, self.market_data.test_connection())
            .await
            .unwrap_or(false);
        if !data_ok {
            return Err(InitializationError::SafetyCheck(
                "market data probe failed".into(),
            ));
        }

        if !self.execution.has_backend(self.config.mode) {
            return Err(InitializationError::SafetyCheck(format!(
                "no order backend for {} mode",
                self.config.mode
            )));
        }

        if self.config.ops.ntp_required {
            self.check_clock().await?;
        }

        info!("Safety checks passed");
        Ok(())
    }

    async fn check_clock(&self) -> Result<(), InitializationError> {
        let probe = self.time_sync.as_ref().ok_or_else(|| {
            InitializationError::SafetyCheck("time sync required but no probe configured".into())
        })?;
        let offset = within(self.config.stage_timeout(), probe.clock_offset_ms())
            .await
            .map_err(|e| InitializationError::SafetyCheck(format!("time sync probe failed: {e}")))?;

        let max = self.config.ops.max_clock_offset_ms;
        if offset.abs() > max {
            return Err(InitializationError::SafetyCheck(format!(
                "clock offset {offset}ms exceeds {max}ms"
            )));
        }
        info!("Clock offset {offset}ms (max {max}ms)");
        Ok(())
    }

    /// Run one cycle. Stage failures are contained and reported in the
    /// outcome; only calling before `initialize()` is an error.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, NotInitialized> {
        if !self.state.lifecycle.accepts_cycles() {
            return Err(NotInitialized(self.state.lifecycle));
        }
        if self.state.emergency_stop {
            warn!("Emergency stop active, cycle skipped");
            return Ok(CycleOutcome::Skipped);
        }
        if self.state.lifecycle == Lifecycle::Ready {
            self.state.running = true;
            self.transition(Lifecycle::Running);
        }

        self.cycles += 1;
        let cycle = self.cycles;

        let outcome = match self.execute_cycle(cycle).await {
            Ok(report) => {
                if self.state.consecutive_error_count > 0 {
                    info!(
                        "Cycle {cycle} recovered after {} consecutive errors",
                        self.state.consecutive_error_count
                    );
                }
                self.state.consecutive_error_count = 0;
                self.handle.publish(&self.state);
                CycleOutcome::Completed(report)
            }
            Err(e) => CycleOutcome::Failed(self.handle_cycle_error(cycle, e).await),
        };
        Ok(outcome)
    }

    async fn execute_cycle(&self, cycle: u64) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let snapshot = self
            .bounded(Stage::Fetch, self.market_data.get_latest_snapshot())
            .await?;
        snapshot.validate().map_err(CycleError::InvalidSnapshot)?;

        let signals = {
            let _timer = self.latency.start_timer(Stage::Generate.as_str());
            self.strategy.generate(&snapshot, &self.symbols)
        };
        debug!(
            "Cycle {cycle}: {} signals from {} symbols",
            signals.len(),
            snapshot.len()
        );

        let assessment = self
            .bounded(Stage::Assess, self.risk.assess(&signals, &snapshot))
            .await?;
        if !assessment.can_trade && !signals.is_empty() {
            warn!(
                "Cycle {cycle}: risk gate closed, {} signals blocked ({})",
                signals.len(),
                assessment.reasons.join("; ")
            );
        }

        let execution = {
            let _timer = self.latency.start_timer(Stage::Execute.as_str());
            self.execution
                .execute(&assessment.approved_signals, self.config.mode)
                .await
        };
        if execution.is_partial_failure() {
            warn!(
                "Cycle {cycle}: {} of {} orders failed",
                execution.failed(),
                execution.results.len()
            );
        }

        let report = CycleReport {
            cycle,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            symbols_in_snapshot: snapshot.len(),
            signals_generated: signals.len(),
            signals_approved: assessment.approved_signals.len(),
            can_trade: assessment.can_trade,
            risk_reasons: assessment.reasons,
            trades_executed: execution.succeeded(),
            trades_failed: execution.failed(),
        };
        self.bounded(Stage::Report, self.metrics.record_cycle(&report))
            .await?;
        Ok(report)
    }

    /// Await an external call under the stage timeout, timing it.
    async fn bounded<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, CycleError> {
        let _timer = self.latency.start_timer(stage.as_str());
        let limit = self.config.stage_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CycleError::Stage { stage, source }),
            Err(_) => Err(CycleError::Timeout {
                stage,
                after_ms: limit.as_millis() as u64,
            }),
        }
    }

    async fn handle_cycle_error(&mut self, cycle: u64, error: CycleError) -> CycleFailure {
        self.state.consecutive_error_count = self.state.consecutive_error_count.saturating_add(1);
        let count = self.state.consecutive_error_count;
        let threshold = self.config.ops.error_threshold;
        error!("Cycle {cycle} failed at {} ({count} consecutive): {error}", error.stage());

        // Metrics failures must not mask the cycle error
        if let Err(e) = within(self.config.stage_timeout(), self.metrics.increment_error_count(count)).await {
            warn!("Could not record cycle error in metrics: {e}");
        }

        let mut tripped = false;
        if count > threshold {
            if self.config.ops.kill_switch_enabled {
                let reason = format!(
                    "{count} consecutive cycle failures (threshold {threshold}), last: {error}"
                );
                self.trip_kill_switch(&reason).await;
                tripped = true;
            } else {
                error!("Error threshold exceeded ({count} > {threshold}) but kill switch is disabled");
            }
        }

        self.handle.publish(&self.state);
        CycleFailure {
            error,
            consecutive_errors: count,
            kill_switch_tripped: tripped,
        }
    }

    async fn trip_kill_switch(&mut self, reason: &str) {
        self.state.emergency_stop = true;
        self.transition(Lifecycle::EmergencyStopped);
        error!("KILL SWITCH TRIPPED: {reason}. No trades until operator reset");

        if let Err(e) = within(self.config.stage_timeout(), self.metrics.emergency_stop(reason)).await {
            warn!("Could not report emergency stop to metrics: {e}");
        }
    }

    /// Operator action: clear the emergency stop and error count. Returns
    /// false if no emergency stop was active.
    pub fn reset_emergency_stop(&mut self) -> bool {
        if !self.state.emergency_stop {
            return false;
        }
        warn!(
            "Emergency stop reset by operator (after {} consecutive errors)",
            self.state.consecutive_error_count
        );
        self.state.emergency_stop = false;
        self.state.consecutive_error_count = 0;
        self.transition(Lifecycle::Ready);
        true
    }

    /// Observe a shutdown request. Takes effect between cycles.
    pub fn stop(&mut self) {
        if self.state.running {
            info!("Stop requested");
            self.state.running = false;
            self.handle.publish(&self.state);
        }
    }

    /// Release started components in reverse order. Teardown failures are
    /// logged so every component still gets released.
    pub async fn cleanup(&mut self) {
        if self.state.lifecycle == Lifecycle::Terminated {
            return;
        }
        self.state.running = false;
        self.transition(Lifecycle::ShuttingDown);

        let limit = self.config.stage_timeout();
        while let Some(component) = self.acquired.pop() {
            let released = match component {
                Component::Metrics => within(limit, self.metrics.cleanup()).await,
                Component::MarketData => within(limit, self.market_data.cleanup()).await,
                Component::Exchange => within(limit, self.exchange.cleanup()).await,
            };
            match released {
                Ok(()) => info!("Released {component}"),
                Err(e) => error!("Failed to release {component}: {e}"),
            }
        }

        self.latency.log_summary();
        self.state.initialized = false;
        self.transition(Lifecycle::Terminated);
    }

    fn transition(&mut self, next: Lifecycle) {
        if self.state.lifecycle != next {
            info!("Lifecycle: {} -> {next}", self.state.lifecycle);
            self.state.lifecycle = next;
        }
        self.handle.publish(&self.state);
    }
}

async fn within<T>(
    limit: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow::anyhow!("timed out after {}ms", limit.as_millis()))?
}
