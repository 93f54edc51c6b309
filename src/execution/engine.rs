use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ExecutionError;
use crate::execution::OrderBackend;
use crate::models::order::{ExecutionReport, ExecutionResult, OrderAck, TradingMode};
use crate::models::signal::Signal;

/// Dispatches approved signals to the backend for the active mode.
///
/// Every signal is dispatched independently: a failure is recorded in that
/// signal's result and the remaining signals are still sent.
pub struct ExecutionEngine {
    paper: Arc<dyn OrderBackend>,
    live: Option<Arc<dyn OrderBackend>>,
    order_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(
        paper: Arc<dyn OrderBackend>,
        live: Option<Arc<dyn OrderBackend>>,
        order_timeout: Duration,
    ) -> Self {
        Self {
            paper,
            live,
            order_timeout,
        }
    }

    pub fn has_backend(&self, mode: TradingMode) -> bool {
        match mode {
            TradingMode::Paper => true,
            TradingMode::Live => self.live.is_some(),
        }
    }

    fn backend(&self, mode: TradingMode) -> Option<&Arc<dyn OrderBackend>> {
        match mode {
            TradingMode::Paper => Some(&self.paper),
            TradingMode::Live => self.live.as_ref(),
        }
    }

    /// Execute `approved` in order. Returns one result per signal.
    pub async fn execute(&self, approved: &[Signal], mode: TradingMode) -> ExecutionReport {
        if approved.is_empty() {
            return ExecutionReport {
                mode,
                results: Vec::new(),
            };
        }

        info!("Dispatching batch of {} signals ({mode})", approved.len());

        let mut results = Vec::with_capacity(approved.len());
        for signal in approved {
            let result = match self.dispatch(signal, mode).await {
                Ok(ack) => {
                    info!("Executed {signal}: order={}", ack.order_id);
                    ExecutionResult::filled(signal.clone(), &ack)
                }
                Err(e) => {
                    error!("Execution failed for {signal}: {e}");
                    ExecutionResult::failed(signal.clone(), e.to_string())
                }
            };
            results.push(result);
        }

        let report = ExecutionReport { mode, results };
        info!(
            "Batch result: {} filled, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }

    async fn dispatch(&self, signal: &Signal, mode: TradingMode) -> Result<OrderAck, ExecutionError> {
        let backend = self.backend(mode).ok_or(ExecutionError::NoBackend(mode))?;
        match tokio::time::timeout(self.order_timeout, backend.place_order(signal)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.order_timeout.as_millis() as u64)),
        }
    }
}
