use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;

use crate::config::Config;
use crate::engine::orchestrator::{CycleOrchestrator, CycleOutcome};
use crate::error::NotInitialized;

/// Runs cycles back to back with two cadences: `interval` after a completed
/// or skipped cycle, `backoff` after a failed one.
#[derive(Debug, Clone, Copy)]
pub struct CycleScheduler {
    interval: Duration,
    backoff: Duration,
}

impl CycleScheduler {
    pub fn new(interval: Duration, backoff: Duration) -> Self {
        Self { interval, backoff }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cycle_interval(), config.error_backoff())
    }

    pub fn delay_after(&self, outcome: &CycleOutcome) -> Duration {
        if outcome.is_failure() {
            self.backoff
        } else {
            self.interval
        }
    }

    /// Drive `orchestrator` until shutdown. Returns the number of cycles run.
    ///
    /// Shutdown is checked at the top of the loop and can cut a sleep short;
    /// an in-flight cycle always runs to completion.
    pub async fn run(
        &self,
        orchestrator: &mut CycleOrchestrator,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<u64, NotInitialized> {
        info!(
            "Scheduler started: interval={}ms backoff={}ms",
            self.interval.as_millis(),
            self.backoff.as_millis()
        );
        let mut cycles = 0u64;

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            let outcome = orchestrator.run_cycle().await?;
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.delay_after(&outcome)) => {}
                _ = shutdown.recv() => break,
            }
        }

        orchestrator.stop();
        info!("Scheduler stopped after {cycles} cycles");
        Ok(cycles)
    }
}
