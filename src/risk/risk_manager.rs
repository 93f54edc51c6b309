use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RiskConfig;
use crate::models::market::MarketSnapshot;
use crate::models::signal::Signal;

/// Source of portfolio state for risk checks.
#[async_trait]
pub trait PortfolioLedger: Send + Sync {
    /// Gross open exposure as a percent of equity.
    async fn exposure_pct(&self, snapshot: &MarketSnapshot) -> Result<f64>;

    /// Today's P&L (realized + unrealized) as a percent of starting capital.
    async fn daily_pnl_pct(&self, snapshot: &MarketSnapshot) -> Result<f64>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub can_trade: bool,
    pub reasons: Vec<String>,
    pub current_exposure_pct: f64,
    pub daily_pnl_pct: f64,
    /// Every input signal when `can_trade`, otherwise empty.
    pub approved_signals: Vec<Signal>,
}

/// Portfolio-level gate applied to each cycle's signals.
///
/// Hard veto: any breached limit blocks every signal in the cycle, not just
/// the symbol that caused it.
pub struct RiskAssessor {
    config: RiskConfig,
    ledger: Arc<dyn PortfolioLedger>,
}

impl RiskAssessor {
    pub fn new(config: RiskConfig, ledger: Arc<dyn PortfolioLedger>) -> Self {
        Self { config, ledger }
    }

    /// Query the ledger and gate `signals`.
    pub async fn assess(&self, signals: &[Signal], snapshot: &MarketSnapshot) -> Result<RiskAssessment> {
        let exposure = self.ledger.exposure_pct(snapshot).await?;
        let daily_pnl = self.ledger.daily_pnl_pct(snapshot).await?;
        Ok(self.evaluate(signals, exposure, daily_pnl))
    }

    /// Apply both gates. Each is checked independently and reasons accumulate.
    pub fn evaluate(&self, signals: &[Signal], exposure_pct: f64, daily_pnl_pct: f64) -> RiskAssessment {
        let mut reasons = Vec::new();

        if exposure_pct > self.config.global_exposure_cap_pct {
            reasons.push(format!(
                "Global exposure too high: {exposure_pct:.2}% > cap {:.2}%",
                self.config.global_exposure_cap_pct
            ));
        }

        if daily_pnl_pct < -self.config.daily_loss_cap_pct {
            reasons.push(format!(
                "Daily loss limit reached: {daily_pnl_pct:.2}% < -{:.2}%",
                self.config.daily_loss_cap_pct
            ));
        }

        let can_trade = reasons.is_empty();
        if can_trade {
            debug!(
                "RISK: approved {} signals (exposure={exposure_pct:.2}% pnl={daily_pnl_pct:.2}%)",
                signals.len()
            );
        } else {
            warn!(
                "RISK: vetoing {} signals: {}",
                signals.len(),
                reasons.join("; ")
            );
        }

        RiskAssessment {
            can_trade,
            reasons,
            current_exposure_pct: exposure_pct,
            daily_pnl_pct,
            approved_signals: if can_trade { signals.to_vec() } else { Vec::new() },
        }
    }
}
