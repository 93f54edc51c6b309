//! Strategy registry.
//!
//! A strategy is selected once, at configuration time, and turned into a
//! `SignalGenerator` trait object. Cycles never look at the strategy tag.

pub mod mean_reversion;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::StrategyConfig;
use crate::error::ConfigError;
use crate::models::market::MarketSnapshot;
use crate::models::signal::Signal;

pub use mean_reversion::MeanReversion;

/// Produces trading signals from a market snapshot.
///
/// Implementations must be pure and deterministic: the same snapshot and
/// symbol list always yield the same signals, in the same order.
pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate `symbols` in order. Symbols missing from the snapshot are
    /// skipped.
    fn generate(&self, snapshot: &MarketSnapshot, symbols: &[String]) -> Vec<Signal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MeanReversion,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MeanReversion => write!(f, "mean_reversion"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mean_reversion" => Ok(StrategyKind::MeanReversion),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Build the configured strategy.
pub fn create_strategy(config: &StrategyConfig) -> Box<dyn SignalGenerator> {
    match config.kind {
        StrategyKind::MeanReversion => Box::new(MeanReversion::new(
            config.entry.rsi_low,
            config.exit.rsi_high,
        )),
    }
}
