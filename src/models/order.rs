use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::signal::{Action, Signal};

/// Selects the order backend: simulated (paper) or real exchange (live).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode '{other}' (expected paper|live)")),
        }
    }
}

/// Acknowledgement returned by an order backend for an accepted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub action: Action,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Filled,
    Failed,
}

/// Outcome of dispatching one approved signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub signal: Signal,
    pub status: ExecutionStatus,
    pub order_id: Option<String>,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn filled(signal: Signal, ack: &OrderAck) -> Self {
        Self {
            detail: format!("{} {} @ {}", ack.action, ack.quantity, ack.fill_price),
            order_id: Some(ack.order_id.clone()),
            signal,
            status: ExecutionStatus::Filled,
            timestamp: ack.timestamp,
        }
    }

    pub fn failed(signal: Signal, detail: impl Into<String>) -> Self {
        Self {
            signal,
            status: ExecutionStatus::Failed,
            order_id: None,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }
}

/// Per-signal results for one batch, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub mode: TradingMode,
    pub results: Vec<ExecutionResult>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// At least one signal in the batch failed to execute.
    pub fn is_partial_failure(&self) -> bool {
        self.failed() > 0
    }
}
