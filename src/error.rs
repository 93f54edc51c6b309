//! Error taxonomy for the trading agent.
//!
//! Fatal classes (`ConfigError`, `InitializationError`) abort the process.
//! `CycleError` is contained inside a cycle and feeds the kill switch.
//! `ExecutionError` is per-signal and never escalates a cycle by itself.

use std::fmt;
use thiserror::Error;

use crate::engine::state::Lifecycle;
use crate::models::order::TradingMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("unknown strategy type: {0}")]
    UnknownStrategy(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Sub-components acquired during startup, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Exchange,
    MarketData,
    Metrics,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Exchange => write!(f, "exchange connectivity"),
            Component::MarketData => write!(f, "market data"),
            Component::Metrics => write!(f, "metrics"),
        }
    }
}

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("initialize() called in state {0}")]
    InvalidState(Lifecycle),

    #[error("{component} failed to start: {source}")]
    Component {
        component: Component,
        #[source]
        source: anyhow::Error,
    },

    #[error("safety check failed: {0}")]
    SafetyCheck(String),
}

/// `run_cycle()` was invoked before `initialize()` completed.
#[derive(Debug, Error)]
#[error("orchestrator not initialized (state: {0})")]
pub struct NotInitialized(pub Lifecycle);

/// Cycle stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Generate,
    Assess,
    Execute,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Generate => "generate",
            Stage::Assess => "assess",
            Stage::Execute => "execute",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} stage timed out after {after_ms}ms")]
    Timeout { stage: Stage, after_ms: u64 },

    #[error("invalid market snapshot: {0}")]
    InvalidSnapshot(String),
}

impl CycleError {
    pub fn stage(&self) -> Stage {
        match self {
            CycleError::Stage { stage, .. } | CycleError::Timeout { stage, .. } => *stage,
            CycleError::InvalidSnapshot(_) => Stage::Fetch,
        }
    }
}

/// Per-signal dispatch failure.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("no order backend configured for {0} mode")]
    NoBackend(TradingMode),

    #[error("order placement timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
