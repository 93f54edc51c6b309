use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one completed cycle, reported to metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub symbols_in_snapshot: usize,
    pub signals_generated: usize,
    pub signals_approved: usize,
    pub can_trade: bool,
    pub risk_reasons: Vec<String>,
    pub trades_executed: usize,
    pub trades_failed: usize,
}
