pub mod engine;
pub mod paper;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::models::order::OrderAck;
use crate::models::signal::Signal;

pub use engine::ExecutionEngine;
pub use paper::PaperBackend;

/// Places a single order for an approved signal.
///
/// Paper mode uses a simulated backend; live mode an exchange adapter.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn place_order(&self, signal: &Signal) -> Result<OrderAck, ExecutionError>;
}
