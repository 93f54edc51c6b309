use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::PaperConfig;
use crate::error::ExecutionError;
use crate::execution::OrderBackend;
use crate::models::order::OrderAck;
use crate::models::signal::{Action, Signal};
use crate::risk::position_manager::PositionManager;

const QTY_DP: u32 = 8;

/// Simulated order backend for paper mode.
///
/// Fills immediately at the signal's reference price, adjusted by a fixed
/// slippage against us. Order size is `order_notional * strength`. Sells are
/// capped at the held quantity; there is no shorting.
pub struct PaperBackend {
    positions: Arc<PositionManager>,
    order_notional: Decimal,
    slippage_bps: Decimal,
}

impl PaperBackend {
    pub fn new(config: &PaperConfig, positions: Arc<PositionManager>) -> Self {
        Self {
            positions,
            order_notional: Decimal::from_f64_retain(config.order_notional).unwrap_or(Decimal::ZERO),
            slippage_bps: Decimal::from_f64_retain(config.slippage_bps).unwrap_or(Decimal::ZERO),
        }
    }

    fn fill_price(&self, reference: Decimal, action: Action) -> Decimal {
        let slip = reference * self.slippage_bps / Decimal::from(10_000);
        match action {
            Action::Buy => reference + slip,
            Action::Sell => reference - slip,
        }
    }
}

#[async_trait]
impl OrderBackend for PaperBackend {
    async fn place_order(&self, signal: &Signal) -> Result<OrderAck, ExecutionError> {
        let reference = signal
            .price
            .and_then(Decimal::from_f64_retain)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ExecutionError::Rejected(format!("no reference price for {}", signal.symbol)))?;
        let strength = Decimal::from_f64_retain(signal.strength.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);

        let fill_price = self.fill_price(reference, signal.action);
        if fill_price <= Decimal::ZERO {
            return Err(ExecutionError::Rejected(format!(
                "fill price {fill_price} for {} is not positive",
                signal.symbol
            )));
        }
        let mut quantity = (self.order_notional * strength / fill_price).round_dp(QTY_DP);

        if signal.action == Action::Sell {
            let held = self.positions.held_quantity(&signal.symbol).await;
            if held.is_zero() {
                return Err(ExecutionError::Rejected(format!(
                    "no open position in {} to sell",
                    signal.symbol
                )));
            }
            quantity = quantity.min(held);
        }

        if quantity.is_zero() {
            return Err(ExecutionError::Rejected("order quantity rounds to zero".into()));
        }

        let ack = OrderAck {
            order_id: format!("paper-{}", Uuid::new_v4()),
            symbol: signal.symbol.clone(),
            action: signal.action,
            quantity,
            fill_price,
            timestamp: Utc::now(),
        };

        self.positions
            .record_fill(&ack)
            .await
            .map_err(|e| ExecutionError::Rejected(e.to_string()))?;

        debug!(
            "Paper fill: {} {} {} @ {}",
            ack.action, ack.quantity, ack.symbol, ack.fill_price
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn backend(capital: Decimal) -> (PaperBackend, Arc<PositionManager>) {
        backend_with_slippage(capital, 10.0)
    }

    fn backend_with_slippage(capital: Decimal, slippage_bps: f64) -> (PaperBackend, Arc<PositionManager>) {
        let positions = Arc::new(PositionManager::new(capital));
        let config = PaperConfig {
            starting_capital: 0.0,
            order_notional: 100.0,
            slippage_bps,
        };
        (PaperBackend::new(&config, positions.clone()), positions)
    }

    fn signal(action: Action, strength: f64, price: Option<f64>) -> Signal {
        Signal {
            symbol: "BTC".into(),
            action,
            strength,
            timestamp: Utc::now(),
            reason: "test".into(),
            price,
        }
    }

    #[tokio::test]
    async fn test_buy_fills_with_slippage() {
        let (paper, positions) = backend(dec!(1000));
        let ack = paper.place_order(&signal(Action::Buy, 0.5, Some(100.0))).await.unwrap();

        assert_eq!(ack.fill_price, dec!(100.1));
        // 50 notional / 100.1
        assert_eq!(ack.quantity, (dec!(50) / dec!(100.1)).round_dp(8));
        assert!(ack.order_id.starts_with("paper-"));
        assert_eq!(positions.held_quantity("BTC").await, ack.quantity);
    }

    #[tokio::test]
    async fn test_sell_capped_at_holding() {
        let (paper, positions) = backend(dec!(1000));
        let bought = paper.place_order(&signal(Action::Buy, 0.1, Some(100.0))).await.unwrap();
        let sold = paper.place_order(&signal(Action::Sell, 1.0, Some(100.0))).await.unwrap();

        assert_eq!(sold.quantity, bought.quantity);
        assert_eq!(sold.fill_price, dec!(99.9));
        assert!(positions.held_quantity("BTC").await.is_zero());
    }

    #[tokio::test]
    async fn test_sell_without_position_rejected() {
        let (paper, _) = backend(dec!(1000));
        let err = paper.place_order(&signal(Action::Sell, 0.5, Some(100.0))).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_missing_price_rejected() {
        let (paper, _) = backend(dec!(1000));
        let err = paper.place_order(&signal(Action::Buy, 0.5, None)).await.unwrap_err();
        assert!(err.to_string().contains("no reference price"));
    }

    #[tokio::test]
    async fn test_insufficient_cash_rejected() {
        let (paper, positions) = backend(dec!(10));
        assert!(paper.place_order(&signal(Action::Buy, 1.0, Some(100.0))).await.is_err());
        assert_eq!(positions.cash().await, dec!(10));
    }

    #[tokio::test]
    async fn test_full_slippage_sell_rejected_without_touching_ledger() {
        let (paper, positions) = backend_with_slippage(dec!(1000), 10_000.0);
        // Buy fills at twice the reference
        let bought = paper.place_order(&signal(Action::Buy, 1.0, Some(100.0))).await.unwrap();
        assert_eq!(bought.fill_price, dec!(200));

        let err = paper.place_order(&signal(Action::Sell, 1.0, Some(100.0))).await.unwrap_err();
        assert!(err.to_string().contains("not positive"));
        assert_eq!(positions.held_quantity("BTC").await, bought.quantity);
    }

    #[tokio::test]
    async fn test_negative_fill_price_rejected() {
        let (paper, positions) = backend_with_slippage(dec!(1000), 15_000.0);
        paper.place_order(&signal(Action::Buy, 0.1, Some(100.0))).await.unwrap();
        let held = positions.held_quantity("BTC").await;

        assert!(paper.place_order(&signal(Action::Sell, 1.0, Some(100.0))).await.is_err());
        assert_eq!(positions.held_quantity("BTC").await, held);
    }
}
