use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::market::MarketSnapshot;
use crate::models::order::OrderAck;
use crate::models::position::{Portfolio, Position};
use crate::models::signal::Action;
use crate::risk::risk_manager::PortfolioLedger;

/// Tracks cash and open positions for the agent.
///
/// Reads are concurrent; writes are serialized by the RwLock.
pub struct PositionManager {
    pub portfolio: Arc<RwLock<Portfolio>>,
}

impl PositionManager {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            portfolio: Arc::new(RwLock::new(Portfolio::new(starting_capital))),
        }
    }

    /// Apply a filled order. Returns the realized P&L (zero for buys).
    pub async fn record_fill(&self, ack: &OrderAck) -> Result<Decimal> {
        let mut portfolio = self.portfolio.write().await;

        match ack.action {
            Action::Buy => {
                let cost = ack.fill_price * ack.quantity;
                if cost > portfolio.cash {
                    anyhow::bail!("Insufficient cash: need={cost} have={}", portfolio.cash);
                }

                match portfolio.positions.iter_mut().find(|p| p.symbol == ack.symbol) {
                    Some(pos) => {
                        // Average in
                        let total_cost = pos.cost_basis() + cost;
                        pos.quantity += ack.quantity;
                        pos.avg_entry_price = total_cost / pos.quantity;
                    }
                    None => portfolio.positions.push(Position {
                        symbol: ack.symbol.clone(),
                        quantity: ack.quantity,
                        avg_entry_price: ack.fill_price,
                        opened_at: Utc::now(),
                    }),
                }

                portfolio.cash -= cost;
                Ok(Decimal::ZERO)
            }
            Action::Sell => {
                let Some(idx) = portfolio.positions.iter().position(|p| p.symbol == ack.symbol) else {
                    anyhow::bail!("No open position in {}", ack.symbol);
                };
                let held = portfolio.positions[idx].quantity;
                if ack.quantity > held {
                    anyhow::bail!("Cannot sell {} {}: only {held} held", ack.quantity, ack.symbol);
                }

                let entry = portfolio.positions[idx].avg_entry_price;
                let proceeds = ack.fill_price * ack.quantity;
                let pnl = proceeds - entry * ack.quantity;

                portfolio.positions[idx].quantity -= ack.quantity;
                if portfolio.positions[idx].quantity.is_zero() {
                    portfolio.positions.remove(idx);
                }

                portfolio.cash += proceeds;
                portfolio.daily_realized_pnl += pnl;
                portfolio.total_pnl += pnl;
                portfolio.total_trades += 1;
                if pnl > Decimal::ZERO {
                    portfolio.winning_trades += 1;
                }

                info!(
                    "Closed {} {}: pnl={pnl} daily_realized={}",
                    ack.quantity, ack.symbol, portfolio.daily_realized_pnl
                );
                Ok(pnl)
            }
        }
    }

    /// Quantity currently held for `symbol`.
    pub async fn held_quantity(&self, symbol: &str) -> Decimal {
        self.portfolio
            .read()
            .await
            .position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn cash(&self) -> Decimal {
        self.portfolio.read().await.cash
    }

    /// Start a new trading day.
    pub async fn reset_daily(&self) {
        let mut portfolio = self.portfolio.write().await;
        portfolio.daily_realized_pnl = Decimal::ZERO;
        info!("Daily P&L reset");
    }

    pub async fn log_summary(&self) {
        let portfolio = self.portfolio.read().await;
        info!(
            "=== PORTFOLIO === cash={} positions={} daily_realized={} total_pnl={} trades={} win_rate={:.1}%",
            portfolio.cash,
            portfolio.positions.len(),
            portfolio.daily_realized_pnl,
            portfolio.total_pnl,
            portfolio.total_trades,
            portfolio.win_rate() * 100.0,
        );
    }
}

fn marks(snapshot: &MarketSnapshot) -> impl Fn(&str) -> Option<Decimal> + '_ {
    move |symbol: &str| snapshot.last_price(symbol).and_then(Decimal::from_f64_retain)
}

fn pct(numerator: Decimal, denominator: Decimal) -> Result<f64> {
    if denominator <= Decimal::ZERO {
        anyhow::bail!("Non-positive denominator {denominator} in percent calculation");
    }
    (numerator / denominator * Decimal::ONE_HUNDRED)
        .to_f64()
        .ok_or_else(|| anyhow::anyhow!("Percent out of f64 range"))
}

#[async_trait]
impl PortfolioLedger for PositionManager {
    async fn exposure_pct(&self, snapshot: &MarketSnapshot) -> Result<f64> {
        let portfolio = self.portfolio.read().await;
        let mark = marks(snapshot);
        let exposure = portfolio.exposure(&mark);
        if exposure.is_zero() {
            return Ok(0.0);
        }
        pct(exposure, portfolio.equity(&mark))
    }

    async fn daily_pnl_pct(&self, snapshot: &MarketSnapshot) -> Result<f64> {
        let portfolio = self.portfolio.read().await;
        let pnl = portfolio.daily_realized_pnl + portfolio.unrealized_pnl(marks(snapshot));
        pct(pnl, portfolio.starting_capital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::IndicatorBundle;
    use rust_decimal_macros::dec;

    fn ack(symbol: &str, action: Action, qty: Decimal, price: Decimal) -> OrderAck {
        OrderAck {
            order_id: "test".into(),
            symbol: symbol.into(),
            action,
            quantity: qty,
            fill_price: price,
            timestamp: Utc::now(),
        }
    }

    fn snapshot_at(symbol: &str, price: f64) -> MarketSnapshot {
        MarketSnapshot::from_pairs([(symbol, IndicatorBundle::new(50.0, Utc::now()).with_price(price))])
    }

    #[tokio::test]
    async fn test_buy_then_sell_realizes_pnl() {
        let mgr = PositionManager::new(dec!(1000));
        mgr.record_fill(&ack("BTC", Action::Buy, dec!(2), dec!(100))).await.unwrap();
        assert_eq!(mgr.cash().await, dec!(800));
        assert_eq!(mgr.held_quantity("BTC").await, dec!(2));

        let pnl = mgr.record_fill(&ack("BTC", Action::Sell, dec!(2), dec!(110))).await.unwrap();
        assert_eq!(pnl, dec!(20));
        assert_eq!(mgr.cash().await, dec!(1020));
        assert_eq!(mgr.held_quantity("BTC").await, Decimal::ZERO);

        let pnl_pct = mgr.daily_pnl_pct(&MarketSnapshot::default()).await.unwrap();
        assert!((pnl_pct - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buys_average_in() {
        let mgr = PositionManager::new(dec!(1000));
        mgr.record_fill(&ack("BTC", Action::Buy, dec!(1), dec!(100))).await.unwrap();
        mgr.record_fill(&ack("BTC", Action::Buy, dec!(1), dec!(200))).await.unwrap();
        let portfolio = mgr.portfolio.read().await;
        assert_eq!(portfolio.position("BTC").unwrap().avg_entry_price, dec!(150));
    }

    #[tokio::test]
    async fn test_sell_without_position_rejected() {
        let mgr = PositionManager::new(dec!(1000));
        assert!(mgr.record_fill(&ack("BTC", Action::Sell, dec!(1), dec!(100))).await.is_err());
    }

    #[tokio::test]
    async fn test_buy_beyond_cash_rejected() {
        let mgr = PositionManager::new(dec!(100));
        assert!(mgr.record_fill(&ack("BTC", Action::Buy, dec!(2), dec!(100))).await.is_err());
        assert_eq!(mgr.cash().await, dec!(100));
    }

    #[tokio::test]
    async fn test_exposure_marks_to_snapshot() {
        let mgr = PositionManager::new(dec!(1000));
        mgr.record_fill(&ack("BTC", Action::Buy, dec!(2), dec!(100))).await.unwrap();

        // Unmarked: 200 exposure / 1000 equity
        let exposure = mgr.exposure_pct(&MarketSnapshot::default()).await.unwrap();
        assert!((exposure - 20.0).abs() < 1e-9);

        // Marked at 50: 100 exposure / 900 equity, -100 unrealized
        let snap = snapshot_at("BTC", 50.0);
        let exposure = mgr.exposure_pct(&snap).await.unwrap();
        assert!((exposure - 100.0 / 9.0).abs() < 1e-9);
        let pnl = mgr.daily_pnl_pct(&snap).await.unwrap();
        assert!((pnl + 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reset_daily_clears_realized() {
        let mgr = PositionManager::new(dec!(1000));
        mgr.record_fill(&ack("BTC", Action::Buy, dec!(1), dec!(100))).await.unwrap();
        mgr.record_fill(&ack("BTC", Action::Sell, dec!(1), dec!(50))).await.unwrap();
        assert!(mgr.daily_pnl_pct(&MarketSnapshot::default()).await.unwrap() < 0.0);
        mgr.reset_daily().await;
        assert_eq!(mgr.daily_pnl_pct(&MarketSnapshot::default()).await.unwrap(), 0.0);
    }
}
