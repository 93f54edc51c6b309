use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_entry_price
    }

    pub fn market_value(&self, mark: Decimal) -> Decimal {
        self.quantity * mark
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        self.market_value(mark) - self.cost_basis()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub starting_capital: Decimal,
    pub positions: Vec<Position>,
    pub daily_realized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
}

impl Portfolio {
    pub fn new(capital: Decimal) -> Self {
        Self {
            cash: capital,
            starting_capital: capital,
            ..Default::default()
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Gross value of open positions. `mark` returns the current price for a
    /// symbol; positions without a mark are valued at entry.
    pub fn exposure<F>(&self, mark: F) -> Decimal
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        self.positions
            .iter()
            .map(|p| {
                let price = mark(&p.symbol).unwrap_or(p.avg_entry_price);
                p.market_value(price).abs()
            })
            .sum()
    }

    pub fn unrealized_pnl<F>(&self, mark: F) -> Decimal
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        self.positions
            .iter()
            .map(|p| {
                let price = mark(&p.symbol).unwrap_or(p.avg_entry_price);
                p.unrealized_pnl(price)
            })
            .sum()
    }

    pub fn equity<F>(&self, mark: F) -> Decimal
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        self.cash
            + self
                .positions
                .iter()
                .map(|p| p.market_value(mark(&p.symbol).unwrap_or(p.avg_entry_price)))
                .sum::<Decimal>()
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }
}
