use crate::models::market::{IndicatorBundle, MarketSnapshot};
use crate::models::signal::{Action, Signal};
use crate::signals::SignalGenerator;

/// RSI mean reversion: buy oversold, sell overbought.
///
/// - RSI < `rsi_low`  → BUY,  strength = (rsi_low - rsi) / rsi_low
/// - RSI > `rsi_high` → SELL, strength = (rsi - rsi_high) / (100 - rsi_high)
/// - otherwise no signal
pub struct MeanReversion {
    rsi_low: f64,
    rsi_high: f64,
}

impl MeanReversion {
    pub fn new(rsi_low: f64, rsi_high: f64) -> Self {
        Self { rsi_low, rsi_high }
    }

    pub fn evaluate(&self, symbol: &str, bundle: &IndicatorBundle) -> Option<Signal> {
        let rsi = bundle.rsi;

        let (action, strength, reason) = if rsi < self.rsi_low {
            (
                Action::Buy,
                (self.rsi_low - rsi) / self.rsi_low,
                format!("RSI oversold: {rsi:.2} < {:.2}", self.rsi_low),
            )
        } else if rsi > self.rsi_high {
            (
                Action::Sell,
                (rsi - self.rsi_high) / (100.0 - self.rsi_high),
                format!("RSI overbought: {rsi:.2} > {:.2}", self.rsi_high),
            )
        } else {
            return None;
        };

        Some(Signal {
            symbol: symbol.to_string(),
            action,
            strength,
            timestamp: bundle.timestamp,
            reason,
            price: bundle.last_price,
        })
    }
}

impl SignalGenerator for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn generate(&self, snapshot: &MarketSnapshot, symbols: &[String]) -> Vec<Signal> {
        symbols
            .iter()
            .filter_map(|symbol| {
                let bundle = snapshot.get(symbol)?;
                self.evaluate(symbol, bundle)
            })
            .collect()
    }
}
