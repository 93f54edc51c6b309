use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indicator values for one symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub rsi: f64,
    pub timestamp: DateTime<Utc>,
    /// Last traded price, used for fills and mark-to-market when present.
    #[serde(default)]
    pub last_price: Option<f64>,
}

impl IndicatorBundle {
    pub fn new(rsi: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            rsi,
            timestamp,
            last_price: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.last_price = Some(price);
        self
    }
}

/// Latest per-symbol data for one cycle. Immutable once produced.
///
/// Backed by a `BTreeMap` so iteration order is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    bundles: BTreeMap<String, IndicatorBundle>,
    pub taken_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(bundles: BTreeMap<String, IndicatorBundle>, taken_at: DateTime<Utc>) -> Self {
        Self { bundles, taken_at }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, IndicatorBundle)>,
        S: Into<String>,
    {
        Self {
            bundles: pairs.into_iter().map(|(s, b)| (s.into(), b)).collect(),
            taken_at: Utc::now(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&IndicatorBundle> {
        self.bundles.get(symbol)
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.bundles.get(symbol).and_then(|b| b.last_price)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Data-quality check applied when a snapshot enters the cycle.
    ///
    /// RSI must be finite and within [0, 100]; a price, if present, must be
    /// finite and strictly positive.
    pub fn validate(&self) -> Result<(), String> {
        for (symbol, bundle) in &self.bundles {
            if !bundle.rsi.is_finite() || !(0.0..=100.0).contains(&bundle.rsi) {
                return Err(format!("{symbol}: RSI {} outside [0, 100]", bundle.rsi));
            }
            if let Some(price) = bundle.last_price {
                if !price.is_finite() || price <= 0.0 {
                    return Err(format!("{symbol}: invalid last price {price}"));
                }
            }
        }
        Ok(())
    }
}
