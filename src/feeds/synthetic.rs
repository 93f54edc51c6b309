use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::feeds::snapshot::SnapshotFeed;
use crate::models::market::IndicatorBundle;

const RSI_PERIOD: usize = 14;

/// Wilder-smoothed RSI over a stream of prices.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev: Option<f64>,
    samples: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev: None,
            samples: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    /// Push a price. Returns the RSI once `period` changes have been seen.
    pub fn push(&mut self, price: f64) -> Option<f64> {
        let prev = self.prev.replace(price)?;
        let change = price - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        self.samples += 1;
        let n = self.period as f64;
        if self.samples <= self.period {
            // Seed with a simple average
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        if self.samples < self.period {
            return None;
        }
        if self.avg_loss == 0.0 {
            return Some(if self.avg_gain == 0.0 { 50.0 } else { 100.0 });
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// Publish cadence for paper mode. Kept well inside the snapshot max age and
/// independent of the cycle interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

const VOLATILITY: f64 = 0.004;

struct Walk {
    price: f64,
    rsi: WilderRsi,
}

/// Paper-mode market data publisher.
///
/// Random-walks a price per symbol and publishes RSI(14) bundles into a
/// `SnapshotFeed`, so the agent can run end-to-end without an ingestion
/// pipeline. `start` pre-rolls the RSI window before returning, so the
/// target already holds a bundle per symbol when the first cycle runs.
pub struct SyntheticFeed {
    target: Arc<SnapshotFeed>,
    symbols: Vec<String>,
    tick: Duration,
}

impl SyntheticFeed {
    pub fn new(target: Arc<SnapshotFeed>, symbols: Vec<String>, tick: Duration) -> Self {
        Self { target, symbols, tick }
    }

    pub fn start(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let target = self.target.clone();
        let symbols = self.symbols.clone();
        let tick = self.tick;

        let mut rng = StdRng::from_entropy();
        let mut walks: HashMap<String, Walk> = symbols
            .iter()
            .map(|s| {
                let walk = Walk {
                    price: 100.0,
                    rsi: WilderRsi::new(RSI_PERIOD),
                };
                (s.clone(), walk)
            })
            .collect();

        for _ in 0..=RSI_PERIOD {
            step(&target, &symbols, &mut walks, &mut rng);
        }
        info!(
            "Synthetic feed warmed up: {} symbols, tick {}ms",
            target.symbol_count(),
            tick.as_millis()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => step(&target, &symbols, &mut walks, &mut rng),
                    _ = shutdown.recv() => {
                        info!("Synthetic feed shutdown");
                        break;
                    }
                }
            }
        })
    }
}

fn step(target: &SnapshotFeed, symbols: &[String], walks: &mut HashMap<String, Walk>, rng: &mut StdRng) {
    for symbol in symbols {
        let Some(walk) = walks.get_mut(symbol) else {
            continue;
        };
        let shock: f64 = rng.gen_range(-1.0..1.0);
        walk.price = (walk.price * (1.0 + VOLATILITY * shock)).max(0.01);
        if let Some(value) = walk.rsi.push(walk.price) {
            debug!("Synthetic {symbol}: price={:.4} rsi={value:.2}", walk.price);
            target.publish(
                symbol.clone(),
                IndicatorBundle::new(value, Utc::now()).with_price(walk.price),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::MarketDataPort;

    #[test]
    fn test_rsi_warmup() {
        let mut rsi = WilderRsi::new(14);
        for i in 0..14 {
            assert!(rsi.push(100.0 + i as f64).is_none(), "tick {i} should be warming up");
        }
        assert!(rsi.push(120.0).is_some());
    }

    #[test]
    fn test_rsi_extremes() {
        let mut up = WilderRsi::new(14);
        let mut down = WilderRsi::new(14);
        let mut last_up = None;
        let mut last_down = None;
        for i in 0..30 {
            last_up = up.push(100.0 + i as f64);
            last_down = down.push(100.0 - i as f64);
        }
        assert_eq!(last_up, Some(100.0));
        assert_eq!(last_down, Some(0.0));
    }

    #[test]
    fn test_rsi_stays_in_range() {
        let mut rsi = WilderRsi::new(14);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            if let Some(v) = rsi.push(100.0 + rng.gen_range(-5.0..5.0)) {
                assert!((0.0..=100.0).contains(&v));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_is_warm_when_start_returns() {
        let target = Arc::new(SnapshotFeed::default());
        let feed = SyntheticFeed::new(
            target.clone(),
            vec!["BTC".into(), "ETH".into()],
            Duration::from_secs(60),
        );
        let (tx, _) = broadcast::channel(1);
        let handle = feed.start(tx.subscribe());
        assert_eq!(target.symbol_count(), 2);

        target.initialize().await.unwrap();
        let snapshot = target.get_latest_snapshot().await.unwrap();
        let btc = snapshot.get("BTC").unwrap();
        assert!((0.0..=100.0).contains(&btc.rsi));
        assert!(btc.last_price.is_some());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
