use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// Rolling latency samples per cycle stage.
pub struct LatencyTracker {
    samples: DashMap<&'static str, VecDeque<Duration>>,
    max_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: DashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, stage: &'static str, elapsed: Duration) {
        let mut window = self.samples.entry(stage).or_default();
        if window.len() >= self.max_samples {
            window.pop_front();
        }
        window.push_back(elapsed);
    }

    /// Start a timer that records on drop.
    pub fn start_timer(&self, stage: &'static str) -> StageTimer<'_> {
        StageTimer {
            stage,
            start: Instant::now(),
            tracker: self,
        }
    }

    pub fn percentiles(&self, stage: &str) -> Option<Percentiles> {
        let window = self.samples.get(stage)?;
        if window.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = window.iter().copied().collect();
        sorted.sort();

        let last = sorted.len() - 1;
        let at = |q: f64| sorted[((sorted.len() as f64 * q) as usize).min(last)];
        Some(Percentiles {
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            count: sorted.len(),
        })
    }

    pub fn log_summary(&self) {
        let mut stages: Vec<&'static str> = self.samples.iter().map(|e| *e.key()).collect();
        stages.sort_unstable();
        for stage in stages {
            if let Some(p) = self.percentiles(stage) {
                info!(
                    "Latency [{stage}]: p50={:.1}ms p95={:.1}ms p99={:.1}ms samples={}",
                    p.p50.as_secs_f64() * 1000.0,
                    p.p95.as_secs_f64() * 1000.0,
                    p.p99.as_secs_f64() * 1000.0,
                    p.count,
                );
            }
        }
    }
}

pub struct StageTimer<'a> {
    stage: &'static str,
    start: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.stage, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let tracker = LatencyTracker::new(1000);
        for ms in 1..=100 {
            tracker.record("fetch", Duration::from_millis(ms));
        }
        let p = tracker.percentiles("fetch").unwrap();
        assert_eq!(p.count, 100);
        assert_eq!(p.p50, Duration::from_millis(51));
        assert_eq!(p.p95, Duration::from_millis(96));
        assert_eq!(p.p99, Duration::from_millis(100));
        assert!(tracker.percentiles("execute").is_none());
    }

    #[test]
    fn test_window_is_bounded() {
        let tracker = LatencyTracker::new(3);
        for ms in [100, 1, 2, 3] {
            tracker.record("fetch", Duration::from_millis(ms));
        }
        let p = tracker.percentiles("fetch").unwrap();
        assert_eq!(p.count, 3);
        assert_eq!(p.p99, Duration::from_millis(3));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let tracker = LatencyTracker::new(10);
        {
            let _t = tracker.start_timer("assess");
        }
        assert_eq!(tracker.percentiles("assess").unwrap().count, 1);
    }
}
