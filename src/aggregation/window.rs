//! Per-metric rolling statistics (spec §4.10), ported from
//! `stream_aggregator.h`'s `online_statistics` (Welford's algorithm for
//! mean/variance/skewness/kurtosis) plus a configurable set of [`P2Estimator`]
//! quantiles.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::p2::P2Estimator;

/// Percentiles tracked by a [`MetricWindow`] unless overridden.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.5, 0.9, 0.95, 0.99];

/// A point-in-time snapshot of a metric window's statistics, suitable for
/// flushing to a [`super::MetricSink`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub metric_name: String,
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub variance: f64,
    pub std_deviation: f64,
    pub min: f64,
    pub max: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub percentiles: Vec<(f64, f64)>,
    pub rate_per_second: f64,
}

/// Online mean/variance/skewness/kurtosis plus streaming quantiles for one
/// metric. All updates are O(1) regardless of how many observations have
/// been seen.
#[derive(Debug)]
pub struct MetricWindow {
    name: String,
    count: u64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    sum: f64,
    min: f64,
    max: f64,
    quantiles: Vec<P2Estimator>,
    window_start: Instant,
}

impl MetricWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_percentiles(name, DEFAULT_PERCENTILES)
    }

    pub fn with_percentiles(name: impl Into<String>, percentiles: &[f64]) -> Self {
        Self {
            name: name.into(),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            quantiles: percentiles.iter().copied().map(P2Estimator::new).collect(),
            window_start: Instant::now(),
        }
    }

    /// Welford's online update, extended to the third/fourth central
    /// moments for skewness and kurtosis.
    pub fn add_observation(&mut self, value: f64) {
        let n1 = self.count as f64;
        self.count += 1;
        let n = self.count as f64;

        let delta = value - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1;

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;

        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        for q in &mut self.quantiles {
            q.add(value);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn skewness(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        (n.sqrt() * self.m3) / self.m2.powf(1.5)
    }

    pub fn kurtosis(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        (n * self.m4) / (self.m2 * self.m2) - 3.0
    }

    /// Estimated value at percentile `p` (e.g. `0.99`), if that percentile
    /// is tracked by this window.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| (q.quantile() - p).abs() < f64::EPSILON)
            .map(|q| q.estimate())
    }

    pub fn rate_per_second(&self) -> f64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.count as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            metric_name: self.name.clone(),
            count: self.count,
            sum: self.sum,
            mean: self.mean,
            variance: self.variance(),
            std_deviation: self.std_deviation(),
            min: if self.count == 0 { 0.0 } else { self.min },
            max: if self.count == 0 { 0.0 } else { self.max },
            skewness: self.skewness(),
            kurtosis: self.kurtosis(),
            percentiles: self
                .quantiles
                .iter()
                .map(|q| (q.quantile(), q.estimate()))
                .collect(),
            rate_per_second: self.rate_per_second(),
        }
    }

    /// Whether `value` is an outlier given the window seen so far, per the
    /// same `|value - mean| > threshold * std_dev` rule as the original,
    /// which only activates once at least 10 observations have landed.
    pub fn is_outlier(&self, value: f64, threshold: f64) -> bool {
        if self.count < 10 {
            return false;
        }
        let std_dev = self.std_deviation();
        if std_dev == 0.0 {
            return false;
        }
        (value - self.mean).abs() > threshold * std_dev
    }

    pub fn reset(&mut self) {
        let name = std::mem::take(&mut self.name);
        let percentiles: Vec<f64> = self.quantiles.iter().map(|q| q.quantile()).collect();
        *self = Self::with_percentiles(name, &percentiles);
    }

    pub fn age(&self) -> Duration {
        self.window_start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance_match_textbook_values() {
        let mut w = MetricWindow::new("latency_ms");
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            w.add_observation(v);
        }
        assert!((w.mean() - 5.0).abs() < 1e-9);
        assert!((w.variance() - 4.5714285714).abs() < 1e-6);
    }

    #[test]
    fn min_max_track_extremes() {
        let mut w = MetricWindow::new("x");
        for v in [3.0, 1.0, 9.0, -2.0] {
            w.add_observation(v);
        }
        assert_eq!(w.snapshot().min, -2.0);
        assert_eq!(w.snapshot().max, 9.0);
    }

    #[test]
    fn outlier_detection_requires_warm_up() {
        let mut w = MetricWindow::new("x");
        for _ in 0..9 {
            w.add_observation(10.0);
        }
        assert!(!w.is_outlier(1000.0, 3.0), "should not fire before warm-up");
        w.add_observation(10.0);
        for _ in 0..5 {
            w.add_observation(10.0 + fastrand::f64());
        }
        assert!(w.is_outlier(10_000.0, 3.0));
    }

    #[test]
    fn percentile_lookup_returns_none_for_untracked_percentile() {
        let w = MetricWindow::with_percentiles("x", &[0.5, 0.99]);
        assert!(w.percentile(0.75).is_none());
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut w = MetricWindow::new("x");
        for v in [1.0, 2.0, 3.0] {
            w.add_observation(v);
        }
        w.reset();
        assert_eq!(w.count(), 0);
        assert_eq!(w.mean(), 0.0);
    }
}
