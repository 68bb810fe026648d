//! One-way latency accumulators.

use crate::transport::{div_or_zero, onepass_stddev};

/// Running statistics for one direction of latency samples, in
/// microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    /// Most recent sample.
    pub last: i64,
    /// Smallest sample seen.
    pub min: i64,
    /// Largest sample seen (starts at 0, like the summary shows).
    pub max: i64,
    /// Number of samples.
    pub count: i64,
    /// Sum of samples.
    pub sum: i64,
    /// Sum of squared samples.
    pub sum_sq: i64,
}

impl LatencyStats {
    /// No samples yet.
    pub fn new() -> Self {
        Self {
            last: 0,
            min: i64::from(i32::MAX),
            max: 0,
            count: 0,
            sum: 0,
            sum_sq: 0,
        }
    }

    /// Add one sample.
    pub fn record(&mut self, sample: i32) {
        let sample = i64::from(sample);
        self.last = sample;
        self.count += 1;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.sum += sample;
        self.sum_sq += sample * sample;
    }

    /// Mean sample, 0 with no samples.
    pub fn mean(&self) -> f64 {
        div_or_zero(self.sum as f64, self.count as f64)
    }

    /// Sample standard deviation.
    pub fn stddev(&self) -> f64 {
        onepass_stddev(self.sum_sq, self.sum, self.count)
    }

    /// `min/avg/max/mdev` in milliseconds, as printed in the summary.
    pub fn summary(&self) -> String {
        format!(
            "{:.2}/{:.2}/{:.2}/{:.2} ms",
            self.min as f64 / 1000.0,
            self.mean() / 1000.0,
            self.max as f64 / 1000.0,
            self.stddev() / 1000.0
        )
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut stats = LatencyStats::new();
        stats.record(24_500);
        stats.record(34_500);
        stats.record(20_000);
        assert_eq!(stats.last, 20_000);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 20_000);
        assert_eq!(stats.max, 34_500);
        assert_eq!(stats.sum, 79_000);
        assert!((stats.mean() - 79_000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_format() {
        let mut stats = LatencyStats::new();
        stats.record(24_000);
        stats.record(26_000);
        assert_eq!(stats.summary(), "24.00/25.00/26.00/1.41 ms");
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(LatencyStats::new().summary(), "2147483.65/0.00/0.00/0.00 ms");
    }
}
