//! Phi-accrual failure detection.
//!
//! Instead of a binary alive/dead timeout, the detector keeps a sliding
//! window of observed heartbeat intervals and reports a continuous
//! suspicion level: `phi = -log10(P(another heartbeat arrives this late))`
//! under a normal model fitted to the window. A peer beating every 100ms
//! that then goes silent for a second scores far past the usual threshold
//! of 8, while ordinary jitter barely moves the needle.
//!
//! The detector is pure bookkeeping over caller-supplied times, so tests
//! can drive it with a fabricated timeline.

use std::collections::VecDeque;

/// Samples retained per peer.
pub const DEFAULT_WINDOW: usize = 1000;

/// Suspicion level at which a peer is declared failed.
pub const DEFAULT_PHI_THRESHOLD: f64 = 8.0;

/// Floor on the fitted standard deviation, in milliseconds. Perfectly
/// regular heartbeats would otherwise collapse the distribution and make
/// any delay look infinitely suspicious.
pub const DEFAULT_MIN_STD_DEV_MS: f64 = 10.0;

/// Sliding-window estimator for one peer's heartbeat arrivals.
#[derive(Debug, Clone)]
pub struct PhiDetector {
    intervals: VecDeque<f64>,
    window: usize,
    min_std_dev_ms: f64,
}

impl Default for PhiDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MIN_STD_DEV_MS)
    }
}

impl PhiDetector {
    /// Detector keeping at most `window` intervals, with the fitted
    /// standard deviation floored at `min_std_dev_ms`.
    #[must_use]
    pub fn new(window: usize, min_std_dev_ms: f64) -> Self {
        Self {
            intervals: VecDeque::with_capacity(window.min(1024)),
            window: window.max(1),
            min_std_dev_ms,
        }
    }

    /// Records the gap between two consecutive heartbeats.
    pub fn record(&mut self, interval_ms: f64) {
        if self.intervals.len() == self.window {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval_ms.max(0.0));
    }

    /// Number of intervals currently in the window.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.intervals.len()
    }

    /// Suspicion level given `elapsed_ms` since the last heartbeat.
    ///
    /// Returns `0.0` while fewer than two intervals have been observed;
    /// a fresh peer is trusted until there is enough history to judge it.
    #[must_use]
    pub fn phi(&self, elapsed_ms: f64) -> f64 {
        if self.intervals.len() < 2 {
            return 0.0;
        }
        let count = self.intervals.len() as f64;
        let mean = self.intervals.iter().sum::<f64>() / count;
        let variance = self
            .intervals
            .iter()
            .map(|interval| {
                let diff = interval - mean;
                diff * diff
            })
            .sum::<f64>()
            / count;
        let std_dev = variance.sqrt().max(self.min_std_dev_ms);

        let p_later = 1.0 - normal_cdf(elapsed_ms, mean, std_dev);
        // Far past the mean the tail probability underflows to zero;
        // clamp so phi stays finite.
        -p_later.max(f64::MIN_POSITIVE).log10()
    }
}

/// CDF of a normal distribution at `x`.
fn normal_cdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    0.5 * (1.0 + erf((x - mean) / (std_dev * std::f64::consts::SQRT_2)))
}

/// Abramowitz & Stegun 7.1.26 rational approximation, max error 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736
                + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(detector: &mut PhiDetector, interval_ms: f64, beats: usize) {
        for _ in 0..beats {
            detector.record(interval_ms);
        }
    }

    #[test]
    fn trusts_a_peer_with_no_history() {
        let detector = PhiDetector::default();
        assert_eq!(detector.phi(10_000.0), 0.0);

        let mut one = PhiDetector::default();
        one.record(100.0);
        assert_eq!(one.phi(10_000.0), 0.0);
    }

    #[test]
    fn phi_at_the_mean_is_a_coin_flip() {
        let mut detector = PhiDetector::default();
        steady(&mut detector, 100.0, 20);
        // P(later than the mean) = 0.5, so phi = -log10(0.5).
        let phi = detector.phi(100.0);
        assert!((phi - 0.301).abs() < 0.01, "phi was {phi}");
    }

    #[test]
    fn phi_grows_with_silence() {
        let mut detector = PhiDetector::default();
        steady(&mut detector, 100.0, 50);
        let soon = detector.phi(110.0);
        let late = detector.phi(300.0);
        let very_late = detector.phi(1000.0);
        assert!(soon < late && late < very_late);
    }

    #[test]
    fn regular_beats_then_a_second_of_silence_cross_the_threshold() {
        let mut detector = PhiDetector::default();
        steady(&mut detector, 100.0, 50);
        assert!(detector.phi(50.0) < 1.0);
        assert!(detector.phi(1100.0) > DEFAULT_PHI_THRESHOLD);
    }

    #[test]
    fn jittered_beats_tolerate_proportional_delay() {
        let mut detector = PhiDetector::default();
        for i in 0..50 {
            detector.record(80.0 + f64::from(i % 5) * 10.0);
        }
        assert!(detector.phi(130.0) < DEFAULT_PHI_THRESHOLD);
        assert!(detector.phi(2000.0) > DEFAULT_PHI_THRESHOLD);
    }

    #[test]
    fn window_evicts_the_oldest_intervals() {
        let mut detector = PhiDetector::new(8, DEFAULT_MIN_STD_DEV_MS);
        steady(&mut detector, 100.0, 8);
        let before = detector.phi(600.0);

        // Slower cadence replaces the window, so the same silence
        // becomes less alarming.
        steady(&mut detector, 500.0, 8);
        assert_eq!(detector.samples(), 8);
        let after = detector.phi(600.0);
        assert!(after < before, "{after} should be below {before}");
    }

    #[test]
    fn erf_matches_known_values() {
        assert!((erf(0.0)).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
        assert!((erf(3.0) - 0.999_977_91).abs() < 1e-6);
    }
}
