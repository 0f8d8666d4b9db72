//! # Estimator Moments
//!
//! Raw power sums of per-history scores and the statistics derived from them.
//!
//! ## Theory
//!
//! With `S_k = Σ x_i^k` over N histories:
//!
//! ```text
//! mean = S1 / N
//! RE   = sqrt( (N·S2/S1² − 1) / (N − 1) )
//! VOV  = (S4 − 4·S1·S3/N + 6·S1²·S2/N² − 3·S1⁴/N³) / (S2 − S1²/N)² − 1/N
//! FOM  = 1 / (RE² · t)
//! ```

use serde::{Deserialize, Serialize};

/// Σx, Σx², Σx³, Σx⁴ of committed history scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMoments {
    pub sums: [f64; 4],
}

impl RawMoments {
    /// Add one history's score
    pub fn add(&mut self, x: f64) {
        let x2 = x * x;
        self.sums[0] += x;
        self.sums[1] += x2;
        self.sums[2] += x2 * x;
        self.sums[3] += x2 * x2;
    }

    pub fn merge(&mut self, other: &RawMoments) {
        for (a, b) in self.sums.iter_mut().zip(other.sums) {
            *a += b;
        }
    }

    pub fn first(&self) -> f64 {
        self.sums[0]
    }

    pub fn is_zero(&self) -> bool {
        self.sums[0] == 0.0 && self.sums[1] == 0.0
    }

    /// Mean, relative error, relative VOV and FOM
    pub fn process(&self, histories: u64, multiplier: f64, norm: f64, elapsed: f64) -> ProcessedMoments {
        if histories == 0 || norm <= 0.0 {
            return ProcessedMoments::default();
        }
        let n = histories as f64;
        let [s1, s2, s3, s4] = self.sums;

        let mean = s1 / n * multiplier / norm;

        let relative_error = if s1 != 0.0 && histories > 1 {
            ((n * s2 / (s1 * s1) - 1.0) / (n - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        };

        let variance_term = s2 - s1 * s1 / n;
        let variance_of_variance = if s1 != 0.0 && variance_term != 0.0 {
            let numerator = s4 - 4.0 * s1 * s3 / n + 6.0 * s1 * s1 * s2 / (n * n)
                - 3.0 * s1.powi(4) / (n * n * n);
            numerator / (variance_term * variance_term) - 1.0 / n
        } else {
            0.0
        };

        let figure_of_merit = if relative_error > 0.0 && elapsed > 0.0 {
            1.0 / (relative_error * relative_error * elapsed)
        } else {
            0.0
        };

        ProcessedMoments {
            mean,
            relative_error,
            variance_of_variance,
            figure_of_merit,
        }
    }
}

/// Statistics reported for one bin
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMoments {
    pub mean: f64,
    pub relative_error: f64,
    pub variance_of_variance: f64,
    pub figure_of_merit: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s1: f64, s2: f64, s3: f64, s4: f64) -> RawMoments {
        RawMoments { sums: [s1, s2, s3, s4] }
    }

    #[test]
    fn test_relative_error() {
        let p = raw(10.0, 100.0, 0.0, 0.0).process(100, 1.0, 1.0, 0.0);
        assert!((p.relative_error - 1.0).abs() < 1e-12);
        assert!((p.mean - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_relative_vov() {
        let p = raw(10.0, 100.0, 1000.0, 10000.0).process(100, 1.0, 1.0, 1.0);
        assert!((p.variance_of_variance - 0.970_101_010_101_01).abs() < 1e-12);
    }

    #[test]
    fn test_fom() {
        // RE = 1, t = 4
        let p = raw(10.0, 100.0, 0.0, 0.0).process(100, 1.0, 1.0, 4.0);
        assert!((p.figure_of_merit - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_mean_uses_multiplier_and_norm() {
        let mut m = RawMoments::default();
        m.add(2.0);
        m.add(4.0);
        assert_eq!(m.sums, [6.0, 20.0, 72.0, 272.0]);

        let p = m.process(2, 3.0, 0.5, 1.0);
        assert!((p.mean - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_moments() {
        let p = RawMoments::default().process(10, 1.0, 1.0, 1.0);
        assert_eq!(p, ProcessedMoments::default());
        assert_eq!(RawMoments::default().process(0, 1.0, 1.0, 1.0).mean, 0.0);
    }

    #[test]
    fn test_merge() {
        let mut a = raw(1.0, 1.0, 1.0, 1.0);
        a.merge(&raw(2.0, 4.0, 8.0, 16.0));
        assert_eq!(a.sums, [3.0, 5.0, 9.0, 17.0]);
    }
}
