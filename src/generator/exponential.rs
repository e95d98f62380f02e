//! Exponentially distributed integers, favouring small values.

use crate::random;

use super::{LastValue, NumberGenerator};

/// Draws from an exponential distribution with rate `gamma`, truncated to
/// integers. Used for `requestdistribution=exponential`, where it models
/// "read mostly recent inserts": `percentile` percent of the draws fall
/// within the most recent `range` items.
#[derive(Debug)]
pub struct ExponentialGenerator {
    gamma: f64,
    last: LastValue,
}

impl ExponentialGenerator {
    /// `percentile` percent of samples fall below `range`.
    pub fn new(percentile: f64, range: f64) -> Self {
        Self {
            gamma: -(1.0 - percentile / 100.0).ln() / range,
            last: LastValue::new(0),
        }
    }

    pub fn from_mean(mean: f64) -> Self {
        Self {
            gamma: 1.0 / mean,
            last: LastValue::new(0),
        }
    }
}

impl NumberGenerator for ExponentialGenerator {
    fn next_value(&self) -> i64 {
        // -ln(u) is positive for u in (0, 1); u == 0 cannot happen with a
        // 53-bit mantissa draw often enough to matter, but guard anyway.
        let u = random::next_f64().max(f64::MIN_POSITIVE);
        let ret = (-u.ln() / self.gamma) as i64;
        self.last.set(ret);
        ret
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        1.0 / self.gamma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_non_negative() {
        let g = ExponentialGenerator::new(95.0, 1000.0);
        for _ in 0..10_000 {
            assert!(g.next_value() >= 0);
        }
    }

    #[test]
    fn percentile_contract_holds() {
        let g = ExponentialGenerator::new(95.0, 1000.0);
        let n = 100_000;
        let below = (0..n).filter(|_| g.next_value() < 1000).count();
        let frac = below as f64 / n as f64;
        assert!((frac - 0.95).abs() < 0.01, "P(X < range) = {}", frac);
    }

    #[test]
    fn empirical_mean_matches() {
        let g = ExponentialGenerator::from_mean(500.0);
        let n = 200_000;
        let sum: i64 = (0..n).map(|_| g.next_value()).sum();
        let empirical = sum as f64 / n as f64;
        // Integer truncation shaves ~0.5 off the continuous mean.
        assert!((empirical - 499.5).abs() < 10.0, "mean drifted: {}", empirical);
    }
}
