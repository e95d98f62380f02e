//! Weighted choice over a fixed set of labels.

use parking_lot::Mutex;

use crate::random;

use super::Generator;

/// Returns each label with probability proportional to its weight. The
/// operation chooser of the core workload is one of these over the
/// operation names.
pub struct DiscreteGenerator {
    values: Vec<(f64, String)>,
    last: Mutex<Option<String>>,
}

impl DiscreteGenerator {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            last: Mutex::new(None),
        }
    }

    /// Register a label with the given weight. Call before sampling starts.
    pub fn add_value(&mut self, weight: f64, value: impl Into<String>) {
        self.values.push((weight, value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for DiscreteGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for DiscreteGenerator {
    fn next_string(&self) -> String {
        let sum: f64 = self.values.iter().map(|(w, _)| w).sum();
        assert!(sum > 0.0, "DiscreteGenerator has no weighted values");

        let mut point = random::next_f64();
        for (weight, value) in &self.values {
            let p = weight / sum;
            if point < p {
                *self.last.lock() = Some(value.clone());
                return value.clone();
            }
            point -= p;
        }
        // Floating-point edge: point accumulated to ~1.0; fall back to the
        // final label.
        let value = self.values.last().expect("non-empty").1.clone();
        *self.last.lock() = Some(value.clone());
        value
    }

    fn last_string(&self) -> String {
        let mut last = self.last.lock();
        if let Some(v) = last.as_ref() {
            return v.clone();
        }
        drop(last);
        self.next_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn respects_weights() {
        let mut g = DiscreteGenerator::new();
        g.add_value(0.75, "read");
        g.add_value(0.25, "update");
        let n = 50_000;
        let mut freq: HashMap<String, usize> = HashMap::new();
        for _ in 0..n {
            *freq.entry(g.next_string()).or_insert(0) += 1;
        }
        let reads = freq["read"] as f64 / n as f64;
        assert!((reads - 0.75).abs() < 0.02, "read fraction {}", reads);
    }

    #[test]
    fn single_value_always_wins() {
        let mut g = DiscreteGenerator::new();
        g.add_value(1.0, "only");
        for _ in 0..100 {
            assert_eq!(g.next_string(), "only");
        }
    }

    #[test]
    fn last_string_tracks_emissions() {
        let mut g = DiscreteGenerator::new();
        g.add_value(1.0, "a");
        let v = g.next_string();
        assert_eq!(g.last_string(), v);
    }

    #[test]
    fn last_string_before_any_draw_produces_one() {
        let mut g = DiscreteGenerator::new();
        g.add_value(1.0, "a");
        assert_eq!(g.last_string(), "a");
    }
}
