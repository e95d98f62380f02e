//! Hotspot distribution: x% of operations hit y% of the data.

use crate::random;

use super::{LastValue, NumberGenerator};

/// Integers in `[lower_bound, upper_bound]` where `hot_opn_fraction` of
/// the draws land uniformly in the hot set (the first `hot_set_fraction`
/// of the interval) and the rest land uniformly in the cold remainder.
#[derive(Debug)]
pub struct HotspotGenerator {
    lower_bound: i64,
    hot_interval: i64,
    cold_interval: i64,
    hot_set_fraction: f64,
    hot_opn_fraction: f64,
    last: LastValue,
}

fn clamp_fraction(value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        0.0
    }
}

impl HotspotGenerator {
    pub fn new(lower_bound: i64, upper_bound: i64, hot_set_fraction: f64, hot_opn_fraction: f64) -> Self {
        let hot_set_fraction = clamp_fraction(hot_set_fraction);
        let hot_opn_fraction = clamp_fraction(hot_opn_fraction);
        let (lower_bound, upper_bound) = if lower_bound > upper_bound {
            (upper_bound, lower_bound)
        } else {
            (lower_bound, upper_bound)
        };
        let interval = upper_bound - lower_bound + 1;
        let hot_interval = (interval as f64 * hot_set_fraction) as i64;
        Self {
            lower_bound,
            hot_interval,
            cold_interval: interval - hot_interval,
            hot_set_fraction,
            hot_opn_fraction,
            last: LastValue::new(lower_bound - 1),
        }
    }

    pub fn hot_set_fraction(&self) -> f64 {
        self.hot_set_fraction
    }

    pub fn hot_opn_fraction(&self) -> f64 {
        self.hot_opn_fraction
    }
}

impl NumberGenerator for HotspotGenerator {
    fn next_value(&self) -> i64 {
        // An empty hot or cold set sends every draw to the other one.
        let pick_hot = if self.cold_interval == 0 {
            true
        } else if self.hot_interval == 0 {
            false
        } else {
            random::next_f64() < self.hot_opn_fraction
        };
        let value = if pick_hot {
            self.lower_bound + random::next_i64_below(self.hot_interval)
        } else {
            self.lower_bound + self.hot_interval + random::next_i64_below(self.cold_interval)
        };
        self.last.set(value);
        value
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        self.hot_opn_fraction * (self.lower_bound as f64 + self.hot_interval as f64 / 2.0)
            + (1.0 - self.hot_opn_fraction)
                * (self.lower_bound as f64 + self.hot_interval as f64 + self.cold_interval as f64 / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_in_bounds() {
        let g = HotspotGenerator::new(100, 199, 0.2, 0.8);
        for _ in 0..10_000 {
            let v = g.next_value();
            assert!((100..=199).contains(&v), "out of range: {}", v);
        }
    }

    #[test]
    fn hot_set_receives_its_share() {
        let g = HotspotGenerator::new(0, 99, 0.2, 0.8);
        let n = 50_000;
        let hot = (0..n).filter(|_| g.next_value() < 20).count();
        let frac = hot as f64 / n as f64;
        assert!((frac - 0.8).abs() < 0.02, "hot fraction {}", frac);
    }

    #[test]
    fn full_hot_set_sends_every_draw_to_the_hot_set() {
        // hotspotdatafraction=1 is a valid boundary value: the cold set is
        // empty and every draw must land in the (full-range) hot set.
        let g = HotspotGenerator::new(0, 99, 1.0, 0.8);
        assert_eq!(g.hot_set_fraction(), 1.0);
        for _ in 0..1000 {
            let v = g.next_value();
            assert!((0..=99).contains(&v));
        }
    }

    #[test]
    fn out_of_range_fractions_clamp_to_zero() {
        let g = HotspotGenerator::new(0, 99, 1.5, -0.3);
        assert_eq!(g.hot_set_fraction(), 0.0);
        assert_eq!(g.hot_opn_fraction(), 0.0);
        // With an empty hot set every draw is cold and still in range.
        for _ in 0..1000 {
            let v = g.next_value();
            assert!((0..=99).contains(&v));
        }
    }

    #[test]
    fn swapped_bounds_are_reordered() {
        let g = HotspotGenerator::new(50, 10, 0.5, 0.5);
        for _ in 0..1000 {
            let v = g.next_value();
            assert!((10..=50).contains(&v));
        }
    }
}
