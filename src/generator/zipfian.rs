//! Zipfian-family generators: the classic Gray et al. SIGMOD '94 sampler
//! with incremental zeta maintenance, the scrambled variant that spreads
//! popular ranks across the key space, and the latest-skewed variant used
//! for `requestdistribution=latest`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::random;

use super::{LastValue, NumberGenerator};

/// The default skew.
pub const ZIPFIAN_CONSTANT: f64 = 0.99;

// The scrambled variant samples ranks from a fixed, very large item space
// so the zeta sum never has to be computed over the caller's key space.
const SCRAMBLED_ITEM_COUNT: i64 = 10_000_000_000;
const SCRAMBLED_ZETAN: f64 = 26.469_028_201_783_02;

/// Compute `zeta(n) = sum_{i=st..n-1} 1/(i+1)^theta`, extending a partial
/// sum. With `st = 0` and `initial_sum = 0` this is the full sum.
fn zeta_static(st: i64, n: i64, theta: f64, initial_sum: f64) -> f64 {
    let mut sum = initial_sum;
    for i in st..n {
        sum += 1.0 / ((i + 1) as f64).powf(theta);
    }
    sum
}

#[derive(Debug)]
struct ZetaState {
    /// `zeta(count_for_zeta)` for the current assumed item count.
    zetan: f64,
    /// The item count `zetan` was computed for.
    count_for_zeta: i64,
    eta: f64,
}

/// A generator of a zipfian distribution over `[min, max]` (inclusive),
/// skewed toward the low end: `min` is the most popular item, `min+1` the
/// next, and so on. Use [`ScrambledZipfianGenerator`] when the popular
/// items should be scattered through the range instead of clustered.
///
/// Growing the item count mid-run extends the zeta sum incrementally;
/// shrinking it recomputes from scratch and is opt-in via
/// [`ZipfianGenerator::set_allow_item_count_decrease`], because an
/// accidental stale-read of the item count should not trigger an O(n)
/// recomputation.
#[derive(Debug)]
pub struct ZipfianGenerator {
    items: i64,
    base: i64,
    theta: f64,
    alpha: f64,
    zeta_2_theta: f64,
    state: Mutex<ZetaState>,
    allow_item_count_decrease: AtomicBool,
    scratch_recomputes: AtomicU64,
    last: LastValue,
}

impl ZipfianGenerator {
    /// Zipfian over `[min, max]` with the default constant.
    pub fn new(min: i64, max: i64) -> Self {
        Self::with_constant(min, max, ZIPFIAN_CONSTANT)
    }

    /// Zipfian over `[min, max]` with the given constant; computes the
    /// zeta sum, which is O(items).
    pub fn with_constant(min: i64, max: i64, theta: f64) -> Self {
        let items = max - min + 1;
        let zetan = zeta_static(0, items, theta, 0.0);
        Self::with_zetan(min, max, theta, zetan)
    }

    /// Zipfian over `[min, max]` using a precomputed value of `zeta(items)`.
    pub fn with_zetan(min: i64, max: i64, theta: f64, zetan: f64) -> Self {
        let items = max - min + 1;
        assert!(items > 0, "zipfian range is empty: [{}, {}]", min, max);
        let zeta_2_theta = zeta_static(0, 2, theta, 0.0);
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - (2.0 / items as f64).powf(1.0 - theta)) / (1.0 - zeta_2_theta / zetan);
        let gen = Self {
            items,
            base: min,
            theta,
            alpha,
            zeta_2_theta,
            state: Mutex::new(ZetaState {
                zetan,
                count_for_zeta: items,
                eta,
            }),
            allow_item_count_decrease: AtomicBool::new(false),
            scratch_recomputes: AtomicU64::new(0),
            last: LastValue::new(min - 1),
        };
        gen.next_value();
        gen
    }

    /// Permit O(n) zeta recomputation when `next` is called with a smaller
    /// item count than the one currently assumed.
    pub fn set_allow_item_count_decrease(&self, allow: bool) {
        self.allow_item_count_decrease.store(allow, Ordering::Relaxed);
    }

    /// How many times the zeta sum has been recomputed from scratch.
    pub fn scratch_recomputes(&self) -> u64 {
        self.scratch_recomputes.load(Ordering::Relaxed)
    }

    /// Draw the next item assuming `item_count` items.
    ///
    /// If `item_count` grew since the last call, the normalisation constant
    /// is extended incrementally rather than recomputed.
    pub fn next(&self, item_count: i64) -> i64 {
        let mut state = self.state.lock();
        if item_count != state.count_for_zeta {
            if item_count > state.count_for_zeta {
                state.zetan = zeta_static(state.count_for_zeta, item_count, self.theta, state.zetan);
                state.count_for_zeta = item_count;
                state.eta = (1.0 - (2.0 / self.items as f64).powf(1.0 - self.theta))
                    / (1.0 - self.zeta_2_theta / state.zetan);
            } else if self.allow_item_count_decrease.load(Ordering::Relaxed) {
                tracing::debug!(
                    from = state.count_for_zeta,
                    to = item_count,
                    "zipfian item count decreased, recomputing zeta from scratch"
                );
                state.zetan = zeta_static(0, item_count, self.theta, 0.0);
                state.count_for_zeta = item_count;
                state.eta = (1.0 - (2.0 / self.items as f64).powf(1.0 - self.theta))
                    / (1.0 - self.zeta_2_theta / state.zetan);
                self.scratch_recomputes.fetch_add(1, Ordering::Relaxed);
            }
        }

        let u = random::next_f64();
        let uz = u * state.zetan;
        let ret = if uz < 1.0 {
            self.base
        } else if uz < 1.0 + 0.5f64.powf(self.theta) {
            self.base + 1
        } else {
            self.base + (item_count as f64 * (state.eta * u - state.eta + 1.0).powf(self.alpha)) as i64
        };
        self.last.set(ret);
        ret
    }
}

impl NumberGenerator for ZipfianGenerator {
    fn next_value(&self) -> i64 {
        let item_count = self.state.lock().count_for_zeta;
        self.next(item_count)
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        panic!("ZipfianGenerator has no closed-form mean");
    }
}

/// Zipfian popularity with the popular items scattered across the key
/// range: ranks are drawn from a fixed large zipfian space and pushed
/// through FNV-64 modulo the item count.
#[derive(Debug)]
pub struct ScrambledZipfianGenerator {
    min: i64,
    items: i64,
    gen: ZipfianGenerator,
    last: LastValue,
}

impl ScrambledZipfianGenerator {
    pub fn new(min: i64, max: i64) -> Self {
        let items = max - min + 1;
        assert!(items > 0, "scrambled zipfian range is empty: [{}, {}]", min, max);
        Self {
            min,
            items,
            gen: ZipfianGenerator::with_zetan(
                0,
                SCRAMBLED_ITEM_COUNT - 1,
                ZIPFIAN_CONSTANT,
                SCRAMBLED_ZETAN,
            ),
            last: LastValue::new(min - 1),
        }
    }
}

impl NumberGenerator for ScrambledZipfianGenerator {
    fn next_value(&self) -> i64 {
        let rank = self.gen.next_value();
        let ret = self.min + (random::fnv64(rank as u64) % self.items as u64) as i64;
        self.last.set(ret);
        ret
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    /// Scrambling flattens position popularity, so the mean is that of a
    /// uniform draw over the range.
    fn mean(&self) -> f64 {
        (self.min as f64 + (self.min + self.items - 1) as f64) / 2.0
    }
}

/// Prefers recently emitted values of an underlying counter: the zipfian
/// offset is taken from the counter's current maximum, so the newest items
/// are exponentially more popular.
pub struct SkewedLatestGenerator {
    basis: Arc<dyn NumberGenerator>,
    zipfian: ZipfianGenerator,
    last: LastValue,
}

impl SkewedLatestGenerator {
    pub fn new(basis: Arc<dyn NumberGenerator>) -> Self {
        let max = basis.last_value().max(1);
        let gen = Self {
            basis,
            zipfian: ZipfianGenerator::new(0, max - 1),
            last: LastValue::new(-1),
        };
        gen.next_value();
        gen
    }
}

impl NumberGenerator for SkewedLatestGenerator {
    fn next_value(&self) -> i64 {
        let max = self.basis.last_value();
        if max < 1 {
            self.last.set(0);
            return 0;
        }
        let ret = max - self.zipfian.next(max);
        self.last.set(ret);
        ret
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        panic!("SkewedLatestGenerator has no closed-form mean");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::CounterGenerator;
    use std::collections::HashMap;

    fn frequencies(g: &impl NumberGenerator, samples: usize) -> HashMap<i64, usize> {
        let mut freq = HashMap::new();
        for _ in 0..samples {
            *freq.entry(g.next_value()).or_insert(0) += 1;
        }
        freq
    }

    #[test]
    fn zipfian_samples_stay_in_range() {
        let g = ZipfianGenerator::new(0, 99);
        for _ in 0..10_000 {
            let v = g.next_value();
            assert!((0..=99).contains(&v), "out of range: {}", v);
            assert_eq!(g.last_value(), v);
        }
    }

    #[test]
    fn zipfian_skews_toward_the_low_end() {
        let g = ZipfianGenerator::new(0, 999);
        let freq = frequencies(&g, 10_000);
        let f0 = freq.get(&0).copied().unwrap_or(0);
        let f500 = freq.get(&500).copied().unwrap_or(0);
        let f999 = freq.get(&999).copied().unwrap_or(0);
        assert!(f0 > f500, "rank 0 ({}) should beat rank 500 ({})", f0, f500);
        assert!(f0 > f999, "rank 0 ({}) should beat rank 999 ({})", f0, f999);
    }

    #[test]
    fn zipfian_growth_is_incremental() {
        let g = ZipfianGenerator::new(0, 999);
        let freq = frequencies(&g, 10_000);
        assert!(freq.get(&0).copied().unwrap_or(0) > freq.get(&500).copied().unwrap_or(0));

        // Growing the item space must not recompute zeta from scratch.
        let mut max_seen = 0;
        for _ in 0..10_000 {
            let v = g.next(2000);
            assert!((0..2000).contains(&v));
            max_seen = max_seen.max(v);
        }
        assert_eq!(g.scratch_recomputes(), 0);
        assert!(max_seen >= 1000, "grown range never sampled: max {}", max_seen);

        let mut freq = HashMap::new();
        for _ in 0..10_000 {
            *freq.entry(g.next(2000)).or_insert(0) += 1;
        }
        let f0 = freq.get(&0).copied().unwrap_or(0);
        assert_eq!(freq.values().max().copied().unwrap_or(0), f0, "rank 0 lost top popularity");
    }

    #[test]
    fn zipfian_shrink_requires_opt_in() {
        let g = ZipfianGenerator::new(0, 999);
        g.next(500);
        assert_eq!(g.scratch_recomputes(), 0);
        g.set_allow_item_count_decrease(true);
        g.next(500);
        assert_eq!(g.scratch_recomputes(), 1);
    }

    #[test]
    fn scrambled_zipfian_covers_the_range_uniformly_in_position() {
        let g = ScrambledZipfianGenerator::new(10, 109);
        let freq = frequencies(&g, 20_000);
        for v in freq.keys() {
            assert!((10..=109).contains(v), "out of range: {}", v);
        }
        assert_eq!(g.mean(), (10.0 + 109.0) / 2.0);
        // The hash scatters the popular ranks: expect broad coverage.
        assert!(freq.len() > 60, "only {} distinct values", freq.len());
    }

    #[test]
    fn skewed_latest_prefers_recent_values() {
        let basis = Arc::new(CounterGenerator::new(0));
        for _ in 0..1000 {
            basis.next_value();
        }
        let g = SkewedLatestGenerator::new(basis.clone() as Arc<dyn NumberGenerator>);
        let mut newest_half = 0;
        let n = 10_000;
        for _ in 0..n {
            let v = g.next_value();
            assert!((0..1000).contains(&v), "out of range: {}", v);
            if v >= 500 {
                newest_half += 1;
            }
        }
        assert!(
            newest_half > n * 3 / 4,
            "latest skew too weak: {}/{} in newest half",
            newest_half,
            n
        );
    }
}
