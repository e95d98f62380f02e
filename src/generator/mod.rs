//! The value-generator algebra.
//!
//! Generators produce the synthetic inputs of a workload: key numbers,
//! field lengths, scan lengths, operation labels. Every generator is shared
//! by all workers of a run, so the contract is `&self` plus interior
//! mutability; `next_*` must be safe to call from any number of threads at
//! once.

mod counter;
mod discrete;
mod exponential;
mod file;
mod histogram;
mod hotspot;
mod uniform;
mod zipfian;

pub use counter::{AcknowledgedCounterGenerator, CounterGenerator, ACK_WINDOW_SIZE};
pub use discrete::DiscreteGenerator;
pub use exponential::ExponentialGenerator;
pub use file::FileGenerator;
pub use histogram::HistogramGenerator;
pub use hotspot::HotspotGenerator;
pub use uniform::{ConstantGenerator, UniformGenerator};
pub use zipfian::{ScrambledZipfianGenerator, SkewedLatestGenerator, ZipfianGenerator, ZIPFIAN_CONSTANT};

use std::sync::atomic::{AtomicI64, Ordering};

/// A generator of strings.
pub trait Generator: Send + Sync {
    /// Produce the next value of the sequence.
    fn next_string(&self) -> String;
    /// The most recently produced value.
    fn last_string(&self) -> String;
}

/// A generator of integers.
///
/// `next_string`/`last_string` come for free as the decimal rendering of
/// the integer sequence.
pub trait NumberGenerator: Send + Sync {
    /// Produce the next value of the sequence.
    fn next_value(&self) -> i64;

    /// The most recently produced value. Implementations keep this in sync
    /// through [`LastValue`].
    fn last_value(&self) -> i64;

    /// The expected value of the distribution.
    ///
    /// Panics for sequence generators (counters, zipfian) where a mean is
    /// meaningless; asking for one is a programming error.
    fn mean(&self) -> f64;

    fn next_string(&self) -> String {
        self.next_value().to_string()
    }

    fn last_string(&self) -> String {
        self.last_value().to_string()
    }
}

/// Shared bookkeeping for the `last_value` contract.
///
/// Concrete generators embed one of these and call [`LastValue::set`] on
/// every emission path.
#[derive(Debug)]
pub struct LastValue(AtomicI64);

impl LastValue {
    pub fn new(initial: i64) -> Self {
        Self(AtomicI64::new(initial))
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}
