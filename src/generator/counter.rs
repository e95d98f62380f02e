//! Monotone counters, plain and acknowledged.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;

use super::{LastValue, NumberGenerator};

/// Emits `start, start+1, …`, strictly monotone across threads.
#[derive(Debug)]
pub struct CounterGenerator {
    count: AtomicI64,
    last: LastValue,
}

impl CounterGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            count: AtomicI64::new(start - 1),
            last: LastValue::new(start - 1),
        }
    }
}

impl NumberGenerator for CounterGenerator {
    fn next_value(&self) -> i64 {
        let ret = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.last.set(ret);
        ret
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        panic!("CounterGenerator has no mean");
    }
}

/// Number of slots in the acknowledgement window.
pub const ACK_WINDOW_SIZE: i64 = 1 << 20;
const ACK_WINDOW_MASK: i64 = ACK_WINDOW_SIZE - 1;

/// A [`CounterGenerator`] whose `last_value` is the highest *acknowledged*
/// value rather than the highest emitted one.
///
/// Acknowledgements may arrive out of order; the limit only advances over a
/// contiguous prefix of confirmed values, so a reader selecting keys at or
/// below `last_value()` never lands on an in-flight insert.
#[derive(Debug)]
pub struct AcknowledgedCounterGenerator {
    counter: CounterGenerator,
    window: Box<[AtomicBool]>,
    limit: AtomicI64,
    advance_lock: Mutex<()>,
}

impl AcknowledgedCounterGenerator {
    pub fn new(start: i64) -> Self {
        let window = (0..ACK_WINDOW_SIZE)
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            counter: CounterGenerator::new(start),
            window,
            limit: AtomicI64::new(start - 1),
            advance_lock: Mutex::new(()),
        }
    }

    /// Mark `value` as acknowledged, making it eligible for `last_value`.
    pub fn acknowledge(&self, value: i64) {
        let slot = (value & ACK_WINDOW_MASK) as usize;
        self.window[slot].store(true, Ordering::Release);

        let _guard = self.advance_lock.lock();
        // Move the limit across the contiguous run of set slots, clearing
        // them as we go. Stop at the first gap, or just before wrapping
        // back onto the limit's own slot.
        let limit = self.limit.load(Ordering::Acquire);
        let before_first_slot = limit & ACK_WINDOW_MASK;
        let mut index = limit + 1;
        while (index & ACK_WINDOW_MASK) != before_first_slot {
            let s = (index & ACK_WINDOW_MASK) as usize;
            if !self.window[s].load(Ordering::Acquire) {
                break;
            }
            self.window[s].store(false, Ordering::Release);
            index += 1;
        }
        self.limit.store(index - 1, Ordering::Release);
    }
}

impl NumberGenerator for AcknowledgedCounterGenerator {
    fn next_value(&self) -> i64 {
        self.counter.next_value()
    }

    /// The highest value such that everything at or below it has been
    /// acknowledged.
    fn last_value(&self) -> i64 {
        self.limit.load(Ordering::Acquire)
    }

    fn mean(&self) -> f64 {
        panic!("AcknowledgedCounterGenerator has no mean");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn counter_emits_consecutive_values() {
        let c = CounterGenerator::new(100);
        assert_eq!(c.last_value(), 99);
        for expected in 100..110 {
            assert_eq!(c.next_value(), expected);
            assert_eq!(c.last_value(), expected);
        }
    }

    #[test]
    fn counter_values_unique_across_threads() {
        let c = Arc::new(CounterGenerator::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&c);
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| c.next_value()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate value {}", v);
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(*seen.iter().min().unwrap(), 0);
        assert_eq!(*seen.iter().max().unwrap(), 7999);
    }

    #[test]
    fn counter_mean_panics() {
        let c = CounterGenerator::new(0);
        assert!(std::panic::catch_unwind(|| c.mean()).is_err());
    }

    #[test]
    fn acknowledged_limit_tracks_contiguous_prefix() {
        let c = AcknowledgedCounterGenerator::new(0);
        for _ in 0..10 {
            c.next_value();
        }
        let acks = [0, 2, 1, 3, 5, 4, 6, 7, 9, 8];
        let expected_limits = [-1, -1, 2, 3, 3, 5, 6, 7, 7, 9];
        for (ack, expected) in acks.iter().zip(expected_limits.iter()) {
            c.acknowledge(*ack);
            assert_eq!(c.last_value(), *expected, "after ack of {}", ack);
        }
    }

    #[test]
    fn acknowledged_limit_never_exceeds_max_emitted() {
        let c = Arc::new(AcknowledgedCounterGenerator::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let c = Arc::clone(&c);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    let v = c.next_value();
                    c.acknowledge(v);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.last_value(), 1999);
    }
}
