//! Randomness primitives shared by the generators.
//!
//! Each thread owns a ChaCha8 generator seeded from a process-level seed
//! source, so workers never contend on RNG state and a run's draws are
//! decorrelated across threads. The FNV-1a hashes are used for key
//! scrambling (`insertorder=hashed`) and to spread zipfian ranks across the
//! key space.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

static SEED_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_thread_seed() -> u64 {
    let nth = SEED_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15);
    // Distinct odd multiplier keeps per-thread streams apart even when the
    // clock is coarse.
    base ^ nth.wrapping_mul(0xa076_1d64_78bd_642f)
}

thread_local! {
    static THREAD_RNG: RefCell<ChaCha8Rng> =
        RefCell::new(ChaCha8Rng::seed_from_u64(next_thread_seed()));
}

/// Uniform non-negative 63-bit integer.
pub fn next_u63() -> i64 {
    THREAD_RNG.with(|r| (r.borrow_mut().next_u64() >> 1) as i64)
}

/// Uniform float in `[0, 1)`.
pub fn next_f64() -> f64 {
    THREAD_RNG.with(|r| r.borrow_mut().gen::<f64>())
}

/// Uniform integer in `[0, n)`. `n` must be positive.
pub fn next_i64_below(n: i64) -> i64 {
    debug_assert!(n > 0, "next_i64_below requires a positive bound");
    THREAD_RNG.with(|r| r.borrow_mut().gen_range(0..n))
}

// ── FNV-1a ──

pub const FNV_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
pub const FNV_PRIME_32: u32 = 16_777_619;
pub const FNV_OFFSET_BASIS_64: u64 = 0xCBF2_9CE4_8422_2325;
pub const FNV_PRIME_64: u64 = 1_099_511_628_211;

/// FNV-1a over a byte slice, 32-bit variant.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// FNV-1a over a byte slice, 64-bit variant.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// Hash an integer key number octet-by-octet over its little-endian bytes.
pub fn fnv32(value: u64) -> u32 {
    fnv1a_32(&value.to_le_bytes())
}

/// Hash an integer key number octet-by-octet over its little-endian bytes.
pub fn fnv64(value: u64) -> u64 {
    fnv1a_64(&value.to_le_bytes())
}

/// Pseudo-random printable ASCII bytes in `[' ', ' ' + 95]`.
pub fn printable_bytes(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    THREAD_RNG.with(|r| {
        let mut rng = r.borrow_mut();
        for _ in 0..len {
            out.push(b' ' + rng.gen_range(0..96u8));
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u63_is_non_negative() {
        for _ in 0..10_000 {
            assert!(next_u63() >= 0);
        }
    }

    #[test]
    fn f64_in_unit_interval() {
        for _ in 0..10_000 {
            let v = next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn below_respects_bound() {
        for _ in 0..10_000 {
            let v = next_i64_below(7);
            assert!((0..7).contains(&v));
        }
    }

    #[test]
    fn fnv64_single_zero_octet() {
        // One round of FNV-1a over a single 0x00 octet.
        let expected = (FNV_OFFSET_BASIS_64 ^ 0).wrapping_mul(FNV_PRIME_64);
        assert_eq!(fnv1a_64(&[0u8]), expected);
    }

    #[test]
    fn fnv32_single_zero_octet() {
        let expected = (FNV_OFFSET_BASIS_32 ^ 0).wrapping_mul(FNV_PRIME_32);
        assert_eq!(fnv1a_32(&[0u8]), expected);
    }

    #[test]
    fn fnv_standard_vectors() {
        // Published FNV-1a test vectors for short strings.
        assert_eq!(fnv1a_32(b""), 0x811c9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn fnv64_is_stable_over_key_numbers() {
        assert_eq!(fnv64(12345), fnv64(12345));
        assert_ne!(fnv64(12345), fnv64(12346));
    }

    #[test]
    fn printable_bytes_are_printable() {
        let bytes = printable_bytes(4096);
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|&b| (b' '..=b' ' + 95).contains(&b)));
    }
}
