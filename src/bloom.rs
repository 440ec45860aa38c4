//! Bloom filter for the new-flow counter
//!
//! Classical Bloom filter sized from a projected element count and a
//! target false-positive probability. A false positive here only means a
//! genuinely new source is treated as already counted, so the per-prefix
//! count can under-shoot by a small margin; it never over-counts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Sizing inputs for a [`BloomFilter`].
#[derive(Debug, Clone, Copy)]
pub struct BloomParams {
    /// Expected number of distinct insertions per window.
    pub projected_items: usize,
    /// Target false-positive probability at the projected load.
    pub false_positive_rate: f64,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            projected_items: 1_000_000,
            false_positive_rate: 0.01,
        }
    }
}

impl BloomParams {
    /// Derive the optimal bit count `m` and hash count `k`:
    /// m = ceil(-n ln p / (ln 2)^2), k = round((m / n) ln 2).
    pub fn optimal(&self) -> (usize, u32) {
        let n = (self.projected_items.max(1)) as f64;
        let p = self.false_positive_rate.clamp(1e-12, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0);
        let k = ((m / n) * ln2).round().max(1.0);
        (m as usize, k as u32)
    }
}

/// Bit-array Bloom filter over byte-string keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    pub fn new(params: &BloomParams) -> Self {
        let (num_bits, num_hashes) = params.optimal();
        let num_words = num_bits.div_ceil(64);
        Self {
            bits: vec![0; num_words],
            num_bits: num_bits as u64,
            num_hashes,
        }
    }

    /// Two independent hashes; probe i uses h1 + i * h2.
    #[inline]
    fn hash_pair(key: &[u8]) -> (u64, u64) {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let h1 = hasher.finish();

        let mut hasher = DefaultHasher::new();
        0xb10f_0b10u64.hash(&mut hasher);
        key.hash(&mut hasher);
        // odd stride so successive probes cover every slot
        let h2 = hasher.finish() | 1;

        (h1, h2)
    }

    #[inline]
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let pos = h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits;
            self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let pos = h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits;
            if self.bits[(pos / 64) as usize] & (1 << (pos % 64)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
    }
}
