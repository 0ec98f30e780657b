//! Approximate membership filter
//!
//! A fixed-size Bloom filter used to skip entities that were already processed.
//! Bits are only ever set, so there are no false negatives; the false-positive
//! rate stays near the design target until insertions exceed the expected
//! cardinality, after which it climbs. That trade-off is accepted for
//! deduplication, which only needs "probably seen".

use crate::error::GovernError;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use tracing::warn;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Sizing, the `dedup` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub expected_items: usize,
    pub false_positive_rate: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            expected_items: 10_000,
            false_positive_rate: 0.01,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        if self.expected_items == 0 {
            return Err(GovernError::InvalidFilter(
                "expected_items must be greater than zero".to_string(),
            ));
        }
        let p = self.false_positive_rate;
        if !(p > 0.0 && p < 1.0) {
            return Err(GovernError::InvalidFilter(format!(
                "false_positive_rate must be in (0, 1), got {p}"
            )));
        }
        Ok(())
    }
}

/// Append-only Bloom filter with double hashing
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    m: u64,
    k: u32,
    expected_items: usize,
    inserted: usize,
    saturation_reported: bool,
}

impl BloomFilter {
    /// Size a filter for `expected_items` keys at `false_positive_rate`
    ///
    /// `m = ceil(-n ln p / ln²2)` bits and `k = round(ln2 · m / n)` hash rounds.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self, GovernError> {
        DedupConfig {
            expected_items,
            false_positive_rate,
        }
        .validate()?;

        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / (LN_2 * LN_2)).ceil().max(1.0) as u64;
        let k = ((LN_2 * m as f64 / n).round() as u32).max(1);

        Ok(Self {
            bits: vec![0; m.div_ceil(64) as usize],
            m,
            k,
            expected_items,
            inserted: 0,
            saturation_reported: false,
        })
    }

    pub fn from_config(config: &DedupConfig) -> Result<Self, GovernError> {
        Self::new(config.expected_items, config.false_positive_rate)
    }

    /// Bit-array size
    pub fn bit_len(&self) -> u64 {
        self.m
    }

    /// Hash rounds per key
    pub fn hash_count(&self) -> u32 {
        self.k
    }

    fn indexes(&self, key: &[u8]) -> impl Iterator<Item = u64> {
        let h1 = fnv1a_64(key);
        let h2 = fnv1_64(key);
        let m = self.m;
        (0..u64::from(self.k)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    pub fn add(&mut self, key: impl AsRef<[u8]>) {
        for i in self.indexes(key.as_ref()) {
            self.bits[(i / 64) as usize] |= 1 << (i % 64);
        }
        self.inserted += 1;

        if self.inserted > self.expected_items && !self.saturation_reported {
            self.saturation_reported = true;
            warn!(
                expected = self.expected_items,
                inserted = self.inserted,
                estimated_fp_rate = self.estimated_false_positive_rate(),
                "membership filter past design load"
            );
        }
    }

    /// True if `key` was probably added; false means it definitely was not
    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.indexes(key.as_ref())
            .all(|i| self.bits[(i / 64) as usize] & (1 << (i % 64)) != 0)
    }

    /// Number of `add` calls, duplicates included
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Fraction of bits set
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.bits.iter().map(|w| u64::from(w.count_ones())).sum();
        set as f64 / self.m as f64
    }

    /// Current false-positive estimate from the fill ratio (`fill^k`)
    pub fn estimated_false_positive_rate(&self) -> f64 {
        self.fill_ratio().powi(self.k as i32)
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

fn fnv1_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        hash.wrapping_mul(FNV_PRIME) ^ u64::from(b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing() {
        let f = BloomFilter::new(10_000, 0.01).unwrap();
        assert_eq!(f.bit_len(), 95_851);
        assert_eq!(f.hash_count(), 7);
    }

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1_64(b"a"), 0xaf63_bd4c_8601_b7be);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut f = BloomFilter::new(10_000, 0.01).unwrap();
        for i in 0..10_000 {
            f.add(format!("profile-{i}"));
        }
        for i in 0..10_000 {
            assert!(f.contains(format!("profile-{i}")));
        }
        assert_eq!(f.inserted(), 10_000);
    }

    #[test]
    fn test_false_positive_rate_near_target() {
        let mut f = BloomFilter::new(10_000, 0.01).unwrap();
        for i in 0..10_000 {
            f.add(format!("seen/{i}"));
        }
        let hits = (0..10_000)
            .filter(|i| f.contains(format!("unseen/{i}")))
            .count();
        let rate = hits as f64 / 10_000.0;
        assert!(rate <= 0.02, "false positive rate {rate}");
        assert!(f.estimated_false_positive_rate() < 0.02);
        assert!(f.fill_ratio() > 0.4 && f.fill_ratio() < 0.6);
    }

    #[test]
    fn test_empty_filter() {
        let f = BloomFilter::new(100, 0.01).unwrap();
        assert!(!f.contains("anything"));
        assert_eq!(f.fill_ratio(), 0.0);
    }

    #[test]
    fn test_past_design_load_still_answers() {
        let mut f = BloomFilter::new(10, 0.01).unwrap();
        for i in 0..100 {
            f.add(i.to_string());
        }
        assert!(f.contains("42"));
        assert!(f.estimated_false_positive_rate() > 0.01);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            BloomFilter::new(0, 0.01),
            Err(GovernError::InvalidFilter(_))
        ));
        assert!(BloomFilter::new(10, 0.0).is_err());
        assert!(BloomFilter::new(10, 1.0).is_err());
        assert!(BloomFilter::new(10, f64::NAN).is_err());
    }
}
