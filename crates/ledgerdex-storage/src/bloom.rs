//! Bloom Filter for Block Keys
//!
//! Every sealed block carries a bloom filter over the keys written in it.
//! History reconstruction tests the filter first and only scans a block's
//! write log when the filter says the key may be present.
//!
//! ## Guarantees
//!
//! - If `may_contain(key)` returns `false`, the key was never inserted
//! - If `may_contain(key)` returns `true`, the key MAY have been inserted
//!   (false positive rate ≈ `(1 - e^(-k·n/m))^k`)
//!
//! ## Hash Functions
//!
//! The filter uses `k` independent keyed SipHash-1-3 functions. Each function
//! has its own 64-bit seed, drawn once when the filter is created and stored
//! with it; the 128-bit SipHash key is derived from that seed. A filter
//! therefore answers identically before and after a round trip through bytes.
//!
//! Double hashing (`h1 + i·h2`) would cost two hashes per key instead of `k`.
//! Blocks hold at most a few thousand keys, so the filter spends the extra
//! hashing to keep the functions independent. Seeds are never combined with
//! XOR into a shared key; a weak seed pair would otherwise correlate every
//! function at once.
//!
//! ## Binary Format
//!
//! ```text
//! [version: u8 = 1]
//! [num_bits: u64][num_hashes: u32][item_count: u64]
//! [seeds: num_hashes × u64]
//! [bitmap: ceil(num_bits / 64) × u64]
//! ```
//!
//! All integers are little endian. Anything that does not match this layout
//! exactly is rejected as [`Error::CorruptIndex`].
//!
//! ## Usage
//!
//! ```
//! use ledgerdex_storage::bloom::BloomFilter;
//!
//! let filter = BloomFilter::build(["91041", "91042"], 1024, 7);
//! assert!(filter.may_contain(b"91041"));
//!
//! let bytes = filter.to_bytes();
//! let restored = BloomFilter::from_bytes(&bytes).unwrap();
//! assert_eq!(restored, filter);
//! ```

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

const FORMAT_VERSION: u8 = 1;

/// version + num_bits + num_hashes + item_count
const HEADER_LEN: usize = 1 + 8 + 4 + 8;

/// Upper bound on hash functions accepted when decoding
const MAX_DECODED_HASHES: u32 = 256;

/// Default false positive rate (1%)
const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Second half of each function's SipHash key
const SEED_TWEAK: u64 = 0x9e37_79b9_7f4a_7c15;

/// Sizing parameters for filters built when a block is sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterConfig {
    /// Target false positive rate (default: 0.01 = 1%)
    #[serde(default = "default_fp_rate")]
    pub target_false_positive_rate: f64,

    /// Smallest bitmap ever allocated, in bits (default: 64)
    #[serde(default = "default_min_bits")]
    pub min_bits: u64,

    /// Cap on the number of hash functions (default: 16)
    #[serde(default = "default_max_hashes")]
    pub max_hashes: u32,
}

fn default_fp_rate() -> f64 {
    DEFAULT_FALSE_POSITIVE_RATE
}

fn default_min_bits() -> u64 {
    64
}

fn default_max_hashes() -> u32 {
    16
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self {
            target_false_positive_rate: default_fp_rate(),
            min_bits: default_min_bits(),
            max_hashes: default_max_hashes(),
        }
    }
}

/// Compute `(num_bits, num_hashes)` for `expected_items` keys under `config`.
///
/// ```text
/// m = ceil(-n · ln p / (ln 2)²)
/// k = round(m / n · ln 2)
/// ```
pub fn optimal_params(expected_items: usize, config: &BloomFilterConfig) -> (u64, u32) {
    let p = config.target_false_positive_rate;
    let p = if p > 0.0 && p < 1.0 {
        p
    } else {
        DEFAULT_FALSE_POSITIVE_RATE
    };
    let n = expected_items.max(1) as f64;
    let ln2 = std::f64::consts::LN_2;

    let bits = (-n * p.ln() / (ln2 * ln2)).ceil() as u64;
    let bits = bits.max(config.min_bits).max(1);

    let hashes = ((bits as f64 / n) * ln2).round() as u32;
    let hashes = hashes.clamp(1, config.max_hashes.max(1));

    (bits, hashes)
}

/// Expected false positive probability of a filter with `num_bits` bits and
/// `num_hashes` functions holding `items` keys.
pub fn false_positive_rate(num_bits: u64, num_hashes: u32, items: u64) -> f64 {
    if items == 0 || num_bits == 0 {
        return 0.0;
    }
    let k = num_hashes as f64;
    let exponent = -k * items as f64 / num_bits as f64;
    (1.0 - exponent.exp()).powf(k)
}

/// Fixed-size bit array with `k` seeded hash functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    num_bits: u64,
    seeds: Vec<u64>,
    bits: Vec<u64>,
    item_count: u64,
}

impl BloomFilter {
    /// Create an empty filter with freshly drawn seeds.
    ///
    /// Zero bits or zero hash functions are raised to one.
    pub fn new(num_bits: u64, num_hashes: u32) -> Self {
        let seeds = (0..num_hashes.max(1)).map(|_| rand::random::<u64>()).collect();
        Self::with_seeds(num_bits, seeds)
    }

    /// Create an empty filter with caller-chosen seeds, one per function.
    ///
    /// An empty seed list is replaced by the single seed `0`.
    pub fn with_seeds(num_bits: u64, mut seeds: Vec<u64>) -> Self {
        if seeds.is_empty() {
            seeds.push(0);
        }
        let num_bits = num_bits.max(1);
        Self {
            num_bits,
            seeds,
            bits: vec![0; word_count(num_bits)],
            item_count: 0,
        }
    }

    /// Build a filter over `keys` with explicit dimensions.
    pub fn build<I, K>(keys: I, num_bits: u64, num_hashes: u32) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut filter = Self::new(num_bits, num_hashes);
        for key in keys {
            filter.insert(key.as_ref());
        }
        filter
    }

    /// Build a filter over `keys`, sized for `config`'s false positive target.
    pub fn for_keys<K: AsRef<[u8]>>(keys: &[K], config: &BloomFilterConfig) -> Self {
        let (num_bits, num_hashes) = optimal_params(keys.len(), config);
        let filter = Self::build(keys, num_bits, num_hashes);

        tracing::debug!(
            items = keys.len(),
            num_bits,
            num_hashes,
            expected_fp_rate = filter.estimated_fp_rate(),
            "Built block bloom filter"
        );

        filter
    }

    pub fn insert(&mut self, key: &[u8]) {
        for i in 0..self.seeds.len() {
            let bit = bit_position(self.seeds[i], self.num_bits, key);
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.item_count += 1;
    }

    /// Check whether `key` may have been inserted.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.seeds.iter().all(|&seed| {
            let bit = bit_position(seed, self.num_bits, key);
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.seeds.len() as u32
    }

    pub fn seeds(&self) -> &[u64] {
        &self.seeds
    }

    /// Size of the encoded filter in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + 8 * self.seeds.len() + 8 * self.bits.len()
    }

    /// False positive probability at the current fill level
    pub fn estimated_fp_rate(&self) -> f64 {
        false_positive_rate(self.num_bits, self.num_hashes(), self.item_count)
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(FORMAT_VERSION);
        buf.put_u64_le(self.num_bits);
        buf.put_u32_le(self.num_hashes());
        buf.put_u64_le(self.item_count);
        for seed in &self.seeds {
            buf.put_u64_le(*seed);
        }
        for word in &self.bits {
            buf.put_u64_le(*word);
        }
        buf.freeze()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::CorruptIndex(format!(
                "truncated header: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let num_bits = buf.get_u64_le();
        let num_hashes = buf.get_u32_le();
        let item_count = buf.get_u64_le();

        if num_bits == 0 {
            return Err(Error::CorruptIndex("zero bits".to_string()));
        }
        if num_hashes == 0 || num_hashes > MAX_DECODED_HASHES {
            return Err(Error::CorruptIndex(format!(
                "invalid hash function count {}",
                num_hashes
            )));
        }

        let words = num_bits.div_ceil(64);
        let expected = words
            .checked_add(num_hashes as u64)
            .and_then(|n| n.checked_mul(8));
        if expected != Some(buf.remaining() as u64) {
            return Err(Error::CorruptIndex(format!(
                "length mismatch: {} payload bytes for {} bits and {} hashes",
                buf.remaining(),
                num_bits,
                num_hashes
            )));
        }

        let seeds = (0..num_hashes).map(|_| buf.get_u64_le()).collect();
        let bits = (0..words).map(|_| buf.get_u64_le()).collect();

        Ok(Self {
            num_bits,
            seeds,
            bits,
            item_count,
        })
    }
}

fn word_count(num_bits: u64) -> usize {
    num_bits.div_ceil(64) as usize
}

fn bit_position(seed: u64, num_bits: u64, key: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(seed, seed ^ SEED_TWEAK);
    hasher.write(key);
    hasher.finish() % num_bits
}

/// Bloom filter statistics for one reconstruction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BloomFilterStats {
    /// Filters consulted
    pub lookups: u64,

    /// Blocks skipped because the filter ruled the key out
    pub true_negatives: u64,

    /// Filters that said the key may be present
    pub potential_positives: u64,

    /// Potential positives whose block held no write for the key
    pub false_positives: u64,

    /// Filters that failed to decode and forced a full scan
    pub corrupt_filters: u64,

    /// Block write logs read
    pub blocks_scanned: u64,
}

impl BloomFilterStats {
    /// Record a filter lookup and, for positives, whether the block held the key
    pub fn record_lookup(&mut self, may_contain: bool, actually_contains: bool) {
        self.lookups += 1;

        if may_contain {
            self.potential_positives += 1;
            if !actually_contains {
                self.false_positives += 1;
            }
        } else {
            self.true_negatives += 1;
        }
    }

    pub fn record_corrupt(&mut self) {
        self.corrupt_filters += 1;
    }

    pub fn record_scan(&mut self) {
        self.blocks_scanned += 1;
    }

    /// Fraction of positives that turned out empty
    pub fn observed_fp_rate(&self) -> f64 {
        if self.potential_positives == 0 {
            0.0
        } else {
            self.false_positives as f64 / self.potential_positives as f64
        }
    }

    /// Fraction of lookups that avoided a block scan
    pub fn skip_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.true_negatives as f64 / self.lookups as f64
        }
    }

    pub fn merge(&mut self, other: &BloomFilterStats) {
        self.lookups += other.lookups;
        self.true_negatives += other.true_negatives;
        self.potential_positives += other.potential_positives;
        self.false_positives += other.false_positives;
        self.corrupt_filters += other.corrupt_filters;
        self.blocks_scanned += other.blocks_scanned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_basic() {
        let keys: Vec<String> = (0..100).map(|i| format!("order-{}", i)).collect();
        let filter = BloomFilter::for_keys(&keys, &BloomFilterConfig::default());

        assert_eq!(filter.item_count(), 100);
        for key in &keys {
            assert!(filter.may_contain(key.as_bytes()));
        }

        let false_positives = (1000..2000)
            .filter(|i| filter.may_contain(format!("missing-{}", i).as_bytes()))
            .count();

        // 1% target over 1000 probes
        assert!(
            false_positives < 50,
            "Too many false positives: {}",
            false_positives
        );
    }

    #[test]
    fn test_same_seeds_same_answers() {
        let mut a = BloomFilter::with_seeds(512, vec![1, 2, 3]);
        let mut b = BloomFilter::with_seeds(512, vec![1, 2, 3]);
        a.insert(b"91041");
        b.insert(b"91041");

        assert_eq!(a, b);
        for probe in ["1", "2", "91041", "0xabc"] {
            assert_eq!(a.may_contain(probe.as_bytes()), b.may_contain(probe.as_bytes()));
        }
    }

    #[test]
    fn test_seeds_drawn_per_filter() {
        let a = BloomFilter::new(256, 4);
        let b = BloomFilter::new(256, 4);
        assert_eq!(a.num_hashes(), 4);
        // Four independent 64-bit draws colliding is not a realistic outcome
        assert_ne!(a.seeds(), b.seeds());
    }

    #[test]
    fn test_serialization_preserves_seeds_and_bits() {
        let filter = BloomFilter::build(["a", "b", "c"], 300, 5);
        let bytes = filter.to_bytes();

        assert_eq!(bytes.len(), filter.encoded_len());
        assert_eq!(bytes[0], FORMAT_VERSION);

        let restored = BloomFilter::from_bytes(&bytes).unwrap();
        assert_eq!(restored, filter);
        assert_eq!(restored.seeds(), filter.seeds());
        assert_eq!(restored.item_count(), 3);
        assert!(restored.may_contain(b"b"));
    }

    #[test]
    fn test_zero_dimensions_raised_to_one() {
        let mut filter = BloomFilter::new(0, 0);
        assert_eq!(filter.num_bits(), 1);
        assert_eq!(filter.num_hashes(), 1);

        filter.insert(b"x");
        // A single bit set means everything may be present
        assert!(filter.may_contain(b"anything"));
    }

    #[test]
    fn test_empty_data_error() {
        assert!(matches!(
            BloomFilter::from_bytes(&[]),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_invalid_version_error() {
        let mut bytes = BloomFilter::build(["k"], 64, 2).to_bytes().to_vec();
        bytes[0] = 99;
        assert!(matches!(
            BloomFilter::from_bytes(&bytes),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_truncated_and_padded_rejected() {
        let bytes = BloomFilter::build(["k"], 200, 3).to_bytes();

        assert!(BloomFilter::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes.to_vec();
        padded.push(0);
        assert!(BloomFilter::from_bytes(&padded).is_err());
    }

    #[test]
    fn test_zero_bits_or_hashes_rejected() {
        let mut header = vec![FORMAT_VERSION];
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&7u64.to_le_bytes());
        assert!(BloomFilter::from_bytes(&header).is_err());

        let mut header = vec![FORMAT_VERSION];
        header.extend_from_slice(&64u64.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        assert!(BloomFilter::from_bytes(&header).is_err());
    }

    #[test]
    fn test_optimal_params() {
        let config = BloomFilterConfig::default();
        let (bits, hashes) = optimal_params(1000, &config);

        // ~9.6 bits per key and 7 hashes at 1%
        assert!((9000..10000).contains(&bits), "bits = {}", bits);
        assert_eq!(hashes, 7);
        assert!(false_positive_rate(bits, hashes, 1000) <= 0.011);

        let (bits, hashes) = optimal_params(0, &config);
        assert_eq!(bits, config.min_bits);
        assert!(hashes >= 1 && hashes <= config.max_hashes);
    }

    #[test]
    fn test_optimal_params_respects_hash_cap() {
        let config = BloomFilterConfig {
            target_false_positive_rate: 1e-9,
            max_hashes: 4,
            ..Default::default()
        };
        let (_, hashes) = optimal_params(10, &config);
        assert_eq!(hashes, 4);
    }

    #[test]
    fn test_bloom_filter_stats() {
        let mut stats = BloomFilterStats::default();

        stats.record_lookup(false, false);
        stats.record_lookup(false, false);
        stats.record_lookup(true, true);
        stats.record_lookup(true, false);
        stats.record_corrupt();

        assert_eq!(stats.lookups, 4);
        assert_eq!(stats.true_negatives, 2);
        assert_eq!(stats.potential_positives, 2);
        assert_eq!(stats.false_positives, 1);
        assert_eq!(stats.skip_rate(), 0.5);
        assert_eq!(stats.observed_fp_rate(), 0.5);

        let mut total = BloomFilterStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.lookups, 8);
        assert_eq!(total.corrupt_filters, 2);
    }
}
