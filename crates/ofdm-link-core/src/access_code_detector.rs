//! Access Code Detector
//!
//! Bit-level search for a sync word, tolerating up to `threshold` bit
//! errors. The feedback receiver checks the hard decisions of the access
//! code it just correlated against, and scans raw bit streams when the
//! burst was demodulated elsewhere.
//!
//! ```rust
//! use ofdm_link_core::access_code_detector::AccessCodeDetector;
//!
//! let det = AccessCodeDetector::new(0xE5, 8, 1).unwrap();
//! let mut bits = vec![0u8; 5];
//! bits.extend([1, 1, 1, 0, 0, 1, 0, 0]); // one error in the last bit
//! let hit = det.find(&bits).unwrap();
//! assert_eq!(hit.end, 13);
//! assert_eq!(hit.hamming_distance, 1);
//! ```

use crate::types::{LinkError, LinkResult};

/// Where a sync word was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCodeMatch {
    /// Index one past the last sync word bit
    pub end: usize,
    pub hamming_distance: u32,
}

/// Sliding shift-register matcher for sync words up to 64 bits.
#[derive(Debug, Clone)]
pub struct AccessCodeDetector {
    code: u64,
    mask: u64,
    len: usize,
    threshold: u32,
}

impl AccessCodeDetector {
    /// `code` holds the sync word in its low `len` bits, first bit in the MSB.
    pub fn new(code: u64, len: usize, threshold: u32) -> LinkResult<Self> {
        if len == 0 || len > 64 {
            return Err(LinkError::InvalidConfig(format!(
                "access code length {len} outside 1..=64"
            )));
        }
        let mask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
        Ok(Self {
            code: code & mask,
            mask,
            len,
            threshold,
        })
    }

    /// Full-width 64-bit sync word.
    pub fn from_u64(code: u64, threshold: u32) -> Self {
        Self {
            code,
            mask: u64::MAX,
            len: 64,
            threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Sync word as unpacked bits, first bit first.
    pub fn bits(&self) -> Vec<u8> {
        (0..self.len)
            .rev()
            .map(|i| ((self.code >> i) & 1) as u8)
            .collect()
    }

    /// Bit errors between the sync word and the first `len` bits of `bits`.
    /// `None` if `bits` is too short.
    pub fn distance(&self, bits: &[u8]) -> Option<u32> {
        if bits.len() < self.len {
            return None;
        }
        let reg = bits[..self.len]
            .iter()
            .fold(0u64, |acc, &b| (acc << 1) | (b & 1) as u64);
        Some(((reg ^ self.code) & self.mask).count_ones())
    }

    /// Whether `bits` starts with the sync word within the threshold.
    pub fn matches_prefix(&self, bits: &[u8]) -> bool {
        self.distance(bits).is_some_and(|d| d <= self.threshold)
    }

    /// First position where the sync word ends within the threshold.
    pub fn find(&self, bits: &[u8]) -> Option<AccessCodeMatch> {
        let mut reg = 0u64;
        for (i, &b) in bits.iter().enumerate() {
            reg = ((reg << 1) | (b & 1) as u64) & self.mask;
            if i + 1 >= self.len {
                let d = (reg ^ self.code).count_ones();
                if d <= self.threshold {
                    return Some(AccessCodeMatch {
                        end: i + 1,
                        hamming_distance: d,
                    });
                }
            }
        }
        None
    }
}
