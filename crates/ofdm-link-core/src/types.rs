//! Core types for the adaptive link
//!
//! Complex baseband samples, bit-stream aliases and the crate-wide error
//! type live here. Every fallible constructor in the crate returns
//! [`LinkResult`]; runtime decode outcomes (a header that fails its CRC, a
//! feedback burst that never validates, an LDPC codeword that does not
//! converge) are not errors of the call and are reported through result
//! structs instead.
//!
//! ## Bit conventions
//!
//! Unpacked bits are carried one per byte (`0` or `1`), which is how the
//! header codec, the FEC framer and the feedback framer exchange them.
//! Soft bits are log-likelihood ratios where a positive value favours `0`.
//!
//! ```rust
//! use ofdm_link_core::types::{LinkError, LinkResult};
//!
//! fn check_alpha(alpha: f64) -> LinkResult<f64> {
//!     if alpha > 0.0 && alpha <= 1.0 {
//!         Ok(alpha)
//!     } else {
//!         Err(LinkError::InvalidConfig(format!("alpha {alpha} outside (0, 1]")))
//!     }
//! }
//!
//! assert!(check_alpha(0.1).is_ok());
//! assert!(check_alpha(0.0).is_err());
//! ```

use crate::mcs::McsSelection;
use num_complex::Complex64;

/// Type alias for complex baseband samples
pub type Complex = Complex64;

/// Unpacked bits, one bit per byte
pub type BitStream = Vec<u8>;

/// Soft bits (LLRs, positive favours 0)
pub type SoftBits = Vec<f64>;

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors raised by the link-control core
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sync word {index} has {actual} entries, FFT length is {fft_len}")]
    SyncWordLength {
        index: usize,
        actual: usize,
        fft_len: usize,
    },

    #[error("Invalid MCS table: {0}")]
    InvalidMcsTable(String),

    #[error("Unknown FEC code id {0}")]
    UnknownFecCode(u8),

    #[error("MCS selection {0} is not an entry of the link's table")]
    NotInMcsTable(McsSelection),

    #[error("Unknown modulation scheme id {0}")]
    UnknownScheme(u8),

    #[error("Header layout needs {required} bits but only {available} fit the header symbols")]
    HeaderCapacity { required: usize, available: usize },

    #[error("Header field {field} value {value} does not fit in {bits} bits")]
    HeaderFieldOverflow {
        field: &'static str,
        value: u64,
        bits: usize,
    },

    #[error("Header CRC check failed")]
    HeaderCrc,

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("alist parse error at line {line}: {message}")]
    Alist { line: usize, message: String },

    #[error("Frame store record is corrupt: {0}")]
    FrameStore(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// True for errors that must stop the modem from starting.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidConfig(_)
                | LinkError::SyncWordLength { .. }
                | LinkError::InvalidMcsTable(_)
                | LinkError::UnknownFecCode(_)
                | LinkError::HeaderCapacity { .. }
                | LinkError::Alist { .. }
                | LinkError::ConfigParse(_)
        )
    }
}

/// Average power of a block of samples
pub fn average_power(samples: &[Complex]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.norm_sqr()).sum::<f64>() / samples.len() as f64
}

/// Hard decision on a soft bit
#[inline]
pub fn hard_bit(llr: f64) -> u8 {
    if llr < 0.0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_average_power() {
        let samples = vec![
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 1.0),
            Complex::new(-1.0, 0.0),
            Complex::new(0.0, -1.0),
        ];
        assert_relative_eq!(average_power(&samples), 1.0, epsilon = 1e-12);
        assert_eq!(average_power(&[]), 0.0);
    }

    #[test]
    fn test_hard_bit() {
        assert_eq!(hard_bit(3.2), 0);
        assert_eq!(hard_bit(0.0), 0);
        assert_eq!(hard_bit(-0.1), 1);
    }

    #[test]
    fn test_config_error_classification() {
        assert!(LinkError::UnknownFecCode(7).is_config_error());
        assert!(LinkError::SyncWordLength {
            index: 0,
            actual: 32,
            fft_len: 64
        }
        .is_config_error());
        assert!(!LinkError::HeaderCrc.is_config_error());
    }
}
