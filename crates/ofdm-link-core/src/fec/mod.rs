//! Forward Error Correction
//!
//! LDPC codes described by alist parity-check matrices, and the codebook
//! that maps the 4-bit wire id to a loaded code.
//!
//! ## Usage
//!
//! ```rust
//! use ofdm_link_core::fec::{FecCodebook, FecCodeConfig};
//!
//! let book = FecCodebook::from_configs(&[FecCodeConfig::builtin(1, "ldpc_n96_r12")]).unwrap();
//! let code = book.get(1).unwrap();
//! let codeword = code.encode(&[1, 0, 1, 1]);
//! assert_eq!(codeword.len(), code.n());
//! ```

pub mod alist;
pub mod codebook;
pub mod ldpc;

pub use alist::{load_alist, parse_alist};
pub use codebook::{FecCodeConfig, FecCodebook, BUILTIN_CODES};
pub use ldpc::{DecodeResult, DecodingAlgorithm, LdpcCode, SparseParityCheck};
