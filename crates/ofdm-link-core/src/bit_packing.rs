//! Bit Packing and Unpacking
//!
//! Conversions between the packed byte stream handed in by the caller, the
//! unpacked one-bit-per-byte streams used for framing, and the k-bit symbol
//! indices consumed by the constellation mapper.
//!
//! - `bytes_to_bits` / `bits_to_bytes`: MSB-first, used for payload and
//!   feedback bursts
//! - `push_field` / `read_field`: LSB-first fixed-width fields, used by the
//!   frame header
//! - `PackKBits` / `UnpackKBits`: group bits into symbol indices and back
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::bit_packing::{bits_to_bytes, bytes_to_bits, PackKBits, UnpackKBits};
//!
//! let bits = bytes_to_bits(&[0b1011_0010]);
//! assert_eq!(bits, vec![1, 0, 1, 1, 0, 0, 1, 0]);
//! assert_eq!(bits_to_bytes(&bits), vec![0b1011_0010]);
//!
//! // Two bits per QPSK symbol
//! let symbols = PackKBits::new(2).pack(&bits);
//! assert_eq!(symbols, vec![0b10, 0b11, 0b00, 0b10]);
//! assert_eq!(UnpackKBits::new(2).unpack(&symbols), bits);
//! ```

use crate::types::BitStream;

/// Unpack bytes into bits, MSB first.
pub fn bytes_to_bits(bytes: &[u8]) -> BitStream {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for i in (0..8).rev() {
            bits.push((byte >> i) & 1);
        }
    }
    bits
}

/// Pack bits into bytes, MSB first. A trailing partial byte is zero-padded.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b & 1) << (7 - i)))
        })
        .collect()
}

/// Pack bits into bytes, LSB first. Used to feed header fields to the CRC.
pub fn bits_to_bytes_lsb(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b & 1) << i))
        })
        .collect()
}

/// Append the low `width` bits of `value`, LSB first.
pub fn push_field(bits: &mut BitStream, value: u64, width: usize) {
    for i in 0..width {
        bits.push(((value >> i) & 1) as u8);
    }
}

/// Read a `width`-bit LSB-first field starting at `pos`.
///
/// Returns `None` if the field runs past the end of `bits`.
pub fn read_field(bits: &[u8], pos: usize, width: usize) -> Option<u64> {
    let field = bits.get(pos..pos + width)?;
    Some(
        field
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (u64::from(b & 1) << i)),
    )
}

/// Count positions where two bit streams differ.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| (*x & 1) != (*y & 1)).count()
}

/// Group K single bits into one symbol index (MSB first).
#[derive(Debug, Clone)]
pub struct PackKBits {
    k: usize,
}

impl PackKBits {
    /// Create a packer for `k` bits per output value (1..=8).
    pub fn new(k: usize) -> Self {
        assert!(k > 0 && k <= 8, "K must be 1..=8");
        Self { k }
    }

    /// Pack input bits. A trailing partial group is zero-padded on the right.
    pub fn pack(&self, input: &[u8]) -> Vec<u8> {
        input
            .chunks(self.k)
            .map(|chunk| {
                let mut value = 0u8;
                for i in 0..self.k {
                    let bit = chunk.get(i).copied().unwrap_or(0) & 1;
                    value |= bit << (self.k - 1 - i);
                }
                value
            })
            .collect()
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

/// Split symbol indices back into K single bits (MSB first).
#[derive(Debug, Clone)]
pub struct UnpackKBits {
    k: usize,
}

impl UnpackKBits {
    /// Create an unpacker for `k` bits per input value (1..=8).
    pub fn new(k: usize) -> Self {
        assert!(k > 0 && k <= 8, "K must be 1..=8");
        Self { k }
    }

    pub fn unpack(&self, input: &[u8]) -> BitStream {
        let mut output = Vec::with_capacity(input.len() * self.k);
        for &value in input {
            for i in (0..self.k).rev() {
                output.push((value >> i) & 1);
            }
        }
        output
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
