//! CRC Engines
//!
//! Each framed artefact of the link carries its own checksum:
//!
//! | Artefact | CRC | Parameters |
//! |----------|-----|------------|
//! | Feedback burst payload | CRC-8 | poly 0x07, init 0xFF |
//! | Frame header fields | CRC-16/CCITT-FALSE | poly 0x1021, init 0xFFFF |
//! | Non-FEC frame payload | CRC-32 | IEEE 802.3, reflected |
//!
//! Lookup tables are built at compile time.
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::crc::{Crc32, CrcComputer};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"123456789");
//! assert_eq!(crc.finalize(), 0xCBF43926);
//! ```

const CRC8_POLY: u8 = 0x07;
const CRC16_CCITT_POLY: u16 = 0x1021;
/// 0x04C11DB7 bit-reversed
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

static CRC8_TABLE: [u8; 256] = crc8_table(CRC8_POLY);
static CRC16_TABLE: [u16; 256] = crc16_table(CRC16_CCITT_POLY);
static CRC32_TABLE: [u32; 256] = crc32_table(CRC32_POLY_REFLECTED);

const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut reg = i as u8;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 0x80 != 0 { (reg << 1) ^ poly } else { reg << 1 };
            bit += 1;
        }
        table[i] = reg;
        i += 1;
    }
    table
}

const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut reg = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 0x8000 != 0 { (reg << 1) ^ poly } else { reg << 1 };
            bit += 1;
        }
        table[i] = reg;
        i += 1;
    }
    table
}

const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut reg = i as u32;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 1 != 0 { (reg >> 1) ^ poly } else { reg >> 1 };
            bit += 1;
        }
        table[i] = reg;
        i += 1;
    }
    table
}

/// Streaming CRC register.
pub trait CrcComputer {
    type Output: Copy + PartialEq + std::fmt::LowerHex;

    fn update(&mut self, data: &[u8]);

    /// CRC of everything fed since the last reset.
    fn finalize(&self) -> Self::Output;

    fn reset(&mut self);

    /// One-shot CRC over a buffer.
    fn compute(data: &[u8]) -> Self::Output
    where
        Self: Sized + Default,
    {
        let mut crc = Self::default();
        crc.update(data);
        crc.finalize()
    }
}

/// MSB-first CRC-8, poly 0x07.
#[derive(Debug, Clone, Copy)]
pub struct Crc8 {
    init: u8,
    reg: u8,
}

impl Crc8 {
    /// Zero-initialised register.
    pub fn new() -> Self {
        Self::with_init(0x00)
    }

    /// Register preset used by feedback bursts.
    pub fn feedback() -> Self {
        Self::with_init(0xFF)
    }

    pub fn with_init(init: u8) -> Self {
        Self { init, reg: init }
    }
}

impl Default for Crc8 {
    fn default() -> Self {
        Self::new()
    }
}

impl CrcComputer for Crc8 {
    type Output = u8;

    fn update(&mut self, data: &[u8]) {
        self.reg = data
            .iter()
            .fold(self.reg, |reg, &byte| CRC8_TABLE[(reg ^ byte) as usize]);
    }

    fn finalize(&self) -> u8 {
        self.reg
    }

    fn reset(&mut self) {
        self.reg = self.init;
    }
}

/// CRC-16/CCITT-FALSE: MSB-first, poly 0x1021, init 0xFFFF, no final xor.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    reg: u16,
}

impl Crc16 {
    const INIT: u16 = 0xFFFF;

    pub fn ccitt() -> Self {
        Self { reg: Self::INIT }
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::ccitt()
    }
}

impl CrcComputer for Crc16 {
    type Output = u16;

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = (self.reg >> 8) as u8 ^ byte;
            self.reg = (self.reg << 8) ^ CRC16_TABLE[idx as usize];
        }
    }

    fn finalize(&self) -> u16 {
        self.reg
    }

    fn reset(&mut self) {
        self.reg = Self::INIT;
    }
}

/// CRC-32 (IEEE 802.3), reflected, init and final xor 0xFFFFFFFF.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    reg: u32,
}

impl Crc32 {
    const INIT: u32 = 0xFFFF_FFFF;

    pub fn new() -> Self {
        Self { reg: Self::INIT }
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl CrcComputer for Crc32 {
    type Output = u32;

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = (self.reg as u8 ^ byte) as usize;
            self.reg = (self.reg >> 8) ^ CRC32_TABLE[idx];
        }
    }

    fn finalize(&self) -> u32 {
        !self.reg
    }

    fn reset(&mut self) {
        self.reg = Self::INIT;
    }
}

/// Length of the trailer written by [`append_crc32`].
pub const CRC32_BYTES: usize = 4;

/// Append a little-endian CRC-32 to `payload`.
pub fn append_crc32(payload: &mut Vec<u8>) {
    let crc = Crc32::compute(payload);
    payload.extend_from_slice(&crc.to_le_bytes());
}

/// Check and strip a trailing little-endian CRC-32.
///
/// `None` if the buffer is shorter than the trailer or the checksum does not
/// match.
pub fn strip_crc32(buf: &[u8]) -> Option<&[u8]> {
    let split = buf.len().checked_sub(CRC32_BYTES)?;
    let (payload, tail) = buf.split_at(split);
    let mut trailer = [0u8; CRC32_BYTES];
    trailer.copy_from_slice(tail);
    (Crc32::compute(payload) == u32::from_le_bytes(trailer)).then_some(payload)
}
