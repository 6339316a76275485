//! Feedback frame format.
//!
//! ```text
//! ┌──────────────────────────┬───────────┬─────────┬──────┐
//! │ access code (64 bits)    │ scheme id │ FEC id  │ CRC8 │
//! └──────────────────────────┴───────────┴─────────┴──────┘
//! ```
//!
//! All fields go out MSB-first. The CRC covers the two payload bytes.

use crate::access_code_detector::AccessCodeDetector;
use crate::bit_packing::{bits_to_bytes, bytes_to_bits};
use crate::crc::{CrcComputer, Crc8};
use crate::mcs::McsSelection;
use crate::modulation::ModulationScheme;
use crate::types::LinkResult;
use serde::{Deserialize, Serialize};

/// Default 64-bit access code
pub const DEFAULT_ACCESS_CODE: u64 = 0xACDD_A4E2_F28C_20FC;

/// Access code length in bits
pub const ACCESS_CODE_BITS: usize = 64;

/// Payload bytes after the access code (scheme, FEC, CRC)
pub const FEEDBACK_BODY_BYTES: usize = 3;

/// Total bits in one feedback frame
pub const FEEDBACK_FRAME_BITS: usize = ACCESS_CODE_BITS + 8 * FEEDBACK_BODY_BYTES;

/// Decision carried back to the transmitter: two bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub scheme_id: u8,
    /// 0 means no FEC
    pub fec_id: u8,
}

impl FeedbackMessage {
    pub fn new(scheme_id: u8, fec_id: u8) -> Self {
        Self { scheme_id, fec_id }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        [self.scheme_id, self.fec_id]
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self::new(bytes[0], bytes[1])
    }

    /// Interpret the ids. Fails on an unknown scheme id; the FEC id is
    /// checked against a codebook by the caller.
    pub fn selection(self) -> LinkResult<McsSelection> {
        let scheme = ModulationScheme::from_id(self.scheme_id)?;
        let fec = (self.fec_id != 0).then_some(self.fec_id);
        Ok(McsSelection::new(scheme, fec))
    }
}

impl From<McsSelection> for FeedbackMessage {
    fn from(sel: McsSelection) -> Self {
        Self::new(sel.scheme.id(), sel.fec_wire_id())
    }
}

impl std::fmt::Display for FeedbackMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scheme={} fec={}", self.scheme_id, self.fec_id)
    }
}

/// Builds and validates feedback frames at the bit level.
#[derive(Debug, Clone)]
pub struct FeedbackFramer {
    access: AccessCodeDetector,
}

impl FeedbackFramer {
    /// Framer for a 64-bit `access_code`, accepting up to `threshold` bit
    /// errors in it on receive.
    pub fn new(access_code: u64, threshold: u32) -> LinkResult<Self> {
        Ok(Self {
            access: AccessCodeDetector::new(access_code, ACCESS_CODE_BITS, threshold)?,
        })
    }

    /// Unpacked access code bits.
    pub fn access_bits(&self) -> Vec<u8> {
        self.access.bits()
    }

    /// Full frame as unpacked bits.
    pub fn frame(&self, msg: &FeedbackMessage) -> Vec<u8> {
        let payload = msg.to_bytes();
        let crc = payload_crc(&payload);
        let mut bits = self.access.bits();
        bits.extend(bytes_to_bits(&[payload[0], payload[1], crc]));
        bits
    }

    /// Parse a frame aligned at `bits[0]`. `None` when the access code is
    /// too far off, the frame is short, or the CRC fails.
    pub fn parse(&self, bits: &[u8]) -> Option<FeedbackMessage> {
        if bits.len() < FEEDBACK_FRAME_BITS || !self.access.matches_prefix(bits) {
            return None;
        }
        let body = bits_to_bytes(&bits[ACCESS_CODE_BITS..FEEDBACK_FRAME_BITS]);
        let payload = [body[0], body[1]];
        if payload_crc(&payload) != body[2] {
            return None;
        }
        Some(FeedbackMessage::from_bytes(payload))
    }

    /// Scan an unaligned bit stream for frames.
    pub fn scan(&self, bits: &[u8]) -> Vec<FeedbackMessage> {
        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(hit) = self.access.find(&bits[pos..]) {
            let start = pos + hit.end - ACCESS_CODE_BITS;
            match self.parse(&bits[start..]) {
                Some(msg) => {
                    found.push(msg);
                    pos = start + FEEDBACK_FRAME_BITS;
                }
                None => pos = start + 1,
            }
            if pos >= bits.len() {
                break;
            }
        }
        found
    }
}

impl Default for FeedbackFramer {
    fn default() -> Self {
        Self {
            access: AccessCodeDetector::from_u64(DEFAULT_ACCESS_CODE, 0),
        }
    }
}

fn payload_crc(payload: &[u8; 2]) -> u8 {
    let mut crc = Crc8::feedback();
    crc.update(payload);
    crc.finalize()
}
