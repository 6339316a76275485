//! # Frame Buffers
//!
//! Turn an unbounded byte stream into fixed-capacity radio frames and back.
//!
//! ```text
//! Tx:  bytes ──► FrameBuffer ──► TxFrame { header, bits } ──► RF front end
//! Rx:  RF front end ──► (header, payload) ──► Deframer ──► bytes
//! ```
//!
//! Two strategies sit behind the same traits, chosen once when the link is
//! built:
//!
//! - [`fec`]: LDPC transport blocks packed back to back, straddling frame
//!   boundaries, with codeword id, offset and shortening in the header
//! - [`plain`]: whole payload bytes per frame, protected by a CRC-32, with
//!   an optional debug frame store
//!
//! Frame capacity is `frame_symbols × data_carriers × bits_per_symbol`.

pub mod fec;
pub mod plain;

pub use fec::{FecDeframer, FecFrameBuffer};
pub use plain::{PlainDeframer, PlainFrameBuffer};

use crate::feedback::FeedbackMessage;
use crate::header::FrameHeader;
use crate::mcs::McsSelection;
use crate::modulation::{Constellation, ModulationScheme};
use crate::types::{BitStream, Complex, LinkError, LinkResult, SoftBits};
use serde::{Deserialize, Serialize};
use tracing::info;

/// LLR magnitude given to hard-decision input
pub const HARD_DECISION_LLR: f64 = 4.0;

/// Carrier and length plan shared by every frame of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    /// Data-bearing carriers per OFDM symbol
    pub data_carriers: usize,
    /// Payload OFDM symbols per frame, 1 to 15
    pub frame_symbols: u8,
}

impl FramePlan {
    pub fn new(data_carriers: usize, frame_symbols: u8) -> Self {
        Self {
            data_carriers,
            frame_symbols,
        }
    }

    /// Payload capacity in modulation symbols.
    pub fn capacity_symbols(&self) -> usize {
        self.data_carriers * self.frame_symbols as usize
    }

    pub fn capacity_bits(&self, scheme: ModulationScheme) -> usize {
        self.capacity_symbols() * scheme.bits_per_symbol()
    }

    /// Capacity of a received frame whose header gives its length.
    pub fn capacity_bits_for(&self, header: &FrameHeader) -> usize {
        self.data_carriers * header.frame_len as usize * header.scheme.bits_per_symbol()
    }
}

/// What a transmit frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Data,
    /// Filler only, sent while the queue is empty
    Empty,
}

/// One frame ready for the RF front end.
#[derive(Debug, Clone, PartialEq)]
pub struct TxFrame {
    pub header: FrameHeader,
    /// Payload bits followed by filler, exactly the frame capacity
    pub bits: BitStream,
    pub status: FrameStatus,
}

impl TxFrame {
    /// Bits covered by `header.payload_symbols`.
    pub fn payload_bits(&self) -> &[u8] {
        let len = self.header.payload_symbols as usize * self.header.scheme.bits_per_symbol();
        &self.bits[..len.min(self.bits.len())]
    }

    /// All payload-region symbols, filler included.
    pub fn symbols(&self) -> Vec<Complex> {
        Constellation::new(self.header.scheme).map_bits(&self.bits)
    }

    /// Only the symbols covered by `header.payload_symbols`.
    pub fn payload_symbols(&self) -> Vec<Complex> {
        let mut symbols = self.symbols();
        symbols.truncate(self.header.payload_symbols as usize);
        symbols
    }
}

/// Received payload region, as delivered by the header demultiplexer.
#[derive(Debug, Clone, Copy)]
pub enum RxPayload<'a> {
    /// One hard bit per byte
    HardBits(&'a [u8]),
    /// Equalized symbols; soft bits are scaled by `noise_var` if known
    Symbols {
        symbols: &'a [Complex],
        noise_var: Option<f64>,
    },
}

impl RxPayload<'_> {
    /// Soft bits for the `payload_symbols` the header announces.
    pub fn soft_bits(&self, scheme: ModulationScheme, payload_symbols: usize) -> LinkResult<SoftBits> {
        let bps = scheme.bits_per_symbol();
        match *self {
            RxPayload::HardBits(bits) => {
                let need = payload_symbols * bps;
                if bits.len() < need {
                    return Err(LinkError::BufferTooShort {
                        expected: need,
                        actual: bits.len(),
                    });
                }
                Ok(bits[..need]
                    .iter()
                    .map(|&b| if b & 1 == 1 { -HARD_DECISION_LLR } else { HARD_DECISION_LLR })
                    .collect())
            }
            RxPayload::Symbols { symbols, noise_var } => {
                if symbols.len() < payload_symbols {
                    return Err(LinkError::BufferTooShort {
                        expected: payload_symbols,
                        actual: symbols.len(),
                    });
                }
                let mut cnst = Constellation::new(scheme);
                if let Some(nv) = noise_var {
                    cnst = cnst.with_noise_var(nv);
                }
                Ok(cnst.demap_soft(&symbols[..payload_symbols]))
            }
        }
    }
}

/// What to do with a codeword that fails its parity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Discard its bits
    #[default]
    Drop,
    /// Deliver the best-effort bits and flag them
    PassFlagged,
}

/// Result for one codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodewordReport {
    pub codeword_id: u8,
    pub converged: bool,
    pub iterations: usize,
    /// Information bits appended to the output
    pub delivered_bits: usize,
    /// True when delivered bits did not pass the parity check
    pub corrupt: bool,
}

/// Result for one received frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeframeReport {
    pub frame_no: u16,
    pub codewords: Vec<CodewordReport>,
    /// Codewords given up on (missing segments)
    pub lost_codewords: usize,
    /// Bits appended to the output
    pub delivered_bits: usize,
    /// Non-FEC payload CRC result; `None` for FEC or empty frames
    pub crc_ok: Option<bool>,
}

impl DeframeReport {
    pub fn new(frame_no: u16) -> Self {
        Self {
            frame_no,
            ..Self::default()
        }
    }

    /// Codewords that failed the parity check.
    pub fn failed_codewords(&self) -> usize {
        self.codewords.iter().filter(|c| !c.converged).count()
    }
}

/// Transmit-side strategy.
pub trait FrameBuffer: Send {
    /// Queue bytes for transmission.
    fn push_bytes(&mut self, data: &[u8]);

    /// Bits queued and not yet in a frame.
    fn pending_bits(&self) -> usize;

    /// Build the next frame for `selection`. `Ok(None)` is the starvation
    /// stop condition: the queue has been empty for the configured number
    /// of frames.
    fn next_frame(&mut self, selection: McsSelection) -> LinkResult<Option<TxFrame>>;

    /// True while the stop condition holds.
    fn is_stopped(&self) -> bool;

    /// Remote decision to echo in subsequent headers. Only layouts with
    /// echo fields carry it.
    fn set_echo(&mut self, _echo: Option<FeedbackMessage>) {}
}

/// Receive-side strategy.
pub trait Deframer: Send {
    /// Consume one frame whose header parsed correctly.
    fn process(&mut self, header: &FrameHeader, payload: RxPayload<'_>) -> LinkResult<DeframeReport>;

    /// Whole recovered bytes so far.
    fn drain_bytes(&mut self) -> Vec<u8>;
}

/// Consecutive-empty-frame counter behind the stop condition.
#[derive(Debug, Clone)]
pub struct StarvationPolicy {
    max_empty_frames: Option<u32>,
    empty_run: u32,
    stopped: bool,
}

impl StarvationPolicy {
    /// `None` never stops.
    pub fn new(max_empty_frames: Option<u32>) -> Self {
        Self {
            max_empty_frames,
            empty_run: 0,
            stopped: false,
        }
    }

    /// The queue was empty at a frame build. Returns `false` once the
    /// stop condition holds.
    pub fn on_empty(&mut self) -> bool {
        if let Some(max) = self.max_empty_frames {
            if self.empty_run >= max {
                if !self.stopped {
                    info!(empty_frames = self.empty_run, "queue starved, stopping transmission");
                    self.stopped = true;
                }
                return false;
            }
        }
        self.empty_run = self.empty_run.saturating_add(1);
        true
    }

    /// Data was available.
    pub fn on_data(&mut self) {
        self.empty_run = 0;
        self.stopped = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn empty_run(&self) -> u32 {
        self.empty_run
    }
}

/// Extends a 12-bit wrapping frame number to a monotonic 64-bit sequence.
#[derive(Debug, Clone, Default)]
pub struct SequenceUnwrapper {
    last: Option<u64>,
}

impl SequenceUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unwrap(&mut self, frame_no: u16) -> u64 {
        let modulus = crate::header::FRAME_NO_MODULUS as u64;
        let seq = match self.last {
            None => frame_no as u64 % modulus,
            Some(last) => {
                let delta = (frame_no as u64 + modulus - last % modulus) % modulus;
                last + delta
            }
        };
        self.last = Some(seq);
        seq
    }
}

/// Pack bits MSB-first into whole bytes, leaving the remainder in `bits`.
pub(crate) fn drain_whole_bytes(bits: &mut BitStream) -> Vec<u8> {
    let whole = bits.len() / 8 * 8;
    let bytes = crate::bit_packing::bits_to_bytes(&bits[..whole]);
    bits.drain(..whole);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::ModulationScheme::*;

    #[test]
    fn test_capacity() {
        let plan = FramePlan::new(48, 4);
        assert_eq!(plan.capacity_symbols(), 192);
        assert_eq!(plan.capacity_bits(Bpsk), 192);
        assert_eq!(plan.capacity_bits(Qam16), 768);
        let header = FrameHeader::new(0, 0, Psk8, 2);
        assert_eq!(plan.capacity_bits_for(&header), 288);
    }

    #[test]
    fn test_starvation_policy() {
        let mut never = StarvationPolicy::new(None);
        assert!((0..1000).all(|_| never.on_empty()));
        assert!(!never.is_stopped());

        let mut policy = StarvationPolicy::new(Some(2));
        assert!(policy.on_empty());
        assert!(policy.on_empty());
        assert!(!policy.on_empty());
        assert!(policy.is_stopped());
        assert!(!policy.on_empty());
        policy.on_data();
        assert!(!policy.is_stopped());
        assert!(policy.on_empty());
        assert_eq!(policy.empty_run(), 1);

        let mut immediate = StarvationPolicy::new(Some(0));
        assert!(!immediate.on_empty());
    }

    #[test]
    fn test_sequence_unwrap() {
        let mut seq = SequenceUnwrapper::new();
        assert_eq!(seq.unwrap(4094), 4094);
        assert_eq!(seq.unwrap(4095), 4095);
        assert_eq!(seq.unwrap(0), 4096);
        // Gap across the wrap
        assert_eq!(seq.unwrap(3), 4099);
    }

    #[test]
    fn test_hard_payload_to_llr() {
        let bits = [0u8, 1, 1, 0, 1];
        let llrs = RxPayload::HardBits(&bits).soft_bits(Qpsk, 2).unwrap();
        assert_eq!(llrs, vec![4.0, -4.0, -4.0, 4.0]);
        assert!(RxPayload::HardBits(&bits).soft_bits(Qpsk, 3).is_err());
    }

    #[test]
    fn test_symbol_payload_to_llr() {
        let cnst = Constellation::new(Psk8);
        let bits = [1u8, 0, 1, 0, 1, 1];
        let symbols = cnst.map_bits(&bits);
        let llrs = RxPayload::Symbols {
            symbols: &symbols,
            noise_var: Some(0.1),
        }
        .soft_bits(Psk8, 2)
        .unwrap();
        let hard: Vec<u8> = llrs.iter().map(|&l| crate::types::hard_bit(l)).collect();
        assert_eq!(hard, bits);
    }

    #[test]
    fn test_drain_whole_bytes() {
        let mut bits = vec![1, 0, 1, 0, 1, 0, 1, 0, 1, 1];
        assert_eq!(drain_whole_bytes(&mut bits), vec![0xAA]);
        assert_eq!(bits, vec![1, 1]);
    }
}
