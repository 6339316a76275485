//! # Frame Header Codec
//!
//! One fixed-length header per frame, always BPSK, so the receiver can read
//! it whatever scheme the payload uses. Fields are written LSB-first in a
//! fixed order and protected by a CRC-16/CCITT-FALSE computed over the
//! field bits packed into bytes.
//!
//! ```text
//! base (48 bits)
//! ┌──────────────┬──────────────┬────────┬───────────┬────────┐
//! │ payload syms │ frame number │ scheme │ frame len │ CRC16  │
//! │     12       │      12      │   4    │     4     │   16   │
//! └──────────────┴──────────────┴────────┴───────────┴────────┘
//!
//! with FEC (96 bits), inserted before the CRC
//! ┌────────┬─────────┬──────────┬────────────┬─────────────┬──────────┐
//! │ fec id │ cw id   │ offset   │ shortening │ echo scheme │ echo fec │
//! │   4    │   8     │   16     │    12      │      4      │    4     │
//! └────────┴─────────┴──────────┴────────────┴─────────────┴──────────┘
//! ```
//!
//! The header occupies `header_carriers × header_symbols` BPSK symbols (one
//! OFDM symbol without FEC, two with); bits past the layout are zero. The
//! whole block is optionally XORed with the fixed-seed header scrambler.
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::header::{FrameHeader, HeaderCodec};
//! use ofdm_link_core::modulation::ModulationScheme;
//!
//! let codec = HeaderCodec::new(48, false, true).unwrap();
//! let header = FrameHeader::new(7, 96, ModulationScheme::Qpsk, 4);
//! let symbols = codec.format_symbols(&header).unwrap();
//! assert_eq!(symbols.len(), 48);
//! assert_eq!(codec.parse_symbols(&symbols).unwrap(), header);
//! ```

use crate::additive_scrambler::AdditiveScrambler;
use crate::bit_packing::{bits_to_bytes_lsb, push_field, read_field};
use crate::crc::{Crc16, CrcComputer};
use crate::feedback::FeedbackMessage;
use crate::mcs::FecCodeId;
use crate::modulation::ModulationScheme;
use crate::types::{hard_bit, BitStream, Complex, LinkError, LinkResult};

pub const PAYLOAD_SYMBOLS_BITS: usize = 12;
pub const FRAME_NO_BITS: usize = 12;
pub const SCHEME_BITS: usize = 4;
pub const FRAME_LEN_BITS: usize = 4;
pub const FEC_ID_BITS: usize = 4;
pub const CODEWORD_ID_BITS: usize = 8;
pub const OFFSET_BITS: usize = 16;
pub const SHORTENING_BITS: usize = 12;
pub const ECHO_SCHEME_BITS: usize = 4;
pub const ECHO_FEC_BITS: usize = 4;
pub const CRC_BITS: usize = 16;

/// Sequence numbers wrap at this modulus
pub const FRAME_NO_MODULUS: u16 = 1 << FRAME_NO_BITS;

/// Largest payload length the header can describe, in symbols
pub const MAX_PAYLOAD_SYMBOLS: usize = (1 << PAYLOAD_SYMBOLS_BITS) - 1;

/// Echo scheme value meaning "no echo"
const ECHO_NONE: u64 = 15;

const BASE_FIELD_BITS: usize = PAYLOAD_SYMBOLS_BITS + FRAME_NO_BITS + SCHEME_BITS + FRAME_LEN_BITS;
const FEC_FIELD_BITS: usize = FEC_ID_BITS
    + CODEWORD_ID_BITS
    + OFFSET_BITS
    + SHORTENING_BITS
    + ECHO_SCHEME_BITS
    + ECHO_FEC_BITS;

/// Transport-block bookkeeping carried when FEC is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FecHeaderFields {
    pub fec_id: FecCodeId,
    /// Codeword whose bits begin this frame's payload (wraps at 256)
    pub codeword_id: u8,
    /// Bits of that codeword already sent in earlier frames
    pub offset: u16,
    /// Zero-fill bits in the last codeword completed in this frame
    pub shortening: u16,
    /// Last-known remote decision, riding on data frames
    pub echo: Option<FeedbackMessage>,
}

/// Per-frame metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sequence number modulo 4096
    pub frame_no: u16,
    /// `ceil(payload bits / bits per symbol)`
    pub payload_symbols: u16,
    pub scheme: ModulationScheme,
    /// Frame length in OFDM symbols
    pub frame_len: u8,
    pub fec: Option<FecHeaderFields>,
}

impl FrameHeader {
    pub fn new(frame_no: u16, payload_symbols: u16, scheme: ModulationScheme, frame_len: u8) -> Self {
        Self {
            frame_no,
            payload_symbols,
            scheme,
            frame_len,
            fec: None,
        }
    }

    pub fn with_fec(mut self, fec: FecHeaderFields) -> Self {
        self.fec = Some(fec);
        self
    }
}

/// Builds and parses headers for one carrier plan.
#[derive(Debug, Clone)]
pub struct HeaderCodec {
    header_carriers: usize,
    fec_enabled: bool,
    scrambler: AdditiveScrambler,
}

impl HeaderCodec {
    /// Codec for `header_carriers` BPSK carriers per header symbol.
    ///
    /// Fails if the field layout does not fit the header capacity.
    pub fn new(header_carriers: usize, fec_enabled: bool, scramble: bool) -> LinkResult<Self> {
        let codec = Self {
            header_carriers,
            fec_enabled,
            scrambler: if scramble {
                AdditiveScrambler::header()
            } else {
                AdditiveScrambler::identity()
            },
        };
        if codec.layout_bits() > codec.header_len() {
            return Err(LinkError::HeaderCapacity {
                required: codec.layout_bits(),
                available: codec.header_len(),
            });
        }
        Ok(codec)
    }

    /// OFDM symbols occupied by the header.
    pub fn header_symbols(&self) -> usize {
        if self.fec_enabled {
            2
        } else {
            1
        }
    }

    /// Header length in BPSK symbols (= bits).
    pub fn header_len(&self) -> usize {
        self.header_carriers * self.header_symbols()
    }

    /// Bits used by fields and CRC.
    pub fn layout_bits(&self) -> usize {
        let fields = if self.fec_enabled {
            BASE_FIELD_BITS + FEC_FIELD_BITS
        } else {
            BASE_FIELD_BITS
        };
        fields + CRC_BITS
    }

    pub fn fec_enabled(&self) -> bool {
        self.fec_enabled
    }

    pub fn scrambled(&self) -> bool {
        !self.scrambler.is_identity()
    }

    /// Header as `header_len()` bits, scrambled if enabled.
    pub fn format_bits(&self, header: &FrameHeader) -> LinkResult<BitStream> {
        let mut bits = Vec::with_capacity(self.header_len());
        put(&mut bits, "payload_symbols", header.payload_symbols as u64, PAYLOAD_SYMBOLS_BITS)?;
        put(&mut bits, "frame_no", header.frame_no as u64, FRAME_NO_BITS)?;
        put(&mut bits, "scheme", header.scheme.id() as u64, SCHEME_BITS)?;
        put(&mut bits, "frame_len", header.frame_len as u64, FRAME_LEN_BITS)?;

        match (self.fec_enabled, &header.fec) {
            (true, Some(fec)) => {
                put(&mut bits, "fec_id", fec.fec_id as u64, FEC_ID_BITS)?;
                put(&mut bits, "codeword_id", fec.codeword_id as u64, CODEWORD_ID_BITS)?;
                put(&mut bits, "offset", fec.offset as u64, OFFSET_BITS)?;
                put(&mut bits, "shortening", fec.shortening as u64, SHORTENING_BITS)?;
                let (echo_scheme, echo_fec) = match fec.echo {
                    Some(m) if (m.scheme_id as u64) < ECHO_NONE => (m.scheme_id as u64, m.fec_id as u64),
                    Some(m) => {
                        return Err(LinkError::HeaderFieldOverflow {
                            field: "echo_scheme",
                            value: m.scheme_id as u64,
                            bits: ECHO_SCHEME_BITS,
                        })
                    }
                    None => (ECHO_NONE, 0),
                };
                put(&mut bits, "echo_scheme", echo_scheme, ECHO_SCHEME_BITS)?;
                put(&mut bits, "echo_fec", echo_fec, ECHO_FEC_BITS)?;
            }
            (false, None) => {}
            (true, None) => {
                return Err(LinkError::InvalidConfig(
                    "FEC header codec needs transport-block fields".into(),
                ))
            }
            (false, Some(_)) => {
                return Err(LinkError::InvalidConfig(
                    "header carries FEC fields but the codec has FEC disabled".into(),
                ))
            }
        }

        let crc = header_crc(&bits);
        push_field(&mut bits, crc as u64, CRC_BITS);
        bits.resize(self.header_len(), 0);

        let mut scrambler = self.scrambler.clone();
        scrambler.reset();
        scrambler.process_inplace(&mut bits);
        Ok(bits)
    }

    /// Parse `header_len()` hard bits.
    pub fn parse_bits(&self, bits: &[u8]) -> LinkResult<FrameHeader> {
        if bits.len() < self.header_len() {
            return Err(LinkError::BufferTooShort {
                expected: self.header_len(),
                actual: bits.len(),
            });
        }
        let mut scrambler = self.scrambler.clone();
        scrambler.reset();
        let bits = scrambler.process(&bits[..self.layout_bits()]);

        let field_bits = self.layout_bits() - CRC_BITS;
        let received_crc = read_field(&bits, field_bits, CRC_BITS).unwrap_or_default() as u16;
        if header_crc(&bits[..field_bits]) != received_crc {
            return Err(LinkError::HeaderCrc);
        }

        let mut reader = FieldReader::new(&bits);
        let payload_symbols = reader.take(PAYLOAD_SYMBOLS_BITS) as u16;
        let frame_no = reader.take(FRAME_NO_BITS) as u16;
        let scheme = ModulationScheme::from_id(reader.take(SCHEME_BITS) as u8)?;
        let frame_len = reader.take(FRAME_LEN_BITS) as u8;

        let fec = if self.fec_enabled {
            let fec_id = reader.take(FEC_ID_BITS) as u8;
            let codeword_id = reader.take(CODEWORD_ID_BITS) as u8;
            let offset = reader.take(OFFSET_BITS) as u16;
            let shortening = reader.take(SHORTENING_BITS) as u16;
            let echo_scheme = reader.take(ECHO_SCHEME_BITS);
            let echo_fec = reader.take(ECHO_FEC_BITS) as u8;
            let echo = (echo_scheme != ECHO_NONE)
                .then(|| FeedbackMessage::new(echo_scheme as u8, echo_fec));
            Some(FecHeaderFields {
                fec_id,
                codeword_id,
                offset,
                shortening,
                echo,
            })
        } else {
            None
        };

        Ok(FrameHeader {
            frame_no,
            payload_symbols,
            scheme,
            frame_len,
            fec,
        })
    }

    /// Header as BPSK symbols (`0 → +1`, `1 → -1`).
    pub fn format_symbols(&self, header: &FrameHeader) -> LinkResult<Vec<Complex>> {
        Ok(self
            .format_bits(header)?
            .into_iter()
            .map(|b| Complex::new(1.0 - 2.0 * b as f64, 0.0))
            .collect())
    }

    /// Parse equalized BPSK header symbols.
    pub fn parse_symbols(&self, symbols: &[Complex]) -> LinkResult<FrameHeader> {
        let bits: Vec<u8> = symbols.iter().map(|s| hard_bit(s.re)).collect();
        self.parse_bits(&bits)
    }
}

fn put(bits: &mut BitStream, field: &'static str, value: u64, width: usize) -> LinkResult<()> {
    if value >> width != 0 {
        return Err(LinkError::HeaderFieldOverflow {
            field,
            value,
            bits: width,
        });
    }
    push_field(bits, value, width);
    Ok(())
}

fn header_crc(field_bits: &[u8]) -> u16 {
    let mut crc = Crc16::ccitt();
    crc.update(&bits_to_bytes_lsb(field_bits));
    crc.finalize()
}

/// Sequential LSB-first field reader over a buffer already known to be
/// long enough.
struct FieldReader<'a> {
    bits: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bits: &'a [u8]) -> Self {
        Self { bits, pos: 0 }
    }

    fn take(&mut self, width: usize) -> u64 {
        let v = read_field(self.bits, self.pos, width).unwrap_or_default();
        self.pos += width;
        v
    }
}
