//! LDPC transport-block framing.
//!
//! Codewords go out at their full length `n`, back to back, in the order
//! they were encoded. A codeword that does not fit the rest of a frame
//! continues in the next one; the next header names that codeword and how
//! many of its bits were already sent. When the queue runs dry mid-block the
//! block is shortened (zero-filled at its last information positions) and
//! closes its frame, whose header carries the shortening count.
//!
//! ```text
//!           frame 7                      frame 8
//! hdr{cw 3, off 0}              hdr{cw 5, off 40}
//! ┌──────────┬──────────┬─────┐ ┌────────┬──────────┬──────────┐
//! │   cw 3   │   cw 4   │ cw 5│ │ cw 5   │   cw 6   │  cw 7 …  │
//! └──────────┴──────────┴─────┘ └────────┴──────────┴──────────┘
//! ```
//!
//! A change of FEC code takes effect at the first codeword boundary: the
//! frame that completes a block of the old code ends there.

use super::{
    drain_whole_bytes, CodewordReport, DecodeFailurePolicy, DeframeReport, Deframer, FrameBuffer, FramePlan,
    FrameStatus, RxPayload, StarvationPolicy, TxFrame,
};
use crate::bit_packing::bytes_to_bits;
use crate::feedback::FeedbackMessage;
use crate::fec::{FecCodebook, LdpcCode};
use crate::header::{FecHeaderFields, FrameHeader, FRAME_NO_MODULUS, MAX_PAYLOAD_SYMBOLS};
use crate::mcs::{FecCodeId, McsSelection};
use crate::types::{BitStream, LinkError, LinkResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Largest codeword whose offset fits the 16-bit header field
const MAX_CODEWORD_BITS: usize = 1 << 16;
/// Largest block whose shortening fits the 12-bit header field
const MAX_INFO_BITS: usize = 1 << 12;

/// Encoded codeword partly or not yet sent.
#[derive(Debug)]
struct InFlight {
    id: u8,
    fec_id: FecCodeId,
    bits: BitStream,
    sent: usize,
    shortening: usize,
}

/// Checks every code in the book against the header field widths.
fn check_codebook(codebook: &FecCodebook) -> LinkResult<()> {
    if codebook.is_empty() {
        return Err(LinkError::InvalidConfig("FEC framing needs at least one code".into()));
    }
    for id in codebook.ids() {
        let code = codebook.get(id)?;
        if code.n() > MAX_CODEWORD_BITS || code.k() > MAX_INFO_BITS {
            return Err(LinkError::InvalidConfig(format!(
                "FEC code {} (n={}, k={}) exceeds the header offset/shortening fields",
                id,
                code.n(),
                code.k()
            )));
        }
    }
    Ok(())
}

fn check_plan(plan: &FramePlan) -> LinkResult<()> {
    if plan.frame_symbols == 0 || plan.frame_symbols > 15 || plan.data_carriers == 0 {
        return Err(LinkError::InvalidConfig(format!(
            "frame plan {} carriers x {} symbols",
            plan.data_carriers, plan.frame_symbols
        )));
    }
    if plan.capacity_symbols() > MAX_PAYLOAD_SYMBOLS {
        return Err(LinkError::InvalidConfig(format!(
            "{} payload symbols per frame overflow the header length field",
            plan.capacity_symbols()
        )));
    }
    Ok(())
}

// ============================================================================
// Transmit
// ============================================================================

/// Transmit-side LDPC frame builder.
#[derive(Debug)]
pub struct FecFrameBuffer {
    plan: FramePlan,
    codebook: FecCodebook,
    pending: VecDeque<u8>,
    in_flight: Option<InFlight>,
    next_codeword_id: u8,
    frame_no: u16,
    starvation: StarvationPolicy,
    echo: Option<FeedbackMessage>,
    rng: StdRng,
}

impl FecFrameBuffer {
    pub fn new(plan: FramePlan, codebook: FecCodebook, max_empty_frames: Option<u32>) -> LinkResult<Self> {
        check_plan(&plan)?;
        check_codebook(&codebook)?;
        Ok(Self {
            plan,
            codebook,
            pending: VecDeque::new(),
            in_flight: None,
            next_codeword_id: 0,
            frame_no: 0,
            starvation: StarvationPolicy::new(max_empty_frames),
            echo: None,
            rng: StdRng::from_entropy(),
        })
    }

    /// Fixed filler seed, for reproducible frames.
    pub fn with_filler_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Queue raw bits (one per byte).
    pub fn push_bits(&mut self, bits: &[u8]) {
        self.pending.extend(bits.iter().map(|b| b & 1));
        if !bits.is_empty() {
            self.starvation.on_data();
        }
    }

    pub fn plan(&self) -> FramePlan {
        self.plan
    }

    fn code(&self, fec_id: FecCodeId) -> LinkResult<Arc<LdpcCode>> {
        self.codebook.get(fec_id).cloned()
    }

    fn advance_frame_no(&mut self) -> u16 {
        let no = self.frame_no;
        self.frame_no = (self.frame_no + 1) % FRAME_NO_MODULUS;
        no
    }

    fn filler(&mut self, bits: &mut BitStream, capacity: usize) {
        while bits.len() < capacity {
            bits.push(self.rng.gen_range(0..2));
        }
    }
}

impl FrameBuffer for FecFrameBuffer {
    fn push_bytes(&mut self, data: &[u8]) {
        self.push_bits(&bytes_to_bits(data));
    }

    fn pending_bits(&self) -> usize {
        self.pending.len() + self.in_flight.as_ref().map_or(0, |f| f.bits.len() - f.sent)
    }

    fn next_frame(&mut self, selection: McsSelection) -> LinkResult<Option<TxFrame>> {
        let fec_id = selection
            .fec
            .ok_or_else(|| LinkError::InvalidConfig(format!("FEC link given uncoded selection {}", selection)))?;
        self.code(fec_id)?;
        let scheme = selection.scheme;
        let capacity = self.plan.capacity_bits(scheme);

        let (frame_fec, codeword_id, offset) = match &self.in_flight {
            Some(f) => (f.fec_id, f.id, f.sent),
            None => (fec_id, self.next_codeword_id, 0),
        };

        if self.in_flight.is_none() && self.pending.is_empty() {
            if !self.starvation.on_empty() {
                return Ok(None);
            }
            let mut bits = Vec::with_capacity(capacity);
            self.filler(&mut bits, capacity);
            let header = FrameHeader::new(self.advance_frame_no(), 0, scheme, self.plan.frame_symbols).with_fec(
                FecHeaderFields {
                    fec_id: frame_fec,
                    codeword_id,
                    offset: 0,
                    shortening: 0,
                    echo: self.echo,
                },
            );
            trace!(frame_no = header.frame_no, "empty FEC frame");
            return Ok(Some(TxFrame {
                header,
                bits,
                status: FrameStatus::Empty,
            }));
        }

        let mut bits = Vec::with_capacity(capacity);
        let mut shortening = 0;
        while bits.len() < capacity {
            if self.in_flight.is_none() {
                if self.pending.is_empty() || frame_fec != fec_id {
                    break;
                }
                let code = self.code(fec_id)?;
                let take = code.k().min(self.pending.len());
                let info: BitStream = self.pending.drain(..take).collect();
                self.in_flight = Some(InFlight {
                    id: self.next_codeword_id,
                    fec_id,
                    bits: code.encode(&info),
                    sent: 0,
                    shortening: code.k() - take,
                });
                self.next_codeword_id = self.next_codeword_id.wrapping_add(1);
            }
            let Some(cw) = self.in_flight.as_mut() else {
                break;
            };
            let count = (cw.bits.len() - cw.sent).min(capacity - bits.len());
            bits.extend_from_slice(&cw.bits[cw.sent..cw.sent + count]);
            cw.sent += count;
            if cw.sent == cw.bits.len() {
                let done = cw.shortening;
                self.in_flight = None;
                if done > 0 {
                    shortening = done;
                    break;
                }
            }
        }

        let payload_symbols = scheme.symbols_for_bits(bits.len());
        self.filler(&mut bits, capacity);
        let header = FrameHeader::new(
            self.advance_frame_no(),
            payload_symbols as u16,
            scheme,
            self.plan.frame_symbols,
        )
        .with_fec(FecHeaderFields {
            fec_id: frame_fec,
            codeword_id,
            offset: offset as u16,
            shortening: shortening as u16,
            echo: self.echo,
        });
        trace!(
            frame_no = header.frame_no,
            %scheme,
            fec_id = frame_fec,
            codeword_id,
            offset,
            shortening,
            payload_symbols,
            "built FEC frame"
        );
        Ok(Some(TxFrame {
            header,
            bits,
            status: FrameStatus::Data,
        }))
    }

    fn is_stopped(&self) -> bool {
        self.starvation.is_stopped()
    }

    fn set_echo(&mut self, echo: Option<FeedbackMessage>) {
        self.echo = echo;
    }
}

// ============================================================================
// Receive
// ============================================================================

/// Codeword whose leading segment arrived in an earlier frame.
#[derive(Debug)]
struct Assembly {
    id: u8,
    fec_id: FecCodeId,
    llrs: Vec<f64>,
}

/// Running receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeframerStats {
    pub frames: u64,
    pub codewords: u64,
    pub failed: u64,
    pub lost: u64,
}

/// Receive-side LDPC reassembly and decoding.
#[derive(Debug)]
pub struct FecDeframer {
    plan: FramePlan,
    codebook: FecCodebook,
    policy: DecodeFailurePolicy,
    assembly: Option<Assembly>,
    /// Codeword already counted lost whose tail runs into later frames
    skipping: Option<u8>,
    output: BitStream,
    stats: DeframerStats,
}

impl FecDeframer {
    pub fn new(plan: FramePlan, codebook: FecCodebook, policy: DecodeFailurePolicy) -> LinkResult<Self> {
        check_plan(&plan)?;
        check_codebook(&codebook)?;
        Ok(Self {
            plan,
            codebook,
            policy,
            assembly: None,
            skipping: None,
            output: Vec::new(),
            stats: DeframerStats::default(),
        })
    }

    pub fn stats(&self) -> DeframerStats {
        self.stats
    }

    /// Forget any partly received codeword.
    pub fn reset(&mut self) {
        self.assembly = None;
        self.skipping = None;
    }

    fn decode_into(
        &mut self,
        code: &LdpcCode,
        codeword_id: u8,
        llrs: &[f64],
        shortening: usize,
        report: &mut DeframeReport,
    ) {
        let result = code.decode(llrs, shortening);
        self.stats.codewords += 1;
        let deliver = result.converged || self.policy == DecodeFailurePolicy::PassFlagged;
        if !result.converged {
            self.stats.failed += 1;
            warn!(
                frame_no = report.frame_no,
                codeword_id,
                iterations = result.iterations,
                passed_flagged = deliver,
                "LDPC decode failed"
            );
        }
        let delivered_bits = if deliver { result.info.len() } else { 0 };
        if deliver {
            self.output.extend_from_slice(&result.info);
            report.delivered_bits += delivered_bits;
        }
        report.codewords.push(CodewordReport {
            codeword_id,
            converged: result.converged,
            iterations: result.iterations,
            delivered_bits,
            corrupt: deliver && !result.converged,
        });
    }
}

impl Deframer for FecDeframer {
    fn process(&mut self, header: &FrameHeader, payload: RxPayload<'_>) -> LinkResult<DeframeReport> {
        let fec = header
            .fec
            .ok_or_else(|| LinkError::InvalidConfig("FEC deframer given a header without FEC fields".into()))?;
        let code = self.codebook.get(fec.fec_id)?.clone();
        let n = code.n();
        let llrs = payload.soft_bits(header.scheme, header.payload_symbols as usize)?;
        let full = llrs.len() >= self.plan.capacity_bits_for(header);
        let mut report = DeframeReport::new(header.frame_no);
        self.stats.frames += 1;

        let mut pos = 0;
        let mut next_id = fec.codeword_id;
        // (codeword id, complete LLRs) in frame order
        let mut complete: Vec<(u8, Vec<f64>)> = Vec::new();

        let offset = fec.offset as usize;
        let carried = self.assembly.take();
        let skipping = self.skipping.take();
        if offset > 0 {
            let tail = n.saturating_sub(offset).min(llrs.len());
            match carried {
                Some(mut a) if a.id == fec.codeword_id && a.fec_id == fec.fec_id && a.llrs.len() == offset => {
                    a.llrs.extend_from_slice(&llrs[..tail]);
                    if a.llrs.len() == n {
                        complete.push((a.id, a.llrs));
                    } else {
                        self.assembly = Some(a);
                    }
                }
                other => {
                    // Leading segment missing: the tail here is unusable
                    if other.is_some_and(|a| a.id != fec.codeword_id) {
                        report.lost_codewords += 1;
                    }
                    if skipping != Some(fec.codeword_id) {
                        report.lost_codewords += 1;
                        debug!(
                            frame_no = header.frame_no,
                            codeword_id = fec.codeword_id,
                            offset,
                            "codeword head missing, tail skipped"
                        );
                    }
                    if offset + tail < n {
                        self.skipping = Some(fec.codeword_id);
                    }
                }
            }
            pos = tail;
            next_id = fec.codeword_id.wrapping_add(1);
        } else if let Some(a) = carried {
            // Same id at offset 0 means the carried bits were filler
            if a.id != fec.codeword_id {
                report.lost_codewords += 1;
            }
        }

        while llrs.len() - pos >= n {
            complete.push((next_id, llrs[pos..pos + n].to_vec()));
            pos += n;
            next_id = next_id.wrapping_add(1);
        }
        let leftover = llrs.len() - pos;
        if full && leftover > 0 {
            self.assembly = Some(Assembly {
                id: next_id,
                fec_id: fec.fec_id,
                llrs: llrs[pos..].to_vec(),
            });
        }

        let last = complete.len().checked_sub(1);
        for (i, (id, cw_llrs)) in complete.iter().enumerate() {
            let shortening = if Some(i) == last { fec.shortening as usize } else { 0 };
            self.decode_into(&code, *id, cw_llrs, shortening, &mut report);
        }
        self.stats.lost += report.lost_codewords as u64;
        Ok(report)
    }

    fn drain_bytes(&mut self) -> Vec<u8> {
        drain_whole_bytes(&mut self.output)
    }
}
