//! Narrowband BPSK burst modem for feedback frames.
//!
//! ```text
//! Tx: message ─► framer ─► BPSK ─► RRC ─► edge ramps + guard ─► burst
//!
//! Rx: samples ─► matched filter ─► access-code correlator ─┐
//!        ┌─────────────────────────────────────────────────┘
//!        └─► gain normalise ─► PFB clock sync ─► Costas ─► slicer ─► parser
//! ```
//!
//! The receiver is streaming: [`FeedbackDemodulator::push`] accepts sample
//! blocks of any size, keeps the unfinished tail of a burst for the next
//! call, and returns every message decoded so far. Bursts that fail the
//! access-code or CRC check are dropped and counted.

use super::format::{FeedbackFramer, FeedbackMessage, DEFAULT_ACCESS_CODE, FEEDBACK_FRAME_BITS};
use crate::burst_shaper::{BurstShaper, WindowShape};
use crate::correlate_estimate::CorrelateEstimator;
use crate::costas_loop::{CostasConfig, CostasLoop};
use crate::pfb_clock_sync::PfbClockSync;
use crate::pulse_shaping::RootRaisedCosine;
use crate::types::{hard_bit, Complex, LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, trace};

/// Feedback modem parameters, shared by both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackModemConfig {
    pub samples_per_symbol: usize,
    /// RRC excess bandwidth
    pub rolloff: f64,
    /// RRC span in symbols
    pub span_symbols: usize,
    /// Polyphase arms in the clock synchronizer
    pub nfilts: usize,
    pub clock_loop_bw: f64,
    pub costas_loop_bw: f64,
    /// Edge taper length in samples
    pub ramp_len: usize,
    /// Silent samples before and after each burst
    pub guard_samples: usize,
    pub access_code: u64,
    /// Bit errors tolerated in the received access code
    pub access_code_threshold: u32,
    /// Normalized correlation needed to declare a burst
    pub detection_threshold: f64,
}

impl Default for FeedbackModemConfig {
    fn default() -> Self {
        Self {
            samples_per_symbol: 2,
            rolloff: 0.35,
            span_symbols: 11,
            nfilts: 32,
            clock_loop_bw: 2.0 * PI / 400.0,
            costas_loop_bw: 2.0 * PI / 200.0,
            ramp_len: 10,
            guard_samples: 16,
            access_code: DEFAULT_ACCESS_CODE,
            access_code_threshold: 0,
            detection_threshold: 0.8,
        }
    }
}

impl FeedbackModemConfig {
    pub fn validate(&self) -> LinkResult<()> {
        if self.samples_per_symbol < 2 {
            return Err(LinkError::InvalidConfig(
                "feedback modem needs at least 2 samples per symbol".into(),
            ));
        }
        if !(self.rolloff > 0.0 && self.rolloff <= 1.0) {
            return Err(LinkError::InvalidConfig(format!(
                "RRC rolloff {} outside (0, 1]",
                self.rolloff
            )));
        }
        if self.span_symbols == 0 || self.nfilts == 0 {
            return Err(LinkError::InvalidConfig(
                "RRC span and filterbank size must be non-zero".into(),
            ));
        }
        if self.access_code_threshold > 12 {
            return Err(LinkError::InvalidConfig(format!(
                "access code threshold {} above 12",
                self.access_code_threshold
            )));
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold <= 1.0) {
            return Err(LinkError::InvalidConfig(format!(
                "detection threshold {} outside (0, 1]",
                self.detection_threshold
            )));
        }
        Ok(())
    }

    fn pulse(&self) -> RootRaisedCosine {
        RootRaisedCosine::new(self.rolloff, self.span_symbols, self.samples_per_symbol)
    }
}

/// Turns feedback messages into shaped complex bursts.
#[derive(Debug, Clone)]
pub struct FeedbackModulator {
    framer: FeedbackFramer,
    rrc: RootRaisedCosine,
    shaper: BurstShaper,
}

impl FeedbackModulator {
    pub fn new(config: &FeedbackModemConfig) -> LinkResult<Self> {
        config.validate()?;
        Ok(Self {
            framer: FeedbackFramer::new(config.access_code, config.access_code_threshold)?,
            rrc: config.pulse(),
            shaper: BurstShaper::new(WindowShape::Hann, config.ramp_len)
                .with_padding(config.guard_samples, config.guard_samples),
        })
    }

    pub fn modulate(&self, msg: &FeedbackMessage) -> Vec<Complex> {
        let symbols: Vec<Complex> = self
            .framer
            .frame(msg)
            .into_iter()
            .map(|b| Complex::new(1.0 - 2.0 * b as f64, 0.0))
            .collect();
        let burst = self.shaper.shape(&self.rrc.modulate(&symbols));
        trace!(%msg, samples = burst.len(), "feedback burst modulated");
        burst
    }

    /// Samples in every burst, guards included.
    pub fn burst_len(&self) -> usize {
        let body = (FEEDBACK_FRAME_BITS - 1) * self.rrc.sps() + self.rrc.len();
        self.shaper.output_len(body)
    }
}

/// Counters kept by the demodulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackRxStats {
    /// Correlation peaks found
    pub detected: u64,
    /// Messages passing access-code and CRC checks
    pub decoded: u64,
    /// Peaks whose frame failed validation
    pub dropped: u64,
}

/// Streaming feedback burst receiver.
#[derive(Debug, Clone)]
pub struct FeedbackDemodulator {
    framer: FeedbackFramer,
    rrc: RootRaisedCosine,
    correlator: CorrelateEstimator,
    clock_sync: PfbClockSync,
    costas: CostasConfig,
    buffer: Vec<Complex>,
    /// Next correlator start index within `buffer`
    cursor: usize,
    stats: FeedbackRxStats,
}

impl FeedbackDemodulator {
    pub fn new(config: &FeedbackModemConfig) -> LinkResult<Self> {
        config.validate()?;
        let framer = FeedbackFramer::new(config.access_code, config.access_code_threshold)?;
        let rrc = config.pulse();
        let reference = framer
            .access_bits()
            .into_iter()
            .map(|b| 1.0 - 2.0 * b as f64)
            .collect();
        Ok(Self {
            correlator: CorrelateEstimator::new(
                reference,
                config.samples_per_symbol,
                config.detection_threshold,
            ),
            clock_sync: PfbClockSync::new(&rrc, config.nfilts, config.clock_loop_bw),
            costas: CostasConfig::bpsk(config.costas_loop_bw),
            framer,
            rrc,
            buffer: Vec::new(),
            cursor: 0,
            stats: FeedbackRxStats::default(),
        })
    }

    /// Samples needed after a correlation peak to demodulate a whole frame.
    fn tail_needed(&self) -> usize {
        let sps = self.rrc.sps();
        (FEEDBACK_FRAME_BITS - 1) * sps + self.rrc.half_len() + 2 * sps + 1
    }

    /// Feed a block of samples; returns the messages completed by it.
    pub fn push(&mut self, samples: &[Complex]) -> Vec<FeedbackMessage> {
        self.buffer.extend_from_slice(samples);
        let found = self.scan();
        self.compact();
        found
    }

    /// Decode every burst in a finished capture, treating the end of
    /// `samples` as silence. Streaming state is left untouched.
    pub fn demodulate(&self, samples: &[Complex]) -> Vec<FeedbackMessage> {
        let mut oneshot = self.clone();
        oneshot.reset();
        let mut padded = samples.to_vec();
        padded.resize(samples.len() + self.tail_needed(), Complex::new(0.0, 0.0));
        oneshot.push(&padded)
    }

    fn scan(&mut self) -> Vec<FeedbackMessage> {
        let half = self.rrc.half_len();
        let matched = self.rrc.matched_filter(&self.buffer);
        // The last `half` outputs still wait on future input
        let settled = &matched[..matched.len().saturating_sub(half)];
        let mut found = Vec::new();

        loop {
            let Some(peak) = self.correlator.find(settled, self.cursor) else {
                let searched = settled.len().saturating_sub(self.correlator.span() - 1);
                self.cursor = self.cursor.max(searched);
                break;
            };
            if peak.index + self.tail_needed() > self.buffer.len() {
                self.cursor = peak.index;
                break;
            }
            self.stats.detected += 1;

            let symbols =
                self.clock_sync
                    .recover(&self.buffer, peak.index, peak.gain, FEEDBACK_FRAME_BITS);
            let mut costas = CostasLoop::new(self.costas.clone());
            let bits: Vec<u8> = symbols
                .iter()
                .map(|&s| hard_bit(costas.process_sample(s).re))
                .collect();

            match self.framer.parse(&bits) {
                Some(msg) => {
                    self.stats.decoded += 1;
                    debug!(%msg, index = peak.index, score = peak.score, "feedback decoded");
                    found.push(msg);
                }
                None => {
                    self.stats.dropped += 1;
                    debug!(index = peak.index, score = peak.score, "feedback burst dropped");
                }
            }
            self.cursor = peak.index + FEEDBACK_FRAME_BITS * self.rrc.sps();
        }
        found
    }

    /// Discard samples the receiver will never look at again, keeping
    /// enough history for the matched filter.
    fn compact(&mut self) {
        let cut = self.cursor.saturating_sub(self.rrc.half_len()).min(self.buffer.len());
        if cut > 0 {
            self.buffer.drain(..cut);
            self.cursor -= cut;
        }
    }

    pub fn stats(&self) -> FeedbackRxStats {
        self.stats
    }

    /// Samples held for the next call.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.stats = FeedbackRxStats::default();
    }
}
