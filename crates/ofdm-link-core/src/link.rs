//! # Link Control
//!
//! The two halves of the adaptation loop, driven by the caller's pipeline:
//!
//! ```text
//!  receiver                                     transmitter
//!  ────────                                     ───────────
//!  header symbols ─► RxControl ─► bytes out     bytes in ─► TxControl ─► TxOutput
//!                      │ SNR ─► estimator                      ▲  │
//!                      │        ─► decision engine             │  └─ SharedAdaptation
//!                      ▼                                       │
//!               FeedbackMessage ─► burst ~~~ channel ~~~ FeedbackListener ─► queue
//! ```
//!
//! [`RxControl`] parses headers, folds per-frame SNR into the estimator,
//! runs the decision engine and emits feedback when the decision changes.
//! [`FeedbackListener`] demodulates feedback bursts into the drop-oldest
//! queue. [`TxControl`] drains that queue into the transmitter's
//! [`SharedAdaptation`] and builds frames for whatever selection is current.
//!
//! Nothing here spawns threads or blocks.

use crate::config::ValidatedLink;
use crate::decision::{Decision, DecisionEngine, SharedAdaptation};
use crate::feedback::{
    FeedbackDemodulator, FeedbackMessage, FeedbackModemConfig, FeedbackModulator, FeedbackReceiver,
    FeedbackRxStats, FeedbackSender,
};
use crate::fec::FecCodebook;
use crate::frame_buffer::{DeframeReport, Deframer, FrameBuffer, RxPayload, TxFrame};
use crate::header::{FrameHeader, HeaderCodec};
use crate::mcs::{McsSelection, McsTable};
use crate::snr_estimator::{SnrEstimator, SnrMethod};
use crate::types::{Complex, LinkError, LinkResult};
use tracing::{debug, info, warn};

// ============================================================================
// Transmit
// ============================================================================

/// A frame ready for the OFDM modulator.
#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    /// BPSK header, one symbol per header bit
    pub header_symbols: Vec<Complex>,
    pub frame: TxFrame,
}

impl TxOutput {
    /// Payload region symbols at the frame's scheme.
    pub fn payload_symbols(&self) -> Vec<Complex> {
        self.frame.symbols()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub frames: u64,
    /// Feedback messages that changed the selection
    pub feedback_applied: u64,
    /// Feedback messages naming an unknown scheme or code
    pub feedback_rejected: u64,
}

/// Transmit-side controller: far-end MCS state plus the frame buffer.
pub struct TxControl {
    feedback: FeedbackReceiver,
    shared: SharedAdaptation,
    codebook: FecCodebook,
    table: McsTable,
    coded: bool,
    header: HeaderCodec,
    buffer: Box<dyn FrameBuffer>,
    stats: TxStats,
}

impl std::fmt::Debug for TxControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxControl")
            .field("selection", &self.shared.selection())
            .field("coded", &self.coded)
            .field("pending_bits", &self.buffer.pending_bits())
            .field("stats", &self.stats)
            .finish()
    }
}

impl TxControl {
    pub fn new(link: &ValidatedLink, feedback: FeedbackReceiver) -> LinkResult<Self> {
        Ok(Self {
            feedback,
            shared: link.shared_adaptation(),
            codebook: link.codebook().clone(),
            table: link.params().mcs_table.clone(),
            coded: link.mode().is_fec(),
            header: link.header_codec().clone(),
            buffer: link.frame_buffer()?,
            stats: TxStats::default(),
        })
    }

    /// Handle on the selection used for frame builds.
    pub fn shared(&self) -> SharedAdaptation {
        self.shared.clone()
    }

    pub fn selection(&self) -> McsSelection {
        self.shared.selection()
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.push_bytes(data);
    }

    pub fn pending_bits(&self) -> usize {
        self.buffer.pending_bits()
    }

    /// Remote decision to echo in outgoing headers (coded link only).
    pub fn set_echo(&mut self, echo: Option<FeedbackMessage>) {
        self.buffer.set_echo(echo);
    }

    /// Check a feedback message against this link's codes and MCS table.
    pub fn accept(&self, msg: FeedbackMessage) -> LinkResult<McsSelection> {
        let selection = msg.selection()?;
        match selection.fec {
            None if self.coded => return Err(LinkError::UnknownFecCode(0)),
            Some(id) if !self.codebook.contains(id) => return Err(LinkError::UnknownFecCode(id)),
            _ => {}
        }
        match self.table.index_of(selection) {
            Some(_) => Ok(selection),
            None => Err(LinkError::NotInMcsTable(selection)),
        }
    }

    /// Apply every queued feedback message in order. Returns the selection
    /// if it changed.
    pub fn poll_feedback(&mut self) -> Option<McsSelection> {
        let before = self.shared.selection();
        for msg in self.feedback.drain() {
            match self.accept(msg) {
                Ok(selection) => {
                    if self.shared.publish(selection) {
                        self.stats.feedback_applied += 1;
                    }
                }
                Err(e) => {
                    self.stats.feedback_rejected += 1;
                    warn!(%msg, error = %e, "ignoring unusable feedback");
                }
            }
        }
        let after = self.shared.selection();
        if after == before {
            return None;
        }
        info!(from = %before, to = %after, "transmit MCS updated from feedback");
        Some(after)
    }

    /// Poll feedback, then build the next frame at the current selection.
    ///
    /// `Ok(None)` is the starvation stop condition.
    pub fn next_frame(&mut self) -> LinkResult<Option<TxOutput>> {
        self.poll_feedback();
        let selection = self.shared.selection();
        let Some(frame) = self.buffer.next_frame(selection)? else {
            return Ok(None);
        };
        self.stats.frames += 1;
        Ok(Some(TxOutput {
            header_symbols: self.header.format_symbols(&frame.header)?,
            frame,
        }))
    }

    pub fn is_stopped(&self) -> bool {
        self.buffer.is_stopped()
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }
}

// ============================================================================
// Feedback receive
// ============================================================================

/// Demodulates feedback bursts into the transmitter's queue.
#[derive(Debug)]
pub struct FeedbackListener {
    demod: FeedbackDemodulator,
    sink: FeedbackSender,
}

impl FeedbackListener {
    pub fn new(config: &FeedbackModemConfig, sink: FeedbackSender) -> LinkResult<Self> {
        Ok(Self {
            demod: FeedbackDemodulator::new(config)?,
            sink,
        })
    }

    /// Feed received samples; returns the number of messages queued.
    pub fn push(&mut self, samples: &[Complex]) -> usize {
        let messages = self.demod.push(samples);
        for msg in &messages {
            self.sink.send(*msg);
        }
        messages.len()
    }

    pub fn stats(&self) -> FeedbackRxStats {
        self.demod.stats()
    }
}

// ============================================================================
// Receive
// ============================================================================

/// Where receive-side decisions go.
#[derive(Debug)]
pub enum FeedbackPath {
    /// Modulate each message into a burst for the narrowband transmitter
    Burst(FeedbackModulator),
    /// Hand messages straight to an in-process transmitter
    Queue(FeedbackSender),
}

impl FeedbackPath {
    /// Burst path using the link's feedback modem settings.
    pub fn burst(link: &ValidatedLink) -> LinkResult<Self> {
        Ok(FeedbackPath::Burst(FeedbackModulator::new(&link.feedback().modem)?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub frames: u64,
    /// Frames dropped because the header failed to parse
    pub header_drops: u64,
    pub feedback_sent: u64,
    /// Echoed remote decisions forwarded from headers
    pub echoes: u64,
}

/// Outcome of one received frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RxFrameReport {
    pub header: FrameHeader,
    pub deframe: DeframeReport,
    /// SNR sample folded in for this frame, if any
    pub snr_db: Option<f64>,
    pub decision: Option<Decision>,
}

/// Receive-side controller: header parsing, deframing and the decision loop.
pub struct RxControl {
    estimator: SnrEstimator,
    engine: DecisionEngine,
    snr_method: SnrMethod,
    header: HeaderCodec,
    deframer: Box<dyn Deframer>,
    path: FeedbackPath,
    bursts: Vec<Vec<Complex>>,
    echo_sink: Option<FeedbackSender>,
    stats: RxStats,
}

impl std::fmt::Debug for RxControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxControl")
            .field("estimate", &self.estimator.estimate())
            .field("state", self.engine.state())
            .field("stats", &self.stats)
            .finish()
    }
}

impl RxControl {
    pub fn new(link: &ValidatedLink, path: FeedbackPath) -> LinkResult<Self> {
        Ok(Self {
            estimator: link.snr_estimator(),
            engine: link.decision_engine()?,
            snr_method: SnrMethod::default(),
            header: link.header_codec().clone(),
            deframer: link.deframer()?,
            path,
            bursts: Vec::new(),
            echo_sink: None,
            stats: RxStats::default(),
        })
    }

    /// Forward echoed remote decisions found in headers to `sink`.
    pub fn with_echo_sink(mut self, sink: FeedbackSender) -> Self {
        self.echo_sink = Some(sink);
        self
    }

    /// Method used when a frame arrives without an SNR sample.
    pub fn with_snr_method(mut self, method: SnrMethod) -> Self {
        self.snr_method = method;
        self
    }

    /// Mirror committed decisions into a local selection slot.
    pub fn with_shared(mut self, shared: SharedAdaptation) -> Self {
        self.engine = self.engine.with_shared(shared);
        self
    }

    /// Fold one SNR sample in and run one decision step.
    pub fn on_snr(&mut self, measurement_db: f64) -> Decision {
        let estimate = self.estimator.update(measurement_db);
        let decision = self.engine.decide(estimate);
        if let Some(msg) = decision.feedback {
            self.emit(msg);
        }
        decision
    }

    /// Process one received frame.
    ///
    /// A header that fails its CRC or names an unknown scheme drops the
    /// whole frame and returns `Ok(None)`. When `snr_db` is `None` and the
    /// payload is given as symbols, the SNR is measured from them. The frame
    /// is deframed before anything else happens, so an `Err` leaves the
    /// estimator, the decision engine and the echo sink untouched.
    pub fn on_frame(
        &mut self,
        header_symbols: &[Complex],
        payload: RxPayload<'_>,
        snr_db: Option<f64>,
    ) -> LinkResult<Option<RxFrameReport>> {
        let header = match self.header.parse_symbols(header_symbols) {
            Ok(header) => header,
            Err(e @ (LinkError::HeaderCrc | LinkError::UnknownScheme(_))) => {
                self.stats.header_drops += 1;
                debug!(error = %e, drops = self.stats.header_drops, "header rejected, frame dropped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let deframe = self.deframer.process(&header, payload)?;
        self.stats.frames += 1;

        if let Some(echo) = header.fec.and_then(|f| f.echo) {
            if let Some(sink) = &self.echo_sink {
                sink.send(echo);
                self.stats.echoes += 1;
            }
        }

        let snr_db = snr_db.or_else(|| match payload {
            RxPayload::Symbols { symbols, .. } => self.snr_method.measure(symbols, header.scheme),
            RxPayload::HardBits(_) => None,
        });
        let decision = snr_db.map(|snr| self.on_snr(snr));

        Ok(Some(RxFrameReport {
            header,
            deframe,
            snr_db,
            decision,
        }))
    }

    /// Whole recovered bytes so far.
    pub fn drain_bytes(&mut self) -> Vec<u8> {
        self.deframer.drain_bytes()
    }

    /// Feedback bursts produced since the last call (burst path only).
    pub fn take_bursts(&mut self) -> Vec<Vec<Complex>> {
        std::mem::take(&mut self.bursts)
    }

    pub fn selection(&self) -> McsSelection {
        self.engine.selection()
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimator.estimate()
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    fn emit(&mut self, msg: FeedbackMessage) {
        match &self.path {
            FeedbackPath::Burst(modulator) => self.bursts.push(modulator.modulate(&msg)),
            FeedbackPath::Queue(sender) => {
                sender.send(msg);
            }
        }
        self.stats.feedback_sent += 1;
    }
}
