//! # OFDM Link Core
//!
//! Adaptive link control for a software-defined OFDM modem. Given a channel
//! whose quality varies over time, this crate:
//!
//! - **Estimates** the receiver's SNR with exponential smoothing
//! - **Decides** the next modulation and FEC code with a ratcheted,
//!   one-step-at-a-time MCS state machine
//! - **Feeds back** the decision over a narrowband BPSK burst side channel
//! - **Frames** the byte stream into fixed-capacity radio frames, with a
//!   BPSK header carrying the scheme, sequence number and LDPC codeword
//!   alignment
//!
//! The RF front end (synchronization, OFDM, equalization) is outside the
//! crate; it hands in equalized symbols and per-frame SNR samples and takes
//! out header and payload symbols.
//!
//! ## Signal Flow
//!
//! ```text
//! Rx: header syms → HeaderCodec → Deframer → bytes
//!            SNR → SnrEstimator → DecisionEngine → FeedbackMessage → burst
//! Tx: burst → FeedbackDemodulator → queue → SharedAdaptation
//!      bytes → FrameBuffer (FEC / plain) → HeaderCodec → header + payload syms
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::prelude::*;
//!
//! let link = LinkConfig::default().validate().unwrap();
//! let (fb_tx, fb_rx) = feedback_queue(4);
//! let mut tx = TxControl::new(&link, fb_rx).unwrap();
//! let mut rx = RxControl::new(&link, FeedbackPath::Queue(fb_tx)).unwrap();
//!
//! tx.push_bytes(b"Hello OFDM!");
//! let out = tx.next_frame().unwrap().unwrap();
//! let symbols = out.payload_symbols();
//! rx.on_frame(
//!     &out.header_symbols,
//!     RxPayload::Symbols { symbols: &symbols, noise_var: None },
//!     Some(25.0),
//! )
//! .unwrap();
//! assert_eq!(rx.drain_bytes(), b"Hello OFDM!");
//! ```

pub mod access_code_detector;
pub mod additive_scrambler;
pub mod bit_packing;
pub mod burst_shaper;
pub mod config;
pub mod correlate_estimate;
pub mod costas_loop;
pub mod crc;
pub mod decision;
pub mod fec;
pub mod feedback;
pub mod frame_buffer;
pub mod frame_store;
pub mod header;
pub mod link;
pub mod mcs;
pub mod modulation;
pub mod observe;
pub mod pfb_clock_sync;
pub mod pulse_shaping;
pub mod snr_estimator;
pub mod types;

// Re-export main types
pub use config::{FecMode, FecParameters, LinkConfig, LinkParameters, ValidatedLink};
pub use decision::{AdaptationState, Decision, DecisionEngine, SharedAdaptation};
pub use feedback::{FeedbackMessage, FeedbackModemConfig};
pub use frame_buffer::{Deframer, FrameBuffer, FramePlan, RxPayload, TxFrame};
pub use header::{FrameHeader, HeaderCodec};
pub use link::{FeedbackListener, FeedbackPath, RxControl, TxControl, TxOutput};
pub use mcs::{McsEntry, McsSelection, McsTable};
pub use modulation::ModulationScheme;
pub use snr_estimator::SnrEstimator;
pub use types::{Complex, LinkError, LinkResult};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{FecMode, LinkConfig, ValidatedLink};
    pub use crate::decision::{DecisionEngine, SharedAdaptation};
    pub use crate::feedback::{feedback_queue, FeedbackMessage};
    pub use crate::frame_buffer::{FrameBuffer, RxPayload};
    pub use crate::link::{FeedbackListener, FeedbackPath, RxControl, TxControl};
    pub use crate::mcs::{McsEntry, McsSelection, McsTable};
    pub use crate::modulation::ModulationScheme;
    pub use crate::types::{Complex, LinkError, LinkResult};
}
