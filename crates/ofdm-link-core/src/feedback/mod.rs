//! # Feedback Side Channel
//!
//! Carries the receiver's MCS decision back to the transmitter on a
//! narrowband BPSK burst link that is independent of the OFDM data path.
//!
//! - [`format`]: two-byte message, access code and CRC framing
//! - [`modem`]: RRC burst modulator and the streaming burst receiver
//! - [`queue`]: non-blocking drop-oldest hand-off to the transmit side
//!
//! Delivery is best effort. A burst that is missed or fails validation is
//! dropped without retry; the decision engine re-sends on its next change
//! (or on its refresh interval, if one is configured).

pub mod format;
pub mod modem;
pub mod queue;

pub use format::{FeedbackFramer, FeedbackMessage, DEFAULT_ACCESS_CODE, FEEDBACK_FRAME_BITS};
pub use modem::{FeedbackDemodulator, FeedbackModemConfig, FeedbackModulator, FeedbackRxStats};
pub use queue::{feedback_queue, FeedbackReceiver, FeedbackSender};
