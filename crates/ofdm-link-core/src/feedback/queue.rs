//! Bounded drop-oldest queue between the feedback receiver and the
//! transmit-side controller.
//!
//! The producer never blocks: when the queue is full the oldest pending
//! message is discarded to make room. Only the newest decisions matter, so
//! losing stale ones is harmless.
//!
//! ```rust
//! use ofdm_link_core::feedback::{feedback_queue, FeedbackMessage};
//!
//! let (tx, rx) = feedback_queue(2);
//! tx.send(FeedbackMessage::new(0, 0));
//! tx.send(FeedbackMessage::new(1, 0));
//! tx.send(FeedbackMessage::new(2, 0)); // evicts (0, 0)
//! assert_eq!(rx.drain(), vec![FeedbackMessage::new(1, 0), FeedbackMessage::new(2, 0)]);
//! assert_eq!(tx.dropped(), 1);
//! ```

use super::format::FeedbackMessage;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Producer half.
#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: Sender<FeedbackMessage>,
    /// Used only to evict the oldest entry when full
    evict: Receiver<FeedbackMessage>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half.
#[derive(Debug)]
pub struct FeedbackReceiver {
    rx: Receiver<FeedbackMessage>,
}

/// Create a queue holding at most `capacity` messages (minimum 1).
pub fn feedback_queue(capacity: usize) -> (FeedbackSender, FeedbackReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        FeedbackSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        FeedbackReceiver { rx },
    )
}

impl FeedbackSender {
    /// Enqueue `msg`, evicting the oldest pending message if the queue is
    /// full. Returns `true` if a message was evicted.
    pub fn send(&self, msg: FeedbackMessage) -> bool {
        let mut pending = msg;
        let mut evicted = false;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    if let Ok(old) = self.evict.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                        trace!(%old, "feedback queue full, oldest dropped");
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Messages evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FeedbackReceiver {
    /// Next message, if any.
    pub fn try_recv(&self) -> Option<FeedbackMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// All pending messages, oldest first.
    pub fn drain(&self) -> Vec<FeedbackMessage> {
        self.rx.try_iter().collect()
    }

    /// Newest pending message, discarding the rest.
    pub fn latest(&self) -> Option<FeedbackMessage> {
        self.rx.try_iter().last()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
