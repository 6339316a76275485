//! # MCS Decision Engine
//!
//! Ratcheted, step-limited rate adaptation. Every SNR estimate is looked up
//! in the [`McsTable`]; when the target differs from the active entry the
//! engine counts how many consecutive observations point the same way, and
//! only after more than `confirm_window` of them does it move the active
//! entry one index toward the target. A large SNR jump therefore climbs the
//! table one confirmed step at a time.
//!
//! ```text
//!   SNR estimate ──► table.lookup ──► target
//!                                        │
//!              target == current ────────┤──► count = 0
//!                                        │
//!              else: count += 1; count > window ──► current ± 1, count = 0
//! ```
//!
//! The active selection is published through [`SharedAdaptation`], an
//! atomically swapped immutable snapshot, so the transmit-side frame builder
//! never observes a half-updated `(scheme, fec)` pair.
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::decision::DecisionEngine;
//! use ofdm_link_core::mcs::McsTable;
//! use ofdm_link_core::modulation::ModulationScheme;
//!
//! let mut engine = DecisionEngine::new(McsTable::uncoded_ladder(), 3, 1).unwrap();
//! let emitted: Vec<_> = (0..8).map(|_| engine.decide(27.0).selection.scheme).collect();
//! assert_eq!(emitted[..3], [ModulationScheme::Qpsk; 3]);
//! assert_eq!(emitted[3], ModulationScheme::Psk8);
//! ```

use crate::feedback::FeedbackMessage;
use crate::mcs::{McsSelection, McsTable};
use crate::types::{LinkError, LinkResult};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info};

/// Mutable ratchet state, owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationState {
    /// Active index into the MCS table
    pub current_index: usize,
    /// Consecutive observations of the same next-step target
    pub confirm_count: u32,
    /// Observations needed (exclusive) before a step is taken
    pub confirm_window: u32,
    /// Index one step toward the pending target
    pending_step: Option<usize>,
}

impl AdaptationState {
    pub fn new(current_index: usize, confirm_window: u32) -> Self {
        Self {
            current_index,
            confirm_count: 0,
            confirm_window,
            pending_step: None,
        }
    }
}

/// Immutable view of the active selection, swapped in atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationSnapshot {
    pub selection: McsSelection,
    /// Bumped on every publish
    pub generation: u64,
}

/// Single-writer, multi-reader handle on the active MCS selection.
///
/// Clones share the same slot. Writers replace the whole snapshot, readers
/// always see a consistent `(scheme, fec)` pair.
#[derive(Debug, Clone)]
pub struct SharedAdaptation {
    inner: Arc<ArcSwap<AdaptationSnapshot>>,
}

impl SharedAdaptation {
    pub fn new(initial: McsSelection) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(AdaptationSnapshot {
                selection: initial,
                generation: 0,
            })),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> AdaptationSnapshot {
        **self.inner.load()
    }

    pub fn selection(&self) -> McsSelection {
        self.inner.load().selection
    }

    /// Replace the selection. Publishing an unchanged selection is a no-op.
    pub fn publish(&self, selection: McsSelection) -> bool {
        let current = self.inner.load();
        if current.selection == selection {
            return false;
        }
        let next = AdaptationSnapshot {
            selection,
            generation: current.generation + 1,
        };
        self.inner.store(Arc::new(next));
        true
    }
}

/// Outcome of one decision step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub index: usize,
    pub selection: McsSelection,
    /// The active entry moved this step
    pub changed: bool,
    /// Message for the far end, set when the selection changed
    pub feedback: Option<FeedbackMessage>,
}

/// Ratchet state machine over MCS table indices.
#[derive(Debug)]
pub struct DecisionEngine {
    table: McsTable,
    state: AdaptationState,
    up_margin_db: f64,
    refresh_interval: Option<u32>,
    since_feedback: u32,
    shared: Option<SharedAdaptation>,
}

impl DecisionEngine {
    /// Engine starting at `initial_index` with the given confirmation window.
    pub fn new(table: McsTable, confirm_window: u32, initial_index: usize) -> LinkResult<Self> {
        if initial_index >= table.len() {
            return Err(LinkError::InvalidConfig(format!(
                "initial MCS index {} outside table of {} entries",
                initial_index,
                table.len()
            )));
        }
        Ok(Self {
            table,
            state: AdaptationState::new(initial_index, confirm_window),
            up_margin_db: 0.0,
            refresh_interval: None,
            since_feedback: 0,
            shared: None,
        })
    }

    /// Require `margin_db` above a higher entry's threshold before it counts.
    pub fn with_up_margin(mut self, margin_db: f64) -> Self {
        self.up_margin_db = margin_db.max(0.0);
        self
    }

    /// Re-send the unchanged selection every `decisions` steps.
    pub fn with_feedback_refresh(mut self, decisions: Option<u32>) -> Self {
        self.refresh_interval = decisions.filter(|&n| n > 0);
        self
    }

    /// Publish every committed step to `shared`.
    pub fn with_shared(mut self, shared: SharedAdaptation) -> Self {
        shared.publish(self.selection());
        self.shared = Some(shared);
        self
    }

    /// Feed one SNR estimate and return the (possibly updated) decision.
    pub fn decide(&mut self, snr_db: f64) -> Decision {
        let current = self.state.current_index;
        let target = self
            .table
            .lookup_with_margin(snr_db, current, self.up_margin_db);

        let mut changed = false;
        if target == current {
            self.state.confirm_count = 0;
            self.state.pending_step = None;
        } else {
            let step = if target > current { current + 1 } else { current - 1 };
            if self.state.pending_step != Some(step) {
                self.state.pending_step = Some(step);
                self.state.confirm_count = 0;
            }
            self.state.confirm_count += 1;
            if self.state.confirm_count > self.state.confirm_window {
                self.state.current_index = step;
                self.state.confirm_count = 0;
                self.state.pending_step = None;
                changed = true;
            }
        }

        let selection = self.selection();
        let refresh_due = self
            .refresh_interval
            .is_some_and(|n| self.since_feedback + 1 >= n);
        let feedback = if changed || refresh_due {
            self.since_feedback = 0;
            Some(FeedbackMessage::from(selection))
        } else {
            self.since_feedback += 1;
            None
        };

        if changed {
            info!(
                snr_db,
                from = current,
                to = self.state.current_index,
                selection = %selection,
                "MCS step committed"
            );
            if let Some(shared) = &self.shared {
                shared.publish(selection);
            }
        } else {
            debug!(
                snr_db,
                current,
                target,
                count = self.state.confirm_count,
                "MCS decision held"
            );
        }

        Decision {
            index: self.state.current_index,
            selection,
            changed,
            feedback,
        }
    }

    pub fn selection(&self) -> McsSelection {
        self.table
            .entry(self.state.current_index)
            .map(|e| e.selection())
            .unwrap_or_else(|| self.table.entries()[0].selection())
    }

    pub fn state(&self) -> &AdaptationState {
        &self.state
    }

    pub fn table(&self) -> &McsTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::ModulationScheme::{self, *};

    fn engine() -> DecisionEngine {
        DecisionEngine::new(McsTable::uncoded_ladder(), 3, 1).unwrap()
    }

    fn run(engine: &mut DecisionEngine, snrs: &[f64]) -> Vec<ModulationScheme> {
        snrs.iter().map(|&s| engine.decide(s).selection.scheme).collect()
    }

    #[test]
    fn test_reference_trace() {
        let mut e = engine();
        let mut snrs = vec![27.0; 11];
        snrs.extend(vec![14.5; 11]);
        let got = run(&mut e, &snrs);

        let mut expected = vec![Qpsk; 3];
        expected.extend([Psk8; 4]);
        expected.extend([Qam16; 4]);
        expected.extend([Qam16; 3]);
        expected.extend([Psk8; 4]);
        expected.extend([Qpsk; 4]);
        assert_eq!(got, expected);
    }

    #[test]
    fn test_steps_are_single() {
        let mut e = engine();
        let mut last = e.state().current_index;
        for i in 0..200 {
            let snr = if (i / 7) % 2 == 0 { 40.0 } else { -10.0 };
            let d = e.decide(snr);
            assert!(d.index.abs_diff(last) <= 1);
            last = d.index;
        }
    }

    #[test]
    fn test_noise_spike_is_ignored() {
        let mut e = engine();
        let got = run(&mut e, &[27.0, 27.0, 14.0, 27.0, 27.0, 27.0]);
        assert!(got.iter().all(|&s| s == Qpsk));
        assert_eq!(e.state().confirm_count, 3);
    }

    #[test]
    fn test_feedback_only_on_change() {
        let mut e = engine();
        let decisions: Vec<Decision> = (0..5).map(|_| e.decide(19.0)).collect();
        assert!(decisions[..3].iter().all(|d| d.feedback.is_none()));
        let fb = decisions[3].feedback.expect("step emits feedback");
        assert_eq!(fb.scheme_id, Psk8.id());
        assert_eq!(fb.fec_id, 0);
        assert!(decisions[4].feedback.is_none());
    }

    #[test]
    fn test_feedback_refresh() {
        let mut e = engine().with_feedback_refresh(Some(2));
        let fb: Vec<bool> = (0..4).map(|_| e.decide(14.0).feedback.is_some()).collect();
        assert_eq!(fb, vec![false, true, false, true]);
    }

    #[test]
    fn test_shared_snapshot_follows_commits() {
        let shared = SharedAdaptation::new(McsSelection::uncoded(Bpsk));
        let mut e = engine().with_shared(shared.clone());
        assert_eq!(shared.selection().scheme, Qpsk);
        let gen0 = shared.snapshot().generation;
        for _ in 0..4 {
            e.decide(30.0);
        }
        let snap = shared.snapshot();
        assert_eq!(snap.selection.scheme, Psk8);
        assert_eq!(snap.generation, gen0 + 1);
    }

    #[test]
    fn test_publish_unchanged_is_noop() {
        let shared = SharedAdaptation::new(McsSelection::uncoded(Qpsk));
        assert!(!shared.publish(McsSelection::uncoded(Qpsk)));
        assert!(shared.publish(McsSelection::uncoded(Bpsk)));
        assert_eq!(shared.snapshot().generation, 1);
    }

    #[test]
    fn test_initial_index_checked() {
        assert!(DecisionEngine::new(McsTable::uncoded_ladder(), 3, 4).is_err());
    }

    #[test]
    fn test_up_margin_delays_climb() {
        let mut e = engine().with_up_margin(1.0);
        // 18.5 dB is inside 8PSK's interval but within the margin
        let got = run(&mut e, &[18.5; 6]);
        assert!(got.iter().all(|&s| s == Qpsk));
    }
}
