//! Correlate Estimate
//!
//! Locates a known symbol sequence in a matched-filter output and estimates
//! the complex gain it arrived with. The feedback receiver uses it to find
//! the access code at the head of each burst.
//!
//! The score at sample `n` is the normalized correlation of the reference
//! against the samples `n, n + sps, n + 2*sps, ...`:
//!
//! ```text
//!            | Σ y[n + j·sps] · a_j |
//! score = ─────────────────────────────
//!          sqrt(Σ |y[n + j·sps]|² · Σ a_j²)
//! ```
//!
//! which lies in [0, 1] regardless of amplitude and phase. Detection fires
//! at the first sample reaching the threshold and then settles on the best
//! score within the following symbol.
//!
//! ```rust
//! use ofdm_link_core::correlate_estimate::CorrelateEstimator;
//! use ofdm_link_core::types::Complex;
//!
//! let reference = vec![1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, 1.0];
//! let est = CorrelateEstimator::new(reference.clone(), 1, 0.9);
//! let mut y = vec![Complex::new(0.0, 0.0); 5];
//! y.extend(reference.iter().map(|&a| Complex::new(0.0, 3.0 * a)));
//! let peak = est.find(&y, 0).unwrap();
//! assert_eq!(peak.index, 5);
//! assert!((peak.gain - Complex::new(0.0, 3.0)).norm() < 1e-12);
//! ```

use crate::types::Complex;

/// Energy below which a window is treated as silence
const MIN_WINDOW_ENERGY: f64 = 1e-12;

/// A detected occurrence of the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Sample index of the first reference symbol
    pub index: usize,
    /// Normalized score in [0, 1]
    pub score: f64,
    /// Least-squares complex gain of the reference at `index`
    pub gain: Complex,
}

/// Sliding normalized correlator against a real reference sequence.
#[derive(Debug, Clone)]
pub struct CorrelateEstimator {
    reference: Vec<f64>,
    reference_energy: f64,
    spacing: usize,
    threshold: f64,
}

impl CorrelateEstimator {
    /// `reference` symbols spaced `spacing` samples apart, detection at
    /// `threshold` (clamped to [0, 1]).
    pub fn new(reference: Vec<f64>, spacing: usize, threshold: f64) -> Self {
        let reference_energy = reference.iter().map(|a| a * a).sum();
        Self {
            reference,
            reference_energy,
            spacing: spacing.max(1),
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Samples spanned by the reference.
    pub fn span(&self) -> usize {
        self.reference.len().saturating_sub(1) * self.spacing + 1
    }

    /// Score and gain at `n`, or `None` if the window does not fit or is silent.
    pub fn evaluate(&self, y: &[Complex], n: usize) -> Option<CorrelationPeak> {
        if self.reference.is_empty() || n + self.span() > y.len() {
            return None;
        }
        let mut acc = Complex::new(0.0, 0.0);
        let mut energy = 0.0;
        for (j, &a) in self.reference.iter().enumerate() {
            let v = y[n + j * self.spacing];
            acc += v * a;
            energy += v.norm_sqr();
        }
        if energy < MIN_WINDOW_ENERGY || self.reference_energy <= 0.0 {
            return None;
        }
        Some(CorrelationPeak {
            index: n,
            score: acc.norm() / (energy * self.reference_energy).sqrt(),
            gain: acc / self.reference_energy,
        })
    }

    /// First detection at or after `from`.
    pub fn find(&self, y: &[Complex], from: usize) -> Option<CorrelationPeak> {
        let last = y.len().checked_sub(self.span())?;
        let first = (from..=last)
            .filter_map(|n| self.evaluate(y, n))
            .find(|p| p.score >= self.threshold)?;

        let end = (first.index + self.spacing).min(last);
        (first.index..=end)
            .filter_map(|n| self.evaluate(y, n))
            .fold(first, |best, p| if p.score > best.score { p } else { best })
            .into()
    }
}
