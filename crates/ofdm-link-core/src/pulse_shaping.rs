//! Root Raised Cosine Pulse Shaping
//!
//! The feedback modem shapes its BPSK symbols with a root raised cosine
//! (RRC) pulse and the receiver matches it with the same pulse, so the
//! cascade is a zero-ISI raised cosine.
//!
//! [`RootRaisedCosine`] keeps the pulse as a function of continuous time,
//! which lets the receiver's polyphase clock sync evaluate it at fractional
//! sample offsets with the same normalisation the transmitter used.
//!
//! ```rust
//! use ofdm_link_core::pulse_shaping::RootRaisedCosine;
//!
//! let rrc = RootRaisedCosine::new(0.35, 11, 2);
//! let taps = rrc.taps();
//! assert_eq!(taps.len(), 23);
//! let energy: f64 = taps.iter().map(|t| t * t).sum();
//! assert!((energy - 1.0).abs() < 1e-12);
//! ```

use crate::types::Complex;
use std::f64::consts::PI;

/// RRC pulse with a finite span.
#[derive(Debug, Clone)]
pub struct RootRaisedCosine {
    rolloff: f64,
    span_symbols: usize,
    sps: usize,
    /// Scale giving the integer-spaced taps unit energy
    norm: f64,
}

impl RootRaisedCosine {
    /// `rolloff` in (0, 1], span in symbols (even), `sps` samples per symbol.
    pub fn new(rolloff: f64, span_symbols: usize, sps: usize) -> Self {
        let mut rrc = Self {
            rolloff: rolloff.clamp(1e-3, 1.0),
            span_symbols: span_symbols.max(1),
            sps: sps.max(1),
            norm: 1.0,
        };
        let energy: f64 = rrc.taps().iter().map(|t| t * t).sum();
        rrc.norm = 1.0 / energy.sqrt();
        rrc
    }

    /// Half the filter length in samples.
    pub fn half_len(&self) -> usize {
        self.span_symbols * self.sps / 2
    }

    /// Filter length in samples (odd).
    pub fn len(&self) -> usize {
        2 * self.half_len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn sps(&self) -> usize {
        self.sps
    }

    /// Pulse value at `offset` samples from its centre; zero outside the span.
    pub fn at(&self, offset: f64) -> f64 {
        if offset.abs() > self.half_len() as f64 + 1e-9 {
            return 0.0;
        }
        self.norm * rrc_pulse(offset / self.sps as f64, self.rolloff)
    }

    /// Derivative of the pulse with respect to the sample offset.
    pub fn derivative_at(&self, offset: f64) -> f64 {
        let h = 1e-4;
        (self.at(offset + h) - self.at(offset - h)) / (2.0 * h)
    }

    /// Centred taps at integer sample offsets.
    pub fn taps(&self) -> Vec<f64> {
        let half = self.half_len() as isize;
        (-half..=half).map(|d| self.at(d as f64)).collect()
    }

    /// Upsample `symbols` by `sps` and filter. The pulse of symbol `i`
    /// peaks at output sample `half_len() + i * sps`.
    pub fn modulate(&self, symbols: &[Complex]) -> Vec<Complex> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let taps = self.taps();
        let out_len = (symbols.len() - 1) * self.sps + taps.len();
        let mut out = vec![Complex::new(0.0, 0.0); out_len];
        for (i, &s) in symbols.iter().enumerate() {
            let base = i * self.sps;
            for (j, &h) in taps.iter().enumerate() {
                out[base + j] += s * h;
            }
        }
        out
    }

    /// Matched-filter output at integer sample `n` (zero outside `x`).
    pub fn matched_at(&self, x: &[Complex], n: isize) -> Complex {
        let half = self.half_len() as isize;
        let taps = self.taps();
        let mut acc = Complex::new(0.0, 0.0);
        for d in -half..=half {
            let idx = n - d;
            if idx >= 0 && (idx as usize) < x.len() {
                acc += x[idx as usize] * taps[(d + half) as usize];
            }
        }
        acc
    }

    /// Full matched-filter output aligned with the input (same length).
    pub fn matched_filter(&self, x: &[Complex]) -> Vec<Complex> {
        let half = self.half_len() as isize;
        let taps = self.taps();
        (0..x.len() as isize)
            .map(|n| {
                let mut acc = Complex::new(0.0, 0.0);
                for d in -half..=half {
                    let idx = n - d;
                    if idx >= 0 && (idx as usize) < x.len() {
                        acc += x[idx as usize] * taps[(d + half) as usize];
                    }
                }
                acc
            })
            .collect()
    }
}

/// Unnormalised RRC impulse response at `t` symbol periods.
pub fn rrc_pulse(t: f64, rolloff: f64) -> f64 {
    let a = rolloff;
    if t.abs() < 1e-10 {
        return 1.0 - a + 4.0 * a / PI;
    }
    if ((4.0 * a * t).abs() - 1.0).abs() < 1e-10 {
        let s = (PI / (4.0 * a)).sin();
        let c = (PI / (4.0 * a)).cos();
        return a / 2.0_f64.sqrt() * ((1.0 + 2.0 / PI) * s + (1.0 - 2.0 / PI) * c);
    }
    let pi_t = PI * t;
    let four_at = 4.0 * a * t;
    let num = (pi_t * (1.0 - a)).sin() + four_at * (pi_t * (1.0 + a)).cos();
    let den = pi_t * (1.0 - four_at * four_at);
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_taps_symmetric() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let taps = rrc.taps();
        for i in 0..taps.len() / 2 {
            assert_relative_eq!(taps[i], taps[taps.len() - 1 - i], epsilon = 1e-12);
        }
        assert_eq!(rrc.half_len(), 11);
    }

    #[test]
    fn test_cascade_is_nearly_nyquist() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let symbols = vec![Complex::new(1.0, 0.0)];
        let tx = rrc.modulate(&symbols);
        let peak = rrc.half_len() as isize;
        let main = rrc.matched_at(&tx, peak);
        assert_relative_eq!(main.re, 1.0, epsilon = 1e-9);
        // One symbol away the raised cosine crosses zero
        let side = rrc.matched_at(&tx, peak + 2);
        assert!(side.norm() < 0.02, "ISI {}", side.norm());
    }

    #[test]
    fn test_fractional_evaluation_matches_taps() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let taps = rrc.taps();
        assert_relative_eq!(rrc.at(0.0), taps[11], epsilon = 1e-12);
        assert_relative_eq!(rrc.at(-3.0), taps[8], epsilon = 1e-12);
        assert_eq!(rrc.at(12.0), 0.0);
        // Peak: derivative vanishes
        assert!(rrc.derivative_at(0.0).abs() < 1e-6);
        assert!(rrc.derivative_at(0.5) < 0.0);
    }

    #[test]
    fn test_matched_filter_alignment() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let tx = rrc.modulate(&[Complex::new(1.0, 0.0), Complex::new(-1.0, 0.0)]);
        let y = rrc.matched_filter(&tx);
        assert_eq!(y.len(), tx.len());
        assert!(y[11].re > 0.95);
        assert!(y[13].re < -0.95);
    }
}
