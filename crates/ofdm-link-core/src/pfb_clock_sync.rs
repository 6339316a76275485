//! Polyphase Filterbank Clock Synchronizer
//!
//! Symbol timing recovery for the feedback burst. The matched filter is
//! split into `nfilts` polyphase arms, each the RRC pulse advanced by a
//! fraction `m / nfilts` of a sample, together with a second bank holding
//! the pulse derivative. At each symbol the arm nearest the current timing
//! estimate produces the symbol and its slope; the error
//!
//! ```text
//! e = Re{ conj(y) * y' } / |g|^2
//! ```
//!
//! points toward the peak of the matched-filter output and drives a
//! second-order loop on the sampling instant.
//!
//! The synchronizer works on one burst at a time: it starts from the
//! sample index where the correlator found the access code and walks
//! forward one symbol period per output.

use crate::pulse_shaping::RootRaisedCosine;
use crate::types::Complex;
use std::f64::consts::PI;

/// Default number of polyphase arms
pub const DEFAULT_NFILTS: usize = 32;

/// Default normalized loop bandwidth
pub const DEFAULT_LOOP_BW: f64 = 2.0 * PI / 400.0;

/// Bound on the tracked deviation from nominal samples per symbol
const MAX_RATE_DEVIATION: f64 = 0.05;

/// Polyphase timing recovery over RRC-shaped bursts.
#[derive(Debug, Clone)]
pub struct PfbClockSync {
    filters: Vec<Vec<f64>>,
    dfilters: Vec<Vec<f64>>,
    half: isize,
    sps: usize,
    alpha: f64,
    beta: f64,
}

impl PfbClockSync {
    /// Build arms from `rrc`, with `nfilts` phases and loop bandwidth
    /// `loop_bw` (radians/symbol, damping 0.707).
    pub fn new(rrc: &RootRaisedCosine, nfilts: usize, loop_bw: f64) -> Self {
        let nfilts = nfilts.max(1);
        let half = rrc.half_len() as isize;
        let arm = |m: usize, f: &dyn Fn(f64) -> f64| -> Vec<f64> {
            (-half..=half)
                .map(|d| f(d as f64 + m as f64 / nfilts as f64))
                .collect()
        };
        let filters = (0..nfilts).map(|m| arm(m, &|t| rrc.at(t))).collect();
        let dfilters = (0..nfilts).map(|m| arm(m, &|t| rrc.derivative_at(t))).collect();

        let damping = 0.707;
        let denom = 1.0 + 2.0 * damping * loop_bw + loop_bw * loop_bw;
        Self {
            filters,
            dfilters,
            half,
            sps: rrc.sps(),
            alpha: 4.0 * damping * loop_bw / denom,
            beta: 4.0 * loop_bw * loop_bw / denom,
        }
    }

    pub fn nfilts(&self) -> usize {
        self.filters.len()
    }

    /// Recover up to `max_symbols` symbols from `x`, starting at sample
    /// `start`, dividing each by the complex burst `gain`.
    ///
    /// Stops early when the filter would run past the end of `x`.
    pub fn recover(
        &self,
        x: &[Complex],
        start: usize,
        gain: Complex,
        max_symbols: usize,
    ) -> Vec<Complex> {
        let nfilts = self.filters.len();
        let gain_power = gain.norm_sqr().max(f64::MIN_POSITIVE);
        let mut tau = start as f64;
        let mut rate = 0.0;
        let mut out = Vec::with_capacity(max_symbols);

        while out.len() < max_symbols {
            let mut n = tau.floor() as isize;
            let mut arm = ((tau - n as f64) * nfilts as f64).round() as usize;
            if arm == nfilts {
                n += 1;
                arm = 0;
            }
            if n + self.half >= x.len() as isize {
                break;
            }

            let y = self.filter(x, n, &self.filters[arm]);
            let dy = self.filter(x, n, &self.dfilters[arm]);
            let error = ((y.conj() * dy).re / gain_power).clamp(-1.0, 1.0);

            rate = (rate + self.beta * error).clamp(-MAX_RATE_DEVIATION, MAX_RATE_DEVIATION);
            tau += self.sps as f64 + rate + self.alpha * error;
            out.push(y / gain);
        }
        out
    }

    fn filter(&self, x: &[Complex], n: isize, taps: &[f64]) -> Complex {
        let mut acc = Complex::new(0.0, 0.0);
        for d in -self.half..=self.half {
            let idx = n - d;
            if idx >= 0 && (idx as usize) < x.len() {
                acc += x[idx as usize] * taps[(d + self.half) as usize];
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::additive_scrambler::AdditiveScrambler;

    fn burst(rrc: &RootRaisedCosine, symbols: &[f64], frac: f64, pad: usize) -> Vec<Complex> {
        let half = rrc.half_len() as f64;
        let len = (symbols.len() - 1) * rrc.sps() + rrc.len() + 2 * pad;
        (0..len)
            .map(|n| {
                let v: f64 = symbols
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| {
                        let t = n as f64 - pad as f64 - half - (i * rrc.sps()) as f64 - frac;
                        s * rrc.at(t)
                    })
                    .sum();
                Complex::new(v, 0.0)
            })
            .collect()
    }

    fn symbols(n: usize) -> Vec<f64> {
        AdditiveScrambler::header()
            .mask_bits(n)
            .into_iter()
            .map(|b| 1.0 - 2.0 * b as f64)
            .collect()
    }

    #[test]
    fn test_arm_zero_is_matched_filter() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let sync = PfbClockSync::new(&rrc, 32, DEFAULT_LOOP_BW);
        assert_eq!(sync.nfilts(), 32);
        assert_eq!(sync.filters[0], rrc.taps());
    }

    #[test]
    fn test_recovers_aligned_burst() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let sync = PfbClockSync::new(&rrc, DEFAULT_NFILTS, DEFAULT_LOOP_BW);
        let data = symbols(80);
        let x = burst(&rrc, &data, 0.0, 10);
        let out = sync.recover(&x, 10 + rrc.half_len(), Complex::new(1.0, 0.0), data.len());
        assert_eq!(out.len(), data.len());
        for (y, &s) in out.iter().zip(&data) {
            assert!(y.re * s > 0.8, "{y} vs {s}");
        }
    }

    #[test]
    fn test_pulls_in_fractional_offset() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let sync = PfbClockSync::new(&rrc, DEFAULT_NFILTS, DEFAULT_LOOP_BW);
        let data = symbols(120);
        let x = burst(&rrc, &data, 0.4, 10);
        let gain = Complex::new(0.0, 2.0);
        let rotated: Vec<Complex> = x.iter().map(|v| v * gain).collect();
        let out = sync.recover(&rotated, 10 + rrc.half_len(), gain, data.len());
        for (y, &s) in out.iter().zip(&data) {
            assert!(y.re * s > 0.4, "{y} vs {s}");
        }
        // Converged: late symbols sit close to the constellation
        for (y, &s) in out[80..110].iter().zip(&data[80..110]) {
            assert!((y.re - s).abs() < 0.25, "{y} vs {s}");
        }
    }

    #[test]
    fn test_stops_at_end_of_input() {
        let rrc = RootRaisedCosine::new(0.35, 11, 2);
        let sync = PfbClockSync::new(&rrc, 8, DEFAULT_LOOP_BW);
        let x = vec![Complex::new(0.0, 0.0); 40];
        let out = sync.recover(&x, 11, Complex::new(1.0, 0.0), 100);
        assert!(out.len() < 100);
    }
}
