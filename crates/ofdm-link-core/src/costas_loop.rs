//! Costas Loop
//!
//! Decision-directed carrier recovery for the feedback burst receiver. The
//! burst arrives with an arbitrary phase and a small residual frequency
//! offset; after the correlator removes the bulk phase, this loop tracks
//! whatever rotation remains across the payload.
//!
//! | Order | Scheme | Phase detector                                   |
//! |-------|--------|--------------------------------------------------|
//! | 2     | BPSK   | `re(y) * im(y)`                                  |
//! | 4     | QPSK   | `im(y) * sgn(re(y)) - re(y) * sgn(im(y))`        |
//!
//! ```rust
//! use ofdm_link_core::costas_loop::{CostasConfig, CostasLoop};
//! use ofdm_link_core::types::Complex;
//!
//! let mut costas = CostasLoop::new(CostasConfig::bpsk(0.05));
//! let rotated: Vec<Complex> = (0..400)
//!     .map(|i| Complex::from_polar(1.0, 0.3 + 0.01 * i as f64))
//!     .collect();
//! let out = costas.process_block(&rotated);
//! assert!(out[399].im.abs() < 0.05);
//! ```

use crate::types::Complex;
use std::f64::consts::PI;

/// Costas loop configuration.
#[derive(Debug, Clone)]
pub struct CostasConfig {
    /// 2 (BPSK) or 4 (QPSK)
    pub order: u8,
    /// Normalized loop bandwidth, radians/sample
    pub loop_bw: f64,
    /// 0.707 is critically damped
    pub damping: f64,
    /// Frequency clamp, radians/sample
    pub max_freq: f64,
}

impl CostasConfig {
    pub fn bpsk(loop_bw: f64) -> Self {
        Self {
            order: 2,
            loop_bw,
            ..Default::default()
        }
    }
}

impl Default for CostasConfig {
    fn default() -> Self {
        Self {
            order: 2,
            loop_bw: 2.0 * PI / 200.0,
            damping: 0.707,
            max_freq: 0.25,
        }
    }
}

/// Second-order carrier tracking loop.
///
/// ```text
/// input → [×exp(-jθ)] → output
///              ↑            ↓
///          phase ← PI filter ← detector
/// ```
#[derive(Debug, Clone)]
pub struct CostasLoop {
    order: u8,
    phase: f64,
    freq: f64,
    alpha: f64,
    beta: f64,
    max_freq: f64,
    last_error: f64,
}

impl CostasLoop {
    pub fn new(config: CostasConfig) -> Self {
        let omega_n = config.loop_bw / (config.damping + 1.0 / (4.0 * config.damping));
        Self {
            order: if config.order >= 4 { 4 } else { 2 },
            phase: 0.0,
            freq: 0.0,
            alpha: 2.0 * config.damping * omega_n,
            beta: omega_n * omega_n,
            max_freq: config.max_freq.abs(),
            last_error: 0.0,
        }
    }

    /// De-rotate one sample and advance the loop.
    pub fn process_sample(&mut self, input: Complex) -> Complex {
        let corrected = input * Complex::from_polar(1.0, -self.phase);
        let error = self.detect(corrected);
        self.last_error = error;

        self.freq = (self.freq + self.beta * error).clamp(-self.max_freq, self.max_freq);
        self.phase += self.freq + self.alpha * error;
        self.phase = wrap_phase(self.phase);
        corrected
    }

    pub fn process_block(&mut self, input: &[Complex]) -> Vec<Complex> {
        input.iter().map(|&s| self.process_sample(s)).collect()
    }

    fn detect(&self, y: Complex) -> f64 {
        match self.order {
            2 => y.re * y.im,
            _ => {
                let sgn_re = if y.re >= 0.0 { 1.0 } else { -1.0 };
                let sgn_im = if y.im >= 0.0 { 1.0 } else { -1.0 };
                y.im * sgn_re - y.re * sgn_im
            }
        }
    }

    /// Phase estimate, radians.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Frequency estimate, radians/sample.
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = 0.0;
        self.last_error = 0.0;
    }
}

fn wrap_phase(mut p: f64) -> f64 {
    while p > PI {
        p -= 2.0 * PI;
    }
    while p < -PI {
        p += 2.0 * PI;
    }
    p
}
