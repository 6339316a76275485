//! SNR Estimator
//!
//! Smooths a noisy per-frame SNR measurement into a stable estimate with an
//! exponentially weighted moving average:
//!
//! ```text
//! snr_est = alpha * measurement + (1 - alpha) * snr_est
//! ```
//!
//! The first measurement seeds the estimate. The per-frame measurement
//! normally comes from the RF front end; when it does not, one can be
//! derived from the frame's equalized symbols with [`SnrMethod`].
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::snr_estimator::SnrEstimator;
//!
//! let mut est = SnrEstimator::new(0.5);
//! assert_eq!(est.update(10.0), 10.0);
//! assert_eq!(est.update(20.0), 15.0);
//! assert_eq!(est.estimate(), Some(15.0));
//! ```

use crate::modulation::{measure_snr_db, ModulationScheme, MAX_MEASURED_SNR_DB};
use crate::types::Complex;

/// Default smoothing constant
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Exponential smoothing of per-frame SNR samples (dB).
#[derive(Debug, Clone)]
pub struct SnrEstimator {
    alpha: f64,
    estimate: Option<f64>,
}

impl SnrEstimator {
    /// `alpha` is clamped into (0, 1].
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            estimate: None,
        }
    }

    /// Fold one measurement in and return the new estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let next = match self.estimate {
            None => measurement,
            Some(prev) => self.alpha * measurement + (1.0 - self.alpha) * prev,
        };
        self.estimate = Some(next);
        next
    }

    /// Measure a frame of equalized symbols and fold the result in.
    ///
    /// Returns `None` and leaves the estimate untouched for an empty frame.
    pub fn update_from_symbols(
        &mut self,
        symbols: &[Complex],
        scheme: ModulationScheme,
        method: SnrMethod,
    ) -> Option<f64> {
        let measurement = method.measure(symbols, scheme)?;
        Some(self.update(measurement))
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }
}

impl Default for SnrEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

/// Per-frame SNR measurement method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnrMethod {
    /// Slice to the nearest point and compare sliced power to residual error.
    #[default]
    DecisionDirected,
    /// Blind second/fourth moment estimator. Meant for constant-modulus
    /// schemes (BPSK, QPSK, 8PSK).
    M2M4,
}

impl SnrMethod {
    /// SNR of one frame in dB, or `None` if it cannot be measured.
    pub fn measure(self, symbols: &[Complex], scheme: ModulationScheme) -> Option<f64> {
        match self {
            SnrMethod::DecisionDirected => measure_snr_db(symbols, scheme),
            SnrMethod::M2M4 => m2m4_snr_db(symbols),
        }
    }
}

fn m2m4_snr_db(symbols: &[Complex]) -> Option<f64> {
    if symbols.is_empty() {
        return None;
    }
    let n = symbols.len() as f64;
    let m2 = symbols.iter().map(|s| s.norm_sqr()).sum::<f64>() / n;
    let m4 = symbols.iter().map(|s| s.norm_sqr().powi(2)).sum::<f64>() / n;
    let disc = 2.0 * m2 * m2 - m4;
    if disc <= 0.0 {
        return None;
    }
    let signal = disc.sqrt();
    let noise = m2 - signal;
    if noise <= 0.0 {
        return Some(MAX_MEASURED_SNR_DB);
    }
    Some((10.0 * (signal / noise).log10()).min(MAX_MEASURED_SNR_DB))
}
