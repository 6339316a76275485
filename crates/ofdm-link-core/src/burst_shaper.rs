//! Burst Shaper
//!
//! Tapers the leading and trailing edges of a feedback burst and surrounds
//! it with silent guard samples, so that keying the narrowband transmitter
//! on and off does not splatter into the OFDM band.
//!
//! ```rust
//! use ofdm_link_core::burst_shaper::{BurstShaper, WindowShape};
//! use ofdm_link_core::types::Complex;
//!
//! let shaper = BurstShaper::new(WindowShape::Hann, 8).with_padding(4, 4);
//! let burst = vec![Complex::new(1.0, 0.0); 64];
//! let shaped = shaper.shape(&burst);
//! assert_eq!(shaped.len(), 72);
//! assert_eq!(shaped[0].re, 0.0);
//! assert_eq!(shaped[4].re, 0.0); // ramp starts at zero
//! assert_eq!(shaped[40].re, 1.0);
//! ```

use crate::types::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Edge taper shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowShape {
    Linear,
    #[default]
    Hann,
}

/// Ramps burst edges and adds guard samples.
#[derive(Debug, Clone)]
pub struct BurstShaper {
    ramp: Vec<f64>,
    pre_pad: usize,
    post_pad: usize,
}

impl BurstShaper {
    /// Symmetric taper of `ramp_len` samples on each edge, no padding.
    pub fn new(shape: WindowShape, ramp_len: usize) -> Self {
        Self {
            ramp: make_ramp(shape, ramp_len),
            pre_pad: 0,
            post_pad: 0,
        }
    }

    /// Zero samples inserted before and after the burst.
    pub fn with_padding(mut self, pre: usize, post: usize) -> Self {
        self.pre_pad = pre;
        self.post_pad = post;
        self
    }

    pub fn shape(&self, burst: &[Complex]) -> Vec<Complex> {
        let mut out = Vec::with_capacity(self.pre_pad + burst.len() + self.post_pad);
        out.resize(self.pre_pad, Complex::new(0.0, 0.0));
        let start = out.len();
        out.extend_from_slice(burst);
        self.apply_ramps(&mut out[start..]);
        out.resize(out.len() + self.post_pad, Complex::new(0.0, 0.0));
        out
    }

    /// Taper both edges in place. Bursts shorter than two ramps get
    /// overlapping tapers.
    pub fn apply_ramps(&self, data: &mut [Complex]) {
        let n = data.len();
        let len = self.ramp.len().min(n);
        for i in 0..len {
            data[i] *= self.ramp[i];
            data[n - 1 - i] *= self.ramp[i];
        }
    }

    /// Samples added around a burst of `burst_len` samples.
    pub fn output_len(&self, burst_len: usize) -> usize {
        self.pre_pad + burst_len + self.post_pad
    }

    pub fn ramp(&self) -> &[f64] {
        &self.ramp
    }
}

fn make_ramp(shape: WindowShape, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / len as f64;
            match shape {
                WindowShape::Linear => t,
                WindowShape::Hann => 0.5 * (1.0 - (PI * t).cos()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_ramp() {
        let shaper = BurstShaper::new(WindowShape::Linear, 4);
        assert_eq!(shaper.ramp(), &[0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_hann_ramp_symmetric_edges() {
        let shaper = BurstShaper::new(WindowShape::Hann, 10);
        let shaped = shaper.shape(&vec![Complex::new(2.0, -2.0); 50]);
        for i in 0..10 {
            assert_relative_eq!(shaped[i].re, shaped[49 - i].re, epsilon = 1e-12);
        }
        assert_relative_eq!(shaped[5].re, 2.0 * 0.5, epsilon = 1e-12);
        assert_eq!(shaped[25], Complex::new(2.0, -2.0));
    }

    #[test]
    fn test_padding() {
        let shaper = BurstShaper::new(WindowShape::Hann, 0).with_padding(3, 5);
        let out = shaper.shape(&[Complex::new(1.0, 0.0); 2]);
        assert_eq!(out.len(), shaper.output_len(2));
        assert_eq!(out[3], Complex::new(1.0, 0.0));
        assert_eq!(out[7], Complex::new(0.0, 0.0));
    }
}
