//! Modulation Schemes and Constellation Mapping
//!
//! The four payload schemes the link can switch between, their Gray-coded
//! constellations with unit average energy, and the three receive-side
//! operations the framers need: hard decisions, max-log soft bits and a
//! decision-directed SNR measurement.
//!
//! | Scheme | Id | Bits/symbol | Points |
//! |--------|----|-------------|--------|
//! | BPSK   | 0  | 1 | ±1 |
//! | QPSK   | 1  | 2 | (±1 ±j)/√2 |
//! | 8PSK   | 2  | 3 | e^{jπp/4} |
//! | 16QAM  | 3  | 4 | {±1, ±3}² / √10 |
//!
//! Bits are grouped MSB first; the first bit of a group selects the most
//! significant label bit.
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::modulation::{Constellation, ModulationScheme};
//!
//! let qam = Constellation::new(ModulationScheme::Qam16);
//! let bits = vec![1, 0, 1, 1, 0, 0, 0, 1];
//! let symbols = qam.map_bits(&bits);
//! assert_eq!(symbols.len(), 2);
//! assert_eq!(qam.demap_hard(&symbols), bits);
//! ```

use crate::bit_packing::{PackKBits, UnpackKBits};
use crate::types::{Complex, LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Upper bound reported by [`measure_snr_db`] for an error-free frame
pub const MAX_MEASURED_SNR_DB: f64 = 60.0;

/// Payload modulation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationScheme {
    Bpsk,
    Qpsk,
    #[serde(rename = "8psk")]
    Psk8,
    #[serde(rename = "qam16")]
    Qam16,
}

impl ModulationScheme {
    /// All schemes in ascending order of spectral efficiency
    pub const ALL: [ModulationScheme; 4] = [
        ModulationScheme::Bpsk,
        ModulationScheme::Qpsk,
        ModulationScheme::Psk8,
        ModulationScheme::Qam16,
    ];

    pub fn bits_per_symbol(self) -> usize {
        match self {
            ModulationScheme::Bpsk => 1,
            ModulationScheme::Qpsk => 2,
            ModulationScheme::Psk8 => 3,
            ModulationScheme::Qam16 => 4,
        }
    }

    /// Number of constellation points.
    pub fn order(self) -> usize {
        1 << self.bits_per_symbol()
    }

    /// Wire identifier, shared by the header and feedback formats.
    pub fn id(self) -> u8 {
        match self {
            ModulationScheme::Bpsk => 0,
            ModulationScheme::Qpsk => 1,
            ModulationScheme::Psk8 => 2,
            ModulationScheme::Qam16 => 3,
        }
    }

    pub fn from_id(id: u8) -> LinkResult<Self> {
        match id {
            0 => Ok(ModulationScheme::Bpsk),
            1 => Ok(ModulationScheme::Qpsk),
            2 => Ok(ModulationScheme::Psk8),
            3 => Ok(ModulationScheme::Qam16),
            other => Err(LinkError::UnknownScheme(other)),
        }
    }

    /// Number of symbols needed for `bits` payload bits.
    pub fn symbols_for_bits(self, bits: usize) -> usize {
        bits.div_ceil(self.bits_per_symbol())
    }
}

impl std::fmt::Display for ModulationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModulationScheme::Bpsk => "BPSK",
            ModulationScheme::Qpsk => "QPSK",
            ModulationScheme::Psk8 => "8PSK",
            ModulationScheme::Qam16 => "16QAM",
        };
        write!(f, "{}", name)
    }
}

/// Gray-coded constellation with mapper and demappers.
#[derive(Debug, Clone)]
pub struct Constellation {
    scheme: ModulationScheme,
    /// Point for each label
    points: Vec<Complex>,
    noise_var: f64,
}

impl Constellation {
    pub fn new(scheme: ModulationScheme) -> Self {
        Self {
            scheme,
            points: build_points(scheme),
            noise_var: 1.0,
        }
    }

    /// Scale soft bits by the given noise variance (default 1.0).
    pub fn with_noise_var(mut self, noise_var: f64) -> Self {
        self.noise_var = noise_var.max(1e-12);
        self
    }

    pub fn scheme(&self) -> ModulationScheme {
        self.scheme
    }

    pub fn points(&self) -> &[Complex] {
        &self.points
    }

    pub fn bits_per_symbol(&self) -> usize {
        self.scheme.bits_per_symbol()
    }

    /// Map bits to symbols. A trailing partial group is zero-padded.
    pub fn map_bits(&self, bits: &[u8]) -> Vec<Complex> {
        PackKBits::new(self.bits_per_symbol())
            .pack(bits)
            .into_iter()
            .map(|label| self.points[label as usize])
            .collect()
    }

    /// Closest constellation label.
    pub fn decide(&self, rx: Complex) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (label, p) in self.points.iter().enumerate() {
            let d = (rx - p).norm_sqr();
            if d < best_dist {
                best_dist = d;
                best = label;
            }
        }
        best
    }

    /// Nearest-point hard decisions, one bit per output byte.
    pub fn demap_hard(&self, symbols: &[Complex]) -> Vec<u8> {
        let labels: Vec<u8> = symbols.iter().map(|&s| self.decide(s) as u8).collect();
        UnpackKBits::new(self.bits_per_symbol()).unpack(&labels)
    }

    /// Max-log LLRs, positive favours 0.
    pub fn demap_soft(&self, symbols: &[Complex]) -> Vec<f64> {
        let bps = self.bits_per_symbol();
        let mut llrs = Vec::with_capacity(symbols.len() * bps);
        for &rx in symbols {
            for bit in 0..bps {
                let shift = bps - 1 - bit;
                let mut d0 = f64::INFINITY;
                let mut d1 = f64::INFINITY;
                for (label, p) in self.points.iter().enumerate() {
                    let d = (rx - p).norm_sqr();
                    if (label >> shift) & 1 == 1 {
                        d1 = d1.min(d);
                    } else {
                        d0 = d0.min(d);
                    }
                }
                llrs.push((d1 - d0) / self.noise_var);
            }
        }
        llrs
    }

    /// Smallest squared distance between two distinct points.
    pub fn min_distance_sqr(&self) -> f64 {
        let mut min = f64::INFINITY;
        for (i, a) in self.points.iter().enumerate() {
            for b in &self.points[i + 1..] {
                min = min.min((a - b).norm_sqr());
            }
        }
        min
    }
}

fn gray(n: usize) -> usize {
    n ^ (n >> 1)
}

fn build_points(scheme: ModulationScheme) -> Vec<Complex> {
    let order = scheme.order();
    let mut points = vec![Complex::new(0.0, 0.0); order];
    match scheme {
        ModulationScheme::Bpsk => {
            points[0] = Complex::new(1.0, 0.0);
            points[1] = Complex::new(-1.0, 0.0);
        }
        ModulationScheme::Qpsk => {
            let s = 1.0 / 2.0_f64.sqrt();
            for (label, p) in points.iter_mut().enumerate() {
                let i = if label & 0b10 == 0 { s } else { -s };
                let q = if label & 0b01 == 0 { s } else { -s };
                *p = Complex::new(i, q);
            }
        }
        ModulationScheme::Psk8 => {
            // Neighbouring phases differ in one label bit
            for pos in 0..order {
                let angle = pos as f64 * PI / 4.0;
                points[gray(pos)] = Complex::new(angle.cos(), angle.sin());
            }
        }
        ModulationScheme::Qam16 => {
            let levels = [-3.0, -1.0, 1.0, 3.0];
            let scale = 1.0 / 10.0_f64.sqrt();
            for i_pos in 0..4 {
                for q_pos in 0..4 {
                    let label = (gray(i_pos) << 2) | gray(q_pos);
                    points[label] = Complex::new(levels[i_pos] * scale, levels[q_pos] * scale);
                }
            }
        }
    }
    points
}

/// Decision-directed SNR of one frame of equalized symbols, in dB.
///
/// Each symbol is sliced to its nearest point; the ratio of sliced power to
/// residual error power is the measurement. Returns `None` for an empty
/// frame and caps error-free frames at [`MAX_MEASURED_SNR_DB`].
pub fn measure_snr_db(symbols: &[Complex], scheme: ModulationScheme) -> Option<f64> {
    if symbols.is_empty() {
        return None;
    }
    let cnst = Constellation::new(scheme);
    let mut signal = 0.0;
    let mut error = 0.0;
    for &s in symbols {
        let ideal = cnst.points[cnst.decide(s)];
        signal += ideal.norm_sqr();
        error += (s - ideal).norm_sqr();
    }
    if error <= 0.0 {
        return Some(MAX_MEASURED_SNR_DB);
    }
    Some((10.0 * (signal / error).log10()).min(MAX_MEASURED_SNR_DB))
}

/// Mean error-vector power normalised by the squared minimum distance.
///
/// Small values mean the frame sits well inside its decision regions;
/// values approaching 0.25 mean symbols straddle decision boundaries.
pub fn constellation_metric(symbols: &[Complex], scheme: ModulationScheme) -> f64 {
    if symbols.is_empty() {
        return 0.0;
    }
    let cnst = Constellation::new(scheme);
    let err: f64 = symbols
        .iter()
        .map(|&s| (s - cnst.points[cnst.decide(s)]).norm_sqr())
        .sum();
    err / symbols.len() as f64 / cnst.min_distance_sqr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_bits_per_symbol_and_ids() {
        for (i, scheme) in ModulationScheme::ALL.iter().enumerate() {
            assert_eq!(scheme.bits_per_symbol(), i + 1);
            assert_eq!(scheme.id(), i as u8);
            assert_eq!(ModulationScheme::from_id(i as u8).unwrap(), *scheme);
        }
        assert!(ModulationScheme::from_id(4).is_err());
    }

    #[test]
    fn test_symbols_for_bits_rounds_up() {
        assert_eq!(ModulationScheme::Psk8.symbols_for_bits(8), 3);
        assert_eq!(ModulationScheme::Qam16.symbols_for_bits(8), 2);
        assert_eq!(ModulationScheme::Bpsk.symbols_for_bits(0), 0);
    }

    #[test]
    fn test_unit_average_energy() {
        for scheme in ModulationScheme::ALL {
            let cnst = Constellation::new(scheme);
            let energy: f64 =
                cnst.points().iter().map(|p| p.norm_sqr()).sum::<f64>() / scheme.order() as f64;
            assert_relative_eq!(energy, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gray_neighbours_differ_by_one_bit() {
        let cnst = Constellation::new(ModulationScheme::Psk8);
        let dmin = cnst.min_distance_sqr();
        for (a, pa) in cnst.points().iter().enumerate() {
            for (b, pb) in cnst.points().iter().enumerate() {
                if a != b && ((pa - pb).norm_sqr() - dmin).abs() < 1e-9 {
                    assert_eq!((a ^ b).count_ones(), 1);
                }
            }
        }
    }

    #[test]
    fn test_constellation_roundtrip_all_schemes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for scheme in ModulationScheme::ALL {
            let cnst = Constellation::new(scheme);
            let n_bits = 240; // multiple of 1..=4 bits
            let bits: Vec<u8> = (0..n_bits).map(|_| rng.gen_range(0..2)).collect();
            let symbols = cnst.map_bits(&bits);
            assert_eq!(symbols.len(), n_bits / scheme.bits_per_symbol());
            assert_eq!(cnst.demap_hard(&symbols), bits, "{scheme}");

            let soft: Vec<u8> = cnst
                .demap_soft(&symbols)
                .iter()
                .map(|&l| crate::types::hard_bit(l))
                .collect();
            assert_eq!(soft, bits, "{scheme} soft");
        }
    }

    #[test]
    fn test_soft_bits_sign_and_scale() {
        let cnst = Constellation::new(ModulationScheme::Bpsk);
        let llr = cnst.demap_soft(&[Complex::new(0.5, 0.0)]);
        // d1 = 2.25, d0 = 0.25
        assert_relative_eq!(llr[0], 2.0, epsilon = 1e-12);

        let noisy = Constellation::new(ModulationScheme::Bpsk).with_noise_var(0.5);
        assert_relative_eq!(noisy.demap_soft(&[Complex::new(0.5, 0.0)])[0], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_measure_snr() {
        let clean = vec![Complex::new(1.0, 0.0), Complex::new(-1.0, 0.0)];
        assert_eq!(measure_snr_db(&clean, ModulationScheme::Bpsk), Some(MAX_MEASURED_SNR_DB));
        assert_eq!(measure_snr_db(&[], ModulationScheme::Bpsk), None);

        // Error power 0.01 against unit signal power: 20 dB
        let noisy = vec![Complex::new(1.1, 0.0), Complex::new(-0.9, 0.0)];
        let snr = measure_snr_db(&noisy, ModulationScheme::Bpsk).unwrap();
        assert_relative_eq!(snr, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constellation_metric() {
        let cnst = Constellation::new(ModulationScheme::Qpsk);
        let clean = cnst.map_bits(&[0, 1, 1, 0]);
        assert_eq!(constellation_metric(&clean, ModulationScheme::Qpsk), 0.0);
        let off = vec![clean[0] + Complex::new(0.1, 0.0)];
        assert!(constellation_metric(&off, ModulationScheme::Qpsk) > 0.0);
    }
}
