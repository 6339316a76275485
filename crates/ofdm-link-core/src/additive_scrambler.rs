//! Additive Scrambler
//!
//! XORs a bit stream with the output of a Galois LFSR. Because the sequence
//! only depends on the seed, scrambling and descrambling are the same
//! operation, and a scrambler restarted from its seed for every frame lets
//! the receiver descramble any header it manages to detect.
//!
//! A zero seed locks the register at zero, which turns the scrambler into
//! the identity. The header codec uses this when scrambling is disabled so
//! that both paths share one code path.
//!
//! ```rust
//! use ofdm_link_core::additive_scrambler::AdditiveScrambler;
//!
//! let bits = vec![0u8, 1, 1, 0, 1, 0, 0, 0];
//! let mut tx = AdditiveScrambler::header();
//! let mut rx = AdditiveScrambler::header();
//! let scrambled = tx.process(&bits);
//! assert_eq!(rx.process(&scrambled), bits);
//!
//! let mut off = AdditiveScrambler::identity();
//! assert_eq!(off.process(&bits), bits);
//! ```

/// Galois LFSR scrambler.
#[derive(Debug, Clone)]
pub struct AdditiveScrambler {
    state: u64,
    seed: u64,
    taps: u64,
    mask: u64,
}

impl AdditiveScrambler {
    /// `nbits`-wide register with feedback `taps`, starting from `seed`.
    ///
    /// A zero seed is kept as zero and yields an all-zero sequence.
    pub fn new(nbits: u32, taps: u64, seed: u64) -> Self {
        let nbits = nbits.clamp(1, 63);
        let mask = (1u64 << nbits) - 1;
        Self {
            state: seed & mask,
            seed: seed & mask,
            taps: taps & mask,
            mask,
        }
    }

    /// Fixed-seed header scrambler: 7-bit register, taps 0x48, seed 0x7F.
    pub fn header() -> Self {
        Self::new(7, 0x48, 0x7F)
    }

    /// Zero-seed scrambler that leaves bits untouched.
    pub fn identity() -> Self {
        Self::new(7, 0x48, 0)
    }

    pub fn is_identity(&self) -> bool {
        self.seed == 0
    }

    #[inline]
    fn next_bit(&mut self) -> u8 {
        let output = (self.state & 1) as u8;
        self.state >>= 1;
        if output != 0 {
            self.state ^= self.taps;
        }
        self.state &= self.mask;
        output
    }

    /// Scramble (or descramble) one bit.
    #[inline]
    pub fn process_bit(&mut self, bit: u8) -> u8 {
        (bit & 1) ^ self.next_bit()
    }

    pub fn process(&mut self, input: &[u8]) -> Vec<u8> {
        input.iter().map(|&b| self.process_bit(b)).collect()
    }

    pub fn process_inplace(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            *b = self.process_bit(*b);
        }
    }

    /// The first `len` mask bits from the seed, without disturbing `self`.
    pub fn mask_bits(&self, len: usize) -> Vec<u8> {
        let mut fresh = self.clone();
        fresh.reset();
        (0..len).map(|_| fresh.next_bit()).collect()
    }

    /// Restart from the seed.
    pub fn reset(&mut self) {
        self.state = self.seed;
    }
}
