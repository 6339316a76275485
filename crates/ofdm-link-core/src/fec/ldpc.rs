//! LDPC Codec - Low-Density Parity-Check encoder/decoder
//!
//! Any full or rank-deficient parity-check matrix is accepted. The encoder
//! is derived by Gaussian elimination over GF(2): pivot columns of the
//! reduced row echelon form carry parity, every other column carries an
//! information bit, so `k = n - rank(H)`. Decoding is iterative belief
//! propagation (sum-product or scaled min-sum) with an early syndrome check.
//!
//! Shortening zero-fills the last information positions. The encoder sends
//! them (they are part of the `n` coded bits) and the decoder pins them to
//! a known zero before iterating.
//!
//! ## Example
//!
//! ```rust
//! use ofdm_link_core::fec::{DecodingAlgorithm, LdpcCode, SparseParityCheck};
//!
//! let code = LdpcCode::new(
//!     SparseParityCheck::hamming_7_4(),
//!     DecodingAlgorithm::MinSum { scale: 0.8 },
//!     50,
//! )
//! .unwrap();
//! let info = vec![1, 0, 1, 1];
//! let codeword = code.encode(&info);
//! let llrs: Vec<f64> = codeword.iter().map(|&b| if b == 1 { -5.0 } else { 5.0 }).collect();
//! let result = code.decode(&llrs, 0);
//! assert!(result.converged);
//! assert_eq!(result.info, info);
//! ```

use crate::types::{BitStream, LinkError, LinkResult};
use serde::{Deserialize, Serialize};

/// LLR magnitude pinned on shortened positions
pub const KNOWN_BIT_LLR: f64 = 1.0e3;

/// Sparse parity-check matrix in CSR-like format.
#[derive(Debug, Clone)]
pub struct SparseParityCheck {
    /// Number of rows (check nodes).
    pub num_checks: usize,
    /// Number of columns (variable nodes / codeword length).
    pub num_vars: usize,
    /// For each check node, the indices of connected variable nodes.
    pub check_to_var: Vec<Vec<usize>>,
    /// For each variable node, the indices of connected check nodes.
    pub var_to_check: Vec<Vec<usize>>,
}

impl SparseParityCheck {
    /// Create from a dense binary matrix (row-major, `rows x cols`).
    pub fn from_dense(matrix: &[Vec<u8>]) -> Self {
        let num_checks = matrix.len();
        let num_vars = matrix.first().map_or(0, Vec::len);
        let check_to_var = matrix
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0)
                    .map(|(c, _)| c)
                    .collect()
            })
            .collect();
        Self::from_adjacency(num_checks, num_vars, check_to_var)
    }

    /// Create from per-check variable lists.
    pub fn from_adjacency(num_checks: usize, num_vars: usize, check_to_var: Vec<Vec<usize>>) -> Self {
        let mut var_to_check = vec![Vec::new(); num_vars];
        for (r, vars) in check_to_var.iter().enumerate() {
            for &c in vars {
                var_to_check[c].push(r);
            }
        }
        Self {
            num_checks,
            num_vars,
            check_to_var,
            var_to_check,
        }
    }

    /// Create a (7,4) Hamming code parity-check matrix.
    pub fn hamming_7_4() -> Self {
        // H = [1 1 1 0 1 0 0]
        //     [1 1 0 1 0 1 0]
        //     [1 0 1 1 0 0 1]
        Self::from_dense(&[
            vec![1, 1, 1, 0, 1, 0, 0],
            vec![1, 1, 0, 1, 0, 1, 0],
            vec![1, 0, 1, 1, 0, 0, 1],
        ])
    }

    /// True if `H * codeword = 0 (mod 2)`.
    pub fn is_valid(&self, codeword: &[u8]) -> bool {
        self.syndrome_weight(codeword) == 0
    }

    /// Unsatisfied check count.
    pub fn syndrome_weight(&self, codeword: &[u8]) -> usize {
        self.check_to_var
            .iter()
            .filter(|vars| {
                vars.iter()
                    .fold(0u8, |acc, &v| acc ^ codeword.get(v).copied().unwrap_or(0))
                    & 1
                    == 1
            })
            .count()
    }
}

/// Decoding algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodingAlgorithm {
    /// Sum-Product (Belief Propagation)
    SumProduct,
    /// Min-Sum with scaling factor
    MinSum { scale: f64 },
}

impl Default for DecodingAlgorithm {
    fn default() -> Self {
        DecodingAlgorithm::MinSum { scale: 0.75 }
    }
}

/// Outcome of decoding one codeword.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Information bits with shortened positions removed.
    pub info: BitStream,
    /// Whether the decoder converged (all-zero syndrome).
    pub converged: bool,
    /// Number of iterations used.
    pub iterations: usize,
}

/// One LDPC code: parity-check graph, systematic encoder and decoder.
#[derive(Debug, Clone)]
pub struct LdpcCode {
    h: SparseParityCheck,
    /// Codeword positions of the information bits, ascending
    info_cols: Vec<usize>,
    /// (parity column, information columns it sums) per pivot row
    parity_eqs: Vec<(usize, Vec<usize>)>,
    algorithm: DecodingAlgorithm,
    max_iterations: usize,
    /// Per-variable (check, slot in that check's list)
    var_edges: Vec<Vec<(usize, usize)>>,
}

impl LdpcCode {
    /// Build the encoder and decoder for `h`.
    pub fn new(h: SparseParityCheck, algorithm: DecodingAlgorithm, max_iterations: usize) -> LinkResult<Self> {
        let n = h.num_vars;
        let words = n.div_ceil(64);
        let mut rows: Vec<Vec<u64>> = h
            .check_to_var
            .iter()
            .map(|vars| {
                let mut row = vec![0u64; words];
                for &v in vars {
                    row[v / 64] ^= 1 << (v % 64);
                }
                row
            })
            .collect();
        let bit = |row: &[u64], c: usize| (row[c / 64] >> (c % 64)) & 1 == 1;

        // Eliminate from the last column down so parity lands at the tail
        let mut pivots = Vec::new();
        let mut rank = 0;
        for col in (0..n).rev() {
            if rank == rows.len() {
                break;
            }
            let Some(found) = (rank..rows.len()).find(|&r| bit(&rows[r], col)) else {
                continue;
            };
            rows.swap(rank, found);
            let pivot_row = rows[rank].clone();
            for (r, row) in rows.iter_mut().enumerate() {
                if r != rank && bit(row, col) {
                    for (w, p) in row.iter_mut().zip(&pivot_row) {
                        *w ^= p;
                    }
                }
            }
            pivots.push(col);
            rank += 1;
        }

        let mut is_pivot = vec![false; n];
        for &p in &pivots {
            is_pivot[p] = true;
        }
        let info_cols: Vec<usize> = (0..n).filter(|&c| !is_pivot[c]).collect();
        if info_cols.is_empty() {
            return Err(LinkError::InvalidConfig(format!(
                "parity-check matrix of rank {} leaves no information bits in n={}",
                rank, n
            )));
        }
        let parity_eqs = pivots
            .iter()
            .zip(&rows)
            .map(|(&p, row)| (p, info_cols.iter().copied().filter(|&c| bit(row, c)).collect()))
            .collect();

        let mut var_edges = vec![Vec::new(); n];
        for (ci, vars) in h.check_to_var.iter().enumerate() {
            for (slot, &v) in vars.iter().enumerate() {
                var_edges[v].push((ci, slot));
            }
        }

        Ok(Self {
            h,
            info_cols,
            parity_eqs,
            algorithm,
            max_iterations: max_iterations.max(1),
            var_edges,
        })
    }

    /// Coded bits per codeword.
    pub fn n(&self) -> usize {
        self.h.num_vars
    }

    /// Information bits per codeword.
    pub fn k(&self) -> usize {
        self.info_cols.len()
    }

    /// Code rate k/n.
    pub fn rate(&self) -> f64 {
        self.k() as f64 / self.n() as f64
    }

    pub fn parity_check(&self) -> &SparseParityCheck {
        &self.h
    }

    pub fn info_positions(&self) -> &[usize] {
        &self.info_cols
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Encode up to `k` information bits. Missing trailing bits are
    /// shortened (zero-filled).
    pub fn encode(&self, info: &[u8]) -> BitStream {
        debug_assert!(info.len() <= self.k());
        let mut codeword = vec![0u8; self.n()];
        for (&col, &b) in self.info_cols.iter().zip(info) {
            codeword[col] = b & 1;
        }
        for (parity, sources) in &self.parity_eqs {
            codeword[*parity] = sources.iter().fold(0u8, |acc, &c| acc ^ codeword[c]);
        }
        codeword
    }

    /// Decode from channel LLRs (positive = more likely 0). The last
    /// `shortening` information positions are known zeros.
    pub fn decode(&self, llrs: &[f64], shortening: usize) -> DecodeResult {
        let n = self.n();
        let k = self.k();
        let shortening = shortening.min(k);
        let delivered = k - shortening;

        let mut channel: Vec<f64> = (0..n).map(|v| llrs.get(v).copied().unwrap_or(0.0)).collect();
        for &col in &self.info_cols[delivered..] {
            channel[col] = KNOWN_BIT_LLR;
        }

        // Initialize variable-to-check messages with channel LLRs
        let mut v2c: Vec<Vec<f64>> = self
            .h
            .check_to_var
            .iter()
            .map(|vars| vars.iter().map(|&v| channel[v]).collect())
            .collect();
        let mut c2v: Vec<Vec<f64>> = self.h.check_to_var.iter().map(|vars| vec![0.0; vars.len()]).collect();

        let mut total_llr = channel.clone();
        let mut hard: BitStream = total_llr.iter().map(|&l| u8::from(l < 0.0)).collect();
        let mut iterations = 0;
        let mut converged = self.h.is_valid(&hard);

        while !converged && iterations < self.max_iterations {
            iterations += 1;

            // Check node update
            for (ci, incoming) in v2c.iter().enumerate() {
                let outgoing = &mut c2v[ci];
                match self.algorithm {
                    DecodingAlgorithm::SumProduct => {
                        for (i, out) in outgoing.iter_mut().enumerate() {
                            let product: f64 = incoming
                                .iter()
                                .enumerate()
                                .filter(|&(j, _)| j != i)
                                .map(|(_, &x)| (x / 2.0).tanh())
                                .product();
                            *out = 2.0 * product.clamp(-1.0 + 1e-15, 1.0 - 1e-15).atanh();
                        }
                    }
                    DecodingAlgorithm::MinSum { scale } => {
                        for (i, out) in outgoing.iter_mut().enumerate() {
                            let mut min_abs = f64::MAX;
                            let mut negative = false;
                            for (j, &x) in incoming.iter().enumerate() {
                                if j != i {
                                    negative ^= x < 0.0;
                                    min_abs = min_abs.min(x.abs());
                                }
                            }
                            let magnitude = min_abs * scale;
                            *out = if negative { -magnitude } else { magnitude };
                        }
                    }
                }
            }

            // Variable node update + total LLR
            for (v, edges) in self.var_edges.iter().enumerate() {
                total_llr[v] = channel[v] + edges.iter().map(|&(ci, slot)| c2v[ci][slot]).sum::<f64>();
                for &(ci, slot) in edges {
                    v2c[ci][slot] = total_llr[v] - c2v[ci][slot];
                }
            }

            for (h, &l) in hard.iter_mut().zip(&total_llr) {
                *h = u8::from(l < 0.0);
            }
            converged = self.h.is_valid(&hard);
        }

        DecodeResult {
            info: self.info_cols[..delivered].iter().map(|&c| hard[c]).collect(),
            converged,
            iterations,
        }
    }
}
