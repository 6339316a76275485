//! alist parity-check matrix reader.
//!
//! The MacKay alist layout:
//!
//! ```text
//! n m
//! max_col_weight max_row_weight
//! <n column weights>
//! <m row weights>
//! <n lines: 1-based row indices of each column, 0-padded>
//! <m lines: 1-based column indices of each row, 0-padded>
//! ```
//!
//! Both adjacency halves are read and must agree.

use super::ldpc::SparseParityCheck;
use crate::types::{LinkError, LinkResult};
use std::path::Path;

/// Parse alist text into a parity-check matrix.
pub fn parse_alist(text: &str) -> LinkResult<SparseParityCheck> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let mut next_line = |what: &str| -> LinkResult<(usize, Vec<usize>)> {
        let (line, content) = lines.next().ok_or_else(|| LinkError::Alist {
            line: 0,
            message: format!("unexpected end of file reading {}", what),
        })?;
        let values = content
            .split_whitespace()
            .map(|tok| {
                tok.parse::<usize>().map_err(|_| LinkError::Alist {
                    line,
                    message: format!("'{}' is not a non-negative integer", tok),
                })
            })
            .collect::<LinkResult<Vec<_>>>()?;
        Ok((line, values))
    };

    let (line, dims) = next_line("dimensions")?;
    let (n, m) = match dims.as_slice() {
        [n, m] if *n > 0 && *m > 0 => (*n, *m),
        _ => {
            return Err(LinkError::Alist {
                line,
                message: "expected two positive integers 'n m'".into(),
            })
        }
    };
    next_line("maximum weights")?;
    let (line, col_weights) = next_line("column weights")?;
    expect_len(line, &col_weights, n, "column weights")?;
    let (line, row_weights) = next_line("row weights")?;
    expect_len(line, &row_weights, m, "row weights")?;

    let mut var_to_check = Vec::with_capacity(n);
    for (col, &weight) in col_weights.iter().enumerate() {
        let (line, entries) = next_line("column adjacency")?;
        let rows = one_based(line, &entries, m)?;
        if rows.len() != weight {
            return Err(LinkError::Alist {
                line,
                message: format!("column {} lists {} rows, weight is {}", col + 1, rows.len(), weight),
            });
        }
        var_to_check.push(rows);
    }

    let mut check_to_var = Vec::with_capacity(m);
    for (row, &weight) in row_weights.iter().enumerate() {
        let (line, entries) = next_line("row adjacency")?;
        let cols = one_based(line, &entries, n)?;
        if cols.len() != weight {
            return Err(LinkError::Alist {
                line,
                message: format!("row {} lists {} columns, weight is {}", row + 1, cols.len(), weight),
            });
        }
        check_to_var.push(cols);
    }

    for (col, rows) in var_to_check.iter().enumerate() {
        for &row in rows {
            if !check_to_var[row].contains(&col) {
                return Err(LinkError::Alist {
                    line: 0,
                    message: format!(
                        "column {} lists row {} but that row does not list the column",
                        col + 1,
                        row + 1
                    ),
                });
            }
        }
    }

    Ok(SparseParityCheck::from_adjacency(m, n, check_to_var))
}

/// Read and parse an alist file.
pub fn load_alist(path: impl AsRef<Path>) -> LinkResult<SparseParityCheck> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_alist(&text)
}

fn expect_len(line: usize, values: &[usize], len: usize, what: &str) -> LinkResult<()> {
    if values.len() != len {
        return Err(LinkError::Alist {
            line,
            message: format!("expected {} {}, found {}", len, what, values.len()),
        });
    }
    Ok(())
}

/// Strip zero padding and convert to 0-based, checking the range.
fn one_based(line: usize, entries: &[usize], limit: usize) -> LinkResult<Vec<usize>> {
    entries
        .iter()
        .filter(|&&v| v != 0)
        .map(|&v| {
            if v > limit {
                Err(LinkError::Alist {
                    line,
                    message: format!("index {} out of range 1..={}", v, limit),
                })
            } else {
                Ok(v - 1)
            }
        })
        .collect()
}
