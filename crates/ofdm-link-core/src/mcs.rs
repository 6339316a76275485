//! # MCS Table
//!
//! Static mapping from an SNR estimate to a candidate modulation and coding
//! scheme. Entries are ordered by strictly increasing SNR threshold; the
//! lookup picks the entry with the greatest threshold not above the
//! measurement, or the lowest entry when none qualifies.
//!
//! ```rust
//! use ofdm_link_core::mcs::{McsEntry, McsTable};
//! use ofdm_link_core::modulation::ModulationScheme;
//!
//! let table = McsTable::new(vec![
//!     McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk),
//!     McsEntry::new(13.0, ModulationScheme::Qpsk),
//!     McsEntry::new(18.0, ModulationScheme::Psk8),
//!     McsEntry::new(23.0, ModulationScheme::Qam16),
//! ])
//! .unwrap();
//!
//! assert_eq!(table.lookup(12.9), 0);
//! assert_eq!(table.lookup(13.0), 1);
//! assert_eq!(table.lookup(22.99), 2);
//! assert_eq!(table.lookup(40.0), 3);
//! ```

use crate::modulation::ModulationScheme;
use crate::types::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};

/// FEC code identifier. On the wire, 0 means "no FEC".
pub type FecCodeId = u8;

/// Largest FEC id the 4-bit header field can carry
pub const MAX_FEC_CODE_ID: FecCodeId = 14;

/// A (modulation, FEC code) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct McsSelection {
    pub scheme: ModulationScheme,
    /// `None` when the entry is uncoded
    #[serde(default)]
    pub fec: Option<FecCodeId>,
}

impl McsSelection {
    pub fn new(scheme: ModulationScheme, fec: Option<FecCodeId>) -> Self {
        Self { scheme, fec }
    }

    pub fn uncoded(scheme: ModulationScheme) -> Self {
        Self { scheme, fec: None }
    }

    /// FEC id as carried on the wire (0 = none).
    pub fn fec_wire_id(&self) -> u8 {
        self.fec.unwrap_or(0)
    }
}

impl std::fmt::Display for McsSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.fec {
            Some(id) => write!(f, "{}+fec{}", self.scheme, id),
            None => write!(f, "{}", self.scheme),
        }
    }
}

/// One row of the MCS table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McsEntry {
    /// Minimum smoothed SNR (dB) at which this entry is a target
    pub snr_threshold_db: f64,
    pub scheme: ModulationScheme,
    #[serde(default)]
    pub fec: Option<FecCodeId>,
}

impl McsEntry {
    pub fn new(snr_threshold_db: f64, scheme: ModulationScheme) -> Self {
        Self {
            snr_threshold_db,
            scheme,
            fec: None,
        }
    }

    pub fn with_fec(mut self, fec: FecCodeId) -> Self {
        self.fec = Some(fec);
        self
    }

    pub fn selection(&self) -> McsSelection {
        McsSelection::new(self.scheme, self.fec)
    }
}

/// Validated, ascending MCS table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct McsTable {
    entries: Vec<McsEntry>,
}

impl McsTable {
    /// Validate and build a table.
    ///
    /// Fails if the table is empty, a threshold is NaN, thresholds are not
    /// strictly increasing, or an entry carries FEC id 0 or one beyond
    /// [`MAX_FEC_CODE_ID`].
    pub fn new(entries: Vec<McsEntry>) -> LinkResult<Self> {
        if entries.is_empty() {
            return Err(LinkError::InvalidMcsTable("table is empty".into()));
        }
        for (i, e) in entries.iter().enumerate() {
            if e.snr_threshold_db.is_nan() {
                return Err(LinkError::InvalidMcsTable(format!("entry {i} has a NaN threshold")));
            }
            if let Some(id) = e.fec {
                if id == 0 || id > MAX_FEC_CODE_ID {
                    return Err(LinkError::InvalidMcsTable(format!(
                        "entry {i} uses FEC id {id}, valid ids are 1..={MAX_FEC_CODE_ID}"
                    )));
                }
            }
        }
        for (i, pair) in entries.windows(2).enumerate() {
            if pair[1].snr_threshold_db <= pair[0].snr_threshold_db {
                return Err(LinkError::InvalidMcsTable(format!(
                    "thresholds must be strictly increasing: entry {} ({} dB) after entry {} ({} dB)",
                    i + 1,
                    pair[1].snr_threshold_db,
                    i,
                    pair[0].snr_threshold_db
                )));
            }
        }
        Ok(Self { entries })
    }

    /// BPSK / QPSK / 8PSK / 16QAM at -inf, 13, 18 and 23 dB, uncoded.
    pub fn uncoded_ladder() -> Self {
        Self {
            entries: vec![
                McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk),
                McsEntry::new(13.0, ModulationScheme::Qpsk),
                McsEntry::new(18.0, ModulationScheme::Psk8),
                McsEntry::new(23.0, ModulationScheme::Qam16),
            ],
        }
    }

    /// Index of the entry with the greatest threshold <= `snr_db`, or 0.
    pub fn lookup(&self, snr_db: f64) -> usize {
        self.entries
            .iter()
            .rposition(|e| snr_db >= e.snr_threshold_db)
            .unwrap_or(0)
    }

    /// Lookup that only counts a higher entry than `current` as a target
    /// once `snr_db` clears its threshold by `up_margin_db`.
    pub fn lookup_with_margin(&self, snr_db: f64, current: usize, up_margin_db: f64) -> usize {
        let target = self.lookup(snr_db);
        if target <= current || up_margin_db <= 0.0 {
            return target;
        }
        (current + 1..=target)
            .rev()
            .find(|&i| snr_db >= self.entries[i].snr_threshold_db + up_margin_db)
            .unwrap_or(current)
    }

    pub fn entry(&self, index: usize) -> Option<&McsEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[McsEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry carrying `selection`.
    pub fn index_of(&self, selection: McsSelection) -> Option<usize> {
        self.entries.iter().position(|e| e.selection() == selection)
    }

    /// First entry using `scheme`, whatever its FEC code.
    pub fn index_of_scheme(&self, scheme: ModulationScheme) -> Option<usize> {
        self.entries.iter().position(|e| e.scheme == scheme)
    }

    /// Distinct FEC ids referenced by the table.
    pub fn fec_ids(&self) -> Vec<FecCodeId> {
        let mut ids: Vec<FecCodeId> = self.entries.iter().filter_map(|e| e.fec).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl<'de> Deserialize<'de> for McsTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<McsEntry>::deserialize(deserializer)?;
        McsTable::new(entries).map_err(serde::de::Error::custom)
    }
}

impl Default for McsTable {
    fn default() -> Self {
        Self::uncoded_ladder()
    }
}
