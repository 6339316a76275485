//! FEC code registry keyed by the 4-bit id carried in headers and feedback.

use super::alist::{load_alist, parse_alist};
use super::ldpc::{DecodingAlgorithm, LdpcCode};
use crate::mcs::{FecCodeId, MAX_FEC_CODE_ID};
use crate::types::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Prefix selecting a code compiled into the crate instead of a file
pub const BUILTIN_PREFIX: &str = "builtin:";

/// Codes shipped with the crate: (name, alist text)
pub const BUILTIN_CODES: [(&str, &str); 2] = [
    ("ldpc_n96_r12", include_str!("../../codes/ldpc_n96_r12.alist")),
    ("ldpc_n192_r34", include_str!("../../codes/ldpc_n192_r34.alist")),
];

/// One configured code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FecCodeConfig {
    /// Wire id, 1 to 14
    pub id: FecCodeId,
    /// alist file path, or `builtin:<name>`
    pub alist: String,
    pub max_iterations: usize,
    pub algorithm: DecodingAlgorithm,
}

impl FecCodeConfig {
    pub fn builtin(id: FecCodeId, name: &str) -> Self {
        Self {
            id,
            alist: format!("{}{}", BUILTIN_PREFIX, name),
            ..Self::default()
        }
    }
}

impl Default for FecCodeConfig {
    fn default() -> Self {
        Self {
            id: 1,
            alist: format!("{}{}", BUILTIN_PREFIX, BUILTIN_CODES[0].0),
            max_iterations: 50,
            algorithm: DecodingAlgorithm::default(),
        }
    }
}

/// Loaded codes, shared read-only between Tx and Rx.
#[derive(Debug, Clone, Default)]
pub struct FecCodebook {
    codes: BTreeMap<FecCodeId, Arc<LdpcCode>>,
}

impl FecCodebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured code. Fails on a bad id, a duplicate id, or an
    /// unreadable or malformed alist.
    pub fn from_configs(configs: &[FecCodeConfig]) -> LinkResult<Self> {
        let mut book = Self::new();
        for cfg in configs {
            let h = match cfg.alist.strip_prefix(BUILTIN_PREFIX) {
                Some(name) => {
                    let (_, text) = BUILTIN_CODES
                        .iter()
                        .find(|(n, _)| *n == name)
                        .ok_or_else(|| LinkError::InvalidConfig(format!("no builtin FEC code named '{}'", name)))?;
                    parse_alist(text)?
                }
                None => load_alist(&cfg.alist)?,
            };
            let code = LdpcCode::new(h, cfg.algorithm, cfg.max_iterations)?;
            debug!(id = cfg.id, source = %cfg.alist, n = code.n(), k = code.k(), "loaded FEC code");
            book.insert(cfg.id, code)?;
        }
        Ok(book)
    }

    /// Register `code` under `id`.
    pub fn insert(&mut self, id: FecCodeId, code: LdpcCode) -> LinkResult<()> {
        if id == 0 || id > MAX_FEC_CODE_ID {
            return Err(LinkError::InvalidConfig(format!(
                "FEC code id {} outside 1..={}",
                id, MAX_FEC_CODE_ID
            )));
        }
        if self.codes.contains_key(&id) {
            return Err(LinkError::InvalidConfig(format!("duplicate FEC code id {}", id)));
        }
        self.codes.insert(id, Arc::new(code));
        Ok(())
    }

    pub fn get(&self, id: FecCodeId) -> LinkResult<&Arc<LdpcCode>> {
        self.codes.get(&id).ok_or(LinkError::UnknownFecCode(id))
    }

    pub fn contains(&self, id: FecCodeId) -> bool {
        self.codes.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = FecCodeId> + '_ {
        self.codes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_builtin() -> Vec<FecCodeConfig> {
        vec![
            FecCodeConfig::builtin(1, "ldpc_n96_r12"),
            FecCodeConfig::builtin(2, "ldpc_n192_r34"),
        ]
    }

    #[test]
    fn test_load_builtin() {
        let book = FecCodebook::from_configs(&both_builtin()).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(1).unwrap().k(), 48);
        assert_eq!(book.get(2).unwrap().n(), 192);
        assert_eq!(book.ids().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_unknown_id() {
        let book = FecCodebook::from_configs(&both_builtin()).unwrap();
        assert!(matches!(book.get(7), Err(LinkError::UnknownFecCode(7))));
        assert!(!book.contains(0));
    }

    #[test]
    fn test_rejects_bad_entries() {
        let mut dup = both_builtin();
        dup[1].id = 1;
        assert!(FecCodebook::from_configs(&dup).is_err());

        let zero = vec![FecCodeConfig::builtin(0, "ldpc_n96_r12")];
        assert!(FecCodebook::from_configs(&zero).is_err());

        let wide = vec![FecCodeConfig::builtin(15, "ldpc_n96_r12")];
        assert!(FecCodebook::from_configs(&wide).is_err());

        let unknown = vec![FecCodeConfig::builtin(1, "turbo")];
        assert!(FecCodebook::from_configs(&unknown).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let cfg = FecCodeConfig {
            alist: "/nonexistent/code.alist".into(),
            ..FecCodeConfig::default()
        };
        assert!(matches!(FecCodebook::from_configs(&[cfg]), Err(LinkError::Io(_))));
    }
}
