//! # Link Configuration
//!
//! YAML configuration for one end of the adaptive OFDM link:
//!
//! - Carrier plan (FFT size, cyclic prefix, data and pilot carriers, sync words)
//! - Framing (frame length, header scrambling, starvation policy)
//! - Rate adaptation (MCS table, confirmation window, SNR smoothing)
//! - FEC codes, present only when the link is coded
//! - Feedback modem, logging and debug frame stores
//!
//! A [`LinkConfig`] is plain data. [`LinkConfig::validate`] checks it once and
//! produces a [`ValidatedLink`], which owns the loaded FEC codebook and the
//! header codec and builds the per-link components. Malformed configuration
//! is rejected there; nothing downstream re-checks it.
//!
//! ## Configuration Search Path
//!
//! [`LinkConfig::load`] reads the first file found:
//! 1. Path in the `OFDM_LINK_CONFIG` environment variable
//! 2. `./ofdm-link.yaml`
//!
//! ## Example Configuration
//!
//! ```yaml
//! link:
//!   fft_len: 64
//!   cp_len: 16
//!   frame_symbols: 4
//!   max_empty_frames: 20
//!   confirm_window: 3
//!   initial_scheme: bpsk
//!   mcs_table:
//!     - { snr_threshold_db: -.inf, scheme: bpsk, fec: 1 }
//!     - { snr_threshold_db: 13.0, scheme: qpsk, fec: 1 }
//!     - { snr_threshold_db: 18.0, scheme: qpsk, fec: 2 }
//!
//! fec:
//!   codes:
//!     - { id: 1, alist: "builtin:ldpc_n96_r12" }
//!     - { id: 2, alist: "/etc/ofdm-link/n192_r34.alist", max_iterations: 30 }
//!   decode_failure: pass_flagged
//! ```

use crate::additive_scrambler::AdditiveScrambler;
use crate::decision::{DecisionEngine, SharedAdaptation};
use crate::feedback::FeedbackModemConfig;
use crate::fec::{FecCodeConfig, FecCodebook};
use crate::frame_buffer::{
    DecodeFailurePolicy, Deframer, FecDeframer, FecFrameBuffer, FrameBuffer, FramePlan, PlainDeframer,
    PlainFrameBuffer,
};
use crate::header::{HeaderCodec, MAX_PAYLOAD_SYMBOLS};
use crate::mcs::{McsSelection, McsTable};
use crate::modulation::ModulationScheme;
use crate::observe::LogConfig;
use crate::snr_estimator::{SnrEstimator, DEFAULT_ALPHA};
use crate::types::{Complex, LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "OFDM_LINK_CONFIG";

/// Largest frame length the 4-bit header field can carry
pub const MAX_FRAME_SYMBOLS: u8 = 15;

/// Parameters shared by the coded and uncoded link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParameters {
    pub fft_len: usize,
    /// Cyclic prefix in samples
    pub cp_len: usize,
    /// Data carriers, signed indices around DC
    pub occupied_carriers: Vec<i32>,
    pub pilot_carriers: Vec<i32>,
    /// Frequency-domain preamble symbols, each `fft_len` long. Empty means
    /// the defaults generated for the carrier plan.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sync_words: Vec<Vec<Complex>>,
    /// Payload OFDM symbols per frame, 1 to 15
    pub frame_symbols: u8,
    pub scramble_header: bool,
    /// Consecutive empty frames before the stop condition; `None` never stops
    pub max_empty_frames: Option<u32>,
    pub mcs_table: McsTable,
    /// Consistent observations needed (exclusive) before one MCS step
    pub confirm_window: u32,
    /// Extra SNR (dB) required before a higher entry counts as a target
    pub up_margin_db: f64,
    /// SNR smoothing constant, in (0, 1]
    pub snr_alpha: f64,
    pub initial_scheme: ModulationScheme,
}

impl Default for LinkParameters {
    fn default() -> Self {
        Self {
            fft_len: 64,
            cp_len: 16,
            occupied_carriers: default_occupied_carriers(),
            pilot_carriers: vec![-21, -7, 7, 21],
            sync_words: Vec::new(),
            frame_symbols: 4,
            scramble_header: true,
            max_empty_frames: None,
            mcs_table: McsTable::default(),
            confirm_window: 3,
            up_margin_db: 0.0,
            snr_alpha: DEFAULT_ALPHA,
            initial_scheme: ModulationScheme::Bpsk,
        }
    }
}

/// 48 data carriers of the 802.11a-style 64-point plan.
fn default_occupied_carriers() -> Vec<i32> {
    (-26..=26)
        .filter(|c| *c != 0 && ![-21, -7, 7, 21].contains(c))
        .collect()
}

/// Parameters present only on a coded link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FecParameters {
    pub codes: Vec<FecCodeConfig>,
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for FecParameters {
    fn default() -> Self {
        Self {
            codes: vec![
                FecCodeConfig::builtin(1, "ldpc_n96_r12"),
                FecCodeConfig::builtin(2, "ldpc_n192_r34"),
            ],
            decode_failure: DecodeFailurePolicy::Drop,
        }
    }
}

/// Coding mode of a link, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum FecMode {
    NoFec,
    Fec(FecParameters),
}

impl FecMode {
    pub fn is_fec(&self) -> bool {
        matches!(self, FecMode::Fec(_))
    }

    pub fn parameters(&self) -> Option<&FecParameters> {
        match self {
            FecMode::NoFec => None,
            FecMode::Fec(params) => Some(params),
        }
    }
}

impl From<Option<FecParameters>> for FecMode {
    fn from(fec: Option<FecParameters>) -> Self {
        fec.map_or(FecMode::NoFec, FecMode::Fec)
    }
}

/// Feedback side channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub modem: FeedbackModemConfig,
    /// Pending messages kept before the oldest is dropped
    pub queue_capacity: usize,
    /// Re-send an unchanged decision every this many decisions
    pub refresh_interval: Option<u32>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            modem: FeedbackModemConfig::default(),
            queue_capacity: 4,
            refresh_interval: None,
        }
    }
}

/// Debug frame-store dumps (uncoded link only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub tx_frame_store: Option<PathBuf>,
    pub rx_frame_store: Option<PathBuf>,
}

/// Complete configuration of one link end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub link: LinkParameters,
    /// Present when the link is coded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fec: Option<FecParameters>,
    pub feedback: FeedbackConfig,
    pub logging: LogConfig,
    pub debug: DebugConfig,
}

impl LinkConfig {
    /// Load from the search path, or defaults if no file exists.
    pub fn load() -> LinkResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }
        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> LinkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> LinkResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LinkError::ConfigParse(e.to_string()))
    }

    pub fn to_yaml(&self) -> LinkResult<String> {
        serde_yaml::to_string(self).map_err(|e| LinkError::ConfigParse(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> LinkResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Files tried after the environment variable.
    pub fn config_search_paths() -> Vec<PathBuf> {
        vec![PathBuf::from("./ofdm-link.yaml")]
    }

    pub fn mode(&self) -> FecMode {
        FecMode::from(self.fec.clone())
    }

    /// Check everything and load the FEC codes.
    pub fn validate(&self) -> LinkResult<ValidatedLink> {
        let p = &self.link;

        if p.fft_len < 8 || !p.fft_len.is_power_of_two() {
            return Err(LinkError::InvalidConfig(format!(
                "fft_len {} must be a power of two of at least 8",
                p.fft_len
            )));
        }
        if p.cp_len >= p.fft_len {
            return Err(LinkError::InvalidConfig(format!(
                "cyclic prefix {} not shorter than FFT length {}",
                p.cp_len, p.fft_len
            )));
        }
        check_carriers(p)?;

        let sync_words = if p.sync_words.is_empty() {
            default_sync_words(p.fft_len, &p.occupied_carriers)
        } else {
            p.sync_words.clone()
        };
        for (index, word) in sync_words.iter().enumerate() {
            if word.len() != p.fft_len {
                return Err(LinkError::SyncWordLength {
                    index,
                    actual: word.len(),
                    fft_len: p.fft_len,
                });
            }
        }

        if p.frame_symbols == 0 || p.frame_symbols > MAX_FRAME_SYMBOLS {
            return Err(LinkError::InvalidConfig(format!(
                "frame_symbols {} outside 1..={}",
                p.frame_symbols, MAX_FRAME_SYMBOLS
            )));
        }
        let plan = FramePlan::new(p.occupied_carriers.len(), p.frame_symbols);
        if plan.capacity_symbols() > MAX_PAYLOAD_SYMBOLS {
            return Err(LinkError::InvalidConfig(format!(
                "{} payload symbols per frame exceed the header limit of {}",
                plan.capacity_symbols(),
                MAX_PAYLOAD_SYMBOLS
            )));
        }

        if !(p.snr_alpha > 0.0 && p.snr_alpha <= 1.0) {
            return Err(LinkError::InvalidConfig(format!(
                "snr_alpha {} outside (0, 1]",
                p.snr_alpha
            )));
        }
        if !(p.up_margin_db >= 0.0) {
            return Err(LinkError::InvalidConfig(format!(
                "up_margin_db {} is negative",
                p.up_margin_db
            )));
        }

        let mode = self.mode();
        let codebook = match &mode {
            FecMode::NoFec => {
                if let Some(entry) = p.mcs_table.entries().iter().find(|e| e.fec.is_some()) {
                    return Err(LinkError::InvalidMcsTable(format!(
                        "entry {} references FEC but the link is uncoded",
                        entry.selection()
                    )));
                }
                FecCodebook::new()
            }
            FecMode::Fec(params) => {
                let codebook = FecCodebook::from_configs(&params.codes)?;
                if codebook.is_empty() {
                    return Err(LinkError::InvalidConfig("FEC enabled without any codes".into()));
                }
                for entry in p.mcs_table.entries() {
                    match entry.fec {
                        None => {
                            return Err(LinkError::InvalidMcsTable(format!(
                                "entry {} is uncoded but the link uses FEC",
                                entry.selection()
                            )))
                        }
                        Some(id) if !codebook.contains(id) => return Err(LinkError::UnknownFecCode(id)),
                        Some(_) => {}
                    }
                }
                codebook
            }
        };

        let initial_index = p.mcs_table.index_of_scheme(p.initial_scheme).ok_or_else(|| {
            LinkError::InvalidConfig(format!("initial scheme {} is not in the MCS table", p.initial_scheme))
        })?;

        let header = HeaderCodec::new(plan.data_carriers, mode.is_fec(), p.scramble_header)?;

        self.feedback.modem.validate()?;
        if self.feedback.queue_capacity == 0 {
            return Err(LinkError::InvalidConfig("feedback queue capacity must be non-zero".into()));
        }
        if mode.is_fec() && (self.debug.tx_frame_store.is_some() || self.debug.rx_frame_store.is_some()) {
            return Err(LinkError::InvalidConfig(
                "frame stores are only written on an uncoded link".into(),
            ));
        }

        debug!(
            fft_len = p.fft_len,
            data_carriers = plan.data_carriers,
            frame_symbols = p.frame_symbols,
            fec = mode.is_fec(),
            codes = codebook.len(),
            "link configuration validated"
        );

        Ok(ValidatedLink {
            params: p.clone(),
            mode,
            codebook,
            plan,
            header,
            sync_words,
            initial_index,
            feedback: self.feedback.clone(),
            debug: self.debug.clone(),
        })
    }

    /// Example coded configuration as YAML.
    pub fn example_yaml() -> String {
        let mut config = Self::default();
        config.link.max_empty_frames = Some(20);
        config.link.mcs_table = McsTable::new(vec![
            crate::mcs::McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk).with_fec(1),
            crate::mcs::McsEntry::new(13.0, ModulationScheme::Qpsk).with_fec(1),
            crate::mcs::McsEntry::new(18.0, ModulationScheme::Qpsk).with_fec(2),
            crate::mcs::McsEntry::new(23.0, ModulationScheme::Qam16).with_fec(2),
        ])
        .unwrap_or_default();
        config.fec = Some(FecParameters::default());
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

fn check_carriers(p: &LinkParameters) -> LinkResult<()> {
    if p.occupied_carriers.is_empty() {
        return Err(LinkError::InvalidConfig("no occupied carriers".into()));
    }
    let half = (p.fft_len / 2) as i32;
    let mut seen = HashSet::new();
    for &c in p.occupied_carriers.iter().chain(&p.pilot_carriers) {
        if c < -half || c >= half {
            return Err(LinkError::InvalidConfig(format!(
                "carrier {} outside FFT of {} bins",
                c, p.fft_len
            )));
        }
        if !seen.insert(c) {
            return Err(LinkError::InvalidConfig(format!(
                "carrier {} listed twice or used as both data and pilot",
                c
            )));
        }
    }
    Ok(())
}

/// FFT bin of a signed carrier index.
fn carrier_bin(carrier: i32, fft_len: usize) -> usize {
    carrier.rem_euclid(fft_len as i32) as usize
}

/// Two preamble symbols: a half-band word with energy on even carriers
/// (coarse timing) and a full-band BPSK word (channel estimate).
pub fn default_sync_words(fft_len: usize, occupied: &[i32]) -> Vec<Vec<Complex>> {
    let signs = AdditiveScrambler::new(7, 0x48, 0x5B).mask_bits(2 * occupied.len());
    let sign = |b: u8| if b == 0 { 1.0 } else { -1.0 };

    let mut timing = vec![Complex::new(0.0, 0.0); fft_len];
    let mut channel = vec![Complex::new(0.0, 0.0); fft_len];
    for (i, &c) in occupied.iter().enumerate() {
        let bin = carrier_bin(c, fft_len);
        if c.rem_euclid(2) == 0 {
            timing[bin] = Complex::new(sign(signs[i]) * std::f64::consts::SQRT_2, 0.0);
        }
        channel[bin] = Complex::new(sign(signs[occupied.len() + i]), 0.0);
    }
    vec![timing, channel]
}

/// Checked configuration with its codes loaded. Builds link components.
#[derive(Debug, Clone)]
pub struct ValidatedLink {
    params: LinkParameters,
    mode: FecMode,
    codebook: FecCodebook,
    plan: FramePlan,
    header: HeaderCodec,
    sync_words: Vec<Vec<Complex>>,
    initial_index: usize,
    feedback: FeedbackConfig,
    debug: DebugConfig,
}

impl ValidatedLink {
    pub fn params(&self) -> &LinkParameters {
        &self.params
    }

    pub fn mode(&self) -> &FecMode {
        &self.mode
    }

    /// Loaded codes; empty on an uncoded link.
    pub fn codebook(&self) -> &FecCodebook {
        &self.codebook
    }

    pub fn frame_plan(&self) -> FramePlan {
        self.plan
    }

    pub fn header_codec(&self) -> &HeaderCodec {
        &self.header
    }

    pub fn sync_words(&self) -> &[Vec<Complex>] {
        &self.sync_words
    }

    pub fn feedback(&self) -> &FeedbackConfig {
        &self.feedback
    }

    /// Samples per OFDM symbol including the cyclic prefix.
    pub fn symbol_samples(&self) -> usize {
        self.params.fft_len + self.params.cp_len
    }

    pub fn initial_index(&self) -> usize {
        self.initial_index
    }

    pub fn initial_selection(&self) -> McsSelection {
        self.params.mcs_table.entries()[self.initial_index].selection()
    }

    pub fn snr_estimator(&self) -> SnrEstimator {
        SnrEstimator::new(self.params.snr_alpha)
    }

    pub fn decision_engine(&self) -> LinkResult<DecisionEngine> {
        Ok(
            DecisionEngine::new(self.params.mcs_table.clone(), self.params.confirm_window, self.initial_index)?
                .with_up_margin(self.params.up_margin_db)
                .with_feedback_refresh(self.feedback.refresh_interval),
        )
    }

    /// Transmit-side selection slot, seeded with the initial entry.
    pub fn shared_adaptation(&self) -> SharedAdaptation {
        SharedAdaptation::new(self.initial_selection())
    }

    /// Transmit strategy for this link's coding mode.
    pub fn frame_buffer(&self) -> LinkResult<Box<dyn FrameBuffer>> {
        match &self.mode {
            FecMode::NoFec => {
                let mut buffer = PlainFrameBuffer::new(self.plan, self.params.max_empty_frames)?;
                if let Some(path) = &self.debug.tx_frame_store {
                    buffer = buffer.with_store(BufWriter::new(File::create(path)?));
                }
                Ok(Box::new(buffer))
            }
            FecMode::Fec(_) => Ok(Box::new(FecFrameBuffer::new(
                self.plan,
                self.codebook.clone(),
                self.params.max_empty_frames,
            )?)),
        }
    }

    /// Receive strategy for this link's coding mode.
    pub fn deframer(&self) -> LinkResult<Box<dyn Deframer>> {
        match &self.mode {
            FecMode::NoFec => {
                let mut deframer = PlainDeframer::new();
                if let Some(path) = &self.debug.rx_frame_store {
                    deframer = deframer.with_store(BufWriter::new(File::create(path)?));
                }
                Ok(Box::new(deframer))
            }
            FecMode::Fec(params) => Ok(Box::new(FecDeframer::new(
                self.plan,
                self.codebook.clone(),
                params.decode_failure,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcs::McsEntry;

    fn coded_table() -> McsTable {
        McsTable::new(vec![
            McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk).with_fec(1),
            McsEntry::new(15.0, ModulationScheme::Qpsk).with_fec(2),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.link.fft_len, 64);
        assert_eq!(config.link.occupied_carriers.len(), 48);
        assert!(config.fec.is_none());
        assert_eq!(config.link.max_empty_frames, None);

        let link = config.validate().unwrap();
        assert_eq!(*link.mode(), FecMode::NoFec);
        assert_eq!(link.frame_plan().capacity_symbols(), 192);
        assert_eq!(link.header_codec().header_symbols(), 1);
        assert_eq!(link.sync_words().len(), 2);
        assert_eq!(link.symbol_samples(), 80);
        assert_eq!(link.initial_selection(), McsSelection::uncoded(ModulationScheme::Bpsk));
    }

    #[test]
    fn test_default_sync_words() {
        let params = LinkParameters::default();
        let words = default_sync_words(64, &params.occupied_carriers);
        assert_eq!(words[0].len(), 64);
        // Timing word only uses even carriers
        let odd_energy: f64 = params
            .occupied_carriers
            .iter()
            .filter(|c| c.rem_euclid(2) == 1)
            .map(|&c| words[0][carrier_bin(c, 64)].norm_sqr())
            .sum();
        assert_eq!(odd_energy, 0.0);
        assert!(words[1][0].norm() == 0.0, "DC stays empty");
        assert!(words[1].iter().filter(|s| s.norm() > 0.0).count() == 48);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
link:
  frame_symbols: 6
  scramble_header: false
  max_empty_frames: 10
  confirm_window: 2
  initial_scheme: qpsk
  mcs_table:
    - { snr_threshold_db: -.inf, scheme: bpsk, fec: 1 }
    - { snr_threshold_db: 12.5, scheme: qpsk, fec: 1 }
    - { snr_threshold_db: 20.0, scheme: 8psk, fec: 2 }

fec:
  codes:
    - { id: 1, alist: "builtin:ldpc_n96_r12" }
    - { id: 2, alist: "builtin:ldpc_n192_r34", max_iterations: 20 }
  decode_failure: pass_flagged

feedback:
  queue_capacity: 8
  modem:
    access_code_threshold: 2

logging:
  level: debug
"#;
        let config = LinkConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.link.frame_symbols, 6);
        assert!(!config.link.scramble_header);
        assert_eq!(config.link.max_empty_frames, Some(10));
        assert_eq!(config.link.mcs_table.len(), 3);
        assert_eq!(config.link.mcs_table.entries()[0].snr_threshold_db, f64::NEG_INFINITY);
        assert_eq!(config.link.mcs_table.entries()[2].scheme, ModulationScheme::Psk8);
        assert_eq!(config.feedback.queue_capacity, 8);
        assert_eq!(config.feedback.modem.access_code_threshold, 2);
        assert_eq!(config.feedback.modem.samples_per_symbol, 2);

        let fec = config.fec.as_ref().unwrap();
        assert_eq!(fec.decode_failure, DecodeFailurePolicy::PassFlagged);
        assert_eq!(fec.codes[1].max_iterations, 20);

        let link = config.validate().unwrap();
        assert!(link.mode().is_fec());
        assert_eq!(link.codebook().len(), 2);
        assert_eq!(link.header_codec().header_symbols(), 2);
        assert_eq!(link.initial_index(), 1);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = LinkConfig::from_yaml_str("link:\n  cp_len: 8\n").unwrap();
        assert_eq!(config.link.cp_len, 8);
        assert_eq!(config.link.fft_len, 64);
        assert_eq!(config.link.confirm_window, 3);
        assert_eq!(config.feedback.queue_capacity, 4);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            LinkConfig::from_yaml_str("link: [1, 2"),
            Err(LinkError::ConfigParse(_))
        ));
        let descending = "link:\n  mcs_table:\n    - { snr_threshold_db: 10, scheme: bpsk }\n    - { snr_threshold_db: 5, scheme: qpsk }\n";
        assert!(matches!(
            LinkConfig::from_yaml_str(descending),
            Err(LinkError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_sync_word_mismatch() {
        let mut config = LinkConfig::default();
        config.link.sync_words = vec![vec![Complex::new(1.0, 0.0); 64], vec![Complex::new(1.0, 0.0); 32]];
        match config.validate() {
            Err(LinkError::SyncWordLength { index, actual, fft_len }) => {
                assert_eq!((index, actual, fft_len), (1, 32, 64));
            }
            other => panic!("expected sync word error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let mut config = LinkConfig::default();
        assert!(config.validate().is_ok());

        config.link.occupied_carriers.push(-21);
        assert!(config.validate().is_err(), "data carrier on a pilot");

        config = LinkConfig::default();
        config.link.pilot_carriers.push(32);
        assert!(config.validate().is_err(), "carrier outside FFT");

        config = LinkConfig::default();
        config.link.cp_len = 64;
        assert!(config.validate().is_err());

        config = LinkConfig::default();
        config.link.frame_symbols = 16;
        assert!(config.validate().is_err());

        config = LinkConfig::default();
        config.link.snr_alpha = 0.0;
        assert!(config.validate().is_err());
        config.link.snr_alpha = 1.0;
        assert!(config.validate().is_ok());

        config = LinkConfig::default();
        config.link.initial_scheme = ModulationScheme::Qam16;
        config.link.mcs_table = McsTable::new(vec![McsEntry::new(0.0, ModulationScheme::Bpsk)]).unwrap();
        assert!(config.validate().is_err());

        config = LinkConfig::default();
        config.feedback.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_payload_symbols_limit() {
        let mut config = LinkConfig::default();
        config.link.fft_len = 512;
        config.link.occupied_carriers = (-250..250).filter(|c| *c != 0).collect();
        config.link.pilot_carriers.clear();
        config.link.frame_symbols = 9;
        // 499 carriers x 9 symbols > 4095
        assert!(config.validate().is_err());
        config.link.frame_symbols = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_header_capacity_error() {
        let mut config = LinkConfig::default();
        config.link.occupied_carriers = (-20..=20).filter(|c| *c != 0).collect();
        config.link.pilot_carriers.clear();
        assert!(matches!(
            config.validate(),
            Err(LinkError::HeaderCapacity { required: 48, available: 40 })
        ));
    }

    #[test]
    fn test_fec_mode_rules() {
        let mut config = LinkConfig::default();
        config.link.mcs_table = coded_table();
        assert!(
            matches!(config.validate(), Err(LinkError::InvalidMcsTable(_))),
            "coded entries on an uncoded link"
        );

        config.fec = Some(FecParameters::default());
        let link = config.validate().unwrap();
        assert_eq!(
            link.initial_selection(),
            McsSelection::new(ModulationScheme::Bpsk, Some(1))
        );

        config.fec = Some(FecParameters {
            codes: vec![FecCodeConfig::builtin(1, "ldpc_n96_r12")],
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(LinkError::UnknownFecCode(2))));

        config.fec = Some(FecParameters::default());
        config.link.mcs_table = McsTable::uncoded_ladder();
        assert!(matches!(config.validate(), Err(LinkError::InvalidMcsTable(_))));

        config.link.mcs_table = coded_table();
        config.debug.rx_frame_store = Some(PathBuf::from("rx.bin"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fec_mode_from_option() {
        assert_eq!(FecMode::from(None), FecMode::NoFec);
        let mode = FecMode::from(Some(FecParameters::default()));
        assert!(mode.is_fec());
        assert_eq!(mode.parameters().unwrap().codes.len(), 2);
    }

    #[test]
    fn test_builds_strategies() {
        let mut config = LinkConfig::default();
        let link = config.validate().unwrap();
        assert!(link.frame_buffer().is_ok());
        assert!(link.deframer().is_ok());
        assert_eq!(link.decision_engine().unwrap().state().current_index, 0);

        config.link.mcs_table = coded_table();
        config.fec = Some(FecParameters::default());
        let link = config.validate().unwrap();
        let mut buffer = link.frame_buffer().unwrap();
        buffer.push_bytes(&[0xA5; 10]);
        let frame = buffer.next_frame(link.initial_selection()).unwrap().unwrap();
        assert!(frame.header.fec.is_some());
        assert_eq!(frame.bits.len(), link.frame_plan().capacity_bits(ModulationScheme::Bpsk));
    }

    #[test]
    fn test_example_yaml() {
        let yaml = LinkConfig::example_yaml();
        assert!(yaml.contains("link:"));
        assert!(yaml.contains("fec:"));
        let parsed = LinkConfig::from_yaml_str(&yaml).unwrap();
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = LinkConfig::default();
        config.link.max_empty_frames = Some(7);
        config.fec = Some(FecParameters::default());
        config.link.mcs_table = coded_table();
        let yaml = config.to_yaml().unwrap();
        let parsed = LinkConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load_from() {
        let path = std::env::temp_dir().join(format!("ofdm-link-config-{}.yaml", std::process::id()));
        let mut config = LinkConfig::default();
        config.link.confirm_window = 5;
        config.save(&path).unwrap();
        let loaded = LinkConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.link.confirm_window, 5);
        assert!(matches!(
            LinkConfig::load_from(Path::new("/nonexistent/ofdm-link.yaml")),
            Err(LinkError::Io(_))
        ));
    }

    #[test]
    fn test_config_search_paths() {
        let paths = LinkConfig::config_search_paths();
        assert!(!paths.is_empty());
        assert!(paths[0].ends_with("ofdm-link.yaml"));
    }
}
