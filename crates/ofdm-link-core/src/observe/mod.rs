//! # Observability
//!
//! Structured logging for the link core. Components emit `tracing` events
//! with key/value fields:
//!
//! | level | event |
//! |-------|-------|
//! | `trace` | frame built, feedback burst modulated, feedback queue overflow |
//! | `debug` | decision held, header or payload CRC drop, feedback burst decoded or dropped, FEC code loaded, config validated |
//! | `info`  | MCS step committed, transmit MCS changed by feedback, starvation stop |
//! | `warn`  | LDPC decode failure, unusable feedback |
//!
//! ```rust,no_run
//! use ofdm_link_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
