//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via tracing; session and request ids flow as fields
//! - Lifecycle counters are plain atomics, exporters are out of scope
//! - `log.mute` silences the sink without touching call sites

pub mod logging;

pub use logging::init_logging;
