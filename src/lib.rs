//! Signal Gate Library
//!
//! Decides whether a freshly computed token risk or liquidity observation
//! should become a user-facing alert: scores its impact, tracks recurrence,
//! drops duplicate payloads and enforces per-key cooldowns while letting
//! escalations through.

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod scoring;
pub mod signal;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{GatingResult, SignalGate};
pub use scoring::{ImpactLevel, ImpactScore, ImpactScorer};
pub use signal::{Observation, Severity, SignalFeatures, SignalKey, SignalType};
