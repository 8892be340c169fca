//! Signal identity, severity and detector feature records

pub mod features;
pub mod types;

pub use features::{LiquidityFeatures, Observation, RiskFeatures, SignalFeatures};
pub use types::{Severity, SignalKey, SignalType};
