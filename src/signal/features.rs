//! Detector feature records and the observation wire format
//!
//! Detectors (liquidity drop checker, token security checker) hand the gate
//! one normalized feature record per result. The record is also the payload
//! the dedup guard hashes, so every collection in here serializes in a
//! stable order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::types::{Severity, SignalKey, SignalType};
use crate::error::{Error, Result};

/// Output of the liquidity drop detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityFeatures {
    /// Liquidity drop in percent (0-100)
    pub drop_pct: f64,
    pub severity: Severity,
    /// Detector confidence (0.0 to 1.0)
    pub confidence: f64,
    /// Pool liquidity in USD, when the detector knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_usd: Option<f64>,
}

/// Output of the token security detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatures {
    pub risk_factor_count: u32,
    #[serde(default)]
    pub is_honeypot: bool,
    pub severity: Severity,
    /// Detector confidence (0.0 to 1.0)
    pub confidence: f64,
    #[serde(default)]
    pub risk_factors: BTreeSet<String>,
}

/// Feature record for one detector result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalFeatures {
    Liquidity(LiquidityFeatures),
    Risk(RiskFeatures),
}

impl SignalFeatures {
    /// Severity reported by the detector
    pub fn severity(&self) -> Severity {
        match self {
            SignalFeatures::Liquidity(f) => f.severity,
            SignalFeatures::Risk(f) => f.severity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalFeatures::Liquidity(_) => "liquidity",
            SignalFeatures::Risk(_) => "risk",
        }
    }

    /// Whether a key of `signal_type` may carry this record
    pub fn accepts(&self, signal_type: SignalType) -> bool {
        match (signal_type, self) {
            (SignalType::Liquidity, SignalFeatures::Liquidity(_)) => true,
            (SignalType::Risk, SignalFeatures::Risk(_)) => true,
            (SignalType::Whale, _) => true,
            _ => false,
        }
    }

    /// Reject non-finite numbers. Finite out-of-range values are left for
    /// the scorer to clamp.
    pub fn validate(&self) -> Result<()> {
        let checks: Vec<(&str, f64)> = match self {
            SignalFeatures::Liquidity(f) => {
                let mut v = vec![("drop_pct", f.drop_pct), ("confidence", f.confidence)];
                if let Some(usd) = f.liquidity_usd {
                    v.push(("liquidity_usd", usd));
                }
                v
            }
            SignalFeatures::Risk(f) => vec![("confidence", f.confidence)],
        };

        for (name, value) in checks {
            if !value.is_finite() {
                return Err(Error::InvalidFeatures(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Check the record against the key it is evaluated for
    pub fn validate_for(&self, key: &SignalKey) -> Result<()> {
        if !self.accepts(key.signal_type()) {
            return Err(Error::InvalidFeatures(format!(
                "{} features cannot be evaluated for a {} signal",
                self.kind(),
                key.signal_type()
            )));
        }
        self.validate()
    }
}

impl From<LiquidityFeatures> for SignalFeatures {
    fn from(f: LiquidityFeatures) -> Self {
        SignalFeatures::Liquidity(f)
    }
}

impl From<RiskFeatures> for SignalFeatures {
    fn from(f: RiskFeatures) -> Self {
        SignalFeatures::Risk(f)
    }
}

/// One line of detector output as it arrives at the gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub chain_id: u64,
    pub token: String,
    pub signal_type: SignalType,
    pub features: SignalFeatures,
    /// Detection time; the gate's clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn key(&self) -> Result<SignalKey> {
        SignalKey::new(self.chain_id, &self.token, self.signal_type)
    }
}
