//! Signal identity and severity types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

static TOKEN_ADDRESS: OnceLock<Regex> = OnceLock::new();

fn token_address() -> &'static Regex {
    TOKEN_ADDRESS.get_or_init(|| {
        // Lowercased EVM hex or base58-style mint, no separators
        Regex::new(r"^[0-9a-z]{2,64}$").expect("Invalid token address regex")
    })
}

/// Which detector produced the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SignalType {
    Liquidity,
    Risk,
    Whale,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Liquidity => "liquidity",
            SignalType::Risk => "risk",
            SignalType::Whale => "whale",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "liquidity" => Ok(SignalType::Liquidity),
            "risk" => Ok(SignalType::Risk),
            "whale" => Ok(SignalType::Whale),
            other => Err(Error::InvalidSignalType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SignalType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Alert severity, totally ordered `safe < warning < danger < critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Severity {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl Severity {
    /// Position in the total order
    pub fn rank(self) -> u8 {
        match self {
            Severity::Safe => 0,
            Severity::Warning => 1,
            Severity::Danger => 2,
            Severity::Critical => 3,
        }
    }

    /// True iff `new` ranks strictly above a known `previous`
    pub fn is_escalation(previous: Option<Severity>, new: Severity) -> bool {
        previous.is_some_and(|prev| new.rank() > prev.rank())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Safe => "safe",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    /// Unknown spellings are rejected, never mapped to a default
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Severity::Safe),
            "warning" => Ok(Severity::Warning),
            "danger" => Ok(Severity::Danger),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::InvalidSeverity(other.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Identity of a tracked signal: (chain, token, detector)
///
/// The token address is lowercased on construction, so two keys that differ
/// only in address casing compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SignalKey {
    chain_id: u64,
    token: String,
    signal_type: SignalType,
}

impl SignalKey {
    pub fn new(chain_id: u64, token: &str, signal_type: SignalType) -> Result<Self> {
        if chain_id == 0 {
            return Err(Error::InvalidKey("chain id must be non-zero".to_string()));
        }

        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Err(Error::InvalidKey("token address is empty".to_string()));
        }
        if !token_address().is_match(&token) {
            return Err(Error::InvalidKey(format!("malformed token address: {}", token)));
        }

        Ok(Self {
            chain_id,
            token,
            signal_type,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain_id, self.token, self.signal_type)
    }
}
