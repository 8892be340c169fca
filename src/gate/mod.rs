//! Signal gating core
//!
//! Sits between raw detector output and notification delivery. Three
//! independent per-key stores feed one decision function:
//! - `ledger` - rolling 24h occurrence history and trend
//! - `dedup` - content-hash suppression of repeated payloads
//! - `cooldown` - notification cadence with escalation override
//! - `engine` - the orchestrator combining them with the impact scorer
//! - `sweeper` - periodic cleanup of expired keys

pub mod cooldown;
pub mod dedup;
pub mod engine;
pub mod ledger;
pub mod sweeper;

pub use cooldown::{CooldownEntry, CooldownGate, CooldownStatus};
pub use dedup::{content_hash, DedupEntry, DedupGuard, DedupStatus};
pub use engine::{AlertFraming, GateStats, GatingResult, SignalGate, SuppressReason};
pub use ledger::{ImpactTrend, Occurrence, OccurrenceLedger, RecurrenceInfo, RecurrenceSnapshot};
pub use sweeper::{spawn_sweepers, SweeperHandles};
