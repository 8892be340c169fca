//! Cooldown Gate - notification cadence per signal key
//!
//! After an alert fires for a key, further alerts of the same or lower
//! severity are held back until the cooldown expires. Each key is in one of
//! two states:
//! - NONE: no entry, or an entry past its expiry
//! - ACTIVE: an unexpired entry, carrying the last notified severity
//!
//! An expired entry is deleted lazily by `check_cooldown`. Entries are only
//! ever written whole by `start_cooldown`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::signal::{Severity, SignalKey};

/// Active cooldown for a key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownEntry {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_severity: Severity,
}

impl CooldownEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Read-only view of a key's cooldown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownStatus {
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_severity: Severity,
    /// Seconds until expiry, 0 once expired
    pub remaining_secs: i64,
}

/// Per-key cooldown state machine
pub struct CooldownGate {
    default_duration: Duration,
    entries: DashMap<SignalKey, CooldownEntry>,
}

impl CooldownGate {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            default_duration,
            entries: DashMap::new(),
        }
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Current cooldown for `key`, or None when the key may fire.
    /// An expired entry is removed here (ACTIVE -> NONE).
    pub fn check_cooldown(&self, key: &SignalKey, now: DateTime<Utc>) -> Option<CooldownEntry> {
        if let Some((_, expired)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
            debug!(
                key = %key,
                expired_at = %expired.expires_at,
                "Cooldown expired"
            );
            return None;
        }
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Start (or restart) a cooldown of the default length
    pub fn start_cooldown(&self, key: &SignalKey, severity: Severity, now: DateTime<Utc>) -> CooldownEntry {
        self.start_cooldown_for(key, severity, self.default_duration, now)
    }

    /// Replace the key's entry with a fresh one lasting `duration`
    pub fn start_cooldown_for(
        &self,
        key: &SignalKey,
        severity: Severity,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> CooldownEntry {
        let entry = CooldownEntry {
            started_at: now,
            expires_at: now + duration,
            last_severity: severity,
        };
        self.entries.insert(key.clone(), entry.clone());
        entry
    }

    /// True iff `new` ranks strictly above a known `previous`
    pub fn is_escalation(previous: Option<Severity>, new: Severity) -> bool {
        Severity::is_escalation(previous, new)
    }

    /// Inspect without the lazy delete `check_cooldown` performs
    pub fn status(&self, key: &SignalKey, now: DateTime<Utc>) -> Option<CooldownStatus> {
        self.entries.get(key).map(|e| CooldownStatus {
            active: !e.is_expired(now),
            started_at: e.started_at,
            expires_at: e.expires_at,
            last_severity: e.last_severity,
            remaining_secs: (e.expires_at - now).num_seconds().max(0),
        })
    }

    /// Remove the key's entry if expired. Returns true if removed.
    pub fn purge_key(&self, key: &SignalKey, now: DateTime<Utc>) -> bool {
        self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some()
    }

    pub fn keys(&self) -> Vec<SignalKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
