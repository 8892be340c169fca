//! Occurrence Ledger - rolling 24h history per signal key
//!
//! Every evaluated observation is recorded here, fired or not. Each key's
//! history is kept in timestamp order, so a late observation lands before
//! newer ones instead of at the end. Reads only ever see entries inside the
//! window, and every `record` stores back the filtered list, so the history
//! stays bounded even when the periodic sweep never runs.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::signal::{Severity, SignalKey};

/// One past observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub impact_score: u8,
}

/// Impact movement relative to the previous observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactTrend {
    /// No prior observation in the window
    New,
    Increasing,
    Decreasing,
    Stable,
}

impl ImpactTrend {
    /// Classify `current - previous` against a dead band of `threshold`
    pub fn from_delta(delta: i16, threshold: i16) -> Self {
        if delta > threshold {
            ImpactTrend::Increasing
        } else if delta < -threshold {
            ImpactTrend::Decreasing
        } else {
            ImpactTrend::Stable
        }
    }
}

/// Recurrence context for the observation being evaluated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceInfo {
    /// Prior occurrences in the window plus the one being evaluated
    pub occurrences_24h: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_repeat: bool,
    pub trend: ImpactTrend,
    pub previous_impact: Option<u8>,
    /// Never negative, even when `now` is behind `last_seen`
    pub time_since_last_secs: Option<i64>,
}

/// Read-only view of a key's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceSnapshot {
    pub occurrences: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_severity: Severity,
    pub last_impact: u8,
    pub peak_severity: Severity,
    pub peak_impact: u8,
}

/// Per-key rolling window of observations
pub struct OccurrenceLedger {
    window: Duration,
    trend_threshold: i16,
    entries: DashMap<SignalKey, Vec<Occurrence>>,
}

impl OccurrenceLedger {
    pub fn new(window: Duration, trend_threshold: u8) -> Self {
        Self {
            window,
            trend_threshold: i16::from(trend_threshold),
            entries: DashMap::new(),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Insert an observation in timestamp order and store back only what is
    /// still in the window
    pub fn record(&self, key: &SignalKey, severity: Severity, impact_score: u8, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        let mut history = self.entries.entry(key.clone()).or_default();
        let at = history.partition_point(|o| o.timestamp <= now);
        history.insert(
            at,
            Occurrence {
                timestamp: now,
                severity,
                impact_score,
            },
        );
        history.retain(|o| o.timestamp > cutoff);
    }

    /// Recurrence context for an observation scored `current_impact`.
    /// Pure read: must be called before `record` for the same observation.
    pub fn recurrence_info(&self, key: &SignalKey, current_impact: u8, now: DateTime<Utc>) -> RecurrenceInfo {
        let cutoff = self.cutoff(now);

        let (prior_count, last) = match self.entries.get(key) {
            Some(history) => {
                // Sorted, so the last live entry is the most recent one
                let mut count = 0u32;
                let mut last = None;
                for o in history.iter().filter(|o| o.timestamp > cutoff) {
                    count += 1;
                    last = Some(o.clone());
                }
                (count, last)
            }
            None => (0, None),
        };

        match last {
            None => RecurrenceInfo {
                occurrences_24h: prior_count + 1,
                last_seen: None,
                is_repeat: false,
                trend: ImpactTrend::New,
                previous_impact: None,
                time_since_last_secs: None,
            },
            Some(last) => {
                let delta = i16::from(current_impact) - i16::from(last.impact_score);
                RecurrenceInfo {
                    occurrences_24h: prior_count + 1,
                    last_seen: Some(last.timestamp),
                    is_repeat: prior_count > 0,
                    trend: ImpactTrend::from_delta(delta, self.trend_threshold),
                    previous_impact: Some(last.impact_score),
                    time_since_last_secs: Some((now - last.timestamp).num_seconds().max(0)),
                }
            }
        }
    }

    /// Summary of a key's in-window history, without touching it
    pub fn snapshot(&self, key: &SignalKey, now: DateTime<Utc>) -> Option<RecurrenceSnapshot> {
        let cutoff = self.cutoff(now);
        let history = self.entries.get(key)?;
        let live: Vec<&Occurrence> = history.iter().filter(|o| o.timestamp > cutoff).collect();

        let first = live.first()?;
        let last = live.last()?;
        let peak_severity = live
            .iter()
            .map(|o| o.severity)
            .max_by_key(|s| s.rank())
            .unwrap_or(last.severity);
        let peak_impact = live.iter().map(|o| o.impact_score).max().unwrap_or(last.impact_score);

        Some(RecurrenceSnapshot {
            occurrences: live.len() as u32,
            first_seen: first.timestamp,
            last_seen: last.timestamp,
            last_severity: last.severity,
            last_impact: last.impact_score,
            peak_severity,
            peak_impact,
        })
    }

    /// Drop expired entries for one key; removes the key when nothing is left.
    /// Returns true if the key was removed.
    pub fn purge_key(&self, key: &SignalKey, now: DateTime<Utc>) -> bool {
        let cutoff = self.cutoff(now);
        if self
            .entries
            .remove_if(key, |_, history| history.iter().all(|o| o.timestamp <= cutoff))
            .is_some()
        {
            return true;
        }
        if let Some(mut history) = self.entries.get_mut(key) {
            history.retain(|o| o.timestamp > cutoff);
        }
        false
    }

    /// Keys currently held (including ones whose history has expired)
    pub fn keys(&self) -> Vec<SignalKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw stored length for a key, expired entries included
    pub fn stored_len(&self, key: &SignalKey) -> usize {
        self.entries.get(key).map(|h| h.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
