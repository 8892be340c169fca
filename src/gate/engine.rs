//! Gating Orchestrator - decides whether an observation becomes an alert
//!
//! Composes the impact scorer with the three per-key stores:
//! 1. score the features
//! 2. read recurrence context from the ledger (before recording)
//! 3. drop exact payload repeats via the dedup guard
//! 4. consult the cooldown gate, letting escalations through
//! 5. record the observation in the ledger
//! 6. restart the cooldown when the alert fires
//!
//! Steps 2-6 run under a striped per-key lock, so two near-simultaneous
//! evaluations for the same key can never both fire.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::cooldown::{CooldownGate, CooldownStatus};
use super::dedup::{content_hash, DedupGuard, DedupStatus};
use super::ledger::{ImpactTrend, OccurrenceLedger, RecurrenceInfo, RecurrenceSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::config::GatingConfig;
use crate::error::Result;
use crate::scoring::{ImpactScore, ImpactScorer};
use crate::signal::{Severity, SignalFeatures, SignalKey};

/// Why an observation did not fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    DuplicatePayload,
    CooldownActive,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::DuplicatePayload => "duplicate_payload",
            SuppressReason::CooldownActive => "cooldown_active",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an alert should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertFraming {
    New,
    Repeat,
    Escalating,
    Improving,
}

impl AlertFraming {
    pub fn from_context(trend: ImpactTrend, escalated: bool) -> Self {
        if escalated {
            return AlertFraming::Escalating;
        }
        match trend {
            ImpactTrend::New => AlertFraming::New,
            ImpactTrend::Increasing => AlertFraming::Escalating,
            ImpactTrend::Decreasing => AlertFraming::Improving,
            ImpactTrend::Stable => AlertFraming::Repeat,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertFraming::New => "new",
            AlertFraming::Repeat => "repeat",
            AlertFraming::Escalating => "escalating",
            AlertFraming::Improving => "improving",
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Serialize)]
pub struct GatingResult {
    pub key: SignalKey,
    pub fire: bool,
    pub score: ImpactScore,
    /// Detector severity the decision was made on
    pub severity: Severity,
    pub recurrence: RecurrenceInfo,
    pub framing: AlertFraming,
    /// Fired through an active cooldown because severity went up
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_reason: Option<SuppressReason>,
    pub evaluated_at: DateTime<Utc>,
}

impl GatingResult {
    /// One-line summary for notification surfaces
    pub fn headline(&self) -> String {
        format!(
            "[{}] {} {} on chain {} ({}): impact {} ({}), {} - {} in 24h",
            self.severity.as_str().to_uppercase(),
            self.framing.as_str(),
            self.key.signal_type(),
            self.key.chain_id(),
            self.key.token(),
            self.score.score,
            self.score.level,
            self.score.reason,
            self.recurrence.occurrences_24h,
        )
    }
}

/// Evaluation counters for health surfaces
#[derive(Default)]
struct GateCounters {
    evaluations: AtomicU64,
    fired: AtomicU64,
    escalations: AtomicU64,
    duplicates: AtomicU64,
    cooldown_suppressed: AtomicU64,
}

/// Point-in-time gate statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub ledger_keys: usize,
    pub dedup_keys: usize,
    pub cooldown_keys: usize,
    pub evaluations: u64,
    pub fired: u64,
    pub escalations: u64,
    pub duplicates: u64,
    pub cooldown_suppressed: u64,
}

/// The gating core: owns the three stores and the per-key locks
pub struct SignalGate {
    config: GatingConfig,
    clock: Arc<dyn Clock>,
    ledger: OccurrenceLedger,
    dedup: DedupGuard,
    cooldown: CooldownGate,
    key_locks: Vec<Mutex<()>>,
    counters: GateCounters,
}

impl SignalGate {
    /// Gate driven by the wall clock
    pub fn new(config: GatingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GatingConfig, clock: Arc<dyn Clock>) -> Self {
        let stripes = config.lock_stripes.max(1);
        Self {
            ledger: OccurrenceLedger::new(config.occurrence_window(), config.trend_threshold),
            dedup: DedupGuard::new(config.dedup_window()),
            cooldown: CooldownGate::new(config.cooldown()),
            key_locks: (0..stripes).map(|_| Mutex::new(())).collect(),
            counters: GateCounters::default(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &GatingConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ledger(&self) -> &OccurrenceLedger {
        &self.ledger
    }

    pub fn dedup(&self) -> &DedupGuard {
        &self.dedup
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// Stripe lock for `key`. A poisoned stripe is still usable: the stores
    /// behind it are only ever written whole.
    fn lock_key(&self, key: &SignalKey) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.key_locks.len() as u64) as usize;
        self.key_locks[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate against the gate's clock
    pub fn evaluate(&self, key: &SignalKey, features: &SignalFeatures) -> Result<GatingResult> {
        self.evaluate_at(key, features, self.clock.now())
    }

    /// Evaluate an observation made at `now`
    pub fn evaluate_at(
        &self,
        key: &SignalKey,
        features: &SignalFeatures,
        now: DateTime<Utc>,
    ) -> Result<GatingResult> {
        features.validate_for(key)?;

        let score = ImpactScorer::compute(features);
        let severity = features.severity();
        let hash = content_hash(features)?;

        let _guard = self.lock_key(key);
        self.counters.evaluations.fetch_add(1, Ordering::Relaxed);

        let recurrence = self.ledger.recurrence_info(key, score.score, now);

        if self.dedup.check_hash(key, hash, now) {
            if self.config.record_duplicates {
                self.ledger.record(key, severity, score.score, now);
            }
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, score = score.score, "Duplicate payload suppressed");

            return Ok(GatingResult {
                key: key.clone(),
                fire: false,
                framing: AlertFraming::from_context(recurrence.trend, false),
                score,
                severity,
                recurrence,
                escalated: false,
                suppress_reason: Some(SuppressReason::DuplicatePayload),
                evaluated_at: now,
            });
        }

        let (fire, escalated) = match self.cooldown.check_cooldown(key, now) {
            None => (true, false),
            Some(active) if CooldownGate::is_escalation(Some(active.last_severity), severity) => {
                warn!(
                    key = %key,
                    from = %active.last_severity,
                    to = %severity,
                    "Escalation overrides active cooldown"
                );
                (true, true)
            }
            Some(active) => {
                debug!(
                    key = %key,
                    severity = %severity,
                    last_severity = %active.last_severity,
                    expires_at = %active.expires_at,
                    "Suppressed by cooldown"
                );
                (false, false)
            }
        };

        self.ledger.record(key, severity, score.score, now);

        if fire {
            self.cooldown.start_cooldown(key, severity, now);
            self.counters.fired.fetch_add(1, Ordering::Relaxed);
            if escalated {
                self.counters.escalations.fetch_add(1, Ordering::Relaxed);
            }
            info!(
                key = %key,
                severity = %severity,
                score = score.score,
                level = %score.level,
                occurrences_24h = recurrence.occurrences_24h,
                "Signal fired"
            );
        } else {
            self.counters.cooldown_suppressed.fetch_add(1, Ordering::Relaxed);
        }

        Ok(GatingResult {
            key: key.clone(),
            fire,
            framing: AlertFraming::from_context(recurrence.trend, escalated),
            score,
            severity,
            recurrence,
            escalated,
            suppress_reason: (!fire).then_some(SuppressReason::CooldownActive),
            evaluated_at: now,
        })
    }

    /// In-window history summary for `key`
    pub fn recurrence_snapshot(&self, key: &SignalKey) -> Option<RecurrenceSnapshot> {
        self.ledger.snapshot(key, self.clock.now())
    }

    /// Cooldown state for `key`; never removes an expired entry
    pub fn cooldown_status(&self, key: &SignalKey) -> Option<CooldownStatus> {
        self.cooldown.status(key, self.clock.now())
    }

    pub fn dedup_status(&self, key: &SignalKey) -> Option<DedupStatus> {
        self.dedup.status(key, self.clock.now())
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            ledger_keys: self.ledger.len(),
            dedup_keys: self.dedup.len(),
            cooldown_keys: self.cooldown.len(),
            evaluations: self.counters.evaluations.load(Ordering::Relaxed),
            fired: self.counters.fired.load(Ordering::Relaxed),
            escalations: self.counters.escalations.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            cooldown_suppressed: self.counters.cooldown_suppressed.load(Ordering::Relaxed),
        }
    }

    /// Purge expired ledger history, one key at a time under its lock.
    /// Returns the number of keys removed.
    pub fn sweep_ledger(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for key in self.ledger.keys() {
            let _guard = self.lock_key(&key);
            if self.ledger.purge_key(&key, now) {
                removed += 1;
            }
        }
        removed
    }

    /// Purge expired dedup and cooldown entries, one key at a time under
    /// its lock. Returns the number of entries removed.
    pub fn sweep_dedup(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for key in self.dedup.keys() {
            let _guard = self.lock_key(&key);
            if self.dedup.purge_key(&key, now) {
                removed += 1;
            }
        }
        for key in self.cooldown.keys() {
            let _guard = self.lock_key(&key);
            if self.cooldown.purge_key(&key, now) {
                removed += 1;
            }
        }
        removed
    }

    /// Forget all state
    pub fn reset(&self) {
        self.ledger.clear();
        self.dedup.clear();
        self.cooldown.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::signal::{LiquidityFeatures, RiskFeatures, SignalType};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn gate() -> (SignalGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let gate = SignalGate::with_clock(GatingConfig::default(), clock.clone());
        (gate, clock)
    }

    fn key() -> SignalKey {
        SignalKey::new(1, "0xabc", SignalType::Liquidity).unwrap()
    }

    fn liquidity(drop_pct: f64, severity: Severity) -> SignalFeatures {
        SignalFeatures::Liquidity(LiquidityFeatures {
            drop_pct,
            severity,
            confidence: 0.5,
            liquidity_usd: Some(50_000.0),
        })
    }

    #[test]
    fn test_first_observation_fires() {
        let (gate, _) = gate();
        let result = gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        assert!(result.fire);
        assert_eq!(result.framing, AlertFraming::New);
        assert!(result.suppress_reason.is_none());
        assert!(gate.cooldown_status(&key()).unwrap().active);
        assert_eq!(gate.recurrence_snapshot(&key()).unwrap().occurrences, 1);
    }

    #[test]
    fn test_cooldown_suppresses_same_severity() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        clock.advance(Duration::minutes(2));

        let result = gate.evaluate(&key(), &liquidity(41.0, Severity::Warning)).unwrap();
        assert!(!result.fire);
        assert_eq!(result.suppress_reason, Some(SuppressReason::CooldownActive));
        // Suppressed observations are still history
        assert_eq!(gate.recurrence_snapshot(&key()).unwrap().occurrences, 2);
    }

    #[test]
    fn test_escalation_overrides_cooldown() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        clock.advance(Duration::minutes(2));

        let result = gate.evaluate(&key(), &liquidity(40.0, Severity::Critical)).unwrap();
        assert!(result.fire);
        assert!(result.escalated);
        assert_eq!(result.framing, AlertFraming::Escalating);

        let status = gate.cooldown_status(&key()).unwrap();
        assert_eq!(status.last_severity, Severity::Critical);
        assert_eq!(status.started_at, t0() + Duration::minutes(2));
    }

    #[test]
    fn test_deescalation_does_not_reset_cooldown() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Danger)).unwrap();
        clock.advance(Duration::minutes(3));

        let result = gate.evaluate(&key(), &liquidity(41.0, Severity::Warning)).unwrap();
        assert!(!result.fire);
        let status = gate.cooldown_status(&key()).unwrap();
        assert_eq!(status.last_severity, Severity::Danger);
        assert_eq!(status.started_at, t0());
    }

    #[test]
    fn test_duplicate_not_recorded_by_default() {
        let (gate, clock) = gate();
        let features = liquidity(40.0, Severity::Warning);
        assert!(gate.evaluate(&key(), &features).unwrap().fire);
        clock.advance(Duration::seconds(30));

        let result = gate.evaluate(&key(), &features).unwrap();
        assert!(!result.fire);
        assert_eq!(result.suppress_reason, Some(SuppressReason::DuplicatePayload));
        assert_eq!(gate.recurrence_snapshot(&key()).unwrap().occurrences, 1);
        assert_eq!(gate.stats().duplicates, 1);
    }

    #[test]
    fn test_duplicate_recorded_when_configured() {
        let clock = Arc::new(ManualClock::new(t0()));
        let config = GatingConfig {
            record_duplicates: true,
            ..Default::default()
        };
        let gate = SignalGate::with_clock(config, clock.clone());
        let features = liquidity(40.0, Severity::Warning);
        gate.evaluate(&key(), &features).unwrap();
        clock.advance(Duration::seconds(30));
        let result = gate.evaluate(&key(), &features).unwrap();

        assert_eq!(result.suppress_reason, Some(SuppressReason::DuplicatePayload));
        assert_eq!(gate.recurrence_snapshot(&key()).unwrap().occurrences, 2);
        // Cooldown untouched by the duplicate
        assert_eq!(gate.cooldown_status(&key()).unwrap().started_at, t0());
    }

    #[test]
    fn test_duplicate_of_escalation_still_dropped() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        clock.advance(Duration::minutes(1));
        let critical = liquidity(75.0, Severity::Critical);
        assert!(gate.evaluate(&key(), &critical).unwrap().fire);
        clock.advance(Duration::minutes(1));
        let again = gate.evaluate(&key(), &critical).unwrap();
        assert!(!again.fire);
        assert_eq!(again.suppress_reason, Some(SuppressReason::DuplicatePayload));
    }

    #[test]
    fn test_invalid_features_rejected_without_state_change() {
        let (gate, _) = gate();
        let risk_key = SignalKey::new(1, "0xabc", SignalType::Risk).unwrap();
        let err = gate.evaluate(&risk_key, &liquidity(40.0, Severity::Warning));
        assert!(err.is_err());
        assert_eq!(gate.stats().evaluations, 0);
        assert!(gate.ledger().is_empty());
    }

    #[test]
    fn test_whale_accepts_both_kinds() {
        let (gate, _) = gate();
        let whale = SignalKey::new(1, "0xabc", SignalType::Whale).unwrap();
        let risk = SignalFeatures::Risk(RiskFeatures {
            risk_factor_count: 2,
            is_honeypot: false,
            severity: Severity::Danger,
            confidence: 0.4,
            risk_factors: Default::default(),
        });
        assert!(gate.evaluate(&whale, &risk).unwrap().fire);
        assert!(gate.evaluate(&whale, &liquidity(80.0, Severity::Critical)).unwrap().fire);
    }

    #[test]
    fn test_framing_follows_trend() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(75.0, Severity::Danger)).unwrap();
        clock.advance(Duration::minutes(20));
        let result = gate.evaluate(&key(), &liquidity(20.0, Severity::Danger)).unwrap();
        assert!(result.fire);
        assert_eq!(result.recurrence.trend, ImpactTrend::Decreasing);
        assert_eq!(result.framing, AlertFraming::Improving);
        assert!(result.headline().contains("improving"));
    }

    #[test]
    fn test_introspection_has_no_side_effects() {
        let (gate, clock) = gate();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        clock.advance(Duration::hours(2));

        let cooldown = gate.cooldown_status(&key()).unwrap();
        assert!(!cooldown.active);
        assert!(!gate.dedup_status(&key()).unwrap().active);
        // Expired entries are still there for the sweep to collect
        assert_eq!(gate.cooldown().len(), 1);
        assert_eq!(gate.dedup().len(), 1);
    }

    #[test]
    fn test_sweeps() {
        let (gate, clock) = gate();
        let other = SignalKey::new(1, "0xdef", SignalType::Liquidity).unwrap();
        gate.evaluate(&key(), &liquidity(40.0, Severity::Warning)).unwrap();
        clock.advance(Duration::hours(12));
        gate.evaluate(&other, &liquidity(40.0, Severity::Warning)).unwrap();

        // key: dedup + cooldown expired
        assert_eq!(gate.sweep_dedup(), 2);
        assert_eq!(gate.sweep_ledger(), 0);

        clock.advance(Duration::hours(13));
        assert_eq!(gate.sweep_ledger(), 1);
        assert!(gate.recurrence_snapshot(&key()).is_none());
        assert!(gate.recurrence_snapshot(&other).is_some());
    }

    #[test]
    fn test_concurrent_same_key_fires_once() {
        let (gate, _) = gate();
        let gate = Arc::new(gate);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    let features = liquidity(40.0 + i as f64, Severity::Warning);
                    gate.evaluate(&key(), &features).unwrap().fire
                })
            })
            .collect();

        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();
        assert_eq!(fired, 1);
        assert_eq!(gate.recurrence_snapshot(&key()).unwrap().occurrences, 8);
    }
}
