//! Periodic garbage collection for the gate's stores
//!
//! Correctness never depends on these running: every read filters expired
//! data and every ledger write trims its window. The sweeps only reclaim
//! keys whose data has fully expired.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::engine::SignalGate;
use crate::config::GatingConfig;

/// Running sweep tasks
pub struct SweeperHandles {
    pub ledger: JoinHandle<()>,
    pub dedup: JoinHandle<()>,
}

impl SweeperHandles {
    /// Stop both sweeps
    pub fn abort(&self) {
        self.ledger.abort();
        self.dedup.abort();
    }
}

/// Spawn the ledger and dedup sweeps at the intervals in `config`.
/// Must be called from within a tokio runtime.
pub fn spawn_sweepers(gate: Arc<SignalGate>, config: &GatingConfig) -> SweeperHandles {
    let ledger_every = config.ledger_sweep_interval();
    let dedup_every = config.dedup_sweep_interval();

    let ledger_gate = gate.clone();
    let ledger = spawn_periodic(ledger_every, move || {
        let removed = ledger_gate.sweep_ledger();
        if removed > 0 {
            debug!(removed, "Ledger sweep removed expired keys");
        }
    });

    let dedup = spawn_periodic(dedup_every, move || {
        let removed = gate.sweep_dedup();
        if removed > 0 {
            debug!(removed, "Dedup sweep removed expired entries");
        }
    });

    SweeperHandles { ledger, dedup }
}

fn spawn_periodic<F>(every: Duration, mut sweep: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::signal::{LiquidityFeatures, Severity, SignalFeatures, SignalKey, SignalType};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_sweepers_collect_expired_keys() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        ));
        let config = GatingConfig {
            ledger_sweep_interval_secs: 1,
            dedup_sweep_interval_secs: 1,
            ..Default::default()
        };
        let gate = Arc::new(SignalGate::with_clock(config, clock.clone()));
        let key = SignalKey::new(1, "0xabc", SignalType::Liquidity).unwrap();
        let features = SignalFeatures::Liquidity(LiquidityFeatures {
            drop_pct: 50.0,
            severity: Severity::Danger,
            confidence: 0.8,
            liquidity_usd: None,
        });
        gate.evaluate(&key, &features).unwrap();

        clock.advance(chrono::Duration::hours(25));
        let handles = spawn_sweepers(gate.clone(), gate.config());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handles.abort();

        let stats = gate.stats();
        assert_eq!(stats.ledger_keys, 0);
        assert_eq!(stats.dedup_keys, 0);
        assert_eq!(stats.cooldown_keys, 0);
    }
}
