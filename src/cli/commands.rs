//! CLI command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tracing::{error, info, warn};

use crate::clock::ManualClock;
use crate::config::Config;
use crate::gate::{spawn_sweepers, GateStats, GatingResult, SignalGate, SuppressReason};
use crate::scoring::ImpactScorer;
use crate::signal::{Observation, SignalFeatures};

/// Parse and evaluate one JSONL observation line
pub fn evaluate_line(gate: &SignalGate, line: &str) -> crate::Result<GatingResult> {
    let observation: Observation = serde_json::from_str(line)?;
    let key = observation.key()?;
    let now = observation.timestamp.unwrap_or_else(|| gate.now());
    gate.evaluate_at(&key, &observation.features, now)
}

/// Evaluate observations from stdin until EOF or Ctrl-C
pub async fn run(config: &Config) -> Result<()> {
    info!(
        cooldown_secs = config.gating.cooldown_secs,
        dedup_window_secs = config.gating.dedup_window_secs,
        "Starting signal gate on stdin"
    );

    let gate = Arc::new(SignalGate::new(config.gating.clone()));
    let sweepers = spawn_sweepers(gate.clone(), &config.gating);

    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("Failed to read stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                // One bad observation must not stop the others
                match evaluate_line(&gate, &line) {
                    Ok(result) => println!("{}", serde_json::to_string(&result)?),
                    Err(e) => log_rejected(&e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    sweepers.abort();
    let stats = gate.stats();
    info!(
        evaluations = stats.evaluations,
        fired = stats.fired,
        duplicates = stats.duplicates,
        cooldown_suppressed = stats.cooldown_suppressed,
        "Signal gate stopped"
    );
    Ok(())
}

/// Bad field values are the detector's problem; undecodable lines point at
/// a broken producer
fn log_rejected(e: &crate::Error) {
    if e.is_validation() {
        warn!(error = %e, "Rejected invalid observation");
    } else {
        error!(error = %e, "Rejected undecodable observation");
    }
}

/// Outcome counts of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub observations: u64,
    pub rejected: u64,
    pub fired: u64,
    pub escalations: u64,
    pub duplicates: u64,
    pub cooldown_suppressed: u64,
}

impl ReplaySummary {
    fn count(&mut self, result: &GatingResult) {
        self.observations += 1;
        if result.fire {
            self.fired += 1;
        }
        if result.escalated {
            self.escalations += 1;
        }
        match result.suppress_reason {
            Some(SuppressReason::DuplicatePayload) => self.duplicates += 1,
            Some(SuppressReason::CooldownActive) => self.cooldown_suppressed += 1,
            None => {}
        }
    }
}

/// Replay timestamped observations, letting their timestamps drive the
/// clock. Observations without a timestamp reuse the previous instant.
pub fn replay_reader<R: BufRead>(
    gate: &SignalGate,
    clock: &ManualClock,
    reader: R,
    mut on_result: impl FnMut(&GatingResult),
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let observation: Observation = match serde_json::from_str(&line) {
            Ok(obs) => obs,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping unparsable observation");
                summary.rejected += 1;
                continue;
            }
        };
        if let Some(ts) = observation.timestamp {
            clock.set(ts);
        }

        let evaluated = observation
            .key()
            .and_then(|key| gate.evaluate(&key, &observation.features));
        match evaluated {
            Ok(result) => {
                summary.count(&result);
                on_result(&result);
            }
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping invalid observation");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

/// Replay a JSONL file of observations against a fresh gate
pub fn replay(config: &Config, path: &Path, quiet: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;

    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let gate = SignalGate::with_clock(config.gating.clone(), clock.clone());

    let summary = replay_reader(&gate, &clock, BufReader::new(file), |result| {
        if !quiet && result.fire {
            println!("{}  {}", result.evaluated_at.format("%Y-%m-%d %H:%M:%S"), result.headline());
        }
    })?;

    print_replay_summary(&summary, &gate.stats());
    Ok(())
}

fn print_replay_summary(summary: &ReplaySummary, stats: &GateStats) {
    println!("\n=== REPLAY SUMMARY ===\n");
    println!("Observations:        {}", summary.observations);
    println!("Rejected:            {}", summary.rejected);
    println!("Fired:               {}", summary.fired);
    println!("  of which escalations: {}", summary.escalations);
    println!("Duplicates dropped:  {}", summary.duplicates);
    println!("Cooldown suppressed: {}", summary.cooldown_suppressed);
    println!(
        "\nTracked keys: ledger={} dedup={} cooldown={}",
        stats.ledger_keys, stats.dedup_keys, stats.cooldown_keys
    );
}

/// Score a single feature record without touching any state
pub fn score(features_json: &str) -> Result<()> {
    let features: SignalFeatures =
        serde_json::from_str(features_json).context("Invalid feature record")?;
    features.validate()?;
    let score = ImpactScorer::compute(&features);
    println!("{}", serde_json::to_string_pretty(&score)?);
    Ok(())
}

/// Show the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
