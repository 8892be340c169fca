//! Impact scoring for raw detector output
//!
//! Turns a detector feature record into a normalized 0-100 impact score,
//! an impact level and a short human-readable reason. Scoring is pure:
//! the same features always produce the same score, and finite
//! out-of-range inputs are clamped rather than rejected.

use serde::Serialize;
use std::fmt;

use crate::signal::{LiquidityFeatures, RiskFeatures, Severity, SignalFeatures};

/// Factors that add a flat bonus to the risk score
pub const CRITICAL_RISK_FACTORS: [&str; 4] = [
    "honeypot",
    "blacklisted",
    "can_selfdestruct",
    "owner_can_modify_balance",
];

/// Score at or above which impact is high
pub const HIGH_IMPACT_THRESHOLD: u8 = 70;
/// Score at or above which impact is medium
pub const MEDIUM_IMPACT_THRESHOLD: u8 = 40;

/// Impact level bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

impl ImpactLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= HIGH_IMPACT_THRESHOLD {
            ImpactLevel::High
        } else if score >= MEDIUM_IMPACT_THRESHOLD {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::High => "high",
            ImpactLevel::Medium => "medium",
            ImpactLevel::Low => "low",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored impact of one observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactScore {
    /// Normalized impact (0 to 100)
    pub score: u8,
    pub level: ImpactLevel,
    /// Human-readable summary of the dominant factors
    pub reason: String,
}

impl ImpactScore {
    fn from_raw(raw: i64, reason: String) -> Self {
        let score = raw.clamp(0, 100) as u8;
        Self {
            score,
            level: ImpactLevel::from_score(score),
            reason,
        }
    }
}

/// Stateless impact scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactScorer;

impl ImpactScorer {
    /// Score any feature record
    pub fn compute(features: &SignalFeatures) -> ImpactScore {
        match features {
            SignalFeatures::Liquidity(f) => Self::score_liquidity(f),
            SignalFeatures::Risk(f) => Self::score_risk(f),
        }
    }

    /// Score a liquidity drop
    pub fn score_liquidity(f: &LiquidityFeatures) -> ImpactScore {
        let drop_pct = f.drop_pct.max(0.0);

        let (drop_points, drop_label) = if drop_pct >= 70.0 {
            (40, "Severe")
        } else if drop_pct >= 50.0 {
            (30, "Major")
        } else if drop_pct >= 35.0 {
            (20, "Significant")
        } else {
            (10, "Minor")
        };

        let severity_points = match f.severity {
            Severity::Critical => 30,
            Severity::Danger => 20,
            Severity::Warning => 10,
            Severity::Safe => 0,
        };

        let confidence_points = confidence_points(f.confidence, 20.0);

        let (liquidity_points, size_label) = match f.liquidity_usd.map(|usd| usd.max(0.0)) {
            Some(usd) if usd >= 1_000_000.0 => (10, "large"),
            Some(usd) if usd >= 100_000.0 => (7, "mid-size"),
            Some(usd) if usd >= 10_000.0 => (4, "small"),
            Some(_) => (2, "micro"),
            None => (0, "unknown-size"),
        };

        let reason = format!(
            "{} liquidity drop ({:.1}%) on {} pool",
            drop_label, drop_pct, size_label
        );

        ImpactScore::from_raw(
            drop_points + severity_points + confidence_points + liquidity_points,
            reason,
        )
    }

    /// Score a token security finding
    pub fn score_risk(f: &RiskFeatures) -> ImpactScore {
        let mut raw: i64 = 0;

        if f.is_honeypot {
            raw += 50;
        } else {
            raw += match f.severity {
                Severity::Critical => 20,
                Severity::Danger => 15,
                _ => 5,
            };
        }

        raw += match f.risk_factor_count {
            n if n >= 5 => 30,
            n if n >= 3 => 20,
            n if n >= 1 => 10,
            _ => 0,
        };

        raw += confidence_points(f.confidence, 15.0);

        let critical: Vec<&str> = f
            .risk_factors
            .iter()
            .map(|factor| factor.trim())
            .filter(|factor| {
                CRITICAL_RISK_FACTORS
                    .iter()
                    .any(|c| factor.eq_ignore_ascii_case(c))
            })
            .filter(|factor| !(f.is_honeypot && factor.eq_ignore_ascii_case("honeypot")))
            .collect();
        if !critical.is_empty() {
            raw += 10;
        }

        let reason = if f.is_honeypot {
            "Honeypot detected".to_string()
        } else {
            let plural = if f.risk_factor_count == 1 { "" } else { "s" };
            if critical.is_empty() {
                format!("{} risk factor{} detected", f.risk_factor_count, plural)
            } else {
                format!(
                    "{} risk factor{} detected, including {}",
                    f.risk_factor_count,
                    plural,
                    critical.join(", ")
                )
            }
        };

        ImpactScore::from_raw(raw, reason)
    }
}

/// `round(clamp(confidence, 0, 1) * weight)`
fn confidence_points(confidence: f64, weight: f64) -> i64 {
    (confidence.clamp(0.0, 1.0) * weight).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn liquidity(drop_pct: f64, severity: Severity, confidence: f64, usd: Option<f64>) -> LiquidityFeatures {
        LiquidityFeatures {
            drop_pct,
            severity,
            confidence,
            liquidity_usd: usd,
        }
    }

    fn risk(count: u32, honeypot: bool, severity: Severity, confidence: f64, factors: &[&str]) -> RiskFeatures {
        RiskFeatures {
            risk_factor_count: count,
            is_honeypot: honeypot,
            severity,
            confidence,
            risk_factors: factors.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_liquidity_scenario_high() {
        // 30 (drop >= 50) + 20 (danger) + 18 (0.9 conf) + 10 (>= $1M)
        let score = ImpactScorer::score_liquidity(&liquidity(60.0, Severity::Danger, 0.9, Some(2_000_000.0)));
        assert_eq!(score.score, 78);
        assert_eq!(score.level, ImpactLevel::High);
        assert!(score.reason.contains("Major"));
        assert!(score.reason.contains("large"));
    }

    #[test]
    fn test_liquidity_bands() {
        let s = ImpactScorer::score_liquidity(&liquidity(20.0, Severity::Warning, 0.0, None));
        assert_eq!(s.score, 20);
        assert_eq!(s.level, ImpactLevel::Low);

        let s = ImpactScorer::score_liquidity(&liquidity(35.0, Severity::Warning, 0.5, Some(10_000.0)));
        // 20 + 10 + 10 + 4
        assert_eq!(s.score, 44);
        assert_eq!(s.level, ImpactLevel::Medium);

        let s = ImpactScorer::score_liquidity(&liquidity(99.0, Severity::Critical, 1.0, Some(5_000_000.0)));
        assert_eq!(s.score, 100);

        let s = ImpactScorer::score_liquidity(&liquidity(50.0, Severity::Danger, 0.0, Some(500.0)));
        // 30 + 20 + 0 + 2
        assert_eq!(s.score, 52);
        assert!(s.reason.contains("micro"));
    }

    #[test]
    fn test_liquidity_clamps_out_of_range() {
        let s = ImpactScorer::score_liquidity(&liquidity(-15.0, Severity::Warning, -3.0, Some(-1.0)));
        // 10 (minor) + 10 (warning) + 0 + 2 (micro)
        assert_eq!(s.score, 22);

        let s = ImpactScorer::score_liquidity(&liquidity(80.0, Severity::Critical, 7.5, None));
        // confidence clamped to 1.0 -> 20
        assert_eq!(s.score, 90);
    }

    #[test]
    fn test_risk_honeypot_short_circuits_severity() {
        let s = ImpactScorer::score_risk(&risk(1, true, Severity::Critical, 1.0, &["honeypot"]));
        // 50 + 10 (count) + 15 (conf); honeypot factor not double counted
        assert_eq!(s.score, 75);
        assert_eq!(s.reason, "Honeypot detected");
    }

    #[test]
    fn test_risk_critical_factor_bonus() {
        let s = ImpactScorer::score_risk(&risk(3, false, Severity::Danger, 0.6, &["Blacklisted", "proxy"]));
        // 15 + 20 + 9 + 10
        assert_eq!(s.score, 54);
        assert_eq!(s.level, ImpactLevel::Medium);
        assert!(s.reason.contains("Blacklisted"));

        let s = ImpactScorer::score_risk(&risk(1, false, Severity::Warning, 0.0, &["proxy"]));
        assert_eq!(s.score, 15);
        assert_eq!(s.reason, "1 risk factor detected");
    }

    #[test]
    fn test_risk_clamped_to_100() {
        let s = ImpactScorer::score_risk(&risk(
            9,
            true,
            Severity::Critical,
            1.0,
            &["honeypot", "can_selfdestruct"],
        ));
        // 50 + 30 + 15 + 10 = 105
        assert_eq!(s.score, 100);
        assert_eq!(s.level, ImpactLevel::High);
    }

    #[test]
    fn test_score_bounds_and_levels() {
        let severities = [Severity::Safe, Severity::Warning, Severity::Danger, Severity::Critical];
        for drop in [-10.0, 0.0, 34.9, 35.0, 49.9, 50.0, 69.9, 70.0, 150.0] {
            for sev in severities {
                for conf in [-1.0, 0.0, 0.25, 0.5, 1.0, 2.0] {
                    for usd in [None, Some(0.0), Some(10_000.0), Some(100_000.0), Some(1e9)] {
                        let s = ImpactScorer::score_liquidity(&liquidity(drop, sev, conf, usd));
                        assert!(s.score <= 100);
                        assert_eq!(s.level, ImpactLevel::from_score(s.score));
                    }
                }
            }
        }
        for count in [0, 1, 3, 5, 40] {
            for honeypot in [false, true] {
                for sev in severities {
                    let s = ImpactScorer::score_risk(&risk(count, honeypot, sev, 0.8, &["blacklisted"]));
                    assert!(s.score <= 100);
                    assert_eq!(s.level, ImpactLevel::from_score(s.score));
                }
            }
        }
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ImpactLevel::from_score(70), ImpactLevel::High);
        assert_eq!(ImpactLevel::from_score(69), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_score(40), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_score(39), ImpactLevel::Low);
    }
}
