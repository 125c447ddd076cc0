//! Pattern-probability table and quality bands: static read-only data, no
//! lazy init (see DESIGN.md). Numbers are the historical priors named in the
//! specification, not derived from any single backtest.

use crate::{PatternType, RiskTier};

/// Historical priors for one pattern kind.
#[derive(Debug, Clone, Copy)]
pub struct PatternStats {
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub base_position_pct: f64,
}

const fn stats(win_rate: f64, avg_win: f64, avg_loss: f64, base_position_pct: f64) -> PatternStats {
    PatternStats {
        win_rate,
        avg_win,
        avg_loss,
        base_position_pct,
    }
}

/// Look up the pattern-table entry for a pattern kind. `Default` is the
/// fallback used for tickers the scoring layer could not classify.
pub fn pattern_stats(pattern: PatternType) -> PatternStats {
    match pattern {
        PatternType::Stage2Breakout => stats(0.65, 0.25, 0.08, 0.10),
        PatternType::Stage1To2 => stats(0.58, 0.22, 0.09, 0.08),
        PatternType::VcpBreakout => stats(0.62, 0.20, 0.07, 0.09),
        PatternType::CupHandle => stats(0.55, 0.18, 0.08, 0.07),
        PatternType::TriangleBreakout => stats(0.52, 0.15, 0.09, 0.06),
        PatternType::High60dBreakout => stats(0.54, 0.17, 0.09, 0.07),
        PatternType::Stage2Continuation => stats(0.56, 0.16, 0.08, 0.07),
        PatternType::Ma200Breakout => stats(0.50, 0.14, 0.10, 0.05),
        PatternType::Default => stats(0.45, 0.10, 0.10, 0.03),
    }
}

/// `(score_low, score_high, multiplier, label)`, partitioning `[0, 100]`.
pub const QUALITY_BANDS: [(f64, f64, f64, &str); 6] = [
    (85.0, 100.0, 1.4, "excellent"),
    (75.0, 85.0, 1.3, "strong"),
    (70.0, 75.0, 1.2, "good"),
    (60.0, 70.0, 1.0, "fair"),
    (50.0, 60.0, 0.8, "weak"),
    (0.0, 50.0, 0.6, "poor"),
];

/// Resolve the quality band containing `score`, returning its multiplier and
/// label. Bands are checked high-to-low so a score sitting exactly on a
/// shared boundary (e.g. 70.0) lands in the higher band.
pub fn quality_multiplier(score: f64) -> (f64, &'static str) {
    for &(low, high, mult, label) in QUALITY_BANDS.iter() {
        if score >= low && (score < high || high == 100.0) {
            return (mult, label);
        }
    }
    (0.6, "poor")
}

/// Risk-tier multiplier applied on top of the quality-adjusted base
/// position. Deliberately independent of `BacktestConfig.risk_profile`.
pub fn risk_tier_multiplier(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::Conservative => 0.5,
        RiskTier::Moderate => 0.6,
        RiskTier::Aggressive => 0.75,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_bands_partition_full_range() {
        assert_eq!(quality_multiplier(0.0).0, 0.6);
        assert_eq!(quality_multiplier(49.9).0, 0.6);
        assert_eq!(quality_multiplier(50.0).0, 0.8);
        assert_eq!(quality_multiplier(69.9).0, 1.0);
        assert_eq!(quality_multiplier(70.0).0, 1.2);
        assert_eq!(quality_multiplier(85.0).0, 1.4);
        assert_eq!(quality_multiplier(100.0).0, 1.4);
    }

    #[test]
    fn risk_tiers_are_ordered() {
        assert!(
            risk_tier_multiplier(RiskTier::Conservative)
                < risk_tier_multiplier(RiskTier::Moderate)
        );
        assert!(
            risk_tier_multiplier(RiskTier::Moderate) < risk_tier_multiplier(RiskTier::Aggressive)
        );
    }

    #[test]
    fn unknown_pattern_has_conservative_default_entry() {
        let default_stats = pattern_stats(PatternType::Default);
        let breakout_stats = pattern_stats(PatternType::Stage2Breakout);
        assert!(default_stats.base_position_pct < breakout_stats.base_position_pct);
        assert!(default_stats.win_rate < breakout_stats.win_rate);
    }
}
