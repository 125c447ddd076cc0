//! Pattern-table-driven, quality-adjusted, risk-tiered Kelly position sizer.
//!
//! Maps `(pattern, quality_score, risk_tier)` to a position fraction of
//! portfolio value, with an optional external Stage-2 adjustment and
//! lot-size-aware share rounding.

mod lot_size;
mod tables;

pub use lot_size::{round_to_lot, LotSizingResult};
pub use tables::{pattern_stats, quality_multiplier, risk_tier_multiplier, PatternStats, QUALITY_BANDS};

use analysis_core::{AnalysisError, Recommendation, Stage2Assessment, Stage2Validator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Named technical-analysis price patterns with historical win-rate priors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Stage2Breakout,
    Stage1To2,
    VcpBreakout,
    CupHandle,
    TriangleBreakout,
    High60dBreakout,
    Stage2Continuation,
    Ma200Breakout,
    Default,
}

/// Risk posture selected for this sizing call. Deliberately independent of
/// `BacktestConfig.risk_profile` (see DESIGN.md open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Conservative,
    Moderate,
    Aggressive,
}

/// Inputs for one sizing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingRequest {
    pub ticker: String,
    pub pattern: PatternType,
    pub quality_score: f64,
    pub risk_tier: RiskTier,
    /// Portfolio-wide ceiling on any single position, as a fraction (e.g. 0.10).
    pub max_single_position: f64,
}

/// Full audit record of one sizing decision (§4.3 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    pub ticker: String,
    pub pattern: PatternType,
    pub win_rate: f64,
    pub win_loss_ratio: f64,
    pub kelly_fraction: f64,
    pub half_kelly: f64,
    pub quality_multiplier: f64,
    pub quality_label: &'static str,
    pub risk_tier_multiplier: f64,
    pub technical_position_pct: f64,
    pub stage2_factor: Option<f64>,
    pub final_position_pct: f64,
    pub reasoning: String,
}

/// Classic Kelly fraction: `f = max(0, (p*b - (1-p)) / b)`.
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64) -> f64 {
    if win_loss_ratio <= 0.0 {
        return 0.0;
    }
    let p = win_rate;
    let q = 1.0 - p;
    ((p * win_loss_ratio - q) / win_loss_ratio).max(0.0)
}

/// The Kelly sizer. Carries no per-call mutable state; the Stage-2 validator
/// is an optional pluggable collaborator attached at construction.
pub struct KellySizer {
    stage2: Option<Arc<dyn Stage2Validator>>,
}

impl KellySizer {
    pub fn new() -> Self {
        Self { stage2: None }
    }

    pub fn with_stage2_validator(validator: Arc<dyn Stage2Validator>) -> Self {
        Self {
            stage2: Some(validator),
        }
    }

    /// Run the full sizing pipeline for one ticker (§4.3 steps 1-7).
    ///
    /// Async only because step 6 may call out to an external collaborator;
    /// the simulation loop itself stays synchronous (the caller `.await`s
    /// this before any portfolio mutation, per the concurrency model).
    pub async fn size_position(&self, req: &SizingRequest) -> SizingResult {
        let stats = tables::pattern_stats(req.pattern);
        let win_loss_ratio = if stats.avg_loss.abs() > f64::EPSILON {
            stats.avg_win / stats.avg_loss.abs()
        } else {
            0.0
        };

        let raw_kelly = kelly_fraction(stats.win_rate, win_loss_ratio);
        let half_kelly = 0.5 * raw_kelly;

        let (quality_mult, quality_label) = quality_multiplier(req.quality_score);
        let tier_mult = risk_tier_multiplier(req.risk_tier);

        let technical_position_pct = (stats.base_position_pct * quality_mult * tier_mult)
            .max(0.0)
            .min(req.max_single_position);

        let (final_position_pct, stage2_factor) = if req.quality_score >= 70.0 {
            match &self.stage2 {
                Some(validator) => match validator.analyze(&req.ticker).await {
                    Ok(assessment) => {
                        let factor = apply_stage2(assessment);
                        (
                            (technical_position_pct * factor).min(req.max_single_position),
                            Some(factor),
                        )
                    }
                    Err(err) => {
                        tracing::warn!(ticker = %req.ticker, %err, "stage-2 validator failed, falling back to technical sizing");
                        (technical_position_pct, None)
                    }
                },
                None => (technical_position_pct, None),
            }
        } else {
            (technical_position_pct, None)
        };

        let reasoning = format!(
            "pattern={:?} win_rate={:.1}% w/l={:.2} kelly={:.2}% half_kelly={:.2}% quality={:.0}({}) tier_mult={:.2} tech={:.2}% final={:.2}%{}",
            req.pattern,
            stats.win_rate * 100.0,
            win_loss_ratio,
            raw_kelly * 100.0,
            half_kelly * 100.0,
            req.quality_score,
            quality_label,
            tier_mult,
            technical_position_pct * 100.0,
            final_position_pct * 100.0,
            stage2_factor
                .map(|f| format!(" stage2_factor={:.2}", f))
                .unwrap_or_default(),
        );

        SizingResult {
            ticker: req.ticker.clone(),
            pattern: req.pattern,
            win_rate: stats.win_rate,
            win_loss_ratio,
            kelly_fraction: raw_kelly,
            half_kelly,
            quality_multiplier: quality_mult,
            quality_label,
            risk_tier_multiplier: tier_mult,
            technical_position_pct,
            stage2_factor,
            final_position_pct,
            reasoning,
        }
    }
}

impl Default for KellySizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp the Stage-2 collaborator's recommended multiplier to `[0.5, 1.5]`.
fn apply_stage2(assessment: Stage2Assessment) -> f64 {
    assessment.position_adjustment.clamp(0.5, 1.5)
}
