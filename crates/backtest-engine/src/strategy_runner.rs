//! Strategy runner (C4): turns one day's candidate universe into qualified
//! buy signals, fanning out scoring calls and folding the result through the
//! pattern-inference ladder and the Kelly sizer.

use std::sync::Arc;

use analysis_core::{LayerScores, ScoringProvider};
use chrono::NaiveDate;
use kelly_position_sizer::{KellySizer, PatternType, RiskTier, SizingRequest, SizingResult};
use rust_decimal::Decimal;

use crate::config::Region;

/// One qualified entry candidate, ready for `PortfolioSimulator::buy`.
#[derive(Debug, Clone)]
pub struct BuySignal {
    pub ticker: String,
    pub region: Region,
    pub price: Decimal,
    pub kelly_fraction: f64,
    pub pattern_type: PatternType,
    pub entry_score: i32,
    pub sector: Option<String>,
    pub atr: Option<Decimal>,
    pub sizing: SizingResult,
}

/// Infer a pattern from a scoring result's layer sub-scores (§4.4 step 3).
/// First matching rule wins.
pub fn infer_pattern(layers: &LayerScores, total_score: f64) -> PatternType {
    if layers.structural >= 35.0 && layers.micro >= 25.0 {
        return PatternType::Stage1To2;
    }
    if layers.micro >= 20.0 && layers.structural >= 25.0 {
        return if total_score >= 80.0 {
            PatternType::VcpBreakout
        } else {
            PatternType::CupHandle
        };
    }
    if layers.macro_ >= 20.0 && layers.structural >= 20.0 {
        return PatternType::High60dBreakout;
    }
    if layers.structural >= 20.0 {
        return PatternType::Stage2Continuation;
    }
    PatternType::Ma200Breakout
}

/// Per-ticker context the runner needs beyond the scoring call: the current
/// price, risk tier, ATR and sector, all supplied by the engine's per-day
/// bookkeeping.
pub struct Candidate {
    pub ticker: String,
    pub region: Region,
    pub price: Decimal,
    pub atr: Option<Decimal>,
    pub sector: Option<String>,
}

pub struct StrategyRunner {
    scoring: Arc<dyn ScoringProvider>,
    sizer: Arc<KellySizer>,
    score_threshold: i32,
    max_single_position: f64,
    risk_tier: RiskTier,
}

impl StrategyRunner {
    pub fn new(
        scoring: Arc<dyn ScoringProvider>,
        sizer: Arc<KellySizer>,
        score_threshold: i32,
        max_single_position: f64,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            scoring,
            sizer,
            score_threshold,
            max_single_position,
            risk_tier,
        }
    }

    /// Score every candidate in parallel, qualify, infer pattern, size.
    /// Scoring failures for a single ticker are logged and that ticker is
    /// dropped; they never abort the bar (§4.4 step 1).
    pub async fn generate_signals(&self, day: NaiveDate, candidates: Vec<Candidate>) -> Vec<BuySignal> {
        let futures = candidates.into_iter().map(|candidate| {
            let scoring = Arc::clone(&self.scoring);
            let sizer = Arc::clone(&self.sizer);
            let threshold = self.score_threshold;
            let max_single_position = self.max_single_position;
            let risk_tier = self.risk_tier;
            async move {
                let result = match scoring.analyze(&candidate.ticker, day).await {
                    Ok(Some(result)) => result,
                    Ok(None) => return None,
                    Err(err) => {
                        tracing::warn!(ticker = %candidate.ticker, %err, "scoring failed, skipping ticker for this bar");
                        return None;
                    }
                };

                if (result.total_score as i32) < threshold {
                    return None;
                }

                let pattern_type = infer_pattern(&result.layer_scores, result.total_score);

                let sizing = sizer
                    .size_position(&SizingRequest {
                        ticker: candidate.ticker.clone(),
                        pattern: pattern_type,
                        quality_score: result.total_score,
                        risk_tier,
                        max_single_position,
                    })
                    .await;

                Some(BuySignal {
                    ticker: candidate.ticker,
                    region: candidate.region,
                    price: candidate.price,
                    kelly_fraction: sizing.final_position_pct,
                    pattern_type,
                    entry_score: result.total_score as i32,
                    sector: candidate.sector,
                    atr: candidate.atr,
                    sizing,
                })
            }
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
