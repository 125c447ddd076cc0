//! Cross-engine consistency validation (§4.8): weighted scoring over
//! `{total_return, trade_count, sharpe, max_drawdown}` between the
//! production engine's result and the independent `VectorizedComparator`.
//! Grounded on the original `EngineValidator`/`ConsistencyMonitor` pair,
//! collapsed into a single synchronous scorer (no on-disk history log;
//! callers that want a trend keep the `ValidationReport`s themselves).

use backtest_engine::PerformanceMetrics;

use crate::comparator::ComparatorResult;

/// The four metrics the harness diffs. Lifted out of `PerformanceMetrics`
/// and `ComparatorResult` so callers can construct it from anything, not
/// just those two concrete types.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyInputs {
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
}

impl From<&PerformanceMetrics> for ConsistencyInputs {
    fn from(m: &PerformanceMetrics) -> Self {
        Self {
            total_return: m.total_return,
            sharpe: m.sharpe,
            max_drawdown: m.max_drawdown,
            total_trades: m.total_trades,
        }
    }
}

impl From<&ComparatorResult> for ConsistencyInputs {
    fn from(r: &ComparatorResult) -> Self {
        Self {
            total_return: r.total_return,
            sharpe: r.sharpe_ratio,
            max_drawdown: r.max_drawdown,
            total_trades: r.total_trades,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub validation_passed: bool,
    pub consistency_score: f64,
    pub discrepancies: Vec<String>,
    pub recommendations: Vec<String>,
}

const RETURN_WEIGHT: f64 = 0.40;
const TRADE_COUNT_WEIGHT: f64 = 0.30;
const SHARPE_WEIGHT: f64 = 0.20;
const DRAWDOWN_WEIGHT: f64 = 0.10;

/// Per-metric score below this is reported as a discrepancy, even if the
/// overall weighted score still passes.
const DISCREPANCY_FLOOR: f64 = 0.80;

pub struct ValidationHarness {
    tolerance: f64,
}

impl ValidationHarness {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn validate(&self, production: &ConsistencyInputs, comparator: &ConsistencyInputs) -> ValidationReport {
        let return_score = relative_agreement(production.total_return, comparator.total_return);
        let trade_score = count_agreement(production.total_trades, comparator.total_trades);
        let sharpe_score = relative_agreement(production.sharpe, comparator.sharpe);
        let drawdown_score = relative_agreement(production.max_drawdown, comparator.max_drawdown);

        let consistency_score = RETURN_WEIGHT * return_score
            + TRADE_COUNT_WEIGHT * trade_score
            + SHARPE_WEIGHT * sharpe_score
            + DRAWDOWN_WEIGHT * drawdown_score;

        let mut discrepancies = Vec::new();
        if return_score < DISCREPANCY_FLOOR {
            discrepancies.push(format!(
                "total_return diverges: production={:.4} comparator={:.4}",
                production.total_return, comparator.total_return
            ));
        }
        if trade_score < DISCREPANCY_FLOOR {
            discrepancies.push(format!(
                "trade count diverges: production={} comparator={}",
                production.total_trades, comparator.total_trades
            ));
        }
        if sharpe_score < DISCREPANCY_FLOOR {
            discrepancies.push(format!(
                "sharpe diverges: production={:.4} comparator={:.4}",
                production.sharpe, comparator.sharpe
            ));
        }
        if drawdown_score < DISCREPANCY_FLOOR {
            discrepancies.push(format!(
                "max_drawdown diverges: production={:.4} comparator={:.4}",
                production.max_drawdown, comparator.max_drawdown
            ));
        }

        let recommendations = discrepancies
            .iter()
            .map(|d| format!("Investigate: {d}"))
            .collect();

        ValidationReport {
            validation_passed: consistency_score >= 1.0 - self.tolerance,
            consistency_score,
            discrepancies,
            recommendations,
        }
    }
}

/// `1 - relative_difference`, clamped to `[0, 1]`. The denominator floors
/// at 1.0 so small-magnitude metrics (a near-zero Sharpe, a flat return)
/// don't blow the score up on noise.
fn relative_agreement(a: f64, b: f64) -> f64 {
    let denom = a.abs().max(b.abs()).max(1.0);
    (1.0 - (a - b).abs() / denom).clamp(0.0, 1.0)
}

fn count_agreement(a: usize, b: usize) -> f64 {
    let denom = (a.max(b) as f64).max(1.0);
    (1.0 - (a as f64 - b as f64).abs() / denom).clamp(0.0, 1.0)
}
