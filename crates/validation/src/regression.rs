//! Regression testing (§4.8): named reference outcomes and per-metric
//! deviation thresholds. Grounded on the original `RegressionTester`,
//! minus its on-disk JSON store — references live in an in-memory map the
//! caller owns and persists however it likes (the teacher's own `db.rs`
//! pattern would be the natural next step if that's ever needed).

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("no reference outcome named '{0}'")]
    ReferenceNotFound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutcome {
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub execution_time_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct RegressionCheck {
    pub passed: bool,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

const RETURN_TOLERANCE: f64 = 0.05;
const DRAWDOWN_TOLERANCE: f64 = 0.05;
const SHARPE_TOLERANCE: f64 = 0.5;

#[derive(Default)]
pub struct RegressionStore {
    references: HashMap<String, ReferenceOutcome>,
}

impl RegressionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, test_name: impl Into<String>, outcome: ReferenceOutcome) {
        self.references.insert(test_name.into(), outcome);
    }

    pub fn get(&self, test_name: &str) -> Option<&ReferenceOutcome> {
        self.references.get(test_name)
    }

    /// Compare `current` against the stored reference for `test_name`.
    pub fn check(&self, test_name: &str, current: &ReferenceOutcome) -> Result<RegressionCheck, RegressionError> {
        let reference = self
            .get(test_name)
            .ok_or_else(|| RegressionError::ReferenceNotFound(test_name.to_string()))?;

        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        let return_deviation = (current.total_return - reference.total_return).abs();
        if return_deviation > RETURN_TOLERANCE {
            failures.push(format!(
                "total_return regressed by {:.2}% (reference {:.2}%, current {:.2}%)",
                return_deviation * 100.0,
                reference.total_return * 100.0,
                current.total_return * 100.0
            ));
        } else if return_deviation > RETURN_TOLERANCE / 2.0 {
            warnings.push(format!("total_return deviation {:.2}% approaching tolerance", return_deviation * 100.0));
        }

        let sharpe_deviation = (current.sharpe - reference.sharpe).abs();
        if sharpe_deviation > SHARPE_TOLERANCE {
            failures.push(format!(
                "sharpe regressed by {:.2} (reference {:.2}, current {:.2})",
                sharpe_deviation, reference.sharpe, current.sharpe
            ));
        } else if sharpe_deviation > SHARPE_TOLERANCE / 2.0 {
            warnings.push(format!("sharpe deviation {:.2} approaching threshold", sharpe_deviation));
        }

        let drawdown_deviation = (current.max_drawdown - reference.max_drawdown).abs();
        if drawdown_deviation > DRAWDOWN_TOLERANCE {
            failures.push(format!(
                "max_drawdown regressed by {:.2}% (reference {:.2}%, current {:.2}%)",
                drawdown_deviation * 100.0,
                reference.max_drawdown * 100.0,
                current.max_drawdown * 100.0
            ));
        }

        let trade_deviation = (current.total_trades as i64 - reference.total_trades as i64).unsigned_abs() as usize;
        let trade_threshold = (reference.total_trades as f64 * 0.20).round().max(5.0) as usize;
        if trade_deviation > trade_threshold {
            failures.push(format!(
                "total_trades changed by {} (reference {}, current {})",
                trade_deviation, reference.total_trades, current.total_trades
            ));
        }

        if current.execution_time_seconds > reference.execution_time_seconds * 1.5 {
            warnings.push(format!(
                "execution time increased from {:.2}s to {:.2}s",
                reference.execution_time_seconds, current.execution_time_seconds
            ));
        }

        Ok(RegressionCheck {
            passed: failures.is_empty(),
            failures,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ReferenceOutcome {
        ReferenceOutcome {
            total_return: 0.20,
            sharpe: 1.5,
            max_drawdown: 0.10,
            total_trades: 50,
            execution_time_seconds: 2.0,
        }
    }

    #[test]
    fn missing_reference_is_an_error() {
        let store = RegressionStore::new();
        let result = store.check("nope", &reference());
        assert!(matches!(result, Err(RegressionError::ReferenceNotFound(_))));
    }

    #[test]
    fn identical_outcome_passes() {
        let mut store = RegressionStore::new();
        store.record("v1", reference());
        let check = store.check("v1", &reference()).unwrap();
        assert!(check.passed);
        assert!(check.failures.is_empty());
    }

    #[test]
    fn a_large_return_drop_fails() {
        let mut store = RegressionStore::new();
        store.record("v1", reference());
        let mut current = reference();
        current.total_return = 0.05;
        let check = store.check("v1", &current).unwrap();
        assert!(!check.passed);
        assert!(check.failures.iter().any(|f| f.contains("total_return")));
    }

    #[test]
    fn a_small_trade_count_shift_is_tolerated() {
        let mut store = RegressionStore::new();
        store.record("v1", reference());
        let mut current = reference();
        current.total_trades = 53;
        let check = store.check("v1", &current).unwrap();
        assert!(check.passed);
    }
}
