//! End-to-end scenario tests driving the full `BacktestEngine` over a small
//! synthetic universe, plus the concrete scenarios named in the testable
//! properties.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

use analysis_core::{AnalysisError, LayerScores, ScoringProvider, ScoringResult};
use kelly_position_sizer::KellySizer;

use crate::config::{BacktestConfig, Region, RiskProfile};
use crate::cost_model::{StandardCostModel, ZeroCostModel};
use crate::data_provider::MemoryDataProvider;
use crate::engine::BacktestEngine;
use crate::models::HistoricalBar;

/// Loads `.env` ambient defaults and wires a `tracing` subscriber for this
/// test binary, the way the teacher's binaries do at `main()` entry — tests
/// get the same env-filtered diagnostics the simulation loop emits via spans.
/// `try_init` so running more than one test in the same process doesn't panic
/// on a second global-subscriber install.
fn init_test_harness() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn rising_bars(ticker_start: rust_decimal::Decimal, days: i64, start: NaiveDate, daily_step: rust_decimal::Decimal) -> Vec<HistoricalBar> {
    (0..days)
        .map(|i| {
            let price = ticker_start + daily_step * rust_decimal::Decimal::from(i);
            HistoricalBar {
                date: start + chrono::Duration::days(i),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: dec!(1_000_000),
            }
        })
        .collect()
}

struct FixedScorer {
    score: f64,
}

#[async_trait]
impl ScoringProvider for FixedScorer {
    async fn analyze(&self, ticker: &str, _as_of: NaiveDate) -> Result<Option<ScoringResult>, AnalysisError> {
        Ok(Some(ScoringResult {
            ticker: ticker.to_string(),
            total_score: self.score,
            layer_scores: LayerScores {
                structural: 40.0,
                micro: 30.0,
                macro_: 10.0,
            },
        }))
    }
}

#[tokio::test]
async fn end_to_end_run_preserves_universal_invariants() {
    init_test_harness();
    let provider = MemoryDataProvider::new().with_bars(
        "005930",
        Region::KR,
        rising_bars(dec!(70_000), 40, date("2023-01-02"), dec!(200)),
    );
    let cfg = BacktestConfig::from_risk_profile(
        date("2023-01-02"),
        date("2023-02-10"),
        vec![Region::KR],
        vec![],
        dec!(100_000_000),
        RiskProfile::Moderate,
    )
    .unwrap();

    let engine = BacktestEngine::new(
        cfg,
        Arc::new(provider),
        Arc::new(StandardCostModel::default()),
        Arc::new(FixedScorer { score: 90.0 }),
        Arc::new(KellySizer::new()),
    );

    let result = engine.run().await.unwrap();

    assert!(!result.equity_curve.is_empty());
    let dates = result.equity_curve.dates();
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    for trade in &result.trades {
        assert!(trade.is_closed(), "end-of-backtest sweep must close every position");
        assert!(trade.pnl().is_some());
    }
}

#[tokio::test]
async fn zero_cost_model_never_charges_anything() {
    init_test_harness();
    let provider = MemoryDataProvider::new().with_bars(
        "005930",
        Region::KR,
        rising_bars(dec!(70_000), 20, date("2023-01-02"), dec!(500)),
    );
    let cfg = BacktestConfig::from_risk_profile(
        date("2023-01-02"),
        date("2023-01-25"),
        vec![Region::KR],
        vec![],
        dec!(100_000_000),
        RiskProfile::Aggressive,
    )
    .unwrap();

    let engine = BacktestEngine::new(
        cfg,
        Arc::new(provider),
        Arc::new(ZeroCostModel),
        Arc::new(FixedScorer { score: 90.0 }),
        Arc::new(KellySizer::new()),
    );

    let result = engine.run().await.unwrap();
    for trade in &result.trades {
        assert_eq!(trade.entry_commission, rust_decimal::Decimal::ZERO);
        assert_eq!(trade.exit_commission, rust_decimal::Decimal::ZERO);
    }
}

#[tokio::test]
async fn rerunning_the_same_config_is_deterministic() {
    init_test_harness();
    let build = || {
        let provider = MemoryDataProvider::new().with_bars(
            "005930",
            Region::KR,
            rising_bars(dec!(70_000), 30, date("2023-01-02"), dec!(300)),
        );
        let cfg = BacktestConfig::from_risk_profile(
            date("2023-01-02"),
            date("2023-02-05"),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            RiskProfile::Moderate,
        )
        .unwrap();
        BacktestEngine::new(
            cfg,
            Arc::new(provider),
            Arc::new(StandardCostModel::default()),
            Arc::new(FixedScorer { score: 90.0 }),
            Arc::new(KellySizer::new()),
        )
    };

    let first = build().run().await.unwrap();
    let second = build().run().await.unwrap();

    assert_eq!(first.trades.len(), second.trades.len());
    assert_eq!(first.equity_curve.values(), second.equity_curve.values());
}

#[tokio::test]
async fn below_threshold_scores_never_enter_a_position() {
    init_test_harness();
    let provider = MemoryDataProvider::new().with_bars(
        "005930",
        Region::KR,
        rising_bars(dec!(70_000), 20, date("2023-01-02"), dec!(200)),
    );
    let cfg = BacktestConfig::from_risk_profile(
        date("2023-01-02"),
        date("2023-01-25"),
        vec![Region::KR],
        vec![],
        dec!(100_000_000),
        RiskProfile::Conservative,
    )
    .unwrap();

    let engine = BacktestEngine::new(
        cfg,
        Arc::new(provider),
        Arc::new(StandardCostModel::default()),
        Arc::new(FixedScorer { score: 10.0 }),
        Arc::new(KellySizer::new()),
    );

    let result = engine.run().await.unwrap();
    assert!(result.trades.is_empty());
}
