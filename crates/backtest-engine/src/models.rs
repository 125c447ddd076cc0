use chrono::NaiveDate;
use kelly_position_sizer::PatternType;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Region;

/// Point-in-time OHLCV bar as returned by a `DataProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A held position, owned exclusively by the `PortfolioSimulator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub region: Region,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub shares: u64,
    pub stop_loss_price: Decimal,
    pub profit_target_price: Decimal,
    pub pattern_type: PatternType,
    pub entry_score: i32,
    pub sector: Option<String>,
}

impl Position {
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * Decimal::from(self.shares)
    }

    pub fn market_value(&self, current_price: Decimal) -> Decimal {
        current_price * Decimal::from(self.shares)
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    Stage3Exit,
    Manual,
    BacktestEnd,
}

/// An append-only trade ledger entry. Immutable once `close` has been called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub region: Region,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub shares: u64,
    pub entry_commission: Decimal,
    pub entry_slippage: Decimal,
    pub pattern_type: PatternType,
    pub entry_score: i32,
    pub sector: Option<String>,

    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub exit_commission: Decimal,
    pub exit_slippage: Decimal,
}

impl Trade {
    pub fn open(position: &Position, entry_commission: Decimal, entry_slippage: Decimal) -> Self {
        Self {
            ticker: position.ticker.clone(),
            region: position.region,
            entry_date: position.entry_date,
            entry_price: position.entry_price,
            shares: position.shares,
            entry_commission,
            entry_slippage,
            pattern_type: position.pattern_type,
            entry_score: position.entry_score,
            sector: position.sector.clone(),
            exit_date: None,
            exit_price: None,
            exit_reason: None,
            exit_commission: Decimal::ZERO,
            exit_slippage: Decimal::ZERO,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exit_date.is_some()
    }

    pub fn close(
        &mut self,
        exit_date: NaiveDate,
        exit_price: Decimal,
        exit_reason: ExitReason,
        exit_commission: Decimal,
        exit_slippage: Decimal,
    ) {
        self.exit_date = Some(exit_date);
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(exit_reason);
        self.exit_commission = exit_commission;
        self.exit_slippage = exit_slippage;
    }

    /// `(exit - entry) * shares - commission - slippage`. `None` until closed.
    pub fn pnl(&self) -> Option<Decimal> {
        let exit_price = self.exit_price?;
        let gross = (exit_price - self.entry_price) * Decimal::from(self.shares);
        Some(gross - self.entry_commission - self.entry_slippage - self.exit_commission - self.exit_slippage)
    }

    /// `(exit - entry) / entry`. `None` until closed.
    pub fn pnl_pct(&self) -> Option<f64> {
        let exit_price = self.exit_price?;
        let entry = self.entry_price;
        if entry == Decimal::ZERO {
            return Some(0.0);
        }
        ((exit_price - entry) / entry).to_f64()
    }

    pub fn holding_period_days(&self) -> Option<i64> {
        self.exit_date.map(|exit| (exit - self.entry_date).num_days())
    }
}

/// Ordered, monotone-in-date, at-most-one-point-per-day equity series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityCurve {
    points: BTreeMap<NaiveDate, Decimal>,
}

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value for `date`. Overwrites any existing point for that
    /// date rather than appending a duplicate.
    pub fn record(&mut self, date: NaiveDate, value: Decimal) {
        self.points.insert(date, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Decimal)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_value(&self) -> Option<Decimal> {
        self.points.values().next().copied()
    }

    pub fn last_value(&self) -> Option<Decimal> {
        self.points.values().last().copied()
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.points.values().copied().collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.keys().copied().collect()
    }
}

/// Return/risk/trading metrics. Shared shape used for the overall result and
/// for every pattern/region partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Return block
    pub total_return: f64,
    pub annualized_return: f64,
    pub cagr: f64,

    // Risk block
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_days: i64,
    pub std_returns: f64,
    pub downside_deviation: f64,

    // Trading block
    pub total_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub avg_win_loss_ratio: f64,
    pub avg_holding_period_days: f64,

    pub kelly_accuracy: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkMetrics>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub alpha: f64,
    pub beta: f64,
    pub information_ratio: f64,
}

/// `PerformanceMetrics` partitioned by a discriminant (pattern kind or
/// region).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionedMetrics<K> {
    pub key: K,
    pub metrics: PerformanceMetrics,
}

pub type PatternMetrics = PartitionedMetrics<PatternType>;
pub type RegionMetrics = PartitionedMetrics<Region>;

/// Sealed, pure output of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: crate::config::BacktestConfig,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
    pub pattern_metrics: Vec<PatternMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_metrics: Option<Vec<RegionMetrics>>,
    pub execution_time_seconds: f64,
}
