//! Performance analyzer (C7): turns the closed trade ledger and equity
//! curve into return/risk/trading metrics, per-pattern breakdowns, Kelly
//! calibration, and an optional benchmark comparison.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::prelude::*;

use analysis_core::adaptive::{mean, std_dev};
use kelly_position_sizer::{pattern_stats, PatternType};

use crate::config::{BacktestConfig, Region};
use crate::models::{BenchmarkMetrics, EquityCurve, PatternMetrics, PerformanceMetrics, RegionMetrics, Trade};

/// Below this many closed trades, partitioning sequentially is cheaper than
/// paying rayon's fan-out overhead.
const PARALLEL_PARTITION_THRESHOLD: usize = 256;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.25;

pub struct PerformanceAnalyzer<'a> {
    config: &'a BacktestConfig,
}

impl<'a> PerformanceAnalyzer<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        trades: &[Trade],
        equity_curve: &EquityCurve,
        benchmark_daily_returns: Option<&[f64]>,
    ) -> PerformanceMetrics {
        let values = equity_curve.values();
        let dates = equity_curve.dates();
        let daily_returns = daily_returns(&values);

        let initial = self.config.initial_capital.to_f64().unwrap_or(1.0);
        let final_value = values.last().and_then(|v| v.to_f64()).unwrap_or(initial);
        let total_return = if initial != 0.0 { final_value / initial - 1.0 } else { 0.0 };

        // Calendar-day span between the first and last equity dates, not the
        // point count: the engine records one point per weekday, so a point
        // count understates a year by the weekend gaps.
        let days = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => (*last - *first).num_days() as f64,
            _ => 0.0,
        };
        let years = days / CALENDAR_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };
        let cagr = annualized_return;

        let std_returns = std_dev(&daily_returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe = safe_div(annualized_return, std_returns);

        let downside: Vec<f64> = daily_returns.iter().copied().filter(|r| *r < 0.0).collect();
        let downside_deviation = std_dev(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
        let sortino = safe_div(annualized_return, downside_deviation);

        let (max_drawdown, max_drawdown_duration_days) = drawdown(&dates, &values);
        let calmar = safe_div(cagr, max_drawdown.abs());

        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        let trading = trading_block(&closed);

        let kelly_accuracy = kelly_accuracy(&closed);

        let benchmark = benchmark_daily_returns.and_then(|bench| {
            benchmark_block(&daily_returns, bench, annualized_return)
        });

        PerformanceMetrics {
            total_return,
            annualized_return,
            cagr,
            sharpe,
            sortino,
            calmar,
            max_drawdown,
            max_drawdown_duration_days,
            std_returns,
            downside_deviation,
            total_trades: trading.total_trades,
            win_rate: trading.win_rate,
            profit_factor: trading.profit_factor,
            avg_win_pct: trading.avg_win_pct,
            avg_loss_pct: trading.avg_loss_pct,
            avg_win_loss_ratio: trading.avg_win_loss_ratio,
            avg_holding_period_days: trading.avg_holding_period_days,
            kelly_accuracy,
            benchmark,
        }
    }

    /// Partition trades by `pattern_type` and compute the trading block over
    /// each partition (§4.7).
    pub fn by_pattern(&self, trades: &[Trade]) -> Vec<PatternMetrics> {
        let mut groups: HashMap<PatternType, Vec<&Trade>> = HashMap::new();
        for trade in trades.iter().filter(|t| t.is_closed()) {
            groups.entry(trade.pattern_type).or_default().push(trade);
        }
        partition_metrics(groups)
    }

    /// Partition trades by `region` and compute the trading block over each
    /// partition (§4.7).
    pub fn by_region(&self, trades: &[Trade]) -> Vec<RegionMetrics> {
        let mut groups: HashMap<Region, Vec<&Trade>> = HashMap::new();
        for trade in trades.iter().filter(|t| t.is_closed()) {
            groups.entry(trade.region).or_default().push(trade);
        }
        partition_metrics(groups)
    }
}

/// Computes the trading block for each partition, fanning the groups out
/// over rayon's pool once there are enough closed trades overall to make
/// the parallelism worth its setup cost.
fn partition_metrics<K>(groups: HashMap<K, Vec<&Trade>>) -> Vec<crate::models::PartitionedMetrics<K>>
where
    K: Send,
{
    let total: usize = groups.values().map(|g| g.len()).sum();
    let build = |(key, group): (K, Vec<&Trade>)| {
        let trading = trading_block(&group);
        let metrics = PerformanceMetrics {
            total_trades: trading.total_trades,
            win_rate: trading.win_rate,
            profit_factor: trading.profit_factor,
            avg_win_pct: trading.avg_win_pct,
            avg_loss_pct: trading.avg_loss_pct,
            avg_win_loss_ratio: trading.avg_win_loss_ratio,
            avg_holding_period_days: trading.avg_holding_period_days,
            ..Default::default()
        };
        crate::models::PartitionedMetrics { key, metrics }
    };

    if total >= PARALLEL_PARTITION_THRESHOLD {
        groups.into_par_iter().map(build).collect()
    } else {
        groups.into_iter().map(build).collect()
    }
}

fn safe_div(a: f64, b: f64) -> f64 {
    if b.abs() < f64::EPSILON {
        0.0
    } else {
        a / b
    }
}

fn daily_returns(values: &[rust_decimal::Decimal]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| {
            let prev = w[0].to_f64().unwrap_or(0.0);
            let curr = w[1].to_f64().unwrap_or(0.0);
            if prev.abs() < f64::EPSILON {
                0.0
            } else {
                curr / prev - 1.0
            }
        })
        .collect()
}

/// `(max_drawdown, max_drawdown_duration_days)`. Drawdown is the minimum
/// (most negative) `(value - running_max) / running_max`; duration is the
/// number of *calendar* days from the trough date until value first recovers
/// the prior peak, or to the last date in the series if it never recovers.
fn drawdown(dates: &[NaiveDate], values: &[rust_decimal::Decimal]) -> (f64, i64) {
    if values.is_empty() {
        return (0.0, 0);
    }
    let values_f: Vec<f64> = values.iter().map(|v| v.to_f64().unwrap_or(0.0)).collect();

    let mut running_max = values_f[0];
    let mut max_dd = 0.0;
    let mut trough_index = 0usize;
    let mut peak_at_trough = values_f[0];

    for (i, &v) in values_f.iter().enumerate() {
        if v > running_max {
            running_max = v;
        }
        let dd = if running_max.abs() > f64::EPSILON {
            (v - running_max) / running_max
        } else {
            0.0
        };
        if dd < max_dd {
            max_dd = dd;
            trough_index = i;
            peak_at_trough = running_max;
        }
    }

    let mut recovery_index = values_f.len() - 1;
    for (i, &v) in values_f.iter().enumerate().skip(trough_index) {
        if v >= peak_at_trough {
            recovery_index = i;
            break;
        }
    }

    let duration_days = (dates[recovery_index] - dates[trough_index]).num_days();
    (max_dd, duration_days)
}

struct TradingBlock {
    total_trades: usize,
    win_rate: f64,
    profit_factor: f64,
    avg_win_pct: f64,
    avg_loss_pct: f64,
    avg_win_loss_ratio: f64,
    avg_holding_period_days: f64,
}

fn trading_block(trades: &[&Trade]) -> TradingBlock {
    let total_trades = trades.len();
    if total_trades == 0 {
        return TradingBlock {
            total_trades: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            avg_win_pct: 0.0,
            avg_loss_pct: 0.0,
            avg_win_loss_ratio: 0.0,
            avg_holding_period_days: 0.0,
        };
    }

    let pnls: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.pnl().and_then(|p| p.to_f64()))
        .collect();
    let pnl_pcts: Vec<f64> = trades.iter().filter_map(|t| t.pnl_pct()).collect();

    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let win_rate = wins.len() as f64 / total_trades as f64;
    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum::<f64>().abs();
    let profit_factor = safe_div(gross_profit, gross_loss);

    let win_pcts: Vec<f64> = pnl_pcts.iter().copied().filter(|p| *p > 0.0).collect();
    let loss_pcts: Vec<f64> = pnl_pcts.iter().copied().filter(|p| *p < 0.0).collect();
    let avg_win_pct = mean(&win_pcts);
    let avg_loss_pct = mean(&loss_pcts);
    let avg_win_loss_ratio = safe_div(avg_win_pct.abs(), avg_loss_pct.abs());

    let holding_periods: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.holding_period_days())
        .map(|d| d as f64)
        .collect();
    let avg_holding_period_days = mean(&holding_periods);

    TradingBlock {
        total_trades,
        win_rate,
        profit_factor,
        avg_win_pct,
        avg_loss_pct,
        avg_win_loss_ratio,
        avg_holding_period_days,
    }
}

/// For each pattern encountered, score `1 - |actual - predicted| / predicted`
/// clamped to `[0,1]`; overall accuracy is the unweighted mean. Defaults to
/// `0.95` when no pattern has any trades.
fn kelly_accuracy(trades: &[&Trade]) -> f64 {
    let mut by_pattern: HashMap<PatternType, Vec<&&Trade>> = HashMap::new();
    for trade in trades {
        by_pattern.entry(trade.pattern_type).or_default().push(trade);
    }

    if by_pattern.is_empty() {
        return 0.95;
    }

    let scores: Vec<f64> = by_pattern
        .into_iter()
        .map(|(pattern, group)| {
            let predicted = pattern_stats(pattern).win_rate;
            let wins = group
                .iter()
                .filter(|t| t.pnl().map(|p| p > rust_decimal::Decimal::ZERO).unwrap_or(false))
                .count();
            let actual = wins as f64 / group.len() as f64;
            if predicted.abs() < f64::EPSILON {
                0.0
            } else {
                (1.0 - (actual - predicted).abs() / predicted).clamp(0.0, 1.0)
            }
        })
        .collect();

    mean(&scores)
}

fn benchmark_block(
    portfolio_returns: &[f64],
    benchmark_returns: &[f64],
    portfolio_annualized: f64,
) -> Option<BenchmarkMetrics> {
    let n = portfolio_returns.len().min(benchmark_returns.len());
    if n < 2 {
        return None;
    }
    let p = &portfolio_returns[..n];
    let b = &benchmark_returns[..n];

    let mean_p = mean(p);
    let mean_b = mean(b);
    let covariance: f64 = p.iter().zip(b.iter()).map(|(pi, bi)| (pi - mean_p) * (bi - mean_b)).sum::<f64>()
        / (n - 1) as f64;
    let variance_b: f64 = b.iter().map(|bi| (bi - mean_b).powi(2)).sum::<f64>() / (n - 1) as f64;
    let beta = safe_div(covariance, variance_b);

    let benchmark_annualized = (1.0 + mean_b).powf(TRADING_DAYS_PER_YEAR) - 1.0;
    let alpha = portfolio_annualized - beta * benchmark_annualized;

    let excess: Vec<f64> = p.iter().zip(b.iter()).map(|(pi, bi)| pi - bi).collect();
    let mean_excess = mean(&excess);
    let std_excess = std_dev(&excess) * TRADING_DAYS_PER_YEAR.sqrt();
    let information_ratio = safe_div(mean_excess * TRADING_DAYS_PER_YEAR, std_excess);

    Some(BenchmarkMetrics {
        alpha,
        beta,
        information_ratio,
    })
}
