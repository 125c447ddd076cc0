//! A small, independent bar-by-bar simulator used only to give the
//! validation harness a second code path to diff the production engine
//! against. No Kelly sizing, no pattern table, no portfolio invariants —
//! a single fixed-fraction position per ticker, entered and exited on a
//! plain score-threshold crossing. Grounded on the teacher's original
//! `BacktestEngine` (signal-driven, stop/take-profit bar scan), simplified
//! to the scoring inputs this crate has available.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;

use backtest_engine::HistoricalBar;

/// One ticker's bars plus the score the scoring collaborator produced for
/// it on each of those dates. Built by the caller (typically from the same
/// `DataProvider` and `ScoringProvider` the production engine used).
#[derive(Debug, Clone)]
pub struct TickerSeries {
    pub ticker: String,
    pub bars: Vec<HistoricalBar>,
    pub scores: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ComparatorResult {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
}

/// Signal-driven simulator: go long when a ticker's score crosses above
/// `buy_threshold` while flat, exit when it drops below `sell_threshold`
/// while holding. Each ticker trades its own equal slice of capital,
/// independently of every other ticker.
pub struct VectorizedComparator {
    commission_rate: f64,
    slippage_rate: f64,
    buy_threshold: f64,
    sell_threshold: f64,
}

impl VectorizedComparator {
    pub fn new(commission_rate: f64, slippage_rate: f64, buy_threshold: f64) -> Self {
        Self {
            commission_rate,
            slippage_rate,
            buy_threshold,
            sell_threshold: buy_threshold,
        }
    }

    pub fn run(&self, initial_capital: f64, series: &[TickerSeries]) -> ComparatorResult {
        if series.is_empty() {
            return ComparatorResult {
                total_return: 0.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
                total_trades: 0,
            };
        }

        let per_ticker_capital = initial_capital / series.len() as f64;
        let mut total_trades = 0usize;
        let mut combined: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        for s in series {
            let (trades, equity) = self.run_one(per_ticker_capital, s);
            total_trades += trades;
            for (date, value) in equity {
                *combined.entry(date).or_insert(0.0) += value;
            }
        }

        let values: Vec<f64> = combined.values().copied().collect();
        let total_return = if let (Some(first), Some(last)) = (values.first(), values.last()) {
            if *first != 0.0 {
                (last - first) / first
            } else {
                0.0
            }
        } else {
            0.0
        };

        ComparatorResult {
            total_return,
            sharpe_ratio: daily_sharpe(&values),
            max_drawdown: max_drawdown(&values),
            total_trades,
        }
    }

    fn run_one(&self, capital: f64, s: &TickerSeries) -> (usize, BTreeMap<NaiveDate, f64>) {
        let mut cash = capital;
        let mut shares: f64 = 0.0;
        let mut trades = 0usize;
        let mut equity = BTreeMap::new();

        for bar in &s.bars {
            let price = bar.close.to_f64().unwrap_or(0.0);
            let score = s.scores.get(&bar.date).copied();

            if let Some(score) = score {
                if shares == 0.0 && score >= self.buy_threshold && cash > 0.0 {
                    let buy_price = price * (1.0 + self.slippage_rate);
                    let commission = cash * self.commission_rate;
                    let investable = cash - commission;
                    if buy_price > 0.0 && investable > 0.0 {
                        shares = investable / buy_price;
                        cash = 0.0;
                        trades += 1;
                    }
                } else if shares > 0.0 && score < self.sell_threshold {
                    let sell_price = price * (1.0 - self.slippage_rate);
                    let gross = shares * sell_price;
                    let commission = gross * self.commission_rate;
                    cash += gross - commission;
                    shares = 0.0;
                }
            }

            equity.insert(bar.date, cash + shares * price);
        }

        (trades, equity)
    }
}

fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn daily_sharpe(values: &[f64]) -> f64 {
    let returns = daily_returns(values);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    (mean / std_dev) * (252.0_f64).sqrt()
}

fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > worst {
                worst = dd;
            }
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(d: &str, close: rust_decimal::Decimal) -> HistoricalBar {
        HistoricalBar {
            date: date(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1_000_000),
        }
    }

    #[test]
    fn flat_score_below_threshold_never_trades() {
        let series = TickerSeries {
            ticker: "005930".into(),
            bars: vec![bar("2023-01-02", dec!(100)), bar("2023-01-03", dec!(110))],
            scores: BTreeMap::from([
                (date("2023-01-02"), 10.0),
                (date("2023-01-03"), 10.0),
            ]),
        };
        let comparator = VectorizedComparator::new(0.00015, 0.0005, 70.0);
        let result = comparator.run(1_000_000.0, &[series]);
        assert_eq!(result.total_trades, 0);
    }

    #[test]
    fn rising_price_with_a_qualifying_score_enters_and_profits() {
        let series = TickerSeries {
            ticker: "005930".into(),
            bars: vec![
                bar("2023-01-02", dec!(100)),
                bar("2023-01-03", dec!(110)),
                bar("2023-01-04", dec!(120)),
            ],
            scores: BTreeMap::from([
                (date("2023-01-02"), 80.0),
                (date("2023-01-03"), 80.0),
                (date("2023-01-04"), 80.0),
            ]),
        };
        let comparator = VectorizedComparator::new(0.0, 0.0, 70.0);
        let result = comparator.run(1_000_000.0, &[series]);
        assert_eq!(result.total_trades, 1);
        assert!(result.total_return > 0.0);
    }

    #[test]
    fn empty_universe_yields_a_neutral_result() {
        let comparator = VectorizedComparator::new(0.00015, 0.0005, 70.0);
        let result = comparator.run(1_000_000.0, &[]);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.total_return, 0.0);
    }
}
