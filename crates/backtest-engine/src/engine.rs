//! BacktestEngine (C6): builds the trading-day sequence and drives one bar
//! per day in the strict order the concurrency model requires.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;

use analysis_core::ScoringProvider;
use kelly_position_sizer::{KellySizer, RiskTier};

use crate::config::{BacktestConfig, RiskProfile};
use crate::cost_model::CostModel;
use crate::data_provider::{DataProvider, Timeframe};
use crate::error::Result;
use crate::models::BacktestResult;
use crate::performance::PerformanceAnalyzer;
use crate::portfolio_simulator::PortfolioSimulator;
use crate::strategy_runner::{Candidate, StrategyRunner};

/// Injectable trading-calendar function. Default is "every weekday"; a
/// holiday calendar can be swapped in without touching the loop (§9).
pub type TradingCalendar = Arc<dyn Fn(NaiveDate) -> bool + Send + Sync>;

pub fn every_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn trading_days(start: NaiveDate, end: NaiveDate, calendar: &TradingCalendar) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if calendar(current) {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}

fn risk_tier_for(profile: RiskProfile) -> RiskTier {
    match profile {
        RiskProfile::Conservative => RiskTier::Conservative,
        RiskProfile::Moderate => RiskTier::Moderate,
        RiskProfile::Aggressive => RiskTier::Aggressive,
    }
}

pub struct BacktestEngine {
    config: BacktestConfig,
    provider: Arc<dyn DataProvider>,
    cost_model: Arc<dyn CostModel>,
    scoring: Arc<dyn ScoringProvider>,
    sizer: Arc<KellySizer>,
    calendar: TradingCalendar,
}

impl BacktestEngine {
    pub fn new(
        config: BacktestConfig,
        provider: Arc<dyn DataProvider>,
        cost_model: Arc<dyn CostModel>,
        scoring: Arc<dyn ScoringProvider>,
        sizer: Arc<KellySizer>,
    ) -> Self {
        Self {
            config,
            provider,
            cost_model,
            scoring,
            sizer,
            calendar: Arc::new(every_weekday),
        }
    }

    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub async fn run(&self) -> Result<BacktestResult> {
        let started = std::time::Instant::now();
        let risk_tier = risk_tier_for(self.config.risk_profile);
        let runner = StrategyRunner::new(
            Arc::clone(&self.scoring),
            Arc::clone(&self.sizer),
            self.config.score_threshold,
            self.config.max_position_size,
            risk_tier,
        );

        let cost_model = self.cost_model.as_ref();
        let mut simulator = PortfolioSimulator::new(&self.config, cost_model);

        let days = trading_days(self.config.start_date, self.config.end_date, &self.calendar);
        let mut last_day = self.config.start_date;
        let mut last_prices: HashMap<String, Decimal> = HashMap::new();

        for &day in &days {
            last_day = day;

            // 1. universe for the day
            let mut universe: Vec<String> = Vec::new();
            for region in &self.config.regions {
                match self.provider.universe(*region, day).await {
                    Ok(tickers) => universe.extend(tickers),
                    Err(err) => {
                        tracing::warn!(?region, %err, "universe lookup failed for this bar");
                    }
                }
            }
            if !self.config.tickers.is_empty() {
                universe.retain(|t| self.config.tickers.contains(t));
            }

            // 2. point-in-time prices for everything we might touch today
            let mut current_prices: HashMap<String, Decimal> = HashMap::new();
            let mut sectors: HashMap<String, Option<String>> = HashMap::new();
            let mut atrs: HashMap<String, Option<Decimal>> = HashMap::new();

            let mut tickers_of_interest: Vec<String> = universe.clone();
            for ticker in simulator.positions().keys() {
                if !tickers_of_interest.contains(ticker) {
                    tickers_of_interest.push(ticker.clone());
                }
            }

            for ticker in &tickers_of_interest {
                let region = self
                    .config
                    .regions
                    .first()
                    .copied()
                    .unwrap_or(crate::config::Region::KR);
                match self
                    .provider
                    .bars_as_of(ticker, region, self.config.start_date, day, Timeframe::Daily)
                    .await
                {
                    Ok(bars) => {
                        if let Some(bar) = bars.last() {
                            current_prices.insert(ticker.clone(), bar.close);
                        }
                        sectors.insert(ticker.clone(), None);
                        atrs.insert(ticker.clone(), None);
                    }
                    Err(err) => {
                        tracing::warn!(%ticker, %err, "no data for ticker on this bar, skipping");
                    }
                }
            }
            if current_prices.is_empty() {
                // No prices at all: non-fatal, equity is recorded from last-known marks.
                simulator.record_daily_value(day, &last_prices);
                continue;
            }
            for (ticker, price) in &current_prices {
                last_prices.insert(ticker.clone(), *price);
            }

            // 3. mark (no exit yet) happens implicitly: current_prices feeds check_exits next.

            // 4. exit signals, then SELL
            let exits = simulator.check_exits(&current_prices);
            for (ticker, reason) in exits {
                if let Some(&price) = current_prices.get(&ticker) {
                    if let Err(err) = simulator.sell(&ticker, day, price, reason) {
                        tracing::error!(%ticker, %err, "fatal: sell failed");
                        return Err(err);
                    }
                }
            }

            // 5. buy signals, then BUY
            let candidates: Vec<Candidate> = universe
                .iter()
                .filter(|t| !simulator.positions().contains_key(*t))
                .filter_map(|ticker| {
                    current_prices.get(ticker).map(|&price| Candidate {
                        ticker: ticker.clone(),
                        region: self.config.regions.first().copied().unwrap_or(crate::config::Region::KR),
                        price,
                        atr: atrs.get(ticker).copied().flatten(),
                        sector: sectors.get(ticker).cloned().flatten(),
                    })
                })
                .collect();

            let signals = runner.generate_signals(day, candidates).await;
            for signal in &signals {
                match simulator.buy(signal, day, &current_prices) {
                    Ok(()) => {}
                    Err(crate::error::BacktestError::OrderRejected { ticker, reason }) => {
                        tracing::debug!(%ticker, %reason, "order rejected");
                    }
                    Err(err) => {
                        tracing::error!(%err, "fatal: buy failed");
                        return Err(err);
                    }
                }
            }

            // 6. equity record
            simulator.record_daily_value(day, &current_prices);
            simulator.check_invariants()?;
        }

        simulator.close_all_at_end(last_day, &last_prices)?;
        simulator.record_daily_value(last_day, &last_prices);

        let (trades, equity_curve) = simulator.into_trades();
        let analyzer = PerformanceAnalyzer::new(&self.config);
        let metrics = analyzer.analyze(&trades, &equity_curve, None);
        let pattern_metrics = analyzer.by_pattern(&trades);
        let region_metrics = analyzer.by_region(&trades);

        Ok(BacktestResult {
            config: self.config.clone(),
            metrics,
            trades,
            equity_curve,
            pattern_metrics,
            region_metrics: Some(region_metrics),
            execution_time_seconds: started.elapsed().as_secs_f64(),
        })
    }
}
