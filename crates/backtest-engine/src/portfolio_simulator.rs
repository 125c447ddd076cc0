//! Portfolio simulator (C5). Exclusive owner of cash, open positions and the
//! trade ledger for one backtest run. Grounded on the original portfolio
//! simulator's buy/sell/mark/sweep sequencing.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::config::BacktestConfig;
use crate::cost_model::{CostModel, Side, TimeOfDay};
use crate::error::{BacktestError, RejectReason, Result};
use crate::models::{EquityCurve, ExitReason, Position, Trade};
use crate::strategy_runner::BuySignal;

pub struct PortfolioSimulator<'a> {
    config: &'a BacktestConfig,
    cost_model: &'a dyn CostModel,
    cash: Decimal,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    equity_curve: EquityCurve,
    /// Index into `trades` of the currently open trade for a ticker.
    open_trade_index: HashMap<String, usize>,
}

impl<'a> PortfolioSimulator<'a> {
    pub fn new(config: &'a BacktestConfig, cost_model: &'a dyn CostModel) -> Self {
        Self {
            config,
            cost_model,
            cash: config.initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: EquityCurve::new(),
            open_trade_index: HashMap::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &EquityCurve {
        &self.equity_curve
    }

    pub fn into_trades(self) -> (Vec<Trade>, EquityCurve) {
        (self.trades, self.equity_curve)
    }

    fn portfolio_value(&self, current_prices: &HashMap<String, Decimal>) -> Decimal {
        let positions_value: Decimal = self
            .positions
            .values()
            .map(|p| {
                let price = current_prices.get(&p.ticker).copied().unwrap_or(p.entry_price);
                p.market_value(price)
            })
            .sum();
        self.cash + positions_value
    }

    fn sector_exposure(&self, sector: &str, current_prices: &HashMap<String, Decimal>) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.sector.as_deref() == Some(sector))
            .map(|p| {
                let price = current_prices.get(&p.ticker).copied().unwrap_or(p.entry_price);
                p.market_value(price)
            })
            .sum()
    }

    /// §4.5 BUY execution. Returns `Ok(())` on success; a soft
    /// `OrderRejected` on any ordinary rejection (never fatal).
    pub fn buy(
        &mut self,
        signal: &BuySignal,
        day: NaiveDate,
        current_prices: &HashMap<String, Decimal>,
    ) -> Result<()> {
        if self.positions.contains_key(&signal.ticker) {
            return Err(BacktestError::OrderRejected {
                ticker: signal.ticker.clone(),
                reason: RejectReason::DuplicatePosition,
            });
        }

        let portfolio_value = self.portfolio_value(current_prices);
        let portfolio_value_f = portfolio_value.to_f64().unwrap_or(0.0);

        let intended_fraction = signal.kelly_fraction * self.config.kelly_multiplier;
        let capped_fraction = intended_fraction.min(self.config.max_position_size);
        let notional_f = capped_fraction * portfolio_value_f;
        let notional = Decimal::from_f64(notional_f).unwrap_or(Decimal::ZERO);

        let shares = if signal.price > Decimal::ZERO {
            (notional / signal.price).floor().to_u64().unwrap_or(0)
        } else {
            0
        };

        if shares == 0 {
            return Err(BacktestError::OrderRejected {
                ticker: signal.ticker.clone(),
                reason: RejectReason::ZeroShares,
            });
        }

        let time_of_day = TimeOfDay::Regular;
        let costs = self.cost_model.compute(Side::Buy, signal.price, shares, time_of_day, None);
        let fill_value = signal.price * Decimal::from(shares);
        let total_cost = fill_value + costs.total();

        if total_cost > self.cash {
            return Err(BacktestError::OrderRejected {
                ticker: signal.ticker.clone(),
                reason: RejectReason::InsufficientCash,
            });
        }

        let reserve_floor =
            self.config.initial_capital * Decimal::from_f64(self.config.cash_reserve).unwrap_or_default();
        if self.cash - total_cost < reserve_floor {
            return Err(BacktestError::OrderRejected {
                ticker: signal.ticker.clone(),
                reason: RejectReason::BelowCashReserve,
            });
        }

        if let Some(sector) = &signal.sector {
            let existing = self.sector_exposure(sector, current_prices);
            let cap = portfolio_value * Decimal::from_f64(self.config.max_sector_exposure).unwrap_or_default();
            if existing + fill_value > cap {
                return Err(BacktestError::OrderRejected {
                    ticker: signal.ticker.clone(),
                    reason: RejectReason::SectorExposureExceeded,
                });
            }
        }

        let stop_loss_price = match signal.atr {
            Some(atr) if atr > Decimal::ZERO => {
                let raw = signal.price - atr * Decimal::from_f64(self.config.stop_loss_atr_multiplier).unwrap_or_default();
                let floor = signal.price * (Decimal::ONE - Decimal::from_f64(self.config.stop_loss_max).unwrap_or_default());
                let ceiling = signal.price * (Decimal::ONE - Decimal::from_f64(self.config.stop_loss_min).unwrap_or_default());
                raw.clamp(floor, ceiling)
            }
            _ => signal.price * (Decimal::ONE - Decimal::from_f64(self.config.stop_loss_min).unwrap_or_default()),
        };
        let profit_target_price =
            signal.price * (Decimal::ONE + Decimal::from_f64(self.config.profit_target).unwrap_or_default());

        self.cash -= total_cost;

        let position = Position {
            ticker: signal.ticker.clone(),
            region: signal.region,
            entry_date: day,
            entry_price: signal.price,
            shares,
            stop_loss_price,
            profit_target_price,
            pattern_type: signal.pattern_type,
            entry_score: signal.entry_score,
            sector: signal.sector.clone(),
        };

        let trade = Trade::open(&position, costs.commission, costs.slippage + costs.market_impact);
        self.trades.push(trade);
        self.open_trade_index
            .insert(signal.ticker.clone(), self.trades.len() - 1);
        self.positions.insert(signal.ticker.clone(), position);

        Ok(())
    }

    /// §4.5 mark + exit check. Stop-loss takes precedence over profit
    /// target when both would fire the same bar (scenario 6).
    pub fn check_exits(&self, current_prices: &HashMap<String, Decimal>) -> Vec<(String, ExitReason)> {
        let mut exits = Vec::new();
        for (ticker, position) in &self.positions {
            let Some(&price) = current_prices.get(ticker) else {
                continue;
            };
            if price <= position.stop_loss_price {
                exits.push((ticker.clone(), ExitReason::StopLoss));
            } else if price >= position.profit_target_price {
                exits.push((ticker.clone(), ExitReason::ProfitTarget));
            }
        }
        exits
    }

    /// §4.5 SELL execution.
    pub fn sell(
        &mut self,
        ticker: &str,
        day: NaiveDate,
        price: Decimal,
        reason: ExitReason,
    ) -> Result<()> {
        let position = self
            .positions
            .remove(ticker)
            .ok_or_else(|| BacktestError::PortfolioInvariantViolated(format!("sell with no open position: {ticker}")))?;

        let costs = self.cost_model.compute(Side::Sell, price, position.shares, TimeOfDay::Regular, None);
        let proceeds = price * Decimal::from(position.shares) - costs.total();
        self.cash += proceeds;

        let index = self.open_trade_index.remove(ticker).ok_or_else(|| {
            BacktestError::PortfolioInvariantViolated(format!("no open trade ledger entry for {ticker}"))
        })?;
        self.trades[index].close(day, price, reason, costs.commission, costs.slippage + costs.market_impact);

        Ok(())
    }

    /// §4.5 daily equity record.
    pub fn record_daily_value(&mut self, day: NaiveDate, current_prices: &HashMap<String, Decimal>) {
        let value = self.portfolio_value(current_prices);
        self.equity_curve.record(day, value);
    }

    /// §4.6 finalization: close every still-open position at `final_day`'s
    /// price, falling back to entry price if missing.
    pub fn close_all_at_end(&mut self, final_day: NaiveDate, current_prices: &HashMap<String, Decimal>) -> Result<()> {
        let tickers: Vec<String> = self.positions.keys().cloned().collect();
        for ticker in tickers {
            let price = current_prices
                .get(&ticker)
                .copied()
                .unwrap_or_else(|| self.positions[&ticker].entry_price);
            self.sell(&ticker, final_day, price, ExitReason::BacktestEnd)?;
        }
        Ok(())
    }

    /// Universal invariant check (§8), used by tests and by the engine after
    /// every bar.
    pub fn check_invariants(&self) -> Result<()> {
        if self.cash < Decimal::ZERO {
            return Err(BacktestError::PortfolioInvariantViolated(format!(
                "negative cash: {}",
                self.cash
            )));
        }
        let open_trades = self
            .trades
            .iter()
            .filter(|t| !t.is_closed())
            .count();
        if open_trades != self.positions.len() {
            return Err(BacktestError::PortfolioInvariantViolated(format!(
                "open trade count {open_trades} does not match open position count {}",
                self.positions.len()
            )));
        }
        for position in self.positions.values() {
            if position.shares == 0 {
                return Err(BacktestError::PortfolioInvariantViolated(format!(
                    "zero-share position: {}",
                    position.ticker
                )));
            }
            if !(position.stop_loss_price < position.entry_price
                && position.entry_price < position.profit_target_price)
            {
                return Err(BacktestError::PortfolioInvariantViolated(format!(
                    "stop/entry/target ordering violated for {}",
                    position.ticker
                )));
            }
        }
        let tickers: HashSet<&String> = self.positions.keys().collect();
        if tickers.len() != self.positions.len() {
            return Err(BacktestError::PortfolioInvariantViolated(
                "duplicate position keys".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Region, RiskProfile};
    use crate::cost_model::ZeroCostModel;
    use kelly_position_sizer::PatternType;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn config() -> BacktestConfig {
        BacktestConfig::from_risk_profile(
            date("2023-01-01"),
            date("2023-12-31"),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            RiskProfile::Moderate,
        )
        .unwrap()
    }

    fn signal(ticker: &str, price: Decimal, kelly_fraction: f64) -> BuySignal {
        BuySignal {
            ticker: ticker.to_string(),
            region: Region::KR,
            price,
            kelly_fraction,
            pattern_type: PatternType::Stage1To2,
            entry_score: 80,
            sector: None,
            atr: None,
            sizing: unsafe_dummy_sizing_result(),
        }
    }

    fn unsafe_dummy_sizing_result() -> kelly_position_sizer::SizingResult {
        kelly_position_sizer::SizingResult {
            ticker: "dummy".into(),
            pattern: PatternType::Stage1To2,
            win_rate: 0.6,
            win_loss_ratio: 2.0,
            kelly_fraction: 0.1,
            half_kelly: 0.05,
            quality_multiplier: 1.0,
            quality_label: "good",
            risk_tier_multiplier: 0.6,
            technical_position_pct: 0.1,
            stage2_factor: None,
            final_position_pct: 0.1,
            reasoning: String::new(),
        }
    }

    #[test]
    fn buy_then_sell_round_trips_cash_minus_costs() {
        let cfg = config();
        let cost_model = ZeroCostModel;
        let mut sim = PortfolioSimulator::new(&cfg, &cost_model);
        let mut prices = HashMap::new();
        prices.insert("005930".to_string(), dec!(70_000));

        sim.buy(&signal("005930", dec!(70_000), 0.1), date("2023-01-02"), &prices)
            .unwrap();
        assert!(sim.cash() < cfg.initial_capital);

        sim.sell("005930", date("2023-01-03"), dec!(75_000), ExitReason::ProfitTarget)
            .unwrap();
        assert!(sim.positions().is_empty());
        assert!(sim.trades()[0].is_closed());
    }

    #[test]
    fn duplicate_position_is_rejected() {
        let cfg = config();
        let cost_model = ZeroCostModel;
        let mut sim = PortfolioSimulator::new(&cfg, &cost_model);
        let mut prices = HashMap::new();
        prices.insert("005930".to_string(), dec!(70_000));

        sim.buy(&signal("005930", dec!(70_000), 0.1), date("2023-01-02"), &prices)
            .unwrap();
        let result = sim.buy(&signal("005930", dec!(70_000), 0.1), date("2023-01-02"), &prices);
        assert!(matches!(
            result,
            Err(BacktestError::OrderRejected {
                reason: RejectReason::DuplicatePosition,
                ..
            })
        ));
    }

    #[test]
    fn stop_loss_wins_when_both_triggers_fire() {
        let cfg = config();
        let cost_model = ZeroCostModel;
        let mut sim = PortfolioSimulator::new(&cfg, &cost_model);
        let mut prices = HashMap::new();
        prices.insert("005930".to_string(), dec!(100));
        sim.buy(&signal("005930", dec!(100), 0.1), date("2023-01-02"), &prices)
            .unwrap();

        {
            let position = sim.positions.get_mut("005930").unwrap();
            position.stop_loss_price = dec!(95);
            position.profit_target_price = dec!(120);
        }

        let mut gap_prices = HashMap::new();
        gap_prices.insert("005930".to_string(), dec!(95));
        let exits = sim.check_exits(&gap_prices);
        assert_eq!(exits, vec![("005930".to_string(), ExitReason::StopLoss)]);
    }

    #[test]
    fn end_of_backtest_sweep_closes_remaining_positions() {
        let cfg = config();
        let cost_model = ZeroCostModel;
        let mut sim = PortfolioSimulator::new(&cfg, &cost_model);
        let mut prices = HashMap::new();
        prices.insert("005930".to_string(), dec!(70_000));
        sim.buy(&signal("005930", dec!(70_000), 0.1), date("2023-01-02"), &prices)
            .unwrap();

        sim.close_all_at_end(date("2023-12-31"), &prices).unwrap();
        assert!(sim.positions().is_empty());
        assert_eq!(sim.trades()[0].exit_reason, Some(ExitReason::BacktestEnd));
    }

    #[test]
    fn invariants_hold_after_normal_operation() {
        let cfg = config();
        let cost_model = ZeroCostModel;
        let mut sim = PortfolioSimulator::new(&cfg, &cost_model);
        let mut prices = HashMap::new();
        prices.insert("005930".to_string(), dec!(70_000));
        sim.buy(&signal("005930", dec!(70_000), 0.1), date("2023-01-02"), &prices)
            .unwrap();
        sim.record_daily_value(date("2023-01-02"), &prices);
        assert!(sim.check_invariants().is_ok());
    }
}
