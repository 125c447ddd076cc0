//! Transaction cost model (C2): commission, slippage, and square-root market
//! impact. Grounded on the original transaction cost model's
//! `StandardCostModel`, with the same three components and the same
//! time-of-day slippage multipliers.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Open,
    Regular,
    Close,
}

impl TimeOfDay {
    fn multiplier(self) -> f64 {
        match self {
            TimeOfDay::Open => 1.5,
            TimeOfDay::Regular => 1.0,
            TimeOfDay::Close => 1.3,
        }
    }
}

/// Full breakdown of one fill's transaction costs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub commission: Decimal,
    pub slippage: Decimal,
    pub market_impact: Decimal,
}

impl CostBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.slippage + self.market_impact
    }
}

/// Pluggable cost model. `ZeroCostModel` is used by idempotence/round-trip
/// tests; `StandardCostModel` is the production default.
pub trait CostModel: Send + Sync {
    fn compute(
        &self,
        side: Side,
        price: Decimal,
        shares: u64,
        time_of_day: TimeOfDay,
        adv: Option<Decimal>,
    ) -> CostBreakdown;
}

/// Commission-rate + bps-slippage + sqrt-impact model.
#[derive(Debug, Clone, Copy)]
pub struct StandardCostModel {
    pub commission_rate: f64,
    pub slippage_bps: f64,
    pub market_impact_coefficient: f64,
}

impl Default for StandardCostModel {
    fn default() -> Self {
        Self {
            commission_rate: 0.00015,
            slippage_bps: 5.0,
            market_impact_coefficient: 0.1,
        }
    }
}

impl CostModel for StandardCostModel {
    fn compute(
        &self,
        _side: Side,
        price: Decimal,
        shares: u64,
        time_of_day: TimeOfDay,
        adv: Option<Decimal>,
    ) -> CostBreakdown {
        let notional = price * Decimal::from(shares);
        let notional_f = notional.to_f64().unwrap_or(0.0);

        let commission = notional * Decimal::from_f64(self.commission_rate).unwrap_or_default();

        let slippage_f =
            notional_f * (self.slippage_bps / 10_000.0) * time_of_day.multiplier();
        let slippage = Decimal::from_f64(slippage_f).unwrap_or_default();

        // sqrt-law impact: scales with sqrt(shares/ADV), not with notional,
        // so quadrupling shares at a fixed ADV roughly doubles the cost.
        let price_f = price.to_f64().unwrap_or(0.0);
        let market_impact = match adv {
            Some(adv) if adv > Decimal::ZERO => {
                let participation = (shares as f64) / adv.to_f64().unwrap_or(1.0);
                let impact_f = self.market_impact_coefficient * price_f * participation.max(0.0).sqrt();
                Decimal::from_f64(impact_f).unwrap_or_default()
            }
            _ => Decimal::ZERO,
        };

        CostBreakdown {
            commission,
            slippage,
            market_impact,
        }
    }
}

/// Cost-free model. Used for idempotence checks where costs must not
/// perturb the comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCostModel;

impl CostModel for ZeroCostModel {
    fn compute(
        &self,
        _side: Side,
        _price: Decimal,
        _shares: u64,
        _time_of_day: TimeOfDay,
        _adv: Option<Decimal>,
    ) -> CostBreakdown {
        CostBreakdown {
            commission: Decimal::ZERO,
            slippage: Decimal::ZERO,
            market_impact: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn kr_default_sanity_check_matches_the_named_figures() {
        // KR_DEFAULT, 100 shares @ 70,000, ADV 5,000,000.
        let model = StandardCostModel::default();
        let costs = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, Some(dec!(5_000_000)));
        assert_eq!(costs.commission, dec!(1050.0000));
        assert_eq!(costs.slippage, dec!(3500));
        assert!(costs.market_impact > Decimal::ZERO);
        assert!(costs.market_impact < dec!(500));
    }

    #[test]
    fn market_impact_scales_as_sqrt_of_shares_at_fixed_adv() {
        let model = StandardCostModel::default();
        let base = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, Some(dec!(5_000_000)));
        let quadrupled = model.compute(Side::Buy, dec!(70_000), 400, TimeOfDay::Regular, Some(dec!(5_000_000)));
        // Quadrupling shares at a fixed ADV multiplies impact by sqrt(4) = 2.
        let ratio = quadrupled.market_impact.to_f64().unwrap() / base.market_impact.to_f64().unwrap();
        assert_relative_eq!(ratio, 2.0, epsilon = 0.01);
    }

    #[test]
    fn time_of_day_slippage_multiplier_scales_the_slippage_component_exactly() {
        let model = StandardCostModel::default();
        let regular = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, None);
        let open = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Open, None);
        let ratio = open.slippage.to_f64().unwrap() / regular.slippage.to_f64().unwrap();
        assert_relative_eq!(ratio, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn commission_is_rate_times_notional() {
        let model = StandardCostModel::default();
        let costs = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, None);
        // notional = 7,000,000; commission = 7,000,000 * 0.00015 = 1050
        assert_eq!(costs.commission, dec!(1050.0000));
    }

    #[test]
    fn close_slippage_multiplier_is_higher_than_regular() {
        let model = StandardCostModel::default();
        let regular = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, None);
        let close = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Close, None);
        assert!(close.slippage > regular.slippage);
    }

    #[test]
    fn missing_adv_yields_zero_impact() {
        let model = StandardCostModel::default();
        let costs = model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, None);
        assert_eq!(costs.market_impact, Decimal::ZERO);
    }

    #[test]
    fn impact_grows_with_participation_rate() {
        let model = StandardCostModel::default();
        let low_participation =
            model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, Some(dec!(1_000_000)));
        let high_participation =
            model.compute(Side::Buy, dec!(70_000), 100, TimeOfDay::Regular, Some(dec!(500)));
        assert!(high_participation.market_impact > low_participation.market_impact);
    }

    #[test]
    fn zero_cost_model_always_returns_zero() {
        let model = ZeroCostModel;
        let costs = model.compute(Side::Sell, dec!(70_000), 100, TimeOfDay::Close, Some(dec!(1000)));
        assert_eq!(costs.total(), Decimal::ZERO);
    }
}
