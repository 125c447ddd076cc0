//! Named cost-model presets (C8). A thin registry over `StandardCostModel`
//! so callers can select a market's typical cost structure by name instead
//! of hand-tuning coefficients.

use std::collections::HashMap;

use crate::cost_model::StandardCostModel;

/// A named, reusable cost profile.
#[derive(Debug, Clone, Copy)]
pub struct CostProfile {
    pub name: &'static str,
    pub model: StandardCostModel,
}

pub struct CostProfileRegistry {
    profiles: HashMap<&'static str, CostProfile>,
}

impl CostProfileRegistry {
    pub fn with_defaults() -> Self {
        let mut profiles = HashMap::new();
        for profile in default_profiles() {
            profiles.insert(profile.name, profile);
        }
        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<CostProfile> {
        self.profiles.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.profiles.keys().copied().collect()
    }
}

fn default_profiles() -> Vec<CostProfile> {
    vec![
        CostProfile {
            name: "kr_default",
            model: StandardCostModel {
                commission_rate: 0.00015,
                slippage_bps: 5.0,
                market_impact_coefficient: 0.1,
            },
        },
        CostProfile {
            name: "kr_low_cost",
            model: StandardCostModel {
                commission_rate: 0.00005,
                slippage_bps: 2.0,
                market_impact_coefficient: 0.05,
            },
        },
        CostProfile {
            name: "kr_high_cost",
            model: StandardCostModel {
                commission_rate: 0.00030,
                slippage_bps: 10.0,
                market_impact_coefficient: 0.2,
            },
        },
        CostProfile {
            name: "us_default",
            model: StandardCostModel {
                commission_rate: 0.0,
                slippage_bps: 3.0,
                market_impact_coefficient: 0.08,
            },
        },
        CostProfile {
            name: "zero",
            model: StandardCostModel {
                commission_rate: 0.0,
                slippage_bps: 0.0,
                market_impact_coefficient: 0.0,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kr_default_is_registered() {
        let registry = CostProfileRegistry::with_defaults();
        assert!(registry.get("kr_default").is_some());
    }

    #[test]
    fn unknown_profile_returns_none() {
        let registry = CostProfileRegistry::with_defaults();
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn zero_profile_has_no_costs() {
        let registry = CostProfileRegistry::with_defaults();
        let zero = registry.get("zero").unwrap();
        assert_eq!(zero.model.commission_rate, 0.0);
        assert_eq!(zero.model.slippage_bps, 0.0);
        assert_eq!(zero.model.market_impact_coefficient, 0.0);
    }
}
