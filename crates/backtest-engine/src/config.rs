use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Markets the engine knows how to trade. Fixed set per the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    KR,
    US,
    CN,
    HK,
    JP,
    VN,
}

/// Preset bundle selecting the sizing/qualification defaults for a run.
/// Independent of `kelly_position_sizer::RiskTier` by design (see
/// DESIGN.md); a caller typically maps one to the other explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

/// Immutable backtest input. Constructed once, never mutated, and passed by
/// shared reference to every downstream component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub regions: Vec<Region>,
    #[serde(default)]
    pub tickers: Vec<String>,
    pub initial_capital: Decimal,
    pub score_threshold: i32,
    pub risk_profile: RiskProfile,
    pub kelly_multiplier: f64,
    pub max_position_size: f64,
    pub max_sector_exposure: f64,
    pub cash_reserve: f64,
    pub stop_loss_atr_multiplier: f64,
    pub stop_loss_min: f64,
    pub stop_loss_max: f64,
    pub profit_target: f64,
    pub commission_rate: f64,
    pub slippage_bps: f64,
}

impl BacktestConfig {
    /// Merge a named risk-profile preset with caller overrides, validating
    /// the result. This is the primary construction path.
    #[allow(clippy::too_many_arguments)]
    pub fn from_risk_profile(
        start_date: NaiveDate,
        end_date: NaiveDate,
        regions: Vec<Region>,
        tickers: Vec<String>,
        initial_capital: Decimal,
        risk_profile: RiskProfile,
    ) -> Result<Self> {
        let preset = match risk_profile {
            RiskProfile::Conservative => PresetOverrides {
                score_threshold: 75,
                kelly_multiplier: 0.5,
                max_position_size: 0.05,
                max_sector_exposure: 0.20,
                cash_reserve: 0.10,
            },
            RiskProfile::Moderate => PresetOverrides {
                score_threshold: 65,
                kelly_multiplier: 0.75,
                max_position_size: 0.10,
                max_sector_exposure: 0.30,
                cash_reserve: 0.05,
            },
            RiskProfile::Aggressive => PresetOverrides {
                score_threshold: 55,
                kelly_multiplier: 1.0,
                max_position_size: 0.20,
                max_sector_exposure: 0.40,
                cash_reserve: 0.0,
            },
        };

        let config = Self {
            start_date,
            end_date,
            regions,
            tickers,
            initial_capital,
            score_threshold: preset.score_threshold,
            risk_profile,
            kelly_multiplier: preset.kelly_multiplier,
            max_position_size: preset.max_position_size,
            max_sector_exposure: preset.max_sector_exposure,
            cash_reserve: preset.cash_reserve,
            stop_loss_atr_multiplier: 2.0,
            stop_loss_min: 0.05,
            stop_loss_max: 0.15,
            profit_target: 0.20,
            commission_rate: 0.00015,
            slippage_bps: 5.0,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_date >= self.end_date {
            return Err(BacktestError::ConfigInvalid(
                "start_date must be before end_date".into(),
            ));
        }
        if self.regions.is_empty() {
            return Err(BacktestError::ConfigInvalid(
                "regions must not be empty".into(),
            ));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::ConfigInvalid(
                "initial_capital must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.kelly_multiplier) || self.kelly_multiplier <= 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "kelly_multiplier must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_position_size) || self.max_position_size <= 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "max_position_size must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_sector_exposure) || self.max_sector_exposure <= 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "max_sector_exposure must be in (0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.cash_reserve) {
            return Err(BacktestError::ConfigInvalid(
                "cash_reserve must be in [0, 1)".into(),
            ));
        }
        if self.stop_loss_atr_multiplier < 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "stop_loss_atr_multiplier must be >= 0".into(),
            ));
        }
        if self.stop_loss_min > self.stop_loss_max {
            return Err(BacktestError::ConfigInvalid(
                "stop_loss_min must be <= stop_loss_max".into(),
            ));
        }
        if self.profit_target <= 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "profit_target must be positive".into(),
            ));
        }
        if self.commission_rate < 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "commission_rate must be >= 0".into(),
            ));
        }
        if self.slippage_bps < 0.0 {
            return Err(BacktestError::ConfigInvalid(
                "slippage_bps must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

struct PresetOverrides {
    score_threshold: i32,
    kelly_multiplier: f64,
    max_position_size: f64,
    max_sector_exposure: f64,
    cash_reserve: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rejects_inverted_date_range() {
        let result = BacktestConfig::from_risk_profile(
            date("2023-12-31"),
            date("2023-01-01"),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            RiskProfile::Moderate,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_regions() {
        let result = BacktestConfig::from_risk_profile(
            date("2023-01-01"),
            date("2023-12-31"),
            vec![],
            vec![],
            dec!(100_000_000),
            RiskProfile::Moderate,
        );
        assert!(result.is_err());
    }

    #[test]
    fn conservative_is_more_cautious_than_aggressive() {
        let conservative = BacktestConfig::from_risk_profile(
            date("2023-01-01"),
            date("2023-12-31"),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            RiskProfile::Conservative,
        )
        .unwrap();
        let aggressive = BacktestConfig::from_risk_profile(
            date("2023-01-01"),
            date("2023-12-31"),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            RiskProfile::Aggressive,
        )
        .unwrap();
        assert!(conservative.max_position_size < aggressive.max_position_size);
        assert!(conservative.cash_reserve > aggressive.cash_reserve);
    }
}
