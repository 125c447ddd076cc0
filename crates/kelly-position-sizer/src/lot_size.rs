//! Lot-size-aware conversion from a position fraction to an achievable share
//! count, grounded on the original Kelly calculator's
//! `adjust_position_for_lot_size` routine.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Result of converting `final_position_pct` into a concrete order size.
#[derive(Debug, Clone, PartialEq)]
pub struct LotSizingResult {
    pub raw_quantity: u64,
    pub adjusted_quantity: u64,
    pub lot_size: u64,
    /// `Some(..)` when the position was too small to meet a single lot.
    pub warning: Option<String>,
}

/// Convert `final_position_pct` of `portfolio_value` into a share count that
/// is a multiple of `lot_size`, rounding down. `lot_size` of `0` or `1` is
/// treated as "no lot constraint".
pub fn round_to_lot(
    final_position_pct: f64,
    portfolio_value: Decimal,
    price: Decimal,
    lot_size: u64,
) -> LotSizingResult {
    let lot_size = lot_size.max(1);
    let position_value = portfolio_value * Decimal::from_f64(final_position_pct).unwrap_or(Decimal::ZERO);

    let raw_quantity = if price > Decimal::ZERO {
        (position_value / price)
            .floor()
            .to_u64()
            .unwrap_or(0)
    } else {
        0
    };

    let adjusted_quantity = (raw_quantity / lot_size) * lot_size;

    let warning = if adjusted_quantity == 0 && raw_quantity > 0 {
        Some(format!(
            "position too small for one lot: raw_quantity={raw_quantity} lot_size={lot_size}"
        ))
    } else {
        None
    };

    LotSizingResult {
        raw_quantity,
        adjusted_quantity,
        lot_size,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_down_to_nearest_lot() {
        let result = round_to_lot(0.05, dec!(10_000_000), dec!(70_000), 10);
        // position_value = 500,000; raw = 7 shares; adjusted down to 0 (lot=10)
        assert_eq!(result.raw_quantity, 7);
        assert_eq!(result.adjusted_quantity, 0);
        assert!(result.warning.is_some());
    }

    #[test]
    fn achievable_position_has_no_warning() {
        let result = round_to_lot(0.5, dec!(10_000_000), dec!(70_000), 10);
        // position_value = 5,000,000; raw = 71 shares; adjusted down to 70
        assert_eq!(result.raw_quantity, 71);
        assert_eq!(result.adjusted_quantity, 70);
        assert!(result.warning.is_none());
    }

    #[test]
    fn lot_size_of_one_means_no_rounding() {
        let result = round_to_lot(0.5, dec!(10_000_000), dec!(70_000), 1);
        assert_eq!(result.adjusted_quantity, result.raw_quantity);
    }

    #[test]
    fn zero_position_yields_zero_shares_without_warning() {
        let result = round_to_lot(0.0, dec!(10_000_000), dec!(70_000), 10);
        assert_eq!(result.raw_quantity, 0);
        assert_eq!(result.adjusted_quantity, 0);
        assert!(result.warning.is_none());
    }
}
