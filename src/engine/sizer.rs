//! Position sizing: ratio-bounded target deltas in base units.

use rust_decimal::Decimal;

use crate::models::{AccountSnapshot, AdjustmentType, Market, PositionSign, TradeType};

use super::error::ExecError;

/// Computes signed base-unit deltas from account state and the reference
/// position ratio. Stateless between calls: the target is recomputed from a
/// fresh snapshot every time, so repeated intents can never accumulate
/// exposure past the ratio cap.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    scaling_factor: Decimal,
}

impl PositionSizer {
    pub fn new(scaling_factor: Decimal) -> Self {
        Self { scaling_factor }
    }

    /// Signed delta that moves the account toward the ratio target.
    ///
    /// Long targets `+notional/price`, short targets the negation; the delta
    /// is `target - current`, so a position already past the target shrinks
    /// back toward it rather than growing. Close returns exactly the negated
    /// current signed size and ignores the ratio.
    pub fn size_trade(
        &self,
        snapshot: &AccountSnapshot,
        market: &Market,
        trade_type: TradeType,
        reference_position_ratio: Decimal,
        reference_price: Decimal,
    ) -> Result<Decimal, ExecError> {
        let current = snapshot
            .position(market.market_id)
            .map(|p| p.signed_size())
            .unwrap_or(Decimal::ZERO);

        if trade_type == TradeType::Close {
            if current.is_zero() {
                return Err(ExecError::Validation(format!(
                    "no position to close in market {}",
                    market.market_id
                )));
            }
            return Ok(-current);
        }

        if reference_price <= Decimal::ZERO {
            return Err(ExecError::Validation(
                "reference price must be positive".to_string(),
            ));
        }

        let notional = snapshot.available_balance * reference_position_ratio * self.scaling_factor;
        let base = market.quantize_base(notional / reference_price);

        if base.is_zero() || base < market.min_base_amount || notional < market.min_quote_amount {
            return Err(ExecError::InsufficientBalance(format!(
                "target of {base} {} ({notional} quote) is below market minimums",
                market.symbol
            )));
        }

        let target = match trade_type {
            TradeType::Long => base,
            TradeType::Short => -base,
            TradeType::Close => unreachable!("close handled above"),
        };

        Ok(target - current)
    }

    /// Signed delta for a percentage adjustment of the current position.
    /// Increase grows in the position's own direction, decrease shrinks it.
    pub fn size_adjustment(
        &self,
        snapshot: &AccountSnapshot,
        market: &Market,
        adjustment_type: AdjustmentType,
        percentage: Decimal,
    ) -> Result<Decimal, ExecError> {
        let position = snapshot.position(market.market_id).ok_or_else(|| {
            ExecError::Validation(format!("no position to adjust in market {}", market.market_id))
        })?;

        let magnitude = market.quantize_base(position.size * percentage);
        if magnitude.is_zero() {
            return Err(ExecError::InsufficientBalance(format!(
                "{}% of {} {} rounds to zero lot size",
                percentage * Decimal::ONE_HUNDRED,
                position.size,
                market.symbol
            )));
        }

        let signed = match adjustment_type {
            AdjustmentType::Increase => magnitude,
            AdjustmentType::Decrease => -magnitude,
        };

        Ok(match position.sign {
            PositionSign::Long => signed,
            PositionSign::Short => -signed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountStatus;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            market_id: 1,
            symbol: "ETH".to_string(),
            status: "active".to_string(),
            price_decimals: 2,
            size_decimals: 4,
            min_base_amount: dec!(0.0001),
            min_quote_amount: dec!(1),
        }
    }

    fn snapshot(balance: Decimal, positions: Vec<crate::models::Position>) -> AccountSnapshot {
        AccountSnapshot {
            available_balance: balance,
            collateral: balance,
            total_asset_value: balance,
            cross_asset_value: Decimal::ZERO,
            status: AccountStatus::Active,
            positions,
            stop_loss_orders: vec![],
        }
    }

    fn position(size: Decimal, sign: PositionSign) -> crate::models::Position {
        crate::models::Position {
            market_id: 1,
            symbol: "ETH".to_string(),
            size,
            sign,
            position_value: Decimal::ZERO,
            avg_entry_price: dec!(1),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_target_notional_is_balance_times_ratio_times_scaling() {
        // balance 100, ratio 0.5, scaling 0.8 -> notional 40, price 1 -> 40 base
        let sizer = PositionSizer::new(dec!(0.8));
        let delta = sizer
            .size_trade(&snapshot(dec!(100), vec![]), &market(), TradeType::Long, dec!(0.5), dec!(1))
            .unwrap();
        assert_eq!(delta, dec!(40));
    }

    #[test]
    fn test_close_negates_current_position_exactly() {
        let sizer = PositionSizer::new(dec!(1));
        let snap = snapshot(dec!(100), vec![position(dec!(80), PositionSign::Long)]);
        let delta = sizer
            .size_trade(&snap, &market(), TradeType::Close, dec!(0.5), dec!(1))
            .unwrap();
        assert_eq!(delta, dec!(-80));

        let snap = snapshot(dec!(100), vec![position(dec!(25), PositionSign::Short)]);
        let delta = sizer
            .size_trade(&snap, &market(), TradeType::Close, dec!(0.5), dec!(1))
            .unwrap();
        assert_eq!(delta, dec!(25));
    }

    #[test]
    fn test_close_without_position_is_rejected() {
        let sizer = PositionSizer::new(dec!(1));
        let result = sizer.size_trade(&snapshot(dec!(100), vec![]), &market(), TradeType::Close, dec!(1), dec!(1));
        assert!(matches!(result, Err(ExecError::Validation(_))));
    }

    #[test]
    fn test_position_past_target_shrinks_toward_it() {
        // target long = 100 * 0.4 = 40; holding 90 already -> delta -50
        let sizer = PositionSizer::new(dec!(1));
        let snap = snapshot(dec!(100), vec![position(dec!(90), PositionSign::Long)]);
        let delta = sizer
            .size_trade(&snap, &market(), TradeType::Long, dec!(0.4), dec!(1))
            .unwrap();
        assert_eq!(delta, dec!(-50));
    }

    #[test]
    fn test_position_at_target_yields_zero_delta() {
        let sizer = PositionSizer::new(dec!(1));
        let snap = snapshot(dec!(100), vec![position(dec!(40), PositionSign::Long)]);
        let delta = sizer
            .size_trade(&snap, &market(), TradeType::Long, dec!(0.4), dec!(1))
            .unwrap();
        assert_eq!(delta, Decimal::ZERO);
    }

    #[test]
    fn test_short_flips_through_existing_long() {
        // short target -40 from +80 -> delta -120, post-trade -40
        let sizer = PositionSizer::new(dec!(1));
        let snap = snapshot(dec!(100), vec![position(dec!(80), PositionSign::Long)]);
        let delta = sizer
            .size_trade(&snap, &market(), TradeType::Short, dec!(0.4), dec!(1))
            .unwrap();
        assert_eq!(delta, dec!(-120));
    }

    #[test]
    fn test_dust_notional_is_insufficient_balance() {
        let sizer = PositionSizer::new(dec!(1));
        let result = sizer.size_trade(
            &snapshot(dec!(0.001), vec![]),
            &market(),
            TradeType::Long,
            dec!(0.5),
            dec!(3000),
        );
        assert!(matches!(result, Err(ExecError::InsufficientBalance(_))));
    }

    #[test]
    fn test_adjustment_increase_and_decrease() {
        let sizer = PositionSizer::new(dec!(1));
        let long = snapshot(dec!(100), vec![position(dec!(10), PositionSign::Long)]);
        assert_eq!(
            sizer.size_adjustment(&long, &market(), AdjustmentType::Increase, dec!(0.5)).unwrap(),
            dec!(5)
        );
        assert_eq!(
            sizer.size_adjustment(&long, &market(), AdjustmentType::Decrease, dec!(0.5)).unwrap(),
            dec!(-5)
        );

        // shorts grow in the negative direction
        let short = snapshot(dec!(100), vec![position(dec!(10), PositionSign::Short)]);
        assert_eq!(
            sizer.size_adjustment(&short, &market(), AdjustmentType::Increase, dec!(0.2)).unwrap(),
            dec!(-2)
        );
        assert_eq!(
            sizer.size_adjustment(&short, &market(), AdjustmentType::Decrease, dec!(0.2)).unwrap(),
            dec!(2)
        );
    }

    #[test]
    fn test_adjustment_without_position_is_rejected() {
        let sizer = PositionSizer::new(dec!(1));
        let result =
            sizer.size_adjustment(&snapshot(dec!(100), vec![]), &market(), AdjustmentType::Increase, dec!(0.5));
        assert!(matches!(result, Err(ExecError::Validation(_))));
    }
}
