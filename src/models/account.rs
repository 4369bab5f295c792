//! Account snapshot and position models as fetched from the exchange.

use rust_decimal::Decimal;

use super::order::StopLossOrder;

/// Exchange-side account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Inactive,
    Active,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSign {
    Long,
    Short,
}

impl PositionSign {
    /// Exchange wire representation: +1 long, -1 short.
    pub fn from_i8(sign: i8) -> Self {
        if sign < 0 {
            PositionSign::Short
        } else {
            PositionSign::Long
        }
    }
}

/// Open exposure in one market. A size of zero is equivalent to no position.
#[derive(Debug, Clone)]
pub struct Position {
    pub market_id: u32,
    pub symbol: String,

    /// Unsigned magnitude in base units; direction lives in `sign`
    pub size: Decimal,
    pub sign: PositionSign,

    pub position_value: Decimal,
    pub avg_entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn signed_size(&self) -> Decimal {
        match self.sign {
            PositionSign::Long => self.size,
            PositionSign::Short => -self.size,
        }
    }

    pub fn is_long(&self) -> bool {
        self.sign == PositionSign::Long
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

/// Point-in-time view of one account, fetched on demand from the exchange.
///
/// Never cached across pipeline stages: sizing against a stale snapshot would
/// produce wrong deltas.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub available_balance: Decimal,
    pub collateral: Decimal,
    pub total_asset_value: Decimal,
    pub cross_asset_value: Decimal,
    pub status: AccountStatus,
    pub positions: Vec<Position>,
    pub stop_loss_orders: Vec<StopLossOrder>,
}

impl AccountSnapshot {
    /// Open position for a market, if any. Zero-size positions count as absent.
    pub fn position(&self, market_id: u32) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.market_id == market_id && !p.is_flat())
    }

    /// Stop-loss orders currently resting for a market.
    pub fn stop_losses(&self, market_id: u32) -> impl Iterator<Item = &StopLossOrder> {
        self.stop_loss_orders
            .iter()
            .filter(move |o| o.market_id == market_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(market_id: u32, size: Decimal, sign: PositionSign) -> Position {
        Position {
            market_id,
            symbol: "ETH".to_string(),
            size,
            sign,
            position_value: dec!(0),
            avg_entry_price: dec!(100),
            unrealized_pnl: dec!(0),
            realized_pnl: dec!(0),
        }
    }

    #[test]
    fn test_signed_size() {
        assert_eq!(position(1, dec!(5), PositionSign::Long).signed_size(), dec!(5));
        assert_eq!(position(1, dec!(5), PositionSign::Short).signed_size(), dec!(-5));
    }

    #[test]
    fn test_zero_size_position_is_absent() {
        let snapshot = AccountSnapshot {
            available_balance: dec!(100),
            collateral: dec!(100),
            total_asset_value: dec!(100),
            cross_asset_value: dec!(0),
            status: AccountStatus::Active,
            positions: vec![position(7, dec!(0), PositionSign::Long)],
            stop_loss_orders: vec![],
        };
        assert!(snapshot.position(7).is_none());
    }
}
