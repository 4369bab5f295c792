//! Order types crossing the exchange gateway boundary.

use rust_decimal::Decimal;

/// Order direction. On the wire the exchange speaks in `is_ask`:
/// a sell is an ask, a buy is a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_ask(&self) -> bool {
        matches!(self, OrderSide::Sell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Stop order flavor reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOrderType {
    StopLoss,
    StopLossLimit,
}

/// A resting stop-loss order as reported by the exchange.
#[derive(Debug, Clone)]
pub struct StopLossOrder {
    pub order_index: i64,
    pub order_id: String,
    pub market_id: u32,
    pub symbol: String,
    pub trigger_price: Decimal,
    pub limit_price: Option<Decimal>,
    pub base_amount: Decimal,
    pub remaining_base_amount: Decimal,
    pub order_type: StopOrderType,
    pub status: String,
    pub is_ask: bool,

    /// Every stop-loss this system places is reduce-only; orders placed by
    /// other means may not be.
    pub reduce_only: bool,
}

impl StopLossOrder {
    pub fn side(&self) -> OrderSide {
        if self.is_ask {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }
}

/// What kind of order to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Immediate-execution market order, price-bounded by `max_slippage`
    Market { max_slippage: Decimal },
    /// Reduce-only stop-loss resting at `trigger_price`
    StopLoss { trigger_price: Decimal },
}

/// A single order submission to the gateway.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub account_index: u32,
    pub market_id: u32,
    pub side: OrderSide,

    /// Positive base-unit magnitude; direction is carried by `side`
    pub base_amount: Decimal,
    pub kind: OrderKind,
    pub reduce_only: bool,
}

/// Result of a successful order submission.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_index: i64,
    pub order_id: String,
    pub tx_hash: Option<String>,
}
