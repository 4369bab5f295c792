//! Market metadata and price/size unit handling.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Identifies a market either by numeric id or by trading symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketRef {
    Id(u32),
    Symbol(String),
}

/// Tradable market metadata as listed by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: u32,

    /// Trading pair symbol (e.g., "ETH", "BTC")
    pub symbol: String,

    /// Exchange listing status; only "active" markets are tradable
    #[serde(default)]
    pub status: String,

    /// Decimal places the exchange supports for prices
    pub price_decimals: u32,

    /// Decimal places the exchange supports for base amounts
    pub size_decimals: u32,

    /// Smallest base amount the exchange accepts
    #[serde(default)]
    pub min_base_amount: Decimal,

    /// Smallest notional value the exchange accepts
    #[serde(default)]
    pub min_quote_amount: Decimal,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Round a base amount down to the market's supported size precision.
    pub fn quantize_base(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.size_decimals, RoundingStrategy::ToZero)
    }

    /// Convert a base amount to the exchange's integer wire format.
    pub fn base_to_units(&self, amount: Decimal) -> i64 {
        (amount * Decimal::from(10_i64.pow(self.size_decimals)))
            .trunc()
            .to_i64()
            .unwrap_or(0)
    }

    /// Convert a price to the exchange's integer wire format.
    pub fn price_to_units(&self, price: Decimal) -> i64 {
        (price * Decimal::from(10_i64.pow(self.price_decimals)))
            .trunc()
            .to_i64()
            .unwrap_or(0)
    }
}

/// Best bid/ask of a market's order book.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookTop {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl BookTop {
    /// Mid price when both sides are present, otherwise whichever side exists.
    pub fn reference_price(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }
}
