//! Slippage gate: last check before an order leaves the lane.

use rust_decimal::Decimal;

use crate::models::{BookTop, OrderSide};

use super::error::ExecError;

/// Validates the expected fill price against the reference price. Runs after
/// sizing and before submission, inside the account's serialized lane.
#[derive(Debug, Clone, Copy)]
pub struct RiskGuard {
    max_slippage: Decimal,
}

impl RiskGuard {
    pub fn new(max_slippage: Decimal) -> Self {
        Self { max_slippage }
    }

    /// Fail closed unless the top-of-book fill for `side` is within
    /// `max_slippage` of the book's reference price.
    pub fn check(&self, side: OrderSide, book: &BookTop) -> Result<(), ExecError> {
        let reference = book
            .reference_price()
            .ok_or_else(|| ExecError::Validation("order book is empty".to_string()))?;

        // Buys lift the ask, sells hit the bid.
        let expected = match side {
            OrderSide::Buy => book.ask,
            OrderSide::Sell => book.bid,
        }
        .ok_or_else(|| {
            ExecError::Validation(format!("no {} side in order book", side.as_str()))
        })?;

        let deviation = (expected - reference).abs() / reference;
        if deviation > self.max_slippage {
            return Err(ExecError::SlippageExceeded {
                expected,
                reference,
                max_slippage: self.max_slippage,
            });
        }

        Ok(())
    }
}
