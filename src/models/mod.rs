//! Data models for intents, accounts, positions, orders, and markets.

mod account;
mod intent;
mod market;
mod order;

pub use account::{AccountSnapshot, AccountStatus, Position, PositionSign};
pub use intent::{
    AdjustIntent, AdjustRequest, AdjustmentType, ExecutionOutcome, Intent, OutcomeKind,
    TradeIntent, TradeRequest, TradeType,
};
pub use market::{BookTop, Market, MarketRef};
pub use order::{OrderKind, OrderRequest, OrderResult, OrderSide, StopLossOrder, StopOrderType};
