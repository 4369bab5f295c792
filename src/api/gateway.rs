//! Exchange gateway seam: the trait the execution pipeline talks to.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccountSnapshot, BookTop, Market, OrderRequest, OrderResult};

/// Failure class of a gateway call, decided once per call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Timeouts, rate limits, 5xx responses. Safe to retry.
    #[error("transient exchange failure: {0}")]
    Transient(String),

    /// The exchange rejected the request (bad signature, insufficient
    /// margin, unknown market). Retrying will not help.
    #[error("exchange rejected request: {0}")]
    Rejected(String),
}

/// Boundary to the exchange. Implementations submit orders and fetch
/// account/market state; all business decisions stay on the caller's side.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Fresh account state: balances, positions, resting stop-loss orders.
    async fn account_snapshot(&self, account_index: u32) -> Result<AccountSnapshot, GatewayError>;

    /// Best bid/ask for a market.
    async fn book_top(&self, market_id: u32) -> Result<BookTop, GatewayError>;

    /// Submit an order. The request's side/size/kind fully describe it.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError>;

    /// Cancel a resting order by exchange order index.
    async fn cancel_order(
        &self,
        account_index: u32,
        market_id: u32,
        order_index: i64,
    ) -> Result<(), GatewayError>;

    /// All listed markets with their metadata.
    async fn list_markets(&self) -> Result<Vec<Market>, GatewayError>;

    /// Exchange liveness probe.
    async fn status(&self) -> Result<(), GatewayError>;
}
