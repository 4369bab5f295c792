//! REST adapter for the exchange gateway.
//!
//! Speaks the exchange's JSON API: decimal values travel as strings, order
//! sizes and prices as scaled integers (see `Market::base_to_units`). Each
//! call is authenticated with the owning account's signing credential; error
//! responses are classified once into transient vs. rejected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::{AccountConfig, AppConfig};
use crate::models::{
    AccountSnapshot, AccountStatus, BookTop, Market, OrderKind, OrderRequest, OrderResult,
    Position, PositionSign, StopLossOrder, StopOrderType,
};

use super::gateway::{ExchangeGateway, GatewayError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the exchange REST API.
pub struct RestGateway {
    http: Client,
    base_url: String,
    accounts: HashMap<u32, AccountConfig>,

    // Market metadata cache for wire unit conversion, filled by list_markets
    markets: RwLock<HashMap<u32, Market>>,

    // Monotonic client order index shared across accounts
    order_counter: AtomicI64,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<AccountDto>,
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    #[serde(with = "rust_decimal::serde::str")]
    available_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    collateral: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    total_asset_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    cross_asset_value: Decimal,
    status: u8,
    #[serde(default)]
    positions: Vec<PositionDto>,
}

#[derive(Debug, Deserialize)]
struct PositionDto {
    market_id: u32,
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    position: Decimal,
    sign: i8,
    #[serde(with = "rust_decimal::serde::str")]
    position_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    avg_entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    unrealized_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    realized_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct ActiveOrdersResponse {
    #[serde(default)]
    orders: Vec<ActiveOrderDto>,
}

#[derive(Debug, Deserialize)]
struct ActiveOrderDto {
    order_index: i64,
    #[serde(default)]
    order_id: String,
    market_id: u32,
    #[serde(default)]
    symbol: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(with = "rust_decimal::serde::str")]
    trigger_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    initial_base_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    remaining_base_amount: Decimal,
    #[serde(default)]
    status: String,
    is_ask: bool,
    #[serde(default)]
    reduce_only: bool,
}

#[derive(Debug, Deserialize)]
struct OrderBookOrdersResponse {
    #[serde(default)]
    bids: Vec<BookLevelDto>,
    #[serde(default)]
    asks: Vec<BookLevelDto>,
}

#[derive(Debug, Deserialize)]
struct BookLevelDto {
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderBooksResponse {
    order_books: Vec<OrderBookDto>,
}

#[derive(Debug, Deserialize)]
struct OrderBookDto {
    market_id: u32,
    symbol: String,
    #[serde(default)]
    status: String,
    supported_price_decimals: u32,
    supported_size_decimals: u32,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    min_base_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    min_quote_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    order_index: i64,
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: u16,
}

impl RestGateway {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let accounts = config
            .accounts
            .iter()
            .cloned()
            .map(|a| (a.index, a))
            .collect();

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            accounts,
            markets: RwLock::new(HashMap::new()),
            order_counter: AtomicI64::new(1),
        })
    }

    fn account(&self, account_index: u32) -> Result<&AccountConfig, GatewayError> {
        self.accounts
            .get(&account_index)
            .ok_or_else(|| GatewayError::Rejected(format!("account {account_index} not configured")))
    }

    fn market(&self, market_id: u32) -> Result<Market, GatewayError> {
        let markets = self.markets.read().unwrap_or_else(|e| e.into_inner());
        markets
            .get(&market_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown market {market_id}")))
    }

    fn next_order_index(&self) -> i64 {
        self.order_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_stop_losses(
        &self,
        account: &AccountConfig,
    ) -> Result<Vec<StopLossOrder>, GatewayError> {
        let response = self
            .http
            .get(self.url("/api/v1/accountActiveOrders"))
            .bearer_auth(&account.private_key)
            .query(&[("account_index", account.index.to_string())])
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: ActiveOrdersResponse = decode(response).await?;

        let stop_losses = body
            .orders
            .into_iter()
            .filter_map(|o| {
                let order_type = match o.order_type.as_str() {
                    "stop-loss" => StopOrderType::StopLoss,
                    "stop-loss-limit" => StopOrderType::StopLossLimit,
                    _ => return None,
                };
                Some(StopLossOrder {
                    order_index: o.order_index,
                    order_id: o.order_id,
                    market_id: o.market_id,
                    symbol: o.symbol,
                    trigger_price: o.trigger_price,
                    limit_price: o.price,
                    base_amount: o.initial_base_amount,
                    remaining_base_amount: o.remaining_base_amount,
                    order_type,
                    status: o.status,
                    is_ask: o.is_ask,
                    reduce_only: o.reduce_only,
                })
            })
            .collect();
        Ok(stop_losses)
    }
}

#[async_trait]
impl ExchangeGateway for RestGateway {
    async fn account_snapshot(&self, account_index: u32) -> Result<AccountSnapshot, GatewayError> {
        let account = self.account(account_index)?;

        let response = self
            .http
            .get(self.url("/api/v1/account"))
            .query(&[("by", "index".to_string()), ("value", account_index.to_string())])
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: AccountsResponse = decode(response).await?;

        let dto = body
            .accounts
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Rejected(format!("account {account_index} not found")))?;

        let positions = dto
            .positions
            .into_iter()
            .map(|p| Position {
                market_id: p.market_id,
                symbol: p.symbol,
                size: p.position.abs(),
                sign: PositionSign::from_i8(p.sign),
                position_value: p.position_value,
                avg_entry_price: p.avg_entry_price,
                unrealized_pnl: p.unrealized_pnl,
                realized_pnl: p.realized_pnl,
            })
            .collect();

        let stop_loss_orders = self.fetch_stop_losses(account).await?;

        Ok(AccountSnapshot {
            available_balance: dto.available_balance,
            collateral: dto.collateral,
            total_asset_value: dto.total_asset_value,
            cross_asset_value: dto.cross_asset_value,
            status: if dto.status == 1 {
                AccountStatus::Active
            } else {
                AccountStatus::Inactive
            },
            positions,
            stop_loss_orders,
        })
    }

    async fn book_top(&self, market_id: u32) -> Result<BookTop, GatewayError> {
        let response = self
            .http
            .get(self.url("/api/v1/orderBookOrders"))
            .query(&[("market_id", market_id.to_string()), ("limit", "1".to_string())])
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: OrderBookOrdersResponse = decode(response).await?;

        Ok(BookTop {
            bid: body.bids.first().map(|l| l.price),
            ask: body.asks.first().map(|l| l.price),
        })
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError> {
        let account = self.account(request.account_index)?;
        let market = self.market(request.market_id)?;

        let mut payload = serde_json::json!({
            "account_index": account.index,
            "api_key_index": account.api_key_index,
            "market_index": request.market_id,
            "client_order_index": self.next_order_index(),
            "base_amount": market.base_to_units(request.base_amount),
            "is_ask": request.side.is_ask(),
            "reduce_only": request.reduce_only,
        });
        match request.kind {
            OrderKind::Market { max_slippage } => {
                payload["type"] = "market".into();
                payload["max_slippage"] = max_slippage.to_string().into();
            }
            OrderKind::StopLoss { trigger_price } => {
                payload["type"] = "stop-loss".into();
                payload["trigger_price"] = market.price_to_units(trigger_price).into();
            }
        }

        debug!(
            account = request.account_index,
            market = request.market_id,
            side = request.side.as_str(),
            amount = %request.base_amount,
            "submitting order"
        );

        let response = self
            .http
            .post(self.url("/api/v1/order"))
            .bearer_auth(&account.private_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: PlaceOrderResponse = decode(response).await?;

        Ok(OrderResult {
            order_index: body.order_index,
            order_id: body.order_id,
            tx_hash: body.tx_hash,
        })
    }

    async fn cancel_order(
        &self,
        account_index: u32,
        market_id: u32,
        order_index: i64,
    ) -> Result<(), GatewayError> {
        let account = self.account(account_index)?;

        let payload = serde_json::json!({
            "account_index": account.index,
            "api_key_index": account.api_key_index,
            "market_index": market_id,
            "order_index": order_index,
        });

        let response = self
            .http
            .post(self.url("/api/v1/cancelOrder"))
            .bearer_auth(&account.private_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        error_for_status(response).await?;
        Ok(())
    }

    async fn list_markets(&self) -> Result<Vec<Market>, GatewayError> {
        let response = self
            .http
            .get(self.url("/api/v1/orderBooks"))
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: OrderBooksResponse = decode(response).await?;

        let markets: Vec<Market> = body
            .order_books
            .into_iter()
            .map(|b| Market {
                market_id: b.market_id,
                symbol: b.symbol,
                status: b.status,
                price_decimals: b.supported_price_decimals,
                size_decimals: b.supported_size_decimals,
                min_base_amount: b.min_base_amount.unwrap_or_default(),
                min_quote_amount: b.min_quote_amount.unwrap_or_default(),
            })
            .collect();

        let mut cache = self.markets.write().unwrap_or_else(|e| e.into_inner());
        *cache = markets.iter().map(|m| (m.market_id, m.clone())).collect();

        Ok(markets)
    }

    async fn status(&self) -> Result<(), GatewayError> {
        let response = self
            .http
            .get(self.url("/api/v1/status"))
            .send()
            .await
            .map_err(map_transport_error)?;
        let body: StatusResponse = decode(response).await?;

        if body.status == 200 {
            Ok(())
        } else {
            Err(GatewayError::Transient(format!(
                "exchange reports status {}",
                body.status
            )))
        }
    }
}

/// Network-level failures are transient by definition; the request may never
/// have reached the exchange.
fn map_transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transient(err.to_string())
}

async fn error_for_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(GatewayError::Transient(format!("{status}: {detail}")))
    } else {
        Err(GatewayError::Rejected(format!("{status}: {detail}")))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let response = error_for_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| GatewayError::Rejected(format!("unexpected response body: {e}")))
}
