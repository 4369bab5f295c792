//! Shared test doubles for the execution pipeline.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::api::{ExchangeGateway, GatewayError};
use crate::models::{
    AccountSnapshot, AccountStatus, BookTop, Market, OrderKind, OrderRequest, OrderResult,
    Position, PositionSign, StopLossOrder, StopOrderType,
};

pub fn test_market(market_id: u32, symbol: &str) -> Market {
    Market {
        market_id,
        symbol: symbol.to_string(),
        status: "active".to_string(),
        price_decimals: 2,
        size_decimals: 4,
        min_base_amount: dec!(0.0001),
        min_quote_amount: dec!(1),
    }
}

pub fn test_position(market_id: u32, size: Decimal, sign: PositionSign, entry: Decimal) -> Position {
    Position {
        market_id,
        symbol: "ETH".to_string(),
        size,
        sign,
        position_value: size * entry,
        avg_entry_price: entry,
        unrealized_pnl: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
    }
}

/// Mutable exchange state behind the mock.
pub struct MockState {
    pub balance: Decimal,
    pub positions: Vec<Position>,
    pub stop_orders: Vec<StopLossOrder>,
    pub book: BookTop,
    pub markets: Vec<Market>,
    pub fail_snapshot: Option<GatewayError>,
    pub fail_book: Option<GatewayError>,
    pub fail_place: Option<GatewayError>,
    pub fail_cancel: Option<GatewayError>,
    /// When set, market orders move positions and stop orders rest in state,
    /// so a subsequent snapshot reflects the fill.
    pub simulate_fills: bool,
    pub placed: Vec<OrderRequest>,
}

/// Counting in-memory gateway. Call counters are cumulative; tests diff them
/// across pipeline passes.
pub struct MockGateway {
    pub state: Mutex<MockState>,
    snapshot_calls: AtomicUsize,
    book_calls: AtomicUsize,
    place_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    order_seq: AtomicI64,
}

impl MockGateway {
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: Mutex::new(MockState {
                balance,
                positions: vec![],
                stop_orders: vec![],
                book: BookTop {
                    bid: Some(dec!(99.5)),
                    ask: Some(dec!(100.5)),
                },
                markets: vec![test_market(1, "ETH")],
                fail_snapshot: None,
                fail_book: None,
                fail_place: None,
                fail_cancel: None,
                simulate_fills: true,
                placed: vec![],
            }),
            snapshot_calls: AtomicUsize::new(0),
            book_calls: AtomicUsize::new(0),
            place_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            order_seq: AtomicI64::new(1),
        }
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Order-mutating calls: the idempotence tests count these.
    pub fn mutation_calls(&self) -> usize {
        self.place_calls() + self.cancel_calls()
    }

    fn apply_fill(state: &mut MockState, request: &OrderRequest) {
        let entry = state.book.reference_price().unwrap_or(dec!(100));
        match request.kind {
            OrderKind::Market { .. } => {
                let delta = if request.side.is_ask() {
                    -request.base_amount
                } else {
                    request.base_amount
                };
                let current = state
                    .positions
                    .iter()
                    .find(|p| p.market_id == request.market_id)
                    .map(|p| p.signed_size())
                    .unwrap_or(Decimal::ZERO);
                let next = current + delta;

                state.positions.retain(|p| p.market_id != request.market_id);
                if !next.is_zero() {
                    let sign = if next > Decimal::ZERO {
                        PositionSign::Long
                    } else {
                        PositionSign::Short
                    };
                    state
                        .positions
                        .push(test_position(request.market_id, next.abs(), sign, entry));
                }
            }
            OrderKind::StopLoss { trigger_price } => {
                let order_index = state.stop_orders.len() as i64 + 100;
                state.stop_orders.push(StopLossOrder {
                    order_index,
                    order_id: format!("sl-{order_index}"),
                    market_id: request.market_id,
                    symbol: "ETH".to_string(),
                    trigger_price,
                    limit_price: None,
                    base_amount: request.base_amount,
                    remaining_base_amount: request.base_amount,
                    order_type: StopOrderType::StopLoss,
                    status: "open".to_string(),
                    is_ask: request.side.is_ask(),
                    reduce_only: request.reduce_only,
                });
            }
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn account_snapshot(&self, _account_index: u32) -> Result<AccountSnapshot, GatewayError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(err) = &state.fail_snapshot {
            return Err(err.clone());
        }
        Ok(AccountSnapshot {
            available_balance: state.balance,
            collateral: state.balance,
            total_asset_value: state.balance,
            cross_asset_value: Decimal::ZERO,
            status: AccountStatus::Active,
            positions: state.positions.clone(),
            stop_loss_orders: state.stop_orders.clone(),
        })
    }

    async fn book_top(&self, _market_id: u32) -> Result<BookTop, GatewayError> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(err) = &state.fail_book {
            return Err(err.clone());
        }
        Ok(state.book)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = &state.fail_place {
            return Err(err.clone());
        }
        state.placed.push(request.clone());
        if state.simulate_fills {
            Self::apply_fill(&mut state, request);
        }
        let order_index = self.order_seq.fetch_add(1, Ordering::SeqCst);
        Ok(OrderResult {
            order_index,
            order_id: format!("ord-{order_index}"),
            tx_hash: Some(format!("0x{order_index:064x}")),
        })
    }

    async fn cancel_order(
        &self,
        _account_index: u32,
        market_id: u32,
        order_index: i64,
    ) -> Result<(), GatewayError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = &state.fail_cancel {
            return Err(err.clone());
        }
        state
            .stop_orders
            .retain(|o| !(o.market_id == market_id && o.order_index == order_index));
        Ok(())
    }

    async fn list_markets(&self) -> Result<Vec<Market>, GatewayError> {
        Ok(self.lock().markets.clone())
    }

    async fn status(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
