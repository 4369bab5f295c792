//! Stop-loss reconciliation after every size-changing fill.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::api::ExchangeGateway;
use crate::models::{Market, OrderKind, OrderRequest, OrderSide, PositionSign, StopLossOrder};

use super::error::ExecError;
use super::retry::RetryPolicy;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cancelled: usize,
    pub placed: bool,
    pub kept: bool,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        if self.kept && self.cancelled == 0 {
            "stop-loss already in place".to_string()
        } else if self.placed {
            format!("stop-loss refreshed ({} stale cancelled)", self.cancelled)
        } else if self.cancelled > 0 {
            format!("{} stop-loss order(s) cancelled", self.cancelled)
        } else {
            "no stop-loss change needed".to_string()
        }
    }
}

/// Keeps exactly one active reduce-only stop-loss per open position per
/// market, sized to the position at reconciliation time.
#[derive(Debug, Clone, Copy)]
pub struct StopLossManager {
    stop_loss_ratio: Decimal,
}

impl StopLossManager {
    pub fn new(stop_loss_ratio: Decimal) -> Self {
        Self { stop_loss_ratio }
    }

    /// Trigger sits below entry for longs, above entry for shorts.
    pub fn trigger_price(&self, entry_price: Decimal, sign: PositionSign) -> Decimal {
        match sign {
            PositionSign::Long => entry_price * (Decimal::ONE - self.stop_loss_ratio),
            PositionSign::Short => entry_price * (Decimal::ONE + self.stop_loss_ratio),
        }
    }

    /// Bring the market's stop-loss orders in line with the current position.
    ///
    /// Fetches a fresh snapshot: sizing a stop against anything older would
    /// violate the reduce-only invariant. Idempotent when nothing changed:
    /// an already-correct order is left untouched and no order-mutating
    /// gateway calls are made.
    pub async fn reconcile(
        &self,
        gateway: &dyn ExchangeGateway,
        retry: &RetryPolicy,
        account_index: u32,
        market: &Market,
    ) -> Result<ReconcileReport, ExecError> {
        let snapshot = retry
            .call("account_snapshot", || gateway.account_snapshot(account_index))
            .await?;

        let existing: Vec<StopLossOrder> =
            snapshot.stop_losses(market.market_id).cloned().collect();

        let Some(position) = snapshot.position(market.market_id).cloned() else {
            // Flat: nothing left to protect.
            let mut cancelled = 0;
            for order in &existing {
                retry
                    .call("cancel_order", || {
                        gateway.cancel_order(account_index, market.market_id, order.order_index)
                    })
                    .await
                    .map_err(|e| annotate_partial(e, cancelled > 0))?;
                cancelled += 1;
            }
            if cancelled > 0 {
                info!(
                    account = account_index,
                    market = market.market_id,
                    cancelled,
                    "position flat, cleared stop-loss orders"
                );
            }
            return Ok(ReconcileReport {
                cancelled,
                ..ReconcileReport::default()
            });
        };

        // A stop-loss closes the position: sell for longs, buy for shorts.
        let want_side = if position.is_long() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };

        let mut keep = false;
        let mut stale: Vec<&StopLossOrder> = Vec::new();
        for order in &existing {
            let correct = order.reduce_only
                && order.side() == want_side
                && order.remaining_base_amount == position.size;
            if correct && !keep {
                keep = true;
            } else {
                stale.push(order);
            }
        }

        let mut cancelled = 0;
        for order in &stale {
            retry
                .call("cancel_order", || {
                    gateway.cancel_order(account_index, market.market_id, order.order_index)
                })
                .await
                .map_err(|e| annotate_partial(e, cancelled > 0))?;
            cancelled += 1;
        }

        let placed = if keep {
            false
        } else {
            let trigger_price = self.trigger_price(position.avg_entry_price, position.sign);
            let request = OrderRequest {
                account_index,
                market_id: market.market_id,
                side: want_side,
                base_amount: position.size,
                kind: OrderKind::StopLoss { trigger_price },
                reduce_only: true,
            };
            retry
                .call("place_order", || gateway.place_order(&request))
                .await
                .map_err(|e| annotate_partial(e, cancelled > 0))?;
            info!(
                account = account_index,
                market = market.market_id,
                side = want_side.as_str(),
                size = %position.size,
                trigger = %trigger_price,
                "stop-loss placed"
            );
            true
        };

        Ok(ReconcileReport {
            cancelled,
            placed,
            kept: keep,
        })
    }
}

/// The cancel/place pair is not atomic at the exchange. A failure after the
/// first mutation leaves the position temporarily unprotected; the outcome
/// must say so instead of the warning drowning in logs.
fn annotate_partial(err: ExecError, mutated: bool) -> ExecError {
    if !mutated {
        return err;
    }
    warn!("stop-loss reconciliation interrupted mid-way, position may be unprotected");
    match err {
        ExecError::ExchangeUnavailable { attempts, last_error } => ExecError::ExchangeUnavailable {
            attempts,
            last_error: format!(
                "{last_error}; stop-loss reconciliation incomplete, position unprotected until next pass"
            ),
        },
        ExecError::OrderRejected(detail) => ExecError::OrderRejected(format!(
            "{detail}; stop-loss reconciliation incomplete, position unprotected until next pass"
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GatewayError;
    use crate::engine::testutil::{test_market, test_position, MockGateway};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_places_stop_loss_for_new_long() {
        let gateway = MockGateway::new(dec!(1000));
        gateway.lock().positions =
            vec![test_position(1, dec!(2), PositionSign::Long, dec!(100))];

        let manager = StopLossManager::new(dec!(0.05));
        let report = manager
            .reconcile(&gateway, &retry(), 0, &test_market(1, "ETH"))
            .await
            .unwrap();

        assert!(report.placed);
        assert_eq!(report.cancelled, 0);

        let state = gateway.lock();
        assert_eq!(state.stop_orders.len(), 1);
        let order = &state.stop_orders[0];
        assert!(order.reduce_only);
        assert!(order.is_ask); // long is protected by a sell
        assert_eq!(order.remaining_base_amount, dec!(2));
        assert_eq!(order.trigger_price, dec!(95.00));
    }

    #[tokio::test]
    async fn test_short_trigger_sits_above_entry() {
        let gateway = MockGateway::new(dec!(1000));
        gateway.lock().positions =
            vec![test_position(1, dec!(3), PositionSign::Short, dec!(200))];

        let manager = StopLossManager::new(dec!(0.05));
        manager
            .reconcile(&gateway, &retry(), 0, &test_market(1, "ETH"))
            .await
            .unwrap();

        let state = gateway.lock();
        assert_eq!(state.stop_orders[0].trigger_price, dec!(210.00));
        assert!(!state.stop_orders[0].is_ask); // short is protected by a buy
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let gateway = MockGateway::new(dec!(1000));
        gateway.lock().positions =
            vec![test_position(1, dec!(2), PositionSign::Long, dec!(100))];

        let manager = StopLossManager::new(dec!(0.05));
        let market = test_market(1, "ETH");
        manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();
        let mutations_after_first = gateway.mutation_calls();

        let report = manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();
        assert!(report.kept);
        assert!(!report.placed);
        assert_eq!(report.cancelled, 0);
        assert_eq!(gateway.mutation_calls(), mutations_after_first);
    }

    #[tokio::test]
    async fn test_stale_size_is_replaced() {
        let gateway = MockGateway::new(dec!(1000));
        {
            let mut state = gateway.lock();
            state.positions = vec![test_position(1, dec!(2), PositionSign::Long, dec!(100))];
        }
        let manager = StopLossManager::new(dec!(0.05));
        let market = test_market(1, "ETH");
        manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();

        // Position grows: the resting stop no longer covers it.
        gateway.lock().positions =
            vec![test_position(1, dec!(5), PositionSign::Long, dec!(110))];

        let report = manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert!(report.placed);

        let state = gateway.lock();
        assert_eq!(state.stop_orders.len(), 1);
        assert_eq!(state.stop_orders[0].remaining_base_amount, dec!(5));
    }

    #[tokio::test]
    async fn test_flat_position_clears_stop_orders() {
        let gateway = MockGateway::new(dec!(1000));
        {
            let mut state = gateway.lock();
            state.positions = vec![test_position(1, dec!(2), PositionSign::Long, dec!(100))];
        }
        let manager = StopLossManager::new(dec!(0.05));
        let market = test_market(1, "ETH");
        manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();

        gateway.lock().positions.clear();

        let report = manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert!(gateway.lock().stop_orders.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_reports_unprotected_window() {
        let gateway = MockGateway::new(dec!(1000));
        {
            let mut state = gateway.lock();
            state.positions = vec![test_position(1, dec!(2), PositionSign::Long, dec!(100))];
        }
        let manager = StopLossManager::new(dec!(0.05));
        let market = test_market(1, "ETH");
        manager.reconcile(&gateway, &retry(), 0, &market).await.unwrap();

        // Size changes and the fresh placement keeps failing: the stale stop
        // was already cancelled, so the failure must flag the gap.
        {
            let mut state = gateway.lock();
            state.positions = vec![test_position(1, dec!(5), PositionSign::Long, dec!(110))];
            state.fail_place = Some(GatewayError::Transient("timeout".to_string()));
        }

        let err = manager
            .reconcile(&gateway, &retry(), 0, &market)
            .await
            .unwrap_err();
        match err {
            ExecError::ExchangeUnavailable { last_error, .. } => {
                assert!(last_error.contains("unprotected"));
            }
            other => panic!("expected ExchangeUnavailable, got {other:?}"),
        }
    }
}
