//! Trade orchestrator: drives one intent through sizing, risk check,
//! submission, and stop-loss reconciliation inside its account's lane.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::api::ExchangeGateway;
use crate::config::AppConfig;
use crate::markets::MarketResolver;
use crate::models::{
    ExecutionOutcome, Intent, Market, OrderKind, OrderRequest, OrderSide, TradeType,
};
use crate::notify::{FillNotice, Notifier};

use super::dispatcher::IntentHandler;
use super::error::ExecError;
use super::retry::RetryPolicy;
use super::risk::RiskGuard;
use super::sizer::PositionSizer;
use super::stop_loss::StopLossManager;

/// Pipeline stages an intent passes through after leaving the queue.
/// Received and Queued happen before the lane; terminal states are carried
/// by the `ExecutionOutcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sizing,
    RiskCheck,
    Submitting,
    Reconciling,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Sizing => "sizing",
            Stage::RiskCheck => "risk_check",
            Stage::Submitting => "submitting",
            Stage::Reconciling => "reconciling",
        }
    }
}

pub struct Orchestrator {
    gateway: Arc<dyn ExchangeGateway>,
    resolver: Arc<MarketResolver>,
    sizer: PositionSizer,
    risk: RiskGuard,
    stop_loss: StopLossManager,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
    max_slippage: Decimal,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        gateway: Arc<dyn ExchangeGateway>,
        resolver: Arc<MarketResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            resolver,
            sizer: PositionSizer::new(config.scaling_factor),
            risk: RiskGuard::new(config.max_slippage),
            stop_loss: StopLossManager::new(config.stop_loss_ratio),
            retry: RetryPolicy::new(config.max_retries, config.retry_interval),
            notifier,
            max_slippage: config.max_slippage,
        }
    }

    async fn execute(&self, intent: &Intent) -> Result<String, ExecError> {
        let account_index = intent.account_index();
        let market = self
            .resolver
            .get(intent.market_id())
            .ok_or_else(|| {
                ExecError::Validation(format!("market {} not found", intent.market_id()))
            })?
            .clone();

        // Sizing: fresh snapshot every time, a stale one corrupts the delta.
        self.enter(intent, Stage::Sizing);
        let snapshot = self
            .retry
            .call("account_snapshot", || {
                self.gateway.account_snapshot(account_index)
            })
            .await?;
        let book = self
            .retry
            .call("book_top", || self.gateway.book_top(market.market_id))
            .await?;
        let reference_price = book
            .reference_price()
            .ok_or_else(|| ExecError::Validation("order book is empty".to_string()))?;

        let delta = match intent {
            Intent::Trade(trade) => self.sizer.size_trade(
                &snapshot,
                &market,
                trade.trade_type,
                trade.reference_position_ratio,
                reference_price,
            )?,
            Intent::Adjust(adjust) => self.sizer.size_adjustment(
                &snapshot,
                &market,
                adjust.adjustment_type,
                adjust.percentage,
            )?,
        };

        if delta.is_zero() {
            return Ok("position already at target, no order submitted".to_string());
        }
        let side = if delta > Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let base_amount = delta.abs();

        // Risk check: re-read the book right before submitting, in the same
        // lane, so no other submission can slip between check and send.
        self.enter(intent, Stage::RiskCheck);
        let fresh_book = self
            .retry
            .call("book_top", || self.gateway.book_top(market.market_id))
            .await?;
        self.risk.check(side, &fresh_book)?;

        self.enter(intent, Stage::Submitting);
        let request = OrderRequest {
            account_index,
            market_id: market.market_id,
            side,
            base_amount,
            kind: OrderKind::Market {
                max_slippage: self.max_slippage,
            },
            reduce_only: false,
        };
        let result = self
            .retry
            .call("place_order", || self.gateway.place_order(&request))
            .await?;

        info!(
            request_id = %intent.request_id(),
            account = account_index,
            market = market.market_id,
            side = side.as_str(),
            amount = %base_amount,
            order_id = %result.order_id,
            tx_hash = ?result.tx_hash,
            "order submitted"
        );
        self.announce_fill(intent, &market, side, base_amount, reference_price);

        self.enter(intent, Stage::Reconciling);
        let report = self
            .stop_loss
            .reconcile(self.gateway.as_ref(), &self.retry, account_index, &market)
            .await?;

        Ok(format!(
            "{} {} {} at ~{}; {}",
            intent.action(),
            base_amount,
            market.symbol,
            reference_price,
            report.summary()
        ))
    }

    fn enter(&self, intent: &Intent, stage: Stage) {
        debug!(
            request_id = %intent.request_id(),
            account = intent.account_index(),
            stage = stage.as_str(),
            "pipeline stage"
        );
    }

    fn announce_fill(
        &self,
        intent: &Intent,
        market: &Market,
        side: OrderSide,
        base_amount: Decimal,
        price: Decimal,
    ) {
        let closing = matches!(
            intent,
            Intent::Trade(t) if t.trade_type == TradeType::Close
        );
        let notice = FillNotice {
            account_index: intent.account_index(),
            market_id: market.market_id,
            symbol: intent.symbol().to_string(),
            action: intent.action(),
            side,
            base_amount,
            quote_amount: base_amount * price,
            price,
            closing,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier.notify_fill(&notice).await;
        });
    }
}

#[async_trait]
impl IntentHandler for Orchestrator {
    async fn handle(&self, intent: Intent) -> ExecutionOutcome {
        let request_id = intent.request_id().to_string();
        let account_index = intent.account_index();

        match self.execute(&intent).await {
            Ok(detail) => ExecutionOutcome::success(request_id, account_index, detail),
            Err(e) => {
                warn!(
                    request_id = %intent.request_id(),
                    account = account_index,
                    error = %e,
                    "intent did not complete"
                );
                match e.outcome_kind() {
                    crate::models::OutcomeKind::Rejected => {
                        ExecutionOutcome::rejected(request_id, account_index, e.to_string())
                    }
                    _ => ExecutionOutcome::failed(request_id, account_index, e.to_string()),
                }
            }
        }
    }
}
