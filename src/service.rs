//! Inbound boundary: validate, resolve, and enqueue trade requests.
//!
//! The synchronous surface only ever reports queuing acceptance or an
//! immediate validation rejection. Execution results arrive asynchronously
//! through the outcome store and the notifier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::ExchangeGateway;
use crate::config::AppConfig;
use crate::engine::{DispatchError, Dispatcher, Orchestrator, OutcomeSink};
use crate::health::HealthFlag;
use crate::markets::MarketResolver;
use crate::models::{
    AdjustIntent, AdjustRequest, ExecutionOutcome, Intent, MarketRef, TradeIntent, TradeRequest,
    TradeType,
};
use crate::notify::Notifier;
use crate::registry::AccountRegistry;

/// Why a submission was refused at the door.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("request {0} was already accepted")]
    DuplicateRequest(String),

    #[error("queue for account {0} is full, retry later")]
    Backpressure(u32),

    #[error("exchange is unhealthy, refusing new submissions")]
    Unhealthy,
}

impl From<DispatchError> for SubmitError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::DuplicateRequest(id) => SubmitError::DuplicateRequest(id),
            DispatchError::Backpressure(account) => SubmitError::Backpressure(account),
        }
    }
}

/// Synchronous acknowledgement: the request is queued, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub request_id: String,
}

/// Terminal outcomes by request id, plus notification fan-out.
pub struct OutcomeStore {
    outcomes: RwLock<HashMap<String, ExecutionOutcome>>,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeStore {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            outcomes: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    pub async fn get(&self, request_id: &str) -> Option<ExecutionOutcome> {
        self.outcomes.read().await.get(request_id).cloned()
    }
}

#[async_trait]
impl OutcomeSink for OutcomeStore {
    async fn publish(&self, outcome: ExecutionOutcome) {
        self.outcomes
            .write()
            .await
            .insert(outcome.request_id.clone(), outcome.clone());

        // fire-and-forget: a failed notification never fails the trade
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier.notify_outcome(&outcome).await;
        });
    }
}

/// The mirror engine's caller-facing API.
pub struct MirrorService {
    registry: Arc<AccountRegistry>,
    resolver: Arc<MarketResolver>,
    dispatcher: Dispatcher<Orchestrator>,
    outcomes: Arc<OutcomeStore>,
    health: HealthFlag,
}

impl MirrorService {
    pub fn new(
        config: &AppConfig,
        gateway: Arc<dyn ExchangeGateway>,
        resolver: Arc<MarketResolver>,
        notifier: Arc<dyn Notifier>,
        health: HealthFlag,
    ) -> Self {
        let registry = Arc::new(AccountRegistry::new(
            config.l1_address.clone(),
            config.accounts.clone(),
        ));
        let outcomes = Arc::new(OutcomeStore::new(notifier.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            gateway,
            resolver.clone(),
            notifier,
        ));
        let dispatcher = Dispatcher::new(
            orchestrator,
            outcomes.clone() as Arc<dyn OutcomeSink>,
            config.queue_bound,
            config.worker_pool_size,
        );

        Self {
            registry,
            resolver,
            dispatcher,
            outcomes,
            health,
        }
    }

    /// Validate and enqueue a trade. Non-blocking.
    pub fn submit_trade(&self, request: TradeRequest) -> Result<Accepted, SubmitError> {
        self.gate()?;
        self.ensure_account(request.account_index)?;
        if request.trade_type != TradeType::Close {
            ensure_ratio(request.reference_position_ratio, "reference_position_ratio")?;
        }
        let reference = market_ref(request.market_id, request.symbol.as_deref())?;
        let (market_id, symbol) = self.resolve_market(reference)?;

        let request_id = request.request_id.unwrap_or_else(new_request_id);
        let intent = Intent::Trade(TradeIntent {
            request_id: request_id.clone(),
            account_index: request.account_index,
            market_id,
            symbol,
            trade_type: request.trade_type,
            reference_position_ratio: request.reference_position_ratio,
            created_at: Utc::now(),
        });

        self.dispatcher.submit(intent)?;
        Ok(Accepted { request_id })
    }

    /// Validate and enqueue a position adjustment. Non-blocking.
    pub fn submit_adjustment(&self, request: AdjustRequest) -> Result<Accepted, SubmitError> {
        self.gate()?;
        self.ensure_account(request.account_index)?;
        ensure_ratio(request.percentage, "percentage")?;
        let reference = market_ref(request.market_id, request.symbol.as_deref())?;
        let (market_id, symbol) = self.resolve_market(reference)?;

        let request_id = request.request_id.unwrap_or_else(new_request_id);
        let intent = Intent::Adjust(AdjustIntent {
            request_id: request_id.clone(),
            account_index: request.account_index,
            market_id,
            symbol,
            adjustment_type: request.adjustment_type,
            percentage: request.percentage,
            created_at: Utc::now(),
        });

        self.dispatcher.submit(intent)?;
        Ok(Accepted { request_id })
    }

    /// Cancel a queued-but-not-started request.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.dispatcher.cancel(request_id)
    }

    /// Terminal outcome for a request, if one was produced yet.
    pub async fn outcome(&self, request_id: &str) -> Option<ExecutionOutcome> {
        self.outcomes.get(request_id).await
    }

    /// Poll the outcome store until the request reaches a terminal state.
    pub async fn wait_for_outcome(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> Option<ExecutionOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.outcomes.get(request_id).await {
                return Some(outcome);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Drain all lanes and finish queued work.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    fn gate(&self) -> Result<(), SubmitError> {
        if self.health.is_healthy() {
            Ok(())
        } else {
            Err(SubmitError::Unhealthy)
        }
    }

    fn ensure_account(&self, account_index: u32) -> Result<(), SubmitError> {
        if self.registry.contains(account_index) {
            Ok(())
        } else {
            Err(SubmitError::Validation(format!(
                "account {account_index} is not configured"
            )))
        }
    }

    fn resolve_market(&self, reference: MarketRef) -> Result<(u32, String), SubmitError> {
        match reference {
            MarketRef::Id(market_id) => {
                let market = self.resolver.get(market_id).ok_or_else(|| {
                    SubmitError::Validation(format!("market {market_id} not found"))
                })?;
                if !market.is_active() {
                    return Err(SubmitError::Validation(format!(
                        "market {market_id} is not active"
                    )));
                }
                Ok((market_id, market.symbol.clone()))
            }
            MarketRef::Symbol(symbol) => {
                let market_id = self.resolver.resolve(&symbol).ok_or_else(|| {
                    SubmitError::Validation(format!("symbol '{symbol}' not found or not active"))
                })?;
                Ok((market_id, symbol.to_uppercase()))
            }
        }
    }
}

fn market_ref(market_id: Option<u32>, symbol: Option<&str>) -> Result<MarketRef, SubmitError> {
    match (market_id, symbol) {
        (Some(market_id), _) => Ok(MarketRef::Id(market_id)),
        (None, Some(symbol)) => Ok(MarketRef::Symbol(symbol.to_string())),
        (None, None) => Err(SubmitError::Validation(
            "either market_id or symbol must be provided".to_string(),
        )),
    }
}

fn ensure_ratio(value: Decimal, name: &str) -> Result<(), SubmitError> {
    if value > Decimal::ZERO && value <= Decimal::ONE {
        Ok(())
    } else {
        Err(SubmitError::Validation(format!(
            "{name} must be within (0, 1], got {value}"
        )))
    }
}

fn new_request_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &uuid[..8])
}
