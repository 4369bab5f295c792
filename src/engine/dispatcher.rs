//! Per-account dispatcher: one ordered queue and one worker per account.
//!
//! All operations for an account execute strictly FIFO on its own lane;
//! lanes run in parallel with each other under a global worker-pool ceiling.
//! Account-scoped mutable state never leaves the lane's worker task, so the
//! pipeline needs no locks around business state.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::models::{ExecutionOutcome, Intent};

/// Executes one intent to its terminal outcome inside a lane.
#[async_trait]
pub trait IntentHandler: Send + Sync + 'static {
    async fn handle(&self, intent: Intent) -> ExecutionOutcome;
}

/// Receives exactly one terminal outcome per accepted intent.
#[async_trait]
pub trait OutcomeSink: Send + Sync + 'static {
    async fn publish(&self, outcome: ExecutionOutcome);
}

/// Why a submission was refused. Both variants are synchronous: the request
/// never entered a lane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request {0} was already accepted")]
    DuplicateRequest(String),

    #[error("queue for account {0} is full, retry later")]
    Backpressure(u32),
}

/// Request-id bookkeeping across all lanes.
#[derive(Debug, Default)]
struct RequestLedger {
    accepted: HashSet<String>,
    cancelled: HashSet<String>,
    running: HashSet<String>,
    finished: HashSet<String>,
}

struct Lane {
    tx: mpsc::Sender<Intent>,
    worker: JoinHandle<()>,
}

pub struct Dispatcher<H: IntentHandler> {
    handler: Arc<H>,
    sink: Arc<dyn OutcomeSink>,
    queue_bound: usize,
    permits: Arc<Semaphore>,
    lanes: Mutex<HashMap<u32, Lane>>,
    ledger: Arc<Mutex<RequestLedger>>,
}

impl<H: IntentHandler> Dispatcher<H> {
    pub fn new(
        handler: Arc<H>,
        sink: Arc<dyn OutcomeSink>,
        queue_bound: usize,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            handler,
            sink,
            queue_bound: queue_bound.max(1),
            permits: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            lanes: Mutex::new(HashMap::new()),
            ledger: Arc::new(Mutex::new(RequestLedger::default())),
        }
    }

    /// Non-blocking enqueue onto the account's lane.
    ///
    /// A request id is reserved before the send and released again on
    /// backpressure, so a refused request may be retried with the same id.
    pub fn submit(&self, intent: Intent) -> Result<(), DispatchError> {
        let request_id = intent.request_id().to_string();
        let account_index = intent.account_index();

        {
            let mut ledger = lock(&self.ledger);
            if !ledger.accepted.insert(request_id.clone()) {
                return Err(DispatchError::DuplicateRequest(request_id));
            }
        }

        let tx = self.lane(account_index);
        match tx.try_send(intent) {
            Ok(()) => {
                info!(request_id = %request_id, account = account_index, "request queued");
                Ok(())
            }
            Err(_) => {
                lock(&self.ledger).accepted.remove(&request_id);
                Err(DispatchError::Backpressure(account_index))
            }
        }
    }

    /// Cancel a queued-but-not-started request. Returns false once the
    /// request is running, finished, or was never accepted.
    pub fn cancel(&self, request_id: &str) -> bool {
        let mut ledger = lock(&self.ledger);
        if !ledger.accepted.contains(request_id)
            || ledger.running.contains(request_id)
            || ledger.finished.contains(request_id)
            || ledger.cancelled.contains(request_id)
        {
            return false;
        }
        ledger.cancelled.insert(request_id.to_string());
        info!(request_id, "queued request cancelled");
        true
    }

    /// Drain every lane and wait for its worker to finish the backlog.
    pub async fn shutdown(&self) {
        let lanes: Vec<Lane> = {
            let mut map = lock_lanes(&self.lanes);
            map.drain().map(|(_, lane)| lane).collect()
        };
        for lane in lanes {
            drop(lane.tx);
            let _ = lane.worker.await;
        }
        debug!("dispatcher drained");
    }

    fn lane(&self, account_index: u32) -> mpsc::Sender<Intent> {
        let mut lanes = lock_lanes(&self.lanes);
        if let Some(lane) = lanes.get(&account_index) {
            return lane.tx.clone();
        }

        let (tx, rx) = mpsc::channel(self.queue_bound);
        let worker = tokio::spawn(run_worker(
            account_index,
            rx,
            self.handler.clone(),
            self.sink.clone(),
            self.permits.clone(),
            self.ledger.clone(),
        ));
        lanes.insert(account_index, Lane { tx: tx.clone(), worker });
        tx
    }
}

async fn run_worker<H: IntentHandler>(
    account_index: u32,
    mut rx: mpsc::Receiver<Intent>,
    handler: Arc<H>,
    sink: Arc<dyn OutcomeSink>,
    permits: Arc<Semaphore>,
    ledger: Arc<Mutex<RequestLedger>>,
) {
    debug!(account = account_index, "lane worker started");

    while let Some(intent) = rx.recv().await {
        let request_id = intent.request_id().to_string();

        {
            let mut ledger = lock(&ledger);
            if ledger.cancelled.remove(&request_id) {
                ledger.finished.insert(request_id.clone());
                debug!(request_id = %request_id, "dropping cancelled request");
                continue;
            }
            ledger.running.insert(request_id.clone());
        }

        let permit = match permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // A panicking handler must fail only the current item, never the lane
        // or any other account's worker.
        let outcome = match AssertUnwindSafe(handler.handle(intent)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    account = account_index,
                    request_id = %request_id,
                    "handler panicked, failing the current item"
                );
                ExecutionOutcome::failed(
                    request_id.clone(),
                    account_index,
                    "internal execution failure",
                )
            }
        };
        drop(permit);

        {
            let mut ledger = lock(&ledger);
            ledger.running.remove(&request_id);
            ledger.finished.insert(request_id.clone());
        }

        sink.publish(outcome).await;
    }

    debug!(account = account_index, "lane worker stopped");
}

fn lock(ledger: &Mutex<RequestLedger>) -> MutexGuard<'_, RequestLedger> {
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_lanes(lanes: &Mutex<HashMap<u32, Lane>>) -> MutexGuard<'_, HashMap<u32, Lane>> {
    lanes.lock().unwrap_or_else(|e| e.into_inner())
}
