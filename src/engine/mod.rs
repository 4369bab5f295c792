//! Trade execution pipeline: dispatcher lanes, sizing, risk, retry,
//! stop-loss reconciliation, and the orchestrator tying them together.

mod dispatcher;
mod error;
mod orchestrator;
mod retry;
mod risk;
mod sizer;
mod stop_loss;

#[cfg(test)]
pub(crate) mod testutil;

pub use dispatcher::{DispatchError, Dispatcher, IntentHandler, OutcomeSink};
pub use error::ExecError;
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use risk::RiskGuard;
pub use sizer::PositionSizer;
pub use stop_loss::{ReconcileReport, StopLossManager};
