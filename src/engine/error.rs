//! Failure taxonomy for the execution pipeline.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::OutcomeKind;

/// Everything that can go wrong while executing an intent in its lane.
///
/// Validation, balance, slippage, and exchange-rejection failures are final
/// for the request (`Rejected`); an exhausted retry budget is reported as
/// `Failed`. No variant is ever retried after being produced.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("slippage exceeded: expected fill {expected}, reference {reference}, max ratio {max_slippage}")]
    SlippageExceeded {
        expected: Decimal,
        reference: Decimal,
        max_slippage: Decimal,
    },

    #[error("order rejected by exchange: {0}")]
    OrderRejected(String),

    #[error("exchange unavailable after {attempts} attempts: {last_error}")]
    ExchangeUnavailable { attempts: u32, last_error: String },
}

impl ExecError {
    /// How this failure is reported in the terminal outcome.
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            ExecError::Validation(_)
            | ExecError::InsufficientBalance(_)
            | ExecError::SlippageExceeded { .. }
            | ExecError::OrderRejected(_) => OutcomeKind::Rejected,
            ExecError::ExchangeUnavailable { .. } => OutcomeKind::Failed,
        }
    }
}
