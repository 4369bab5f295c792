//! Trade and adjustment intents, and the terminal outcome produced per intent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a mirrored trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Long,
    Short,
    Close,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Long => "long",
            TradeType::Short => "short",
            TradeType::Close => "close",
        }
    }
}

impl std::str::FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" => Ok(TradeType::Long),
            "short" => Ok(TradeType::Short),
            "close" => Ok(TradeType::Close),
            other => Err(format!("trade type must be long, short, or close (got {other})")),
        }
    }
}

/// Direction of a position adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Increase,
    Decrease,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Increase => "increase",
            AdjustmentType::Decrease => "decrease",
        }
    }
}

impl std::str::FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "increase" => Ok(AdjustmentType::Increase),
            "decrease" => Ok(AdjustmentType::Decrease),
            other => Err(format!("adjustment type must be increase or decrease (got {other})")),
        }
    }
}

/// Inbound trade request as handed over by the transport layer.
///
/// Either `market_id` or `symbol` must be present. `request_id` is optional;
/// the service generates one when the caller does not supply it.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub account_index: u32,
    #[serde(default)]
    pub market_id: Option<u32>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub trade_type: TradeType,
    /// Fraction of available balance to target as notional (ignored for close)
    #[serde(default = "default_ratio")]
    pub reference_position_ratio: Decimal,
}

/// Inbound position adjustment request.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub account_index: u32,
    #[serde(default)]
    pub market_id: Option<u32>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub adjustment_type: AdjustmentType,
    /// Fraction of the current position size to add or remove
    pub percentage: Decimal,
}

fn default_ratio() -> Decimal {
    Decimal::ONE
}

/// A validated, market-resolved trade intent. Immutable once created;
/// consumed exactly once by the owning account's lane.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub request_id: String,
    pub account_index: u32,
    pub market_id: u32,
    pub symbol: String,
    pub trade_type: TradeType,
    pub reference_position_ratio: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A validated, market-resolved adjustment intent.
#[derive(Debug, Clone)]
pub struct AdjustIntent {
    pub request_id: String,
    pub account_index: u32,
    pub market_id: u32,
    pub symbol: String,
    pub adjustment_type: AdjustmentType,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Unit of work flowing through a dispatcher lane.
#[derive(Debug, Clone)]
pub enum Intent {
    Trade(TradeIntent),
    Adjust(AdjustIntent),
}

impl Intent {
    pub fn request_id(&self) -> &str {
        match self {
            Intent::Trade(t) => &t.request_id,
            Intent::Adjust(a) => &a.request_id,
        }
    }

    pub fn account_index(&self) -> u32 {
        match self {
            Intent::Trade(t) => t.account_index,
            Intent::Adjust(a) => a.account_index,
        }
    }

    pub fn market_id(&self) -> u32 {
        match self {
            Intent::Trade(t) => t.market_id,
            Intent::Adjust(a) => a.market_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Intent::Trade(t) => &t.symbol,
            Intent::Adjust(a) => &a.symbol,
        }
    }

    /// Short human label used in logs and notifications.
    pub fn action(&self) -> &'static str {
        match self {
            Intent::Trade(t) => t.trade_type.as_str(),
            Intent::Adjust(a) => a.adjustment_type.as_str(),
        }
    }
}

/// How an intent ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Rejected,
    Failed,
}

/// Terminal result of one intent. Produced exactly once, never retried.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub request_id: String,
    pub account_index: u32,
    pub result: OutcomeKind,
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionOutcome {
    pub fn success(request_id: impl Into<String>, account_index: u32, detail: impl Into<String>) -> Self {
        Self::new(request_id, account_index, OutcomeKind::Success, detail)
    }

    pub fn rejected(request_id: impl Into<String>, account_index: u32, detail: impl Into<String>) -> Self {
        Self::new(request_id, account_index, OutcomeKind::Rejected, detail)
    }

    pub fn failed(request_id: impl Into<String>, account_index: u32, detail: impl Into<String>) -> Self {
        Self::new(request_id, account_index, OutcomeKind::Failed, detail)
    }

    fn new(
        request_id: impl Into<String>,
        account_index: u32,
        result: OutcomeKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            account_index,
            result,
            detail: detail.into(),
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == OutcomeKind::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_request_deserializes_with_symbol_only() {
        let req: TradeRequest = serde_json::from_str(
            r#"{"account_index": 3, "symbol": "ETH", "trade_type": "long", "reference_position_ratio": "0.5"}"#,
        )
        .unwrap();
        assert_eq!(req.account_index, 3);
        assert_eq!(req.symbol.as_deref(), Some("ETH"));
        assert!(req.market_id.is_none());
        assert_eq!(req.trade_type, TradeType::Long);
    }

    #[test]
    fn test_trade_type_parses() {
        assert_eq!("LONG".parse::<TradeType>().unwrap(), TradeType::Long);
        assert!("sideways".parse::<TradeType>().is_err());
    }
}
