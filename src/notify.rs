//! Trade notifications: fire-and-forget delivery of fills and outcomes.
//!
//! Delivery failure is logged and swallowed; a lost notification never fails
//! the trade that produced it.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::config::TelegramConfig;
use crate::models::{ExecutionOutcome, OrderSide, OutcomeKind};

/// A filled mirror order, for human-facing notification.
#[derive(Debug, Clone)]
pub struct FillNotice {
    pub account_index: u32,
    pub market_id: u32,
    pub symbol: String,
    pub action: &'static str,
    pub side: OrderSide,
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
    pub price: Decimal,
    /// True when the fill closed a position rather than opening/growing one
    pub closing: bool,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_fill(&self, notice: &FillNotice);
    async fn notify_outcome(&self, outcome: &ExecutionOutcome);
}

/// Fallback notifier that only writes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_fill(&self, notice: &FillNotice) {
        info!(
            account = notice.account_index,
            market = notice.market_id,
            action = notice.action,
            amount = %notice.base_amount,
            price = %notice.price,
            "fill"
        );
    }

    async fn notify_outcome(&self, outcome: &ExecutionOutcome) {
        info!(
            request_id = %outcome.request_id,
            account = outcome.account_index,
            result = ?outcome.result,
            detail = %outcome.detail,
            "execution outcome"
        );
    }
}

/// Delivers notifications to a Telegram group via the bot API.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    chat_id: String,
    thread_id: Option<i64>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: format!("https://api.telegram.org/bot{}", config.bot_api_key),
            chat_id: config.group_id.clone(),
            thread_id: config.thread_id,
        }
    }

    async fn send(&self, text: String) {
        let mut payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(thread_id) = self.thread_id {
            payload["message_thread_id"] = thread_id.into();
        }

        let result = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("telegram message sent");
            }
            Ok(response) => {
                error!(status = %response.status(), "telegram API error");
            }
            Err(e) => {
                error!(error = %e, "failed to send telegram message");
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_fill(&self, notice: &FillNotice) {
        self.send(format_fill(notice)).await;
    }

    async fn notify_outcome(&self, outcome: &ExecutionOutcome) {
        // successful fills already produced a richer message
        if outcome.result != OutcomeKind::Success {
            self.send(format_outcome(outcome)).await;
        }
    }
}

/// Escape Markdown control characters that break Telegram parsing. Dots,
/// hyphens, and parentheses stay readable.
fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '~', '`', '>', '#', '+', '=', '|', '{', '}', '!',
    ];
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn format_fill(notice: &FillNotice) -> String {
    let title = if notice.closing {
        "*Order Closed*"
    } else {
        "*Order Opened*"
    };
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "{title}\n\
         Time: {timestamp}\n\
         Account: {}\n\
         Market: {} (ID: {})\n\
         Action: {}\n\
         Side: {}\n\
         Amount: {} {}\n\
         Value: ${}\n\
         Price: ${}",
        notice.account_index,
        escape_markdown(&notice.symbol),
        notice.market_id,
        notice.action.to_uppercase(),
        notice.side.as_str().to_uppercase(),
        notice.base_amount,
        escape_markdown(&notice.symbol),
        notice.quote_amount.round_dp(2),
        notice.price,
    )
}

fn format_outcome(outcome: &ExecutionOutcome) -> String {
    let title = match outcome.result {
        OutcomeKind::Success => "*Trade Completed*",
        OutcomeKind::Rejected => "*Trade Rejected*",
        OutcomeKind::Failed => "*Trade Failed*",
    };
    format!(
        "{title}\n\
         Request: {}\n\
         Account: {}\n\
         Detail: {}",
        escape_markdown(&outcome.request_id),
        outcome.account_index,
        escape_markdown(&outcome.detail),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_escape_markdown_preserves_numbers() {
        assert_eq!(escape_markdown("1.25 ETH-PERP (id 3)"), "1.25 ETH-PERP (id 3)");
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
    }

    #[test]
    fn test_fill_message_shape() {
        let notice = FillNotice {
            account_index: 2,
            market_id: 1,
            symbol: "ETH".to_string(),
            action: "long",
            side: OrderSide::Buy,
            base_amount: dec!(0.4),
            quote_amount: dec!(40),
            price: dec!(100),
            closing: false,
        };
        let message = format_fill(&notice);
        assert!(message.starts_with("*Order Opened*"));
        assert!(message.contains("Account: 2"));
        assert!(message.contains("Action: LONG"));
        assert!(message.contains("Value: $40"));
    }

    #[test]
    fn test_outcome_message_shape() {
        let outcome = ExecutionOutcome::rejected("req-1", 2, "slippage exceeded");
        let message = format_outcome(&outcome);
        assert!(message.starts_with("*Trade Rejected*"));
        assert!(message.contains("req-1"));
    }
}
