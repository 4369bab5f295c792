//! Application configuration, loaded once at startup and immutable after.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Credentials for one exchange account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Exchange-side account index
    pub index: u32,

    /// Which registered API key slot to sign with
    pub api_key_index: u8,

    /// Opaque signing credential, never logged
    pub private_key: String,
}

/// Telegram delivery settings for trade notifications.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_api_key: String,
    pub group_id: String,
    /// Thread id for forum-style groups
    pub thread_id: Option<i64>,
}

/// Global configuration for the mirror engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Exchange REST base URL
    pub base_url: String,

    /// L1 wallet address the accounts belong to
    pub l1_address: String,

    pub accounts: Vec<AccountConfig>,

    /// Maximum tolerated deviation between expected fill and reference price
    pub max_slippage: Decimal,

    /// Distance of the stop-loss trigger from the entry price
    pub stop_loss_ratio: Decimal,

    /// Multiplier applied on top of the reference position ratio
    pub scaling_factor: Decimal,

    /// Total attempts per gateway call before giving up
    pub max_retries: u32,

    /// Fixed sleep between retry attempts
    pub retry_interval: Duration,

    /// Per-account lane capacity; submissions beyond it are refused
    pub queue_bound: usize,

    /// Ceiling on concurrently executing lane workers
    pub worker_pool_size: usize,

    pub telegram: Option<TelegramConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mainnet.zklighter.elliot.ai".to_string(),
            l1_address: String::new(),
            accounts: Vec::new(),
            max_slippage: dec!(0.01),
            stop_loss_ratio: dec!(0.05),
            scaling_factor: dec!(1.0),
            max_retries: 3,
            retry_interval: Duration::from_secs(5),
            queue_bound: 32,
            worker_pool_size: 8,
            telegram: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `ACCOUNTS` carries a JSON list of account credentials, the remaining
    /// knobs are plain variables with defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let accounts_json = std::env::var("ACCOUNTS").unwrap_or_else(|_| "[]".to_string());
        let accounts = parse_accounts(&accounts_json)?;

        let config = AppConfig {
            base_url: env_or("BASE_URL", &defaults.base_url),
            l1_address: env_or("L1_ADDRESS", ""),
            accounts,
            max_slippage: env_parsed("MAX_SLIPPAGE", defaults.max_slippage)?,
            stop_loss_ratio: env_parsed("STOP_LOSS_RATIO", defaults.stop_loss_ratio)?,
            scaling_factor: env_parsed("SCALING_FACTOR", defaults.scaling_factor)?,
            max_retries: env_parsed("MAX_RETRIES", defaults.max_retries)?,
            retry_interval: Duration::from_secs(env_parsed("RETRY_INTERVAL", 5u64)?),
            queue_bound: env_parsed("QUEUE_BOUND", defaults.queue_bound)?,
            worker_pool_size: env_parsed("WORKER_POOL_SIZE", defaults.worker_pool_size)?,
            telegram: telegram_from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.l1_address.is_empty() {
            bail!("L1_ADDRESS is required");
        }
        if self.accounts.is_empty() {
            bail!("at least one account must be configured");
        }
        if self.max_slippage < Decimal::ZERO || self.max_slippage > Decimal::ONE {
            bail!("MAX_SLIPPAGE must be within [0, 1]");
        }
        if self.stop_loss_ratio < Decimal::ZERO || self.stop_loss_ratio > Decimal::ONE {
            bail!("STOP_LOSS_RATIO must be within [0, 1]");
        }
        if self.scaling_factor <= Decimal::ZERO || self.scaling_factor > dec!(100) {
            bail!("SCALING_FACTOR must be within (0, 100]");
        }
        if self.max_retries == 0 {
            bail!("MAX_RETRIES must be at least 1");
        }
        if self.queue_bound == 0 {
            bail!("QUEUE_BOUND must be at least 1");
        }
        if self.worker_pool_size == 0 {
            bail!("WORKER_POOL_SIZE must be at least 1");
        }
        Ok(())
    }
}

fn parse_accounts(json: &str) -> Result<Vec<AccountConfig>> {
    serde_json::from_str(json).context("invalid ACCOUNTS format, expected a JSON list")
}

fn telegram_from_env() -> Result<Option<TelegramConfig>> {
    let bot_api_key = match std::env::var("TELEGRAM_BOT_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(None),
    };
    let group_id = std::env::var("TELEGRAM_GROUP_ID")
        .context("TELEGRAM_GROUP_ID is required when TELEGRAM_BOT_API_KEY is set")?;
    let thread_id = match std::env::var("TELEGRAM_THREAD_ID") {
        Ok(raw) => Some(raw.parse().context("invalid TELEGRAM_THREAD_ID")?),
        Err(_) => None,
    };
    Ok(Some(TelegramConfig {
        bot_api_key,
        group_id,
        thread_id,
    }))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
