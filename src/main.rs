//! Mirror Trading Engine
//!
//! Fans one reference trade intent out across many exchange accounts, each
//! with its own serialized execution lane, ratio-bounded sizing, slippage
//! gating, and synchronized stop-loss management.

mod api;
mod config;
mod engine;
mod health;
mod markets;
mod models;
mod notify;
mod registry;
mod service;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{ExchangeGateway, RestGateway};
use crate::config::AppConfig;
use crate::health::HealthMonitor;
use crate::markets::MarketResolver;
use crate::models::{AdjustRequest, AdjustmentType, OutcomeKind, TradeRequest, TradeType};
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::service::MirrorService;

/// Mirror trading engine CLI.
#[derive(Parser)]
#[command(name = "lighter-mirror")]
#[command(about = "Mirror one trade intent across many exchange accounts", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seconds to wait for the asynchronous execution outcome
    #[arg(long, default_value = "120")]
    wait_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a trade on one account
    Trade {
        /// Account index to operate on
        #[arg(short, long)]
        account: u32,

        /// Trading pair symbol (e.g. ETH)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Market id, alternative to --symbol
        #[arg(short, long)]
        market_id: Option<u32>,

        /// long, short, or close
        #[arg(short, long)]
        trade_type: TradeType,

        /// Fraction of available balance to target as notional (0-1]
        #[arg(short, long, default_value = "1")]
        ratio: Decimal,

        /// Idempotency key; generated when omitted
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Grow or shrink an existing position
    Adjust {
        /// Account index to operate on
        #[arg(short, long)]
        account: u32,

        /// Trading pair symbol (e.g. ETH)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Market id, alternative to --symbol
        #[arg(short, long)]
        market_id: Option<u32>,

        /// increase or decrease
        #[arg(short = 'd', long)]
        adjustment_type: AdjustmentType,

        /// Fraction of the current position to add or remove (0-1]
        #[arg(short, long)]
        percentage: Decimal,

        /// Idempotency key; generated when omitted
        #[arg(long)]
        request_id: Option<String>,
    },

    /// List markets known to the exchange
    Markets,

    /// Show an account snapshot
    Status {
        /// Account index to inspect
        #[arg(short, long)]
        account: u32,
    },

    /// Show the loaded configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env().context("failed to load configuration")?;

    if let Commands::Config = cli.command {
        print_config(&config);
        return Ok(());
    }

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(RestGateway::new(&config)?);

    match cli.command {
        Commands::Trade {
            account,
            symbol,
            market_id,
            trade_type,
            ratio,
            request_id,
        } => {
            let request = TradeRequest {
                request_id,
                account_index: account,
                market_id,
                symbol,
                trade_type,
                reference_position_ratio: ratio,
            };
            submit_and_wait(&config, gateway, cli.wait_secs, |service| {
                service.submit_trade(request)
            })
            .await?;
        }

        Commands::Adjust {
            account,
            symbol,
            market_id,
            adjustment_type,
            percentage,
            request_id,
        } => {
            let request = AdjustRequest {
                request_id,
                account_index: account,
                market_id,
                symbol,
                adjustment_type,
                percentage,
            };
            submit_and_wait(&config, gateway, cli.wait_secs, |service| {
                service.submit_adjustment(request)
            })
            .await?;
        }

        Commands::Markets => {
            let markets = gateway
                .list_markets()
                .await
                .context("failed to list markets")?;

            println!("\n{:<6} {:<10} {:<10} {:>12} {:>12}", "ID", "SYMBOL", "STATUS", "MIN BASE", "MIN QUOTE");
            println!("{}", "-".repeat(54));
            for market in markets {
                println!(
                    "{:<6} {:<10} {:<10} {:>12} {:>12}",
                    market.market_id,
                    market.symbol,
                    market.status,
                    market.min_base_amount,
                    market.min_quote_amount
                );
            }
        }

        Commands::Status { account } => {
            let snapshot = gateway
                .account_snapshot(account)
                .await
                .context("failed to fetch account snapshot")?;

            println!("\nAccount {account}");
            println!("  available balance: {}", snapshot.available_balance);
            println!("  collateral:        {}", snapshot.collateral);
            println!("  total assets:      {}", snapshot.total_asset_value);
            println!("  status:            {:?}", snapshot.status);

            if snapshot.positions.is_empty() {
                println!("  no open positions");
            } else {
                println!("\n{:<8} {:<10} {:>12} {:>8} {:>14} {:>12}", "MARKET", "SYMBOL", "SIZE", "SIDE", "ENTRY", "UPNL");
                for p in &snapshot.positions {
                    println!(
                        "{:<8} {:<10} {:>12} {:>8} {:>14} {:>12}",
                        p.market_id,
                        p.symbol,
                        p.size,
                        if p.is_long() { "long" } else { "short" },
                        p.avg_entry_price,
                        p.unrealized_pnl
                    );
                }
            }

            for order in &snapshot.stop_loss_orders {
                println!(
                    "  stop-loss on {}: {} @ trigger {} (remaining {})",
                    order.symbol, order.base_amount, order.trigger_price, order.remaining_base_amount
                );
            }
        }

        Commands::Config => unreachable!("handled above"),
    }

    Ok(())
}

/// Wire the full engine, run one submission through it, and report the
/// asynchronous outcome.
async fn submit_and_wait<F>(
    config: &AppConfig,
    gateway: Arc<dyn ExchangeGateway>,
    wait_secs: u64,
    submit: F,
) -> Result<()>
where
    F: FnOnce(&MirrorService) -> Result<crate::service::Accepted, crate::service::SubmitError>,
{
    let markets = gateway
        .list_markets()
        .await
        .context("failed to list markets")?;
    let resolver = Arc::new(MarketResolver::from_markets(markets));

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)),
        None => Arc::new(LogNotifier),
    };

    let monitor = HealthMonitor::spawn(gateway.clone(), Duration::from_secs(5));
    let service = MirrorService::new(config, gateway, resolver, notifier, monitor.flag());

    let accepted = submit(&service)?;
    info!(request_id = %accepted.request_id, "request accepted, executing in background");

    match service
        .wait_for_outcome(&accepted.request_id, Duration::from_secs(wait_secs))
        .await
    {
        Some(outcome) => {
            let label = match outcome.result {
                OutcomeKind::Success => "completed",
                OutcomeKind::Rejected => "rejected",
                OutcomeKind::Failed => "failed",
            };
            println!("request {} {label}: {}", outcome.request_id, outcome.detail);
        }
        None => {
            println!(
                "request {} is still executing after {wait_secs}s, check again later",
                accepted.request_id
            );
        }
    }

    service.shutdown().await;
    monitor.stop();
    Ok(())
}

fn print_config(config: &AppConfig) {
    println!("base url:         {}", config.base_url);
    println!("l1 address:       {}", config.l1_address);
    println!("accounts:         {}", config.accounts.len());
    for account in &config.accounts {
        println!("  - index {} (api key slot {})", account.index, account.api_key_index);
    }
    println!("max slippage:     {}", config.max_slippage);
    println!("stop-loss ratio:  {}", config.stop_loss_ratio);
    println!("scaling factor:   {}", config.scaling_factor);
    println!("max retries:      {}", config.max_retries);
    println!("retry interval:   {:?}", config.retry_interval);
    println!("queue bound:      {}", config.queue_bound);
    println!("worker pool size: {}", config.worker_pool_size);
    println!(
        "telegram:         {}",
        if config.telegram.is_some() { "configured" } else { "disabled" }
    );
}
