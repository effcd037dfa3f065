//! CLI command implementations

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::Config;
use crate::exchange::http::HttpTraderConfig;
use crate::exchange::retry::RetryPolicy;
use crate::exchange::{HttpTrader, PaperTrader, RetryingExecutor, TradeExecutor};
use crate::feed::{FeedClient, FeedConfig};
use crate::filter::ListingFilter;
use crate::notify::{LogNotifier, Notifier, SlackNotifier};
use crate::scanner::Scanner;
use crate::tracker::{TokenTracker, TrackerConfig};
use crate::trader::StrategyParams;

/// Run the sniper: discover, admit, trade
pub async fn snipe(config: &Config, dry_run: bool) -> Result<()> {
    let notifier = build_notifier(config);
    let executor = build_executor(config, dry_run)?;

    let (event_tx, event_rx) = mpsc::channel(config.feed.channel_capacity);
    let feed = FeedClient::new(feed_config(config, false), event_tx);
    let feed_handle = feed.start();

    let filter = Arc::new(ListingFilter::new(config.filter.clone())?);
    let params = StrategyParams::from_config(&config.sniper, &config.exchange);

    let tracker = TokenTracker::new(
        TrackerConfig {
            max_tracked: config.sniper.max_tracked,
            prune_on_full: config.sniper.prune_on_full,
            trader_inbox_capacity: config.sniper.trader_inbox_capacity,
        },
        params,
        executor,
        filter,
        notifier,
        Some(feed_handle),
    );

    let shutdown_rx = spawn_ctrl_c_handler();
    tracker.run(event_rx, shutdown_rx).await;
    feed.stop();

    Ok(())
}

/// Run the scanner: alert on matching trades, never enter a position
pub async fn scan(config: &Config) -> Result<()> {
    let notifier = build_notifier(config);

    let (event_tx, event_rx) = mpsc::channel(config.feed.channel_capacity);
    let feed = FeedClient::new(feed_config(config, true), event_tx);
    let _feed_handle = feed.start();

    let scanner = Scanner::new(config.scanner.clone());
    let shutdown_rx = spawn_ctrl_c_handler();
    crate::scanner::run(scanner, notifier, event_rx, shutdown_rx).await;
    feed.stop();

    Ok(())
}

/// Close empty token accounts, reclaiming rent
pub async fn close(config: &Config, force: bool, dry_run: bool) -> Result<()> {
    let executor = build_executor(config, dry_run)?;

    let accounts = executor.list_token_accounts().await?;
    info!("Found {} token accounts", accounts.len());

    let empty: Vec<_> = accounts.iter().filter(|a| a.balance == 0).collect();
    if empty.is_empty() {
        info!("No empty token accounts to close");
        return Ok(());
    }

    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Close {} empty token accounts?", empty.len()))
            .default(false)
            .interact()?;
        if !confirmed {
            info!("Aborted");
            return Ok(());
        }
    }

    let mut closed = 0usize;
    for account in empty {
        match executor.close_token_account(&account.mint).await {
            Ok(()) => {
                info!(mint = %account.mint, "Closed token account");
                closed += 1;
            }
            Err(e) => {
                // Per-account isolation: one failure never stops the sweep
                warn!(mint = %account.mint, "Failed to close account: {}", e);
            }
        }
    }

    info!("Done, closed {} accounts", closed);
    Ok(())
}

/// Show the active configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match &config.notify.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    }
}

fn build_executor(config: &Config, dry_run: bool) -> Result<Arc<dyn TradeExecutor>> {
    let policy = RetryPolicy {
        request_timeout: std::time::Duration::from_millis(config.exchange.request_timeout_ms),
        retry_base_delay: std::time::Duration::from_millis(config.exchange.retry_base_delay_ms),
        max_retry_elapsed: std::time::Duration::from_millis(config.exchange.max_retry_elapsed_ms),
        max_sell_attempts: config.exchange.max_sell_attempts,
    };

    if dry_run || config.exchange.api_key.is_empty() {
        if !dry_run {
            warn!("No trade API key configured, falling back to paper trading");
        }
        info!("Paper trading mode: no real orders will be placed");
        let trader = PaperTrader::new(config.exchange.fee_bps);
        return Ok(Arc::new(RetryingExecutor::new(trader, policy)));
    }

    let trader = HttpTrader::new(HttpTraderConfig {
        api_url: config.exchange.api_url.clone(),
        api_key: config.exchange.api_key.clone(),
        request_timeout_ms: config.exchange.request_timeout_ms,
        slippage_pct: config.exchange.slippage_pct,
        priority_fee_sol: config.exchange.priority_fee_sol,
    })?;
    Ok(Arc::new(RetryingExecutor::new(trader, policy)))
}

fn feed_config(config: &Config, all_trades: bool) -> FeedConfig {
    FeedConfig {
        ws_url: config.feed.ws_url.clone(),
        reconnect_delay_ms: config.feed.reconnect_delay_ms,
        max_reconnect_attempts: config.feed.max_reconnect_attempts,
        ping_interval_secs: config.feed.ping_interval_secs,
        listen_listings: true,
        listen_all_trades: all_trades,
    }
}

fn spawn_ctrl_c_handler() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });
    shutdown_rx
}
