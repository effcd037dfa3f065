//! WebSocket feed client
//!
//! Subscribes to the new-listing channel and to per-token trade channels on
//! request, parses JSON frames into domain records, and emits [`FeedEvent`]s
//! on a bounded channel. Reconnects with a jittered delay; subscriptions are
//! replayed after every reconnect.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{FeedEvent, Listing, TradeFill};
use crate::error::{Error, Result};

/// Subscription request frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeMessage {
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    keys: Option<Vec<String>>,
}

impl SubscribeMessage {
    fn new_listings() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    fn token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    fn unsubscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "unsubscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    fn all_trades() -> Self {
        Self {
            method: "subscribeAllTrades".to_string(),
            keys: None,
        }
    }
}

/// New listing frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingMsg {
    mint: String,
    name: String,
    symbol: String,
    trader_public_key: String,
    tx_type: String,
    v_sol_in_bonding_curve: u64,
    v_tokens_in_bonding_curve: u64,
    usd_market_cap: f64,
    #[serde(default)]
    twitter: Option<String>,
    #[serde(default)]
    telegram: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    nsfw: bool,
    #[serde(default)]
    hidden: Option<bool>,
}

/// Trade frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeMsg {
    mint: String,
    trader_public_key: String,
    tx_type: String, // "buy" or "sell"
    sol_amount: u64,
    token_amount: u64,
    v_sol_in_bonding_curve: u64,
    v_tokens_in_bonding_curve: u64,
    usd_market_cap: f64,
    #[serde(default)]
    pool_complete: Option<bool>,
}

impl From<ListingMsg> for Listing {
    fn from(msg: ListingMsg) -> Self {
        Self {
            mint: msg.mint,
            name: msg.name,
            symbol: msg.symbol,
            creator: msg.trader_public_key,
            virtual_sol_reserves: msg.v_sol_in_bonding_curve,
            virtual_token_reserves: msg.v_tokens_in_bonding_curve,
            usd_market_cap: msg.usd_market_cap,
            twitter: msg.twitter,
            telegram: msg.telegram,
            website: msg.website,
            created_timestamp: Utc::now(),
            nsfw: msg.nsfw,
            hidden: msg.hidden,
            monitor_start: None,
        }
    }
}

impl From<TradeMsg> for TradeFill {
    fn from(msg: TradeMsg) -> Self {
        Self {
            mint: msg.mint,
            trader: msg.trader_public_key,
            is_buy: msg.tx_type == "buy",
            sol_amount: msg.sol_amount,
            token_amount: msg.token_amount,
            virtual_sol_reserves: msg.v_sol_in_bonding_curve,
            virtual_token_reserves: msg.v_tokens_in_bonding_curve,
            usd_market_cap: msg.usd_market_cap,
            pool_complete: msg.pool_complete,
            timestamp: Utc::now(),
        }
    }
}

/// Feed client configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    pub reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    pub max_reconnect_attempts: u32,
    pub ping_interval_secs: u64,
    /// Subscribe to the new-listing channel
    pub listen_listings: bool,
    /// Subscribe to the full trade firehose (scanner mode)
    pub listen_all_trades: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://feed.invalid/api/data".to_string(),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 0,
            ping_interval_secs: 30,
            listen_listings: true,
            listen_all_trades: false,
        }
    }
}

/// Commands the tracker sends to the live connection
#[derive(Debug)]
enum FeedCommand {
    SubscribeTrades(String),
    UnsubscribeTrades(String),
}

/// Handle for managing per-token trade subscriptions
#[derive(Clone)]
pub struct FeedHandle {
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
}

impl FeedHandle {
    /// Subscribe to a token's trade channel
    pub fn subscribe_trades(&self, mint: &str) {
        let _ = self
            .cmd_tx
            .send(FeedCommand::SubscribeTrades(mint.to_string()));
    }

    /// Unsubscribe from a token's trade channel
    pub fn unsubscribe_trades(&self, mint: &str) {
        let _ = self
            .cmd_tx
            .send(FeedCommand::UnsubscribeTrades(mint.to_string()));
    }
}

/// WebSocket feed client
pub struct FeedClient {
    config: FeedConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    shutdown: tokio::sync::broadcast::Sender<()>,
}

impl FeedClient {
    pub fn new(config: FeedConfig, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        let (shutdown, _) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            event_tx,
            shutdown,
        }
    }

    /// Start the connection loop. Returns a handle for trade subscriptions.
    pub fn start(&self) -> FeedHandle {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;
            // Survives reconnects so subscriptions can be replayed
            let mut subscribed: HashSet<String> = HashSet::new();

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Feed client shutting down");
                    break;
                }

                match Self::connect_and_stream(&config, &event_tx, &mut cmd_rx, &mut subscribed)
                    .await
                {
                    Ok(()) => {
                        reconnect_attempts = 0;
                    }
                    Err(e) => {
                        error!("Feed error: {}", e);
                        reconnect_attempts += 1;

                        if config.max_reconnect_attempts > 0
                            && reconnect_attempts >= config.max_reconnect_attempts
                        {
                            error!(
                                "Max reconnect attempts ({}) reached",
                                config.max_reconnect_attempts
                            );
                            let _ = event_tx
                                .send(FeedEvent::Error {
                                    mint: None,
                                    message: "max reconnect attempts reached".to_string(),
                                })
                                .await;
                            break;
                        }
                    }
                }

                let _ = event_tx
                    .send(FeedEvent::Disconnected("connection closed".to_string()))
                    .await;

                let jitter = rand::thread_rng().gen_range(0..=config.reconnect_delay_ms / 4 + 1);
                let delay = Duration::from_millis(config.reconnect_delay_ms + jitter);
                warn!("Reconnecting in {:?}...", delay);
                sleep(delay).await;
            }
        });

        FeedHandle { cmd_tx }
    }

    /// Stop the client
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    async fn connect_and_stream(
        config: &FeedConfig,
        event_tx: &mpsc::Sender<FeedEvent>,
        cmd_rx: &mut mpsc::UnboundedReceiver<FeedCommand>,
        subscribed: &mut HashSet<String>,
    ) -> Result<()> {
        let url = url::Url::parse(&config.ws_url)
            .map_err(|e| Error::Config(format!("Invalid feed URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::FeedConnection(format!("WebSocket connect failed: {}", e)))?;

        info!("Connected to feed");

        event_tx
            .send(FeedEvent::Connected)
            .await
            .map_err(|e| Error::Internal(format!("Event channel closed: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();

        if config.listen_listings {
            Self::send_frame(&mut write, &SubscribeMessage::new_listings()).await?;
            info!("Subscribed to new listings");
        }

        if config.listen_all_trades {
            Self::send_frame(&mut write, &SubscribeMessage::all_trades()).await?;
            info!("Subscribed to the full trade feed");
        }

        // Replay per-token subscriptions lost with the previous connection
        if !subscribed.is_empty() {
            let mints: Vec<String> = subscribed.iter().cloned().collect();
            Self::send_frame(&mut write, &SubscribeMessage::token_trades(mints)).await?;
            debug!("Replayed {} trade subscriptions", subscribed.len());
        }

        let mut ping_timer =
            tokio::time::interval(Duration::from_secs(config.ping_interval_secs));

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!("Failed to send ping: {}", e);
                        break;
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(FeedCommand::SubscribeTrades(mint)) => {
                            subscribed.insert(mint.clone());
                            Self::send_frame(
                                &mut write,
                                &SubscribeMessage::token_trades(vec![mint]),
                            )
                            .await?;
                        }
                        Some(FeedCommand::UnsubscribeTrades(mint)) => {
                            subscribed.remove(&mint);
                            Self::send_frame(
                                &mut write,
                                &SubscribeMessage::unsubscribe_token_trades(vec![mint]),
                            )
                            .await?;
                        }
                        None => {
                            info!("Command channel closed, stopping feed");
                            return Ok(());
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = Self::handle_frame(&text, event_tx).await {
                                warn!("Failed to handle frame: {}", e);
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            info!("Feed closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Feed read error: {}", e);
                            break;
                        }
                        None => {
                            info!("Feed stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    async fn send_frame<S>(write: &mut S, msg: &SubscribeMessage) -> Result<()>
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let json = serde_json::to_string(msg)?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::FeedConnection(format!("Failed to send frame: {}", e)))
    }

    async fn handle_frame(text: &str, event_tx: &mpsc::Sender<FeedEvent>) -> Result<()> {
        if let Ok(listing) = serde_json::from_str::<ListingMsg>(text) {
            if listing.tx_type == "create" {
                debug!("New listing: {} ({})", listing.name, listing.mint);
                event_tx
                    .send(FeedEvent::Listing(listing.into()))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                return Ok(());
            }
        }

        if let Ok(trade) = serde_json::from_str::<TradeMsg>(text) {
            if trade.tx_type == "buy" || trade.tx_type == "sell" {
                event_tx
                    .send(FeedEvent::Trade(trade.into()))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                return Ok(());
            }
        }

        debug!("Unhandled frame: {}", &text[..text.len().min(100)]);
        Ok(())
    }
}
