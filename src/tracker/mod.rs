//! Token tracking and admission
//!
//! The tracker is the single owner of the tracked-token table. It admits
//! discoveries (dedup + capacity), spawns one trader per admitted token,
//! routes fills to the owning trader's inbox, and retires entries when the
//! trader terminates or the feed goes away. Every table mutation happens in
//! one synchronous step on the tracker's own loop - there is no await
//! between a capacity check and the matching insert, so duplicate
//! discoveries can never race into two traders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::exchange::TradeExecutor;
use crate::feed::{FeedEvent, FeedHandle, Listing, TradeFill};
use crate::filter::EntryFilter;
use crate::notify::Notifier;
use crate::trader::{ExitReason, StrategyParams, Trader, TraderEvent, TraderExit};

/// Grace period for traders to finish their sells on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// One tracked token and its owning trader
struct TrackedToken {
    inbox: mpsc::Sender<TraderEvent>,
    /// Written only by the owning trader; read here for prune decisions
    holding: Arc<AtomicBool>,
    admitted_at: Instant,
    task: JoinHandle<()>,
}

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub max_tracked: usize,
    pub prune_on_full: bool,
    pub trader_inbox_capacity: usize,
}

/// Admission controller and event router
pub struct TokenTracker {
    config: TrackerConfig,
    params: StrategyParams,
    executor: Arc<dyn TradeExecutor>,
    filter: Arc<dyn EntryFilter>,
    notifier: Arc<dyn Notifier>,
    feed: Option<FeedHandle>,
    table: HashMap<String, TrackedToken>,
    exit_tx: mpsc::Sender<TraderExit>,
    exit_rx: mpsc::Receiver<TraderExit>,
}

impl TokenTracker {
    pub fn new(
        config: TrackerConfig,
        params: StrategyParams,
        executor: Arc<dyn TradeExecutor>,
        filter: Arc<dyn EntryFilter>,
        notifier: Arc<dyn Notifier>,
        feed: Option<FeedHandle>,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::channel(64);

        Self {
            config,
            params,
            executor,
            filter,
            notifier,
            feed,
            table: HashMap::new(),
            exit_tx,
            exit_rx,
        }
    }

    /// Number of currently tracked tokens
    pub fn tracked_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_tracked(&self, mint: &str) -> bool {
        self.table.contains_key(mint)
    }

    /// Admit a discovered listing.
    ///
    /// Duplicates and over-capacity discoveries are dropped; with
    /// `prune_on_full` set, the oldest untripped entry is evicted instead.
    pub fn on_listing(&mut self, mut listing: Listing) {
        if self.table.contains_key(&listing.mint) {
            debug!(mint = %listing.mint, "Duplicate discovery ignored");
            return;
        }

        if self.table.len() >= self.config.max_tracked {
            if !self.config.prune_on_full || !self.prune_for_capacity() {
                debug!(
                    mint = %listing.mint,
                    tracked = self.table.len(),
                    "At capacity, discovery dropped"
                );
                return;
            }
        }

        listing.monitor_start = Some(Utc::now());

        info!(
            mint = %listing.mint,
            name = %listing.name,
            tracked = self.table.len() + 1,
            "Monitoring token"
        );

        let (inbox_tx, inbox_rx) = mpsc::channel(self.config.trader_inbox_capacity);
        let holding = Arc::new(AtomicBool::new(false));

        let trader = Trader::new(
            listing.clone(),
            self.params.clone(),
            self.executor.clone(),
            self.filter.clone(),
            self.notifier.clone(),
            holding.clone(),
        );
        let task = tokio::spawn(trader.run(inbox_rx, self.exit_tx.clone()));

        self.table.insert(
            listing.mint.clone(),
            TrackedToken {
                inbox: inbox_tx,
                holding,
                admitted_at: Instant::now(),
                task,
            },
        );

        if let Some(feed) = &self.feed {
            feed.subscribe_trades(&listing.mint);
        }
    }

    /// Route a fill to the owning trader. Untracked mints are dropped
    /// silently - the token was never admitted or is already retired.
    pub fn on_trade(&mut self, fill: TradeFill) {
        let Some(entry) = self.table.get(&fill.mint) else {
            return;
        };

        match entry.inbox.try_send(TraderEvent::Fill(fill)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                if let TraderEvent::Fill(fill) = event {
                    warn!(mint = %fill.mint, "Trader inbox full, fill dropped");
                }
            }
            // Trader already terminating; the exit notice will retire it
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// A single token's subscription failed: request liquidation, then
    /// remove the entry regardless of the outcome.
    pub fn on_feed_error(&mut self, mint: &str, message: &str) {
        warn!(mint = %mint, "Feed error, liquidating: {}", message);
        if let Some(entry) = self.table.remove(mint) {
            let _ = entry
                .inbox
                .try_send(TraderEvent::Liquidate(ExitReason::FeedLost));
        }
        if let Some(feed) = &self.feed {
            feed.unsubscribe_trades(mint);
        }
    }

    /// The whole feed is gone: every tracked token loses its event source,
    /// so every entry is liquidated and removed.
    pub fn on_feed_down(&mut self, reason: &str) {
        if self.table.is_empty() {
            return;
        }

        warn!(
            tracked = self.table.len(),
            "Feed down ({}), liquidating all tracked tokens", reason
        );

        for (mint, entry) in self.table.drain() {
            let _ = entry
                .inbox
                .try_send(TraderEvent::Liquidate(ExitReason::FeedLost));
            if let Some(feed) = &self.feed {
                feed.unsubscribe_trades(&mint);
            }
            debug!(mint = %mint, "Removed from tracking");
        }
    }

    /// Retire a terminated trader's entry
    fn retire(&mut self, mint: &str) {
        if self.table.remove(mint).is_some() {
            info!(mint = %mint, tracked = self.table.len(), "Token retired");
            if let Some(feed) = &self.feed {
                feed.unsubscribe_trades(mint);
            }
        }
    }

    /// Evict the oldest untripped entry; with every entry holding a
    /// position, evict the oldest overall. Returns false when there is
    /// nothing evictable (empty table).
    fn prune_for_capacity(&mut self) -> bool {
        let candidate = self
            .table
            .iter()
            .filter(|(_, entry)| !entry.holding.load(Ordering::SeqCst))
            .min_by_key(|(_, entry)| entry.admitted_at)
            .or_else(|| self.table.iter().min_by_key(|(_, entry)| entry.admitted_at))
            .map(|(mint, _)| mint.clone());

        let Some(mint) = candidate else {
            return false;
        };

        info!(mint = %mint, "Pruning oldest entry for capacity");
        if let Some(entry) = self.table.remove(&mint) {
            let _ = entry
                .inbox
                .try_send(TraderEvent::Liquidate(ExitReason::Shutdown));
        }
        if let Some(feed) = &self.feed {
            feed.unsubscribe_trades(&mint);
        }
        true
    }

    /// Main loop: demultiplex feed events and trader exits until shutdown
    /// or terminal feed failure.
    pub async fn run(
        mut self,
        mut feed_rx: mpsc::Receiver<FeedEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            max_tracked = self.config.max_tracked,
            "Tracker started"
        );

        loop {
            tokio::select! {
                event = feed_rx.recv() => match event {
                    Some(FeedEvent::Connected) => {
                        info!("Feed connected");
                    }
                    Some(FeedEvent::Listing(listing)) => {
                        self.on_listing(listing);
                    }
                    Some(FeedEvent::Trade(fill)) => {
                        self.on_trade(fill);
                    }
                    Some(FeedEvent::Disconnected(reason)) => {
                        self.on_feed_down(&reason);
                    }
                    Some(FeedEvent::Error { mint: Some(mint), message }) => {
                        self.on_feed_error(&mint, &message);
                    }
                    Some(FeedEvent::Error { mint: None, message }) => {
                        warn!("Feed failed terminally: {}", message);
                        self.on_feed_down(&message);
                        break;
                    }
                    None => {
                        self.on_feed_down("feed channel closed");
                        break;
                    }
                },
                exit = self.exit_rx.recv() => {
                    if let Some(TraderExit { mint }) = exit {
                        self.retire(&mint);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Tracker shutting down");
                    break;
                }
            }
        }

        self.drain().await;
    }

    /// Liquidate everything and give traders a bounded grace period.
    async fn drain(&mut self) {
        for (_, entry) in self.table.iter() {
            let _ = entry
                .inbox
                .try_send(TraderEvent::Liquidate(ExitReason::Shutdown));
        }

        for (mint, entry) in self.table.drain() {
            if tokio::time::timeout(SHUTDOWN_GRACE, entry.task).await.is_err() {
                warn!(mint = %mint, "Trader did not finish within shutdown grace");
            }
        }
    }
}
