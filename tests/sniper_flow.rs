//! End-to-end flow tests: feed events through the tracker into traders,
//! against a scripted exchange.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Semaphore};

use pumpwatch::config::{ExchangeConfig, FilterConfig, SniperConfig};
use pumpwatch::curve::CurveReserves;
use pumpwatch::error::{Error, Result};
use pumpwatch::exchange::{FillReceipt, TokenAccount, TradeExecutor};
use pumpwatch::feed::{FeedEvent, Listing, TradeFill};
use pumpwatch::filter::ListingFilter;
use pumpwatch::notify::LogNotifier;
use pumpwatch::tracker::{TokenTracker, TrackerConfig};
use pumpwatch::trader::StrategyParams;

/// Scripted exchange: records calls, optionally fails or gates sells.
struct MockExchange {
    buys: AtomicU32,
    sells: AtomicU32,
    fail_sells: AtomicBool,
    /// When set, sells block until a permit is released
    sell_gate: Option<Arc<Semaphore>>,
    snapshot: CurveReserves,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self {
            buys: AtomicU32::new(0),
            sells: AtomicU32::new(0),
            fail_sells: AtomicBool::new(false),
            sell_gate: None,
            // Spot price 100 in fixed-point units
            snapshot: CurveReserves::new(100, 1_000_000_000),
        }
    }
}

#[async_trait]
impl TradeExecutor for MockExchange {
    async fn buy(&self, _mint: &str, _sol: u64) -> Result<FillReceipt> {
        self.buys.fetch_add(1, Ordering::SeqCst);
        Ok(FillReceipt {
            signature: Some("buy-sig".to_string()),
            sol_amount: Some(50_000_000),
            token_amount: Some(1_000_000),
        })
    }

    async fn sell(&self, _mint: &str, _tokens: u64) -> Result<FillReceipt> {
        self.sells.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.sell_gate {
            let _permit = gate.acquire().await.map_err(|_| {
                Error::Internal("sell gate closed".to_string())
            })?;
        }
        if self.fail_sells.load(Ordering::SeqCst) {
            return Err(Error::TradeRejected("slippage exceeded".to_string()));
        }
        Ok(FillReceipt {
            signature: Some("sell-sig".to_string()),
            sol_amount: Some(40_000_000),
            token_amount: Some(1_000_000),
        })
    }

    async fn reserve_snapshot(&self, _mint: &str) -> Result<CurveReserves> {
        Ok(self.snapshot)
    }

    async fn token_balance(&self, _mint: &str) -> Result<u64> {
        Ok(1_000_000)
    }

    async fn list_token_accounts(&self) -> Result<Vec<TokenAccount>> {
        Ok(vec![])
    }

    async fn close_token_account(&self, _mint: &str) -> Result<()> {
        Ok(())
    }
}

fn listing(mint: &str) -> Listing {
    Listing {
        mint: mint.to_string(),
        name: format!("Token {}", mint),
        symbol: "TEST".to_string(),
        creator: "creator".to_string(),
        virtual_sol_reserves: 100,
        virtual_token_reserves: 1_000_000_000,
        usd_market_cap: 6_000.0,
        twitter: None,
        telegram: None,
        website: None,
        created_timestamp: Utc::now(),
        nsfw: false,
        hidden: None,
        monitor_start: None,
    }
}

/// Fill whose post-trade reserves imply the given fixed-point price
fn fill_at(mint: &str, price: u64) -> TradeFill {
    TradeFill {
        mint: mint.to_string(),
        trader: "someone".to_string(),
        is_buy: true,
        sol_amount: 1_000,
        token_amount: 1_000,
        virtual_sol_reserves: price,
        virtual_token_reserves: 1_000_000_000,
        usd_market_cap: 6_000.0,
        pool_complete: None,
        timestamp: Utc::now(),
    }
}

struct Harness {
    feed_tx: mpsc::Sender<FeedEvent>,
    exchange: Arc<MockExchange>,
    _shutdown_tx: broadcast::Sender<()>,
    tracker_task: tokio::task::JoinHandle<()>,
}

fn start_tracker(exchange: MockExchange, max_tracked: usize) -> Harness {
    let exchange = Arc::new(exchange);

    let filter = Arc::new(
        ListingFilter::new(FilterConfig {
            enabled: false,
            ..FilterConfig::default()
        })
        .unwrap(),
    );

    let params = StrategyParams::from_config(&SniperConfig::default(), &ExchangeConfig::default());

    let tracker = TokenTracker::new(
        TrackerConfig {
            max_tracked,
            prune_on_full: false,
            trader_inbox_capacity: 256,
        },
        params,
        exchange.clone(),
        filter,
        Arc::new(LogNotifier),
        None,
    );

    let (feed_tx, feed_rx) = mpsc::channel(1024);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let tracker_task = tokio::spawn(tracker.run(feed_rx, shutdown_rx));

    Harness {
        feed_tx,
        exchange,
        _shutdown_tx: shutdown_tx,
        tracker_task,
    }
}

/// Poll until the condition holds or the deadline passes. The step is
/// coarse enough that paused-clock tests advance past the 45s hold
/// deadline within the iteration budget.
async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..600 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn discovery_burst_respects_capacity() {
    let harness = start_tracker(MockExchange::default(), 3);

    for i in 0..12 {
        harness
            .feed_tx
            .send(FeedEvent::Listing(listing(&format!("mint{}", i))))
            .await
            .unwrap();
    }

    // Only the three admitted tokens ever reach the exchange. The traders
    // hold until their deadline, so no retirement frees capacity here.
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 3,
        "3 buys",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.exchange.buys.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn duplicate_discovery_is_admitted_once() {
    let harness = start_tracker(MockExchange::default(), 5);

    for _ in 0..5 {
        harness
            .feed_tx
            .send(FeedEvent::Listing(listing("samemint")))
            .await
            .unwrap();
    }

    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) >= 1,
        "first buy",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.exchange.buys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_loss_fires_from_trade_reserves() {
    let harness = start_tracker(MockExchange::default(), 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 1,
        "buy",
    )
    .await;

    // Entry at 100, stop-loss ratio 0.95: a fill at 90 must sell
    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 90)))
        .await
        .unwrap();

    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) == 1,
        "stop-loss sell",
    )
    .await;
}

#[tokio::test]
async fn stop_loss_precedes_armed_trailing_stop() {
    let harness = start_tracker(MockExchange::default(), 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 1,
        "buy",
    )
    .await;

    // Arm take-profit at 110, then drop straight through both boundaries;
    // exactly one sell results
    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 110)))
        .await
        .unwrap();
    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 90)))
        .await
        .unwrap();

    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) == 1,
        "sell",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.exchange.sells.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trailing_stop_sequence_sells_at_the_line() {
    let harness = start_tracker(MockExchange::default(), 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 1,
        "buy",
    )
    .await;

    // Entry 100 -> arm at 110 (peak 110) -> peak 130 -> 123 < 123.5 sells
    for price in [110, 130] {
        harness
            .feed_tx
            .send(FeedEvent::Trade(fill_at("mint0", price)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.exchange.sells.load(Ordering::SeqCst), 0);

    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 123)))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) == 1,
        "trailing-stop sell",
    )
    .await;
}

#[tokio::test]
async fn sell_is_single_flight_under_event_flood() {
    let gate = Arc::new(Semaphore::new(0));
    let exchange = MockExchange {
        sell_gate: Some(gate.clone()),
        ..Default::default()
    };
    let harness = start_tracker(exchange, 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 1,
        "buy",
    )
    .await;

    // First crash fill starts a sell that blocks on the gate
    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 10)))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) == 1,
        "sell in flight",
    )
    .await;

    // 100 more crash fills arrive while the sell is outstanding
    for _ in 0..100 {
        harness
            .feed_tx
            .send(FeedEvent::Trade(fill_at("mint0", 10)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Release the outstanding sell
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.exchange.sells.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_feed_sells_on_hold_deadline() {
    let harness = start_tracker(MockExchange::default(), 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();

    // No fills at all: with the clock paused, the 45s max-hold deadline
    // auto-advances and the position is sold by elapsed time alone
    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) == 1,
        "deadline sell",
    )
    .await;
    assert_eq!(harness.exchange.buys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn feed_disconnect_liquidates_and_removes_even_when_sell_fails() {
    let exchange = MockExchange::default();
    exchange.fail_sells.store(true, Ordering::SeqCst);
    let harness = start_tracker(exchange, 5);

    harness
        .feed_tx
        .send(FeedEvent::Listing(listing("mint0")))
        .await
        .unwrap();
    wait_for(
        || harness.exchange.buys.load(Ordering::SeqCst) == 1,
        "buy",
    )
    .await;

    harness
        .feed_tx
        .send(FeedEvent::Disconnected("socket closed".to_string()))
        .await
        .unwrap();

    // The liquidation attempt happens even though it fails
    wait_for(
        || harness.exchange.sells.load(Ordering::SeqCst) >= 1,
        "liquidation attempt",
    )
    .await;

    // The entry is gone: new fills for the mint no longer reach a trader,
    // so a crash price triggers nothing further
    let sells_after_removal = harness.exchange.sells.load(Ordering::SeqCst);
    harness
        .feed_tx
        .send(FeedEvent::Trade(fill_at("mint0", 1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        harness.exchange.sells.load(Ordering::SeqCst),
        sells_after_removal
    );
}

#[tokio::test]
async fn terminal_feed_error_stops_the_tracker() {
    let harness = start_tracker(MockExchange::default(), 5);

    harness
        .feed_tx
        .send(FeedEvent::Error {
            mint: None,
            message: "max reconnect attempts reached".to_string(),
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), harness.tracker_task)
        .await
        .expect("tracker should stop on terminal feed error")
        .unwrap();
}
