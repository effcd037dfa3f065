//! Scanner mode
//!
//! Watches the full trade feed and raises notifications on trades matching
//! the configured rules. Never enters a position and keeps no per-token
//! trading state - the only bookkeeping in the run loop is a bounded cache
//! of listing metadata so creator and social-link rules have something to
//! compare against.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::config::ScannerConfig;
use crate::feed::{FeedEvent, Listing, TradeFill};
use crate::notify::Notifier;

/// Listings remembered for creator / social-link checks
const LISTING_CACHE_SIZE: usize = 4096;

/// Stateless trade-alert predicate
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Evaluate one fill against the alert rules. The listing is passed in
    /// when known; rules needing it pass vacuously when it is not.
    pub fn evaluate(&self, fill: &TradeFill, listing: Option<&Listing>) -> bool {
        if fill.usd_market_cap < self.config.min_usd_market_cap {
            return false;
        }

        let sol = fill.sol_amount as f64 / 1e9;
        if sol < self.config.min_trade_sol {
            return false;
        }

        if let Some(listing) = listing {
            if self.config.ignore_creator_trades && fill.trader == listing.creator {
                return false;
            }
            if self.config.require_social_links && !listing.has_social_links() {
                return false;
            }
        }

        true
    }

    /// Human-readable alert line for a matching fill
    pub fn describe(&self, fill: &TradeFill, listing: Option<&Listing>) -> String {
        let name = listing.map(|l| l.name.as_str()).unwrap_or(fill.mint.as_str());
        format!(
            "Big {} on {}: {:.3} SOL at ${:.0} market cap - https://pump.fun/coin/{}",
            if fill.is_buy { "buy" } else { "sell" },
            name,
            fill.sol_amount as f64 / 1e9,
            fill.usd_market_cap,
            fill.mint
        )
    }
}

/// Consume the full feed, alerting on every matching trade, until the feed
/// terminates or shutdown is signalled.
pub async fn run(
    scanner: Scanner,
    notifier: std::sync::Arc<dyn Notifier>,
    mut feed_rx: mpsc::Receiver<FeedEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Scanner started");

    let mut listings: HashMap<String, Listing> = HashMap::new();
    let mut listing_order: VecDeque<String> = VecDeque::new();

    loop {
        tokio::select! {
            event = feed_rx.recv() => match event {
                Some(FeedEvent::Listing(listing)) => {
                    if listings.len() >= LISTING_CACHE_SIZE {
                        if let Some(oldest) = listing_order.pop_front() {
                            listings.remove(&oldest);
                        }
                    }
                    listing_order.push_back(listing.mint.clone());
                    listings.insert(listing.mint.clone(), listing);
                }
                Some(FeedEvent::Trade(fill)) => {
                    let listing = listings.get(&fill.mint);
                    if scanner.evaluate(&fill, listing) {
                        let text = scanner.describe(&fill, listing);
                        info!(mint = %fill.mint, "Scanner hit: {}", text);
                        notifier.send(&text).await;
                    }
                }
                Some(FeedEvent::Connected) => info!("Feed connected"),
                Some(FeedEvent::Disconnected(reason)) => {
                    debug!("Feed disconnected ({}), waiting for reconnect", reason);
                }
                Some(FeedEvent::Error { message, .. }) => {
                    info!("Feed failed terminally: {}", message);
                    break;
                }
                None => break,
            },
            _ = shutdown.recv() => {
                info!("Scanner shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> ScannerConfig {
        ScannerConfig {
            min_usd_market_cap: 10_000.0,
            min_trade_sol: 1.0,
            ignore_creator_trades: true,
            require_social_links: false,
        }
    }

    fn test_fill(sol: u64, cap: f64, trader: &str) -> TradeFill {
        TradeFill {
            mint: "scanmint".to_string(),
            trader: trader.to_string(),
            is_buy: true,
            sol_amount: sol,
            token_amount: 1_000_000,
            virtual_sol_reserves: 40_000_000_000,
            virtual_token_reserves: 900_000_000_000,
            usd_market_cap: cap,
            pool_complete: None,
            timestamp: Utc::now(),
        }
    }

    fn test_listing(creator: &str) -> Listing {
        Listing {
            mint: "scanmint".to_string(),
            name: "Scan Token".to_string(),
            symbol: "SCAN".to_string(),
            creator: creator.to_string(),
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_000_000_000_000,
            usd_market_cap: 11_000.0,
            twitter: None,
            telegram: None,
            website: None,
            created_timestamp: Utc::now(),
            nsfw: false,
            hidden: None,
            monitor_start: None,
        }
    }

    #[test]
    fn test_large_trade_matches() {
        let scanner = Scanner::new(test_config());
        let fill = test_fill(2_000_000_000, 12_000.0, "whale");
        assert!(scanner.evaluate(&fill, None));
    }

    #[test]
    fn test_small_trade_ignored() {
        let scanner = Scanner::new(test_config());
        let fill = test_fill(500_000_000, 12_000.0, "minnow");
        assert!(!scanner.evaluate(&fill, None));
    }

    #[test]
    fn test_low_cap_ignored() {
        let scanner = Scanner::new(test_config());
        let fill = test_fill(2_000_000_000, 4_000.0, "whale");
        assert!(!scanner.evaluate(&fill, None));
    }

    #[test]
    fn test_creator_trades_ignored() {
        let scanner = Scanner::new(test_config());
        let fill = test_fill(2_000_000_000, 12_000.0, "creator1");
        let listing = test_listing("creator1");
        assert!(!scanner.evaluate(&fill, Some(&listing)));
        // Same trade from anyone else matches
        let fill = test_fill(2_000_000_000, 12_000.0, "whale");
        assert!(scanner.evaluate(&fill, Some(&listing)));
    }

    #[test]
    fn test_social_links_rule() {
        let mut config = test_config();
        config.require_social_links = true;
        let scanner = Scanner::new(config);

        let fill = test_fill(2_000_000_000, 12_000.0, "whale");
        let mut listing = test_listing("creator1");
        assert!(!scanner.evaluate(&fill, Some(&listing)));

        listing.twitter = Some("https://x.com/scan".to_string());
        assert!(scanner.evaluate(&fill, Some(&listing)));
    }

    #[test]
    fn test_describe_mentions_token() {
        let scanner = Scanner::new(test_config());
        let fill = test_fill(2_000_000_000, 12_000.0, "whale");
        let listing = test_listing("creator1");
        let text = scanner.describe(&fill, Some(&listing));
        assert!(text.contains("Scan Token"));
        assert!(text.contains("2.000 SOL"));
    }
}
