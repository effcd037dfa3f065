//! Feed module - discovery and trade event ingestion
//!
//! The wire transport is a WebSocket carrying JSON frames; everything past
//! `ws.rs` only ever sees the parsed domain records below.

pub mod ws;

pub use ws::{FeedClient, FeedConfig, FeedHandle};

use chrono::{DateTime, Utc};

use crate::curve::CurveReserves;

/// A newly discovered listing, immutable after creation.
///
/// `monitor_start` is the one exception: it is stamped exactly once when the
/// tracker admits the token.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Token mint address
    pub mint: String,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Creator address
    pub creator: String,
    /// Virtual SOL reserves at creation (lamports)
    pub virtual_sol_reserves: u64,
    /// Virtual token reserves at creation (smallest units)
    pub virtual_token_reserves: u64,
    /// Market cap estimate in USD
    pub usd_market_cap: f64,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
    /// Creation time reported by the exchange
    pub created_timestamp: DateTime<Utc>,
    pub nsfw: bool,
    pub hidden: Option<bool>,
    /// Set once at admission, never again
    pub monitor_start: Option<DateTime<Utc>>,
}

impl Listing {
    /// Reserve pair at creation time. Stale the moment trades arrive -
    /// price derivation during a hold must use the latest fill instead.
    pub fn reserves(&self) -> CurveReserves {
        CurveReserves::new(self.virtual_sol_reserves, self.virtual_token_reserves)
    }

    /// True when at least one social link is present
    pub fn has_social_links(&self) -> bool {
        self.twitter.is_some() || self.telegram.is_some() || self.website.is_some()
    }
}

/// One fill on a token's bonding curve.
#[derive(Debug, Clone)]
pub struct TradeFill {
    /// Token mint address
    pub mint: String,
    /// Actor who traded
    pub trader: String,
    /// Buy (true) or sell (false)
    pub is_buy: bool,
    /// Lamports moved
    pub sol_amount: u64,
    /// Token units moved
    pub token_amount: u64,
    /// Virtual SOL reserves AFTER this fill
    pub virtual_sol_reserves: u64,
    /// Virtual token reserves AFTER this fill
    pub virtual_token_reserves: u64,
    /// Market cap snapshot in USD
    pub usd_market_cap: f64,
    /// Set when the pool completed (curve filled, token migrating)
    pub pool_complete: Option<bool>,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
}

impl TradeFill {
    /// Post-trade reserve pair - the authoritative price source while holding
    pub fn reserves(&self) -> CurveReserves {
        CurveReserves::new(self.virtual_sol_reserves, self.virtual_token_reserves)
    }
}

/// Event delivered by the feed client
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connected (or reconnected) to the feed
    Connected,
    /// New token listed
    Listing(Listing),
    /// Trade occurred on a subscribed token
    Trade(TradeFill),
    /// Connection lost; the client will attempt to reconnect
    Disconnected(String),
    /// Unrecoverable feed error. When `mint` is set, only that token's
    /// subscription failed; otherwise the whole feed is down.
    Error {
        mint: Option<String>,
        message: String,
    },
}
