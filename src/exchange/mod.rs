//! Trade execution module
//!
//! The core only ever sees the [`TradeExecutor`] trait. Implementations:
//! - [`HttpTrader`] - the hosted trade API (real money)
//! - [`PaperTrader`] - dry-run fills against an in-memory curve
//! - [`RetryingExecutor`] - timeout + bounded-retry wrapper around either

pub mod http;
pub mod paper;
pub mod retry;

pub use http::HttpTrader;
pub use paper::PaperTrader;
pub use retry::RetryingExecutor;

use async_trait::async_trait;

use crate::curve::CurveReserves;
use crate::error::Result;

/// Outcome of an executed trade.
///
/// The hosted API only reports a signature; amounts are present when the
/// backend (or the paper trader) can report them.
#[derive(Debug, Clone, Default)]
pub struct FillReceipt {
    /// Transaction signature, when the backend reports one
    pub signature: Option<String>,
    /// Lamports spent (buy) or received (sell)
    pub sol_amount: Option<u64>,
    /// Token units received (buy) or sold (sell)
    pub token_amount: Option<u64>,
}

/// A token account owned by the trading wallet
#[derive(Debug, Clone)]
pub struct TokenAccount {
    pub mint: String,
    pub address: String,
    pub balance: u64,
}

/// Opaque trade-execution backend.
///
/// Every call may succeed, fail, or time out. Callers own timeout and retry
/// policy (see [`RetryingExecutor`]); implementations perform exactly one
/// attempt per call.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Market-buy a token with `sol_lamports` of SOL
    async fn buy(&self, mint: &str, sol_lamports: u64) -> Result<FillReceipt>;

    /// Sell `token_amount` token units
    async fn sell(&self, mint: &str, token_amount: u64) -> Result<FillReceipt>;

    /// Current virtual reserve pair for a token's bonding curve
    async fn reserve_snapshot(&self, mint: &str) -> Result<CurveReserves>;

    /// Wallet balance in a token's smallest units
    async fn token_balance(&self, mint: &str) -> Result<u64>;

    /// All token accounts owned by the trading wallet
    async fn list_token_accounts(&self) -> Result<Vec<TokenAccount>>;

    /// Close a token account, reclaiming rent. Best-effort.
    async fn close_token_account(&self, mint: &str) -> Result<()>;
}
