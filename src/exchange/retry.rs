//! Timeout and retry wrapper for trade executors
//!
//! Reads (reserve snapshots, balances, account listings) are retried with
//! exponential backoff, timeouts included. Mutations are not: a timed-out
//! buy or sell may have landed on the backend, and re-submitting it risks a
//! double fill. A buy is a single attempt; a sell is re-attempted only when
//! the backend definitively rejected it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use tokio::time::timeout;
use tracing::warn;

use super::{FillReceipt, TokenAccount, TradeExecutor};
use crate::curve::CurveReserves;
use crate::error::{Error, Result};

/// Retry policy for executor calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Initial backoff delay between read retries
    pub retry_base_delay: Duration,
    /// Total time budget for a retried read
    pub max_retry_elapsed: Duration,
    /// Maximum sell attempts on definite rejections
    pub max_sell_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry_base_delay: Duration::from_millis(200),
            max_retry_elapsed: Duration::from_secs(3),
            max_sell_attempts: 3,
        }
    }
}

/// Wraps any executor with bounded timeouts and retries
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: TradeExecutor> RetryingExecutor<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn timeout_ms(&self) -> u64 {
        self.policy.request_timeout.as_millis() as u64
    }

    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match timeout(self.policy.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::ExecutionTimeout(self.timeout_ms())),
        }
    }

    /// Retried read: timeouts and transient API errors are safe to repeat.
    async fn retry_read<T, F, Fut>(&self, make: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: self.policy.retry_base_delay,
            max_interval: self.policy.retry_base_delay * 4,
            max_elapsed_time: Some(self.policy.max_retry_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            match self.attempt(make()).await {
                Ok(value) => Ok(value),
                Err(e @ Error::ExecutionTimeout(_)) => {
                    warn!("Read timed out, retrying: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) if e.is_retryable() => {
                    warn!("Retryable read error: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

#[async_trait]
impl<E: TradeExecutor> TradeExecutor for RetryingExecutor<E> {
    /// Single attempt. A missed entry is acceptable; a duplicate is not.
    async fn buy(&self, mint: &str, sol_lamports: u64) -> Result<FillReceipt> {
        self.attempt(self.inner.buy(mint, sol_lamports)).await
    }

    /// Re-attempted only on definite backend rejections, never after an
    /// ambiguous transport failure or timeout.
    async fn sell(&self, mint: &str, token_amount: u64) -> Result<FillReceipt> {
        let mut last = None;

        for attempt in 1..=self.policy.max_sell_attempts.max(1) {
            match self.attempt(self.inner.sell(mint, token_amount)).await {
                Ok(receipt) => return Ok(receipt),
                Err(Error::TradeRejected(reason))
                    if attempt < self.policy.max_sell_attempts.max(1) =>
                {
                    warn!(mint = %mint, attempt, "Sell rejected, retrying: {}", reason);
                    last = Some(Error::TradeRejected(reason));
                    tokio::time::sleep(self.policy.retry_base_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last.unwrap_or_else(|| Error::Internal("sell retry loop exhausted".to_string())))
    }

    async fn reserve_snapshot(&self, mint: &str) -> Result<CurveReserves> {
        self.retry_read(|| self.inner.reserve_snapshot(mint)).await
    }

    async fn token_balance(&self, mint: &str) -> Result<u64> {
        self.retry_read(|| self.inner.token_balance(mint)).await
    }

    async fn list_token_accounts(&self) -> Result<Vec<TokenAccount>> {
        self.retry_read(|| self.inner.list_token_accounts()).await
    }

    async fn close_token_account(&self, mint: &str) -> Result<()> {
        self.attempt(self.inner.close_token_account(mint)).await
    }
}
