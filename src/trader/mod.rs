//! Per-token position state machine
//!
//! One trader instance per admitted token. The trader owns the entry
//! attempt, all exit evaluation, and the sell - nothing else ever touches
//! its position. It runs as a single task consuming an inbox, so every
//! suspension point (executor calls) naturally queues incoming fills behind
//! the current step; the `in_flight_sell` latch additionally guarantees a
//! second sell can never be issued while one is outstanding.
//!
//! States: Idle -> Evaluating -> Holding -> Selling -> Closed (terminal).

pub mod exit;

pub use exit::{default_rules, ExitReason, Position, StrategyParams};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::exchange::TradeExecutor;
use crate::feed::{Listing, TradeFill};
use crate::filter::{EntryFilter, FilterVerdict};
use crate::notify::Notifier;
use exit::{EvalContext, ExitRule};

/// Fills retained per token for metric computation
const HISTORY_WINDOW: usize = 256;

/// Event delivered to a trader's inbox
#[derive(Debug)]
pub enum TraderEvent {
    /// A fill on this token's curve
    Fill(TradeFill),
    /// Best-effort request to exit the position and stop
    Liquidate(ExitReason),
}

/// Notice sent to the tracker when a trader reaches its terminal state
#[derive(Debug)]
pub struct TraderExit {
    pub mint: String,
}

/// Trader lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderState {
    Idle,
    Evaluating,
    Holding,
    Selling,
    Closed,
}

/// Per-token position state machine
pub struct Trader {
    listing: Listing,
    params: StrategyParams,
    rules: Vec<Box<dyn ExitRule>>,
    executor: Arc<dyn TradeExecutor>,
    filter: Arc<dyn EntryFilter>,
    notifier: Arc<dyn Notifier>,
    state: TraderState,
    position: Option<Position>,
    entry_instant: Option<Instant>,
    history: VecDeque<TradeFill>,
    /// Mirrored into the tracker for prune decisions; written only here
    holding: Arc<AtomicBool>,
}

impl Trader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listing: Listing,
        params: StrategyParams,
        executor: Arc<dyn TradeExecutor>,
        filter: Arc<dyn EntryFilter>,
        notifier: Arc<dyn Notifier>,
        holding: Arc<AtomicBool>,
    ) -> Self {
        let rules = default_rules(&params);
        Self {
            listing,
            params,
            rules,
            executor,
            filter,
            notifier,
            state: TraderState::Idle,
            position: None,
            entry_instant: None,
            history: VecDeque::new(),
            holding,
        }
    }

    /// Drive the state machine to its terminal state.
    ///
    /// Consumes the inbox until Closed, then reports back to the tracker.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<TraderEvent>,
        exit_tx: mpsc::Sender<TraderExit>,
    ) {
        self.state = TraderState::Evaluating;

        if self.try_enter().await {
            self.state = TraderState::Holding;
            // Coarse cancellation of the Holding state itself: even a
            // completely silent feed cannot extend a hold past max_hold.
            let deadline = Instant::now() + self.params.max_hold;

            loop {
                tokio::select! {
                    event = inbox.recv() => match event {
                        Some(TraderEvent::Fill(fill)) => {
                            self.handle_fill(fill).await;
                        }
                        Some(TraderEvent::Liquidate(reason)) => {
                            self.liquidate(reason).await;
                        }
                        None => {
                            // Tracker dropped us; unwind rather than strand
                            self.liquidate(ExitReason::Shutdown).await;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        let held = self
                            .entry_instant
                            .map(|t| t.elapsed())
                            .unwrap_or(self.params.max_hold);
                        self.liquidate(ExitReason::MaxHold { held }).await;
                    }
                }

                if self.state == TraderState::Closed {
                    break;
                }
            }
        } else {
            self.state = TraderState::Closed;
        }

        let _ = exit_tx
            .send(TraderExit {
                mint: self.listing.mint.clone(),
            })
            .await;
    }

    /// Entry filter plus buy. Returns true when a position was opened.
    async fn try_enter(&mut self) -> bool {
        match self.filter.evaluate(&self.listing) {
            FilterVerdict::Reject(reason) => {
                debug!(mint = %self.listing.mint, "Entry filter rejected: {}", reason);
                return false;
            }
            FilterVerdict::Pass => {}
        }

        info!(
            mint = %self.listing.mint,
            name = %self.listing.name,
            "Initiating sniper buy"
        );

        let receipt = match self
            .executor
            .buy(&self.listing.mint, self.params.buy_lamports)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                // No retry: a missed entry is fine, a duplicate is not
                warn!(mint = %self.listing.mint, "Buy failed, abandoning entry: {}", e);
                return false;
            }
        };

        let token_amount = match receipt.token_amount {
            Some(amount) if amount > 0 => amount,
            _ => match self.executor.token_balance(&self.listing.mint).await {
                Ok(amount) if amount > 0 => amount,
                Ok(_) | Err(_) => {
                    error!(
                        mint = %self.listing.mint,
                        "Bought but cannot determine holdings - capital may be stranded"
                    );
                    self.notifier
                        .send(&format!(
                            "Unknown holdings after buy of {} ({})",
                            self.listing.name, self.listing.mint
                        ))
                        .await;
                    return false;
                }
            },
        };

        // Entry price comes from the reserves at the moment of the buy, not
        // the listing snapshot - reserves have moved since discovery.
        let entry_price = match self.entry_price(&receipt, token_amount).await {
            Some(price) => price,
            None => {
                error!(
                    mint = %self.listing.mint,
                    "No entry price available, unwinding position"
                );
                if let Err(e) = self.executor.sell(&self.listing.mint, token_amount).await {
                    error!(mint = %self.listing.mint, "Unwind sell failed: {}", e);
                    self.notifier
                        .send(&format!(
                            "Unwind sell failed for {} ({}): {}",
                            self.listing.name, self.listing.mint, e
                        ))
                        .await;
                }
                return false;
            }
        };

        info!(
            mint = %self.listing.mint,
            entry_price,
            token_amount,
            "Position opened"
        );

        self.position = Some(Position::new(entry_price, token_amount));
        self.entry_instant = Some(Instant::now());
        self.holding.store(true, Ordering::SeqCst);
        true
    }

    /// Spot price at the moment of the buy, with the effective fill price
    /// as fallback when the snapshot cannot be fetched.
    async fn entry_price(&self, receipt: &crate::exchange::FillReceipt, tokens: u64) -> Option<u128> {
        match self.executor.reserve_snapshot(&self.listing.mint).await {
            Ok(reserves) => match reserves.spot_price() {
                Ok(price) => return Some(price),
                Err(e) => warn!(mint = %self.listing.mint, "Snapshot unpriceable: {}", e),
            },
            Err(e) => warn!(mint = %self.listing.mint, "Reserve snapshot failed: {}", e),
        }

        receipt.sol_amount.and_then(|sol| {
            if tokens == 0 {
                None
            } else {
                Some((sol as u128) * crate::curve::PRICE_SCALE / tokens as u128)
            }
        })
    }

    /// Process one fill while holding.
    async fn handle_fill(&mut self, fill: TradeFill) {
        self.push_history(fill.clone());

        if self.state != TraderState::Holding {
            return;
        }
        let Some(position) = self.position.as_ref() else {
            return;
        };
        // Single-flight: while a sell is outstanding the fill goes into
        // history only, evaluation is skipped entirely.
        if position.in_flight_sell {
            return;
        }

        let price = match fill.reserves().spot_price() {
            Ok(price) => price,
            Err(e) => {
                // Fails this evaluation cycle only; next fill retries
                warn!(mint = %fill.mint, "Unpriceable fill, skipping evaluation: {}", e);
                return;
            }
        };

        let held = self
            .entry_instant
            .map(|t| t.elapsed())
            .unwrap_or_default();

        let Some(position) = self.position.as_mut() else {
            return;
        };
        let decision = {
            let ctx = EvalContext {
                price,
                fill: &fill,
                held,
            };

            let mut decision = None;
            for rule in &self.rules {
                if let Some(reason) = rule.evaluate(position, &ctx) {
                    debug!(mint = %fill.mint, rule = rule.name(), "Exit rule fired");
                    decision = Some(reason);
                    break;
                }
            }

            // Peak follows the price on every evaluation, hit or not
            position.peak_price = position.peak_price.max(price);
            decision
        };

        if let Some(reason) = decision {
            self.execute_sell(reason).await;
        }
    }

    /// Best-effort liquidation on feed loss, deadline, or shutdown.
    async fn liquidate(&mut self, reason: ExitReason) {
        let can_sell = self.state == TraderState::Holding
            && self.position.as_ref().is_some_and(|p| !p.in_flight_sell);

        if can_sell {
            self.execute_sell(reason).await;
        } else {
            self.state = TraderState::Closed;
        }
    }

    /// Submit the sell and transition to Closed regardless of outcome.
    async fn execute_sell(&mut self, reason: ExitReason) {
        let Some(position) = self.position.as_mut() else {
            self.state = TraderState::Closed;
            return;
        };
        if position.in_flight_sell {
            return;
        }
        position.in_flight_sell = true;
        let token_amount = position.token_amount;

        self.state = TraderState::Selling;
        info!(mint = %self.listing.mint, %reason, "Selling position");

        match self.executor.sell(&self.listing.mint, token_amount).await {
            Ok(receipt) => {
                info!(
                    mint = %self.listing.mint,
                    signature = ?receipt.signature,
                    "Position closed"
                );
            }
            Err(e) => {
                // No endless retry; surface it and abandon the position.
                error!(
                    mint = %self.listing.mint,
                    "SELL FAILED, capital may be stranded: {}", e
                );
                self.notifier
                    .send(&format!(
                        "Sell failed for {} ({}): {}",
                        self.listing.name, self.listing.mint, e
                    ))
                    .await;
            }
        }

        self.position = None;
        self.holding.store(false, Ordering::SeqCst);
        self.state = TraderState::Closed;

        // Account cleanup is a non-blocking post-sell step
        let executor = self.executor.clone();
        let mint = self.listing.mint.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.close_token_account(&mint).await {
                debug!(mint = %mint, "Account cleanup skipped: {}", e);
            }
        });
    }

    fn push_history(&mut self, fill: TradeFill) {
        if self.history.len() >= HISTORY_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(fill);
    }
}
