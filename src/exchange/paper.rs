//! Paper trading executor
//!
//! Fills every order against an in-memory bonding curve at the quoted price.
//! Used for dry-run mode and as the default when no API key is configured.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{FillReceipt, TokenAccount, TradeExecutor};
use crate::curve::CurveReserves;
use crate::error::{Error, Result};

/// Launch-state curve used for tokens we have no reserve data for yet.
const DEFAULT_CURVE: CurveReserves = CurveReserves {
    virtual_sol_reserves: 30_000_000_000,
    virtual_token_reserves: 1_073_000_000_000_000,
};

#[derive(Default)]
struct PaperBook {
    curves: HashMap<String, CurveReserves>,
    balances: HashMap<String, u64>,
    fill_counter: u64,
}

/// Dry-run trade executor
pub struct PaperTrader {
    fee_bps: u32,
    book: Mutex<PaperBook>,
}

impl PaperTrader {
    pub fn new(fee_bps: u32) -> Self {
        Self {
            fee_bps,
            book: Mutex::new(PaperBook::default()),
        }
    }

    /// Seed the curve state for a mint, e.g. from a listing snapshot.
    /// Later fills move these reserves like the real exchange would.
    pub fn seed_curve(&self, mint: &str, reserves: CurveReserves) {
        let mut book = self.book.lock().unwrap();
        book.curves.entry(mint.to_string()).or_insert(reserves);
    }
}

#[async_trait]
impl TradeExecutor for PaperTrader {
    async fn buy(&self, mint: &str, sol_lamports: u64) -> Result<FillReceipt> {
        let mut book = self.book.lock().unwrap();
        let curve = *book.curves.get(mint).unwrap_or(&DEFAULT_CURVE);

        let tokens_out = curve.tokens_for_sol(sol_lamports, self.fee_bps)?;

        book.curves.insert(
            mint.to_string(),
            CurveReserves::new(
                curve.virtual_sol_reserves.saturating_add(sol_lamports),
                curve.virtual_token_reserves.saturating_sub(tokens_out),
            ),
        );
        *book.balances.entry(mint.to_string()).or_insert(0) += tokens_out;
        book.fill_counter += 1;
        let signature = format!("paper-{}", book.fill_counter);

        info!(mint = %mint, tokens = tokens_out, "Paper buy filled");

        Ok(FillReceipt {
            signature: Some(signature),
            sol_amount: Some(sol_lamports),
            token_amount: Some(tokens_out),
        })
    }

    async fn sell(&self, mint: &str, token_amount: u64) -> Result<FillReceipt> {
        if token_amount == 0 {
            return Err(Error::TradeRejected("zero sell amount".to_string()));
        }
        let mut book = self.book.lock().unwrap();

        let held = book.balances.get(mint).copied().unwrap_or(0);
        if held < token_amount {
            return Err(Error::TradeRejected(format!(
                "paper balance {} below sell amount {}",
                held, token_amount
            )));
        }

        let curve = *book.curves.get(mint).unwrap_or(&DEFAULT_CURVE);
        let sol_out = curve.sol_for_tokens(token_amount, self.fee_bps)?;

        book.curves.insert(
            mint.to_string(),
            CurveReserves::new(
                curve.virtual_sol_reserves.saturating_sub(sol_out),
                curve.virtual_token_reserves.saturating_add(token_amount),
            ),
        );
        *book.balances.get_mut(mint).unwrap() -= token_amount;
        book.fill_counter += 1;
        let signature = format!("paper-{}", book.fill_counter);

        info!(mint = %mint, sol = sol_out, "Paper sell filled");

        Ok(FillReceipt {
            signature: Some(signature),
            sol_amount: Some(sol_out),
            token_amount: Some(token_amount),
        })
    }

    async fn reserve_snapshot(&self, mint: &str) -> Result<CurveReserves> {
        let book = self.book.lock().unwrap();
        Ok(*book.curves.get(mint).unwrap_or(&DEFAULT_CURVE))
    }

    async fn token_balance(&self, mint: &str) -> Result<u64> {
        let book = self.book.lock().unwrap();
        Ok(book.balances.get(mint).copied().unwrap_or(0))
    }

    async fn list_token_accounts(&self) -> Result<Vec<TokenAccount>> {
        let book = self.book.lock().unwrap();
        Ok(book
            .balances
            .iter()
            .map(|(mint, balance)| TokenAccount {
                mint: mint.clone(),
                address: format!("paper-account-{}", mint),
                balance: *balance,
            })
            .collect())
    }

    async fn close_token_account(&self, mint: &str) -> Result<()> {
        let mut book = self.book.lock().unwrap();
        match book.balances.get(mint) {
            Some(0) => {
                book.balances.remove(mint);
                Ok(())
            }
            Some(balance) => Err(Error::Api(format!(
                "account for {} still holds {} tokens",
                mint, balance
            ))),
            None => Err(Error::AccountNotFound(mint.to_string())),
        }
    }
}
