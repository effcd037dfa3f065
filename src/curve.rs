//! Bonding-curve price math
//!
//! All arithmetic is integer/fixed-point in `u128`. Reserves are 64-bit
//! scale, so squaring terms must widen before multiplying. Division
//! truncates toward zero, matching the exchange's own exit math - every
//! quote here is a lower bound on what a trade actually returns, never an
//! overestimate.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed-point scale for spot prices (lamports per token unit, scaled).
pub const PRICE_SCALE: u128 = 1_000_000_000;

/// Fee denominator for basis points.
pub const BPS_DENOM: u128 = 10_000;

/// Virtual reserve pair of a bonding curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveReserves {
    /// Virtual SOL reserves in lamports
    pub virtual_sol_reserves: u64,
    /// Virtual token reserves in smallest token units
    pub virtual_token_reserves: u64,
}

impl CurveReserves {
    pub fn new(virtual_sol_reserves: u64, virtual_token_reserves: u64) -> Self {
        Self {
            virtual_sol_reserves,
            virtual_token_reserves,
        }
    }

    /// Implied unit price, fixed-point: `sol_reserves * PRICE_SCALE / token_reserves`
    pub fn spot_price(&self) -> Result<u128> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::ZeroReserves);
        }

        (self.virtual_sol_reserves as u128)
            .checked_mul(PRICE_SCALE)
            .ok_or(Error::PriceOverflow)
            .map(|scaled| scaled / self.virtual_token_reserves as u128)
    }

    /// Tokens received for `sol_in` lamports, constant product with fee.
    ///
    /// `out = sol_in * token_reserves / (sol_reserves + sol_in)`, then the
    /// fee is taken from the output side. Both divisions truncate.
    pub fn tokens_for_sol(&self, sol_in: u64, fee_bps: u32) -> Result<u64> {
        swap_output(
            self.virtual_sol_reserves,
            self.virtual_token_reserves,
            sol_in,
            fee_bps,
        )
    }

    /// Lamports received for selling `tokens_in` token units.
    pub fn sol_for_tokens(&self, tokens_in: u64, fee_bps: u32) -> Result<u64> {
        swap_output(
            self.virtual_token_reserves,
            self.virtual_sol_reserves,
            tokens_in,
            fee_bps,
        )
    }
}

/// Constant-product swap output with an output-side fee in basis points.
fn swap_output(reserve_in: u64, reserve_out: u64, amount_in: u64, fee_bps: u32) -> Result<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(Error::ZeroReserves);
    }
    if fee_bps as u128 >= BPS_DENOM {
        return Err(Error::Config(format!("fee {}bps >= 100%", fee_bps)));
    }
    if amount_in == 0 {
        return Ok(0);
    }

    let new_reserve_in = (reserve_in as u128)
        .checked_add(amount_in as u128)
        .ok_or(Error::PriceOverflow)?;

    let gross = (amount_in as u128)
        .checked_mul(reserve_out as u128)
        .ok_or(Error::PriceOverflow)?
        / new_reserve_in;

    let net = gross * (BPS_DENOM - fee_bps as u128) / BPS_DENOM;

    u64::try_from(net).map_err(|_| Error::PriceOverflow)
}

/// Minimum acceptable output after slippage, in basis points.
pub fn min_output_with_slippage(expected: u64, slippage_bps: u32) -> u64 {
    let factor = BPS_DENOM - (slippage_bps as u128).min(BPS_DENOM);
    ((expected as u128) * factor / BPS_DENOM) as u64
}
