//! Exit rules
//!
//! Every exit heuristic implements [`ExitRule`]; the trader evaluates its
//! rule list in order and the first decision wins. Precedence is therefore
//! the order the rules are built in ([`default_rules`]), not anything inside
//! the rules themselves. All price comparisons are cross-multiplied in
//! `u128` so no threshold is ever truncated before the comparison.

use std::time::Duration;

use crate::config::{ExchangeConfig, SniperConfig};
use crate::curve::BPS_DENOM;
use crate::feed::TradeFill;

/// Why a position was (or must be) exited
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    /// Price fell below entry * stop_loss_ratio
    StopLoss { price: u128, floor: u128 },
    /// Price fell below peak * (1 - trailing_stop_pct) after arming
    TrailingStop { price: u128, peak: u128 },
    /// The bonding curve completed; the pump is over
    PoolComplete,
    /// A single sell moved a large fraction of the SOL reserves
    WhaleSell { sol_amount: u64 },
    /// Held longer than max_hold
    MaxHold { held: Duration },
    /// The token's feed went away
    FeedLost,
    /// Operator-initiated shutdown
    Shutdown,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss { price, floor } => {
                write!(f, "stop-loss: price {} below floor {}", price, floor)
            }
            ExitReason::TrailingStop { price, peak } => {
                write!(f, "trailing stop: price {} off peak {}", price, peak)
            }
            ExitReason::PoolComplete => write!(f, "pool completed"),
            ExitReason::WhaleSell { sol_amount } => {
                write!(f, "large holder sold {} lamports", sol_amount)
            }
            ExitReason::MaxHold { held } => write!(f, "max hold reached after {:?}", held),
            ExitReason::FeedLost => write!(f, "trade feed lost"),
            ExitReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Mutable per-position state owned by one trader
#[derive(Debug, Clone)]
pub struct Position {
    /// Fixed-point entry price
    pub entry_price: u128,
    /// Token units held
    pub token_amount: u64,
    /// Highest price observed since entry (reset when the trailing stop arms)
    pub peak_price: u128,
    /// Trailing-stop mode armed by the take-profit threshold
    pub trailing_armed: bool,
    /// Single-flight latch: set while a sell is outstanding
    pub in_flight_sell: bool,
}

impl Position {
    pub fn new(entry_price: u128, token_amount: u64) -> Self {
        Self {
            entry_price,
            token_amount,
            peak_price: entry_price,
            trailing_armed: false,
            in_flight_sell: false,
        }
    }
}

/// One evaluation cycle's inputs
pub struct EvalContext<'a> {
    /// Price derived from the fill's post-trade reserves
    pub price: u128,
    pub fill: &'a TradeFill,
    /// Time since entry
    pub held: Duration,
}

/// A pluggable exit heuristic
pub trait ExitRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a reason to exit, or None. May mutate position state
    /// (the take-profit rule arms the trailing stop here).
    fn evaluate(&self, position: &mut Position, ctx: &EvalContext<'_>) -> Option<ExitReason>;
}

/// Strategy parameters, basis-point form of the configured ratios
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub buy_lamports: u64,
    pub stop_loss_bps: u128,
    pub take_profit_bps: u128,
    pub trailing_stop_bps: u128,
    pub max_hold: Duration,
    pub whale_sell_bps: u128,
    pub fee_bps: u32,
}

impl StrategyParams {
    pub fn from_config(sniper: &SniperConfig, exchange: &ExchangeConfig) -> Self {
        Self {
            buy_lamports: (sniper.buy_amount_sol * 1e9) as u64,
            stop_loss_bps: (sniper.stop_loss_ratio * BPS_DENOM as f64).round() as u128,
            take_profit_bps: (sniper.take_profit_ratio * BPS_DENOM as f64).round() as u128,
            trailing_stop_bps: (sniper.trailing_stop_pct * BPS_DENOM as f64).round() as u128,
            max_hold: Duration::from_secs(sniper.max_hold_secs),
            whale_sell_bps: (sniper.whale_sell_fraction * BPS_DENOM as f64).round() as u128,
            fee_bps: exchange.fee_bps,
        }
    }
}

/// Stop-loss: `price < entry * stop_loss_ratio`
pub struct StopLossRule {
    pub stop_loss_bps: u128,
}

impl ExitRule for StopLossRule {
    fn name(&self) -> &'static str {
        "stop-loss"
    }

    fn evaluate(&self, position: &mut Position, ctx: &EvalContext<'_>) -> Option<ExitReason> {
        let floor = position.entry_price * self.stop_loss_bps;
        if ctx.price * BPS_DENOM < floor {
            return Some(ExitReason::StopLoss {
                price: ctx.price,
                floor: floor / BPS_DENOM,
            });
        }
        None
    }
}

/// Take-profit arming plus trailing stop.
///
/// Crossing the take-profit threshold never sells; it arms trailing mode
/// and resets the peak to the current price. Once armed, a drop of
/// `trailing_stop_bps` below the running peak sells.
pub struct TrailingStopRule {
    pub take_profit_bps: u128,
    pub trailing_stop_bps: u128,
}

impl ExitRule for TrailingStopRule {
    fn name(&self) -> &'static str {
        "trailing-stop"
    }

    fn evaluate(&self, position: &mut Position, ctx: &EvalContext<'_>) -> Option<ExitReason> {
        if !position.trailing_armed {
            if ctx.price * BPS_DENOM >= position.entry_price * self.take_profit_bps {
                position.trailing_armed = true;
                position.peak_price = ctx.price;
            }
            return None;
        }

        if ctx.price * BPS_DENOM < position.peak_price * (BPS_DENOM - self.trailing_stop_bps) {
            return Some(ExitReason::TrailingStop {
                price: ctx.price,
                peak: position.peak_price,
            });
        }
        None
    }
}

/// External signals: pool completion and large-holder sell-offs
pub struct ExternalSignalRule {
    pub whale_sell_bps: u128,
}

impl ExitRule for ExternalSignalRule {
    fn name(&self) -> &'static str {
        "external-signal"
    }

    fn evaluate(&self, _position: &mut Position, ctx: &EvalContext<'_>) -> Option<ExitReason> {
        if ctx.fill.pool_complete == Some(true) {
            return Some(ExitReason::PoolComplete);
        }

        if !ctx.fill.is_buy
            && self.whale_sell_bps > 0
            && (ctx.fill.sol_amount as u128) * BPS_DENOM
                >= (ctx.fill.virtual_sol_reserves as u128) * self.whale_sell_bps
        {
            return Some(ExitReason::WhaleSell {
                sol_amount: ctx.fill.sol_amount,
            });
        }
        None
    }
}

/// Time fallback: sell unconditionally once max_hold has elapsed.
///
/// The trader also runs a deadline timer for this so a silent feed cannot
/// extend a hold; the rule covers the case where fills keep arriving.
pub struct MaxHoldRule {
    pub max_hold: Duration,
}

impl ExitRule for MaxHoldRule {
    fn name(&self) -> &'static str {
        "max-hold"
    }

    fn evaluate(&self, _position: &mut Position, ctx: &EvalContext<'_>) -> Option<ExitReason> {
        if ctx.held >= self.max_hold {
            return Some(ExitReason::MaxHold { held: ctx.held });
        }
        None
    }
}

/// The documented precedence order: stop-loss, take-profit arming /
/// trailing stop, external signals, time fallback.
pub fn default_rules(params: &StrategyParams) -> Vec<Box<dyn ExitRule>> {
    vec![
        Box::new(StopLossRule {
            stop_loss_bps: params.stop_loss_bps,
        }),
        Box::new(TrailingStopRule {
            take_profit_bps: params.take_profit_bps,
            trailing_stop_bps: params.trailing_stop_bps,
        }),
        Box::new(ExternalSignalRule {
            whale_sell_bps: params.whale_sell_bps,
        }),
        Box::new(MaxHoldRule {
            max_hold: params.max_hold,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fill_at(vsol: u64) -> TradeFill {
        TradeFill {
            mint: "testmint".to_string(),
            trader: "someone".to_string(),
            is_buy: true,
            sol_amount: 100_000_000,
            token_amount: 1_000_000,
            virtual_sol_reserves: vsol,
            // price == vsol in fixed-point units
            virtual_token_reserves: 1_000_000_000,
            usd_market_cap: 6_000.0,
            pool_complete: None,
            timestamp: Utc::now(),
        }
    }

    fn ctx_at<'a>(price: u128, fill: &'a TradeFill, held_secs: u64) -> EvalContext<'a> {
        EvalContext {
            price,
            fill,
            held: Duration::from_secs(held_secs),
        }
    }

    #[test]
    fn test_stop_loss_fires_below_floor() {
        let rule = StopLossRule { stop_loss_bps: 9500 };
        let mut position = Position::new(100, 1_000);
        let fill = fill_at(90);

        // 94 < 95 fires, 95 does not
        assert!(rule.evaluate(&mut position, &ctx_at(94, &fill, 1)).is_some());
        assert!(rule.evaluate(&mut position, &ctx_at(95, &fill, 1)).is_none());
    }

    #[test]
    fn test_take_profit_arms_without_selling() {
        let rule = TrailingStopRule {
            take_profit_bps: 11_000,
            trailing_stop_bps: 500,
        };
        let mut position = Position::new(100, 1_000);
        let fill = fill_at(110);

        let decision = rule.evaluate(&mut position, &ctx_at(110, &fill, 1));
        assert!(decision.is_none());
        assert!(position.trailing_armed);
        assert_eq!(position.peak_price, 110);
    }

    #[test]
    fn test_trailing_stop_sequence() {
        let rule = TrailingStopRule {
            take_profit_bps: 11_000,
            trailing_stop_bps: 500,
        };
        let mut position = Position::new(100, 1_000);
        let fill = fill_at(0);

        // Arms at 110
        assert!(rule.evaluate(&mut position, &ctx_at(110, &fill, 1)).is_none());
        // Peak follows the price up (the trader owns this update)
        position.peak_price = 130;
        // 123 < 130 * 0.95 = 123.5 -> sell
        let decision = rule.evaluate(&mut position, &ctx_at(123, &fill, 2));
        assert_eq!(
            decision,
            Some(ExitReason::TrailingStop {
                price: 123,
                peak: 130
            })
        );
    }

    #[test]
    fn test_trailing_stop_holds_above_line() {
        let rule = TrailingStopRule {
            take_profit_bps: 11_000,
            trailing_stop_bps: 500,
        };
        let mut position = Position::new(100, 1_000);
        let fill = fill_at(0);

        assert!(rule.evaluate(&mut position, &ctx_at(110, &fill, 1)).is_none());
        position.peak_price = 130;
        // 124 > 123.5: hold
        assert!(rule.evaluate(&mut position, &ctx_at(124, &fill, 2)).is_none());
    }

    #[test]
    fn test_pool_complete_signal() {
        let rule = ExternalSignalRule { whale_sell_bps: 1_000 };
        let mut position = Position::new(100, 1_000);
        let mut fill = fill_at(100);
        fill.pool_complete = Some(true);

        assert_eq!(
            rule.evaluate(&mut position, &ctx_at(100, &fill, 1)),
            Some(ExitReason::PoolComplete)
        );
    }

    #[test]
    fn test_whale_sell_signal() {
        let rule = ExternalSignalRule { whale_sell_bps: 1_000 };
        let mut position = Position::new(100, 1_000);

        // Sell of 5 SOL against 40 SOL reserves = 12.5% > 10%
        let mut fill = fill_at(40_000_000_000);
        fill.is_buy = false;
        fill.sol_amount = 5_000_000_000;
        assert!(matches!(
            rule.evaluate(&mut position, &ctx_at(100, &fill, 1)),
            Some(ExitReason::WhaleSell { .. })
        ));

        // A buy of the same size is not a signal
        fill.is_buy = true;
        assert!(rule.evaluate(&mut position, &ctx_at(100, &fill, 1)).is_none());
    }

    #[test]
    fn test_max_hold_rule() {
        let rule = MaxHoldRule {
            max_hold: Duration::from_secs(45),
        };
        let mut position = Position::new(100, 1_000);
        let fill = fill_at(100);

        assert!(rule.evaluate(&mut position, &ctx_at(100, &fill, 44)).is_none());
        assert!(matches!(
            rule.evaluate(&mut position, &ctx_at(100, &fill, 46)),
            Some(ExitReason::MaxHold { .. })
        ));
    }

    #[test]
    fn test_default_rule_order() {
        let params = StrategyParams::from_config(
            &crate::config::SniperConfig::default(),
            &crate::config::ExchangeConfig::default(),
        );
        let rules = default_rules(&params);
        let names: Vec<_> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            ["stop-loss", "trailing-stop", "external-signal", "max-hold"]
        );
    }
}
