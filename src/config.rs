//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub sniper: SniperConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_feed_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_retry_elapsed_ms")]
    pub max_retry_elapsed_ms: u64,
    #[serde(default = "default_max_sell_attempts")]
    pub max_sell_attempts: u32,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: u32,
    #[serde(default = "default_priority_fee_sol")]
    pub priority_fee_sol: f64,
    /// Exchange fee in basis points, used for output quoting
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SniperConfig {
    #[serde(default = "default_buy_amount_sol")]
    pub buy_amount_sol: f64,
    /// Hard cap on concurrently tracked tokens
    #[serde(default = "default_max_tracked")]
    pub max_tracked: usize,
    /// Sell when price falls below entry * ratio (ratio < 1)
    #[serde(default = "default_stop_loss_ratio")]
    pub stop_loss_ratio: f64,
    /// Arm the trailing stop when price reaches entry * ratio (ratio > 1)
    #[serde(default = "default_take_profit_ratio")]
    pub take_profit_ratio: f64,
    /// Trailing distance below the peak, as a fraction (0.05 = 5%)
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    /// Unconditional sell after this many seconds in a position
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// A single sell moving this fraction of the SOL reserves is a
    /// large-holder exit signal (0.1 = 10%)
    #[serde(default = "default_whale_sell_fraction")]
    pub whale_sell_fraction: f64,
    /// Evict the oldest untripped entry instead of dropping new listings
    /// when the table is full
    #[serde(default)]
    pub prune_on_full: bool,
    /// Per-trader inbox capacity
    #[serde(default = "default_trader_inbox_capacity")]
    pub trader_inbox_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default)]
    pub require_social_links: bool,
    #[serde(default)]
    pub min_usd_market_cap: f64,
    #[serde(default = "default_max_usd_market_cap")]
    pub max_usd_market_cap: f64,
    #[serde(default)]
    pub allow_nsfw: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scan_min_market_cap")]
    pub min_usd_market_cap: f64,
    /// Minimum trade size in SOL to alert on
    #[serde(default = "default_scan_min_trade_sol")]
    pub min_trade_sol: f64,
    #[serde(default = "default_true")]
    pub ignore_creator_trades: bool,
    #[serde(default)]
    pub require_social_links: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

fn default_feed_url() -> String {
    "wss://feed.pumpwatch.invalid/api/data".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_max_reconnect_attempts() -> u32 {
    0
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    1024
}
fn default_api_url() -> String {
    "https://trade.pumpwatch.invalid/api".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_max_retry_elapsed_ms() -> u64 {
    3000
}
fn default_max_sell_attempts() -> u32 {
    3
}
fn default_slippage_pct() -> u32 {
    25
}
fn default_priority_fee_sol() -> f64 {
    0.0005
}
fn default_fee_bps() -> u32 {
    100
}
fn default_buy_amount_sol() -> f64 {
    0.05
}
fn default_max_tracked() -> usize {
    5
}
fn default_stop_loss_ratio() -> f64 {
    0.95
}
fn default_take_profit_ratio() -> f64 {
    1.1
}
fn default_trailing_stop_pct() -> f64 {
    0.05
}
fn default_max_hold_secs() -> u64 {
    45
}
fn default_whale_sell_fraction() -> f64 {
    0.1
}
fn default_trader_inbox_capacity() -> usize {
    256
}
fn default_max_usd_market_cap() -> f64 {
    15_000.0
}
fn default_scan_min_market_cap() -> f64 {
    10_000.0
}
fn default_scan_min_trade_sol() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: default_feed_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            ping_interval_secs: default_ping_interval_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retry_elapsed_ms: default_max_retry_elapsed_ms(),
            max_sell_attempts: default_max_sell_attempts(),
            slippage_pct: default_slippage_pct(),
            priority_fee_sol: default_priority_fee_sol(),
            fee_bps: default_fee_bps(),
        }
    }
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            buy_amount_sol: default_buy_amount_sol(),
            max_tracked: default_max_tracked(),
            stop_loss_ratio: default_stop_loss_ratio(),
            take_profit_ratio: default_take_profit_ratio(),
            trailing_stop_pct: default_trailing_stop_pct(),
            max_hold_secs: default_max_hold_secs(),
            whale_sell_fraction: default_whale_sell_fraction(),
            prune_on_full: false,
            trader_inbox_capacity: default_trader_inbox_capacity(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_patterns: vec![],
            require_social_links: false,
            min_usd_market_cap: 0.0,
            max_usd_market_cap: default_max_usd_market_cap(),
            allow_nsfw: false,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_usd_market_cap: default_scan_min_market_cap(),
            min_trade_sol: default_scan_min_trade_sol(),
            ignore_creator_trades: true,
            require_social_links: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedSettings::default(),
            exchange: ExchangeConfig::default(),
            sniper: SniperConfig::default(),
            filter: FilterConfig::default(),
            scanner: ScannerConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PUMPWATCH_)
            .add_source(
                config::Environment::with_prefix("PUMPWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.sniper.max_tracked == 0 {
            anyhow::bail!("sniper.max_tracked must be at least 1");
        }

        if self.sniper.buy_amount_sol <= 0.0 {
            anyhow::bail!("sniper.buy_amount_sol must be positive");
        }

        if !(0.0..1.0).contains(&self.sniper.stop_loss_ratio) {
            anyhow::bail!(
                "sniper.stop_loss_ratio must be in (0, 1), got {}",
                self.sniper.stop_loss_ratio
            );
        }

        if self.sniper.take_profit_ratio <= 1.0 {
            anyhow::bail!(
                "sniper.take_profit_ratio must be above 1, got {}",
                self.sniper.take_profit_ratio
            );
        }

        if !(0.0..1.0).contains(&self.sniper.trailing_stop_pct) {
            anyhow::bail!(
                "sniper.trailing_stop_pct must be in (0, 1), got {}",
                self.sniper.trailing_stop_pct
            );
        }

        if self.sniper.max_hold_secs == 0 {
            anyhow::bail!("sniper.max_hold_secs must be positive");
        }

        if self.exchange.fee_bps >= 10_000 {
            anyhow::bail!("exchange.fee_bps must be below 10000");
        }

        for pattern in &self.filter.blocked_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blocked_pattern regex: {}", pattern))?;
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Feed:
    ws_url: {}
    reconnect_delay: {}ms
  Exchange:
    api_url: {}
    api_key: {}
    request_timeout: {}ms
    slippage: {}%
  Sniper:
    buy_amount: {} SOL
    max_tracked: {}
    stop_loss_ratio: {}
    take_profit_ratio: {}
    trailing_stop: {}%
    max_hold: {}s
  Filter:
    enabled: {}
    require_social_links: {}
    market_cap_band: {} - {} USD
  Scanner:
    min_market_cap: {} USD
    min_trade: {} SOL
  Notify:
    slack_webhook: {}
"#,
            self.feed.ws_url,
            self.feed.reconnect_delay_ms,
            self.exchange.api_url,
            if self.exchange.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.exchange.request_timeout_ms,
            self.exchange.slippage_pct,
            self.sniper.buy_amount_sol,
            self.sniper.max_tracked,
            self.sniper.stop_loss_ratio,
            self.sniper.take_profit_ratio,
            self.sniper.trailing_stop_pct * 100.0,
            self.sniper.max_hold_secs,
            self.filter.enabled,
            self.filter.require_social_links,
            self.filter.min_usd_market_cap,
            self.filter.max_usd_market_cap,
            self.scanner.min_usd_market_cap,
            self.scanner.min_trade_sol,
            if self.notify.slack_webhook_url.is_some() {
                "***"
            } else {
                "(not set)"
            },
        )
    }
}
