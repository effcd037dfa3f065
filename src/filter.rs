//! Entry filtering
//!
//! Decides whether a freshly listed token is worth a position. The trader
//! takes the filter as a trait object so strategies can be swapped without
//! touching the state machine.

use regex::Regex;
use tracing::debug;

use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::feed::Listing;

/// Reason a listing was rejected
#[derive(Debug, Clone)]
pub enum RejectReason {
    /// Listing is hidden/banned on the exchange
    Hidden,
    /// NSFW flag set and not allowed
    Nsfw,
    /// Name or symbol matches a blocked pattern
    BlockedName(String),
    /// No social links present
    NoSocialLinks,
    /// Market cap outside the configured band
    MarketCapOutOfBounds(f64),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Hidden => write!(f, "listing is hidden"),
            RejectReason::Nsfw => write!(f, "nsfw flag set"),
            RejectReason::BlockedName(pattern) => {
                write!(f, "name matches blocked pattern: {}", pattern)
            }
            RejectReason::NoSocialLinks => write!(f, "no social links"),
            RejectReason::MarketCapOutOfBounds(cap) => {
                write!(f, "market cap {} outside bounds", cap)
            }
        }
    }
}

/// Filter verdict
#[derive(Debug, Clone)]
pub enum FilterVerdict {
    Pass,
    Reject(RejectReason),
}

impl FilterVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterVerdict::Pass)
    }
}

/// Entry predicate over a listing snapshot
pub trait EntryFilter: Send + Sync {
    fn evaluate(&self, listing: &Listing) -> FilterVerdict;
}

/// Config-driven entry filter
pub struct ListingFilter {
    config: FilterConfig,
    blocked_patterns: Vec<Regex>,
}

impl ListingFilter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRegex(e.to_string()))?;

        Ok(Self {
            config,
            blocked_patterns,
        })
    }
}

impl EntryFilter for ListingFilter {
    fn evaluate(&self, listing: &Listing) -> FilterVerdict {
        if !self.config.enabled {
            return FilterVerdict::Pass;
        }

        if listing.hidden.unwrap_or(false) {
            return FilterVerdict::Reject(RejectReason::Hidden);
        }

        if listing.nsfw && !self.config.allow_nsfw {
            return FilterVerdict::Reject(RejectReason::Nsfw);
        }

        for pattern in &self.blocked_patterns {
            if pattern.is_match(&listing.name) || pattern.is_match(&listing.symbol) {
                debug!(
                    "Listing {} ({}) blocked by pattern: {}",
                    listing.name, listing.symbol, pattern
                );
                return FilterVerdict::Reject(RejectReason::BlockedName(pattern.to_string()));
            }
        }

        if self.config.require_social_links && !listing.has_social_links() {
            return FilterVerdict::Reject(RejectReason::NoSocialLinks);
        }

        let cap = listing.usd_market_cap;
        if cap < self.config.min_usd_market_cap || cap > self.config.max_usd_market_cap {
            return FilterVerdict::Reject(RejectReason::MarketCapOutOfBounds(cap));
        }

        debug!("Listing {} ({}) passed filters", listing.name, listing.symbol);
        FilterVerdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> FilterConfig {
        FilterConfig {
            enabled: true,
            blocked_patterns: vec!["(?i)scam".to_string(), "(?i)rug".to_string()],
            require_social_links: true,
            min_usd_market_cap: 5_000.0,
            max_usd_market_cap: 12_000.0,
            allow_nsfw: false,
        }
    }

    fn test_listing(name: &str, symbol: &str) -> Listing {
        Listing {
            mint: "testmint".to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            creator: "creator".to_string(),
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_000_000_000_000,
            usd_market_cap: 6_500.0,
            twitter: Some("https://x.com/test".to_string()),
            telegram: None,
            website: None,
            created_timestamp: Utc::now(),
            nsfw: false,
            hidden: None,
            monitor_start: None,
        }
    }

    #[test]
    fn test_pass() {
        let filter = ListingFilter::new(test_config()).unwrap();
        assert!(filter.evaluate(&test_listing("GoodToken", "GOOD")).is_pass());
    }

    #[test]
    fn test_blocked_pattern() {
        let filter = ListingFilter::new(test_config()).unwrap();
        let verdict = filter.evaluate(&test_listing("ScamCoin", "SCAM"));
        assert!(matches!(
            verdict,
            FilterVerdict::Reject(RejectReason::BlockedName(_))
        ));
    }

    #[test]
    fn test_hidden_rejected() {
        let filter = ListingFilter::new(test_config()).unwrap();
        let mut listing = test_listing("GoodToken", "GOOD");
        listing.hidden = Some(true);
        assert!(matches!(
            filter.evaluate(&listing),
            FilterVerdict::Reject(RejectReason::Hidden)
        ));
    }

    #[test]
    fn test_social_links_required() {
        let filter = ListingFilter::new(test_config()).unwrap();
        let mut listing = test_listing("GoodToken", "GOOD");
        listing.twitter = None;
        assert!(matches!(
            filter.evaluate(&listing),
            FilterVerdict::Reject(RejectReason::NoSocialLinks)
        ));
    }

    #[test]
    fn test_market_cap_bounds() {
        let filter = ListingFilter::new(test_config()).unwrap();
        let mut listing = test_listing("GoodToken", "GOOD");
        listing.usd_market_cap = 50_000.0;
        assert!(matches!(
            filter.evaluate(&listing),
            FilterVerdict::Reject(RejectReason::MarketCapOutOfBounds(_))
        ));
    }

    #[test]
    fn test_disabled_filter_passes_everything() {
        let mut config = test_config();
        config.enabled = false;
        let filter = ListingFilter::new(config).unwrap();

        let mut listing = test_listing("ScamCoin", "SCAM");
        listing.hidden = Some(true);
        assert!(filter.evaluate(&listing).is_pass());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config = test_config();
        config.blocked_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(
            ListingFilter::new(config),
            Err(Error::InvalidRegex(_))
        ));
    }
}
