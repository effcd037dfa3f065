//! Error types for pumpwatch

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Feed errors
    #[error("Feed connection failed: {0}")]
    FeedConnection(String),

    #[error("Feed disconnected: {0}")]
    FeedDisconnected(String),

    #[error("Feed decode error: {0}")]
    FeedDecode(String),

    // Pricing errors
    #[error("Bonding curve has zero reserves")]
    ZeroReserves,

    #[error("Price calculation overflow")]
    PriceOverflow,

    // Execution errors
    #[error("Trade API error: {0}")]
    Api(String),

    #[error("Trade rejected: {0}")]
    TradeRejected(String),

    #[error("Execution timed out after {0}ms")]
    ExecutionTimeout(u64),

    #[error("Token account not found: {0}")]
    AccountNotFound(String),

    // Filter errors
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    ///
    /// Timeouts are deliberately NOT retryable: a timed-out buy or sell may
    /// have landed on the backend, and re-submitting risks a double fill.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Api(_) | Error::FeedConnection(_) | Error::FeedDisconnected(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Api(e.to_string())
    }
}
