//! Hosted trade API client
//!
//! Executes trades through the exchange's HTTP trade endpoint instead of
//! building transactions locally. The API takes the fee; we take the
//! simplicity. Rate limits apply - don't spam requests.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FillReceipt, TokenAccount, TradeExecutor};
use crate::curve::CurveReserves;
use crate::error::{Error, Result};

/// Trade action
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum TradeAction {
    Buy,
    Sell,
}

/// Trade request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeRequest {
    action: TradeAction,
    /// Token mint address
    mint: String,
    /// Amount (lamports for buy, token units for sell)
    amount: String,
    /// true if amount is denominated in SOL
    denominated_in_sol: String,
    /// Slippage percentage (e.g. 25 for 25%)
    slippage: u32,
    /// Priority fee in SOL
    priority_fee: f64,
}

/// Trade response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeResponse {
    signature: Option<String>,
    error: Option<String>,
    errors: Option<Vec<String>>,
}

/// Reserve snapshot response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurveResponse {
    virtual_sol_reserves: u64,
    virtual_token_reserves: u64,
}

/// Balance response
#[derive(Debug, Clone, Deserialize)]
struct BalanceResponse {
    balance: u64,
}

/// Token account entry in the accounts listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountMsg {
    mint: String,
    address: String,
    balance: u64,
}

/// HTTP trade API client configuration
#[derive(Debug, Clone)]
pub struct HttpTraderConfig {
    pub api_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    /// Slippage percentage passed through to the API
    pub slippage_pct: u32,
    /// Priority fee in SOL
    pub priority_fee_sol: f64,
}

/// Hosted trade API client
pub struct HttpTrader {
    client: Client,
    config: HttpTraderConfig,
}

impl HttpTrader {
    pub fn new(config: HttpTraderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("trade API key not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}?api-key={}",
            self.config.api_url.trim_end_matches('/'),
            path,
            self.config.api_key
        )
    }

    async fn execute(&self, request: &TradeRequest) -> Result<FillReceipt> {
        let response = self
            .client
            .post(self.endpoint("trade"))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ExecutionTimeout(self.config.request_timeout_ms)
                } else {
                    Error::Api(format!("trade request failed: {}", e))
                }
            })?;

        let body: TradeResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("trade response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(Error::TradeRejected(error));
        }
        if let Some(errors) = body.errors {
            if !errors.is_empty() {
                return Err(Error::TradeRejected(errors.join(", ")));
            }
        }

        Ok(FillReceipt {
            signature: body.signature,
            sol_amount: None,
            token_amount: None,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ExecutionTimeout(self.config.request_timeout_ms)
                } else {
                    Error::Api(format!("GET {} failed: {}", path, e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "GET {} returned {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("GET {}: {}", path, e)))
    }
}

#[async_trait::async_trait]
impl TradeExecutor for HttpTrader {
    async fn buy(&self, mint: &str, sol_lamports: u64) -> Result<FillReceipt> {
        let sol = sol_lamports as f64 / 1e9;
        info!(mint = %mint, sol = sol, "Executing buy");

        let receipt = self
            .execute(&TradeRequest {
                action: TradeAction::Buy,
                mint: mint.to_string(),
                amount: sol.to_string(),
                denominated_in_sol: "true".to_string(),
                slippage: self.config.slippage_pct,
                priority_fee: self.config.priority_fee_sol,
            })
            .await?;

        debug!(mint = %mint, signature = ?receipt.signature, "Buy accepted");
        Ok(receipt)
    }

    async fn sell(&self, mint: &str, token_amount: u64) -> Result<FillReceipt> {
        info!(mint = %mint, tokens = token_amount, "Executing sell");

        let receipt = self
            .execute(&TradeRequest {
                action: TradeAction::Sell,
                mint: mint.to_string(),
                amount: token_amount.to_string(),
                denominated_in_sol: "false".to_string(),
                slippage: self.config.slippage_pct,
                priority_fee: self.config.priority_fee_sol,
            })
            .await?;

        debug!(mint = %mint, signature = ?receipt.signature, "Sell accepted");
        Ok(receipt)
    }

    async fn reserve_snapshot(&self, mint: &str) -> Result<CurveReserves> {
        let curve: CurveResponse = self.get_json(&format!("curve/{}", mint)).await?;
        Ok(CurveReserves::new(
            curve.virtual_sol_reserves,
            curve.virtual_token_reserves,
        ))
    }

    async fn token_balance(&self, mint: &str) -> Result<u64> {
        let body: BalanceResponse = self.get_json(&format!("balance/{}", mint)).await?;
        Ok(body.balance)
    }

    async fn list_token_accounts(&self) -> Result<Vec<TokenAccount>> {
        let accounts: Vec<TokenAccountMsg> = self.get_json("accounts").await?;
        Ok(accounts
            .into_iter()
            .map(|a| TokenAccount {
                mint: a.mint,
                address: a.address,
                balance: a.balance,
            })
            .collect())
    }

    async fn close_token_account(&self, mint: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("accounts/{}/close", mint)))
            .send()
            .await
            .map_err(|e| Error::Api(format!("close account failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "close account for {} returned {}",
                mint,
                response.status()
            )));
        }

        info!(mint = %mint, "Closed token account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_request_shape() {
        let request = TradeRequest {
            action: TradeAction::Buy,
            mint: "GmQ1Bc9iU7V7jcJnSse9DBnu12ZcQN2V1NNZPQz3pump".to_string(),
            amount: "0.05".to_string(),
            denominated_in_sol: "true".to_string(),
            slippage: 25,
            priority_fee: 0.0005,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""action":"buy""#));
        assert!(json.contains(r#""denominatedInSol":"true""#));
    }

    #[test]
    fn test_rejection_parsing() {
        let body: TradeResponse =
            serde_json::from_str(r#"{"error": "insufficient balance"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("insufficient balance"));
        assert!(body.signature.is_none());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = HttpTrader::new(HttpTraderConfig {
            api_url: "https://api.invalid".to_string(),
            api_key: String::new(),
            request_timeout_ms: 5000,
            slippage_pct: 25,
            priority_fee_sol: 0.0005,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
