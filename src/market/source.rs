//! Upstream price sources

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MarketConfig;
use crate::domain::StockInfo;
use crate::error::{ArenaError, Result};

/// Raw quote for one mint
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub change_24h: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
}

/// Source of live prices for the catalog
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Quotes keyed by mint. Missing mints are a partial failure, not an error.
    async fn fetch_quotes(&self, stocks: &[StockInfo]) -> Result<HashMap<String, Quote>>;

    /// Cheap connectivity probe used by the pre-round gate
    async fn ping(&self) -> Result<()> {
        let probe: Vec<StockInfo> = crate::domain::STOCK_CATALOG.iter().take(1).copied().collect();
        self.fetch_quotes(&probe).await.map(|_| ())
    }
}

/// Jupiter Price API v3 client
pub struct JupiterPriceSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterPriceSource {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .build()
            .map_err(|e| ArenaError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.price_api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl PriceSource for JupiterPriceSource {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn fetch_quotes(&self, stocks: &[StockInfo]) -> Result<HashMap<String, Quote>> {
        if stocks.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = stocks.iter().map(|s| s.mint).collect::<Vec<_>>().join(",");
        let url = format!("{}/price/v3", self.base_url);

        let mut request = self.http.get(&url).query(&[("ids", ids.as_str())]);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Jupiter price API error: {} - {}", status, body);
            return Err(ArenaError::MarketDataUnavailable(format!(
                "jupiter returned {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        let quotes = parse_price_response(&body);
        debug!(
            requested = stocks.len(),
            received = quotes.len(),
            "Jupiter quotes received"
        );
        Ok(quotes)
    }
}

/// Parse a price v3 body, with or without a `data` envelope.
pub fn parse_price_response(body: &Value) -> HashMap<String, Quote> {
    let entries = body.get("data").unwrap_or(body);
    let mut quotes = HashMap::new();

    if let Some(map) = entries.as_object() {
        for (mint, entry) in map {
            let price = match decimal_field(entry, &["usdPrice", "price"]) {
                Some(p) if p > Decimal::ZERO => p,
                _ => continue,
            };
            quotes.insert(
                mint.clone(),
                Quote {
                    price,
                    change_24h: decimal_field(entry, &["priceChange24h"]),
                    volume_24h: decimal_field(entry, &["volume24h", "volumeUsd24h"]),
                },
            );
        }
    }

    quotes
}

fn decimal_field(entry: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|k| match entry.get(*k)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_v3_flat_response() {
        let body = json!({
            "mintA": {"usdPrice": 231.5, "priceChange24h": -1.25, "decimals": 8},
            "mintB": {"usdPrice": 0, "priceChange24h": 2.0}
        });
        let quotes = parse_price_response(&body);
        assert_eq!(quotes.len(), 1);
        let q = &quotes["mintA"];
        assert_eq!(q.price, dec!(231.5));
        assert_eq!(q.change_24h, Some(dec!(-1.25)));
        assert_eq!(q.volume_24h, None);
    }

    #[test]
    fn test_parse_data_envelope_with_string_prices() {
        let body = json!({"data": {"mintA": {"id": "mintA", "price": "19.87"}}});
        let quotes = parse_price_response(&body);
        assert_eq!(quotes["mintA"].price, dec!(19.87));
    }

    #[test]
    fn test_parse_garbage_yields_nothing() {
        assert!(parse_price_response(&json!(["not", "a", "map"])).is_empty());
        assert!(parse_price_response(&json!({"mintA": {"usdPrice": "n/a"}})).is_empty());
    }
}
