//! CoinGecko source - spot prices via the simple/price endpoint
//!
//! One GET per cycle covering both assets, with the 24h change included in
//! the same response. Parsing is fail-closed: anything the payload does not
//! carry in the expected shape becomes an absent field, and a payload with
//! no usable price at all yields no reading.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::oracle::sources::SourceClient;
use crate::oracle::SourceReading;
use crate::types::Asset;

const SOURCE_ID: &str = "CoinGecko";

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com";

pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    ethereum: Option<AssetQuote>,
    bitcoin: Option<AssetQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetQuote {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

fn parse_simple_price(body: &str, fetched_at: i64) -> Option<SourceReading> {
    let response: SimplePriceResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(source = SOURCE_ID, error = %e, "malformed payload");
            return None;
        }
    };

    let eth = response.ethereum.unwrap_or_default();
    let btc = response.bitcoin.unwrap_or_default();

    let eth_price = eth.usd.filter(|p| *p > 0.0);
    let btc_price = btc.usd.filter(|p| *p > 0.0);
    if eth_price.is_none() && btc_price.is_none() {
        warn!(source = SOURCE_ID, "payload carried no usable prices");
        return None;
    }

    Some(SourceReading {
        source_id: SOURCE_ID.to_string(),
        eth_price,
        btc_price,
        eth_change_24h: eth.usd_24h_change,
        btc_change_24h: btc.usd_24h_change,
        fetched_at,
    })
}

#[async_trait]
impl SourceClient for CoinGeckoSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    async fn fetch(&self) -> Option<SourceReading> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let ids = format!("{},{}", Asset::ETH.coingecko_id(), Asset::BTC.coingecko_id());
        debug!(source = SOURCE_ID, "fetching spot prices");

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("ids", ids.as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(source = SOURCE_ID, error = %e, "fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(source = SOURCE_ID, status = %response.status(), "request rejected");
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = SOURCE_ID, error = %e, "failed to read body");
                return None;
            }
        };

        parse_simple_price(&body, Utc::now().timestamp_millis())
    }
}
